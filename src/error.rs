use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CurationError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Failed to open video {path}: {details}")]
    VideoOpen { path: PathBuf, details: String },

    #[error("Decode error: {details}")]
    Decode { details: String },

    #[error("Video has {frames} frame(s), at least 2 are required")]
    InsufficientFrames { frames: u64 },

    #[error("Video {path} yielded no decodable frames")]
    EmptyVideo { path: PathBuf },

    #[error("Frame count mismatch in {dir}: expected {expected}, found {found}")]
    FrameCountMismatch {
        dir: PathBuf,
        expected: usize,
        found: usize,
    },

    #[error("Invalid camera intrinsics: {details}")]
    Intrinsics { details: String },

    #[error("Commit of sample {sample} failed: {details}")]
    Commit { sample: String, details: String },

    #[error("Manifest error: {details}")]
    Manifest { details: String },

    #[error("Candidate directory does not exist: {0}")]
    CandidateDirMissing(PathBuf),

    #[error("Detector error in {backend}: {details}")]
    Detector { backend: String, details: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

impl CurationError {
    pub fn component<S: Into<String>>(component: S, message: S) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }

    pub fn decode<S: Into<String>>(details: S) -> Self {
        Self::Decode {
            details: details.into(),
        }
    }

    pub fn commit<S: Into<String>>(sample: S, details: S) -> Self {
        Self::Commit {
            sample: sample.into(),
            details: details.into(),
        }
    }

    pub fn detector<S: Into<String>>(backend: S, details: S) -> Self {
        Self::Detector {
            backend: backend.into(),
            details: details.into(),
        }
    }

    /// Whether the error aborts the whole batch rather than a single candidate
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CurationError::CandidateDirMissing(_) | CurationError::Config(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, CurationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(CurationError::CandidateDirMissing(PathBuf::from("/nope")).is_fatal());
        assert!(!CurationError::InsufficientFrames { frames: 1 }.is_fatal());
        assert!(!CurationError::commit("obj_view_001", "disk full").is_fatal());
    }

    #[test]
    fn test_error_messages() {
        let err = CurationError::FrameCountMismatch {
            dir: PathBuf::from("/data/rgb"),
            expected: 150,
            found: 149,
        };
        assert_eq!(
            err.to_string(),
            "Frame count mismatch in /data/rgb: expected 150, found 149"
        );
    }
}
