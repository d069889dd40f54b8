//! Adapter for an external detection model run as a subprocess.
//!
//! The program receives the path of a PNG frame as its last argument and must
//! print a JSON document of the form
//! `{"hands": [{"confidence": 0.9}], "objects": [{"class_id": 41, "name": "cup", "confidence": 0.8}]}`.

use super::{Detector, TargetClass};
use crate::config::DetectorConfig;
use crate::error::{CurationError, Result};
use image::RgbImage;
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::process::Command;
use tracing::debug;

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct DetectionOutput {
    #[serde(default)]
    pub hands: Vec<HandDetection>,
    #[serde(default)]
    pub objects: Vec<ObjectDetection>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct HandDetection {
    pub confidence: f64,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ObjectDetection {
    pub class_id: Option<u32>,
    pub name: Option<String>,
    pub confidence: f64,
}

impl DetectionOutput {
    pub fn has_hand(&self, min_confidence: f64) -> bool {
        self.hands.iter().any(|h| h.confidence >= min_confidence)
    }

    pub fn has_object(&self, target: Option<&TargetClass>, min_confidence: f64) -> bool {
        self.objects
            .iter()
            .filter(|o| o.confidence >= min_confidence)
            .any(|o| match target {
                Some(target) => target.matches(o.class_id, o.name.as_deref()),
                None => true,
            })
    }
}

pub struct CommandDetector {
    program: PathBuf,
    args: Vec<String>,
    confidence: f64,
    /// Last frame's output; hand and object queries hit the same frame
    last: Mutex<Option<(u64, DetectionOutput)>>,
}

impl CommandDetector {
    pub fn new<P: Into<PathBuf>>(program: P, args: Vec<String>, confidence: f64) -> Self {
        Self {
            program: program.into(),
            args,
            confidence,
            last: Mutex::new(None),
        }
    }

    pub fn from_config(config: &DetectorConfig) -> Result<Self> {
        let program = config.program.as_ref().ok_or_else(|| {
            CurationError::component("detector", "No detector program configured")
        })?;
        Ok(Self::new(program, config.args.clone(), config.confidence))
    }

    fn frame_key(frame: &RgbImage) -> u64 {
        let mut hasher = DefaultHasher::new();
        frame.dimensions().hash(&mut hasher);
        frame.as_raw().hash(&mut hasher);
        hasher.finish()
    }

    fn run(&self, frame: &RgbImage) -> Result<DetectionOutput> {
        let key = Self::frame_key(frame);
        if let Some((cached_key, output)) = self.last.lock().as_ref() {
            if *cached_key == key {
                return Ok(output.clone());
            }
        }

        let backend = self.program.display().to_string();
        let scratch = tempfile::Builder::new()
            .prefix("vidcurate-frame-")
            .suffix(".png")
            .tempfile()?;
        frame.save_with_format(scratch.path(), image::ImageFormat::Png)?;

        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(scratch.path())
            .output()
            .map_err(|e| CurationError::detector(backend.clone(), format!("spawn failed: {}", e)))?;

        if !output.status.success() {
            return Err(CurationError::detector(
                backend,
                format!(
                    "exited with {:?}: {}",
                    output.status.code(),
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            ));
        }

        let parsed: DetectionOutput = serde_json::from_slice(&output.stdout)
            .map_err(|e| CurationError::detector(backend, format!("invalid output: {}", e)))?;
        debug!(
            "Detector reported {} hand(s), {} object(s)",
            parsed.hands.len(),
            parsed.objects.len()
        );

        *self.last.lock() = Some((key, parsed.clone()));
        Ok(parsed)
    }
}

impl Detector for CommandDetector {
    fn name(&self) -> &str {
        "command"
    }

    fn detect_hand(&self, frame: &RgbImage) -> Result<bool> {
        Ok(self.run(frame)?.has_hand(self.confidence))
    }

    fn detect_object(&self, frame: &RgbImage, target: Option<&TargetClass>) -> Result<bool> {
        Ok(self.run(frame)?.has_object(target, self.confidence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output() -> DetectionOutput {
        serde_json::from_str(
            r#"{"hands":[{"confidence":0.4},{"confidence":0.7}],
                "objects":[{"class_id":41,"name":"cup","confidence":0.9},
                           {"name":"bottle","confidence":0.3}]}"#,
        )
        .unwrap()
    }

    #[test]
    fn test_confidence_filtering() {
        let out = output();
        assert!(out.has_hand(0.5));
        assert!(!out.has_hand(0.8));
        assert!(out.has_object(None, 0.5));
        assert!(!out.has_object(Some(&TargetClass::Name("bottle".into())), 0.5));
        assert!(out.has_object(Some(&TargetClass::Name("bottle".into())), 0.2));
        assert!(out.has_object(Some(&TargetClass::Id(41)), 0.5));
    }

    #[test]
    fn test_missing_sections_default_to_empty() {
        let out: DetectionOutput = serde_json::from_str("{}").unwrap();
        assert!(!out.has_hand(0.0));
        assert!(!out.has_object(None, 0.0));
    }

    #[test]
    fn test_requires_program() {
        assert!(CommandDetector::from_config(&DetectorConfig {
            program: None,
            args: vec![],
            confidence: 0.5,
        })
        .is_err());
    }

    #[test]
    fn test_missing_program_is_detector_error() {
        let detector = CommandDetector::new("/nonexistent/detector", vec![], 0.5);
        let frame = RgbImage::new(4, 4);
        assert!(matches!(
            detector.detect_hand(&frame),
            Err(CurationError::Detector { .. })
        ));
    }
}
