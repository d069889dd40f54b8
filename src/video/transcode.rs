//! Fallback backend: `ffmpeg` writes every frame as a PNG into a scratch
//! directory, which is then read back in order.

use super::ffmpeg::probe_video;
use super::{FrameStream, VideoDecoder};
use crate::error::{CurationError, Result};
use crate::frame::VideoInfo;
use image::RgbImage;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tempfile::TempDir;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct TranscodeDecoder {
    program: PathBuf,
}

impl TranscodeDecoder {
    pub fn new() -> Self {
        Self {
            program: PathBuf::from("ffmpeg"),
        }
    }
}

impl Default for TranscodeDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl VideoDecoder for TranscodeDecoder {
    fn name(&self) -> &str {
        "transcode"
    }

    fn open(&self, path: &Path) -> Result<Box<dyn FrameStream>> {
        if !path.exists() {
            return Err(CurationError::VideoOpen {
                path: path.to_path_buf(),
                details: "file not found".to_string(),
            });
        }

        // Frame rate still comes from the container; the dump only gives pixels
        let probed = match probe_video(path) {
            Ok(probe) => Some(probe.video_info()),
            Err(e) => {
                warn!("Probe failed for {}, frame rate unknown: {}", path.display(), e);
                None
            }
        };

        let scratch = tempfile::Builder::new().prefix("vidcurate-transcode-").tempdir()?;
        let pattern = scratch.path().join("%08d.png");

        let output = Command::new(&self.program)
            .args(["-v", "error", "-nostdin", "-y", "-noautorotate", "-i"])
            .arg(path)
            .args(["-vsync", "0"])
            .arg(&pattern)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| CurationError::VideoOpen {
                path: path.to_path_buf(),
                details: format!("failed to run {}: {}", self.program.display(), e),
            })?;

        if !output.status.success() {
            return Err(CurationError::VideoOpen {
                path: path.to_path_buf(),
                details: format!(
                    "transcode exited with {:?}: {}",
                    output.status.code(),
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        let mut files: Vec<PathBuf> = std::fs::read_dir(scratch.path())?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().map(|ext| ext == "png").unwrap_or(false))
            .collect();
        files.sort();

        let (fps, width, height) = probed
            .map(|info| (info.fps, info.width, info.height))
            .unwrap_or((0.0, 0, 0));
        let info = VideoInfo::new(files.len() as u64, fps, width, height);

        debug!(
            "Transcoded {} into {} frame file(s)",
            path.display(),
            files.len()
        );

        Ok(Box::new(TranscodedFrames {
            info,
            files: files.into_iter(),
            _scratch: scratch,
        }))
    }
}

struct TranscodedFrames {
    info: VideoInfo,
    files: std::vec::IntoIter<PathBuf>,
    _scratch: TempDir,
}

impl FrameStream for TranscodedFrames {
    fn info(&self) -> VideoInfo {
        self.info
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        match self.files.next() {
            Some(file) => Ok(Some(image::open(&file)?.to_rgb8())),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_file() {
        let decoder = TranscodeDecoder::new();
        assert_eq!(decoder.name(), "transcode");
        assert!(decoder.open(Path::new("/no/such/video.mp4")).is_err());
    }
}
