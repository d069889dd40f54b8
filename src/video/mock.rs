//! In-memory decoder for tests and dry runs.

use super::{FrameStream, VideoDecoder};
use crate::error::{CurationError, Result};
use crate::frame::VideoInfo;
use image::RgbImage;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Scripted content for one path
#[derive(Debug, Clone)]
pub struct MockVideo {
    frames: Arc<Vec<RgbImage>>,
    fps: f64,
    reported_frames: Option<u64>,
    fail_open: bool,
    fail_after: Option<usize>,
}

impl MockVideo {
    pub fn new(frames: Vec<RgbImage>, fps: f64) -> Self {
        Self {
            frames: Arc::new(frames),
            fps,
            reported_frames: None,
            fail_open: false,
            fail_after: None,
        }
    }

    /// Opening the path fails as an undecodable container would
    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    /// Decoding errors after `count` frames have been produced
    pub fn failing_after(mut self, count: usize) -> Self {
        self.fail_after = Some(count);
        self
    }

    /// Container frame count differing from what actually decodes
    pub fn reporting_frames(mut self, count: u64) -> Self {
        self.reported_frames = Some(count);
        self
    }
}

#[derive(Debug)]
pub struct MockVideoDecoder {
    name: String,
    videos: RwLock<HashMap<PathBuf, MockVideo>>,
}

impl MockVideoDecoder {
    pub fn new() -> Self {
        Self::with_name("mock")
    }

    pub fn with_name<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            videos: RwLock::new(HashMap::new()),
        }
    }

    pub fn insert<P: Into<PathBuf>>(&self, path: P, frames: Vec<RgbImage>, fps: f64) {
        self.insert_video(path, MockVideo::new(frames, fps));
    }

    pub fn insert_video<P: Into<PathBuf>>(&self, path: P, video: MockVideo) {
        self.videos.write().insert(path.into(), video);
    }
}

impl Default for MockVideoDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl VideoDecoder for MockVideoDecoder {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&self, path: &Path) -> Result<Box<dyn FrameStream>> {
        let video = self
            .videos
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| CurationError::VideoOpen {
                path: path.to_path_buf(),
                details: format!("{} has no such video", self.name),
            })?;

        if video.fail_open {
            return Err(CurationError::VideoOpen {
                path: path.to_path_buf(),
                details: "corrupt container".to_string(),
            });
        }

        let (width, height) = video
            .frames
            .first()
            .map(|f| f.dimensions())
            .unwrap_or((0, 0));
        let frame_count = video
            .reported_frames
            .unwrap_or(video.frames.len() as u64);

        Ok(Box::new(MockFrameStream {
            info: VideoInfo::new(frame_count, video.fps, width, height),
            video,
            position: 0,
        }))
    }
}

struct MockFrameStream {
    info: VideoInfo,
    video: MockVideo,
    position: usize,
}

impl FrameStream for MockFrameStream {
    fn info(&self) -> VideoInfo {
        self.info
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        if self.video.fail_after == Some(self.position) {
            return Err(CurationError::decode(format!(
                "scripted failure at frame {}",
                self.position
            )));
        }
        let frame = self.video.frames.get(self.position).cloned();
        if frame.is_some() {
            self.position += 1;
        }
        Ok(frame)
    }
}
