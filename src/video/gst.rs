//! GStreamer backend: `filesrc ! decodebin ! videoconvert ! appsink` pulling RGB
//! samples in decode order.

use super::{FrameStream, VideoDecoder};
use crate::error::{CurationError, Result};
use crate::frame::VideoInfo;
use gstreamer::prelude::*;
use gstreamer::Pipeline;
use gstreamer_app::AppSink;
use image::RgbImage;
use std::path::Path;
use tracing::{debug, warn};

const PULL_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone)]
pub struct GstDecoder;

impl GstDecoder {
    pub fn new() -> Result<Self> {
        gstreamer::init().map_err(|e| {
            CurationError::component("gstreamer".to_string(), format!("Failed to initialize: {}", e))
        })?;
        Ok(Self)
    }
}

fn open_error(path: &Path, details: String) -> CurationError {
    CurationError::VideoOpen {
        path: path.to_path_buf(),
        details,
    }
}

impl VideoDecoder for GstDecoder {
    fn name(&self) -> &str {
        "gstreamer"
    }

    fn open(&self, path: &Path) -> Result<Box<dyn FrameStream>> {
        if !path.exists() {
            return Err(open_error(path, "file not found".to_string()));
        }

        let location = path.to_string_lossy().replace('"', "\\\"");
        let pipeline_desc = format!(
            "filesrc location=\"{}\" ! decodebin ! videoconvert ! \
             video/x-raw,format=RGB ! \
             appsink name=sink sync=false max-buffers=4",
            location
        );
        debug!("Creating decode pipeline: {}", pipeline_desc);

        let pipeline = gstreamer::parse::launch(&pipeline_desc)
            .map_err(|e| open_error(path, format!("Failed to create pipeline: {}", e)))?
            .downcast::<Pipeline>()
            .map_err(|_| open_error(path, "Failed to downcast to Pipeline".to_string()))?;

        let appsink = pipeline
            .by_name("sink")
            .ok_or_else(|| open_error(path, "Failed to get appsink element".to_string()))?
            .downcast::<AppSink>()
            .map_err(|_| open_error(path, "Failed to downcast to AppSink".to_string()))?;

        pipeline
            .set_state(gstreamer::State::Playing)
            .map_err(|e| open_error(path, format!("Failed to start pipeline: {}", e)))?;

        let mut stream = GstFrameStream {
            info: VideoInfo::new(0, 0.0, 0, 0),
            pipeline,
            appsink,
            stride: 0,
            pending: None,
        };

        // The first sample carries the negotiated caps
        let first = stream
            .pull()
            .map_err(|e| open_error(path, e.to_string()))?
            .ok_or_else(|| open_error(path, "stream ended before the first frame".to_string()))?;

        let caps = first
            .caps()
            .ok_or_else(|| open_error(path, "sample has no caps".to_string()))?;
        let video_info = gstreamer_video::VideoInfo::from_caps(caps)
            .map_err(|e| open_error(path, format!("Unreadable caps: {}", e)))?;

        let fps = video_info.fps();
        let fps = if fps.denom() > 0 {
            fps.numer() as f64 / fps.denom() as f64
        } else {
            0.0
        };
        let frame_count = stream
            .pipeline
            .query_duration::<gstreamer::ClockTime>()
            .map(|d| (d.nseconds() as f64 / 1e9 * fps).round() as u64)
            .unwrap_or(0);

        stream.info = VideoInfo::new(frame_count, fps, video_info.width(), video_info.height());
        stream.stride = video_info.stride()[0] as usize;
        stream.pending = Some(first);
        Ok(Box::new(stream))
    }
}

struct GstFrameStream {
    info: VideoInfo,
    pipeline: Pipeline,
    appsink: AppSink,
    stride: usize,
    pending: Option<gstreamer::Sample>,
}

impl GstFrameStream {
    fn pull(&self) -> Result<Option<gstreamer::Sample>> {
        match self
            .appsink
            .try_pull_sample(gstreamer::ClockTime::from_seconds(PULL_TIMEOUT_SECS))
        {
            Some(sample) => Ok(Some(sample)),
            None if self.appsink.is_eos() => Ok(None),
            None => Err(CurationError::decode("timed out waiting for a decoded frame")),
        }
    }

    fn to_image(&self, sample: &gstreamer::Sample) -> Result<RgbImage> {
        let buffer = sample
            .buffer()
            .ok_or_else(|| CurationError::decode("No buffer in decoded sample"))?;
        let map = buffer
            .map_readable()
            .map_err(|e| CurationError::decode(format!("Failed to map buffer: {}", e)))?;

        let (width, height) = (self.info.width as usize, self.info.height as usize);
        let row_bytes = width * 3;
        if self.stride < row_bytes || map.len() < self.stride * (height.max(1) - 1) + row_bytes {
            return Err(CurationError::decode("decoded buffer smaller than frame"));
        }

        let mut pixels = Vec::with_capacity(row_bytes * height);
        for row in 0..height {
            let start = row * self.stride;
            pixels.extend_from_slice(&map[start..start + row_bytes]);
        }
        RgbImage::from_raw(self.info.width, self.info.height, pixels)
            .ok_or_else(|| CurationError::decode("raw frame buffer has wrong size"))
    }
}

impl FrameStream for GstFrameStream {
    fn info(&self) -> VideoInfo {
        self.info
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        let sample = match self.pending.take() {
            Some(sample) => sample,
            None => match self.pull()? {
                Some(sample) => sample,
                None => return Ok(None),
            },
        };
        self.to_image(&sample).map(Some)
    }
}

impl Drop for GstFrameStream {
    fn drop(&mut self) {
        if let Err(e) = self.pipeline.set_state(gstreamer::State::Null) {
            warn!("Failed to stop decode pipeline: {}", e);
        }
    }
}
