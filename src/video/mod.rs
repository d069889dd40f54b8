//! Decoding backends that turn a candidate video into a sequential stream of
//! RGB frames.
//!
//! Two external-tool backends are always available (`ffmpeg` raw-frame pipe and
//! `transcode` PNG dump); a GStreamer backend is compiled in with the
//! `gstreamer` feature. [`DecoderChain`] tries them in configured order.

mod ffmpeg;
#[cfg(all(feature = "gstreamer", target_os = "linux"))]
mod gst;
mod mock;
mod transcode;

#[cfg(all(test, unix))]
pub(crate) use ffmpeg::scripted_tools;
pub use ffmpeg::{parse_fraction, probe_video, probe_video_with, FfmpegPipeDecoder, FfprobeOutput};
#[cfg(all(feature = "gstreamer", target_os = "linux"))]
pub use gst::GstDecoder;
pub use mock::{MockVideo, MockVideoDecoder};
pub use transcode::TranscodeDecoder;

use crate::error::{CurationError, Result};
use crate::frame::VideoInfo;
use image::RgbImage;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// An opened video yielding frames in decode order
pub trait FrameStream: Send {
    fn info(&self) -> VideoInfo;

    /// Next decoded frame, `None` at end of stream
    fn next_frame(&mut self) -> Result<Option<RgbImage>>;
}

/// A decoding backend
pub trait VideoDecoder: Send + Sync {
    fn name(&self) -> &str;

    fn open(&self, path: &Path) -> Result<Box<dyn FrameStream>>;
}

/// Ordered list of interchangeable backends; opening falls through on failure
#[derive(Clone)]
pub struct DecoderChain {
    backends: Vec<Arc<dyn VideoDecoder>>,
}

impl DecoderChain {
    pub fn new(backends: Vec<Arc<dyn VideoDecoder>>) -> Self {
        Self { backends }
    }

    pub fn single(backend: Arc<dyn VideoDecoder>) -> Self {
        Self::new(vec![backend])
    }

    /// Build a chain from backend names as they appear in configuration
    pub fn from_names(names: &[String]) -> Result<Self> {
        let mut backends: Vec<Arc<dyn VideoDecoder>> = Vec::with_capacity(names.len());
        for name in names {
            match name.as_str() {
                "ffmpeg" => backends.push(Arc::new(FfmpegPipeDecoder::new())),
                "transcode" => backends.push(Arc::new(TranscodeDecoder::new())),
                #[cfg(all(feature = "gstreamer", target_os = "linux"))]
                "gstreamer" => backends.push(Arc::new(GstDecoder::new()?)),
                other => {
                    return Err(CurationError::component(
                        "decoder".to_string(),
                        format!("Unknown or unavailable decoder backend '{}'", other),
                    ))
                }
            }
        }
        Ok(Self::new(backends))
    }

    pub fn backends(&self) -> &[Arc<dyn VideoDecoder>] {
        &self.backends
    }
}

impl VideoDecoder for DecoderChain {
    fn name(&self) -> &str {
        "chain"
    }

    fn open(&self, path: &Path) -> Result<Box<dyn FrameStream>> {
        let mut last_error = None;
        for backend in &self.backends {
            match backend.open(path) {
                Ok(stream) => {
                    debug!("Opened {} with {} backend", path.display(), backend.name());
                    return Ok(stream);
                }
                Err(e) => {
                    warn!(
                        "Backend {} failed to open {}: {}",
                        backend.name(),
                        path.display(),
                        e
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| CurationError::VideoOpen {
            path: path.to_path_buf(),
            details: "no decoder backends configured".to_string(),
        }))
    }
}

/// Skip ahead and return the frame at `index`, if the stream is that long
pub fn frame_at(stream: &mut dyn FrameStream, index: u64) -> Result<Option<RgbImage>> {
    let mut current = 0u64;
    while let Some(frame) = stream.next_frame()? {
        if current == index {
            return Ok(Some(frame));
        }
        current += 1;
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn frames(count: usize) -> Vec<RgbImage> {
        (0..count)
            .map(|i| RgbImage::from_pixel(4, 4, Rgb([i as u8, 0, 0])))
            .collect()
    }

    #[test]
    fn test_chain_falls_through_to_working_backend() {
        let broken = Arc::new(MockVideoDecoder::with_name("broken"));
        let working = Arc::new(MockVideoDecoder::with_name("working"));
        working.insert("/videos/a.mp4", frames(3), 30.0);

        let chain = DecoderChain::new(vec![broken, working]);
        let mut stream = chain.open(Path::new("/videos/a.mp4")).unwrap();
        assert_eq!(stream.info().frame_count, 3);
        assert!(stream.next_frame().unwrap().is_some());
    }

    #[test]
    fn test_chain_reports_last_error() {
        let chain = DecoderChain::new(vec![Arc::new(MockVideoDecoder::new())]);
        assert!(matches!(
            chain.open(Path::new("/videos/missing.mp4")),
            Err(CurationError::VideoOpen { .. })
        ));
    }

    #[test]
    fn test_unknown_backend_name() {
        assert!(DecoderChain::from_names(&["vhs".to_string()]).is_err());
        let chain =
            DecoderChain::from_names(&["ffmpeg".to_string(), "transcode".to_string()]).unwrap();
        assert_eq!(chain.backends().len(), 2);
    }

    #[test]
    fn test_frame_at() {
        let decoder = MockVideoDecoder::new();
        decoder.insert("/videos/b.mp4", frames(5), 30.0);
        let mut stream = decoder.open(Path::new("/videos/b.mp4")).unwrap();
        let frame = frame_at(stream.as_mut(), 3).unwrap().unwrap();
        assert_eq!(frame.get_pixel(0, 0)[0], 3);

        let mut stream = decoder.open(Path::new("/videos/b.mp4")).unwrap();
        assert!(frame_at(stream.as_mut(), 9).unwrap().is_none());
    }
}
