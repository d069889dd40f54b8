//! `ffprobe` metadata and an `ffmpeg` raw-frame pipe decoder.

use super::{FrameStream, VideoDecoder};
use crate::error::{CurationError, Result};
use crate::frame::VideoInfo;
use image::RgbImage;
use serde::Deserialize;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};
use tracing::{debug, warn};

/// Top-level ffprobe JSON output (`-print_format json -show_format -show_streams`)
#[derive(Debug, Deserialize)]
pub struct FfprobeOutput {
    #[serde(default)]
    pub streams: Vec<FfprobeStream>,
    #[serde(default)]
    pub format: FfprobeFormat,
}

#[derive(Debug, Deserialize)]
pub struct FfprobeStream {
    pub codec_type: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// e.g. "30/1" or "24000/1001"
    pub r_frame_rate: Option<String>,
    pub avg_frame_rate: Option<String>,
    pub duration: Option<String>,
    pub nb_frames: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FfprobeFormat {
    pub duration: Option<String>,
}

impl FfprobeOutput {
    fn video_stream(&self) -> Option<&FfprobeStream> {
        self.streams
            .iter()
            .find(|s| s.codec_type.as_deref() == Some("video"))
    }

    pub fn duration(&self) -> f64 {
        let format = self.format.duration.as_deref().and_then(|d| d.parse().ok());
        let stream = self
            .video_stream()
            .and_then(|s| s.duration.as_deref())
            .and_then(|d| d.parse().ok());
        format.or(stream).unwrap_or(0.0)
    }

    /// Prefers `avg_frame_rate` (the playback rate) over the container's base rate
    pub fn frame_rate(&self) -> f64 {
        let Some(stream) = self.video_stream() else {
            return 0.0;
        };
        [stream.avg_frame_rate.as_deref(), stream.r_frame_rate.as_deref()]
            .into_iter()
            .flatten()
            .map(parse_fraction)
            .find(|fps| *fps > 0.0)
            .unwrap_or(0.0)
    }

    /// Count from `nb_frames`, else estimated from duration and frame rate
    pub fn frame_count(&self) -> u64 {
        if let Some(n) = self
            .video_stream()
            .and_then(|s| s.nb_frames.as_deref())
            .and_then(|nb| nb.parse::<u64>().ok())
        {
            return n;
        }
        let duration = self.duration();
        let fps = self.frame_rate();
        if duration > 0.0 && fps > 0.0 {
            return (duration * fps).round() as u64;
        }
        0
    }

    pub fn resolution(&self) -> (u32, u32) {
        self.video_stream()
            .map(|s| (s.width.unwrap_or(0), s.height.unwrap_or(0)))
            .unwrap_or((0, 0))
    }

    pub fn video_info(&self) -> VideoInfo {
        let (width, height) = self.resolution();
        VideoInfo::new(self.frame_count(), self.frame_rate(), width, height)
    }
}

/// Parse a fraction string like `"30/1"` into a float
pub fn parse_fraction(s: &str) -> f64 {
    if let Some((num, den)) = s.split_once('/') {
        let num = num.trim().parse::<f64>().unwrap_or(0.0);
        let den = den.trim().parse::<f64>().unwrap_or(0.0);
        return if den > 0.0 { num / den } else { 0.0 };
    }
    s.trim().parse::<f64>().unwrap_or(0.0)
}

/// Run `ffprobe` on a video file and return the parsed JSON output
pub fn probe_video(path: &Path) -> Result<FfprobeOutput> {
    probe_video_with(Path::new("ffprobe"), path)
}

/// [`probe_video`] with an explicit `ffprobe` executable
pub fn probe_video_with(program: &Path, path: &Path) -> Result<FfprobeOutput> {
    if !path.exists() {
        return Err(CurationError::VideoOpen {
            path: path.to_path_buf(),
            details: "file not found".to_string(),
        });
    }

    let output = Command::new(program)
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .output()
        .map_err(|e| CurationError::VideoOpen {
            path: path.to_path_buf(),
            details: format!("failed to run {}: {}", program.display(), e),
        })?;

    if !output.status.success() {
        return Err(CurationError::VideoOpen {
            path: path.to_path_buf(),
            details: format!(
                "ffprobe exited with {:?}: {}",
                output.status.code(),
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        });
    }

    let probe: FfprobeOutput = serde_json::from_slice(&output.stdout)?;
    if probe.video_stream().is_none() {
        return Err(CurationError::VideoOpen {
            path: path.to_path_buf(),
            details: "no video stream".to_string(),
        });
    }
    Ok(probe)
}

/// Decodes by piping `rgb24` raw frames out of an `ffmpeg` child process
#[derive(Debug, Clone)]
pub struct FfmpegPipeDecoder {
    program: PathBuf,
    probe_program: PathBuf,
}

impl FfmpegPipeDecoder {
    pub fn new() -> Self {
        Self::with_programs("ffmpeg", "ffprobe")
    }

    pub fn with_program<P: Into<PathBuf>>(program: P) -> Self {
        Self::with_programs(program, "ffprobe")
    }

    pub fn with_programs<P: Into<PathBuf>, Q: Into<PathBuf>>(program: P, probe_program: Q) -> Self {
        Self {
            program: program.into(),
            probe_program: probe_program.into(),
        }
    }
}

impl Default for FfmpegPipeDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl VideoDecoder for FfmpegPipeDecoder {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    fn open(&self, path: &Path) -> Result<Box<dyn FrameStream>> {
        let info = probe_video_with(&self.probe_program, path)?.video_info();
        if info.width == 0 || info.height == 0 {
            return Err(CurationError::VideoOpen {
                path: path.to_path_buf(),
                details: "unknown frame dimensions".to_string(),
            });
        }

        let mut child = Command::new(&self.program)
            // Frame size must stay the coded size reported by ffprobe
            .args(["-v", "error", "-nostdin", "-noautorotate", "-i"])
            .arg(path)
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24", "-vsync", "0", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| CurationError::VideoOpen {
                path: path.to_path_buf(),
                details: format!("failed to spawn {}: {}", self.program.display(), e),
            })?;

        let stdout = child.stdout.take().ok_or_else(|| CurationError::VideoOpen {
            path: path.to_path_buf(),
            details: "ffmpeg stdout unavailable".to_string(),
        })?;

        debug!(
            "ffmpeg pipe opened for {} ({}x{} @ {:.3} fps, ~{} frames)",
            path.display(),
            info.width,
            info.height,
            info.fps,
            info.frame_count
        );

        Ok(Box::new(FfmpegFrameStream {
            info,
            child,
            stdout,
            frame_bytes: info.width as usize * info.height as usize * 3,
            decoded: 0,
            finished: false,
        }))
    }
}

struct FfmpegFrameStream {
    info: VideoInfo,
    child: Child,
    stdout: ChildStdout,
    frame_bytes: usize,
    decoded: u64,
    finished: bool,
}

impl FfmpegFrameStream {
    /// Fill `buf` completely; returns the number of bytes read before EOF
    fn fill(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.stdout.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(filled)
    }

    fn finish(&mut self) -> Result<()> {
        self.finished = true;
        let status = self.child.wait()?;
        if !status.success() {
            return Err(CurationError::decode(format!(
                "ffmpeg exited with {:?} after {} frame(s)",
                status.code(),
                self.decoded
            )));
        }
        Ok(())
    }
}

impl FrameStream for FfmpegFrameStream {
    fn info(&self) -> VideoInfo {
        self.info
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        if self.finished {
            return Ok(None);
        }

        let mut buf = vec![0u8; self.frame_bytes];
        let filled = self.fill(&mut buf)?;
        if filled < self.frame_bytes {
            if filled > 0 {
                warn!(
                    "Discarding truncated trailing frame ({} of {} bytes)",
                    filled, self.frame_bytes
                );
            }
            self.finish()?;
            return Ok(None);
        }

        self.decoded += 1;
        RgbImage::from_raw(self.info.width, self.info.height, buf)
            .map(Some)
            .ok_or_else(|| CurationError::decode("raw frame buffer has wrong size"))
    }
}

impl Drop for FfmpegFrameStream {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}
