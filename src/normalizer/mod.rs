//! Turns an accepted video into an exact fixed-length, zero-padded PNG sequence.

mod plan;

pub use plan::ResamplePlan;

use crate::config::NormalizeConfig;
use crate::error::{CurationError, Result};
use crate::frame::FrameNaming;
use crate::video::{DecoderChain, VideoDecoder};
use image::{ImageFormat, RgbImage};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct FrameNormalizer {
    config: NormalizeConfig,
    decoders: DecoderChain,
    naming: FrameNaming,
}

impl FrameNormalizer {
    pub fn new(config: NormalizeConfig, decoders: DecoderChain) -> Self {
        let naming = FrameNaming::new(config.frame_prefix.clone(), config.index_width as usize);
        Self {
            config,
            decoders,
            naming,
        }
    }

    pub fn target_length(&self) -> usize {
        self.config.target_length()
    }

    pub fn naming(&self) -> &FrameNaming {
        &self.naming
    }

    /// Write exactly `target_length` frames into `output_dir`
    ///
    /// Backends are tried in order; output from a failed attempt is purged
    /// before the next one starts, and on final failure.
    pub fn normalize_blocking(&self, video: &Path, output_dir: &Path) -> Result<usize> {
        std::fs::create_dir_all(output_dir)?;

        let mut last_error = None;
        for backend in self.decoders.backends() {
            purge_frames(output_dir, &self.naming)?;
            match self.normalize_with(backend.as_ref(), video, output_dir) {
                Ok(count) => {
                    info!(
                        "Normalized {} into {} frames with {} backend",
                        video.display(),
                        count,
                        backend.name()
                    );
                    return Ok(count);
                }
                // Neither an empty video nor a bad sequence improves with another backend
                Err(e @ (CurationError::EmptyVideo { .. }
                | CurationError::FrameCountMismatch { .. })) => {
                    purge_frames(output_dir, &self.naming)?;
                    return Err(e);
                }
                Err(e) => {
                    warn!(
                        "Backend {} failed to normalize {}: {}",
                        backend.name(),
                        video.display(),
                        e
                    );
                    last_error = Some(e);
                }
            }
        }

        purge_frames(output_dir, &self.naming)?;
        Err(last_error.unwrap_or_else(|| CurationError::VideoOpen {
            path: video.to_path_buf(),
            details: "no decoder backends configured".to_string(),
        }))
    }

    /// [`Self::normalize_blocking`] on the blocking thread pool
    pub async fn normalize(&self, video: &Path, output_dir: &Path) -> Result<usize> {
        let normalizer = self.clone();
        let video = video.to_path_buf();
        let output_dir = output_dir.to_path_buf();
        tokio::task::spawn_blocking(move || normalizer.normalize_blocking(&video, &output_dir))
            .await
            .map_err(|e| CurationError::component("normalizer".to_string(), e.to_string()))?
    }

    fn normalize_with(
        &self,
        backend: &dyn VideoDecoder,
        video: &Path,
        output_dir: &Path,
    ) -> Result<usize> {
        let target_length = self.target_length();
        let mut stream = backend.open(video)?;
        let info = stream.info();
        let plan = ResamplePlan::new(
            info.fps,
            self.config.target_fps,
            self.config.fps_tolerance,
            target_length,
        );
        debug!(
            "{}: {} frames at {:.3} fps, step {:.4} -> {} frames",
            video.display(),
            info.frame_count,
            info.fps,
            plan.step,
            target_length
        );

        let mut written = 0usize;
        let mut last: Option<RgbImage> = None;
        let mut index = 0u64;
        while written < target_length {
            let Some(frame) = stream.next_frame()? else {
                break;
            };
            while written < target_length && plan.source_index(written) == index {
                self.write_frame(output_dir, written, &frame)?;
                written += 1;
            }
            last = Some(frame);
            index += 1;
        }

        let last = last.ok_or_else(|| CurationError::EmptyVideo {
            path: video.to_path_buf(),
        })?;

        if written < target_length {
            debug!(
                "Padding {} with {} copies of the last decoded frame",
                video.display(),
                target_length - written
            );
        }
        while written < target_length {
            self.write_frame(output_dir, written, &last)?;
            written += 1;
        }

        verify_output(output_dir, &self.naming, target_length)?;
        Ok(written)
    }

    fn write_frame(&self, output_dir: &Path, index: usize, frame: &RgbImage) -> Result<()> {
        let path = output_dir.join(self.naming.file_name(index));
        frame.save_with_format(&path, ImageFormat::Png)?;
        Ok(())
    }
}

/// Remove frame files left by an earlier attempt, whatever their index width
pub fn purge_frames(dir: &Path, naming: &FrameNaming) -> Result<usize> {
    if !dir.exists() {
        return Ok(0);
    }
    let mut removed = 0;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        if naming.matches_loosely(&name.to_string_lossy()) && entry.file_type()?.is_file() {
            std::fs::remove_file(entry.path())?;
            removed += 1;
        }
    }
    if removed > 0 {
        debug!("Purged {} stale frame file(s) from {}", removed, dir.display());
    }
    Ok(removed)
}

/// Check that `dir` holds exactly the expected frame names and nothing else
pub fn verify_output(dir: &Path, naming: &FrameNaming, target_length: usize) -> Result<()> {
    let found: BTreeSet<String> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().to_string())
        .collect();
    let expected: BTreeSet<String> = (0..target_length).map(|i| naming.file_name(i)).collect();

    if found != expected {
        return Err(CurationError::FrameCountMismatch {
            dir: dir.to_path_buf(),
            expected: target_length,
            found: found.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests;
