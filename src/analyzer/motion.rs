use super::flow::{FlowEstimator, FlowFrame};
use crate::config::MotionConfig;
use crate::error::{CurationError, Result};
use crate::video::VideoDecoder;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of a completed static-camera analysis
#[derive(Debug, Clone, Serialize)]
pub struct MotionReport {
    pub total_frames: u64,
    pub stride: u64,
    /// Source indices of the frames that were compared
    pub sampled_frames: Vec<u64>,
    pub pair_magnitudes: Vec<f64>,
    pub average_magnitude: f64,
    pub is_static: bool,
}

/// `(is_static, average_magnitude)` as seen by callers; never an error
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StaticVerdict {
    pub is_static: bool,
    pub average_magnitude: f64,
}

impl StaticVerdict {
    /// Verdict for a video that could not be analysed
    pub fn moving() -> Self {
        Self {
            is_static: false,
            average_magnitude: f64::INFINITY,
        }
    }
}

/// Classifies a whole video as static- or moving-camera from dense optical flow
/// between uniformly spaced frames.
#[derive(Clone)]
pub struct MotionAnalyzer {
    config: MotionConfig,
    decoder: Arc<dyn VideoDecoder>,
    estimator: FlowEstimator,
}

impl MotionAnalyzer {
    pub fn new(config: MotionConfig, decoder: Arc<dyn VideoDecoder>) -> Self {
        let estimator = FlowEstimator::new(&config);
        Self {
            config,
            decoder,
            estimator,
        }
    }

    pub fn config(&self) -> &MotionConfig {
        &self.config
    }

    /// Full analysis; errors when the video cannot be opened or read
    pub fn analyze(&self, path: &Path) -> Result<MotionReport> {
        let mut stream = self.decoder.open(path)?;
        let total = stream.info().frame_count;
        if total < 2 {
            return Err(CurationError::InsufficientFrames { frames: total });
        }

        let stride = (total / self.config.sample_count.max(1) as u64).max(1);
        debug!(
            "Motion analysis of {}: {} frames, stride {}",
            path.display(),
            total,
            stride
        );

        let mut sampled: Vec<(u64, FlowFrame)> = Vec::new();
        let mut last_unsampled: Option<(u64, FlowFrame)> = None;
        let mut index = 0u64;
        while let Some(frame) = stream.next_frame()? {
            if index % stride == 0 {
                sampled.push((index, self.estimator.prepare(&frame)));
                last_unsampled = None;
            } else if index + 1 >= total {
                last_unsampled = Some((index, self.estimator.prepare(&frame)));
            }
            index += 1;
        }

        if sampled.is_empty() {
            return Err(CurationError::decode(format!(
                "first frame of {} could not be read",
                path.display()
            )));
        }

        // A single stride covering the whole video still needs a second frame
        if sampled.len() < 2 {
            if let Some(last) = last_unsampled {
                sampled.push(last);
            }
        }
        if sampled.len() < 2 {
            return Err(CurationError::InsufficientFrames { frames: index });
        }

        let mut pair_magnitudes = Vec::with_capacity(sampled.len() - 1);
        for pair in sampled.windows(2) {
            pair_magnitudes.push(self.estimator.mean_magnitude(&pair[0].1, &pair[1].1)?);
        }

        let average_magnitude =
            pair_magnitudes.iter().sum::<f64>() / pair_magnitudes.len() as f64;
        let is_static = average_magnitude < self.config.threshold;

        info!(
            "{}: average flow {:.3} over {} pair(s), threshold {:.3} -> {}",
            path.display(),
            average_magnitude,
            pair_magnitudes.len(),
            self.config.threshold,
            if is_static { "static" } else { "moving" }
        );

        Ok(MotionReport {
            total_frames: total,
            stride,
            sampled_frames: sampled.iter().map(|(i, _)| *i).collect(),
            pair_magnitudes,
            average_magnitude,
            is_static,
        })
    }

    /// Fail-closed classification: any analysis failure reads as a moving camera
    pub fn is_static(&self, path: &Path) -> StaticVerdict {
        match self.analyze(path) {
            Ok(report) => StaticVerdict {
                is_static: report.is_static,
                average_magnitude: report.average_magnitude,
            },
            Err(e) => {
                warn!("Motion analysis failed for {}: {}", path.display(), e);
                StaticVerdict::moving()
            }
        }
    }

    /// [`Self::is_static`] on the blocking thread pool
    pub async fn check(&self, path: PathBuf) -> StaticVerdict {
        let analyzer = self.clone();
        match tokio::task::spawn_blocking(move || analyzer.is_static(&path)).await {
            Ok(verdict) => verdict,
            Err(e) => {
                warn!("Motion analysis task failed: {}", e);
                StaticVerdict::moving()
            }
        }
    }
}
