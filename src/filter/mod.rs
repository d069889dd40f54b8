//! Rule filter: per-frame hand, object and static-camera predicates aggregated
//! into an accept/reject verdict with early stopping.

pub mod diagnostics;
pub mod synthetic;
mod verdict;

pub use verdict::FilterVerdict;

use crate::analyzer::{FlowEstimator, FlowFrame};
use crate::config::{FilterConfig, MotionConfig};
use crate::detect::{Detector, TargetClass};
use crate::error::{CurationError, Result};
use crate::video::VideoDecoder;
use image::RgbImage;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use verdict::Tally;

#[derive(Clone)]
pub struct ContentFilter {
    config: FilterConfig,
    decoder: Arc<dyn VideoDecoder>,
    detector: Arc<dyn Detector>,
    estimator: FlowEstimator,
    diagnostics_dir: Option<PathBuf>,
}

impl ContentFilter {
    pub fn new(
        config: FilterConfig,
        motion: &MotionConfig,
        decoder: Arc<dyn VideoDecoder>,
        detector: Arc<dyn Detector>,
    ) -> Self {
        Self {
            config,
            decoder,
            detector,
            estimator: FlowEstimator::new(motion),
            diagnostics_dir: None,
        }
    }

    pub fn with_diagnostics_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.diagnostics_dir = dir;
        self
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    /// Evaluate one candidate synchronously
    ///
    /// Errors only when the video cannot be opened or its first frame read;
    /// detector and flow failures count as the predicate not holding.
    pub fn evaluate(&self, video: &Path, target: Option<&TargetClass>) -> Result<FilterVerdict> {
        if self.config.synthetic_passthrough {
            let mut probe = self.decoder.open(video)?;
            let total = probe.info().frame_count;
            if synthetic::is_synthetic(probe.as_mut())? {
                info!(
                    "Synthetic placeholder video detected, auto-passing: {}",
                    video.display()
                );
                return Ok(FilterVerdict::synthetic(video, total));
            }
        }

        let mut stream = self.decoder.open(video)?;
        let total_frames = stream.info().frame_count;
        info!(
            "Filtering {}: {} frames at {:.2} fps",
            video.display(),
            total_frames,
            stream.info().fps
        );

        let first = stream.next_frame()?.ok_or_else(|| CurationError::EmptyVideo {
            path: video.to_path_buf(),
        })?;
        let mut prev = self.estimator.prepare(&first);

        let interval = self.config.sample_interval.max(1) as u64;
        let mut tally = Tally::default();
        let mut early_stopped = false;
        let mut index = 0u64;

        while let Some(frame) = stream.next_frame()? {
            index += 1;
            if index % interval != 0 {
                continue;
            }

            tally.checked += 1;
            let (hand, object) = self.detect(&frame, target, &mut tally);
            if hand {
                tally.hand += 1;
            }
            if object {
                tally.object += 1;
            }

            let current = self.estimator.prepare(&frame);
            if self.is_stationary(&prev, &current, &mut tally) {
                tally.stationary += 1;
            }
            prev = current;

            if tally.checked >= self.config.early_stop_frames as u64
                && (tally.hand == 0 || tally.object == 0)
            {
                info!(
                    "Early stop after {} sampled frames (hands {}, objects {})",
                    tally.checked, tally.hand, tally.object
                );
                early_stopped = true;
                break;
            }
        }

        let verdict = tally.into_verdict(
            video,
            total_frames,
            self.config.min_frame_ratio,
            early_stopped,
            self.config.early_stop_frames,
        );

        info!(
            "{} {}: {}",
            video.display(),
            if verdict.passed { "passed" } else { "rejected" },
            verdict.score_summary()
        );
        if !verdict.passed {
            info!("Rejection reasons: {}", verdict.reasons.join(", "));
        }
        Ok(verdict)
    }

    fn detect(&self, frame: &RgbImage, target: Option<&TargetClass>, tally: &mut Tally) -> (bool, bool) {
        let hand = self.detector.detect_hand(frame).unwrap_or_else(|e| {
            warn!("Hand detector failed: {}", e);
            tally.detector_errors += 1;
            false
        });
        let object = self
            .detector
            .detect_object(frame, target)
            .unwrap_or_else(|e| {
                warn!("Object detector failed: {}", e);
                tally.detector_errors += 1;
                false
            });
        (hand, object)
    }

    fn is_stationary(&self, prev: &FlowFrame, current: &FlowFrame, tally: &mut Tally) -> bool {
        match self.estimator.mean_magnitude(prev, current) {
            Ok(magnitude) => {
                debug!("Frame-to-frame flow {:.3}", magnitude);
                tally.flow_values.push(magnitude);
                magnitude < self.config.static_flow_threshold
            }
            Err(e) => {
                warn!("Flow computation failed: {}", e);
                tally.flow_errors += 1;
                false
            }
        }
    }

    /// Evaluate on the blocking pool and record diagnostics
    ///
    /// Never fails: an unreadable video becomes a rejection verdict.
    pub async fn filter(&self, video: &Path, target: Option<&TargetClass>) -> FilterVerdict {
        let filter = self.clone();
        let path = video.to_path_buf();
        let target = target.cloned();
        let evaluated =
            tokio::task::spawn_blocking(move || filter.evaluate(&path, target.as_ref())).await;

        let verdict = match evaluated {
            Ok(Ok(verdict)) => verdict,
            Ok(Err(e)) => {
                warn!("Could not filter {}: {}", video.display(), e);
                FilterVerdict::unreadable(video, &e.to_string())
            }
            Err(e) => {
                warn!("Filter task for {} failed: {}", video.display(), e);
                FilterVerdict::unreadable(video, &e.to_string())
            }
        };

        self.record(&verdict).await;
        verdict
    }

    async fn record(&self, verdict: &FilterVerdict) {
        if self.config.write_verdict {
            match diagnostics::write_side_car(verdict, self.diagnostics_dir.as_deref()).await {
                Ok(path) => debug!("Verdict written to {}", path.display()),
                Err(e) => warn!("Failed to write verdict side-car: {}", e),
            }
        }
        if self.config.failure_log && !verdict.passed {
            if let Err(e) = diagnostics::append_failure(verdict, &self.config.failure_log_name).await {
                warn!("Failed to append failure log: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests;
