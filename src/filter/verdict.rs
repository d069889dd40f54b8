use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Accept/reject decision for one candidate, persisted as a side-car
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterVerdict {
    pub video_path: PathBuf,
    pub total_frames: u64,
    pub checked_frames: u64,
    pub hand_detected_frames: u64,
    pub object_detected_frames: u64,
    pub static_camera_frames: u64,
    pub hand_ratio: f64,
    pub object_ratio: f64,
    pub static_ratio: f64,
    /// Mean per-pair flow; infinite (serialized as null) when nothing was compared
    pub average_flow_magnitude: f64,
    pub early_stopped: bool,
    pub passed: bool,
    pub reasons: Vec<String>,
    pub synthetic_passthrough: bool,
    pub detector_errors: u64,
    pub flow_errors: u64,
    pub evaluated_at: DateTime<Utc>,
}

impl FilterVerdict {
    /// Verdict for a candidate that could not be evaluated at all
    pub fn unreadable(video: &Path, details: &str) -> Self {
        Self {
            reasons: vec![format!("video could not be read: {}", details)],
            ..Self::empty(video)
        }
    }

    /// Auto-pass verdict from the synthetic-video hook
    pub fn synthetic(video: &Path, total_frames: u64) -> Self {
        Self {
            total_frames,
            hand_ratio: 1.0,
            object_ratio: 1.0,
            static_ratio: 1.0,
            average_flow_magnitude: 0.0,
            passed: true,
            synthetic_passthrough: true,
            ..Self::empty(video)
        }
    }

    fn empty(video: &Path) -> Self {
        Self {
            video_path: video.to_path_buf(),
            total_frames: 0,
            checked_frames: 0,
            hand_detected_frames: 0,
            object_detected_frames: 0,
            static_camera_frames: 0,
            hand_ratio: 0.0,
            object_ratio: 0.0,
            static_ratio: 0.0,
            average_flow_magnitude: f64::INFINITY,
            early_stopped: false,
            passed: false,
            reasons: Vec::new(),
            synthetic_passthrough: false,
            detector_errors: 0,
            flow_errors: 0,
            evaluated_at: Utc::now(),
        }
    }

    /// One-line score snapshot for logs
    pub fn score_summary(&self) -> String {
        format!(
            "hand={:.2} object={:.2} static={:.2} flow={:.3} checked={}",
            self.hand_ratio,
            self.object_ratio,
            self.static_ratio,
            self.average_flow_magnitude,
            self.checked_frames
        )
    }
}

/// Running counts over sampled frames
#[derive(Debug, Default, Clone)]
pub(crate) struct Tally {
    pub checked: u64,
    pub hand: u64,
    pub object: u64,
    pub stationary: u64,
    pub flow_values: Vec<f64>,
    pub detector_errors: u64,
    pub flow_errors: u64,
}

impl Tally {
    fn ratio(&self, count: u64) -> f64 {
        if self.checked == 0 {
            0.0
        } else {
            count as f64 / self.checked as f64
        }
    }

    /// Apply the pass condition, listing every violated criterion
    pub fn into_verdict(
        self,
        video: &Path,
        total_frames: u64,
        min_frame_ratio: f64,
        early_stopped: bool,
        early_stop_frames: u32,
    ) -> FilterVerdict {
        let hand_ratio = self.ratio(self.hand);
        let object_ratio = self.ratio(self.object);
        let static_ratio = self.ratio(self.stationary);
        let average_flow_magnitude = if self.flow_values.is_empty() {
            f64::INFINITY
        } else {
            self.flow_values.iter().sum::<f64>() / self.flow_values.len() as f64
        };

        let mut reasons = Vec::new();
        if self.checked == 0 {
            reasons.push("no frames sampled".to_string());
        }
        if hand_ratio < min_frame_ratio {
            reasons.push(format!(
                "hand detection ratio too low: {:.2} < {}",
                hand_ratio, min_frame_ratio
            ));
        }
        if object_ratio < min_frame_ratio {
            reasons.push(format!(
                "object detection ratio too low: {:.2} < {}",
                object_ratio, min_frame_ratio
            ));
        }
        if static_ratio < min_frame_ratio {
            reasons.push(format!(
                "static camera ratio too low: {:.2} < {}",
                static_ratio, min_frame_ratio
            ));
        }
        if early_stopped {
            reasons.push(format!(
                "early stop: no hand or target object in the first {} sampled frames",
                early_stop_frames
            ));
        }

        FilterVerdict {
            video_path: video.to_path_buf(),
            total_frames,
            checked_frames: self.checked,
            hand_detected_frames: self.hand,
            object_detected_frames: self.object,
            static_camera_frames: self.stationary,
            hand_ratio,
            object_ratio,
            static_ratio,
            average_flow_magnitude,
            early_stopped,
            passed: reasons.is_empty(),
            reasons,
            synthetic_passthrough: false,
            detector_errors: self.detector_errors,
            flow_errors: self.flow_errors,
            evaluated_at: Utc::now(),
        }
    }
}
