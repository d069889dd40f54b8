/// How source frames map onto the fixed-length output sequence
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResamplePlan {
    pub source_fps: f64,
    pub target_fps: f64,
    /// Source frames advanced per output frame; 1.0 when not resampling
    pub step: f64,
    pub target_length: usize,
}

impl ResamplePlan {
    /// Resample only when the rates differ by more than `tolerance`; an unknown
    /// source rate is taken as already matching.
    pub fn new(source_fps: f64, target_fps: f64, tolerance: f64, target_length: usize) -> Self {
        let step = if source_fps > 0.0 && (source_fps - target_fps).abs() > tolerance {
            source_fps / target_fps
        } else {
            1.0
        };
        Self {
            source_fps,
            target_fps,
            step,
            target_length,
        }
    }

    pub fn is_resampling(&self) -> bool {
        self.step != 1.0
    }

    /// Source index feeding output `k`: `k * step` rounded half away from zero
    pub fn source_index(&self, k: usize) -> u64 {
        (k as f64 * self.step).round() as u64
    }
}
