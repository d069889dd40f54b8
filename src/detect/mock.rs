use super::{Detector, TargetClass};
use crate::error::{CurationError, Result};
use image::{Rgb, RgbImage};
use std::sync::atomic::{AtomicU64, Ordering};

/// Test detector reading presence markers from pixel (0, 0)
///
/// Red 255 marks a hand, green 255 an object. A non-zero blue channel carries
/// the object's class id; zero means the object matches any target.
#[derive(Debug, Default)]
pub struct MarkerDetector {
    fail: bool,
    calls: AtomicU64,
}

impl MarkerDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every query errors, as a crashed model would
    pub fn failing() -> Self {
        Self {
            fail: true,
            calls: AtomicU64::new(0),
        }
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    /// Paint markers into `frame`
    pub fn mark(frame: &mut RgbImage, hand: bool, object: Option<u8>) {
        let marker = Rgb([
            if hand { 255 } else { 0 },
            if object.is_some() { 255 } else { 0 },
            object.unwrap_or(0),
        ]);
        frame.put_pixel(0, 0, marker);
    }

    fn marker(&self, frame: &RgbImage) -> Result<Rgb<u8>> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if self.fail {
            return Err(CurationError::detector("marker", "scripted failure"));
        }
        if frame.width() == 0 || frame.height() == 0 {
            return Err(CurationError::detector("marker", "empty frame"));
        }
        Ok(*frame.get_pixel(0, 0))
    }
}

impl Detector for MarkerDetector {
    fn name(&self) -> &str {
        "marker"
    }

    fn detect_hand(&self, frame: &RgbImage) -> Result<bool> {
        Ok(self.marker(frame)?[0] == 255)
    }

    fn detect_object(&self, frame: &RgbImage, target: Option<&TargetClass>) -> Result<bool> {
        let marker = self.marker(frame)?;
        if marker[1] != 255 {
            return Ok(false);
        }
        Ok(match (target, marker[2]) {
            (None, _) | (_, 0) => true,
            (Some(target), class_id) => target.matches(Some(class_id as u32), None),
        })
    }
}
