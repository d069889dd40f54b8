//! Test hook recognising placeholder videos from the mock generator.
//!
//! Mock output draws saturated red or blue boxes around a centred object. The
//! signature is approximate: real footage with large saturated regions can
//! match it, so the hook is only consulted when explicitly enabled.

use crate::error::Result;
use crate::video::{frame_at, FrameStream};
use image::RgbImage;

const SATURATED: u8 = 200;
const MIN_SATURATED_SHARE: f64 = 0.01;
const MIN_CENTER_PIXELS: usize = 100;
const MIN_FRAMES: u64 = 6;

fn saturated(pixel: &image::Rgb<u8>) -> bool {
    pixel[0] > SATURATED || pixel[2] > SATURATED
}

/// Whether a single frame carries the placeholder signature
pub fn signature_matches(frame: &RgbImage) -> bool {
    let (width, height) = frame.dimensions();
    if width == 0 || height == 0 {
        return false;
    }

    let total = frame.pixels().filter(|p| saturated(p)).count();
    if (total as f64) <= (width as f64 * height as f64 * MIN_SATURATED_SHARE) {
        return false;
    }

    let (x0, x1) = (width / 3, width * 2 / 3);
    let (y0, y1) = (height / 3, height * 2 / 3);
    let mut center = 0usize;
    for y in y0..y1 {
        for x in x0..x1 {
            if saturated(frame.get_pixel(x, y)) {
                center += 1;
            }
        }
    }
    center > MIN_CENTER_PIXELS
}

/// Inspect the middle frame of an opened stream
pub fn is_synthetic(stream: &mut dyn FrameStream) -> Result<bool> {
    let total = stream.info().frame_count;
    if total < MIN_FRAMES {
        return Ok(false);
    }
    Ok(frame_at(stream, total / 2)?
        .map(|frame| signature_matches(&frame))
        .unwrap_or(false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn placeholder_frame() -> RgbImage {
        RgbImage::from_fn(60, 60, |x, y| {
            if (20..40).contains(&x) && (20..40).contains(&y) {
                Rgb([250, 10, 10])
            } else {
                Rgb([40, 40, 40])
            }
        })
    }

    #[test]
    fn test_placeholder_signature() {
        assert!(signature_matches(&placeholder_frame()));
        assert!(!signature_matches(&RgbImage::from_pixel(60, 60, Rgb([40, 90, 40]))));
    }

    #[test]
    fn test_saturation_outside_center_is_not_enough() {
        let frame = RgbImage::from_fn(60, 60, |x, _| {
            if x < 10 {
                Rgb([10, 10, 250])
            } else {
                Rgb([0, 0, 0])
            }
        });
        assert!(!signature_matches(&frame));
    }
}
