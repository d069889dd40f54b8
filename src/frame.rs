use image::{imageops, GrayImage, RgbImage};
use serde::{Deserialize, Serialize};

/// Container-level properties of a candidate video
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
    /// Frame count reported by the container (0 when unknown)
    pub frame_count: u64,
    /// Native frame rate
    pub fps: f64,
    pub width: u32,
    pub height: u32,
}

impl VideoInfo {
    pub fn new(frame_count: u64, fps: f64, width: u32, height: u32) -> Self {
        Self {
            frame_count,
            fps,
            width,
            height,
        }
    }

    /// Duration in seconds, 0 when the frame rate is unknown
    pub fn duration_seconds(&self) -> f64 {
        if self.fps > 0.0 {
            self.frame_count as f64 / self.fps
        } else {
            0.0
        }
    }
}

/// Naming scheme for the frames of a normalized sequence (`frame_000042.png`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameNaming {
    pub prefix: String,
    pub width: usize,
}

impl FrameNaming {
    pub const EXTENSION: &'static str = "png";

    pub fn new<S: Into<String>>(prefix: S, width: usize) -> Self {
        Self {
            prefix: prefix.into(),
            width,
        }
    }

    pub fn file_name(&self, index: usize) -> String {
        format!(
            "{}{:0width$}.{}",
            self.prefix,
            index,
            Self::EXTENSION,
            width = self.width
        )
    }

    /// Parse a file name produced by this scheme back into its index
    pub fn parse(&self, name: &str) -> Option<usize> {
        let digits = name
            .strip_prefix(self.prefix.as_str())?
            .strip_suffix(Self::EXTENSION)?
            .strip_suffix('.')?;
        if digits.len() != self.width || !digits.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()
    }

    /// Any frame-like file from this or an earlier attempt, regardless of width
    pub fn matches_loosely(&self, name: &str) -> bool {
        name.strip_prefix(self.prefix.as_str())
            .and_then(|rest| rest.strip_suffix(Self::EXTENSION))
            .and_then(|rest| rest.strip_suffix('.'))
            .map(|digits| !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()))
            .unwrap_or(false)
    }
}

/// Convert an RGB frame to single-channel intensity (BT.601 weights)
pub fn to_gray(frame: &RgbImage) -> GrayImage {
    let mut gray = GrayImage::new(frame.width(), frame.height());
    for (x, y, rgb) in frame.enumerate_pixels() {
        let value = 0.299 * rgb[0] as f32 + 0.587 * rgb[1] as f32 + 0.114 * rgb[2] as f32;
        gray.put_pixel(x, y, image::Luma([value.round().min(255.0) as u8]));
    }
    gray
}

/// Downscale so the width does not exceed `max_width`; returns the image and
/// the factor that maps downscaled pixel distances back to source pixels.
pub fn downscale_for_analysis(gray: &GrayImage, max_width: u32) -> (GrayImage, f64) {
    let (width, height) = gray.dimensions();
    if max_width == 0 || width <= max_width {
        return (gray.clone(), 1.0);
    }

    let scale = width as f64 / max_width as f64;
    let new_height = ((height as f64 / scale).round() as u32).max(1);
    let resized = imageops::resize(gray, max_width, new_height, imageops::FilterType::Triangle);
    (resized, scale)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_frame_naming_round_trip() {
        let naming = FrameNaming::new("frame_", 6);
        assert_eq!(naming.file_name(0), "frame_000000.png");
        assert_eq!(naming.file_name(149), "frame_000149.png");
        assert_eq!(naming.parse("frame_000149.png"), Some(149));
        assert_eq!(naming.parse("frame_00149.png"), None);
        assert_eq!(naming.parse("frame_000149.jpg"), None);
        assert_eq!(naming.parse("depth_000000.png"), None);
    }

    #[test]
    fn test_loose_match_covers_other_widths() {
        let naming = FrameNaming::new("frame_", 6);
        assert!(naming.matches_loosely("frame_00001.png"));
        assert!(naming.matches_loosely("frame_000001.png"));
        assert!(!naming.matches_loosely("frame_.png"));
        assert!(!naming.matches_loosely("cam_K.txt"));
    }

    #[test]
    fn test_to_gray_weights() {
        let frame = RgbImage::from_pixel(2, 2, Rgb([255, 255, 255]));
        let gray = to_gray(&frame);
        assert_eq!(gray.get_pixel(1, 1)[0], 255);

        let frame = RgbImage::from_pixel(1, 1, Rgb([0, 0, 0]));
        assert_eq!(to_gray(&frame).get_pixel(0, 0)[0], 0);
    }

    #[test]
    fn test_downscale_for_analysis() {
        let gray = GrayImage::new(640, 480);
        let (small, scale) = downscale_for_analysis(&gray, 320);
        assert_eq!(small.dimensions(), (320, 240));
        assert!((scale - 2.0).abs() < 1e-9);

        let (same, scale) = downscale_for_analysis(&gray, 1024);
        assert_eq!(same.dimensions(), (640, 480));
        assert_eq!(scale, 1.0);
    }

    #[test]
    fn test_video_info_duration() {
        assert_eq!(VideoInfo::new(150, 30.0, 64, 64).duration_seconds(), 5.0);
        assert_eq!(VideoInfo::new(150, 0.0, 64, 64).duration_seconds(), 0.0);
    }
}
