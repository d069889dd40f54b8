//! Hand/object detection behind a fixed capability interface.

mod command;
mod mock;

pub use command::{CommandDetector, DetectionOutput, HandDetection, ObjectDetection};
pub use mock::MarkerDetector;

use crate::error::Result;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// COCO class ids for the objects the generator is asked to show
const COCO_CLASSES: &[(u32, &str)] = &[
    (39, "bottle"),
    (41, "cup"),
    (42, "fork"),
    (43, "knife"),
    (44, "spoon"),
    (45, "bowl"),
    (47, "apple"),
    (49, "orange"),
    (51, "carrot"),
    (52, "broccoli"),
    (65, "bed"),
    (67, "dining table"),
    (70, "toilet"),
    (73, "laptop"),
    (74, "mouse"),
    (75, "remote"),
    (76, "keyboard"),
    (77, "cell phone"),
];

/// Object a candidate video must show
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TargetClass {
    Id(u32),
    Name(String),
}

impl TargetClass {
    pub fn class_id(&self) -> Option<u32> {
        match self {
            TargetClass::Id(id) => Some(*id),
            TargetClass::Name(name) => {
                let name = normalize_name(name);
                COCO_CLASSES
                    .iter()
                    .find(|(_, n)| *n == name)
                    .map(|(id, _)| *id)
            }
        }
    }

    pub fn class_name(&self) -> Option<String> {
        match self {
            TargetClass::Name(name) => Some(normalize_name(name)),
            TargetClass::Id(id) => COCO_CLASSES
                .iter()
                .find(|(i, _)| i == id)
                .map(|(_, n)| n.to_string()),
        }
    }

    /// Whether a detection labelled with `class_id` and/or `name` is this class
    pub fn matches(&self, class_id: Option<u32>, name: Option<&str>) -> bool {
        if let (Some(wanted), Some(got)) = (self.class_id(), class_id) {
            if wanted == got {
                return true;
            }
        }
        if let (Some(wanted), Some(got)) = (self.class_name(), name) {
            if wanted == normalize_name(got) {
                return true;
            }
        }
        false
    }
}

fn normalize_name(name: &str) -> String {
    name.trim().replace('_', " ").to_lowercase()
}

impl FromStr for TargetClass {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let trimmed = s.trim();
        if !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_digit()) {
            if let Ok(id) = trimmed.parse() {
                return Ok(TargetClass::Id(id));
            }
        }
        Ok(TargetClass::Name(trimmed.to_string()))
    }
}

impl fmt::Display for TargetClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetClass::Id(id) => write!(f, "{}", id),
            TargetClass::Name(name) => write!(f, "{}", name),
        }
    }
}

/// Per-frame presence predicates consumed by the content filter
pub trait Detector: Send + Sync {
    fn name(&self) -> &str;

    fn detect_hand(&self, frame: &RgbImage) -> Result<bool>;

    /// `None` target means any detected object counts
    fn detect_object(&self, frame: &RgbImage, target: Option<&TargetClass>) -> Result<bool>;
}
