pub mod analyzer;
pub mod config;
pub mod dataset;
pub mod detect;
pub mod error;
pub mod filter;
pub mod frame;
pub mod normalizer;
pub mod pipeline;
pub mod plausibility;
pub mod video;

pub use analyzer::{FlowEstimator, MotionAnalyzer, MotionReport, StaticVerdict};
pub use config::CurationConfig;
pub use dataset::{AuditReport, CameraIntrinsics, DatasetIndexer, Manifest, ManifestUpdate, SampleHandle};
pub use detect::{CommandDetector, Detector, MarkerDetector, TargetClass};
pub use error::{CurationError, Result};
pub use filter::{ContentFilter, FilterVerdict};
pub use frame::{FrameNaming, VideoInfo};
pub use normalizer::{FrameNormalizer, ResamplePlan};
pub use pipeline::{BatchReport, BatchRequest, CandidateOutcome, CandidateStatus, CurationPipeline};
pub use plausibility::{CommandScorer, FixedScorer, PlausibilityGate, PlausibilityScorer};
pub use video::{DecoderChain, FrameStream, MockVideoDecoder, VideoDecoder};
