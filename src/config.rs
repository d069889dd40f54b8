use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CurationConfig {
    pub paths: PathsConfig,
    pub motion: MotionConfig,
    pub filter: FilterConfig,
    pub normalize: NormalizeConfig,
    pub dataset: DatasetConfig,
    pub pipeline: PipelineConfig,
    pub detector: DetectorConfig,
    pub plausibility: PlausibilityConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PathsConfig {
    /// Directory scanned (recursively) for candidate videos
    #[serde(default = "default_candidate_dir")]
    pub candidate_dir: String,

    /// Scene capture directory holding the intrinsics and depth image
    #[serde(default = "default_capture_dir")]
    pub capture_dir: String,

    /// Dataset root containing gen_datas/, models/ and the manifest
    #[serde(default = "default_dataset_root")]
    pub dataset_root: String,

    /// Where verdict side-cars go; next to the candidate when unset
    pub diagnostics_dir: Option<String>,

    /// Candidate video extensions (case-insensitive, without the dot)
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct MotionConfig {
    /// Mean flow magnitude (source pixels) below which the camera is static
    #[serde(default = "default_motion_threshold")]
    pub threshold: f64,

    /// Number of frame pairs compared across the video
    #[serde(default = "default_motion_sample_count")]
    pub sample_count: u32,

    /// Frames wider than this are downscaled before flow estimation
    #[serde(default = "default_flow_max_width")]
    pub flow_max_width: u32,

    /// Pyramid levels for the dense flow estimator
    #[serde(default = "default_pyramid_levels")]
    pub pyramid_levels: u32,

    /// Side of the square integration window
    #[serde(default = "default_window_size")]
    pub window_size: u32,

    /// Refinement iterations per pyramid level
    #[serde(default = "default_flow_iterations")]
    pub iterations: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct FilterConfig {
    /// Minimum share of sampled frames for which each predicate must hold
    #[serde(default = "default_min_frame_ratio")]
    pub min_frame_ratio: f64,

    /// Only every Nth decoded frame is evaluated
    #[serde(default = "default_sample_interval")]
    pub sample_interval: u32,

    /// Sampled frames after which a video with no hand or no object is abandoned
    #[serde(default = "default_early_stop_frames")]
    pub early_stop_frames: u32,

    /// Per-pair flow threshold for the static-camera predicate
    #[serde(default = "default_static_flow_threshold")]
    pub static_flow_threshold: f64,

    /// Test hook: auto-pass videos carrying the mock generator's border colours.
    /// The signature is approximate and can match real saturated footage.
    #[serde(default)]
    pub synthetic_passthrough: bool,

    /// Write a `<stem>.verdict.json` side-car per candidate
    #[serde(default = "default_true")]
    pub write_verdict: bool,

    /// Append rejected candidates to a failure log in their directory
    #[serde(default = "default_true")]
    pub failure_log: bool,

    #[serde(default = "default_failure_log_name")]
    pub failure_log_name: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct NormalizeConfig {
    #[serde(default = "default_target_fps")]
    pub target_fps: f64,

    #[serde(default = "default_target_duration")]
    pub target_duration_seconds: f64,

    /// Source rates within this distance of the target are not resampled
    #[serde(default = "default_fps_tolerance")]
    pub fps_tolerance: f64,

    /// Zero-padded width of frame indices
    #[serde(default = "default_index_width")]
    pub index_width: u32,

    #[serde(default = "default_frame_prefix")]
    pub frame_prefix: String,

    /// Decoder backends tried in order: "ffmpeg", "transcode", "gstreamer"
    #[serde(default = "default_backends")]
    pub backends: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct DatasetConfig {
    #[serde(default = "default_gen_datas_dir")]
    pub gen_datas_dir: String,

    #[serde(default = "default_models_dir")]
    pub models_dir: String,

    #[serde(default = "default_manifest_name")]
    pub manifest_name: String,

    /// Auxiliary files copied from the capture directory into each sample
    #[serde(default = "default_aux_files")]
    pub aux_files: Vec<String>,

    /// Aux file that must parse as a 3x3 intrinsics matrix when present
    #[serde(default = "default_intrinsics_file")]
    pub intrinsics_file: String,

    #[serde(default = "default_cad_info_name")]
    pub cad_info_name: String,

    #[serde(default = "default_frames_dir")]
    pub frames_dir: String,

    /// Delete the source video after a successful commit
    #[serde(default = "default_true")]
    pub remove_source_videos: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Candidates processed concurrently; 1 keeps the batch sequential
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Delete videos rejected by a gate instead of leaving them for inspection
    #[serde(default)]
    pub delete_rejected: bool,

    /// Persist the batch report under `<dataset_root>/reports`
    #[serde(default = "default_true")]
    pub write_report: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct DetectorConfig {
    /// External detector program invoked with a frame PNG path
    pub program: Option<String>,

    #[serde(default)]
    pub args: Vec<String>,

    /// Detections below this confidence are ignored
    #[serde(default = "default_detector_confidence")]
    pub confidence: f64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PlausibilityConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_plausibility_threshold")]
    pub threshold: f64,

    /// External scorer invoked with the video path; prints a float
    pub program: Option<String>,

    #[serde(default)]
    pub args: Vec<String>,
}

impl CurationConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("vidcurate.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("paths.candidate_dir", default_candidate_dir())?
            .set_default("paths.capture_dir", default_capture_dir())?
            .set_default("paths.dataset_root", default_dataset_root())?
            .set_default("paths.extensions", default_extensions())?
            .set_default("motion.threshold", default_motion_threshold())?
            .set_default("motion.sample_count", default_motion_sample_count())?
            .set_default("motion.flow_max_width", default_flow_max_width())?
            .set_default("motion.pyramid_levels", default_pyramid_levels())?
            .set_default("motion.window_size", default_window_size())?
            .set_default("motion.iterations", default_flow_iterations())?
            .set_default("filter.min_frame_ratio", default_min_frame_ratio())?
            .set_default("filter.sample_interval", default_sample_interval())?
            .set_default("filter.early_stop_frames", default_early_stop_frames())?
            .set_default(
                "filter.static_flow_threshold",
                default_static_flow_threshold(),
            )?
            .set_default("filter.synthetic_passthrough", false)?
            .set_default("filter.write_verdict", true)?
            .set_default("filter.failure_log", true)?
            .set_default("filter.failure_log_name", default_failure_log_name())?
            .set_default("normalize.target_fps", default_target_fps())?
            .set_default(
                "normalize.target_duration_seconds",
                default_target_duration(),
            )?
            .set_default("normalize.fps_tolerance", default_fps_tolerance())?
            .set_default("normalize.index_width", default_index_width())?
            .set_default("normalize.frame_prefix", default_frame_prefix())?
            .set_default("normalize.backends", default_backends())?
            .set_default("dataset.gen_datas_dir", default_gen_datas_dir())?
            .set_default("dataset.models_dir", default_models_dir())?
            .set_default("dataset.manifest_name", default_manifest_name())?
            .set_default("dataset.aux_files", default_aux_files())?
            .set_default("dataset.intrinsics_file", default_intrinsics_file())?
            .set_default("dataset.cad_info_name", default_cad_info_name())?
            .set_default("dataset.frames_dir", default_frames_dir())?
            .set_default("dataset.remove_source_videos", true)?
            .set_default("pipeline.max_workers", default_max_workers() as i64)?
            .set_default("pipeline.delete_rejected", false)?
            .set_default("pipeline.write_report", true)?
            .set_default("detector.args", Vec::<String>::new())?
            .set_default("detector.confidence", default_detector_confidence())?
            .set_default("plausibility.enabled", false)?
            .set_default(
                "plausibility.threshold",
                default_plausibility_threshold(),
            )?
            .set_default("plausibility.args", Vec::<String>::new())?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // VIDCURATE_MOTION__SAMPLE_COUNT -> motion.sample_count
            .add_source(
                Environment::with_prefix("VIDCURATE")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let config: CurationConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.paths.extensions.is_empty() {
            return Err(ConfigError::Message(
                "At least one candidate extension is required".to_string(),
            ));
        }

        if !(self.motion.threshold > 0.0) {
            return Err(ConfigError::Message(
                "Motion threshold must be greater than 0".to_string(),
            ));
        }

        if self.motion.sample_count == 0 {
            return Err(ConfigError::Message(
                "Motion sample_count must be at least 1".to_string(),
            ));
        }

        if self.motion.pyramid_levels == 0 || self.motion.window_size < 3 {
            return Err(ConfigError::Message(
                "Flow estimator needs at least one pyramid level and a window of 3 or more"
                    .to_string(),
            ));
        }

        if !(self.filter.min_frame_ratio > 0.0 && self.filter.min_frame_ratio <= 1.0) {
            return Err(ConfigError::Message(
                "Filter min_frame_ratio must be in (0, 1]".to_string(),
            ));
        }

        if self.filter.sample_interval == 0 {
            return Err(ConfigError::Message(
                "Filter sample_interval must be at least 1".to_string(),
            ));
        }

        if self.filter.early_stop_frames == 0 {
            return Err(ConfigError::Message(
                "Filter early_stop_frames must be at least 1".to_string(),
            ));
        }

        if !(self.normalize.target_fps > 0.0) || !(self.normalize.target_duration_seconds > 0.0)
        {
            return Err(ConfigError::Message(
                "Normalize target_fps and target_duration_seconds must be greater than 0"
                    .to_string(),
            ));
        }

        if self.normalize.index_width == 0 {
            return Err(ConfigError::Message(
                "Normalize index_width must be at least 1".to_string(),
            ));
        }

        if self.normalize.backends.is_empty() {
            return Err(ConfigError::Message(
                "At least one decoder backend is required".to_string(),
            ));
        }

        if self.pipeline.max_workers == 0 {
            return Err(ConfigError::Message(
                "Pipeline max_workers must be at least 1".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.detector.confidence) {
            return Err(ConfigError::Message(
                "Detector confidence must be in [0, 1]".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.plausibility.threshold) {
            return Err(ConfigError::Message(
                "Plausibility threshold must be in [0, 1]".to_string(),
            ));
        }

        Ok(())
    }

    /// Number of frames every committed sample must contain
    pub fn target_length(&self) -> usize {
        self.normalize.target_length()
    }

    pub fn dataset_root(&self) -> PathBuf {
        PathBuf::from(&self.paths.dataset_root)
    }
}

impl NormalizeConfig {
    pub fn target_length(&self) -> usize {
        (self.target_fps * self.target_duration_seconds).round() as usize
    }
}

impl Default for CurationConfig {
    fn default() -> Self {
        Self {
            paths: PathsConfig {
                candidate_dir: default_candidate_dir(),
                capture_dir: default_capture_dir(),
                dataset_root: default_dataset_root(),
                diagnostics_dir: None,
                extensions: default_extensions(),
            },
            motion: MotionConfig::default(),
            filter: FilterConfig::default(),
            normalize: NormalizeConfig::default(),
            dataset: DatasetConfig::default(),
            pipeline: PipelineConfig::default(),
            detector: DetectorConfig::default(),
            plausibility: PlausibilityConfig::default(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            delete_rejected: false,
            write_report: true,
        }
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            program: None,
            args: Vec::new(),
            confidence: default_detector_confidence(),
        }
    }
}

impl Default for PlausibilityConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold: default_plausibility_threshold(),
            program: None,
            args: Vec::new(),
        }
    }
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            threshold: default_motion_threshold(),
            sample_count: default_motion_sample_count(),
            flow_max_width: default_flow_max_width(),
            pyramid_levels: default_pyramid_levels(),
            window_size: default_window_size(),
            iterations: default_flow_iterations(),
        }
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            min_frame_ratio: default_min_frame_ratio(),
            sample_interval: default_sample_interval(),
            early_stop_frames: default_early_stop_frames(),
            static_flow_threshold: default_static_flow_threshold(),
            synthetic_passthrough: false,
            write_verdict: true,
            failure_log: true,
            failure_log_name: default_failure_log_name(),
        }
    }
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            target_fps: default_target_fps(),
            target_duration_seconds: default_target_duration(),
            fps_tolerance: default_fps_tolerance(),
            index_width: default_index_width(),
            frame_prefix: default_frame_prefix(),
            backends: default_backends(),
        }
    }
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            gen_datas_dir: default_gen_datas_dir(),
            models_dir: default_models_dir(),
            manifest_name: default_manifest_name(),
            aux_files: default_aux_files(),
            intrinsics_file: default_intrinsics_file(),
            cad_info_name: default_cad_info_name(),
            frames_dir: default_frames_dir(),
            remove_source_videos: true,
        }
    }
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_candidate_dir() -> String {
    "assets/temp/static_videos".to_string()
}
fn default_capture_dir() -> String {
    "capture".to_string()
}
fn default_dataset_root() -> String {
    "gen_dataset".to_string()
}
fn default_extensions() -> Vec<String> {
    vec!["mp4".to_string()]
}

fn default_motion_threshold() -> f64 {
    1.5
}
fn default_motion_sample_count() -> u32 {
    10
}
fn default_flow_max_width() -> u32 {
    320
}
fn default_pyramid_levels() -> u32 {
    3
}
fn default_window_size() -> u32 {
    15
}
fn default_flow_iterations() -> u32 {
    3
}

fn default_min_frame_ratio() -> f64 {
    0.8
}
fn default_sample_interval() -> u32 {
    5
}
fn default_early_stop_frames() -> u32 {
    50
}
fn default_static_flow_threshold() -> f64 {
    1.5
}
fn default_failure_log_name() -> String {
    "failed.log".to_string()
}

fn default_target_fps() -> f64 {
    30.0
}
fn default_target_duration() -> f64 {
    5.0
}
fn default_fps_tolerance() -> f64 {
    1.0
}
fn default_index_width() -> u32 {
    6
}
fn default_frame_prefix() -> String {
    "frame_".to_string()
}
fn default_backends() -> Vec<String> {
    vec!["ffmpeg".to_string(), "transcode".to_string()]
}

fn default_gen_datas_dir() -> String {
    "gen_datas".to_string()
}
fn default_models_dir() -> String {
    "models".to_string()
}
fn default_manifest_name() -> String {
    "meta.info".to_string()
}
fn default_aux_files() -> Vec<String> {
    vec!["cam_K.txt".to_string(), "depth_000000.png".to_string()]
}
fn default_intrinsics_file() -> String {
    "cam_K.txt".to_string()
}
fn default_cad_info_name() -> String {
    "cad.info".to_string()
}
fn default_frames_dir() -> String {
    "rgb".to_string()
}

fn default_max_workers() -> usize {
    1
}

fn default_detector_confidence() -> f64 {
    0.5
}
fn default_plausibility_threshold() -> f64 {
    0.7
}
