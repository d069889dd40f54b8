use super::*;
use crate::detect::MarkerDetector;
use crate::plausibility::FixedScorer;
use crate::video::{MockVideo, MockVideoDecoder};
use image::{Rgb, RgbImage};
use tempfile::TempDir;

struct Harness {
    _temp: TempDir,
    config: CurationConfig,
    decoder: Arc<MockVideoDecoder>,
    candidates: PathBuf,
    capture: PathBuf,
    dataset_root: PathBuf,
}

impl Harness {
    fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let candidates = temp.path().join("candidates");
        let capture = temp.path().join("capture");
        let dataset_root = temp.path().join("gen_dataset");
        std::fs::create_dir_all(&candidates).unwrap();
        std::fs::create_dir_all(&capture).unwrap();
        std::fs::write(capture.join("cam_K.txt"), "600 0 320\n0 600 240\n0 0 1\n").unwrap();
        std::fs::write(capture.join("depth_000000.png"), b"depth").unwrap();

        let mut config = CurationConfig::default();
        config.paths.candidate_dir = candidates.to_string_lossy().to_string();
        config.paths.capture_dir = capture.to_string_lossy().to_string();
        config.paths.dataset_root = dataset_root.to_string_lossy().to_string();

        Self {
            _temp: temp,
            config,
            decoder: Arc::new(MockVideoDecoder::new()),
            candidates,
            capture,
            dataset_root,
        }
    }

    fn add_video(&self, name: &str, video: MockVideo) -> PathBuf {
        let path = self.candidates.join(name);
        std::fs::write(&path, b"").unwrap();
        self.decoder.insert_video(path.clone(), video);
        path
    }

    fn pipeline(&self) -> CurationPipeline {
        CurationPipeline::new(
            self.config.clone(),
            DecoderChain::single(self.decoder.clone()),
            Arc::new(MarkerDetector::new()),
        )
    }

    fn request(&self) -> BatchRequest {
        BatchRequest {
            object: "obj".to_string(),
            viewpoint: "view".to_string(),
            target_class: None,
            candidate_dir: self.candidates.clone(),
            capture_dir: self.capture.clone(),
            dry_run: false,
        }
    }

    async fn run(&self) -> BatchReport {
        self.pipeline()
            .run_batch(&self.request(), CancellationToken::new())
            .await
            .unwrap()
    }

    fn manifest_path(&self) -> PathBuf {
        self.dataset_root.join("meta.info")
    }

    fn manifest_lines(&self) -> Vec<String> {
        std::fs::read_to_string(self.manifest_path())
            .map(|text| text.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }

    fn samples(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.dataset_root.join("gen_datas"))
            .map(|entries| {
                entries
                    .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }
}

fn frame(hand: bool) -> RgbImage {
    let mut frame = RgbImage::from_pixel(16, 16, Rgb([80, 80, 80]));
    MarkerDetector::mark(&mut frame, hand, Some(0));
    frame
}

fn good_video() -> MockVideo {
    MockVideo::new(vec![frame(true); 150], 30.0)
}

#[tokio::test]
async fn test_empty_candidate_dir_needs_retry() {
    let harness = Harness::new();
    let report = harness.run().await;

    assert_eq!(report.total, 0);
    assert!(!report.all_succeeded);
    assert!(report.need_retry);
    assert!(report.manifest.is_none());
    assert!(!harness.manifest_path().exists());
}

#[tokio::test]
async fn test_missing_candidate_dir_is_fatal() {
    let harness = Harness::new();
    let mut request = harness.request();
    request.candidate_dir = harness.candidates.join("does-not-exist");

    let err = harness
        .pipeline()
        .run_batch(&request, CancellationToken::new())
        .await
        .unwrap_err();
    assert!(err.is_fatal());
}

#[tokio::test]
async fn test_good_candidate_is_committed() {
    let harness = Harness::new();
    let video = harness.add_video("clip.mp4", good_video());

    let report = harness.run().await;
    assert!(report.all_succeeded, "{:?}", report.outcomes);
    assert!(!report.need_retry);
    assert_eq!((report.total, report.accepted, report.committed), (1, 1, 1));
    assert_eq!(report.outcomes[0].sample.as_deref(), Some("obj_view_001"));

    assert_eq!(harness.samples(), vec!["obj_view_001"]);
    let frames = harness.dataset_root.join("gen_datas/obj_view_001/rgb");
    assert_eq!(std::fs::read_dir(&frames).unwrap().count(), 150);
    assert!(frames.join("frame_000149.png").exists());
    assert_eq!(
        harness.manifest_lines(),
        vec!["gen_dataset/gen_datas/obj_view_001"]
    );
    assert_eq!(std::fs::read_to_string(harness.manifest_path()).unwrap().chars().last(), Some('\n'));

    // Committed sources are removed by default
    assert!(!video.exists());
}

#[tokio::test]
async fn test_low_hand_ratio_is_rejected_without_side_effects() {
    let harness = Harness::new();
    // 50 samples at decoded indices 5..=250, hands in the first 10
    let frames = (0..251).map(|i| frame(i > 0 && i <= 50)).collect();
    let video = harness.add_video("clip.mp4", MockVideo::new(frames, 30.0));

    let report = harness.run().await;
    assert_eq!((report.total, report.accepted, report.rejected), (1, 0, 1));
    assert!(report.need_retry);
    assert!(report.outcomes[0].reasons[0].starts_with("hand detection ratio too low"));

    assert!(harness.samples().is_empty());
    assert!(!harness.manifest_path().exists());
    assert!(video.exists());
    assert!(harness.candidates.join("failed.log").exists());
}

#[tokio::test]
async fn test_motion_gate_must_also_pass() {
    let harness = Harness::new();
    // Container claims a single frame, so the dedicated analyzer fails closed
    harness.add_video("clip.mp4", good_video().reporting_frames(1));

    let report = harness.run().await;
    assert_eq!(report.rejected, 1);
    let outcome = &report.outcomes[0];
    assert_eq!(outcome.hand_ratio, Some(1.0));
    assert!(outcome.reasons[0].starts_with("camera not static"));
    assert!(harness.samples().is_empty());
}

#[tokio::test]
async fn test_rejected_videos_can_be_deleted() {
    let mut harness = Harness::new();
    harness.config.pipeline.delete_rejected = true;
    let video = harness.add_video("clip.mp4", MockVideo::new(vec![frame(false); 20], 30.0));

    let report = harness.run().await;
    assert_eq!(report.rejected, 1);
    assert!(!video.exists());
}

#[tokio::test]
async fn test_commit_failure_rolls_back_and_needs_retry() {
    let harness = Harness::new();
    std::fs::write(harness.capture.join("cam_K.txt"), "garbage").unwrap();
    let first = harness.add_video("a.mp4", good_video());
    let second = harness.add_video("b.mp4", good_video());

    let report = harness.run().await;
    assert_eq!((report.accepted, report.committed, report.failed), (2, 0, 2));
    assert!(!report.all_succeeded);
    assert!(report.need_retry);

    assert!(harness.samples().is_empty());
    assert!(!harness.manifest_path().exists());
    assert!(first.exists() && second.exists());
}

#[tokio::test]
async fn test_rerun_allocates_new_indices_and_grows_manifest() {
    let harness = Harness::new();
    harness.add_video("clip.mp4", good_video());
    harness.run().await;

    harness.add_video("clip.mp4", good_video());
    let report = harness.run().await;

    assert_eq!(report.outcomes[0].sample.as_deref(), Some("obj_view_002"));
    assert_eq!(report.manifest.map(|m| (m.before, m.after)), Some((1, 2)));
    assert_eq!(
        harness.manifest_lines(),
        vec![
            "gen_dataset/gen_datas/obj_view_001",
            "gen_dataset/gen_datas/obj_view_002"
        ]
    );

    // An empty rerun leaves the manifest alone
    let before = std::fs::read_to_string(harness.manifest_path()).unwrap();
    let report = harness.run().await;
    assert!(report.need_retry);
    assert_eq!(std::fs::read_to_string(harness.manifest_path()).unwrap(), before);
}

#[tokio::test]
async fn test_parallel_workers_allocate_unique_indices() {
    let mut harness = Harness::new();
    harness.config.pipeline.max_workers = 4;
    for i in 0..6 {
        harness.add_video(&format!("clip_{}.mp4", i), good_video());
    }

    let report = harness.run().await;
    assert_eq!(report.committed, 6);
    assert_eq!(
        harness.samples(),
        (1..=6).map(|i| format!("obj_view_{:03}", i)).collect::<Vec<_>>()
    );
    assert_eq!(harness.manifest_lines().len(), 6);
}

#[tokio::test]
async fn test_cancelled_batch_processes_nothing() {
    let harness = Harness::new();
    let video = harness.add_video("clip.mp4", good_video());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = harness
        .pipeline()
        .run_batch(&harness.request(), cancel)
        .await
        .unwrap();
    assert!(report.cancelled);
    assert!(report.need_retry);
    assert_eq!(report.outcomes[0].status, CandidateStatus::Skipped);
    assert!(video.exists());
    assert!(harness.samples().is_empty());
}

#[tokio::test]
async fn test_dry_run_writes_nothing() {
    let harness = Harness::new();
    let video = harness.add_video("clip.mp4", good_video());
    let mut request = harness.request();
    request.dry_run = true;

    let report = harness
        .pipeline()
        .run_batch(&request, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.outcomes[0].status, CandidateStatus::Accepted);
    assert_eq!(report.committed, 0);
    assert!(report.all_succeeded);
    assert!(video.exists());
    assert!(harness.samples().is_empty());
}

#[tokio::test]
async fn test_plausibility_gate_rejects_low_scores() {
    let mut harness = Harness::new();
    harness.config.plausibility.enabled = true;
    harness.add_video("clip.mp4", good_video());

    let report = harness
        .pipeline()
        .with_scorer(Box::new(FixedScorer(0.4)))
        .run_batch(&harness.request(), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.rejected, 1);
    assert_eq!(report.outcomes[0].plausibility_score, Some(0.4));
    assert!(report.outcomes[0].reasons[0].starts_with("plausibility score too low"));
}

#[tokio::test]
async fn test_batch_report_is_written() {
    let harness = Harness::new();
    harness.add_video("clip.mp4", good_video());
    harness.run().await;

    let reports: Vec<PathBuf> = std::fs::read_dir(harness.dataset_root.join("reports"))
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert_eq!(reports.len(), 1);
    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&reports[0]).unwrap()).unwrap();
    assert_eq!(json["committed"], 1);
    assert_eq!(json["outcomes"][0]["status"], "committed");
}
