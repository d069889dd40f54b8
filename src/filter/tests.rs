use super::*;
use crate::detect::MarkerDetector;
use crate::video::{MockVideo, MockVideoDecoder};
use image::Rgb;
use tempfile::TempDir;

fn frame(hand: bool, object: Option<u8>) -> RgbImage {
    let mut frame = RgbImage::from_pixel(64, 48, Rgb([90, 90, 90]));
    MarkerDetector::mark(&mut frame, hand, object);
    frame
}

fn content_filter(decoder: Arc<MockVideoDecoder>, config: FilterConfig) -> ContentFilter {
    ContentFilter::new(
        config,
        &MotionConfig::default(),
        decoder,
        Arc::new(MarkerDetector::new()),
    )
}

#[test]
fn test_good_video_passes() {
    let decoder = Arc::new(MockVideoDecoder::new());
    decoder.insert("/v/good.mp4", vec![frame(true, Some(0)); 60], 30.0);

    let verdict = content_filter(decoder, FilterConfig::default())
        .evaluate(Path::new("/v/good.mp4"), None)
        .unwrap();
    assert!(verdict.passed, "{:?}", verdict.reasons);
    assert_eq!(verdict.checked_frames, 11);
    assert_eq!(verdict.hand_ratio, 1.0);
    assert_eq!(verdict.static_ratio, 1.0);
    assert!(verdict.average_flow_magnitude < 1.5);
    assert!(verdict.reasons.is_empty());
}

#[test]
fn test_low_hand_ratio_is_rejected() {
    let decoder = Arc::new(MockVideoDecoder::new());
    // Decoded indices 1..=250 give 50 samples; hands only in the first 10
    let frames: Vec<RgbImage> = (0..251)
        .map(|i| frame(i > 0 && i <= 50, Some(0)))
        .collect();
    decoder.insert("/v/few_hands.mp4", frames, 30.0);

    let verdict = content_filter(decoder, FilterConfig::default())
        .evaluate(Path::new("/v/few_hands.mp4"), None)
        .unwrap();
    assert!(!verdict.passed);
    assert!(!verdict.early_stopped);
    assert_eq!(verdict.checked_frames, 50);
    assert_eq!(verdict.hand_detected_frames, 10);
    assert!((verdict.hand_ratio - 0.2).abs() < 1e-12);
    assert_eq!(verdict.reasons.len(), 1);
    assert!(verdict.reasons[0].starts_with("hand detection ratio too low"));
}

#[test]
fn test_early_stop_without_hands() {
    let decoder = Arc::new(MockVideoDecoder::new());
    decoder.insert("/v/no_hands.mp4", vec![frame(false, Some(0)); 400], 30.0);

    let verdict = content_filter(decoder, FilterConfig::default())
        .evaluate(Path::new("/v/no_hands.mp4"), None)
        .unwrap();
    assert!(verdict.early_stopped);
    assert_eq!(verdict.checked_frames, 50);
    assert!(!verdict.passed);
    assert!(verdict.reasons.iter().any(|r| r.starts_with("early stop")));
    assert!(verdict.reasons.iter().any(|r| r.starts_with("hand detection")));
}

#[test]
fn test_target_class_must_match() {
    let decoder = Arc::new(MockVideoDecoder::new());
    decoder.insert("/v/bottle.mp4", vec![frame(true, Some(39)); 30], 30.0);
    let filter = content_filter(decoder, FilterConfig::default());

    let cup = TargetClass::Name("cup".to_string());
    let verdict = filter.evaluate(Path::new("/v/bottle.mp4"), Some(&cup)).unwrap();
    assert_eq!(verdict.object_ratio, 0.0);
    assert!(!verdict.passed);

    let bottle = TargetClass::Id(39);
    let verdict = filter.evaluate(Path::new("/v/bottle.mp4"), Some(&bottle)).unwrap();
    assert!(verdict.passed, "{:?}", verdict.reasons);
}

#[test]
fn test_detector_errors_fail_closed() {
    let decoder = Arc::new(MockVideoDecoder::new());
    decoder.insert("/v/good.mp4", vec![frame(true, Some(0)); 30], 30.0);
    let filter = ContentFilter::new(
        FilterConfig::default(),
        &MotionConfig::default(),
        decoder,
        Arc::new(MarkerDetector::failing()),
    );

    let verdict = filter.evaluate(Path::new("/v/good.mp4"), None).unwrap();
    assert!(!verdict.passed);
    assert_eq!(verdict.hand_ratio, 0.0);
    assert_eq!(verdict.detector_errors, verdict.checked_frames * 2);
}

#[test]
fn test_flow_errors_fail_closed() {
    // Frame size flips between every sampled frame, so no pair is comparable
    let frames: Vec<RgbImage> = (0..30)
        .map(|i| {
            let (width, height) = if (i / 5) % 2 == 0 { (64, 48) } else { (32, 24) };
            let mut frame = RgbImage::from_pixel(width, height, Rgb([90, 90, 90]));
            MarkerDetector::mark(&mut frame, true, Some(0));
            frame
        })
        .collect();
    let decoder = Arc::new(MockVideoDecoder::new());
    decoder.insert("/v/resized.mp4", frames, 30.0);

    let verdict = content_filter(decoder, FilterConfig::default())
        .evaluate(Path::new("/v/resized.mp4"), None)
        .unwrap();
    assert!(!verdict.passed);
    assert_eq!(verdict.checked_frames, 5);
    assert_eq!(verdict.flow_errors, 5);
    assert_eq!(verdict.hand_ratio, 1.0);
    assert_eq!(verdict.static_ratio, 0.0);
    assert_eq!(verdict.reasons.len(), 1);
    assert!(verdict.reasons[0].starts_with("static camera ratio too low"));
}

#[test]
fn test_synthetic_passthrough_is_opt_in() {
    let placeholder = RgbImage::from_fn(60, 60, |x, y| {
        if (20..40).contains(&x) && (20..40).contains(&y) {
            Rgb([10, 10, 250])
        } else {
            Rgb([30, 30, 30])
        }
    });
    let decoder = Arc::new(MockVideoDecoder::new());
    decoder.insert("/v/mock.mp4", vec![placeholder; 20], 30.0);

    let verdict = content_filter(decoder.clone(), FilterConfig::default())
        .evaluate(Path::new("/v/mock.mp4"), None)
        .unwrap();
    assert!(!verdict.passed);
    assert!(!verdict.synthetic_passthrough);

    let config = FilterConfig {
        synthetic_passthrough: true,
        ..FilterConfig::default()
    };
    let verdict = content_filter(decoder, config)
        .evaluate(Path::new("/v/mock.mp4"), None)
        .unwrap();
    assert!(verdict.passed);
    assert!(verdict.synthetic_passthrough);
    assert_eq!(verdict.checked_frames, 0);
}

#[tokio::test]
async fn test_rejection_writes_diagnostics() {
    let temp = TempDir::new().unwrap();
    let video = temp.path().join("broken.mp4");
    let decoder = Arc::new(MockVideoDecoder::new());
    decoder.insert_video(
        video.clone(),
        MockVideo::new(vec![frame(true, None); 10], 30.0).failing_open(),
    );

    let filter = content_filter(decoder, FilterConfig::default());
    assert!(filter.evaluate(&video, None).is_err());

    let verdict = filter.filter(&video, None).await;
    assert!(!verdict.passed);
    assert!(verdict.reasons[0].starts_with("video could not be read"));

    let log = std::fs::read_to_string(temp.path().join("failed.log")).unwrap();
    assert!(log.contains("video: broken.mp4"));
    assert!(temp.path().join("broken.verdict.json").exists());
}

#[tokio::test]
async fn test_diagnostics_can_be_disabled() {
    let temp = TempDir::new().unwrap();
    let video = temp.path().join("empty.mp4");
    let decoder = Arc::new(MockVideoDecoder::new());
    decoder.insert(video.clone(), vec![frame(false, None); 3], 30.0);

    let config = FilterConfig {
        write_verdict: false,
        failure_log: false,
        ..FilterConfig::default()
    };
    let verdict = content_filter(decoder, config).filter(&video, None).await;
    assert!(!verdict.passed);
    assert_eq!(verdict.reasons[0], "no frames sampled");
    assert!(!temp.path().join("failed.log").exists());
    assert!(!temp.path().join("empty.verdict.json").exists());
}
