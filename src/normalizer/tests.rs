use super::*;
use crate::video::{MockVideo, MockVideoDecoder};
use image::Rgb;
use std::sync::Arc;
use tempfile::TempDir;

/// Frames tagged with their source index in the red and green channels
fn numbered(count: usize) -> Vec<RgbImage> {
    (0..count)
        .map(|i| RgbImage::from_pixel(8, 8, Rgb([(i % 256) as u8, (i / 256) as u8, 7])))
        .collect()
}

fn source_index_of(path: &Path) -> usize {
    let frame = image::open(path).unwrap().to_rgb8();
    let pixel = frame.get_pixel(0, 0);
    pixel[0] as usize + pixel[1] as usize * 256
}

fn normalizer(decoders: Vec<Arc<dyn VideoDecoder>>) -> FrameNormalizer {
    FrameNormalizer::new(NormalizeConfig::default(), DecoderChain::new(decoders))
}

fn frame_names(dir: &Path) -> BTreeSet<String> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect()
}

#[test]
fn test_upsampled_short_video_has_exact_length() {
    let temp = TempDir::new().unwrap();
    let decoder = Arc::new(MockVideoDecoder::new());
    decoder.insert("/v/slow.mp4", numbered(100), 20.0);

    let out = temp.path().join("rgb");
    let count = normalizer(vec![decoder])
        .normalize_blocking(Path::new("/v/slow.mp4"), &out)
        .unwrap();

    assert_eq!(count, 150);
    assert_eq!(frame_names(&out).len(), 150);
    assert!(out.join("frame_000000.png").exists());
    assert!(out.join("frame_000149.png").exists());
    assert_eq!(source_index_of(&out.join("frame_000149.png")), 99);
    assert_eq!(source_index_of(&out.join("frame_000148.png")), 99);
    assert_eq!(source_index_of(&out.join("frame_000002.png")), 1);
}

#[test]
fn test_short_video_is_padded_with_last_frame() {
    let temp = TempDir::new().unwrap();
    let decoder = Arc::new(MockVideoDecoder::new());
    decoder.insert("/v/short.mp4", numbered(100), 30.0);

    let out = temp.path().join("rgb");
    normalizer(vec![decoder])
        .normalize_blocking(Path::new("/v/short.mp4"), &out)
        .unwrap();

    assert_eq!(frame_names(&out).len(), 150);
    assert_eq!(source_index_of(&out.join("frame_000099.png")), 99);
    for i in 100..150 {
        let path = out.join(format!("frame_{:06}.png", i));
        assert_eq!(source_index_of(&path), 99);
    }
}

#[test]
fn test_long_video_is_downsampled() {
    let temp = TempDir::new().unwrap();
    let decoder = Arc::new(MockVideoDecoder::new());
    decoder.insert("/v/fast.mp4", numbered(400), 60.0);

    let out = temp.path().join("rgb");
    normalizer(vec![decoder])
        .normalize_blocking(Path::new("/v/fast.mp4"), &out)
        .unwrap();

    assert_eq!(frame_names(&out).len(), 150);
    assert_eq!(source_index_of(&out.join("frame_000001.png")), 2);
    assert_eq!(source_index_of(&out.join("frame_000149.png")), 298);
}

#[test]
fn test_stale_frames_are_purged() {
    let temp = TempDir::new().unwrap();
    let out = temp.path().join("rgb");
    std::fs::create_dir_all(&out).unwrap();
    std::fs::write(out.join("frame_00001.png"), b"stale").unwrap();
    std::fs::write(out.join("frame_000999.png"), b"stale").unwrap();

    let decoder = Arc::new(MockVideoDecoder::new());
    decoder.insert("/v/a.mp4", numbered(150), 30.0);
    normalizer(vec![decoder])
        .normalize_blocking(Path::new("/v/a.mp4"), &out)
        .unwrap();

    let names = frame_names(&out);
    assert_eq!(names.len(), 150);
    assert!(!names.contains("frame_00001.png"));
    assert!(!names.contains("frame_000999.png"));
}

#[test]
fn test_falls_back_to_second_backend() {
    let temp = TempDir::new().unwrap();
    let flaky = Arc::new(MockVideoDecoder::with_name("flaky"));
    flaky.insert_video(
        "/v/a.mp4",
        MockVideo::new(numbered(120), 30.0).failing_after(40),
    );
    let steady = Arc::new(MockVideoDecoder::with_name("steady"));
    steady.insert("/v/a.mp4", numbered(120), 30.0);

    let out = temp.path().join("rgb");
    let count = normalizer(vec![flaky, steady])
        .normalize_blocking(Path::new("/v/a.mp4"), &out)
        .unwrap();

    assert_eq!(count, 150);
    assert_eq!(frame_names(&out).len(), 150);
    assert_eq!(source_index_of(&out.join("frame_000149.png")), 119);
}

#[cfg(unix)]
#[test]
fn test_pipe_decoder_crash_falls_back_instead_of_padding() {
    use crate::video::{scripted_tools, FfmpegPipeDecoder};

    let temp = TempDir::new().unwrap();
    let video = temp.path().join("clip.mp4");
    std::fs::write(&video, b"").unwrap();

    // ffmpeg dies after three frames of a 150-frame video
    let crashing = Arc::new(FfmpegPipeDecoder::with_programs(
        scripted_tools::ffmpeg(temp.path(), 3, 1),
        scripted_tools::ffprobe(temp.path(), 150),
    ));
    let steady = Arc::new(MockVideoDecoder::with_name("steady"));
    steady.insert(video.clone(), numbered(150), 30.0);

    let decoders: Vec<Arc<dyn VideoDecoder>> = vec![crashing, steady];
    let out = temp.path().join("rgb");
    let count = normalizer(decoders)
        .normalize_blocking(&video, &out)
        .unwrap();

    assert_eq!(count, 150);
    assert_eq!(frame_names(&out).len(), 150);
    assert_eq!(source_index_of(&out.join("frame_000003.png")), 3);
    assert_eq!(source_index_of(&out.join("frame_000149.png")), 149);
}

#[test]
fn test_all_backends_failing_leaves_no_frames() {
    let temp = TempDir::new().unwrap();
    let flaky = Arc::new(MockVideoDecoder::new());
    flaky.insert_video(
        "/v/a.mp4",
        MockVideo::new(numbered(120), 30.0).failing_after(40),
    );

    let out = temp.path().join("rgb");
    let result = normalizer(vec![flaky]).normalize_blocking(Path::new("/v/a.mp4"), &out);
    assert!(matches!(result, Err(CurationError::Decode { .. })));
    assert!(frame_names(&out).is_empty());
}

#[test]
fn test_empty_video() {
    let temp = TempDir::new().unwrap();
    let decoder = Arc::new(MockVideoDecoder::new());
    decoder.insert("/v/empty.mp4", Vec::new(), 30.0);

    let result = normalizer(vec![decoder])
        .normalize_blocking(Path::new("/v/empty.mp4"), &temp.path().join("rgb"));
    assert!(matches!(result, Err(CurationError::EmptyVideo { .. })));
}

#[test]
fn test_verify_output_detects_mismatch() {
    let temp = TempDir::new().unwrap();
    let naming = FrameNaming::new("frame_", 6);
    for i in 0..3 {
        std::fs::write(temp.path().join(naming.file_name(i)), b"x").unwrap();
    }
    assert!(verify_output(temp.path(), &naming, 3).is_ok());

    assert!(matches!(
        verify_output(temp.path(), &naming, 4),
        Err(CurationError::FrameCountMismatch {
            expected: 4,
            found: 3,
            ..
        })
    ));

    std::fs::write(temp.path().join("extra.txt"), b"x").unwrap();
    assert!(verify_output(temp.path(), &naming, 3).is_err());
}

#[tokio::test]
async fn test_async_normalize() {
    let temp = TempDir::new().unwrap();
    let decoder = Arc::new(MockVideoDecoder::new());
    decoder.insert("/v/a.mp4", numbered(10), 30.0);

    let mut config = NormalizeConfig::default();
    config.target_duration_seconds = 1.0;
    let normalizer = FrameNormalizer::new(config, DecoderChain::single(decoder));
    let count = normalizer
        .normalize(Path::new("/v/a.mp4"), &temp.path().join("rgb"))
        .await
        .unwrap();
    assert_eq!(count, 30);
}
