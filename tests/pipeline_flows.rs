use std::fs;
use std::path::Path;

use image::{Rgb, RgbImage};

use edgewatch::camera::{CameraView, ImageSequence, ImageSequenceWriter};
use edgewatch::config::{AppConfig, CascadeConfig};
use edgewatch::edge::EdgeDetector;
use edgewatch::loader::{Backend, Loader};
use edgewatch::motion::MotionDetector;

const RED: Rgb<u8> = Rgb([255, 0, 0]);

/// A dark 64x64 frame with a bright 12x12 square whose left edge is at `x`.
fn frame_with_square_at(x: u32) -> RgbImage {
    RgbImage::from_fn(64, 64, |px, py| {
        if (x..x + 12).contains(&px) && (26..38).contains(&py) {
            Rgb([240, 240, 240])
        } else {
            Rgb([15, 15, 15])
        }
    })
}

fn write_moving_square(dir: &Path, frames: u32) {
    for i in 0..frames {
        frame_with_square_at(4 + i * 14)
            .save(dir.join(format!("in_{:03}.png", i)))
            .unwrap();
    }
}

#[test]
fn test_motion_sequence_end_to_end() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    write_moving_square(input.path(), 3);

    let cfg = AppConfig::default();
    let mut view = CameraView::new(ImageSequence::open(input.path()).unwrap());
    view.enable_view();
    let mut detector = MotionDetector::new(cfg.motion.clone(), &cfg.overlay);
    let mut sink = ImageSequenceWriter::create(output.path()).unwrap();

    let stats = view.run(&mut detector, &mut sink).unwrap();
    assert_eq!(stats.frames, 3);
    assert_eq!(stats.size, Some((64, 64)));

    let first = image::open(output.path().join("frame_000000.png")).unwrap().to_rgb8();
    assert_eq!(first, frame_with_square_at(4), "first frame only primes the detector");

    for i in 1..3 {
        let out = image::open(output.path().join(format!("frame_{:06}.png", i)))
            .unwrap()
            .to_rgb8();
        assert!(out.pixels().any(|p| *p == RED), "frame {} has no motion overlay", i);
    }
}

#[test]
fn test_edge_sequence_end_to_end() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    write_moving_square(input.path(), 2);

    let cfg = AppConfig::default();
    let mut view = CameraView::new(ImageSequence::open(input.path()).unwrap()).with_max_frames(Some(1));
    view.enable_view();
    let mut detector = EdgeDetector::new(cfg.edges.clone(), &cfg.overlay);
    let mut frames: Vec<RgbImage> = Vec::new();

    assert_eq!(view.run(&mut detector, &mut frames).unwrap().frames, 1);
    let out = &frames[0];
    assert!(out.pixels().any(|p| *p == RED));
    // the square itself is inside a blacked-out box
    assert_eq!(out.get_pixel(9, 31), &Rgb([0, 0, 0]));
    assert!(!output.path().join("frame_000000.png").exists());
}

#[tokio::test]
async fn test_view_enabled_after_loader_without_cascade() {
    let assets = tempfile::tempdir().unwrap();
    let install = tempfile::tempdir().unwrap();
    let frames = tempfile::tempdir().unwrap();
    write_moving_square(frames.path(), 2);

    let loader = Loader::new(
        Backend::ImageProc,
        CascadeConfig {
            asset_dir: assets.path().to_path_buf(),
            install_dir: install.path().join("app_cascade"),
            ..CascadeConfig::default()
        },
    );
    let deps = loader.initialize().await.unwrap();
    assert!(deps.cascade.is_none());
    assert!(fs::read_dir(install.path()).unwrap().next().is_none());

    let cfg = AppConfig::default();
    let mut view = CameraView::new(ImageSequence::open(frames.path()).unwrap());
    assert!(!view.is_enabled());
    view.enable_view();
    let mut detector = MotionDetector::new(cfg.motion, &cfg.overlay);
    let mut out: Vec<RgbImage> = Vec::new();
    assert_eq!(view.run(&mut detector, &mut out).unwrap().frames, 2);
}
