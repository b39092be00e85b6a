//! Edge detection pipeline.
//!
//! grayscale → Canny → contours → bounding-box blackout → contour overlay.
//! Holds no state across frames.

use image::RgbImage;
use imageproc::edges::canny;
use tracing::{debug, info};

use crate::camera::FrameListener;
use crate::cascade::min_face_size;
use crate::config::{EdgeConfig, OverlayConfig};
use crate::contour::{self, OverlayStyle};
use crate::error::Result;

pub struct EdgeDetector {
    cfg: EdgeConfig,
    style: OverlayStyle,
    face_size_ratio: f64,
    min_face_size: u32,
}

impl EdgeDetector {
    pub fn new(cfg: EdgeConfig, overlay: &OverlayConfig) -> Self {
        Self {
            cfg,
            style: OverlayStyle::from(overlay),
            face_size_ratio: 0.2,
            min_face_size: 0,
        }
    }

    pub fn with_face_size_ratio(mut self, ratio: f64) -> Self {
        self.face_size_ratio = ratio;
        self
    }

    /// Minimum face size for the current view, set by `on_started`.
    pub fn min_face_size(&self) -> u32 {
        self.min_face_size
    }

    /// Annotate `frame` in place. Returns the number of contours found.
    pub fn annotate(&self, frame: &mut RgbImage) -> usize {
        let gray = contour::to_gray(frame);
        let edges = canny(&gray, self.cfg.low_threshold, self.cfg.high_threshold);
        let contours = contour::find_contours(&edges);

        if self.cfg.blackout_boxes {
            for bbox in contours.iter().filter_map(|c| c.bounding_box()) {
                contour::blackout(frame, bbox);
            }
        }
        contour::draw_contours(frame, &contours, self.style);

        contours.len()
    }
}

impl FrameListener for EdgeDetector {
    type Frame = RgbImage;

    fn on_started(&mut self, width: u32, height: u32) {
        self.min_face_size = min_face_size(height, self.face_size_ratio);
        info!(width, height, min_face_size = self.min_face_size, "Edge view started");
    }

    fn on_frame(&mut self, mut frame: RgbImage) -> Result<RgbImage> {
        let found = self.annotate(&mut frame);
        debug!(contours = found, "Edge frame processed");
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn detector() -> EdgeDetector {
        EdgeDetector::new(EdgeConfig::default(), &OverlayConfig::default())
    }

    fn bright_square() -> RgbImage {
        RgbImage::from_fn(64, 64, |x, y| {
            if (20..44).contains(&x) && (20..44).contains(&y) {
                Rgb([230, 230, 230])
            } else {
                Rgb([10, 10, 10])
            }
        })
    }

    #[test]
    fn test_flat_frame_is_unchanged() {
        let frame = RgbImage::from_pixel(32, 32, Rgb([90, 120, 30]));
        let out = detector().on_frame(frame.clone()).unwrap();
        assert_eq!(out, frame);
    }

    #[test]
    fn test_square_is_boxed_and_outlined() {
        let mut det = detector();
        det.on_started(64, 64);
        let out = det.on_frame(bright_square()).unwrap();

        // interior of the square sits inside a blacked-out bounding box
        assert_eq!(out.get_pixel(32, 32), &Rgb([0, 0, 0]));
        assert!(out.pixels().any(|p| *p == Rgb([255, 0, 0])));
        // far corner is untouched background
        assert_eq!(out.get_pixel(1, 1), &Rgb([10, 10, 10]));
    }

    #[test]
    fn test_blackout_can_be_disabled() {
        let cfg = EdgeConfig {
            blackout_boxes: false,
            ..EdgeConfig::default()
        };
        let det = EdgeDetector::new(cfg, &OverlayConfig::default());
        let mut frame = bright_square();
        assert!(det.annotate(&mut frame) > 0);
        assert_eq!(frame.get_pixel(32, 32), &Rgb([230, 230, 230]));
    }

    #[test]
    fn test_min_face_size_follows_height() {
        let mut det = detector();
        det.on_started(640, 480);
        assert_eq!(det.min_face_size(), 96);
    }
}
