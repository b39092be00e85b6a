//! Motion detection by frame differencing.
//!
//! Compares each grayscale frame against the one before it, binarises the
//! difference, cleans it with erode + dilate and outlines the changed
//! regions on the colour frame. The first frame after the view starts only
//! primes the previous-frame buffer.

use image::{GrayImage, Luma, RgbImage};
use imageproc::{
    distance_transform::Norm,
    morphology::{dilate, erode},
};
use tracing::{debug, info, warn};

use crate::camera::FrameListener;
use crate::cascade::min_face_size;
use crate::config::{MotionConfig, OverlayConfig};
use crate::contour::{self, OverlayStyle};
use crate::error::Result;

/// One instance per camera view.
pub struct MotionDetector {
    cfg: MotionConfig,
    style: OverlayStyle,
    first_frame: bool,
    previous: Option<GrayImage>,
    face_size_ratio: f64,
    min_face_size: u32,
}

impl MotionDetector {
    pub fn new(cfg: MotionConfig, overlay: &OverlayConfig) -> Self {
        Self {
            cfg,
            style: OverlayStyle::from(overlay),
            first_frame: true,
            previous: None,
            face_size_ratio: 0.2,
            min_face_size: 0,
        }
    }

    pub fn with_face_size_ratio(mut self, ratio: f64) -> Self {
        self.face_size_ratio = ratio;
        self
    }

    pub fn min_face_size(&self) -> u32 {
        self.min_face_size
    }

    /// True until a frame has been seen since the view (re)started.
    pub fn is_first_frame(&self) -> bool {
        self.first_frame
    }

    /// Annotate `frame` in place. Returns the number of moving regions, or
    /// `None` when there was no usable previous frame.
    pub fn annotate(&mut self, frame: &mut RgbImage) -> Option<usize> {
        let gray = contour::to_gray(frame);

        let found = match self.previous.take() {
            _ if self.first_frame => {
                self.first_frame = false;
                None
            }
            Some(prev) if prev.dimensions() == gray.dimensions() => {
                let mask = self.motion_mask(&gray, &prev);
                let contours = contour::find_contours(&mask);
                contour::draw_contours(frame, &contours, self.style);
                Some(contours.len())
            }
            Some(prev) => {
                warn!(
                    "Frame size changed {:?} → {:?}, treating as first frame",
                    prev.dimensions(),
                    gray.dimensions()
                );
                None
            }
            None => None,
        };

        self.previous = Some(gray);
        found
    }

    /// absdiff → binary threshold → erode → dilate.
    fn motion_mask(&self, current: &GrayImage, previous: &GrayImage) -> GrayImage {
        let (thresh, max_value) = (self.cfg.diff_threshold, self.cfg.max_value);
        let binary = GrayImage::from_fn(current.width(), current.height(), |x, y| {
            let diff = current.get_pixel(x, y)[0].abs_diff(previous.get_pixel(x, y)[0]);
            Luma([if diff > thresh { max_value } else { 0 }])
        });

        let k = (self.cfg.kernel_size / 2).min(u8::MAX as u32) as u8;
        if k == 0 {
            return binary;
        }
        let eroded = erode(&binary, Norm::LInf, k);
        dilate(&eroded, Norm::LInf, k)
    }
}

impl FrameListener for MotionDetector {
    type Frame = RgbImage;

    fn on_started(&mut self, width: u32, height: u32) {
        self.first_frame = true;
        self.previous = None;
        self.min_face_size = min_face_size(height, self.face_size_ratio);
        info!(width, height, min_face_size = self.min_face_size, "Motion view started");
    }

    fn on_stopped(&mut self) {
        self.previous = None;
    }

    fn on_frame(&mut self, mut frame: RgbImage) -> Result<RgbImage> {
        match self.annotate(&mut frame) {
            Some(regions) => debug!(regions, "Motion frame processed"),
            None => debug!("Motion baseline frame stored"),
        }
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn detector() -> MotionDetector {
        MotionDetector::new(MotionConfig::default(), &OverlayConfig::default())
    }

    fn dark(size: u32) -> RgbImage {
        RgbImage::from_pixel(size, size, Rgb([20, 20, 20]))
    }

    fn with_square(size: u32, x0: u32, y0: u32, side: u32) -> RgbImage {
        let mut frame = dark(size);
        for y in y0..y0 + side {
            for x in x0..x0 + side {
                frame.put_pixel(x, y, Rgb([220, 220, 220]));
            }
        }
        frame
    }

    #[test]
    fn test_first_frame_passes_through() {
        let mut det = detector();
        det.on_started(64, 64);
        assert!(det.is_first_frame());
        let frame = with_square(64, 10, 10, 20);
        let out = det.on_frame(frame.clone()).unwrap();
        assert_eq!(out, frame);
        assert!(!det.is_first_frame());
    }

    #[test]
    fn test_identical_frames_have_no_motion() {
        let mut det = detector();
        let frame = with_square(64, 10, 10, 20);
        let mut a = frame.clone();
        let mut b = frame.clone();
        assert_eq!(det.annotate(&mut a), None);
        assert_eq!(det.annotate(&mut b), Some(0));
        assert_eq!(b, frame);
    }

    #[test]
    fn test_appearing_square_is_outlined() {
        let mut det = detector();
        let mut first = dark(64);
        det.annotate(&mut first);

        let mut second = with_square(64, 20, 20, 16);
        let regions = det.annotate(&mut second).unwrap();
        assert!(regions >= 1);
        assert_eq!(second.get_pixel(20, 20), &Rgb([255, 0, 0]));
        // centre of the square is not on the outline
        assert_eq!(second.get_pixel(28, 28), &Rgb([220, 220, 220]));
    }

    #[test]
    fn test_blue_dominated_change_is_detected() {
        // BT.601 luma of (100, 0, 255) is 59, above the default threshold of 50
        let mut det = detector();
        let mut first = RgbImage::new(64, 64);
        det.annotate(&mut first);

        let mut second = RgbImage::from_fn(64, 64, |x, y| {
            if (20..40).contains(&x) && (20..40).contains(&y) {
                Rgb([100, 0, 255])
            } else {
                Rgb([0, 0, 0])
            }
        });
        assert_eq!(det.annotate(&mut second), Some(1));
    }

    #[test]
    fn test_small_change_below_threshold_is_ignored() {
        let mut det = detector();
        let mut first = dark(32);
        det.annotate(&mut first);
        let mut second = RgbImage::from_pixel(32, 32, Rgb([60, 60, 60]));
        assert_eq!(det.annotate(&mut second), Some(0));
    }

    #[test]
    fn test_single_pixel_noise_is_eroded() {
        let mut det = detector();
        let mut first = dark(32);
        det.annotate(&mut first);
        let mut second = dark(32);
        second.put_pixel(16, 16, Rgb([255, 255, 255]));
        assert_eq!(det.annotate(&mut second), Some(0));
    }

    #[test]
    fn test_restart_resets_first_frame() {
        let mut det = detector();
        let mut a = dark(32);
        det.annotate(&mut a);
        det.on_started(32, 32);
        let mut b = with_square(32, 4, 4, 10);
        assert_eq!(det.annotate(&mut b), None);
    }

    #[test]
    fn test_size_change_is_treated_as_first_frame() {
        let mut det = detector();
        let mut a = dark(32);
        det.annotate(&mut a);
        let mut b = with_square(48, 4, 4, 10);
        let untouched = b.clone();
        assert_eq!(det.annotate(&mut b), None);
        assert_eq!(b, untouched);

        let mut c = dark(48);
        assert!(det.annotate(&mut c).unwrap() >= 1);
    }
}
