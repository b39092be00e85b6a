//! OpenCV backend.
//!
//! The edge and motion pipelines expressed directly on OpenCV `Mat`s, plus
//! a `VideoCapture` frame source and an `imwrite` sink. Frames are BGR, as
//! delivered by `videoio`; overlay colours are configured as RGB and
//! swapped here.

use std::path::{Path, PathBuf};

use opencv::{
    core::{self, Mat, Point, Scalar, Size, Vector, BORDER_CONSTANT},
    imgcodecs,
    imgproc::{self, CHAIN_APPROX_SIMPLE, LINE_8, RETR_LIST, THRESH_BINARY},
    objdetect,
    prelude::*,
    videoio::{VideoCapture, CAP_ANY},
};
use tracing::{debug, info, warn};

use crate::camera::{Frame, FrameListener, FrameSink, FrameSource};
use crate::cascade::min_face_size;
use crate::config::{EdgeConfig, MotionConfig, OverlayConfig};
use crate::error::{Error, Result};

impl Frame for Mat {
    fn frame_size(&self) -> (u32, u32) {
        (self.cols().max(0) as u32, self.rows().max(0) as u32)
    }
}

fn bgr(color: [u8; 3]) -> Scalar {
    Scalar::new(color[2] as f64, color[1] as f64, color[0] as f64, 0.0)
}

fn find_all_contours(binary: &mut Mat) -> Result<Vector<Vector<Point>>> {
    let mut contours: Vector<Vector<Point>> = Vector::new();
    imgproc::find_contours(binary, &mut contours, RETR_LIST, CHAIN_APPROX_SIMPLE, Point::new(0, 0))?;
    Ok(contours)
}

fn draw_all(frame: &mut Mat, contours: &Vector<Vector<Point>>, color: Scalar, thickness: i32) -> Result<()> {
    imgproc::draw_contours(
        frame,
        contours,
        -1,
        color,
        thickness,
        LINE_8,
        &core::no_array(),
        i32::MAX,
        Point::new(0, 0),
    )?;
    Ok(())
}

// ─── Edge detection ─────────────────────────────────────────────────────────

pub struct CvEdgeDetector {
    cfg: EdgeConfig,
    color: Scalar,
    thickness: i32,
    face_size_ratio: f64,
    min_face_size: u32,
}

impl CvEdgeDetector {
    pub fn new(cfg: EdgeConfig, overlay: &OverlayConfig) -> Self {
        Self {
            cfg,
            color: bgr(overlay.color),
            thickness: overlay.thickness as i32,
            face_size_ratio: 0.2,
            min_face_size: 0,
        }
    }

    pub fn with_face_size_ratio(mut self, ratio: f64) -> Self {
        self.face_size_ratio = ratio;
        self
    }

    pub fn annotate(&self, frame: &mut Mat) -> Result<usize> {
        let mut gray = Mat::default();
        imgproc::cvt_color_def(&*frame, &mut gray, imgproc::COLOR_BGR2GRAY)?;

        let mut edges = Mat::default();
        imgproc::canny(
            &gray,
            &mut edges,
            self.cfg.low_threshold as f64,
            self.cfg.high_threshold as f64,
            self.cfg.aperture_size,
            self.cfg.l2_gradient,
        )?;

        let contours = find_all_contours(&mut edges)?;
        if self.cfg.blackout_boxes {
            for cnt in contours.iter() {
                let rect = imgproc::bounding_rect(&cnt)?;
                imgproc::rectangle(&mut *frame, rect, Scalar::all(0.0), imgproc::FILLED, LINE_8, 0)?;
            }
        }
        draw_all(frame, &contours, self.color, self.thickness)?;
        Ok(contours.len())
    }
}

impl FrameListener for CvEdgeDetector {
    type Frame = Mat;

    fn on_started(&mut self, width: u32, height: u32) {
        self.min_face_size = min_face_size(height, self.face_size_ratio);
        info!(width, height, min_face_size = self.min_face_size, "Edge view started (OpenCV)");
    }

    fn on_frame(&mut self, mut frame: Mat) -> Result<Mat> {
        let found = self.annotate(&mut frame)?;
        debug!(contours = found, "Edge frame processed");
        Ok(frame)
    }
}

// ─── Motion detection ───────────────────────────────────────────────────────

pub struct CvMotionDetector {
    cfg: MotionConfig,
    color: Scalar,
    thickness: i32,
    kernel: Mat,
    first_frame: bool,
    previous: Option<Mat>,
    face_size_ratio: f64,
    min_face_size: u32,
}

impl CvMotionDetector {
    pub fn new(cfg: MotionConfig, overlay: &OverlayConfig) -> Result<Self> {
        let side = cfg.kernel_size.max(1) as i32;
        let kernel = imgproc::get_structuring_element(
            imgproc::MORPH_RECT,
            Size::new(side, side),
            Point::new(-1, -1),
        )?;

        Ok(Self {
            cfg,
            color: bgr(overlay.color),
            thickness: overlay.thickness as i32,
            kernel,
            first_frame: true,
            previous: None,
            face_size_ratio: 0.2,
            min_face_size: 0,
        })
    }

    pub fn with_face_size_ratio(mut self, ratio: f64) -> Self {
        self.face_size_ratio = ratio;
        self
    }

    /// Same contract as [`crate::motion::MotionDetector::annotate`].
    pub fn annotate(&mut self, frame: &mut Mat) -> Result<Option<usize>> {
        let mut gray = Mat::default();
        imgproc::cvt_color_def(&*frame, &mut gray, imgproc::COLOR_BGR2GRAY)?;

        let previous = self.previous.take();
        let found = if self.first_frame {
            self.first_frame = false;
            None
        } else {
            match previous {
                Some(prev) if prev.size()? == gray.size()? => {
                    let mut mask = self.motion_mask(&gray, &prev)?;
                    let contours = find_all_contours(&mut mask)?;
                    draw_all(frame, &contours, self.color, self.thickness)?;
                    Some(contours.len())
                }
                Some(prev) => {
                    warn!(
                        "Frame size changed {:?} → {:?}, treating as first frame",
                        prev.size()?,
                        gray.size()?
                    );
                    None
                }
                None => None,
            }
        };

        self.previous = Some(gray);
        Ok(found)
    }

    fn motion_mask(&self, current: &Mat, previous: &Mat) -> Result<Mat> {
        let mut diff = Mat::default();
        core::absdiff(current, previous, &mut diff)?;

        let mut binary = Mat::default();
        imgproc::threshold(
            &diff,
            &mut binary,
            self.cfg.diff_threshold as f64,
            self.cfg.max_value as f64,
            THRESH_BINARY,
        )?;

        let border = imgproc::morphology_default_border_value()?;
        let mut eroded = Mat::default();
        imgproc::erode(&binary, &mut eroded, &self.kernel, Point::new(-1, -1), 1, BORDER_CONSTANT, border)?;
        let mut dilated = Mat::default();
        imgproc::dilate(&eroded, &mut dilated, &self.kernel, Point::new(-1, -1), 1, BORDER_CONSTANT, border)?;
        Ok(dilated)
    }
}

impl FrameListener for CvMotionDetector {
    type Frame = Mat;

    fn on_started(&mut self, width: u32, height: u32) {
        self.first_frame = true;
        self.previous = None;
        self.min_face_size = min_face_size(height, self.face_size_ratio);
        info!(width, height, min_face_size = self.min_face_size, "Motion view started (OpenCV)");
    }

    fn on_stopped(&mut self) {
        self.previous = None;
    }

    fn on_frame(&mut self, mut frame: Mat) -> Result<Mat> {
        match self.annotate(&mut frame)? {
            Some(regions) => debug!(regions, "Motion frame processed"),
            None => debug!("Motion baseline frame stored"),
        }
        Ok(frame)
    }
}

// ─── Capture + output ───────────────────────────────────────────────────────

/// Live camera (device index) or a video file / stream URL.
pub struct DeviceCapture {
    cap: VideoCapture,
    label: String,
}

impl DeviceCapture {
    pub fn open_device(index: i32) -> Result<Self> {
        info!("Opening camera device {}", index);
        let cap = VideoCapture::new(index, CAP_ANY)?;
        Self::checked(cap, format!("device {}", index))
    }

    pub fn open_url(url: &str) -> Result<Self> {
        info!("Opening video {}", url);
        let cap = VideoCapture::from_file(url, CAP_ANY)?;
        Self::checked(cap, url.to_string())
    }

    fn checked(cap: VideoCapture, label: String) -> Result<Self> {
        if !cap.is_opened()? {
            return Err(Error::EmptySource(PathBuf::from(label)));
        }
        Ok(Self { cap, label })
    }
}

impl FrameSource for DeviceCapture {
    type Frame = Mat;

    fn next_frame(&mut self) -> Result<Option<Mat>> {
        let mut frame = Mat::default();
        if !self.cap.read(&mut frame)? || frame.empty() {
            debug!("Capture {} ended", self.label);
            return Ok(None);
        }
        Ok(Some(frame))
    }
}

/// Writes delivered frames as `frame_000000.png`, … via `imwrite`.
pub struct MatWriter {
    dir: PathBuf,
}

impl MatWriter {
    pub fn create(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }
}

impl FrameSink<Mat> for MatWriter {
    fn deliver(&mut self, index: u64, frame: Mat) -> Result<()> {
        let path = self.dir.join(format!("frame_{:06}.png", index));
        let written = imgcodecs::imwrite(&path.to_string_lossy(), &frame, &Vector::new())?;
        if !written {
            warn!("imwrite refused {}", path.display());
        }
        Ok(())
    }
}

/// Load the cascade through OpenCV's own parser. An empty classifier means
/// OpenCV could not read the file.
pub fn load_native_cascade(path: &Path) -> Result<()> {
    let classifier = objdetect::CascadeClassifier::new(&path.to_string_lossy())?;
    if classifier.empty()? {
        return Err(Error::InvalidCascade {
            path: path.to_path_buf(),
            reason: "OpenCV loaded an empty classifier".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::core::{Rect, Vec3b, CV_8UC3};

    fn dark() -> Mat {
        Mat::new_rows_cols_with_default(64, 64, CV_8UC3, Scalar::all(20.0)).unwrap()
    }

    fn with_square() -> Mat {
        let mut m = dark();
        imgproc::rectangle(&mut m, Rect::new(20, 20, 16, 16), Scalar::all(220.0), imgproc::FILLED, LINE_8, 0)
            .unwrap();
        m
    }

    #[test]
    fn test_motion_square_is_outlined_in_red() {
        let mut det = CvMotionDetector::new(MotionConfig::default(), &OverlayConfig::default()).unwrap();
        let mut first = dark();
        assert_eq!(det.annotate(&mut first).unwrap(), None);

        let mut second = with_square();
        assert!(det.annotate(&mut second).unwrap().unwrap() >= 1);
        let px = second.at_2d::<Vec3b>(20, 20).unwrap();
        assert_eq!(px.0, [0, 0, 255]);
    }

    #[test]
    fn test_motion_identical_frames() {
        let mut det = CvMotionDetector::new(MotionConfig::default(), &OverlayConfig::default()).unwrap();
        let mut a = with_square();
        let mut b = with_square();
        det.annotate(&mut a).unwrap();
        assert_eq!(det.annotate(&mut b).unwrap(), Some(0));
    }

    #[test]
    fn test_edges_black_out_square() {
        let det = CvEdgeDetector::new(EdgeConfig::default(), &OverlayConfig::default());
        let mut frame = with_square();
        assert!(det.annotate(&mut frame).unwrap() > 0);
        let centre = frame.at_2d::<Vec3b>(28, 28).unwrap();
        assert_eq!(centre.0, [0, 0, 0]);
    }
}
