//! Contour helpers shared by the edge and motion pipelines.
//!
//! Thin wrappers over `imageproc`: luma conversion, border following,
//! bounding boxes, box blackout and thick polyline overlays on RGB frames.

use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::{
    contours::find_contours as follow_borders,
    drawing::{draw_filled_circle_mut, draw_filled_rect_mut},
    point::Point,
    rect::Rect,
};

use crate::config::OverlayConfig;

/// Boundary of one connected region, compressed to its corner points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contour {
    pub points: Vec<Point<i32>>,
}

/// Axis-aligned box, inclusive of the extreme points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct OverlayStyle {
    pub color: Rgb<u8>,
    pub thickness: u32,
}

impl From<&OverlayConfig> for OverlayStyle {
    fn from(cfg: &OverlayConfig) -> Self {
        Self {
            color: Rgb(cfg.color),
            thickness: cfg.thickness,
        }
    }
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self::from(&OverlayConfig::default())
    }
}

/// Luma with the BT.601 weights OpenCV uses for `RGB2GRAY`
/// (0.299 R + 0.587 G + 0.114 B, rounded). `imageops::grayscale` weights
/// by Rec.709 instead, which darkens red and blue.
pub fn to_gray(frame: &RgbImage) -> GrayImage {
    GrayImage::from_fn(frame.width(), frame.height(), |x, y| {
        let Rgb([r, g, b]) = *frame.get_pixel(x, y);
        let luma = 299 * r as u32 + 587 * g as u32 + 114 * b as u32;
        Luma([((luma + 500) / 1000) as u8])
    })
}

/// All outer and hole borders of the non-zero regions of `binary`, flat
/// (no hierarchy). Runs of points along one direction are collapsed to
/// their end points.
pub fn find_contours(binary: &GrayImage) -> Vec<Contour> {
    follow_borders::<i32>(binary)
        .into_iter()
        .filter(|c| !c.points.is_empty())
        .map(|c| Contour {
            points: compress_runs(c.points),
        })
        .collect()
}

fn compress_runs(points: Vec<Point<i32>>) -> Vec<Point<i32>> {
    let n = points.len();
    if n < 3 {
        return points;
    }
    let step = |a: Point<i32>, b: Point<i32>| ((b.x - a.x).signum(), (b.y - a.y).signum());

    let kept: Vec<Point<i32>> = (0..n)
        .filter(|&i| {
            let prev = points[(i + n - 1) % n];
            let next = points[(i + 1) % n];
            step(prev, points[i]) != step(points[i], next)
        })
        .map(|i| points[i])
        .collect();

    if kept.is_empty() {
        vec![points[0]]
    } else {
        kept
    }
}

impl Contour {
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        let first = self.points.first()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for p in &self.points[1..] {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        Some(BoundingBox {
            x: min_x,
            y: min_y,
            width: (max_x - min_x + 1) as u32,
            height: (max_y - min_y + 1) as u32,
        })
    }
}

/// Fill `bbox` with black. Parts outside the frame are ignored.
pub fn blackout(frame: &mut RgbImage, bbox: BoundingBox) {
    let rect = Rect::at(bbox.x, bbox.y).of_size(bbox.width, bbox.height);
    draw_filled_rect_mut(frame, rect, Rgb([0, 0, 0]));
}

/// Draw every contour as a closed polyline.
pub fn draw_contours(frame: &mut RgbImage, contours: &[Contour], style: OverlayStyle) {
    let radius = (style.thickness / 2) as i32;
    for contour in contours {
        let pts = &contour.points;
        if pts.len() == 1 {
            stamp(frame, pts[0].x, pts[0].y, radius, style.color);
            continue;
        }
        for (i, a) in pts.iter().enumerate() {
            let b = pts[(i + 1) % pts.len()];
            let (dx, dy) = (b.x - a.x, b.y - a.y);
            let steps = dx.abs().max(dy.abs()).max(1);
            for s in 0..=steps {
                stamp(frame, a.x + dx * s / steps, a.y + dy * s / steps, radius, style.color);
            }
        }
    }
}

fn stamp(frame: &mut RgbImage, x: i32, y: i32, radius: i32, color: Rgb<u8>) {
    if radius > 0 {
        draw_filled_circle_mut(frame, (x, y), radius, color);
    } else if x >= 0 && y >= 0 && (x as u32) < frame.width() && (y as u32) < frame.height() {
        frame.put_pixel(x as u32, y as u32, color);
    }
}
