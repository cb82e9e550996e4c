//! detection — field-of-view circle detection
//!
//! Grayscale, Gaussian blur, then a Hough gradient transform whose radius
//! band is tied to the image size: the field of view is expected to fill most
//! of the frame, so tiny and full-frame circles are never considered.

pub mod hough;

use image::DynamicImage;
use imageproc::filter::gaussian_blur_f32;
use tracing::debug;

use self::hough::{hough_circles, HoughParams};

// ── Constants ────────────────────────────────────────────────────────────────

/// Gaussian blur sigma applied before edge detection.
const BLUR_SIGMA: f32 = 1.5;
/// Accumulator resolution ratio.
const ACCUMULATOR_RATIO: f32 = 1.2;
/// Upper Canny threshold.
const CANNY_HIGH: f32 = 100.0;
/// Accumulator votes needed for a center candidate.
const ACCUMULATOR_THRESHOLD: u32 = 30;
/// Radius search band as fractions of the smaller image dimension.
const MIN_RADIUS_FRACTION: f64 = 0.30;
const MAX_RADIUS_FRACTION: f64 = 0.48;
/// Share of the circumference a circle's edge pixels must cover.
const MIN_ARC_COVERAGE: f32 = 0.5;

// ── Public types ─────────────────────────────────────────────────────────────

/// Pixel-space circle. `r` is always positive for circles produced by this
/// crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Circle {
    pub x: i32,
    pub y: i32,
    pub r: i32,
}

impl Circle {
    pub fn new(x: i32, y: i32, r: i32) -> Self {
        Self { x, y, r }
    }
}

impl std::fmt::Display for Circle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "x={}, y={}, r={}", self.x, self.y, self.r)
    }
}

/// Outcome of running the detector on one decoded image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detection {
    Found(Circle),
    NotFound,
}

impl Detection {
    pub fn circle(&self) -> Option<Circle> {
        match self {
            Detection::Found(c) => Some(*c),
            Detection::NotFound => None,
        }
    }
}

// ── Detector ─────────────────────────────────────────────────────────────────

/// Hough-based field-of-view detector.
#[derive(Debug, Clone, Copy)]
pub struct Detector {
    blur_sigma: f32,
    dp: f32,
    canny_high: f32,
    acc_threshold: u32,
    min_radius_fraction: f64,
    max_radius_fraction: f64,
    min_coverage: f32,
}

impl Default for Detector {
    fn default() -> Self {
        Self {
            blur_sigma: BLUR_SIGMA,
            dp: ACCUMULATOR_RATIO,
            canny_high: CANNY_HIGH,
            acc_threshold: ACCUMULATOR_THRESHOLD,
            min_radius_fraction: MIN_RADIUS_FRACTION,
            max_radius_fraction: MAX_RADIUS_FRACTION,
            min_coverage: MIN_ARC_COVERAGE,
        }
    }
}

impl Detector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transform parameters for a `width × height` image.
    pub fn params_for(&self, width: u32, height: u32) -> HoughParams {
        let min_dim = width.min(height);
        HoughParams {
            dp: self.dp,
            min_dist: (min_dim / 2) as f32,
            canny_high: self.canny_high,
            acc_threshold: self.acc_threshold,
            min_radius: (min_dim as f64 * self.min_radius_fraction) as u32,
            max_radius: (min_dim as f64 * self.max_radius_fraction) as u32,
            min_coverage: self.min_coverage,
        }
    }

    /// Find the strongest field-of-view circle in `image`.
    pub fn detect(&self, image: &DynamicImage) -> Detection {
        let gray = image.to_luma8();
        let blurred = gaussian_blur_f32(&gray, self.blur_sigma);
        let params = self.params_for(gray.width(), gray.height());

        match hough_circles(&blurred, &params, 1).first() {
            Some(c) => {
                let circle = Circle::new(c.x.round() as i32, c.y.round() as i32, c.r.round() as i32);
                debug!(
                    %circle,
                    votes = c.votes,
                    support = c.support,
                    coverage = c.coverage,
                    "field of view found"
                );
                if circle.r > 0 {
                    Detection::Found(circle)
                } else {
                    Detection::NotFound
                }
            }
            None => {
                debug!(
                    min_radius = params.min_radius,
                    max_radius = params.max_radius,
                    "no field of view in radius band"
                );
                Detection::NotFound
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::draw_field_of_view;
    use image::{Rgb, RgbImage};
    use imageproc::drawing::draw_filled_rect_mut;
    use imageproc::rect::Rect;

    #[test]
    fn params_follow_smaller_dimension() {
        let p = Detector::new().params_for(640, 400);
        assert_eq!(p.min_dist, 200.0);
        assert_eq!(p.min_radius, 120);
        assert_eq!(p.max_radius, 192);
        assert_eq!(p.acc_threshold, 30);
        assert_eq!(p.min_coverage, 0.5);
    }

    #[test]
    fn detects_field_of_view() {
        let img = DynamicImage::ImageRgb8(draw_field_of_view(400, 360, (205, 178), 150));
        let Detection::Found(c) = Detector::new().detect(&img) else {
            panic!("expected a circle");
        };
        assert!((c.x - 205).abs() <= 3, "{c}");
        assert!((c.y - 178).abs() <= 3, "{c}");
        assert!((c.r - 150).abs() <= 3, "{c}");
    }

    #[test]
    fn detects_large_field_of_view() {
        let img = DynamicImage::ImageRgb8(draw_field_of_view(800, 760, (400, 380), 300));
        let Detection::Found(c) = Detector::new().detect(&img) else {
            panic!("expected a circle");
        };
        assert!((c.x - 400).abs() <= 3, "{c}");
        assert!((c.y - 380).abs() <= 3, "{c}");
        assert!((c.r - 300).abs() <= 3, "{c}");
    }

    #[test]
    fn uniform_image_is_not_found() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(300, 300, Rgb([90, 90, 90])));
        assert_eq!(Detector::new().detect(&img), Detection::NotFound);
    }

    #[test]
    fn full_frame_rectangle_is_not_found() {
        let mut img = RgbImage::from_pixel(300, 300, Rgb([10, 10, 10]));
        draw_filled_rect_mut(&mut img, Rect::at(15, 15).of_size(270, 270), Rgb([220, 220, 220]));
        assert_eq!(
            Detector::new().detect(&DynamicImage::ImageRgb8(img)),
            Detection::NotFound
        );
    }

    #[test]
    fn circle_outside_band_is_not_found() {
        // radius 40 is far below 30% of 300
        let img = DynamicImage::ImageRgb8(draw_field_of_view(300, 300, (150, 150), 40));
        assert_eq!(Detector::new().detect(&img), Detection::NotFound);
    }
}
