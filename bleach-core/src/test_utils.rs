//! Shared synthetic images for unit tests.

use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::drawing::draw_filled_circle_mut;

/// Grayscale image of a filled disk of value `fg` on a `bg` background.
pub(crate) fn draw_disk_gray(
    w: u32,
    h: u32,
    center: (i32, i32),
    radius: i32,
    fg: u8,
    bg: u8,
) -> GrayImage {
    let mut img = GrayImage::from_pixel(w, h, Luma([bg]));
    draw_filled_circle_mut(&mut img, center, radius, Luma([fg]));
    img
}

/// Colour "microscope frame": a bright tinted field of view on a dark
/// vignette.
pub(crate) fn draw_field_of_view(w: u32, h: u32, center: (i32, i32), radius: i32) -> RgbImage {
    let mut img = RgbImage::from_pixel(w, h, Rgb([12, 10, 14]));
    draw_filled_circle_mut(&mut img, center, radius, Rgb([210, 180, 150]));
    img
}

/// Image whose every pixel is distinct enough to catch accidental blending.
pub(crate) fn gradient_rgb(w: u32, h: u32) -> RgbImage {
    RgbImage::from_fn(w, h, |x, y| {
        Rgb([
            (x % 200) as u8,
            (y % 200) as u8,
            ((x + y) % 200) as u8,
        ])
    })
}
