//! rendering — bleach everything outside the consensus circle
//!
//! Each pixel gets a weight from its distance `d` to the circle center:
//! 1 well inside, 0 at and beyond the radius, and a linear ramp across a
//! fade ring of `max(1, floor(r * fade_ratio))` pixels just inside the
//! boundary. Every channel is blended toward its maximum by that weight, so
//! colour goes to white and alpha to opaque. Image dimensions never change.

use image::{DynamicImage, ImageBuffer, Pixel};
use rayon::prelude::*;

use crate::detection::Circle;

/// Channel types the masker can blend toward white.
trait Channel: Copy + Send + Sync {
    /// Saturated channel value.
    const WHITE: Self;
    fn level(self) -> f64;
    fn from_level(v: f64) -> Self;
}

impl Channel for u8 {
    const WHITE: Self = u8::MAX;
    fn level(self) -> f64 {
        self as f64
    }
    fn from_level(v: f64) -> Self {
        v.round().clamp(0.0, u8::MAX as f64) as u8
    }
}

impl Channel for u16 {
    const WHITE: Self = u16::MAX;
    fn level(self) -> f64 {
        self as f64
    }
    fn from_level(v: f64) -> Self {
        v.round().clamp(0.0, u16::MAX as f64) as u16
    }
}

impl Channel for f32 {
    const WHITE: Self = 1.0;
    fn level(self) -> f64 {
        self as f64
    }
    fn from_level(v: f64) -> Self {
        v as f32
    }
}

/// Width of the fade ring in pixels for radius `r`.
pub fn fade_width(r: i32, fade_ratio: f64) -> f64 {
    (r as f64 * fade_ratio).floor().max(1.0)
}

/// Blend weight of a pixel at distance `d` from the center.
pub fn fade_weight(d: f64, r: f64, fade_width: f64) -> f64 {
    if d >= r {
        0.0
    } else if d >= r - fade_width {
        (r - d) / fade_width
    } else {
        1.0
    }
}

fn distance(col: u32, row: u32, circle: Circle) -> f64 {
    let dx = col as f64 - circle.x as f64;
    let dy = row as f64 - circle.y as f64;
    dx.hypot(dy)
}

/// Return a bleached copy of `image`.
pub fn bleach(image: &DynamicImage, circle: Circle, fade_ratio: f64) -> DynamicImage {
    let mut out = image.clone();
    bleach_inplace(&mut out, circle, fade_ratio);
    out
}

/// Bleach `image` in place.
pub fn bleach_inplace(image: &mut DynamicImage, circle: Circle, fade_ratio: f64) {
    let fw = fade_width(circle.r, fade_ratio);
    match image {
        DynamicImage::ImageLuma8(buf) => bleach_buffer(buf, circle, fw),
        DynamicImage::ImageLumaA8(buf) => bleach_buffer(buf, circle, fw),
        DynamicImage::ImageRgb8(buf) => bleach_buffer(buf, circle, fw),
        DynamicImage::ImageRgba8(buf) => bleach_buffer(buf, circle, fw),
        DynamicImage::ImageLuma16(buf) => bleach_buffer(buf, circle, fw),
        DynamicImage::ImageLumaA16(buf) => bleach_buffer(buf, circle, fw),
        DynamicImage::ImageRgb16(buf) => bleach_buffer(buf, circle, fw),
        DynamicImage::ImageRgba16(buf) => bleach_buffer(buf, circle, fw),
        DynamicImage::ImageRgb32F(buf) => bleach_buffer(buf, circle, fw),
        DynamicImage::ImageRgba32F(buf) => bleach_buffer(buf, circle, fw),
        other => {
            let mut rgba = other.to_rgba8();
            bleach_buffer(&mut rgba, circle, fw);
            *other = DynamicImage::ImageRgba8(rgba);
        }
    }
}

/// Blend every channel of every pixel toward its maximum.
fn bleach_buffer<P>(
    buf: &mut ImageBuffer<P, Vec<P::Subpixel>>,
    circle: Circle,
    fade_width: f64,
) where
    P: Pixel,
    P::Subpixel: Channel,
{
    let width = buf.width();
    let channels = P::CHANNEL_COUNT as usize;
    let row_len = width as usize * channels;
    if row_len == 0 {
        return;
    }
    let r = circle.r as f64;
    let white = <P::Subpixel as Channel>::WHITE;
    let raw: &mut [P::Subpixel] = buf;

    raw.par_chunks_mut(row_len)
        .enumerate()
        .for_each(|(row, line)| {
            for (col, px) in line.chunks_exact_mut(channels).enumerate() {
                let w = fade_weight(distance(col as u32, row as u32, circle), r, fade_width);
                if w >= 1.0 {
                    continue;
                }
                for ch in px.iter_mut() {
                    *ch = if w <= 0.0 {
                        white
                    } else {
                        let blended = ch.level() * w + white.level() * (1.0 - w);
                        <P::Subpixel as Channel>::from_level(blended)
                    };
                }
            }
        });
}

/// Number of pixels of a `width × height` image that land strictly inside
/// the fade ring, i.e. with a weight in (0, 1).
pub fn count_fade_pixels(width: u32, height: u32, circle: Circle, fade_ratio: f64) -> usize {
    let fw = fade_width(circle.r, fade_ratio);
    let r = circle.r as f64;
    (0..height)
        .into_par_iter()
        .map(|row| {
            (0..width)
                .filter(|&col| {
                    let w = fade_weight(distance(col, row, circle), r, fw);
                    w > 0.0 && w < 1.0
                })
                .count()
        })
        .sum()
}
