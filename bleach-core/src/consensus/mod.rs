//! consensus — one field-of-view circle for the whole batch
//!
//! Per-axis medians over every detected circle, then a radius reduction that
//! pulls the boundary inward past the vignetted rim. The median of each axis
//! is taken independently, so a single bad detection cannot drag the result
//! even when it disagrees on only one coordinate.

use tracing::info;

use crate::detection::{Circle, Detection};
use crate::error::SessionError;

/// Batch-wide circle: raw medians plus the reduced working radius.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Consensus {
    pub x: i32,
    pub y: i32,
    /// Median radius before reduction.
    pub r: i32,
    /// `max(1, r - reduce_radius)`.
    pub reduced_r: i32,
    /// Number of circles the medians were taken over.
    pub detected: usize,
}

impl Consensus {
    /// The circle every image is masked to.
    pub fn circle(&self) -> Circle {
        Circle::new(self.x, self.y, self.reduced_r)
    }
}

/// Median of integer samples.
///
/// Odd counts take the middle value. Even counts average the two central
/// values and truncate toward zero, so `[298, 300, 305, 310]` gives `302`.
pub fn median(values: &[i32]) -> Option<i32> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        Some(sorted[mid])
    } else {
        let sum = sorted[mid - 1] as i64 + sorted[mid] as i64;
        Some((sum / 2) as i32)
    }
}

/// Shrink `r` by `reduce_radius`, never below one pixel.
pub fn reduce_radius(r: i32, reduce_radius: u32) -> i32 {
    (r as i64 - reduce_radius as i64).max(1) as i32
}

/// Build the consensus from detected circles.
pub fn from_circles(circles: &[Circle], reduce: u32) -> Result<Consensus, SessionError> {
    let xs: Vec<i32> = circles.iter().map(|c| c.x).collect();
    let ys: Vec<i32> = circles.iter().map(|c| c.y).collect();
    let rs: Vec<i32> = circles.iter().map(|c| c.r).collect();

    let (Some(x), Some(y), Some(r)) = (median(&xs), median(&ys), median(&rs)) else {
        return Err(SessionError::NoCircles);
    };

    let consensus = Consensus {
        x,
        y,
        r,
        reduced_r: reduce_radius(r, reduce),
        detected: circles.len(),
    };
    info!(
        x,
        y,
        r,
        reduced_r = consensus.reduced_r,
        detected = consensus.detected,
        "consensus circle computed"
    );
    Ok(consensus)
}

/// Aggregate per-image detections. `NotFound` entries are skipped; with no
/// `Found` entry at all the batch has no consensus.
pub fn aggregate<'a, I>(detections: I, reduce: u32) -> Result<Consensus, SessionError>
where
    I: IntoIterator<Item = &'a Detection>,
{
    let circles: Vec<Circle> = detections
        .into_iter()
        .filter_map(Detection::circle)
        .collect();
    from_circles(&circles, reduce)
}
