//! hough — gradient-voting circle transform
//!
//! Every edge pixel votes along its gradient line, in both directions, for
//! every radius in the search band. Small errors in the Sobel directions
//! smear the votes around the true center, so accumulator peaks are only
//! seeds: each seed is refined by repeatedly fitting a circle to the edge
//! pixels near its current estimate. Refined circles are ranked by how many
//! edge pixels lie on them, and kept only when those pixels cover enough of
//! the circumference to rule out straight edges grazing a circle.

use std::f64::consts::{PI, TAU};

use image::GrayImage;
use imageproc::edges::canny;
use imageproc::gradients::{horizontal_sobel, vertical_sobel};
use nalgebra::{Matrix3, Vector3};

// ── Tuning constants ─────────────────────────────────────────────────────────

/// Accumulator peaks refined per image.
const MAX_SEEDS: usize = 8;
/// Fit rounds per seed. The inlier band halves every round.
const REFINE_ROUNDS: usize = 6;
/// Edge pixels closer than this to a circle support it.
const SUPPORT_TOLERANCE: f64 = 2.0;
/// Angular bins used to measure how much of a circle its support covers.
const COVERAGE_BINS: usize = 64;

/// Parameters of the Hough gradient transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HoughParams {
    /// Inverse accumulator resolution: one accumulator cell spans `dp` pixels.
    pub dp: f32,
    /// Minimum distance between the centers of two accepted circles.
    pub min_dist: f32,
    /// Upper Canny threshold. The lower threshold is half of it.
    pub canny_high: f32,
    /// Votes a seed needs, and edge support a circle needs, to be kept.
    pub acc_threshold: u32,
    pub min_radius: u32,
    pub max_radius: u32,
    /// Fraction of the circumference the supporting edge pixels must cover.
    pub min_coverage: f32,
}

/// A circle found by [`hough_circles`], in sub-pixel image coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HoughCircle {
    pub x: f32,
    pub y: f32,
    pub r: f32,
    /// Accumulator votes of the seed cell.
    pub votes: u32,
    /// Edge pixels within [`SUPPORT_TOLERANCE`] of the circle.
    pub support: usize,
    /// Fraction of the circumference those pixels cover, in `[0, 1]`.
    pub coverage: f32,
}

/// Accumulator with a one-cell zero border so peak checks never go out of
/// bounds.
struct Accumulator {
    cols: usize,
    rows: usize,
    votes: Vec<u32>,
}

impl Accumulator {
    fn new(cols: usize, rows: usize) -> Self {
        Self {
            cols,
            rows,
            votes: vec![0; (cols + 2) * (rows + 2)],
        }
    }

    fn index(&self, col: usize, row: usize) -> usize {
        (row + 1) * (self.cols + 2) + col + 1
    }

    /// Casts a vote at accumulator coordinates `(ax, ay)`. Returns `false`
    /// once the point has left the accumulator.
    fn vote(&mut self, ax: f32, ay: f32) -> bool {
        if ax < 0.0 || ay < 0.0 {
            return false;
        }
        let (col, row) = (ax as usize, ay as usize);
        if col >= self.cols || row >= self.rows {
            return false;
        }
        let idx = self.index(col, row);
        self.votes[idx] += 1;
        true
    }

    /// Cells above `threshold` that are peaks against their 4-neighbours,
    /// strongest first. Ties keep raster order.
    fn peaks(&self, threshold: u32) -> Vec<(usize, usize, u32)> {
        let stride = self.cols + 2;
        let mut peaks = Vec::new();
        for row in 0..self.rows {
            for col in 0..self.cols {
                let i = self.index(col, row);
                let v = self.votes[i];
                if v > threshold
                    && v > self.votes[i - 1]
                    && v >= self.votes[i + 1]
                    && v > self.votes[i - stride]
                    && v >= self.votes[i + stride]
                {
                    peaks.push((col, row, v));
                }
            }
        }
        peaks.sort_by(|a, b| b.2.cmp(&a.2));
        peaks
    }
}

/// Circle estimate in image coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Fit {
    x: f64,
    y: f64,
    r: f64,
}

/// Detect up to `max_circles` circles in `gray`, best supported first.
///
/// `gray` is expected to be denoised already; Canny runs on it directly.
pub fn hough_circles(gray: &GrayImage, params: &HoughParams, max_circles: usize) -> Vec<HoughCircle> {
    let (width, height) = gray.dimensions();
    if width == 0
        || height == 0
        || max_circles == 0
        || params.dp <= 0.0
        || params.min_radius > params.max_radius
    {
        return Vec::new();
    }

    let low = (params.canny_high / 2.0).max(1.0);
    let edges = canny(gray, low, params.canny_high.max(low));
    let gx = horizontal_sobel(gray);
    let gy = vertical_sobel(gray);

    let idp = 1.0 / params.dp;
    let mut acc = Accumulator::new(
        (width as f32 * idp).ceil() as usize,
        (height as f32 * idp).ceil() as usize,
    );
    let mut edge_points: Vec<(f32, f32)> = Vec::new();

    for (x, y, px) in edges.enumerate_pixels() {
        if px[0] == 0 {
            continue;
        }
        let vx = gx.get_pixel(x, y)[0] as f32;
        let vy = gy.get_pixel(x, y)[0] as f32;
        if vx == 0.0 && vy == 0.0 {
            continue;
        }
        let mag = vx.hypot(vy);
        let (sx, sy) = (vx * idp / mag, vy * idp / mag);
        let (x0, y0) = (x as f32 * idp, y as f32 * idp);

        for sign in [1.0f32, -1.0] {
            for r in params.min_radius..=params.max_radius {
                let step = sign * r as f32;
                if !acc.vote(x0 + sx * step, y0 + sy * step) {
                    break;
                }
            }
        }
        edge_points.push((x as f32, y as f32));
    }

    let seeds = acc.peaks(params.acc_threshold);
    tracing::trace!(
        edges = edge_points.len(),
        seeds = seeds.len(),
        "hough accumulator filled"
    );

    let (min_r, max_r) = (params.min_radius as f64, params.max_radius as f64);
    let mut candidates: Vec<HoughCircle> = seeds
        .into_iter()
        .take(MAX_SEEDS)
        .filter_map(|(col, row, votes)| {
            let seed = ((col as f32 + 0.5) * params.dp, (row as f32 + 0.5) * params.dp);
            let fit = refine(&edge_points, seed, params)?;
            if fit.r < min_r || fit.r > max_r {
                return None;
            }
            let (support, coverage) = support(&edge_points, fit);
            let accepted =
                support > params.acc_threshold as usize && coverage >= params.min_coverage;
            accepted.then_some(HoughCircle {
                x: fit.x as f32,
                y: fit.y as f32,
                r: fit.r as f32,
                votes,
                support,
                coverage,
            })
        })
        .collect();
    candidates.sort_by(|a, b| b.support.cmp(&a.support).then(b.votes.cmp(&a.votes)));

    let min_dist_sq = params.min_dist * params.min_dist;
    let mut circles: Vec<HoughCircle> = Vec::new();
    for candidate in candidates {
        let too_close = circles.iter().any(|c| {
            let (dx, dy) = (c.x - candidate.x, c.y - candidate.y);
            dx * dx + dy * dy < min_dist_sq
        });
        if too_close {
            continue;
        }
        circles.push(candidate);
        if circles.len() >= max_circles {
            break;
        }
    }

    circles
}

/// Pull a seed center onto the circle its nearby edge pixels describe.
///
/// The first radius guess is the densest coarse distance shell around the
/// seed. Each round then fits a circle to the edge pixels inside a band
/// around the current estimate and halves the band.
fn refine(points: &[(f32, f32)], seed: (f32, f32), params: &HoughParams) -> Option<Fit> {
    let (min_r, max_r) = (params.min_radius as f32, params.max_radius as f32);
    let coarse = (0.05 * max_r).max(4.0 * params.dp);

    let mut dists: Vec<f32> = points
        .iter()
        .map(|&(px, py)| (seed.0 - px).hypot(seed.1 - py))
        .filter(|d| (min_r..=max_r).contains(d))
        .collect();
    dists.sort_by(f32::total_cmp);
    let (r0, _) = best_shell(&dists, coarse)?;

    let mut fit = Fit {
        x: seed.0 as f64,
        y: seed.1 as f64,
        r: r0 as f64,
    };
    let mut band = coarse as f64;
    let mut inliers: Vec<(f64, f64)> = Vec::with_capacity(points.len());
    for _ in 0..REFINE_ROUNDS {
        inliers.clear();
        inliers.extend(
            points
                .iter()
                .map(|&(px, py)| (px as f64, py as f64))
                .filter(|&(px, py)| ((px - fit.x).hypot(py - fit.y) - fit.r).abs() <= band),
        );
        fit = fit_circle(&inliers)?;
        band = (band / 2.0).max(SUPPORT_TOLERANCE);
    }
    Some(fit)
}

/// Algebraic least-squares circle through `points`.
///
/// Solves `u² + v² = 2a·u + 2b·v + c` on mean-centred coordinates; the
/// center is `(a, b)` and the radius `sqrt(c + a² + b²)`.
fn fit_circle(points: &[(f64, f64)]) -> Option<Fit> {
    if points.len() < 3 {
        return None;
    }
    let n = points.len() as f64;
    let (sx, sy) = points
        .iter()
        .fold((0.0, 0.0), |(sx, sy), &(x, y)| (sx + x, sy + y));
    let (mx, my) = (sx / n, sy / n);

    let mut normal = Matrix3::<f64>::zeros();
    let mut rhs = Vector3::<f64>::zeros();
    for &(x, y) in points {
        let (u, v) = (x - mx, y - my);
        let row = Vector3::new(u, v, 1.0);
        normal += row * row.transpose();
        rhs += row * (u * u + v * v);
    }

    let sol = normal.lu().solve(&rhs)?;
    let (a, b) = (sol[0] / 2.0, sol[1] / 2.0);
    let r_sq = sol[2] + a * a + b * b;
    if !(r_sq > 0.0) || !a.is_finite() || !b.is_finite() {
        return None;
    }
    Some(Fit {
        x: mx + a,
        y: my + b,
        r: r_sq.sqrt(),
    })
}

/// Edge pixels on `fit` and the fraction of angular bins they reach.
fn support(points: &[(f32, f32)], fit: Fit) -> (usize, f32) {
    let mut bins = [false; COVERAGE_BINS];
    let mut count = 0usize;
    for &(px, py) in points {
        let (dx, dy) = (px as f64 - fit.x, py as f64 - fit.y);
        if (dx.hypot(dy) - fit.r).abs() > SUPPORT_TOLERANCE {
            continue;
        }
        count += 1;
        let turn = (dy.atan2(dx) + PI) / TAU;
        let bin = (turn * COVERAGE_BINS as f64) as usize;
        bins[bin.min(COVERAGE_BINS - 1)] = true;
    }
    let covered = bins.iter().filter(|&&hit| hit).count();
    (count, covered as f32 / COVERAGE_BINS as f32)
}

/// Group ascending distances into shells no wider than `width` and return
/// the radius and size of the shell with the best support per unit radius.
fn best_shell(sorted: &[f32], width: f32) -> Option<(f32, usize)> {
    let first = *sorted.first()?;
    let mut best: Option<(f32, usize)> = None;
    let mut start = 0usize;
    let mut start_dist = first;

    for j in 1..=sorted.len() {
        let closes = match sorted.get(j) {
            Some(&d) => d - start_dist > width,
            None => true,
        };
        if !closes {
            continue;
        }

        let count = j - start;
        let r = sorted[(start + j) / 2];
        let better = match best {
            None => true,
            // count / r >= best_count / best_r, cross-multiplied
            Some((best_r, best_count)) => count as f32 * best_r >= best_count as f32 * r,
        };
        if better {
            best = Some((r, count));
        }

        if let Some(&d) = sorted.get(j) {
            start = j;
            start_dist = d;
        }
    }

    best
}
