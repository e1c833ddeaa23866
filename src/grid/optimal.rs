//! Optimization-based grid finder.
//!
//! Per axis, the finder seeds a uniform binning over the span of the detected
//! objects and then minimizes the squared error between object centers and
//! bin midpoints, adjusting bin offset and pitch by coordinate descent with a
//! bounded golden-section line search.

use log::debug;

use crate::error::{Error, Result};
use crate::grid::{GridEdges, GridFinder};
use crate::image::Image;
use crate::objects::collect_regions;

const GOLDEN_RATIO: f64 = 0.618_033_988_749_894_8;
const LINE_SEARCH_ITERS: usize = 40;
const DESCENT_ROUNDS: usize = 6;

/// Bounded scalar minimization by golden-section search.
fn minimize_scalar<F: Fn(f64) -> f64>(f: F, mut lo: f64, mut hi: f64) -> f64 {
    let mut a = hi - GOLDEN_RATIO * (hi - lo);
    let mut b = lo + GOLDEN_RATIO * (hi - lo);
    let mut fa = f(a);
    let mut fb = f(b);
    for _ in 0..LINE_SEARCH_ITERS {
        if fa < fb {
            hi = b;
            b = a;
            fb = fa;
            a = hi - GOLDEN_RATIO * (hi - lo);
            fa = f(a);
        } else {
            lo = a;
            a = b;
            fa = fb;
            b = lo + GOLDEN_RATIO * (hi - lo);
            fb = f(b);
        }
    }
    (lo + hi) / 2.0
}

/// Sum of squared distances from each value to the midpoint of its nearest
/// bin under (offset, pitch, n) binning.
fn midpoint_sse(values: &[f64], offset: f64, pitch: f64, n: usize) -> f64 {
    values
        .iter()
        .map(|&v| {
            let k = ((v - offset) / pitch - 0.5).round();
            let k = k.clamp(0.0, (n - 1) as f64);
            let mid = offset + (k + 0.5) * pitch;
            (v - mid) * (v - mid)
        })
        .sum()
}

/// Optimize binning of one axis; returns the fitted edge coordinates.
fn fit_axis(values: &[f64], span: (f64, f64), n: usize, axis: &str) -> Result<Vec<f64>> {
    let (lo, hi) = span;
    if !(hi > lo) {
        return Err(Error::GridFitFailed {
            reason: format!("{axis} span is degenerate ({lo}..{hi})"),
        });
    }
    let mut pitch = (hi - lo) / n as f64;
    let mut offset = lo;
    for _ in 0..DESCENT_ROUNDS {
        let p = pitch;
        offset = minimize_scalar(
            |o| midpoint_sse(values, o, p, n),
            offset - p / 2.0,
            offset + p / 2.0,
        );
        let o = offset;
        pitch = minimize_scalar(
            |p| midpoint_sse(values, o, p, n),
            0.5 * (hi - lo) / n as f64,
            1.5 * (hi - lo) / n as f64,
        );
    }
    Ok((0..=n).map(|k| offset + k as f64 * pitch).collect())
}

/// Fit an `nrows x ncols` grid by minimizing centroid-to-midpoint error.
#[derive(Clone, Copy, Debug)]
pub struct OptimalBinsGridFinder {
    nrows: usize,
    ncols: usize,
}

impl OptimalBinsGridFinder {
    pub fn new(nrows: usize, ncols: usize) -> Self {
        Self { nrows, ncols }
    }
}

impl Default for OptimalBinsGridFinder {
    fn default() -> Self {
        // Standard 96-position pinning layout.
        Self { nrows: 8, ncols: 12 }
    }
}

impl GridFinder for OptimalBinsGridFinder {
    fn nrows(&self) -> usize {
        self.nrows
    }

    fn ncols(&self) -> usize {
        self.ncols
    }

    fn find_edges(&self, image: &Image) -> Result<GridEdges> {
        let regions = collect_regions(image.objmap());
        if regions.is_empty() {
            return Err(Error::NoObjects {
                name: image.name().to_string(),
            });
        }
        let rr_values: Vec<f64> = regions.iter().map(|r| r.bbox.center_rr()).collect();
        let cc_values: Vec<f64> = regions.iter().map(|r| r.bbox.center_cc()).collect();
        let rr_span = (
            regions.iter().map(|r| r.bbox.min_rr).min().unwrap() as f64,
            regions.iter().map(|r| r.bbox.max_rr).max().unwrap() as f64,
        );
        let cc_span = (
            regions.iter().map(|r| r.bbox.min_cc).min().unwrap() as f64,
            regions.iter().map(|r| r.bbox.max_cc).max().unwrap() as f64,
        );
        let row_edges = fit_axis(&rr_values, rr_span, self.nrows, "row")?;
        let col_edges = fit_axis(&cc_values, cc_span, self.ncols, "column")?;
        debug!(
            "OptimalBinsGridFinder: image={} rows {:.1}..{:.1} cols {:.1}..{:.1}",
            image.name(),
            row_edges[0],
            row_edges[self.nrows],
            col_edges[0],
            col_edges[self.ncols]
        );
        GridEdges::new(row_edges, col_edges)?.clip_to(image.shape())
    }
}
