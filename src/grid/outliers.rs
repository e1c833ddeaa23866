//! Regression-based removal of surplus objects from grid sections.
//!
//! Pinned arrays put at most one colony per section; extra detections are
//! usually dirt, satellite colonies or split segmentations. The trimmer fits
//! a line through each grid row and column of object centers and, in every
//! multiply-occupied section, keeps the object closest to its predicted
//! position.

use log::debug;
use nalgebra::{DMatrix, DVector};

use crate::error::Result;
use crate::grid::{GridFinder, OptimalBinsGridFinder};
use crate::image::Image;
use crate::objects::{self, collect_regions, Region};
use crate::pipeline::ImageOperation;

/// Slope/intercept of a least-squares line fit.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AxisRegression {
    pub slope: f64,
    pub intercept: f64,
}

impl AxisRegression {
    pub fn predict(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }
}

/// Least-squares line through `(x, y)` points. `None` with fewer than two
/// points or a rank-deficient system (all x equal).
pub fn fit_line(xs: &[f64], ys: &[f64]) -> Option<AxisRegression> {
    if xs.len() < 2 || xs.len() != ys.len() {
        return None;
    }
    let a = DMatrix::from_fn(xs.len(), 2, |i, j| if j == 0 { xs[i] } else { 1.0 });
    let b = DVector::from_column_slice(ys);
    let solution = a.svd(true, true).solve(&b, 1e-12).ok()?;
    let slope = solution[0];
    let intercept = solution[1];
    if !slope.is_finite() || !intercept.is_finite() {
        return None;
    }
    Some(AxisRegression { slope, intercept })
}

struct Assigned<'a> {
    region: &'a Region,
    row: usize,
    col: usize,
    section: usize,
}

/// Distance of each assigned object from its row/column regression lines.
fn residuals(assigned: &[Assigned<'_>], nrows: usize, ncols: usize) -> Vec<f64> {
    // Row lines predict rr from cc; column lines predict cc from rr.
    let mut row_fits: Vec<Option<AxisRegression>> = Vec::with_capacity(nrows);
    for row in 0..nrows {
        let xs: Vec<f64> = assigned
            .iter()
            .filter(|a| a.row == row)
            .map(|a| a.region.bbox.center_cc())
            .collect();
        let ys: Vec<f64> = assigned
            .iter()
            .filter(|a| a.row == row)
            .map(|a| a.region.bbox.center_rr())
            .collect();
        row_fits.push(fit_line(&xs, &ys));
    }
    let mut col_fits: Vec<Option<AxisRegression>> = Vec::with_capacity(ncols);
    for col in 0..ncols {
        let xs: Vec<f64> = assigned
            .iter()
            .filter(|a| a.col == col)
            .map(|a| a.region.bbox.center_rr())
            .collect();
        let ys: Vec<f64> = assigned
            .iter()
            .filter(|a| a.col == col)
            .map(|a| a.region.bbox.center_cc())
            .collect();
        col_fits.push(fit_line(&xs, &ys));
    }
    assigned
        .iter()
        .map(|a| {
            let rr = a.region.bbox.center_rr();
            let cc = a.region.bbox.center_cc();
            let pred_rr = row_fits[a.row].map(|f| f.predict(cc)).unwrap_or(rr);
            let pred_cc = col_fits[a.col].map(|f| f.predict(rr)).unwrap_or(cc);
            ((rr - pred_rr).powi(2) + (cc - pred_cc).powi(2)).sqrt()
        })
        .collect()
}

/// Remove surplus objects from multiply-occupied sections, worst section
/// first, until every section holds at most one object.
#[derive(Clone, Copy, Debug)]
pub struct ResidualOutlierTrimmer {
    nrows: usize,
    ncols: usize,
}

impl ResidualOutlierTrimmer {
    pub fn new(nrows: usize, ncols: usize) -> Self {
        Self { nrows, ncols }
    }
}

impl ImageOperation for ResidualOutlierTrimmer {
    fn name(&self) -> &'static str {
        "ResidualOutlierTrimmer"
    }

    fn apply(&self, image: &mut Image) -> Result<()> {
        let finder = OptimalBinsGridFinder::new(self.nrows, self.ncols);
        let max_iters = self.nrows * self.ncols * 4;
        let mut dropped_total = 0usize;

        for _ in 0..max_iters {
            let edges = finder.find_edges(image)?;
            let regions = collect_regions(image.objmap());
            let assigned: Vec<Assigned<'_>> = regions
                .iter()
                .filter_map(|region| {
                    let row = edges.row_bin(region.bbox.center_rr())?;
                    let col = edges.col_bin(region.bbox.center_cc())?;
                    Some(Assigned {
                        region,
                        row,
                        col,
                        section: edges.section(row, col),
                    })
                })
                .collect();

            let mut counts = vec![0usize; self.nrows * self.ncols];
            for a in &assigned {
                counts[a.section] += 1;
            }
            let Some((worst_section, &worst)) =
                counts.iter().enumerate().max_by_key(|(_, &c)| c)
            else {
                break;
            };
            if worst <= 1 {
                break;
            }

            let res = residuals(&assigned, self.nrows, self.ncols);
            let in_section: Vec<(usize, &Assigned<'_>)> = assigned
                .iter()
                .enumerate()
                .filter(|(_, a)| a.section == worst_section)
                .map(|(i, a)| (i, a))
                .collect();
            let keep = in_section
                .iter()
                .min_by(|(i, _), (j, _)| res[*i].total_cmp(&res[*j]))
                .map(|(_, a)| a.region.label)
                .expect("section is non-empty");
            let drop: Vec<u32> = in_section
                .iter()
                .filter(|(_, a)| a.region.label != keep)
                .map(|(_, a)| a.region.label)
                .collect();
            dropped_total += drop.len();

            let mut map = image.objmap().clone();
            objects::drop_labels(&mut map, &drop);
            image.set_objmap(map)?;
        }

        if dropped_total > 0 {
            let mut map = image.objmap().clone();
            objects::relabel(&mut map);
            image.set_objmap(map)?;
        }
        debug!(
            "ResidualOutlierTrimmer: image={} dropped {} surplus objects",
            image.name(),
            dropped_total
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::Matrix;
    use approx::assert_relative_eq;

    #[test]
    fn fit_line_recovers_slope_and_intercept() {
        let xs = [0.0, 1.0, 2.0, 3.0];
        let ys = [1.0, 3.0, 5.0, 7.0];
        let fit = fit_line(&xs, &ys).unwrap();
        assert_relative_eq!(fit.slope, 2.0, epsilon = 1e-9);
        assert_relative_eq!(fit.intercept, 1.0, epsilon = 1e-9);
        assert_relative_eq!(fit.predict(10.0), 21.0, epsilon = 1e-8);
    }

    #[test]
    fn fit_line_degenerate_inputs() {
        assert!(fit_line(&[1.0], &[2.0]).is_none());
        assert!(fit_line(&[0.0, 1.0], &[2.0]).is_none());
    }

    /// 2x2 grid of blobs plus a far-off-line intruder sharing section 0.
    #[test]
    fn trimmer_keeps_the_on_grid_object() {
        let mut map = Matrix::filled(60, 60, 0u32);
        let mut label = 0u32;
        let mut stamp = |rr: usize, cc: usize, map: &mut Matrix<u32>, label: u32| {
            for dr in 0..3 {
                for dc in 0..3 {
                    map.set(rr + dr, cc + dc, label);
                }
            }
        };
        for (rr, cc) in [(10, 10), (10, 40), (40, 10), (40, 40)] {
            label += 1;
            stamp(rr, cc, &mut map, label);
        }
        // Intruder in the top-left section, off both regression lines.
        label += 1;
        stamp(17, 17, &mut map, label);

        let mut image = Image::from_gray("g", Matrix::filled(60, 60, 0.5f32)).unwrap();
        image.set_objmap(map).unwrap();
        assert_eq!(image.num_objects(), 5);

        ResidualOutlierTrimmer::new(2, 2).apply(&mut image).unwrap();
        assert_eq!(image.num_objects(), 4);
        let regions = collect_regions(image.objmap());
        // The kept top-left object is the aligned one at (11, 11) centers.
        let min_center = regions
            .iter()
            .map(|r| r.bbox.center_rr() + r.bbox.center_cc())
            .fold(f64::INFINITY, f64::min);
        assert_relative_eq!(min_center, 22.0, epsilon = 1e-9);
    }
}
