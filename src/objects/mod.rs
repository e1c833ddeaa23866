//! Labeled-region handling on top of the object map.
//!
//! Detection produces a `Matrix<u32>` where each connected region carries a
//! unique positive label and background is zero. This module turns masks into
//! maps (connected-component labeling), normalizes maps (dense relabeling,
//! small-object removal) and extracts per-region summaries ([`Region`]) that
//! the grid and measurement stages consume.

use image::{GrayImage, Luma};
use imageproc::region_labelling::connected_components;
pub use imageproc::region_labelling::Connectivity;

use crate::error::{Error, Result};
use crate::image::matrix::Matrix;

/// Inclusive pixel bounding box of one region.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Bbox {
    pub min_rr: usize,
    pub min_cc: usize,
    pub max_rr: usize,
    pub max_cc: usize,
}

impl Bbox {
    /// Row coordinate of the bounding-box center.
    pub fn center_rr(&self) -> f64 {
        (self.min_rr + self.max_rr) as f64 / 2.0
    }

    /// Column coordinate of the bounding-box center.
    pub fn center_cc(&self) -> f64 {
        (self.min_cc + self.max_cc) as f64 / 2.0
    }

    /// Pixel area of the box.
    pub fn area(&self) -> usize {
        (self.max_rr - self.min_rr + 1) * (self.max_cc - self.min_cc + 1)
    }
}

/// Per-region summary: label, pixel count, bounds, centroid and pixel list.
#[derive(Clone, Debug)]
pub struct Region {
    pub label: u32,
    pub area: usize,
    pub bbox: Bbox,
    /// Pixel-intensity-independent centroid `(rr, cc)`.
    pub centroid: (f64, f64),
    /// All `(rr, cc)` pixels of the region, in scan order.
    pub coords: Vec<(usize, usize)>,
}

/// Label a boolean mask into an object map.
pub fn label_mask(mask: &Matrix<bool>, connectivity: Connectivity) -> Matrix<u32> {
    let (rows, cols) = mask.shape();
    let data: Vec<u8> = mask.as_slice().iter().map(|&b| u8::from(b) * 255).collect();
    let gray = GrayImage::from_raw(cols as u32, rows as u32, data)
        .expect("mask length matches dimensions");
    let labeled = connected_components(&gray, connectivity, Luma([0u8]));
    Matrix::from_vec(rows, cols, labeled.into_raw()).expect("labeling preserves dimensions")
}

/// Collect per-region summaries from an object map, sorted by label.
pub fn collect_regions(map: &Matrix<u32>) -> Vec<Region> {
    let (rows, cols) = map.shape();
    let mut regions: Vec<Option<Region>> = Vec::new();
    for rr in 0..rows {
        let row = map.row(rr);
        for (cc, &label) in row.iter().enumerate() {
            if label == 0 {
                continue;
            }
            let idx = label as usize;
            if regions.len() <= idx {
                regions.resize_with(idx + 1, || None);
            }
            let entry = regions[idx].get_or_insert_with(|| Region {
                label,
                area: 0,
                bbox: Bbox {
                    min_rr: rr,
                    min_cc: cc,
                    max_rr: rr,
                    max_cc: cc,
                },
                centroid: (0.0, 0.0),
                coords: Vec::new(),
            });
            entry.area += 1;
            entry.bbox.min_rr = entry.bbox.min_rr.min(rr);
            entry.bbox.min_cc = entry.bbox.min_cc.min(cc);
            entry.bbox.max_rr = entry.bbox.max_rr.max(rr);
            entry.bbox.max_cc = entry.bbox.max_cc.max(cc);
            entry.centroid.0 += rr as f64;
            entry.centroid.1 += cc as f64;
            entry.coords.push((rr, cc));
        }
    }
    let mut out: Vec<Region> = regions.into_iter().flatten().collect();
    for region in &mut out {
        region.centroid.0 /= region.area as f64;
        region.centroid.1 /= region.area as f64;
    }
    out
}

/// Find one region by label.
pub fn find_region(map: &Matrix<u32>, label: u32) -> Result<Region> {
    collect_regions(map)
        .into_iter()
        .find(|r| r.label == label)
        .ok_or(Error::MissingObject { label })
}

/// Zero out every region smaller than `min_area` pixels.
pub fn remove_small(map: &mut Matrix<u32>, min_area: usize) {
    if min_area <= 1 {
        return;
    }
    let mut counts: Vec<usize> = Vec::new();
    for &v in map.as_slice() {
        if v == 0 {
            continue;
        }
        let idx = v as usize;
        if counts.len() <= idx {
            counts.resize(idx + 1, 0);
        }
        counts[idx] += 1;
    }
    for v in map.as_mut_slice() {
        if *v != 0 && counts[*v as usize] < min_area {
            *v = 0;
        }
    }
}

/// Rewrite labels to the dense range `1..=n`, preserving scan order of first
/// appearance.
pub fn relabel(map: &mut Matrix<u32>) {
    let max = map.as_slice().iter().copied().max().unwrap_or(0) as usize;
    let mut remap = vec![0u32; max + 1];
    let mut next = 0u32;
    for v in map.as_mut_slice() {
        if *v == 0 {
            continue;
        }
        let slot = &mut remap[*v as usize];
        if *slot == 0 {
            next += 1;
            *slot = next;
        }
        *v = *slot;
    }
}

/// Zero out the listed labels (background fill), e.g. grid outliers.
pub fn drop_labels(map: &mut Matrix<u32>, labels: &[u32]) {
    if labels.is_empty() {
        return;
    }
    for v in map.as_mut_slice() {
        if *v != 0 && labels.contains(v) {
            *v = 0;
        }
    }
}
