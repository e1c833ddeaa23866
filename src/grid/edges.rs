//! Grid edge coordinates and bin assignment.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Row and column edge coordinates partitioning an image into an
/// `nrows x ncols` array of sections.
///
/// Invariants, enforced at construction: both edge arrays are strictly
/// increasing and hold at least two entries; `nrows = row_edges.len() - 1`
/// and likewise for columns.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GridEdges {
    row_edges: Vec<f64>,
    col_edges: Vec<f64>,
}

fn validate(edges: &[f64], axis: &str) -> Result<()> {
    if edges.len() < 2 {
        return Err(Error::InvalidGridEdges {
            reason: format!("{axis} edges need at least 2 entries, got {}", edges.len()),
        });
    }
    for pair in edges.windows(2) {
        if !(pair[1] > pair[0]) {
            return Err(Error::InvalidGridEdges {
                reason: format!(
                    "{axis} edges must be strictly increasing ({} then {})",
                    pair[0], pair[1]
                ),
            });
        }
    }
    Ok(())
}

impl GridEdges {
    pub fn new(row_edges: Vec<f64>, col_edges: Vec<f64>) -> Result<Self> {
        validate(&row_edges, "row")?;
        validate(&col_edges, "column")?;
        Ok(Self {
            row_edges,
            col_edges,
        })
    }

    pub fn nrows(&self) -> usize {
        self.row_edges.len() - 1
    }

    pub fn ncols(&self) -> usize {
        self.col_edges.len() - 1
    }

    pub fn row_edges(&self) -> &[f64] {
        &self.row_edges
    }

    pub fn col_edges(&self) -> &[f64] {
        &self.col_edges
    }

    /// Clamp edges into the pixel bounds of an image shape; fails if
    /// clamping collapses an interval.
    pub fn clip_to(&self, shape: (usize, usize)) -> Result<GridEdges> {
        let clamp = |edges: &[f64], max: f64| -> Vec<f64> {
            edges.iter().map(|&e| e.clamp(0.0, max)).collect()
        };
        GridEdges::new(
            clamp(&self.row_edges, shape.0 as f64),
            clamp(&self.col_edges, shape.1 as f64),
        )
    }

    fn bin_of(edges: &[f64], v: f64) -> Option<usize> {
        // First bin is closed on both ends, later bins are (lo, hi].
        if v < edges[0] || v > edges[edges.len() - 1] {
            return None;
        }
        for (k, pair) in edges.windows(2).enumerate() {
            let included = if k == 0 {
                v >= pair[0] && v <= pair[1]
            } else {
                v > pair[0] && v <= pair[1]
            };
            if included {
                return Some(k);
            }
        }
        None
    }

    /// Grid row of a row coordinate, if it falls within the edges.
    pub fn row_bin(&self, rr: f64) -> Option<usize> {
        Self::bin_of(&self.row_edges, rr)
    }

    /// Grid column of a column coordinate, if it falls within the edges.
    pub fn col_bin(&self, cc: f64) -> Option<usize> {
        Self::bin_of(&self.col_edges, cc)
    }

    /// Flattened section index of a (row, col) cell, row-major.
    pub fn section(&self, row: usize, col: usize) -> usize {
        row * self.ncols() + col
    }

    /// Section index of a pixel coordinate, if it falls inside the grid.
    pub fn section_of(&self, rr: f64, cc: f64) -> Option<usize> {
        match (self.row_bin(rr), self.col_bin(cc)) {
            (Some(row), Some(col)) => Some(self.section(row, col)),
            _ => None,
        }
    }

    /// Pixel window `[rr0, rr1) x [cc0, cc1)` of a section, for cropping.
    pub fn section_window(&self, section: usize) -> Result<(usize, usize, usize, usize)> {
        let (nrows, ncols) = (self.nrows(), self.ncols());
        if section >= nrows * ncols {
            return Err(Error::InvalidParameter {
                parameter: "section".into(),
                value: format!("{section} out of {}", nrows * ncols),
            });
        }
        let row = section / ncols;
        let col = section % ncols;
        Ok((
            self.row_edges[row].floor().max(0.0) as usize,
            self.row_edges[row + 1].ceil() as usize,
            self.col_edges[col].floor().max(0.0) as usize,
            self.col_edges[col + 1].ceil() as usize,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edges() -> GridEdges {
        GridEdges::new(vec![0.0, 10.0, 20.0], vec![0.0, 5.0, 10.0, 15.0]).unwrap()
    }

    #[test]
    fn counts_follow_edge_lengths() {
        let e = edges();
        assert_eq!(e.nrows(), 2);
        assert_eq!(e.ncols(), 3);
    }

    #[test]
    fn non_increasing_edges_are_rejected() {
        assert!(GridEdges::new(vec![0.0, 10.0, 10.0], vec![0.0, 1.0]).is_err());
        assert!(GridEdges::new(vec![5.0], vec![0.0, 1.0]).is_err());
    }

    #[test]
    fn first_bin_includes_lowest_edge() {
        let e = edges();
        assert_eq!(e.row_bin(0.0), Some(0));
        assert_eq!(e.row_bin(10.0), Some(0));
        assert_eq!(e.row_bin(10.1), Some(1));
        assert_eq!(e.row_bin(20.0), Some(1));
        assert_eq!(e.row_bin(20.5), None);
        assert_eq!(e.row_bin(-0.5), None);
    }

    #[test]
    fn section_index_is_row_major() {
        let e = edges();
        assert_eq!(e.section(0, 0), 0);
        assert_eq!(e.section(1, 2), 5);
        assert_eq!(e.section_of(15.0, 12.0), Some(5));
        assert_eq!(e.section_of(25.0, 12.0), None);
    }

    #[test]
    fn section_window_covers_the_cell() {
        let e = edges();
        assert_eq!(e.section_window(0).unwrap(), (0, 10, 0, 5));
        assert_eq!(e.section_window(5).unwrap(), (10, 20, 10, 15));
        assert!(e.section_window(6).is_err());
    }

    #[test]
    fn clip_fails_when_interval_collapses() {
        let e = GridEdges::new(vec![-2.0, 5.0, 10.0], vec![0.0, 1.0]).unwrap();
        assert!(e.clip_to((8, 8)).is_ok());
        let e = GridEdges::new(vec![-5.0, -1.0], vec![0.0, 1.0]).unwrap();
        assert!(e.clip_to((8, 8)).is_err());
    }
}
