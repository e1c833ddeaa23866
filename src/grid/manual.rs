//! Grid finder with caller-supplied edges.

use crate::error::Result;
use crate::grid::{GridEdges, GridFinder};
use crate::image::Image;

/// Use fixed, caller-supplied edges instead of fitting them. Validation and
/// clipping still apply, so the grid contract holds either way.
#[derive(Clone, Debug)]
pub struct ManualGridFinder {
    edges: GridEdges,
}

impl ManualGridFinder {
    pub fn new(row_edges: Vec<f64>, col_edges: Vec<f64>) -> Result<Self> {
        Ok(Self {
            edges: GridEdges::new(row_edges, col_edges)?,
        })
    }

    pub fn from_edges(edges: GridEdges) -> Self {
        Self { edges }
    }
}

impl GridFinder for ManualGridFinder {
    fn nrows(&self) -> usize {
        self.edges.nrows()
    }

    fn ncols(&self) -> usize {
        self.edges.ncols()
    }

    fn find_edges(&self, image: &Image) -> Result<GridEdges> {
        self.edges.clip_to(image.shape())
    }
}
