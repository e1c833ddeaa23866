//! An image bound to its fitted grid.

use crate::error::Result;
use crate::grid::{annotate_grid, GridEdges, GridFinder};
use crate::image::{Image, ImageKind};
use crate::measure::{regions_info_table, MeasurementTable};
use crate::objects::collect_regions;

/// An [`Image`] together with the edges partitioning it into sections.
///
/// Binding the two makes section addressing stable: once constructed, section
/// crops and grid info always refer to the same fit.
#[derive(Clone, Debug)]
pub struct GriddedImage {
    image: Image,
    edges: GridEdges,
}

impl GriddedImage {
    /// Fit a grid to the image's detected objects and bind it.
    pub fn fit(image: Image, finder: &dyn GridFinder) -> Result<Self> {
        let edges = finder.find_edges(&image)?;
        Ok(Self { image, edges })
    }

    /// Bind pre-computed edges, clipped to the image bounds.
    pub fn with_edges(image: Image, edges: GridEdges) -> Result<Self> {
        let edges = edges.clip_to(image.shape())?;
        Ok(Self { image, edges })
    }

    pub fn image(&self) -> &Image {
        &self.image
    }

    pub fn edges(&self) -> &GridEdges {
        &self.edges
    }

    pub fn nrows(&self) -> usize {
        self.edges.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.edges.ncols()
    }

    /// Give the image back, dropping the grid binding.
    pub fn into_image(self) -> Image {
        self.image
    }

    /// Crop one grid section into a standalone image.
    pub fn section_image(&self, section: usize) -> Result<Image> {
        let (rr0, rr1, cc0, cc1) = self.edges.section_window(section)?;
        let (rows, cols) = self.image.shape();
        let mut crop = self
            .image
            .crop(rr0, rr1.min(rows), cc0, cc1.min(cols))?;
        crop.set_name(format!("{}_section_{}", self.image.name(), section));
        crop.set_kind(ImageKind::GridSection);
        Ok(crop)
    }

    /// Object info annotated with this grid's row/column/section columns.
    pub fn grid_info(&self) -> Result<MeasurementTable> {
        let regions = collect_regions(self.image.objmap());
        let mut table = regions_info_table(&regions)?;
        annotate_grid(&mut table, &self.edges)?;
        Ok(table)
    }
}
