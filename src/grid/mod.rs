//! Grid fitting and per-object grid annotation.
//!
//! A [`GridFinder`] turns a detected image into [`GridEdges`]; the shared
//! [`annotate_grid`] step then labels every object with its grid row, column
//! and flattened section index, matching the layout the plate was pinned on.

pub mod edges;

mod gridded;
mod manual;
mod optimal;
mod outliers;

pub use self::edges::GridEdges;
pub use self::gridded::GriddedImage;
pub use self::manual::ManualGridFinder;
pub use self::optimal::OptimalBinsGridFinder;
pub use self::outliers::{fit_line, AxisRegression, ResidualOutlierTrimmer};

use crate::error::{Error, Result};
use crate::image::Image;
use crate::measure::{bbox_columns, regions_info_table, MeasurementTable};
use crate::objects::collect_regions;

/// Grid annotation column names.
pub mod grid_columns {
    pub const ROW_NUM: &str = "Grid_RowNum";
    pub const COL_NUM: &str = "Grid_ColNum";
    pub const SECTION_NUM: &str = "Grid_SectionNum";
}

/// Strategy producing grid edges for a detected image.
pub trait GridFinder: Send + Sync {
    /// Number of grid rows this finder is configured for.
    fn nrows(&self) -> usize;

    /// Number of grid columns this finder is configured for.
    fn ncols(&self) -> usize;

    /// Fit row/column edges to the image's detected objects.
    fn find_edges(&self, image: &Image) -> Result<GridEdges>;

    /// Object info table with grid row/column/section columns appended.
    fn grid_info(&self, image: &Image) -> Result<MeasurementTable> {
        let regions = collect_regions(image.objmap());
        let mut table = regions_info_table(&regions)?;
        let edges = self.find_edges(image)?;
        annotate_grid(&mut table, &edges)?;
        Ok(table)
    }
}

/// Append `Grid_RowNum` / `Grid_ColNum` / `Grid_SectionNum` columns to a
/// table carrying bounding-box center columns. Objects whose center falls
/// outside the edges get NaN in all three.
pub fn annotate_grid(table: &mut MeasurementTable, edges: &GridEdges) -> Result<()> {
    let center_rr = table
        .float(bbox_columns::CENTER_RR)
        .ok_or_else(|| Error::TableSchema {
            reason: format!("grid annotation needs '{}'", bbox_columns::CENTER_RR),
        })?
        .to_vec();
    let center_cc = table
        .float(bbox_columns::CENTER_CC)
        .ok_or_else(|| Error::TableSchema {
            reason: format!("grid annotation needs '{}'", bbox_columns::CENTER_CC),
        })?
        .to_vec();

    let mut rows = Vec::with_capacity(center_rr.len());
    let mut cols = Vec::with_capacity(center_rr.len());
    let mut sections = Vec::with_capacity(center_rr.len());
    for (&rr, &cc) in center_rr.iter().zip(&center_cc) {
        match (edges.row_bin(rr), edges.col_bin(cc)) {
            (Some(row), Some(col)) => {
                rows.push(row as f64);
                cols.push(col as f64);
                sections.push(edges.section(row, col) as f64);
            }
            _ => {
                rows.push(f64::NAN);
                cols.push(f64::NAN);
                sections.push(f64::NAN);
            }
        }
    }
    table.add_float_column(grid_columns::ROW_NUM, rows)?;
    table.add_float_column(grid_columns::COL_NUM, cols)?;
    table.add_float_column(grid_columns::SECTION_NUM, sections)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measure::MeasurementTable;

    #[test]
    fn annotation_assigns_and_flags_outsiders() {
        let edges = GridEdges::new(vec![0.0, 10.0, 20.0], vec![0.0, 10.0, 20.0]).unwrap();
        let mut table = MeasurementTable::new(vec![1, 2, 3]);
        table
            .add_float_column(bbox_columns::CENTER_RR, vec![5.0, 15.0, 30.0])
            .unwrap();
        table
            .add_float_column(bbox_columns::CENTER_CC, vec![5.0, 15.0, 5.0])
            .unwrap();
        annotate_grid(&mut table, &edges).unwrap();
        let sections = table.float(grid_columns::SECTION_NUM).unwrap();
        assert_eq!(sections[0], 0.0);
        assert_eq!(sections[1], 3.0);
        assert!(sections[2].is_nan());
    }
}
