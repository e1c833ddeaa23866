//! Per-object feature measurement.
//!
//! Each measure consumes a detected [`Image`] and produces a
//! [`MeasurementTable`] keyed by object label; the pipeline merges the
//! tables of all configured measures with the base object-info table.

pub mod table;

mod intensity;
mod shape;
mod size;

pub use self::intensity::MeasureIntensity;
pub use self::shape::MeasureShape;
pub use self::size::MeasureSize;
pub use self::table::{columns, ColumnData, MeasurementTable};

use crate::error::Result;
use crate::image::Image;
use crate::objects::{collect_regions, Region};

/// Bounding-box column names shared by the base info table and grid fitting.
pub mod bbox_columns {
    pub const CENTER_RR: &str = "Bbox_CenterRR";
    pub const CENTER_CC: &str = "Bbox_CenterCC";
    pub const MIN_RR: &str = "Bbox_MinRR";
    pub const MAX_RR: &str = "Bbox_MaxRR";
    pub const MIN_CC: &str = "Bbox_MinCC";
    pub const MAX_CC: &str = "Bbox_MaxCC";
}

/// Base per-object info every measured image gets: bounding-box geometry.
pub fn object_info_table(image: &Image) -> Result<MeasurementTable> {
    let regions = collect_regions(image.objmap());
    regions_info_table(&regions)
}

/// [`object_info_table`] over pre-collected regions.
pub fn regions_info_table(regions: &[Region]) -> Result<MeasurementTable> {
    let mut table = MeasurementTable::new(regions.iter().map(|r| r.label).collect());
    table.add_float_column(
        bbox_columns::CENTER_RR,
        regions.iter().map(|r| r.bbox.center_rr()).collect(),
    )?;
    table.add_float_column(
        bbox_columns::CENTER_CC,
        regions.iter().map(|r| r.bbox.center_cc()).collect(),
    )?;
    table.add_float_column(
        bbox_columns::MIN_RR,
        regions.iter().map(|r| r.bbox.min_rr as f64).collect(),
    )?;
    table.add_float_column(
        bbox_columns::MAX_RR,
        regions.iter().map(|r| r.bbox.max_rr as f64).collect(),
    )?;
    table.add_float_column(
        bbox_columns::MIN_CC,
        regions.iter().map(|r| r.bbox.min_cc as f64).collect(),
    )?;
    table.add_float_column(
        bbox_columns::MAX_CC,
        regions.iter().map(|r| r.bbox.max_cc as f64).collect(),
    )?;
    Ok(table)
}
