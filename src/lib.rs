#![doc = include_str!("../README.md")]

// Core data model and ambient plumbing.
pub mod error;
pub mod image;
pub mod objects;

// Image operations.
pub mod detect;
pub mod enhance;
pub mod objedit;

// Grid fitting, measurement, analysis.
pub mod analysis;
pub mod grid;
pub mod measure;

// Orchestration and persistence.
pub mod pipeline;
pub mod store;

// --- High-level re-exports -------------------------------------------------

pub use crate::error::{Error, Result};
pub use crate::image::{Image, Matrix};
pub use crate::measure::MeasurementTable;
pub use crate::pipeline::{BatchPipeline, FailurePolicy, Pipeline, PipelineConfig};
pub use crate::store::{ImageSet, ImageStatus};

// --- Prelude ---------------------------------------------------------------

/// Common imports for scripting against the crate.
///
/// ```no_run
/// use platescan::prelude::*;
///
/// # fn main() -> platescan::Result<()> {
/// let mut image = Image::imread("plate_scan.png".as_ref())?;
/// let pipeline = PipelineConfig::standard(8, 12).build()?;
/// let table = pipeline.apply_and_measure(&mut image)?;
/// println!("{} colonies", table.len());
/// # Ok(())
/// # }
/// ```
pub mod prelude {
    pub use crate::error::Result;
    pub use crate::grid::{GridEdges, GridFinder};
    pub use crate::image::Image;
    pub use crate::measure::MeasurementTable;
    pub use crate::pipeline::{BatchPipeline, Pipeline, PipelineConfig};
    pub use crate::store::ImageSet;
}
