//! Image pipelines: ordered operations plus measurement extraction.
//!
//! A [`Pipeline`] applies its operations to one image in sequence, then runs
//! every configured measure and merges the resulting tables on the object
//! label. Interested callers subscribe explicit observer callbacks, invoked
//! synchronously at defined phases; there is no implicit notification
//! machinery. [`BatchPipeline`] runs the same pipeline over a whole
//! [`crate::store::ImageSet`] with a worker pool.

pub mod config;

mod batch;

pub use self::batch::{BatchPipeline, FailurePolicy};
pub use self::config::PipelineConfig;

use std::time::Instant;

use log::{debug, warn};

use crate::error::{Error, Result};
use crate::grid::GridFinder;
use crate::image::Image;
use crate::measure::{object_info_table, MeasurementTable};

/// An in-place transformation of an [`Image`] (enhancement, detection, map
/// editing). Implementations must be shareable across worker threads.
pub trait ImageOperation: Send + Sync {
    /// Stable step name used in logs, events and error context.
    fn name(&self) -> &'static str;

    fn apply(&self, image: &mut Image) -> Result<()>;
}

/// A per-object feature extractor producing a label-keyed table.
pub trait MeasureFeatures: Send + Sync {
    fn name(&self) -> &'static str;

    fn measure(&self, image: &Image) -> Result<MeasurementTable>;
}

/// Phases at which pipeline observers fire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelinePhase {
    OpStarted,
    OpFinished,
    MeasureStarted,
    MeasureFinished,
    ImageFinished,
}

/// Payload passed to observer callbacks.
#[derive(Clone, Copy, Debug)]
pub struct PipelineEvent<'a> {
    pub phase: PipelinePhase,
    /// Name of the image being processed.
    pub image: &'a str,
    /// Operation or measure name; empty for image-level phases.
    pub target: &'a str,
    /// Elapsed milliseconds, on `*Finished` phases.
    pub elapsed_ms: Option<f64>,
}

type Observer = Box<dyn Fn(&PipelineEvent<'_>) + Send + Sync>;

/// Wrap an operation with info-level timing logs.
///
/// Explicit composition: the wrapped value is a normal operation and can be
/// pushed wherever one is expected.
pub struct Timed<O>(pub O);

impl<O: ImageOperation> ImageOperation for Timed<O> {
    fn name(&self) -> &'static str {
        self.0.name()
    }

    fn apply(&self, image: &mut Image) -> Result<()> {
        let start = Instant::now();
        let result = self.0.apply(image);
        log::info!(
            "{} on '{}' took {:.3} ms",
            self.0.name(),
            image.name(),
            start.elapsed().as_secs_f64() * 1000.0
        );
        result
    }
}

/// Ordered operations + measures applied to a single image.
#[derive(Default)]
pub struct Pipeline {
    ops: Vec<Box<dyn ImageOperation>>,
    measures: Vec<Box<dyn MeasureFeatures>>,
    grid_finder: Option<Box<dyn GridFinder>>,
    observers: Vec<Observer>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an operation to the end of the sequence.
    pub fn push_op(&mut self, op: impl ImageOperation + 'static) -> &mut Self {
        self.ops.push(Box::new(op));
        self
    }

    /// Append a measure.
    pub fn push_measure(&mut self, measure: impl MeasureFeatures + 'static) -> &mut Self {
        self.measures.push(Box::new(measure));
        self
    }

    /// Configure grid fitting; measured tables then carry grid columns.
    pub fn set_grid_finder(&mut self, finder: impl GridFinder + 'static) -> &mut Self {
        self.grid_finder = Some(Box::new(finder));
        self
    }

    /// Subscribe a callback invoked synchronously at every pipeline phase.
    pub fn subscribe(&mut self, observer: impl Fn(&PipelineEvent<'_>) + Send + Sync + 'static) {
        self.observers.push(Box::new(observer));
    }

    pub fn num_ops(&self) -> usize {
        self.ops.len()
    }

    pub fn num_measures(&self) -> usize {
        self.measures.len()
    }

    fn notify(&self, event: PipelineEvent<'_>) {
        for observer in &self.observers {
            observer(&event);
        }
    }

    /// Run every operation in order. The image is reset first, so applying a
    /// pipeline twice yields the same planes as applying it once. The first
    /// failure aborts and carries the step name in the error.
    pub fn apply(&self, image: &mut Image) -> Result<()> {
        image.reset();
        for op in &self.ops {
            self.notify(PipelineEvent {
                phase: PipelinePhase::OpStarted,
                image: image.name(),
                target: op.name(),
                elapsed_ms: None,
            });
            let start = Instant::now();
            let step_result = op.apply(image);
            let elapsed = start.elapsed().as_secs_f64() * 1000.0;
            if let Err(e) = step_result {
                warn!("operation {} failed on '{}': {e}", op.name(), image.name());
                return Err(Error::operation(op.name(), image.name(), e));
            }
            debug!("{} on '{}': {:.3} ms", op.name(), image.name(), elapsed);
            self.notify(PipelineEvent {
                phase: PipelinePhase::OpFinished,
                image: image.name(),
                target: op.name(),
                elapsed_ms: Some(elapsed),
            });
        }
        Ok(())
    }

    /// Extract the base object-info table (with grid columns when a finder is
    /// configured) merged with every measure's table.
    pub fn measure(&self, image: &Image) -> Result<MeasurementTable> {
        let mut table = match &self.grid_finder {
            Some(finder) => finder.grid_info(image)?,
            None => object_info_table(image)?,
        };
        for measure in &self.measures {
            self.notify(PipelineEvent {
                phase: PipelinePhase::MeasureStarted,
                image: image.name(),
                target: measure.name(),
                elapsed_ms: None,
            });
            let start = Instant::now();
            let partial = measure
                .measure(image)
                .map_err(|e| Error::operation(measure.name(), image.name(), e))?;
            table = table.merge(&partial)?;
            self.notify(PipelineEvent {
                phase: PipelinePhase::MeasureFinished,
                image: image.name(),
                target: measure.name(),
                elapsed_ms: Some(start.elapsed().as_secs_f64() * 1000.0),
            });
        }
        Ok(table)
    }

    /// [`apply`](Self::apply) then [`measure`](Self::measure).
    pub fn apply_and_measure(&self, image: &mut Image) -> Result<MeasurementTable> {
        let start = Instant::now();
        self.apply(image)?;
        let table = self.measure(image)?;
        self.notify(PipelineEvent {
            phase: PipelinePhase::ImageFinished,
            image: image.name(),
            target: "",
            elapsed_ms: Some(start.elapsed().as_secs_f64() * 1000.0),
        });
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::Matrix;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct MarkEnhanced;

    impl ImageOperation for MarkEnhanced {
        fn name(&self) -> &'static str {
            "MarkEnhanced"
        }

        fn apply(&self, image: &mut Image) -> Result<()> {
            let flat = Matrix::filled(image.shape().0, image.shape().1, 0.75f32);
            image.set_enhanced(flat)
        }
    }

    struct FailingOp;

    impl ImageOperation for FailingOp {
        fn name(&self) -> &'static str {
            "FailingOp"
        }

        fn apply(&self, image: &mut Image) -> Result<()> {
            Err(Error::EmptyImage {
                name: image.name().to_string(),
            })
        }
    }

    fn detected_image() -> Image {
        let mut image = Image::from_gray("p", Matrix::filled(6, 6, 0.5f32)).unwrap();
        let mut map = Matrix::filled(6, 6, 0u32);
        map.set(1, 1, 1);
        map.set(4, 4, 2);
        image.set_objmap(map).unwrap();
        image
    }

    #[test]
    fn apply_runs_ops_in_order_and_wraps_failures() {
        let mut image = detected_image();
        let mut pipeline = Pipeline::new();
        pipeline.push_op(MarkEnhanced);
        pipeline.apply(&mut image).unwrap();
        assert_eq!(image.enhanced().get(0, 0), 0.75);

        pipeline.push_op(FailingOp);
        let err = pipeline.apply(&mut image).unwrap_err();
        match err {
            Error::Operation { op, image, .. } => {
                assert_eq!(op, "FailingOp");
                assert_eq!(image, "p");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn measure_merges_measures_onto_base_info() {
        let image = detected_image();
        let mut pipeline = Pipeline::new();
        pipeline.push_measure(crate::measure::MeasureSize);
        let table = pipeline.measure(&image).unwrap();
        assert_eq!(table.labels(), &[1, 2]);
        assert!(table.has_column("Bbox_CenterRR"));
        assert!(table.has_column("Size_Area"));
    }

    #[test]
    fn observers_fire_at_each_phase() {
        let counter = Arc::new(AtomicUsize::new(0));
        let seen = counter.clone();
        let mut pipeline = Pipeline::new();
        pipeline.push_op(MarkEnhanced);
        pipeline.push_measure(crate::measure::MeasureSize);
        pipeline.subscribe(move |event| {
            if matches!(
                event.phase,
                PipelinePhase::OpFinished
                    | PipelinePhase::MeasureFinished
                    | PipelinePhase::ImageFinished
            ) {
                assert!(event.elapsed_ms.is_some());
            }
            seen.fetch_add(1, Ordering::SeqCst);
        });
        let mut image = detected_image();
        pipeline.apply_and_measure(&mut image).unwrap();
        // op start+finish, measure start+finish, image finished.
        assert_eq!(counter.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn timed_wrapper_is_transparent() {
        let mut image = detected_image();
        let mut pipeline = Pipeline::new();
        pipeline.push_op(Timed(MarkEnhanced));
        pipeline.apply(&mut image).unwrap();
        assert_eq!(image.enhanced().get(3, 3), 0.75);
    }
}
