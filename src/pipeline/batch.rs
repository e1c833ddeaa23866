//! Batch execution of a pipeline over an image set.
//!
//! Thread layout mirrors the store's single-writer/multiple-reader
//! discipline: a producer enqueues image names, each worker opens its own
//! read-only view and processes one image at a time in memory, and the main
//! thread holds the set's exclusive writer handle, persisting results as they
//! arrive. Both queues are bounded, so a slow writer backpressures the
//! workers and a slow producer never floods memory.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_channel::{bounded, RecvTimeoutError};
use log::{debug, info, warn};

use crate::error::{Error, Result};
use crate::image::Image;
use crate::measure::MeasurementTable;
use crate::pipeline::Pipeline;
use crate::store::{ImageSet, ImageStatus, SetReader};

/// What a failed image does to the rest of the batch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Log the failure, record it in the image's status, continue.
    #[default]
    SkipAndLog,
    /// Stop scheduling new work and fail the batch with the first error.
    Abort,
}

/// Run a [`Pipeline`] over every image of an [`ImageSet`] with a worker pool.
pub struct BatchPipeline {
    pipeline: Pipeline,
    num_workers: usize,
    queue_depth_factor: usize,
    stall_timeout: Duration,
    failure_policy: FailurePolicy,
}

impl BatchPipeline {
    pub fn new(pipeline: Pipeline) -> Self {
        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self {
            pipeline,
            num_workers: workers,
            queue_depth_factor: 2,
            stall_timeout: Duration::from_secs(600),
            failure_policy: FailurePolicy::SkipAndLog,
        }
    }

    /// Worker-thread count (defaults to the machine's parallelism).
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.num_workers = workers.max(1);
        self
    }

    /// Bounded-queue depth as a multiple of the worker count.
    pub fn with_queue_depth_factor(mut self, factor: usize) -> Self {
        self.queue_depth_factor = factor.max(1);
        self
    }

    /// How long the writer waits for a result before declaring a stall.
    pub fn with_stall_timeout(mut self, timeout: Duration) -> Self {
        self.stall_timeout = timeout;
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Borrow the underlying pipeline (e.g. to subscribe observers).
    pub fn pipeline_mut(&mut self) -> &mut Pipeline {
        &mut self.pipeline
    }

    /// Process and measure every image in the set.
    ///
    /// Results are persisted per image (planes, status, measurements) in
    /// completion order; the returned combined table is sorted by image name
    /// and object label, so its content does not depend on scheduling.
    pub fn apply_and_measure(&self, set: &ImageSet) -> Result<MeasurementTable> {
        let writer = set.writer()?;
        let names = set.image_names()?;
        info!(
            "batch start: set='{}' images={} workers={}",
            set.name(),
            names.len(),
            self.num_workers
        );
        if names.is_empty() {
            return Ok(MeasurementTable::concat(&[]));
        }

        let workers = self.num_workers.min(names.len()).max(1);
        let depth = workers * self.queue_depth_factor;
        let abort = AtomicBool::new(false);
        let mut per_image: Vec<(String, MeasurementTable)> = Vec::new();
        let mut first_error: Option<Error> = None;

        std::thread::scope(|scope| -> Result<()> {
            let (work_tx, work_rx) = bounded::<String>(depth);
            let (result_tx, result_rx) =
                bounded::<(String, Result<(Image, MeasurementTable)>)>(depth);
            let abort = &abort;
            let pipeline = &self.pipeline;

            let producer_names = names.clone();
            scope.spawn(move || {
                for name in producer_names {
                    if abort.load(Ordering::Relaxed) {
                        break;
                    }
                    if work_tx.send(name).is_err() {
                        break;
                    }
                }
            });

            for _ in 0..workers {
                let work_rx = work_rx.clone();
                let result_tx = result_tx.clone();
                let reader = set.reader();
                scope.spawn(move || {
                    while let Ok(name) = work_rx.recv() {
                        if abort.load(Ordering::Relaxed) {
                            break;
                        }
                        let outcome = process_one(&reader, pipeline, &name);
                        if result_tx.send((name, outcome)).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(work_rx);
            drop(result_tx);

            loop {
                match result_rx.recv_timeout(self.stall_timeout) {
                    Ok((name, Ok((image, table)))) => {
                        writer.put_image(&image, true)?;
                        writer.write_status(
                            &name,
                            &ImageStatus {
                                processed: true,
                                measured: true,
                                error: None,
                                segmentation_valid: None,
                                analysis_valid: None,
                            },
                        )?;
                        writer.write_measurements(&name, &table)?;
                        debug!("batch: '{name}' done, {} objects", table.len());
                        per_image.push((name, table));
                    }
                    Ok((name, Err(e))) => {
                        warn!("batch: '{name}' failed: {e}");
                        writer.write_status(
                            &name,
                            &ImageStatus {
                                processed: false,
                                measured: false,
                                error: Some(e.to_string()),
                                segmentation_valid: None,
                                analysis_valid: None,
                            },
                        )?;
                        if self.failure_policy == FailurePolicy::Abort {
                            abort.store(true, Ordering::Relaxed);
                            first_error = Some(e);
                            break;
                        }
                    }
                    Err(RecvTimeoutError::Timeout) => {
                        abort.store(true, Ordering::Relaxed);
                        return Err(Error::BatchStalled {
                            waited_ms: self.stall_timeout.as_millis() as u64,
                        });
                    }
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            Ok(())
        })?;

        if let Some(e) = first_error {
            return Err(e);
        }
        info!(
            "batch finished: set='{}' measured {}/{} images",
            set.name(),
            per_image.len(),
            names.len()
        );
        Ok(MeasurementTable::concat(&per_image))
    }
}

fn process_one(
    reader: &SetReader,
    pipeline: &Pipeline,
    name: &str,
) -> Result<(Image, MeasurementTable)> {
    let mut image = reader.get_image(name)?;
    let table = pipeline.apply_and_measure(&mut image)?;
    Ok((image, table))
}
