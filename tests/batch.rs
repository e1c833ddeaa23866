mod common;

use common::synthetic_plate::{render_plate, PlateSpec};
use platescan::detect::OtsuDetector;
use platescan::grid::OptimalBinsGridFinder;
use platescan::measure::{columns, MeasureSize};
use platescan::pipeline::{BatchPipeline, FailurePolicy, Pipeline};
use platescan::store::ImageSet;
use platescan::Error;

fn build_pipeline(spec: &PlateSpec) -> Pipeline {
    let mut pipeline = Pipeline::new();
    pipeline.push_op(OtsuDetector::default());
    pipeline.push_measure(MeasureSize);
    pipeline.set_grid_finder(OptimalBinsGridFinder::new(spec.nrows, spec.ncols));
    pipeline
}

/// Two measurable plates and one blank plate that fails grid fitting.
fn seeded_set(root: &std::path::Path, spec: &PlateSpec) -> ImageSet {
    let set = ImageSet::create(root, "run").unwrap();
    let writer = set.writer().unwrap();
    writer
        .put_image(&render_plate(spec, "plate_a", &[]), false)
        .unwrap();
    writer
        .put_image(&render_plate(spec, "plate_b", &[(1, 1)]), false)
        .unwrap();
    // Black plate: zero pixels are background to the detector, so nothing is
    // detected and the grid fit errors out.
    let all: Vec<(usize, usize)> = (0..spec.nrows)
        .flat_map(|r| (0..spec.ncols).map(move |c| (r, c)))
        .collect();
    let blank_spec = PlateSpec {
        background: 0.0,
        ..PlateSpec::default()
    };
    writer
        .put_image(&render_plate(&blank_spec, "plate_blank", &all), false)
        .unwrap();
    set
}

#[test]
fn batch_skips_failures_and_persists_results() {
    let dir = tempfile::tempdir().unwrap();
    let spec = PlateSpec::default();
    let set = seeded_set(&dir.path().join("run.plateset"), &spec);

    let batch = BatchPipeline::new(build_pipeline(&spec)).with_workers(2);
    let table = batch.apply_and_measure(&set).unwrap();

    let total = spec.nrows * spec.ncols;
    assert_eq!(table.len(), total + (total - 1));

    // Combined table is ordered by image name, then label.
    let names = table.text(columns::IMAGE_NAME).unwrap();
    let mut sorted = names.to_vec();
    sorted.sort();
    assert_eq!(names, &sorted[..]);
    assert!(names.iter().all(|n| n != "plate_blank"));

    // Statuses reflect the per-image outcomes.
    let reader = set.reader();
    let ok = reader.read_status("plate_a").unwrap();
    assert!(ok.processed && ok.measured && ok.error.is_none());
    let failed = reader.read_status("plate_blank").unwrap();
    assert!(!failed.processed);
    assert!(failed.error.is_some());

    // Per-image measurement tables landed in the store.
    let stored = reader.read_measurements("plate_b").unwrap();
    assert_eq!(stored.len(), total - 1);
    assert!(reader.read_measurements("plate_blank").is_err());

    // Processed planes were written back: detection state persisted.
    let processed = reader.get_image("plate_a").unwrap();
    assert_eq!(processed.num_objects(), total);
}

#[test]
fn abort_policy_fails_the_batch() {
    let dir = tempfile::tempdir().unwrap();
    let spec = PlateSpec::default();
    let set = seeded_set(&dir.path().join("run.plateset"), &spec);

    let batch = BatchPipeline::new(build_pipeline(&spec))
        .with_workers(1)
        .with_failure_policy(FailurePolicy::Abort);
    let err = batch.apply_and_measure(&set).unwrap_err();
    assert!(matches!(
        err,
        Error::NoObjects { .. } | Error::Operation { .. }
    ));
}

#[test]
fn batch_output_is_deterministic_across_runs() {
    let dir = tempfile::tempdir().unwrap();
    let spec = PlateSpec::default();
    let set = seeded_set(&dir.path().join("run.plateset"), &spec);

    let batch = BatchPipeline::new(build_pipeline(&spec)).with_workers(4);
    let first = batch.apply_and_measure(&set).unwrap();
    let second = batch.apply_and_measure(&set).unwrap();

    let mut csv_a = Vec::new();
    let mut csv_b = Vec::new();
    first.to_csv(&mut csv_a).unwrap();
    second.to_csv(&mut csv_b).unwrap();
    assert_eq!(csv_a, csv_b);
}

#[test]
fn batch_on_empty_set_returns_empty_table() {
    let dir = tempfile::tempdir().unwrap();
    let set = ImageSet::create(&dir.path().join("empty.plateset"), "empty").unwrap();
    let spec = PlateSpec::default();
    let batch = BatchPipeline::new(build_pipeline(&spec));
    let table = batch.apply_and_measure(&set).unwrap();
    assert!(table.is_empty());
}

#[test]
fn batch_requires_the_writer_lock() {
    let dir = tempfile::tempdir().unwrap();
    let spec = PlateSpec::default();
    let set = seeded_set(&dir.path().join("run.plateset"), &spec);

    let held = set.writer().unwrap();
    let batch = BatchPipeline::new(build_pipeline(&spec));
    assert!(matches!(
        batch.apply_and_measure(&set),
        Err(Error::StoreLocked { .. })
    ));
    drop(held);
    assert!(batch.apply_and_measure(&set).is_ok());
}
