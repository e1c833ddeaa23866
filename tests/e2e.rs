mod common;

use common::synthetic_plate::{render_plate, PlateSpec};
use platescan::detect::OtsuDetector;
use platescan::enhance::GaussianSmoother;
use platescan::grid::{grid_columns, GridFinder, OptimalBinsGridFinder};
use platescan::measure::{columns, MeasureIntensity, MeasureShape, MeasureSize};
use platescan::pipeline::{Pipeline, PipelineConfig};

#[test]
fn full_pipeline_detects_grid_and_measures_every_colony() {
    let spec = PlateSpec::default();
    let mut image = render_plate(&spec, "plate_full", &[]);

    let mut pipeline = Pipeline::new();
    pipeline.push_op(GaussianSmoother::new(1.0));
    pipeline.push_op(OtsuDetector::default());
    pipeline.push_measure(MeasureSize);
    pipeline.push_measure(MeasureIntensity);
    pipeline.push_measure(MeasureShape);
    pipeline.set_grid_finder(OptimalBinsGridFinder::new(spec.nrows, spec.ncols));

    let table = pipeline.apply_and_measure(&mut image).unwrap();

    let expected = spec.nrows * spec.ncols;
    assert_eq!(image.num_objects(), expected);
    assert_eq!(table.len(), expected);

    // Every colony sits in its own section, and all sections are used.
    let sections = table.float(grid_columns::SECTION_NUM).unwrap();
    let mut seen: Vec<usize> = sections.iter().map(|&s| s as usize).collect();
    seen.sort_unstable();
    seen.dedup();
    assert_eq!(seen.len(), expected);
    assert!(seen.iter().all(|&s| s < expected));

    // Disk areas come out near the analytic area of a rasterized disk.
    let areas = table.float("Size_Area").unwrap();
    let nominal = std::f64::consts::PI * (spec.radius as f64) * (spec.radius as f64);
    for &area in areas {
        assert!(
            (area - nominal).abs() / nominal < 0.35,
            "area {area} too far from nominal {nominal}"
        );
    }

    // Colonies are bright on a dark background.
    let means = table.float("Intensity_MeanIntensity").unwrap();
    assert!(means.iter().all(|&m| m > 0.5));

    // Rasterized disks are round-ish and compact.
    let extents = table.float("Shape_Extent").unwrap();
    assert!(extents.iter().all(|&e| e > 0.5 && e <= 1.0));
}

#[test]
fn grid_edge_contract_holds_on_sparse_plates() {
    let spec = PlateSpec::default();
    // Knock out a few positions; the fit must still produce a full grid.
    let skip = [(0, 0), (2, 3), (3, 5)];
    let mut image = render_plate(&spec, "plate_sparse", &skip);

    let mut pipeline = Pipeline::new();
    pipeline.push_op(OtsuDetector::default());
    pipeline.apply(&mut image).unwrap();

    let finder = OptimalBinsGridFinder::new(spec.nrows, spec.ncols);
    let edges = finder.find_edges(&image).unwrap();
    assert_eq!(edges.row_edges().len(), spec.nrows + 1);
    assert_eq!(edges.col_edges().len(), spec.ncols + 1);
    for pair in edges.row_edges().windows(2) {
        assert!(pair[1] > pair[0]);
    }
    for pair in edges.col_edges().windows(2) {
        assert!(pair[1] > pair[0]);
    }

    assert_eq!(
        image.num_objects(),
        spec.nrows * spec.ncols - skip.len()
    );
}

#[test]
fn standard_config_runs_end_to_end() {
    let spec = PlateSpec {
        radius: 6,
        ..Default::default()
    };
    let mut image = render_plate(&spec, "plate_cfg", &[]);

    let mut config = PipelineConfig::standard(spec.nrows, spec.ncols);
    // Synthetic colonies are smaller than real scans; relax the size floor.
    if let Some(platescan::pipeline::config::OpConfig::OtsuDetector { min_size, .. }) =
        config.ops.get_mut(1)
    {
        *min_size = 20;
    }
    let pipeline = config.build().unwrap();
    let table = pipeline.apply_and_measure(&mut image).unwrap();
    assert_eq!(table.len(), spec.nrows * spec.ncols);
    assert!(table.has_column(grid_columns::ROW_NUM));
    assert!(table.has_column("Shape_Circularity"));
    assert!(!table.has_column(columns::IMAGE_NAME));
}
