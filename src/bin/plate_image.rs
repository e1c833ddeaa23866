//! Process a single plate scan: load a serialized pipeline definition, read
//! one image, apply and measure, write a CSV table and an overlay image.
//!
//! ```text
//! plate-image --input scan.png --pipeline pipeline.json \
//!     [--csv-out scan.csv] [--overlay-out scan_overlay.png] [--rows 8 --cols 12]
//! ```
//!
//! Without `--pipeline`, the standard workflow for the given grid shape runs.

use std::env;
use std::path::PathBuf;

use platescan::grid::{GridEdges, GridFinder, ManualGridFinder, OptimalBinsGridFinder};
use platescan::image::io::render_overlay;
use platescan::image::Image;
use platescan::pipeline::config::GridFinderConfig;
use platescan::pipeline::PipelineConfig;

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

struct Args {
    input: PathBuf,
    pipeline: Option<PathBuf>,
    csv_out: Option<PathBuf>,
    overlay_out: Option<PathBuf>,
    rows: usize,
    cols: usize,
}

fn usage(program: &str) -> String {
    format!(
        "Usage: {program} --input <image> [--pipeline <json>] [--csv-out <csv>] \
         [--overlay-out <png>] [--rows N] [--cols N]"
    )
}

fn parse_args() -> Result<Args, String> {
    let mut argv = env::args();
    let program = argv.next().unwrap_or_else(|| "plate-image".to_string());
    let mut input = None;
    let mut pipeline = None;
    let mut csv_out = None;
    let mut overlay_out = None;
    let mut rows = 8usize;
    let mut cols = 12usize;

    while let Some(arg) = argv.next() {
        let mut value = |name: &str| {
            argv.next()
                .ok_or_else(|| format!("{name} needs a value\n{}", usage(&program)))
        };
        match arg.as_str() {
            "--input" => input = Some(PathBuf::from(value("--input")?)),
            "--pipeline" => pipeline = Some(PathBuf::from(value("--pipeline")?)),
            "--csv-out" => csv_out = Some(PathBuf::from(value("--csv-out")?)),
            "--overlay-out" => overlay_out = Some(PathBuf::from(value("--overlay-out")?)),
            "--rows" => {
                rows = value("--rows")?
                    .parse()
                    .map_err(|e| format!("bad --rows: {e}"))?
            }
            "--cols" => {
                cols = value("--cols")?
                    .parse()
                    .map_err(|e| format!("bad --cols: {e}"))?
            }
            "--help" | "-h" => return Err(usage(&program)),
            other => return Err(format!("unknown argument '{other}'\n{}", usage(&program))),
        }
    }
    let input = input.ok_or_else(|| format!("--input is required\n{}", usage(&program)))?;
    Ok(Args {
        input,
        pipeline,
        csv_out,
        overlay_out,
        rows,
        cols,
    })
}

fn run() -> Result<(), String> {
    let args = parse_args()?;

    let config = match &args.pipeline {
        Some(path) => PipelineConfig::load(path).map_err(|e| e.to_string())?,
        None => PipelineConfig::standard(args.rows, args.cols),
    };
    let pipeline = config.build().map_err(|e| e.to_string())?;

    let mut image = Image::imread(&args.input).map_err(|e| e.to_string())?;
    let table = pipeline
        .apply_and_measure(&mut image)
        .map_err(|e| e.to_string())?;

    println!("image: {}", image.name());
    println!("objects: {}", image.num_objects());
    println!(
        "measurements: {} rows x {} columns",
        table.len(),
        table.column_names().count() + 1
    );

    let csv_out = args
        .csv_out
        .unwrap_or_else(|| args.input.with_extension("csv"));
    table.to_csv_path(&csv_out).map_err(|e| e.to_string())?;
    println!("measurements written to {}", csv_out.display());

    if let Some(overlay_out) = args.overlay_out {
        // Redo the fit once for the overlay lines; cheap next to detection.
        let edges = overlay_edges(&config, &image, args.rows, args.cols);
        render_overlay(&image, edges.as_ref())
            .save(&overlay_out)
            .map_err(|e| e.to_string())?;
        println!("overlay written to {}", overlay_out.display());
    }
    Ok(())
}

fn overlay_edges(
    config: &PipelineConfig,
    image: &Image,
    rows: usize,
    cols: usize,
) -> Option<GridEdges> {
    match &config.grid {
        Some(GridFinderConfig::Manual {
            row_edges,
            col_edges,
        }) => ManualGridFinder::new(row_edges.clone(), col_edges.clone())
            .ok()?
            .find_edges(image)
            .ok(),
        Some(GridFinderConfig::OptimalBins { nrows, ncols }) => {
            OptimalBinsGridFinder::new(*nrows, *ncols).find_edges(image).ok()
        }
        None => OptimalBinsGridFinder::new(rows, cols).find_edges(image).ok(),
    }
}
