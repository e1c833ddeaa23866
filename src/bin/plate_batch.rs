//! Batch-process a directory of plate scans.
//!
//! ```text
//! plate-batch --input-dir scans/ --store run1.plateset \
//!     [--pipeline pipeline.json] [--rows 8 --cols 12] [--workers N] \
//!     [--csv-out combined.csv] [--overlay-dir overlays/] [--pack run1.plateset.zip] \
//!     [--abort-on-error]
//! ```
//!
//! Images are imported into the store, the pipeline runs over the whole set
//! with a worker pool, and the combined measurement table lands in one CSV.

use std::env;
use std::path::PathBuf;

use platescan::image::io::render_overlay;
use platescan::pipeline::{BatchPipeline, FailurePolicy, PipelineConfig};
use platescan::store::ImageSet;

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

struct Args {
    input_dir: Option<PathBuf>,
    store: PathBuf,
    pipeline: Option<PathBuf>,
    csv_out: Option<PathBuf>,
    overlay_dir: Option<PathBuf>,
    pack: Option<PathBuf>,
    rows: usize,
    cols: usize,
    workers: Option<usize>,
    abort_on_error: bool,
}

fn usage(program: &str) -> String {
    format!(
        "Usage: {program} --store <dir> [--input-dir <dir>] [--pipeline <json>] \
         [--csv-out <csv>] [--overlay-dir <dir>] [--pack <zip>] \
         [--rows N] [--cols N] [--workers N] [--abort-on-error]"
    )
}

fn parse_args() -> Result<Args, String> {
    let mut argv = env::args();
    let program = argv.next().unwrap_or_else(|| "plate-batch".to_string());
    let mut args = Args {
        input_dir: None,
        store: PathBuf::new(),
        pipeline: None,
        csv_out: None,
        overlay_dir: None,
        pack: None,
        rows: 8,
        cols: 12,
        workers: None,
        abort_on_error: false,
    };
    let mut store = None;

    while let Some(arg) = argv.next() {
        let mut value = |name: &str| {
            argv.next()
                .ok_or_else(|| format!("{name} needs a value\n{}", usage(&program)))
        };
        match arg.as_str() {
            "--input-dir" => args.input_dir = Some(PathBuf::from(value("--input-dir")?)),
            "--store" => store = Some(PathBuf::from(value("--store")?)),
            "--pipeline" => args.pipeline = Some(PathBuf::from(value("--pipeline")?)),
            "--csv-out" => args.csv_out = Some(PathBuf::from(value("--csv-out")?)),
            "--overlay-dir" => args.overlay_dir = Some(PathBuf::from(value("--overlay-dir")?)),
            "--pack" => args.pack = Some(PathBuf::from(value("--pack")?)),
            "--rows" => {
                args.rows = value("--rows")?
                    .parse()
                    .map_err(|e| format!("bad --rows: {e}"))?
            }
            "--cols" => {
                args.cols = value("--cols")?
                    .parse()
                    .map_err(|e| format!("bad --cols: {e}"))?
            }
            "--workers" => {
                args.workers = Some(
                    value("--workers")?
                        .parse()
                        .map_err(|e| format!("bad --workers: {e}"))?,
                )
            }
            "--abort-on-error" => args.abort_on_error = true,
            "--help" | "-h" => return Err(usage(&program)),
            other => return Err(format!("unknown argument '{other}'\n{}", usage(&program))),
        }
    }
    args.store = store.ok_or_else(|| format!("--store is required\n{}", usage(&program)))?;
    Ok(args)
}

fn run() -> Result<(), String> {
    let args = parse_args()?;

    let set = if args.store.join("plateset.json").exists() {
        ImageSet::open(&args.store).map_err(|e| e.to_string())?
    } else {
        let name = args
            .store
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "plateset".to_string());
        ImageSet::create(&args.store, &name).map_err(|e| e.to_string())?
    };

    if let Some(input_dir) = &args.input_dir {
        let imported = set.import_dir(input_dir).map_err(|e| e.to_string())?;
        println!("imported {imported} images from {}", input_dir.display());
    }

    let config = match &args.pipeline {
        Some(path) => PipelineConfig::load(path).map_err(|e| e.to_string())?,
        None => PipelineConfig::standard(args.rows, args.cols),
    };
    let pipeline = config.build().map_err(|e| e.to_string())?;

    let mut batch = BatchPipeline::new(pipeline);
    if let Some(workers) = args.workers {
        batch = batch.with_workers(workers);
    }
    if args.abort_on_error {
        batch = batch.with_failure_policy(FailurePolicy::Abort);
    }

    let mut table = batch.apply_and_measure(&set).map_err(|e| e.to_string())?;

    if let Some(corrector) = config.build_edge_corrector().map_err(|e| e.to_string())? {
        table = corrector.analyze(&table).map_err(|e| e.to_string())?;
        println!("edge correction applied on '{}'", corrector.on);
    }

    println!(
        "set '{}': {} measurement rows across {} images",
        set.name(),
        table.len(),
        set.image_names().map_err(|e| e.to_string())?.len()
    );

    let csv_out = args
        .csv_out
        .unwrap_or_else(|| args.store.with_extension("csv"));
    table.to_csv_path(&csv_out).map_err(|e| e.to_string())?;
    println!("combined table written to {}", csv_out.display());

    if let Some(overlay_dir) = &args.overlay_dir {
        std::fs::create_dir_all(overlay_dir).map_err(|e| e.to_string())?;
        let reader = set.reader();
        for name in set.image_names().map_err(|e| e.to_string())? {
            let image = reader.get_image(&name).map_err(|e| e.to_string())?;
            let path = overlay_dir.join(format!("{name}_overlay.png"));
            render_overlay(&image, None)
                .save(&path)
                .map_err(|e| e.to_string())?;
        }
        println!("overlays written to {}", overlay_dir.display());
    }

    if let Some(pack) = &args.pack {
        set.pack(pack).map_err(|e| e.to_string())?;
        println!("store packed into {}", pack.display());
    }
    Ok(())
}
