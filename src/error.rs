//! Error taxonomy for the crate.
//!
//! Library code returns [`Result`] everywhere; binaries flatten errors to
//! strings at the CLI boundary.

use std::path::PathBuf;

use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by image handling, grid fitting, measurement, storage and
/// pipeline execution.
#[derive(Error, Debug)]
pub enum Error {
    /// Two planes (or a plane and an image) disagree on dimensions.
    #[error("shape mismatch: expected {expected_h}x{expected_w}, got {got_h}x{got_w}")]
    ShapeMismatch {
        expected_h: usize,
        expected_w: usize,
        got_h: usize,
        got_w: usize,
    },

    /// An operation requires a non-empty image.
    #[error("image '{name}' has no pixel data")]
    EmptyImage { name: String },

    /// An operation requires detected objects but the object map is blank.
    #[error("image '{name}' has no detected objects")]
    NoObjects { name: String },

    /// A specific object label was requested but does not exist in the map.
    #[error("object label {label} not present in the object map")]
    MissingObject { label: u32 },

    /// The object map violates an invariant (e.g. buffer length vs shape).
    #[error("invalid object map: {reason}")]
    InvalidObjectMap { reason: String },

    /// Attempt to write a protected metadata key through the public map.
    #[error("metadata key '{key}' is protected and cannot be set directly")]
    MetadataKeyViolation { key: String },

    /// Grid edges failed validation (ordering, length, bounds).
    #[error("invalid grid edges: {reason}")]
    InvalidGridEdges { reason: String },

    /// A grid could not be fit to the detected objects.
    #[error("grid fit failed: {reason}")]
    GridFitFailed { reason: String },

    /// Invalid caller-supplied parameter.
    #[error("invalid parameter {parameter}: {value}")]
    InvalidParameter { parameter: String, value: String },

    /// Measurement-table schema violation (unknown column, length or type
    /// mismatch, duplicate name).
    #[error("measurement table: {reason}")]
    TableSchema { reason: String },

    /// The requested image name is absent from the set.
    #[error("image '{name}' not found in image set '{set}'")]
    ImageNotFound { set: String, name: String },

    /// Adding an image whose name already exists without `overwrite`.
    #[error("image '{name}' already exists in image set '{set}'")]
    DuplicateImage { set: String, name: String },

    /// The store's exclusive writer lock is already held.
    #[error("image set at {path} is locked by another writer")]
    StoreLocked { path: PathBuf },

    /// A required group or file is missing from the store layout.
    #[error("store group missing: {path}")]
    MissingGroup { path: String },

    /// The store manifest is missing or malformed.
    #[error("not an image-set store: {path} ({reason})")]
    BadStore { path: PathBuf, reason: String },

    /// A pipeline step failed; carries the step name for context.
    #[error("operation '{op}' failed on image '{image}'")]
    Operation {
        op: String,
        image: String,
        #[source]
        source: Box<Error>,
    },

    /// The batch writer saw no worker results within the stall timeout.
    #[error("batch stalled: no results for {waited_ms} ms with workers still running")]
    BatchStalled { waited_ms: u64 },

    #[error("I/O error")]
    Io(#[from] std::io::Error),

    #[error("image codec error")]
    Image(#[from] image::ImageError),

    #[error("JSON error")]
    Json(#[from] serde_json::Error),

    #[error("CSV error")]
    Csv(#[from] csv::Error),

    #[error("zip archive error")]
    Zip(#[from] zip::result::ZipError),
}

impl Error {
    /// Shorthand for [`Error::ShapeMismatch`] from two `(h, w)` pairs.
    pub fn shape_mismatch(expected: (usize, usize), got: (usize, usize)) -> Self {
        Error::ShapeMismatch {
            expected_h: expected.0,
            expected_w: expected.1,
            got_h: got.0,
            got_w: got.1,
        }
    }

    /// Wrap an error produced by pipeline step `op` on `image`.
    pub fn operation(op: &str, image: &str, source: Error) -> Self {
        Error::Operation {
            op: op.to_string(),
            image: image.to_string(),
            source: Box::new(source),
        }
    }
}
