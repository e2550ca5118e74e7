//! Error types

use std::io;
use thiserror::Error;

/// trajframe error type
#[derive(Error, Debug)]
pub enum Error {
    #[error("Table for {entity} is empty")]
    Empty { entity: &'static str },

    #[error("To process a table as a collection of {entity}, it must have the columns [{required}], but it has [{present}]")]
    MissingColumns {
        entity: &'static str,
        required: String,
        present: String,
    },

    #[error("dtype of {column} is {dtype} but has to be a timezone aware timestamp")]
    NotTimezoneAware { column: String, dtype: String },

    #[error("Table for {entity} has no active geometry column")]
    MissingGeometry { entity: &'static str },

    #[error("Not all geometries of {entity} are valid")]
    InvalidGeometry { entity: &'static str },

    #[error("The geometry of {entity} must be a {expected}, found {found} (only first checked)")]
    GeometryType {
        entity: &'static str,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Expected a table tagged as {expected}, found {found}")]
    Degraded {
        expected: &'static str,
        found: &'static str,
    },

    #[error("Accessor `{0}` is not registered")]
    UnknownAccessor(String),

    #[error("Method {method} not known for {purpose}")]
    UnknownMethod {
        method: String,
        purpose: &'static str,
    },

    #[error("The categories must be in increasing order")]
    UnorderedCategories,

    #[error("Column `{0}` not found")]
    ColumnNotFound(String),

    #[error("Column `{0}` already exists")]
    DuplicateColumn(String),

    #[error("Length mismatch: expected {expected}, got {found}")]
    LengthMismatch { expected: usize, found: usize },

    #[error("Position {position} is out of bounds for a table of {len} rows")]
    OutOfBounds { position: usize, len: usize },

    #[error("Column `{column}` has dtype {found}, expected {expected}")]
    DTypeMismatch {
        column: String,
        expected: String,
        found: String,
    },

    #[error("Column `{0}` can not be used as a key")]
    InvalidKey(String),

    #[error("Arrow type {0} can not be stored in a table")]
    UnsupportedType(String),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[cfg(feature = "csv")]
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("GPX error: {0}")]
    Gpx(#[from] gpx::errors::GpxError),

    #[error("Failed on format the time: {0}")]
    TimeFormat(#[from] time::error::Format),

    #[error("Failed on parse the row {row}: {message}")]
    Parse { row: usize, message: String },

    #[error("Config error: {0}")]
    Config(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
