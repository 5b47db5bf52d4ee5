use std::num::{ParseFloatError, ParseIntError};
use std::path::PathBuf;

use thiserror::Error;

/// Raised while deserializing or validating the on-disk artifacts.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("encoder '{0}' not found in encoder artifact")]
    MissingEncoder(String),
    #[error("invalid pipeline artifact: {0}")]
    InvalidPipeline(String),
    #[error("warm-up scoring failed: {0}")]
    WarmUp(#[from] ScoringError),
}

/// A submitted field or uploaded row that cannot become a feature record.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("field '{0}' is missing")]
    MissingField(&'static str),
    #[error("field '{field}' expects an integer, got '{value}': {source}")]
    InvalidInteger {
        field: &'static str,
        value: String,
        #[source]
        source: ParseIntError,
    },
    #[error("field '{field}' expects a number, got '{value}': {source}")]
    InvalidFloat {
        field: &'static str,
        value: String,
        #[source]
        source: ParseFloatError,
    },
    #[error("field '{field}' must be a finite number, got '{value}'")]
    NonFinite { field: &'static str, value: String },
}

/// Failures inside the pipeline or the label decoder.
#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("column '{column}' requires a numeric value, got '{value}'")]
    NonNumeric { column: String, value: String },
    #[error("class index {0} is not known to the label decoder")]
    UnknownClass(usize),
    #[error("model returned no probabilities")]
    EmptyOutput,
    #[error("model produced a non-finite probability")]
    NonFiniteProbability,
}

/// Everything that can go wrong while processing an uploaded CSV file.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("{}", crate::types::UNAVAILABLE_MESSAGE)]
    Unavailable,
    #[error("uploaded file is not valid UTF-8 text: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("could not parse CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<&'static str>),
    #[error("uploaded file contains no data rows")]
    NoRows,
    #[error("row {row}: {source}")]
    Row {
        row: usize,
        #[source]
        source: InputError,
    },
    #[error(transparent)]
    Scoring(#[from] ScoringError),
}

/// Reasons an upload is turned away before any parsing happens.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UploadRejection {
    #[error("no file part in the request")]
    NoFilePart,
    #[error("no file selected")]
    EmptyFilename,
    #[error("unsupported file type '{0}': only .csv files are accepted")]
    UnsupportedType(String),
    #[error("could not read upload: {0}")]
    Malformed(String),
}
