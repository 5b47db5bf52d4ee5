use serde::{Deserialize, Serialize};
use std::fmt;

pub const STATUS_OK: &str = "Prediction Successful";
pub const STATUS_ERROR: &str = "Error";
pub const UNAVAILABLE_MESSAGE: &str =
    "Prediction system unavailable: model components are missing or corrupt.";

/// Highest class probability, shown as a percentage with two decimals.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Confidence(f64);

impl Confidence {
    pub fn from_probabilities(p: &[f64]) -> Option<Self> {
        p.iter().cloned().reduce(f64::max).map(Confidence)
    }

    pub fn probability(&self) -> f64 {
        self.0
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}%", self.0 * 100.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StagePrediction {
    pub stage: String,
    pub confidence: Confidence,
}

/// Outcome of scoring one submitted record. Check the tag before reading.
#[derive(Debug, Clone, PartialEq)]
pub enum PredictionOutcome {
    Success(StagePrediction),
    Failure { message: String },
}

impl PredictionOutcome {
    pub fn failure(message: impl Into<String>) -> Self {
        PredictionOutcome::Failure { message: message.into() }
    }

    pub fn status(&self) -> &'static str {
        match self {
            PredictionOutcome::Success(_) => STATUS_OK,
            PredictionOutcome::Failure { .. } => STATUS_ERROR,
        }
    }
}

/// Row-aligned predictions for an uploaded file.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub rows: Vec<StagePrediction>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NoticeCategory {
    Error,
    Success,
}

/// Flash-style message carried across a redirect in the query string.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub category: NoticeCategory,
    pub notice: String,
}

impl Notice {
    pub fn error(msg: impl fmt::Display) -> Self {
        Self { category: NoticeCategory::Error, notice: msg.to_string() }
    }

    pub fn success(msg: impl fmt::Display) -> Self {
        Self { category: NoticeCategory::Success, notice: msg.to_string() }
    }
}
