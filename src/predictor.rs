use std::collections::HashMap;

use crate::error::{BatchError, ScoringError};
use crate::model::{Artifacts, ModelState};
use crate::schema::{missing_columns, FeatureRecord, INPUT_SCHEMA};
use crate::types::{BatchReport, Confidence, PredictionOutcome, StagePrediction, UNAVAILABLE_MESSAGE};

const INPUT_HINT: &str = "Could not process the submitted data. Check that every field is \
filled in with the correct type.";

/// Classify rows, decode every class and attach each row's confidence.
pub fn score_rows(
    artifacts: &Artifacts,
    rows: &[FeatureRecord],
) -> Result<Vec<StagePrediction>, ScoringError> {
    let proba = artifacts.pipeline.predict_proba(rows)?;
    if proba.iter().flatten().any(|p| !p.is_finite()) {
        return Err(ScoringError::NonFiniteProbability);
    }
    let classes = artifacts.pipeline.classes_from_proba(&proba)?;

    classes
        .into_iter()
        .zip(proba.iter())
        .map(|(class, p)| {
            let stage = artifacts.decoder.inverse_transform(class)?.to_string();
            let confidence = Confidence::from_probabilities(p).ok_or(ScoringError::EmptyOutput)?;
            Ok(StagePrediction { stage, confidence })
        })
        .collect()
}

/// Score a single submitted form.
pub fn predict_record(state: &ModelState, form: &HashMap<String, String>) -> PredictionOutcome {
    let Some(artifacts) = state.artifacts() else {
        return PredictionOutcome::failure(UNAVAILABLE_MESSAGE);
    };

    let record = match FeatureRecord::from_lookup(|k| form.get(k).map(String::as_str)) {
        Ok(r) => r,
        Err(e) => return PredictionOutcome::failure(format!("{INPUT_HINT} Detail: {e}")),
    };

    // Debug signal so we can confirm what actually reaches the model
    if std::env::var("LOG_PRED").ok().as_deref() == Some("1") {
        log_record_summary(&record);
    }

    match score_rows(artifacts, std::slice::from_ref(&record)) {
        Ok(mut preds) if preds.len() == 1 => PredictionOutcome::Success(preds.remove(0)),
        Ok(preds) => PredictionOutcome::failure(format!(
            "model returned {} predictions for one record",
            preds.len()
        )),
        Err(e) => PredictionOutcome::failure(format!("{INPUT_HINT} Detail: {e}")),
    }
}

fn log_record_summary(record: &FeatureRecord) {
    let nums: Vec<f64> = record.values().iter().filter_map(|v| v.as_number()).collect();
    let nz = nums.iter().filter(|x| **x != 0.0).count();
    let mean = if nums.is_empty() { 0.0 } else { nums.iter().sum::<f64>() / nums.len() as f64 };
    let sample: Vec<String> = INPUT_SCHEMA
        .iter()
        .zip(record.values())
        .take(6)
        .map(|(f, v)| format!("{}={}", f.name, v))
        .collect();
    tracing::info!(
        "recv in_dim={} numeric={} nonzero={} mean={:.3} sample=[{}]",
        record.values().len(),
        nums.len(),
        nz,
        mean,
        sample.join(", ")
    );
}

/// Parse an uploaded CSV body and score every row at once.
pub fn predict_csv(state: &ModelState, bytes: &[u8]) -> Result<BatchReport, BatchError> {
    let artifacts = state.artifacts().ok_or(BatchError::Unavailable)?;

    let text = std::str::from_utf8(bytes)?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let missing = missing_columns(&headers);
    if !missing.is_empty() {
        return Err(BatchError::MissingColumns(missing));
    }

    let mut position: HashMap<&str, usize> = HashMap::new();
    for (i, h) in headers.iter().enumerate() {
        position.entry(h.as_str()).or_insert(i);
    }

    let mut rows = Vec::new();
    for (n, result) in reader.records().enumerate() {
        let record = result?;
        let row = FeatureRecord::from_lookup(|k| position.get(k).and_then(|&i| record.get(i)))
            .map_err(|source| BatchError::Row { row: n + 1, source })?;
        rows.push(row);
    }
    if rows.is_empty() {
        return Err(BatchError::NoRows);
    }

    let rows = score_rows(artifacts, &rows)?;
    Ok(BatchReport { rows })
}
