use serde::Deserialize;
use std::{collections::HashMap, fs, path::Path, sync::Arc};

use crate::config::AppConfig;
use crate::error::{LoadError, ScoringError};
use crate::schema::{field_index, FeatureRecord, FieldKind, FieldValue, INPUT_SCHEMA};

/// Anything that maps feature rows to class indices and class probabilities.
pub trait Classifier: Send + Sync {
    /// Column names in the order the model consumes them.
    fn feature_order(&self) -> Vec<&str>;

    /// Encoded class value per output column of `predict_proba`.
    fn classes(&self) -> &[usize];

    /// Per-row probability vectors, one entry per class.
    fn predict_proba(&self, rows: &[FeatureRecord]) -> Result<Vec<Vec<f64>>, ScoringError>;

    /// Per-row predicted class (the class with the highest probability).
    fn predict(&self, rows: &[FeatureRecord]) -> Result<Vec<usize>, ScoringError> {
        self.classes_from_proba(&self.predict_proba(rows)?)
    }

    /// Pick each row's class from probabilities already computed.
    fn classes_from_proba(&self, proba: &[Vec<f64>]) -> Result<Vec<usize>, ScoringError> {
        let classes = self.classes();
        proba
            .iter()
            .map(|p| {
                argmax(p)
                    .and_then(|i| classes.get(i).copied())
                    .ok_or(ScoringError::EmptyOutput)
            })
            .collect()
    }

    /// Known categories of a categorical column, if the model tracks them.
    fn categories(&self, _column: &str) -> Option<&[String]> {
        None
    }
}

fn argmax(p: &[f64]) -> Option<usize> {
    p.iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f64)>, (i, &v)| match best {
            Some((_, b)) if b >= v => best,
            _ => Some((i, v)),
        })
        .map(|(i, _)| i)
}

// ---------- Pipeline artifact ----------

#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Transform {
    Standard { mean: f64, scale: f64 },
    Passthrough,
    OneHot { categories: Vec<String> },
}

impl Transform {
    fn width(&self) -> usize {
        match self {
            Transform::OneHot { categories } => categories.len(),
            _ => 1,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct ColumnSpec {
    pub name: String,
    pub transform: Transform,
}

#[derive(Deserialize, Debug, Clone)]
pub struct PipelineArtifact {
    pub columns: Vec<ColumnSpec>,
    pub classes: Vec<usize>,
    pub coef: Vec<Vec<f64>>,
    pub intercept: Vec<f64>,
}

/// Fitted preprocessing (scaling, one-hot) followed by a linear classifier.
#[derive(Debug)]
pub struct LinearPipeline {
    columns: Vec<ColumnSpec>,
    // schema index of each pipeline column
    sources: Vec<usize>,
    classes: Vec<usize>,
    coef: Vec<Vec<f64>>,
    intercept: Vec<f64>,
}

impl LinearPipeline {
    pub fn from_artifact(a: PipelineArtifact) -> Result<Self, LoadError> {
        let invalid = |msg: String| LoadError::InvalidPipeline(msg);

        let mut sources = Vec::with_capacity(a.columns.len());
        for col in &a.columns {
            let idx = field_index(&col.name)
                .ok_or_else(|| invalid(format!("unknown input column '{}'", col.name)))?;
            let numeric_transform = !matches!(col.transform, Transform::OneHot { .. });
            if numeric_transform && INPUT_SCHEMA[idx].kind == FieldKind::Categorical {
                return Err(invalid(format!(
                    "column '{}' is categorical but has a numeric transform",
                    col.name
                )));
            }
            sources.push(idx);
        }

        let width: usize = a.columns.iter().map(|c| c.transform.width()).sum();
        if a.coef.is_empty() {
            return Err(invalid("coefficient matrix is empty".into()));
        }
        if let Some(row) = a.coef.iter().find(|r| r.len() != width) {
            return Err(invalid(format!(
                "coefficient row has {} entries, encoded width is {}",
                row.len(),
                width
            )));
        }
        if a.intercept.len() != a.coef.len() {
            return Err(invalid(format!(
                "intercept has {} entries, coefficient matrix has {} rows",
                a.intercept.len(),
                a.coef.len()
            )));
        }
        let binary = a.coef.len() == 1 && a.classes.len() == 2;
        if !binary && a.classes.len() != a.coef.len() {
            return Err(invalid(format!(
                "{} classes but {} coefficient rows",
                a.classes.len(),
                a.coef.len()
            )));
        }

        Ok(Self {
            columns: a.columns,
            sources,
            classes: a.classes,
            coef: a.coef,
            intercept: a.intercept,
        })
    }

    pub fn load(path: &Path) -> Result<Self, LoadError> {
        Self::from_artifact(read_json(path)?)
    }

    /// Encode one record into the model's input vector.
    pub fn encode(&self, rec: &FeatureRecord) -> Result<Vec<f64>, ScoringError> {
        let mut out = Vec::new();
        for (col, &src) in self.columns.iter().zip(&self.sources) {
            let value = rec.get(src);
            match &col.transform {
                Transform::Standard { mean, scale } => {
                    let x = numeric(col, value)?;
                    let s = if *scale == 0.0 { 1.0 } else { *scale };
                    out.push((x - mean) / s);
                }
                Transform::Passthrough => out.push(numeric(col, value)?),
                Transform::OneHot { categories } => {
                    let v = value.as_category();
                    out.extend(categories.iter().map(|c| if *c == v { 1.0 } else { 0.0 }));
                }
            }
        }
        Ok(out)
    }

    fn proba_one(&self, x: &[f64]) -> Vec<f64> {
        let scores: Vec<f64> = self
            .coef
            .iter()
            .zip(&self.intercept)
            .map(|(w, b)| w.iter().zip(x).map(|(w, x)| w * x).sum::<f64>() + b)
            .collect();

        if scores.len() == 1 && self.classes.len() == 2 {
            let p1 = 1.0 / (1.0 + (-scores[0]).exp());
            return vec![1.0 - p1, p1];
        }

        let max = scores.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let exps: Vec<f64> = scores.iter().map(|s| (s - max).exp()).collect();
        let total: f64 = exps.iter().sum();
        exps.into_iter().map(|e| e / total).collect()
    }
}

fn numeric(col: &ColumnSpec, value: &FieldValue) -> Result<f64, ScoringError> {
    value.as_number().ok_or_else(|| ScoringError::NonNumeric {
        column: col.name.clone(),
        value: value.to_string(),
    })
}

impl Classifier for LinearPipeline {
    fn feature_order(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    fn classes(&self) -> &[usize] {
        &self.classes
    }

    fn predict_proba(&self, rows: &[FeatureRecord]) -> Result<Vec<Vec<f64>>, ScoringError> {
        rows.iter()
            .map(|r| self.encode(r).map(|x| self.proba_one(&x)))
            .collect()
    }

    fn categories(&self, column: &str) -> Option<&[String]> {
        self.columns.iter().find(|c| c.name == column).and_then(|c| match &c.transform {
            Transform::OneHot { categories } => Some(categories.as_slice()),
            _ => None,
        })
    }
}

// ---------- Label decoder ----------

/// Maps an encoded class index back to its category name.
#[derive(Debug, Clone)]
pub struct LabelDecoder {
    classes: Vec<String>,
}

impl LabelDecoder {
    pub fn new(classes: Vec<String>) -> Self {
        Self { classes }
    }

    /// Pick the encoder named `target` out of an encoder artifact.
    pub fn load(path: &Path, target: &str) -> Result<Self, LoadError> {
        let mut encoders: HashMap<String, Vec<String>> = read_json(path)?;
        encoders
            .remove(target)
            .map(Self::new)
            .ok_or_else(|| LoadError::MissingEncoder(target.to_string()))
    }

    pub fn inverse_transform(&self, class: usize) -> Result<&str, ScoringError> {
        self.classes
            .get(class)
            .map(String::as_str)
            .ok_or(ScoringError::UnknownClass(class))
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, LoadError> {
    let txt = fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&txt).map_err(|source| LoadError::Json {
        path: path.to_path_buf(),
        source,
    })
}

// ---------- Process-wide artifacts ----------

/// The pipeline and decoder, loaded together and never mutated.
pub struct Artifacts {
    pub pipeline: Arc<dyn Classifier>,
    pub decoder: LabelDecoder,
}

impl Artifacts {
    /// Check the pair agrees and score a neutral record once.
    pub fn new(pipeline: Arc<dyn Classifier>, decoder: LabelDecoder) -> Result<Self, LoadError> {
        if let Some(&c) = pipeline.classes().iter().find(|&&c| c >= decoder.classes().len()) {
            return Err(LoadError::InvalidPipeline(format!(
                "class {} has no label (decoder knows {} labels)",
                c,
                decoder.classes().len()
            )));
        }
        let probe = FeatureRecord::neutral();
        pipeline.predict_proba(std::slice::from_ref(&probe))?;
        Ok(Self { pipeline, decoder })
    }
}

/// Readiness of the model, fixed at startup.
pub enum ModelState {
    Ready(Artifacts),
    Unavailable,
}

impl ModelState {
    /// Load both artifacts from the configured paths. Never fails: any
    /// error is logged and leaves the service in degraded mode.
    pub fn load(cfg: &AppConfig) -> Self {
        match Self::try_load(cfg) {
            Ok(artifacts) => {
                tracing::info!(
                    "loaded model; feature order[{}]: {:?}",
                    artifacts.pipeline.feature_order().len(),
                    artifacts.pipeline.feature_order()
                );
                tracing::info!("label decoder classes: {:?}", artifacts.decoder.classes());
                ModelState::Ready(artifacts)
            }
            Err(e) => {
                tracing::error!("model unavailable, running in degraded mode: {e}");
                ModelState::Unavailable
            }
        }
    }

    fn try_load(cfg: &AppConfig) -> Result<Artifacts, LoadError> {
        let pipeline = LinearPipeline::load(&cfg.model_path)?;
        let decoder = LabelDecoder::load(&cfg.encoders_path, &cfg.target_encoder)?;
        Artifacts::new(Arc::new(pipeline), decoder)
    }

    pub fn artifacts(&self) -> Option<&Artifacts> {
        match self {
            ModelState::Ready(a) => Some(a),
            ModelState::Unavailable => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.artifacts().is_some()
    }
}
