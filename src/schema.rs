use std::borrow::Cow;
use std::collections::HashSet;
use std::fmt;

use crate::error::InputError;

/// How a raw string is coerced before it reaches the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Integer,
    Float,
    Categorical,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    /// Advisory (min, max) rendered as form hints; never enforced.
    pub range: Option<(f64, f64)>,
}

const fn field(name: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec { name, kind, range: None }
}

const fn ranged(name: &'static str, kind: FieldKind, min: f64, max: f64) -> FieldSpec {
    FieldSpec { name, kind, range: Some((min, max)) }
}

use FieldKind::{Categorical, Float, Integer};

/// Authoritative input order expected by the trained pipeline.
pub static INPUT_SCHEMA: [FieldSpec; 28] = [
    ranged("Age", Integer, 0.0, 120.0),
    field("gender", Categorical),
    field("ethnicity", Categorical),
    field("education_level", Categorical),
    field("income_level", Categorical),
    field("employment_status", Categorical),
    field("smoking_status", Categorical),
    field("alcohol_consumption_per_week", Integer),
    field("physical_activity_minutes_per_week", Integer),
    ranged("diet_score", Float, 1.0, 10.0),
    field("sleep_hours_per_day", Float),
    field("screen_time_hours_per_day", Float),
    ranged("family_history_diabetes", Integer, 0.0, 1.0),
    ranged("hypertension_history", Integer, 0.0, 1.0),
    ranged("cardiovascular_history", Integer, 0.0, 1.0),
    ranged("bmi", Float, 10.0, 60.0),
    field("waist_to_hip_ratio", Float),
    field("systolic_bp", Integer),
    field("diastolic_bp", Integer),
    field("heart_rate", Integer),
    field("cholesterol_total", Integer),
    field("hdl_cholesterol", Integer),
    field("ldl_cholesterol", Integer),
    field("triglycerides", Integer),
    field("glucose_fasting", Integer),
    field("glucose_postprandial", Integer),
    field("insulin_level", Float),
    ranged("hba1c", Float, 3.0, 20.0),
];

pub fn field_index(name: &str) -> Option<usize> {
    INPUT_SCHEMA.iter().position(|f| f.name == name)
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Integer(i64),
    Float(f64),
    Categorical(String),
}

impl FieldValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Integer(v) => Some(*v as f64),
            FieldValue::Float(v) => Some(*v),
            FieldValue::Categorical(_) => None,
        }
    }

    pub fn as_category(&self) -> Cow<'_, str> {
        match self {
            FieldValue::Categorical(s) => Cow::Borrowed(s.as_str()),
            FieldValue::Integer(v) => Cow::Owned(v.to_string()),
            FieldValue::Float(v) => Cow::Owned(v.to_string()),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Integer(v) => write!(f, "{v}"),
            FieldValue::Float(v) => write!(f, "{v}"),
            FieldValue::Categorical(s) => f.write_str(s),
        }
    }
}

impl FieldSpec {
    /// Coerce one raw value according to this field's kind.
    pub fn coerce(&self, raw: &str) -> Result<FieldValue, InputError> {
        match self.kind {
            FieldKind::Integer => raw
                .trim()
                .parse::<i64>()
                .map(FieldValue::Integer)
                .map_err(|source| InputError::InvalidInteger {
                    field: self.name,
                    value: raw.to_string(),
                    source,
                }),
            FieldKind::Float => {
                let v = raw.trim().parse::<f64>().map_err(|source| InputError::InvalidFloat {
                    field: self.name,
                    value: raw.to_string(),
                    source,
                })?;
                // NaN, inf and overflowing literals like 1e400 parse fine
                if !v.is_finite() {
                    return Err(InputError::NonFinite {
                        field: self.name,
                        value: raw.to_string(),
                    });
                }
                Ok(FieldValue::Float(v))
            }
            FieldKind::Categorical => Ok(FieldValue::Categorical(raw.to_string())),
        }
    }
}

/// One subject's 28 typed values, stored in schema order.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRecord {
    values: Vec<FieldValue>,
}

impl FeatureRecord {
    /// Build a record by looking up every schema field through `lookup`.
    ///
    /// Shared by the form path (lookup into the submitted map) and the CSV
    /// path (lookup into a row by header position). An absent value, or an
    /// empty one for a numeric field, is a missing field.
    pub fn from_lookup<'a, F>(mut lookup: F) -> Result<Self, InputError>
    where
        F: FnMut(&str) -> Option<&'a str>,
    {
        let mut values = Vec::with_capacity(INPUT_SCHEMA.len());
        for spec in INPUT_SCHEMA.iter() {
            let raw = match lookup(spec.name) {
                Some(raw) if spec.kind == FieldKind::Categorical || !raw.trim().is_empty() => raw,
                _ => return Err(InputError::MissingField(spec.name)),
            };
            values.push(spec.coerce(raw)?);
        }
        Ok(Self { values })
    }

    /// Zero for every numeric field and an empty category elsewhere.
    pub fn neutral() -> Self {
        let values = INPUT_SCHEMA
            .iter()
            .map(|f| match f.kind {
                FieldKind::Integer => FieldValue::Integer(0),
                FieldKind::Float => FieldValue::Float(0.0),
                FieldKind::Categorical => FieldValue::Categorical(String::new()),
            })
            .collect();
        Self { values }
    }

    /// `index` is a schema position; every record holds all schema fields.
    pub fn get(&self, index: usize) -> &FieldValue {
        debug_assert!(index < INPUT_SCHEMA.len(), "schema index {index} out of range");
        &self.values[index]
    }

    pub fn values(&self) -> &[FieldValue] {
        &self.values
    }
}

/// Required columns absent from `present`, in schema order.
pub fn missing_columns<S: AsRef<str>>(present: &[S]) -> Vec<&'static str> {
    let present: HashSet<&str> = present.iter().map(|s| s.as_ref()).collect();
    INPUT_SCHEMA
        .iter()
        .map(|f| f.name)
        .filter(|name| !present.contains(name))
        .collect()
}
