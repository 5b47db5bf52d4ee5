//! HTML pages served by the web front end.

use std::collections::HashMap;
use std::fmt::Write;

use crate::model::ModelState;
use crate::schema::{FieldKind, FieldSpec, INPUT_SCHEMA};
use crate::types::{BatchReport, Notice, NoticeCategory, PredictionOutcome};

pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn layout(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title}</title>
</head>
<body>
<nav><a href="/">Dashboard</a> | <a href="/predict">Single prediction</a> | <a href="/predict_file">Batch prediction</a></nav>
<main>
{body}
</main>
</body>
</html>
"#,
        title = escape(title),
        body = body
    )
}

fn notice_block(notice: &Notice) -> String {
    let class = match notice.category {
        NoticeCategory::Error => "error",
        NoticeCategory::Success => "success",
    };
    format!(r#"<div class="notice {class}">{}</div>"#, escape(&notice.notice))
}

pub fn dashboard_page() -> String {
    layout(
        "Diabetes Stage Prediction",
        r#"<h1>Diabetes Stage Prediction</h1>
<p>Estimate a patient's diabetes stage from lifestyle and clinical measurements.</p>
<ul>
<li><a href="/predict">Enter a single patient record</a></li>
<li><a href="/predict_file">Upload a CSV file of patient records</a></li>
</ul>"#,
    )
}

fn field_input(spec: &FieldSpec, model: &ModelState, value: Option<&str>) -> String {
    let name = spec.name;
    let value = escape(value.unwrap_or(""));
    match spec.kind {
        FieldKind::Categorical => {
            let options = model
                .artifacts()
                .and_then(|a| a.pipeline.categories(name))
                .filter(|c| !c.is_empty());
            match options {
                Some(options) => {
                    let mut s = format!(r#"<select id="{name}" name="{name}" required>"#);
                    for opt in options {
                        let opt = escape(opt);
                        let selected = if opt == value { " selected" } else { "" };
                        let _ = write!(s, r#"<option value="{opt}"{selected}>{opt}</option>"#);
                    }
                    s.push_str("</select>");
                    s
                }
                None => format!(r#"<input type="text" id="{name}" name="{name}" value="{value}" required>"#),
            }
        }
        FieldKind::Integer | FieldKind::Float => {
            let step = if spec.kind == FieldKind::Integer { "1" } else { "any" };
            let bounds = spec
                .range
                .map(|(lo, hi)| format!(r#" min="{lo}" max="{hi}""#))
                .unwrap_or_default();
            format!(
                r#"<input type="number" id="{name}" name="{name}" step="{step}"{bounds} value="{value}" required>"#
            )
        }
    }
}

fn result_block(result: &PredictionOutcome) -> String {
    match result {
        PredictionOutcome::Success(p) => format!(
            r#"<section class="result-card success">
<h2>{status}</h2>
<p>Predicted stage: <strong>{stage}</strong></p>
<p>Confidence: <strong>{confidence}</strong></p>
</section>"#,
            status = result.status(),
            stage = escape(&p.stage),
            confidence = p.confidence
        ),
        PredictionOutcome::Failure { message } => format!(
            r#"<section class="result-card error">
<h2>{status}</h2>
<p>{message}</p>
</section>"#,
            status = result.status(),
            message = escape(message)
        ),
    }
}

/// Input form for one record, optionally with the outcome of a submission.
pub fn predict_page(
    model: &ModelState,
    result: Option<&PredictionOutcome>,
    values: &HashMap<String, String>,
) -> String {
    let mut body = String::from("<h1>Single prediction</h1>\n");
    if let Some(r) = result {
        body.push_str(&result_block(r));
        body.push('\n');
    }
    body.push_str(r#"<form id="predictionForm" method="post" action="/predict">"#);
    body.push('\n');
    for spec in INPUT_SCHEMA.iter() {
        let _ = writeln!(
            body,
            r#"<div class="field"><label for="{name}">{name}</label>{input}</div>"#,
            name = spec.name,
            input = field_input(spec, model, values.get(spec.name).map(String::as_str))
        );
    }
    body.push_str("<button type=\"submit\">Predict</button>\n</form>");
    layout("Single prediction", &body)
}

pub fn upload_page(notice: Option<&Notice>) -> String {
    let mut body = String::from("<h1>Batch prediction</h1>\n");
    if let Some(n) = notice {
        body.push_str(&notice_block(n));
        body.push('\n');
    }
    body.push_str(
        r#"<p>Upload a CSV file with a header row containing every required column.</p>
<form method="post" action="/predict_file" enctype="multipart/form-data">
<input type="file" name="file" accept=".csv">
<button type="submit">Upload and predict</button>
</form>"#,
    );
    layout("Batch prediction", &body)
}

pub fn results_page(report: &BatchReport, notice: &Notice) -> String {
    let mut body = String::from("<h1>Batch prediction results</h1>\n");
    body.push_str(&notice_block(notice));
    body.push_str("\n<table>\n<thead><tr><th>#</th><th>Predicted stage</th><th>Confidence</th></tr></thead>\n<tbody>\n");
    for (i, row) in report.rows.iter().enumerate() {
        let _ = writeln!(
            body,
            "<tr><td>{}</td><td>{}</td><td>{}</td></tr>",
            i + 1,
            escape(&row.stage),
            row.confidence
        );
    }
    body.push_str("</tbody>\n</table>\n<p><a href=\"/predict_file\">Upload another file</a></p>");
    layout("Batch prediction results", &body)
}
