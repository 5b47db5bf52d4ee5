use axum::{
    extract::{multipart::MultipartRejection, DefaultBodyLimit, Form, Multipart, Query, State},
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use std::{collections::HashMap, path::Path, sync::Arc};

use crate::config::AppConfig;
use crate::error::UploadRejection;
use crate::model::ModelState;
use crate::predictor;
use crate::render;
use crate::types::{Notice, PredictionOutcome, UNAVAILABLE_MESSAGE};

// ---------- Server state ----------

#[derive(Clone)]
pub struct AppState {
    pub model: Arc<ModelState>,
}

pub fn router(model: Arc<ModelState>, cfg: &AppConfig) -> Router {
    Router::new()
        .route("/", get(dashboard))
        .route("/predict", get(predict_form).post(predict_submit))
        .route("/predict_file", get(upload_form).post(predict_file))
        .route("/healthz", get(healthz))
        .layer(DefaultBodyLimit::max(cfg.max_upload_bytes))
        .with_state(AppState { model })
}

// ---------- Handlers ----------

async fn dashboard() -> Html<String> {
    Html(render::dashboard_page())
}

async fn predict_form(State(state): State<AppState>) -> Html<String> {
    let unavailable = PredictionOutcome::failure(UNAVAILABLE_MESSAGE);
    let result = (!state.model.is_ready()).then_some(&unavailable);
    Html(render::predict_page(&state.model, result, &HashMap::new()))
}

async fn predict_submit(
    State(state): State<AppState>,
    form: Option<Form<HashMap<String, String>>>,
) -> Html<String> {
    let values = form.map(|Form(v)| v).unwrap_or_default();
    let result = predictor::predict_record(&state.model, &values);
    match &result {
        PredictionOutcome::Success(p) => {
            tracing::info!("predicted stage={} confidence={}", p.stage, p.confidence)
        }
        PredictionOutcome::Failure { message } => tracing::warn!("prediction failed: {message}"),
    }
    Html(render::predict_page(&state.model, Some(&result), &values))
}

async fn upload_form(notice: Option<Query<Notice>>) -> Html<String> {
    Html(render::upload_page(notice.as_ref().map(|Query(n)| n)))
}

async fn predict_file(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    if !state.model.is_ready() {
        return redirect_with(Notice::error(UNAVAILABLE_MESSAGE));
    }

    // a body that is not multipart/form-data cannot carry a file part
    let mut multipart = match multipart {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!("upload rejected: {e}");
            return redirect_with(Notice::error(UploadRejection::NoFilePart));
        }
    };

    let bytes = match read_upload(&mut multipart).await {
        Ok(b) => b,
        Err(rejection) => {
            tracing::warn!("upload rejected: {rejection}");
            return redirect_with(Notice::error(rejection));
        }
    };

    match predictor::predict_csv(&state.model, &bytes) {
        Ok(report) => {
            tracing::info!("batch scored rows={} bytes={}", report.rows.len(), bytes.len());
            let notice = Notice::success(format!(
                "File processed successfully: {} rows predicted.",
                report.rows.len()
            ));
            Html(render::results_page(&report, &notice)).into_response()
        }
        Err(e) => {
            tracing::warn!("batch prediction failed: {e}");
            redirect_with(Notice::error(format!("Error processing file: {e}")))
        }
    }
}

async fn healthz(State(state): State<AppState>) -> Json<serde_json::Value> {
    let ready = state.model.is_ready();
    Json(json!({
        "status": if ready { "ok" } else { "degraded" },
        "model_ready": ready,
    }))
}

// ---------- Upload helpers ----------

/// Accept only non-empty file names with a `.csv` extension.
pub fn check_filename(name: &str) -> Result<(), UploadRejection> {
    if name.is_empty() {
        return Err(UploadRejection::EmptyFilename);
    }
    let is_csv = Path::new(name)
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("csv"))
        .unwrap_or(false);
    if !is_csv {
        return Err(UploadRejection::UnsupportedType(name.to_string()));
    }
    Ok(())
}

/// Find the `file` part, validate its name, and read it fully into memory.
async fn read_upload(multipart: &mut Multipart) -> Result<Vec<u8>, UploadRejection> {
    let malformed = |e: axum::extract::multipart::MultipartError| UploadRejection::Malformed(e.to_string());

    while let Some(field) = multipart.next_field().await.map_err(malformed)? {
        if field.name() != Some("file") {
            continue;
        }
        // a part without a filename attribute is a plain form value
        let Some(filename) = field.file_name().map(str::to_string) else {
            continue;
        };
        check_filename(&filename)?;
        let data = field.bytes().await.map_err(malformed)?;
        tracing::info!("received file: {} ({} bytes)", filename, data.len());
        return Ok(data.to_vec());
    }
    Err(UploadRejection::NoFilePart)
}

fn redirect_with(notice: Notice) -> Response {
    let target = match serde_urlencoded::to_string(&notice) {
        Ok(q) => format!("/predict_file?{q}"),
        Err(_) => "/predict_file".to_string(),
    };
    Redirect::to(&target).into_response()
}
