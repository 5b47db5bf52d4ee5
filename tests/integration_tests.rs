/// End-to-end tests driving the HTTP router with on-disk artifacts
///
/// Run with: cargo test --test integration_tests -- --nocapture
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

use stage_predictor::app;
use stage_predictor::config::AppConfig;
use stage_predictor::model::ModelState;
use stage_predictor::schema::{FieldKind, INPUT_SCHEMA};
use stage_predictor::types::{Notice, NoticeCategory, UNAVAILABLE_MESSAGE};

const STAGES: [&str; 4] = ["No Diabetes", "Pre-Diabetes", "Type 1", "Type 2"];
const BOUNDARY: &str = "XBOUNDARYX";

/// Four-class pipeline: hba1c pushes towards Type 2, activity away from it.
fn write_artifacts(dir: &TempDir) -> AppConfig {
    let mut columns = Vec::new();
    let mut hba1c_col = 0;
    let mut activity_col = 0;
    let mut width = 0;
    for f in INPUT_SCHEMA.iter() {
        let transform = match (f.name, f.kind) {
            ("smoking_status", _) => json!({"kind": "one_hot", "categories": ["Never", "Former", "Current"]}),
            (_, FieldKind::Categorical) => json!({"kind": "one_hot", "categories": []}),
            _ => json!({"kind": "standard", "mean": 0.0, "scale": 1.0}),
        };
        match f.name {
            "hba1c" => hba1c_col = width,
            "physical_activity_minutes_per_week" => activity_col = width,
            _ => {}
        }
        width += match (f.name, f.kind) {
            ("smoking_status", _) => 3,
            (_, FieldKind::Categorical) => 0,
            _ => 1,
        };
        columns.push(json!({"name": f.name, "transform": transform}));
    }
    let row = |hba1c: f64, activity: f64| {
        let mut r = vec![0.0; width];
        r[hba1c_col] = hba1c;
        r[activity_col] = activity;
        r
    };
    let pipeline = json!({
        "columns": columns,
        "classes": [0, 1, 2, 3],
        "coef": [row(-1.0, 0.02), row(0.0, 0.0), row(0.2, -0.05), row(1.0, -0.02)],
        "intercept": [5.7, 0.0, -3.0, -5.7],
    });
    let encoders = json!({
        "diabetes_stage": STAGES,
        "smoking_status": ["Current", "Former", "Never"],
    });

    let model_path = dir.path().join("full_diabetes_pipeline.json");
    let encoders_path = dir.path().join("target_encoders.json");
    std::fs::write(&model_path, pipeline.to_string()).unwrap();
    std::fs::write(&encoders_path, encoders.to_string()).unwrap();
    AppConfig {
        model_path,
        encoders_path,
        ..AppConfig::default()
    }
}

fn ready_app(dir: &TempDir) -> Router {
    let cfg = write_artifacts(dir);
    let model = ModelState::load(&cfg);
    assert!(model.is_ready(), "fixture artifacts should load");
    app::router(Arc::new(model), &cfg)
}

fn record(hba1c: &str) -> Vec<(&'static str, String)> {
    let base = [
        ("Age", "45"),
        ("gender", "Male"),
        ("ethnicity", "White"),
        ("education_level", "Highschool"),
        ("income_level", "Low"),
        ("employment_status", "Retired"),
        ("smoking_status", "Former"),
        ("alcohol_consumption_per_week", "3"),
        ("physical_activity_minutes_per_week", "90"),
        ("diet_score", "5.2"),
        ("sleep_hours_per_day", "6.5"),
        ("screen_time_hours_per_day", "3"),
        ("family_history_diabetes", "0"),
        ("hypertension_history", "1"),
        ("cardiovascular_history", "0"),
        ("bmi", "29.1"),
        ("waist_to_hip_ratio", "0.95"),
        ("systolic_bp", "135"),
        ("diastolic_bp", "85"),
        ("heart_rate", "76"),
        ("cholesterol_total", "210"),
        ("hdl_cholesterol", "42"),
        ("ldl_cholesterol", "140"),
        ("triglycerides", "180"),
        ("glucose_fasting", "118"),
        ("glucose_postprandial", "170"),
        ("insulin_level", "12.4"),
        ("hba1c", ""),
    ];
    base.iter()
        .map(|(k, v)| (*k, if *k == "hba1c" { hba1c.to_string() } else { v.to_string() }))
        .collect()
}

fn csv_from(records: &[Vec<(&'static str, String)>], drop: Option<&str>, extra: bool) -> String {
    let header: Vec<&str> = records[0]
        .iter()
        .map(|(k, _)| *k)
        .filter(|k| Some(*k) != drop)
        .collect();
    let mut out = header.join(",");
    if extra {
        out.push_str(",notes");
    }
    out.push('\n');
    for r in records {
        let cells: Vec<&str> = r
            .iter()
            .filter(|(k, _)| Some(*k) != drop)
            .map(|(_, v)| v.as_str())
            .collect();
        out.push_str(&cells.join(","));
        if extra {
            out.push_str(",follow-up");
        }
        out.push('\n');
    }
    out
}

async fn body_text(resp: axum::response::Response) -> String {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn post_form(app: Router, fields: &[(&str, String)]) -> String {
    let body = serde_urlencoded::to_string(fields).unwrap();
    let resp = app
        .oneshot(
            Request::post("/predict")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    body_text(resp).await
}

async fn upload(app: Router, filename: Option<&str>, content: &str) -> axum::response::Response {
    let disposition = match filename {
        Some(f) => format!("form-data; name=\"file\"; filename=\"{f}\""),
        None => "form-data; name=\"comment\"".to_string(),
    };
    let body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: {disposition}\r\nContent-Type: text/csv\r\n\r\n{content}\r\n--{BOUNDARY}--\r\n"
    );
    app.oneshot(
        Request::post("/predict_file")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap(),
    )
    .await
    .unwrap()
}

fn redirect_notice(resp: &axum::response::Response) -> Notice {
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    let location = resp.headers()[header::LOCATION].to_str().unwrap();
    let query = location
        .strip_prefix("/predict_file?")
        .expect("redirect goes back to the upload page");
    serde_urlencoded::from_str(query).unwrap()
}

fn extract_confidences(html: &str) -> Vec<f64> {
    html.match_indices('%')
        .filter_map(|(i, _)| {
            let start = html[..i].rfind(|c: char| !(c.is_ascii_digit() || c == '.'))? + 1;
            html[start..i].parse().ok()
        })
        .collect()
}

#[tokio::test]
async fn test_static_pages() {
    println!("\n=== Test: Static Pages ===");
    let dir = TempDir::new().unwrap();
    let app = ready_app(&dir);

    for (path, needle) in [
        ("/", "Diabetes Stage Prediction"),
        ("/predict", "predictionForm"),
        ("/predict_file", "multipart/form-data"),
    ] {
        let resp = app
            .clone()
            .oneshot(Request::get(path).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK, "{path}");
        assert!(body_text(resp).await.contains(needle), "{path}");
        println!("✓ GET {path}");
    }
}

#[tokio::test]
async fn test_single_prediction_success() {
    println!("\n=== Test: Single Prediction ===");
    let dir = TempDir::new().unwrap();
    let html = post_form(ready_app(&dir), &record("9.8")).await;

    assert!(html.contains("Prediction Successful"), "{html}");
    assert!(STAGES.iter().any(|s| html.contains(&format!("<strong>{s}</strong>"))));
    let conf = extract_confidences(&html);
    assert_eq!(conf.len(), 1);
    assert!((0.0..=100.0).contains(&conf[0]));
    println!("✓ confidence {:.2}%", conf[0]);
}

#[tokio::test]
async fn test_single_prediction_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let app = ready_app(&dir);
    let first = post_form(app.clone(), &record("6.3")).await;
    let second = post_form(app, &record("6.3")).await;
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_malformed_and_missing_fields() {
    println!("\n=== Test: Malformed Input ===");
    let dir = TempDir::new().unwrap();
    let app = ready_app(&dir);

    let mut bad = record("6.0");
    bad[0].1 = "abc".to_string();
    let html = post_form(app.clone(), &bad).await;
    assert!(html.contains("<h2>Error</h2>"));
    assert!(html.contains("invalid digit found in string"));
    // submitted values are kept in the form
    assert!(html.contains(r#"value="abc""#));

    let mut missing = record("6.0");
    missing.retain(|(k, _)| *k != "bmi");
    let html = post_form(app, &missing).await;
    assert!(html.contains("field &#39;bmi&#39; is missing"), "{html}");
    println!("✓ both rendered as error blocks");
}

#[tokio::test]
async fn test_non_finite_input_is_an_error() {
    let dir = TempDir::new().unwrap();
    let app = ready_app(&dir);
    for raw in ["NaN", "inf", "1e400"] {
        let html = post_form(app.clone(), &record(raw)).await;
        assert!(html.contains("<h2>Error</h2>"), "{raw}");
        assert!(html.contains("must be a finite number"), "{raw}");
        assert!(!html.contains("NaN%"), "{raw}");
    }

    let csv = csv_from(&[record("6.0"), record("NaN")], None, false);
    let notice = redirect_notice(&upload(app, Some("patients.csv"), &csv).await);
    assert_eq!(notice.category, NoticeCategory::Error);
    assert!(notice.notice.contains("row 2"), "{}", notice.notice);
}

#[tokio::test]
async fn test_degraded_mode() {
    println!("\n=== Test: Degraded Mode ===");
    let dir = TempDir::new().unwrap();
    let cfg = AppConfig {
        model_path: dir.path().join("missing.json"),
        encoders_path: dir.path().join("missing_too.json"),
        ..AppConfig::default()
    };
    let model = ModelState::load(&cfg);
    assert!(!model.is_ready());
    let app = app::router(Arc::new(model), &cfg);

    for fields in [record("7.0"), Vec::new()] {
        let html = post_form(app.clone(), &fields).await;
        assert!(html.contains("<h2>Error</h2>"));
        assert!(html.contains(UNAVAILABLE_MESSAGE));
    }

    let resp = upload(app.clone(), Some("data.csv"), "a,b\n1,2").await;
    let notice = redirect_notice(&resp);
    assert_eq!(notice.category, NoticeCategory::Error);
    assert_eq!(notice.notice, UNAVAILABLE_MESSAGE);

    let resp = app
        .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let health: serde_json::Value = serde_json::from_str(&body_text(resp).await).unwrap();
    assert_eq!(health, json!({"status": "degraded", "model_ready": false}));
    println!("✓ every prediction path short-circuits");
}

#[tokio::test]
async fn test_batch_upload_preserves_rows() {
    println!("\n=== Test: Batch Upload ===");
    let dir = TempDir::new().unwrap();
    let rows = vec![record("4.9"), record("12.5"), record("5.1"), record("11.0")];
    let csv = csv_from(&rows, None, true);

    let resp = upload(ready_app(&dir), Some("patients.csv"), &csv).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let html = body_text(resp).await;

    assert!(html.contains("4 rows predicted"));
    assert_eq!(html.matches("<tr><td>").count(), 4);
    let stages: Vec<&str> = html
        .split("<tr><td>")
        .skip(1)
        .map(|r| r.split("</td><td>").nth(1).unwrap())
        .collect();
    assert_eq!(stages, vec!["No Diabetes", "Type 2", "No Diabetes", "Type 2"]);
    let conf = extract_confidences(&html);
    assert_eq!(conf.len(), 4);
    assert!(conf.iter().all(|c| (0.0..=100.0).contains(c)));
    println!("✓ {} rows in order", stages.len());
}

#[tokio::test]
async fn test_batch_missing_column() {
    let dir = TempDir::new().unwrap();
    let csv = csv_from(&[record("6.0")], Some("hba1c"), false);
    let resp = upload(ready_app(&dir), Some("patients.csv"), &csv).await;
    let notice = redirect_notice(&resp);
    assert_eq!(notice.category, NoticeCategory::Error);
    assert!(notice.notice.contains("hba1c"), "{}", notice.notice);
    assert!(!notice.notice.contains("bmi"));
}

#[tokio::test]
async fn test_upload_rejections() {
    println!("\n=== Test: Upload Rejections ===");
    let dir = TempDir::new().unwrap();
    let app = ready_app(&dir);
    let csv = csv_from(&[record("6.0")], None, false);

    let notice = redirect_notice(&upload(app.clone(), Some("data.txt"), &csv).await);
    assert!(notice.notice.contains("only .csv files"));

    let notice = redirect_notice(&upload(app.clone(), Some(""), &csv).await);
    assert_eq!(notice.notice, "no file selected");

    let notice = redirect_notice(&upload(app.clone(), None, &csv).await);
    assert_eq!(notice.notice, "no file part in the request");

    let header_only = csv.lines().next().unwrap().to_string();
    let notice = redirect_notice(&upload(app.clone(), Some("empty.csv"), &header_only).await);
    assert!(notice.notice.contains("no data rows"));

    // a body that is not multipart still gets a notice, not a bare 400
    let resp = app
        .clone()
        .oneshot(
            Request::post("/predict_file")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from("a=b"))
                .unwrap(),
        )
        .await
        .unwrap();
    let notice = redirect_notice(&resp);
    assert_eq!(notice.category, NoticeCategory::Error);
    assert_eq!(notice.notice, "no file part in the request");

    // the notice round-trips onto the upload page
    let resp = app
        .oneshot(
            Request::get("/predict_file?category=error&notice=no+file+selected")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let html = body_text(resp).await;
    assert!(html.contains(r#"<div class="notice error">no file selected</div>"#));
    println!("✓ all rejections redirect with an error notice");
}
