mod common;

use common::*;
use health_model_gateway::router;
use reqwest::multipart::{Form, Part};
use serde_json::{json, Value};
use tempfile::tempdir;
use tokio::net::TcpListener;

async fn spawn(app: axum::Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn serves_predictions_over_tcp() {
    let dir = tempdir().unwrap();
    write_diabetes_model(dir.path());
    let base = spawn(router(state_from_dir(dir.path()))).await;
    let client = reqwest::Client::new();

    let health: Value = client
        .get(format!("{base}/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["models_loaded"], 1);

    let response = client
        .post(format!("{base}/predict/diabetes"))
        .json(&json!({ "features": [2, 120, 70, 20, 79, 25.0, 0.5, 30] }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert!(body["prediction"].is_boolean());
    assert_eq!(body["probability"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn accepts_multipart_uploads_over_tcp() {
    let model = CountingModel::new(0.12);
    let base = spawn(router(state_with_model("kidney_disease", model.clone()))).await;

    let part = Part::bytes(png_bytes(512, 512))
        .file_name("kidney.png")
        .mime_str("image/png")
        .unwrap();
    let form = Form::new().part("file", part);

    let response = reqwest::Client::new()
        .post(format!("{base}/predict/kidney-disease/image"))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["prediction"], false);
    assert_eq!(body["diagnosis"], "No Kidney Disease");
    assert_eq!(model.calls(), 1);
}

#[tokio::test]
async fn allows_cross_origin_requests() {
    let dir = tempdir().unwrap();
    let base = spawn(router(state_from_dir(dir.path()))).await;

    let response = reqwest::Client::new()
        .get(format!("{base}/models/status"))
        .header("Origin", "http://dashboard.local")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("*")
    );
}
