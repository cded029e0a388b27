// HTTP API tests
// Drive the router with oneshot requests against a fake ESRI server and a stub detector

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use image::{Rgb, RgbImage};
use mockito::Matcher;
use serde_json::{json, Value};
use solarscan_core::SolarScanConfig;
use solarscan_eye::error::VisionError;
use solarscan_eye::{Detection, Detector, SolarPipeline, TileFetcher};
use solarscan_server::http::{create_router, ApiState};
use std::io::Cursor;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

struct StubDetector {
    confidence: Option<f32>,
}

impl Detector for StubDetector {
    fn detect(&self, _image: &RgbImage) -> Result<Vec<Detection>, VisionError> {
        Ok(self
            .confidence
            .map(|confidence| vec![Detection { class_id: 0, confidence, bbox: [100.0, 120.0, 160.0, 150.0] }])
            .unwrap_or_default())
    }

    fn name(&self) -> &str {
        "stub-detector"
    }
}

fn png_body() -> Vec<u8> {
    let image = RgbImage::from_pixel(64, 64, Rgb([70, 70, 70]));
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgb8(image)
        .write_to(&mut Cursor::new(&mut bytes), image::ImageOutputFormat::Png)
        .unwrap();
    bytes
}

struct TestApp {
    router: Router,
    state: ApiState,
    _outputs: TempDir,
    _server: mockito::ServerGuard,
}

async fn test_app(esri_status: usize, confidence: Option<f32>) -> TestApp {
    let mut server = mockito::Server::new_async().await;
    let mock = server.mock("GET", "/export").match_query(Matcher::Any).with_status(esri_status);
    let mock = if esri_status == 200 { mock.with_body(png_body()) } else { mock };
    mock.create_async().await;

    let outputs = TempDir::new().unwrap();
    let mut config = SolarScanConfig::default();
    config.server.outputs_dir = outputs.path().to_path_buf();
    config.tiles.esri_url = format!("{}/export", server.url());
    config.tiles.enable_fallback = false;
    config.tiles.tile_size = 64;
    let config = Arc::new(config);

    let fetcher = TileFetcher::from_config(&config.tiles).unwrap();
    let pipeline = Arc::new(SolarPipeline::new(
        Arc::clone(&config),
        fetcher,
        Arc::new(StubDetector { confidence }),
    ));
    let state = ApiState::new(config, pipeline);

    TestApp {
        router: create_router(state.clone()),
        state,
        _outputs: outputs,
        _server: server,
    }
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, bytes.to_vec())
}

fn form_request(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/predict")
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn json_request(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/v1/predict")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = test_app(200, None).await;
    let (status, body) = send(&app.router, get("/health")).await;
    assert_eq!(status, StatusCode::OK);

    let value: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value["status"], "healthy");
    assert_eq!(value["model"], "stub-detector");
    assert!(value["version"].is_string());
}

#[tokio::test]
async fn test_index_page_has_form() {
    let app = test_app(200, None).await;
    let (status, body) = send(&app.router, get("/")).await;
    assert_eq!(status, StatusCode::OK);
    let html = String::from_utf8(body).unwrap();
    assert!(html.contains("name=\"latitude\""));
    assert!(html.contains("name=\"longitude\""));
}

#[tokio::test]
async fn test_form_predict_with_panel() {
    let app = test_app(200, Some(0.91)).await;
    let (status, body) = send(&app.router, form_request("latitude=12.9716&longitude=77.5946")).await;
    assert_eq!(status, StatusCode::OK);

    let value: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value["sample_id"], 1);
    assert_eq!(value["has_solar"], true);
    assert_eq!(value["confidence"], 0.91);
    assert_eq!(value["qc_status"], "VERIFIABLE");
    assert_eq!(value["buffer_radius_sqft"], 1200);
    assert_eq!(value["bbox_or_mask"], json!({"bbox": [100.0, 120.0, 160.0, 150.0]}));
    assert_eq!(value["image_metadata"]["source"], "ESRI");
    assert!(value["pv_area_sqm_est"].as_f64().unwrap() > 0.0);

    // Images are reachable under /outputs
    let tile_url = value["tile_image_url"].as_str().unwrap().to_string();
    let overlay_url = value["overlay_image_url"].as_str().unwrap().to_string();
    assert!(tile_url.starts_with("/outputs/") && tile_url.ends_with("_tile.jpg"));
    let (status, bytes) = send(&app.router, get(&tile_url)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(image::load_from_memory(&bytes).is_ok());
    let (status, _) = send(&app.router, get(&overlay_url)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_form_predict_without_panel() {
    let app = test_app(200, None).await;
    let (status, body) = send(&app.router, form_request("latitude=51.5&longitude=-0.12")).await;
    assert_eq!(status, StatusCode::OK);

    let value: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value["has_solar"], false);
    assert_eq!(value["confidence"], 0.0);
    assert_eq!(value["qc_status"], "NOT_VERIFIABLE");
    assert_eq!(value["bbox_or_mask"], Value::Null);
    assert!(value["image_metadata"]["capture_date"].is_string());
}

#[tokio::test]
async fn test_provider_outage_is_not_verifiable() {
    let app = test_app(503, Some(0.9)).await;
    let (status, body) = send(&app.router, form_request("latitude=12.97&longitude=77.59")).await;
    assert_eq!(status, StatusCode::OK);

    let value: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value["has_solar"], false);
    assert_eq!(value["qc_status"], "NOT_VERIFIABLE");
    assert_eq!(value["image_metadata"], json!({"source": null, "capture_date": null}));
    assert_eq!(value["tile_image"], Value::Null);
    assert_eq!(value["tile_image_url"], Value::Null);

    let (_, metrics) = send(&app.router, get("/metrics")).await;
    let metrics = String::from_utf8(metrics).unwrap();
    assert!(metrics.contains("solarscan_fetch_failures_total 1"));
}

#[tokio::test]
async fn test_form_missing_fields() {
    let app = test_app(200, None).await;
    let (status, body) = send(&app.router, form_request("latitude=12.97")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let value: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value["code"], "MISSING_FIELD");
    assert!(value["error"].as_str().unwrap().contains("required"));
}

#[tokio::test]
async fn test_form_non_numeric() {
    let app = test_app(200, None).await;
    let (status, body) = send(&app.router, form_request("latitude=abc&longitude=1")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let value: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value["code"], "INVALID_NUMBER");
}

#[tokio::test]
async fn test_out_of_range_coordinate() {
    let app = test_app(200, None).await;
    let (status, body) = send(&app.router, form_request("latitude=123&longitude=1")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let value: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value["code"], "INVALID_COORDINATE");

    assert_eq!(
        app.state.metrics.bad_requests_total.load(std::sync::atomic::Ordering::Relaxed),
        1
    );
}

#[tokio::test]
async fn test_json_predict_with_sample_id() {
    let app = test_app(200, Some(0.2)).await;
    let (status, body) = send(
        &app.router,
        json_request(json!({"lat": 28.6139, "lon": 77.209, "sample_id": "roof-17"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let value: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value["sample_id"], "roof-17");
    assert_eq!(value["has_solar"], true);
    assert_eq!(value["qc_status"], "NOT_VERIFIABLE");
}

#[tokio::test]
async fn test_json_predict_malformed() {
    let app = test_app(200, None).await;
    let (status, body) = send(&app.router, json_request(json!({"lat": "north"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let value: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value["code"], "INVALID_JSON");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = test_app(200, Some(0.8)).await;
    send(&app.router, form_request("latitude=12.97&longitude=77.59")).await;

    let response = app.router.clone().oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()["content-type"].to_str().unwrap().starts_with("text/plain"));

    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("solarscan_predict_requests_total 1"));
    assert!(text.contains("solarscan_verifiable_total 1"));
    assert!(text.contains("solarscan_detections_total 1"));
}

#[tokio::test]
async fn test_unknown_route() {
    let app = test_app(200, None).await;
    let (status, body) = send(&app.router, get("/nope")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let value: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value["code"], "NOT_FOUND");
}
