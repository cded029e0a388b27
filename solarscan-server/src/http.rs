use crate::metrics::Metrics;
use crate::static_files::{prune_outputs, serve_index};
use axum::{
    extract::rejection::{FormRejection, JsonRejection},
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde::{Deserialize, Serialize};
use solarscan_core::geo::validate_coordinates;
use solarscan_core::{PredictionRecord, SampleId, SolarScanConfig};
use solarscan_eye::{OutputPaths, SolarPipeline};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

// API state
#[derive(Clone)]
pub struct ApiState {
    pub config: Arc<SolarScanConfig>,
    pub pipeline: Arc<SolarPipeline>,
    pub metrics: Arc<Metrics>,
}

impl ApiState {
    pub fn new(config: Arc<SolarScanConfig>, pipeline: Arc<SolarPipeline>) -> Self {
        Self {
            config,
            pipeline,
            metrics: Arc::new(Metrics::new()),
        }
    }
}

// Response types
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub model: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// JSON body of `POST /api/v1/predict`
#[derive(Debug, Deserialize)]
pub struct PredictRequest {
    #[serde(alias = "latitude")]
    pub lat: f64,
    #[serde(alias = "longitude")]
    pub lon: f64,
    pub sample_id: Option<SampleId>,
}

/// Prediction record plus browser-facing image URLs
#[derive(Debug, Serialize)]
pub struct PredictResponse {
    #[serde(flatten)]
    pub record: PredictionRecord,
    pub tile_image_url: Option<String>,
    pub overlay_image_url: Option<String>,
}

impl PredictResponse {
    fn new(record: PredictionRecord, paths: &OutputPaths) -> Self {
        let tile_image_url = record.tile_image.as_ref().and_then(|_| output_url(&paths.tile));
        let overlay_image_url = record.overlay_image.as_ref().and_then(|_| output_url(&paths.overlay));
        Self {
            record,
            tile_image_url,
            overlay_image_url,
        }
    }
}

fn output_url(path: &Path) -> Option<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| format!("/outputs/{}", name))
}

fn error_response(status: StatusCode, message: impl Into<String>, code: &str) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
            code: code.to_string(),
        }),
    )
        .into_response()
}

/// Create HTTP router with all routes
pub fn create_router(state: ApiState) -> Router {
    let outputs_dir = state.config.server.outputs_dir.clone();
    let enable_cors = state.config.server.enable_cors;

    let public_routes = Router::new()
        .route("/", get(serve_index))
        .route("/health", get(health_handler))
        .route("/api/v1/health", get(health_handler))
        // Metrics (Prometheus format)
        .route("/metrics", get(metrics_handler));

    let predict_routes = Router::new()
        .route("/predict", post(predict_form_handler))
        .route("/api/v1/predict", post(predict_json_handler));

    let router = public_routes
        .merge(predict_routes)
        .nest_service("/outputs", ServeDir::new(outputs_dir))
        .fallback(not_found_handler)
        .with_state(state);

    let router = if enable_cors {
        router.layer(CorsLayer::permissive())
    } else {
        router
    };

    router.layer(TraceLayer::new_for_http())
}

/// Health check endpoint
async fn health_handler(State(state): State<ApiState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        model: state.pipeline.detector_name().to_string(),
    })
}

/// Metrics endpoint (Prometheus format)
async fn metrics_handler(State(state): State<ApiState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found", "NOT_FOUND")
}

/// Pull a coordinate out of the submitted form fields
fn parse_form_coordinates(fields: &HashMap<String, String>) -> Result<(f64, f64), (String, &'static str)> {
    let lat = fields.get("latitude").map(|v| v.trim()).filter(|v| !v.is_empty());
    let lon = fields.get("longitude").map(|v| v.trim()).filter(|v| !v.is_empty());

    let (lat, lon) = match (lat, lon) {
        (Some(lat), Some(lon)) => (lat, lon),
        _ => {
            return Err((
                "latitude and longitude are required".to_string(),
                "MISSING_FIELD",
            ))
        }
    };

    match (lat.parse::<f64>(), lon.parse::<f64>()) {
        (Ok(lat), Ok(lon)) => Ok((lat, lon)),
        _ => Err((
            "latitude and longitude must be numbers".to_string(),
            "INVALID_NUMBER",
        )),
    }
}

/// Form submission from the landing page
async fn predict_form_handler(
    State(state): State<ApiState>,
    form: Result<Form<HashMap<String, String>>, FormRejection>,
) -> Response {
    let Form(fields) = match form {
        Ok(form) => form,
        Err(rejection) => {
            state.metrics.record_bad_request();
            return error_response(StatusCode::BAD_REQUEST, rejection.body_text(), "INVALID_FORM");
        }
    };

    match parse_form_coordinates(&fields) {
        Ok((lat, lon)) => run_prediction(&state, SampleId::Number(1), lat, lon).await,
        Err((message, code)) => {
            state.metrics.record_bad_request();
            error_response(StatusCode::BAD_REQUEST, message, code)
        }
    }
}

/// JSON API for programmatic clients
async fn predict_json_handler(
    State(state): State<ApiState>,
    body: Result<Json<PredictRequest>, JsonRejection>,
) -> Response {
    match body {
        Ok(Json(request)) => {
            let sample_id = request.sample_id.unwrap_or(SampleId::Number(1));
            run_prediction(&state, sample_id, request.lat, request.lon).await
        }
        Err(rejection) => {
            state.metrics.record_bad_request();
            error_response(StatusCode::BAD_REQUEST, rejection.body_text(), "INVALID_JSON")
        }
    }
}

async fn run_prediction(state: &ApiState, sample_id: SampleId, lat: f64, lon: f64) -> Response {
    if let Err(e) = validate_coordinates(lat, lon) {
        state.metrics.record_bad_request();
        warn!("Rejected coordinate ({}, {}): {}", lat, lon, e);
        return error_response(StatusCode::BAD_REQUEST, e.to_string(), "INVALID_COORDINATE");
    }

    state.metrics.record_request();
    info!("Prediction request for ({:.6}, {:.6})", lat, lon);

    let paths = OutputPaths::for_request(&state.config.server.outputs_dir);
    let tile_size = state.config.tiles.tile_size;

    match state.pipeline.run(sample_id, lat, lon, &paths, tile_size).await {
        Ok(run) => {
            state.metrics.record_run(&run);
            spawn_prune(state);
            Json(PredictResponse::new(run.record, &paths)).into_response()
        }
        Err(e) => {
            error!("Prediction failed: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Prediction failed", "PREDICTION_ERROR")
        }
    }
}

/// Cap the number of images left behind by past requests
fn spawn_prune(state: &ApiState) {
    let keep = state.config.server.max_output_files;
    if keep == 0 {
        return;
    }
    let dir = state.config.server.outputs_dir.clone();
    tokio::task::spawn_blocking(move || match prune_outputs(&dir, keep) {
        Ok(0) => {}
        Ok(removed) => debug!("Removed {} old images from {:?}", removed, dir),
        Err(e) => warn!("Could not prune {:?}: {}", dir, e),
    });
}
