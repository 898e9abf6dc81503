//! HTTP surface: the prediction API plus the kiosk's static pages.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use crate::error::{InferenceError, PredictError};
use crate::postprocess::Prediction;
use crate::predict::{ClassifierService, IMAGES_PER_TRAY};

/// Whether startup produced a usable model.
#[derive(Debug)]
pub enum Readiness {
    Ready(Arc<ClassifierService>),
    /// Startup failed; the message is returned to every prediction call.
    Degraded(String),
}

#[derive(Debug, Clone)]
pub struct AppState {
    readiness: Arc<Readiness>,
}

impl AppState {
    pub fn new(readiness: Readiness) -> Self {
        Self {
            readiness: Arc::new(readiness),
        }
    }

    fn service(&self) -> Result<Arc<ClassifierService>, ApiError> {
        match self.readiness.as_ref() {
            Readiness::Ready(service) => Ok(service.clone()),
            Readiness::Degraded(reason) => {
                Err(ApiError::NotReady(format!("model not loaded: {reason}")))
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub public_dir: PathBuf,
    pub max_body_bytes: usize,
}

#[derive(Debug, Deserialize)]
pub struct PredictRequest {
    pub images: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct PredictResponse {
    pub success: bool,
    pub predictions: Vec<Prediction>,
}

/// Request failure, rendered as `{"success": false, "error": ...}`.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    PayloadTooLarge(String),
    NotReady(String),
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::NotReady(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(m)
            | ApiError::PayloadTooLarge(m)
            | ApiError::NotReady(m)
            | ApiError::Internal(m) => m,
        }
    }
}

impl From<PredictError> for ApiError {
    fn from(err: PredictError) -> Self {
        match err {
            PredictError::Validation(msg) => ApiError::BadRequest(msg),
            PredictError::Inference(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge(rejection.body_text())
        } else {
            ApiError::BadRequest(rejection.body_text())
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = %status, error = self.message(), "request failed");
        } else {
            tracing::debug!(status = %status, error = self.message(), "request rejected");
        }
        let body = json!({ "success": false, "error": self.message() });
        (status, Json(body)).into_response()
    }
}

async fn predict(
    State(state): State<AppState>,
    body: Result<Json<PredictRequest>, JsonRejection>,
) -> Result<Json<PredictResponse>, ApiError> {
    let service = state.service()?;
    let Json(request) = body?;
    let images = request.images.ok_or_else(|| {
        ApiError::BadRequest(format!(
            "missing field `images`, expected {IMAGES_PER_TRAY} images"
        ))
    })?;

    let predictions = tokio::task::spawn_blocking(move || service.predict_batch(&images))
        .await
        .map_err(|e| ApiError::Internal(InferenceError::Aborted(e.to_string()).to_string()))??;

    Ok(Json(PredictResponse {
        success: true,
        predictions,
    }))
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    match state.readiness.as_ref() {
        Readiness::Ready(service) => (
            StatusCode::OK,
            Json(json!({ "status": "ready", "labels": service.labels().len() })),
        ),
        Readiness::Degraded(reason) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "degraded", "error": reason })),
        ),
    }
}

/// The metadata document the labels came from, for the kiosk front end.
async fn food_info(State(state): State<AppState>) -> Result<Json<Map<String, Value>>, ApiError> {
    let service = state.service()?;
    Ok(Json(service.labels().metadata().clone()))
}

/// Login page at `/`, everything else from the asset root.
fn static_routes(public_dir: &Path) -> Router<AppState> {
    let login = public_dir.join("web_login").join("login.html");
    Router::new()
        .route_service("/", ServeFile::new(login))
        .fallback_service(ServeDir::new(public_dir))
}

pub fn build_router(state: AppState, config: &ServerConfig) -> Router {
    Router::new()
        .route("/api/predict", post(predict))
        .route("/api/health", get(health))
        .route("/food_info.json", get(food_info))
        .merge(static_routes(&config.public_dir))
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
