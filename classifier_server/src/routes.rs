use crate::{
    artifacts::Artifacts,
    cors, encoding,
    predictor::{InvokeError, RawPrediction},
};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use common::{
    CorsConfig, ErrorResponse, HealthResponse, InfoResponse, PredictRequest, PredictResponse,
};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use sysinfo::System;
use tower_http::trace::TraceLayer;
use tracing::{debug, error};

pub struct AppState {
    artifacts: Artifacts,
    total_requests: AtomicU64,
    system: tokio::sync::Mutex<System>,
}

impl AppState {
    pub fn new(artifacts: Artifacts) -> Self {
        Self {
            artifacts,
            total_requests: AtomicU64::new(0),
            system: tokio::sync::Mutex::new(System::new()),
        }
    }
}

pub enum AppError {
    ModelNotLoaded,
    InvalidArtifact { model_path: String, reason: String },
    Rejected(JsonRejection),
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            AppError::ModelNotLoaded => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Model not loaded".to_string())
            }
            AppError::InvalidArtifact { model_path, reason } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!(
                    "Model file appears to be invalid. Please ensure {model_path} contains a trained classifier, not a numeric array ({reason})."
                ),
            ),
            AppError::Rejected(rejection) => (rejection.status(), rejection.body_text()),
            AppError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Prediction error: {msg}"),
            ),
        };

        (status, Json(ErrorResponse { detail })).into_response()
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Rejected(rejection)
    }
}

pub fn router(state: Arc<AppState>, cors_config: &CorsConfig) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/info", get(info_handler))
        .route("/predict", post(predict))
        .layer(cors::layer(cors_config))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn root(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        message: "Obesity Classification API is running".to_string(),
        status: "healthy".to_string(),
        model_loaded: state.artifacts.is_loaded(),
    })
}

async fn info_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<InfoResponse>, AppError> {
    let model = state.artifacts.model().ok_or(AppError::ModelNotLoaded)?;

    let (memory_rss_mb, cpu_percent) = {
        let mut system = state.system.lock().await;
        match sysinfo::get_current_pid() {
            Ok(pid) => {
                system.refresh_process(pid);
                system
                    .process(pid)
                    .map(|p| (p.memory() as f64 / 1024.0 / 1024.0, p.cpu_usage()))
                    .unwrap_or((0.0, 0.0))
            }
            Err(_) => (0.0, 0.0),
        }
    };

    let cpu_count = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);

    Ok(Json(InfoResponse {
        model_path: model.model_path.display().to_string(),
        predictor: model.predictor.kind().to_string(),
        feature_order: model.layout.names().map(str::to_string).collect(),
        classes: model.labels.class_names(),
        model_load_time_ms: model.load_time_ms,
        total_requests: state.total_requests.load(Ordering::Relaxed),
        cpu_count,
        memory_rss_mb,
        cpu_percent,
    }))
}

// The model check runs before body validation, so a degraded server answers
// "Model not loaded" whatever it is sent.
async fn predict(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<PredictRequest>, JsonRejection>,
) -> Result<Json<PredictResponse>, AppError> {
    let model = Arc::clone(state.artifacts.model().ok_or(AppError::ModelNotLoaded)?);
    let Json(request) = payload?;

    // Update request counter
    state.total_requests.fetch_add(1, Ordering::Relaxed);

    // Encode in the column order the model was trained with
    let row = model.layout.arrange(&encoding::encode(&request));
    debug!(?row, "Encoded features");

    // Inference is blocking, keep it off the async workers
    let worker = Arc::clone(&model);
    let outcome = tokio::task::spawn_blocking(move || worker.predictor.classify(&row))
        .await
        .map_err(|e| {
            error!("Prediction task failed: {e}");
            AppError::Internal(e.to_string())
        })?;

    let RawPrediction {
        class_id,
        confidence,
    } = outcome.map_err(|e| match e {
        InvokeError::InvalidArtifact(reason) => AppError::InvalidArtifact {
            model_path: model.model_path.display().to_string(),
            reason,
        },
        InvokeError::Predict(e) => {
            error!(error = ?e, "Error occurred during prediction");
            AppError::Internal(e.to_string())
        }
    })?;

    // Decode the class id to its display name
    Ok(Json(PredictResponse {
        prediction: model.labels.decode(class_id),
        confidence,
        input_data: request,
    }))
}
