use serde::{Deserialize, Serialize};

/// Body of `POST /predict`. Every field is required.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictRequest {
    pub weight: f64,
    /// Meters.
    pub height: f64,
    /// "Male" or "Female".
    pub gender: String,
    pub age: i64,
    /// "Yes" or "No".
    pub high_caloric_food: String,
    /// "no", "Sometimes", "Frequently" or "Always".
    pub alcohol_intake: String,
    /// FCVC, 1 to 3.
    pub vegetable_intake: i64,
    /// NCP.
    pub main_meals: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictResponse {
    pub prediction: String,
    pub confidence: Option<f64>,
    pub input_data: PredictRequest,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub message: String,
    pub status: String,
    pub model_loaded: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfoResponse {
    pub model_path: String,
    pub predictor: String,
    pub feature_order: Vec<String>,
    pub classes: Vec<String>,
    pub model_load_time_ms: f64,
    pub total_requests: u64,
    pub cpu_count: usize,
    pub memory_rss_mb: f64,
    pub cpu_percent: f32,
}

/// Error body returned for every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: String,
}
