pub mod config;
pub mod http;
pub mod stats;

pub use config::{ArtifactPaths, CorsConfig, LoadTestConfig, ScenarioConfig, ServerConfig};
pub use http::{ErrorResponse, HealthResponse, InfoResponse, PredictRequest, PredictResponse};
pub use stats::LatencyStats;
