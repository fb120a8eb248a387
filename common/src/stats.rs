use serde::{Deserialize, Serialize};
use statrs::statistics::{Data, Distribution, Max, Min, OrderStatistics};

/// Latency summary in milliseconds for one load scenario.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencyStats {
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    pub p95: f64,
    pub p99: f64,
    pub min: f64,
    pub max: f64,
    pub stddev: f64,
}

impl LatencyStats {
    pub fn from_samples(samples: &[f64]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }

        let mut data = Data::new(samples.to_vec());

        Self {
            count: samples.len(),
            mean: data.mean().unwrap_or(0.0),
            median: data.median(),
            p95: data.quantile(0.95),
            p99: data.quantile(0.99),
            min: data.min(),
            max: data.max(),
            stddev: data.std_dev().unwrap_or(0.0),
        }
    }
}
