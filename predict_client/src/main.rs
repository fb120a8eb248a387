use anyhow::{Context, Result};
use common::{
    ErrorResponse, HealthResponse, LatencyStats, LoadTestConfig, PredictRequest, PredictResponse,
    ScenarioConfig,
};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ScenarioResult {
    scenario_name: String,
    concurrency: usize,
    num_requests: usize,
    latency_ms: LatencyStats,
    throughput_qps: f64,
    total_duration_sec: f64,
    errors: usize,
    error_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LoadTestReport {
    server_url: String,
    request: PredictRequest,
    results: HashMap<String, ScenarioResult>,
    timestamp: String,
}

struct PredictClient {
    server_url: String,
    client: reqwest::blocking::Client,
}

impl PredictClient {
    fn new(server_url: String) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self { server_url, client })
    }

    fn wait_for_server(&self, timeout_secs: u64) -> Result<HealthResponse> {
        let start = Instant::now();

        println!("Waiting for server at {}...", self.server_url);

        while start.elapsed().as_secs() < timeout_secs {
            if let Ok(response) = self.client.get(format!("{}/", self.server_url)).send() {
                if response.status().is_success() {
                    let health: HealthResponse = response.json()?;
                    println!("✓ Server is ready! (model loaded: {})", health.model_loaded);
                    return Ok(health);
                }
            }
            std::thread::sleep(Duration::from_secs(2));
        }

        anyhow::bail!("✗ Server failed to start within {}s", timeout_secs)
    }

    fn predict(&self, request: &PredictRequest) -> Result<PredictResponse> {
        let response = self
            .client
            .post(format!("{}/predict", self.server_url))
            .json(request)
            .send()
            .context("Failed to send predict request")?;

        let status = response.status();
        if !status.is_success() {
            let detail = response
                .json::<ErrorResponse>()
                .map(|e| e.detail)
                .unwrap_or_default();
            anyhow::bail!("Server returned error: {} {}", status, detail);
        }

        Ok(response.json()?)
    }

    fn warmup(&self, request: &PredictRequest, num_iterations: usize) {
        println!("\nWarming up server ({} iterations)...", num_iterations);

        let pb = ProgressBar::new(num_iterations as u64);
        pb.set_style(bar_style("{msg} [{bar:40.cyan/blue}] {pos}/{len}"));
        pb.set_message("Warmup");

        let errors = (0..num_iterations)
            .filter(|_| {
                let failed = self.predict(request).is_err();
                pb.inc(1);
                failed
            })
            .count();

        pb.finish_with_message("✓ Warmup complete");

        if errors > 0 {
            println!(
                "⚠ Warning: {}/{} warmup requests failed",
                errors, num_iterations
            );
        }
    }

    fn run_scenario(
        &self,
        scenario: &ScenarioConfig,
        request: &PredictRequest,
    ) -> Result<ScenarioResult> {
        println!("\n{}", "=".repeat(70));
        println!("Scenario: {}", scenario.name);
        println!("  Concurrency: {}", scenario.concurrency);
        println!("  Requests: {}", scenario.num_requests);
        println!("{}", "=".repeat(70));

        let errors = AtomicUsize::new(0);
        let latencies = Mutex::new(Vec::with_capacity(scenario.num_requests));

        let pb = ProgressBar::new(scenario.num_requests as u64);
        pb.set_style(bar_style("{msg} [{bar:40.cyan/blue}] {pos}/{len} ({eta})"));
        pb.set_message("Running");

        let start_time = Instant::now();

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(scenario.concurrency.max(1))
            .build()?;

        pool.install(|| {
            (0..scenario.num_requests).into_par_iter().for_each(|_| {
                let request_start = Instant::now();

                match self.predict(request) {
                    Ok(_) => {
                        let latency = request_start.elapsed().as_secs_f64() * 1000.0;
                        if let Ok(mut latencies) = latencies.lock() {
                            latencies.push(latency);
                        }
                    }
                    Err(_) => {
                        errors.fetch_add(1, Ordering::SeqCst);
                    }
                }

                pb.inc(1);
            });
        });

        let total_duration = start_time.elapsed().as_secs_f64();
        pb.finish_with_message("✓ Complete");

        let latencies = latencies
            .into_inner()
            .map_err(|_| anyhow::anyhow!("latency buffer poisoned"))?;
        let error_count = errors.load(Ordering::SeqCst);

        let result = ScenarioResult {
            scenario_name: scenario.name.clone(),
            concurrency: scenario.concurrency,
            num_requests: scenario.num_requests,
            latency_ms: LatencyStats::from_samples(&latencies),
            throughput_qps: throughput(scenario.num_requests - error_count, total_duration),
            total_duration_sec: total_duration,
            errors: error_count,
            error_rate: ratio(error_count, scenario.num_requests),
        };

        println!("\nResults:");
        println!("  Total duration: {:.2}s", result.total_duration_sec);
        println!("  Throughput: {:.2} req/s", result.throughput_qps);
        println!("  Latency (mean): {:.2}ms", result.latency_ms.mean);
        println!("  Latency (p50): {:.2}ms", result.latency_ms.median);
        println!("  Latency (p95): {:.2}ms", result.latency_ms.p95);
        println!("  Latency (p99): {:.2}ms", result.latency_ms.p99);
        println!("  Errors: {}", result.errors);
        println!("  Error rate: {:.2}%", result.error_rate * 100.0);

        Ok(result)
    }

    fn run_load_test(
        &self,
        config: &LoadTestConfig,
        request: &PredictRequest,
    ) -> Result<LoadTestReport> {
        if config.warmup.enabled {
            self.warmup(request, config.warmup.num_requests);
        }

        let mut results = HashMap::new();
        for scenario in &config.scenarios {
            let result = self.run_scenario(scenario, request)?;
            results.insert(scenario.name.clone(), result);
        }

        Ok(LoadTestReport {
            server_url: self.server_url.clone(),
            request: request.clone(),
            results,
            timestamp: chrono::Utc::now().to_rfc3339(),
        })
    }
}

fn bar_style(template: &str) -> ProgressStyle {
    ProgressStyle::default_bar()
        .template(template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-")
}

fn throughput(successful: usize, seconds: f64) -> f64 {
    if seconds > 0.0 {
        successful as f64 / seconds
    } else {
        0.0
    }
}

fn ratio(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64
    }
}

/// Confidence as shown to users, e.g. `87.3%`.
fn format_confidence(confidence: Option<f64>) -> Option<String> {
    confidence.map(|c| format!("{:.1}%", c * 100.0))
}

fn sample_request() -> PredictRequest {
    PredictRequest {
        weight: 70.0,
        height: 1.75,
        gender: "Male".to_string(),
        age: 25,
        high_caloric_food: "Yes".to_string(),
        alcohol_intake: "Sometimes".to_string(),
        vegetable_intake: 2,
        main_meals: 3,
    }
}

fn load_request(path: &Path) -> Result<PredictRequest> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read request {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("Invalid request body in {}", path.display()))
}

fn main() -> Result<()> {
    let server_url = env::var("SERVER_URL").unwrap_or_else(|_| "http://localhost:8000".to_string());
    let request = match env::var("REQUEST_PATH") {
        Ok(path) => load_request(Path::new(&path))?,
        Err(_) => sample_request(),
    };

    println!("Server URL: {}", server_url);

    let client = PredictClient::new(server_url)?;
    client.wait_for_server(60)?;

    let Ok(config_path) = env::var("LOADTEST_CONFIG") else {
        let response = client.predict(&request)?;
        println!("Prediction: {}", response.prediction);
        if let Some(confidence) = format_confidence(response.confidence) {
            println!("Confidence: {}", confidence);
        }
        return Ok(());
    };

    let config = LoadTestConfig::load(&config_path)
        .context("Failed to load load-test configuration")?;
    let report = client.run_load_test(&config, &request)?;

    let output_path = env::var("RESULTS_PATH").unwrap_or_else(|_| "loadtest_results.json".to_string());
    fs::write(&output_path, serde_json::to_string_pretty(&report)?)?;

    println!("\n========================================================================");
    println!("Load test complete!");
    println!("Results saved to: {}", output_path);
    println!("========================================================================");

    Ok(())
}
