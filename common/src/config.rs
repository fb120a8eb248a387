use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// Number of ONNX sessions kept for concurrent predictions.
    pub pool_size: usize,
    pub artifacts: ArtifactPaths,
    pub cors: CorsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactPaths {
    pub model: PathBuf,
    pub feature_names: PathBuf,
    pub label_mapping: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Exact origins, or patterns with a single `*` standing for subdomains
    /// (`https://*.vercel.app`).
    pub allowed_origins: Vec<String>,
    pub allow_credentials: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8000".to_string(),
            pool_size: 2,
            artifacts: ArtifactPaths::default(),
            cors: CorsConfig::default(),
        }
    }
}

impl Default for ArtifactPaths {
    fn default() -> Self {
        Self {
            model: PathBuf::from("obesity_model.onnx"),
            feature_names: PathBuf::from("feature_names.json"),
            label_mapping: PathBuf::from("label_mapping.json"),
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "https://*.vercel.app".to_string(),
            ],
            allow_credentials: true,
        }
    }
}

impl ServerConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: ServerConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        Ok(config)
    }

    /// Reads `CLASSIFIER_CONFIG` if set, then applies the environment
    /// overrides on top.
    pub fn from_env() -> Result<Self> {
        let mut config = match std::env::var("CLASSIFIER_CONFIG") {
            Ok(path) => Self::load(path)?,
            Err(_) => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup("BIND_ADDR") {
            self.bind_addr = addr;
        }
        if let Some(size) = lookup("POOL_SIZE") {
            self.pool_size = size
                .parse()
                .with_context(|| format!("POOL_SIZE must be a positive integer, got {size:?}"))?;
        }
        if let Some(path) = lookup("MODEL_PATH") {
            self.artifacts.model = path.into();
        }
        if let Some(path) = lookup("FEATURE_NAMES_PATH") {
            self.artifacts.feature_names = path.into();
        }
        if let Some(path) = lookup("LABEL_MAPPING_PATH") {
            self.artifacts.label_mapping = path.into();
        }
        if self.pool_size == 0 {
            anyhow::bail!("pool_size must be at least 1");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadTestConfig {
    pub warmup: WarmupConfig,
    pub scenarios: Vec<ScenarioConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarmupConfig {
    pub enabled: bool,
    pub num_requests: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioConfig {
    pub name: String,
    pub concurrency: usize,
    pub num_requests: usize,
    #[serde(default)]
    pub description: String,
}

impl LoadTestConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: LoadTestConfig = serde_yaml::from_str(&contents)?;
        Ok(config)
    }
}
