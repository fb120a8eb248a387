//! Start-of-life loading of the model, feature order and label mapping.
//!
//! Loading is all or nothing: if any artifact fails, the process keeps
//! running with no model and reports itself degraded.

use crate::{
    encoding::FeatureLayout,
    labels::{LabelDecoder, LabelMapping},
    onnx,
    predictor::Predictor,
};
use common::ArtifactPaths;
use serde::de::DeserializeOwned;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Instant,
};
use tracing::{error, info};

#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to load model {path}: {source}")]
    Model {
        path: PathBuf,
        #[source]
        source: ort::Error,
    },
}

/// Everything needed to serve predictions, fixed after load.
pub struct LoadedModel {
    pub model_path: PathBuf,
    pub predictor: Predictor,
    pub layout: FeatureLayout,
    pub labels: LabelDecoder,
    pub load_time_ms: f64,
}

#[derive(Clone, Default)]
pub struct Artifacts {
    model: Option<Arc<LoadedModel>>,
}

impl Artifacts {
    pub fn unavailable() -> Self {
        Self { model: None }
    }

    pub fn loaded(model: LoadedModel) -> Self {
        Self {
            model: Some(Arc::new(model)),
        }
    }

    pub fn model(&self) -> Option<&Arc<LoadedModel>> {
        self.model.as_ref()
    }

    pub fn is_loaded(&self) -> bool {
        self.model.is_some()
    }

    /// Loads all three artifacts. Failures are logged and yield
    /// [`Artifacts::unavailable`].
    pub fn load(paths: &ArtifactPaths, pool_size: usize) -> Self {
        match try_load(paths, pool_size) {
            Ok(model) => {
                info!(
                    predictor = model.predictor.kind(),
                    features = model.layout.len(),
                    classes = model.labels.class_names().len(),
                    "✓ Model loaded in {:.2}ms",
                    model.load_time_ms
                );
                Self::loaded(model)
            }
            Err(e) => {
                error!("Error loading model files: {e}");
                Self::unavailable()
            }
        }
    }
}

fn try_load(paths: &ArtifactPaths, pool_size: usize) -> Result<LoadedModel, ArtifactError> {
    let start_time = Instant::now();

    info!("Loading model: {}", paths.model.display());
    let predictor = onnx::load_predictor(&paths.model, pool_size).map_err(|source| {
        ArtifactError::Model {
            path: paths.model.clone(),
            source,
        }
    })?;

    let feature_names: Vec<String> = read_json(&paths.feature_names)?;
    let label_mapping: LabelMapping = read_json(&paths.label_mapping)?;

    Ok(LoadedModel {
        model_path: paths.model.clone(),
        predictor,
        layout: FeatureLayout::from_names(feature_names),
        labels: LabelDecoder::from_name_to_id(label_mapping.0),
        load_time_ms: start_time.elapsed().as_secs_f64() * 1000.0,
    })
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ArtifactError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ArtifactError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&contents).map_err(|source| ArtifactError::Json {
        path: path.to_path_buf(),
        source,
    })
}
