use ndarray::{Array2, ArrayView2, Axis};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum PredictError {
    #[error("ORT error: {0}")]
    Runtime(#[from] ort::Error),

    #[error("Shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("model returned {got} predictions for {expected} rows")]
    RowCountMismatch { expected: usize, got: usize },

    #[error("model output {0:?} is missing")]
    MissingOutput(String),

    #[error("session lock poisoned")]
    Poisoned,
}

/// Batch classification over rows of encoded features.
pub trait Classifier: Send + Sync {
    fn predict(&self, rows: ArrayView2<'_, f64>) -> Result<Vec<i64>, PredictError>;
}

/// A classifier that also scores every class.
pub trait ProbabilisticClassifier: Classifier {
    /// One row of class probabilities per input row.
    fn predict_proba(&self, rows: ArrayView2<'_, f64>) -> Result<Array2<f64>, PredictError>;

    fn predict_with_confidence(
        &self,
        rows: ArrayView2<'_, f64>,
    ) -> Result<Vec<(i64, f64)>, PredictError> {
        let labels = self.predict(rows)?;
        let confidences = max_per_row(&self.predict_proba(rows)?);
        if confidences.len() != labels.len() {
            return Err(PredictError::RowCountMismatch {
                expected: labels.len(),
                got: confidences.len(),
            });
        }
        Ok(labels.into_iter().zip(confidences).collect())
    }
}

/// Highest class probability of each row, clamped to [0, 1].
pub fn max_per_row(probabilities: &Array2<f64>) -> Vec<f64> {
    probabilities
        .axis_iter(Axis(0))
        .map(|row| row.iter().copied().fold(0.0_f64, f64::max).clamp(0.0, 1.0))
        .collect()
}

/// The loaded predictor, with its capabilities probed once at load.
#[derive(Clone)]
pub enum Predictor {
    ClassifierOnly(Arc<dyn Classifier>),
    ClassifierWithConfidence(Arc<dyn ProbabilisticClassifier>),
    /// The artifact loaded but cannot classify.
    NotAClassifier { reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawPrediction {
    pub class_id: i64,
    pub confidence: Option<f64>,
}

#[derive(Debug, thiserror::Error)]
pub enum InvokeError {
    #[error("{0}")]
    InvalidArtifact(String),

    #[error(transparent)]
    Predict(#[from] PredictError),
}

impl Predictor {
    pub fn kind(&self) -> &'static str {
        match self {
            Predictor::ClassifierOnly(_) => "classifier_only",
            Predictor::ClassifierWithConfidence(_) => "classifier_with_confidence",
            Predictor::NotAClassifier { .. } => "not_a_classifier",
        }
    }

    /// Classifies a single encoded row.
    pub fn classify(&self, row: &[f64]) -> Result<RawPrediction, InvokeError> {
        let batch = ArrayView2::from_shape((1, row.len()), row).map_err(PredictError::from)?;

        match self {
            Predictor::ClassifierOnly(model) => {
                let class_id = first(model.predict(batch)?)?;
                Ok(RawPrediction {
                    class_id,
                    confidence: None,
                })
            }
            Predictor::ClassifierWithConfidence(model) => {
                let (class_id, confidence) = first(model.predict_with_confidence(batch)?)?;
                Ok(RawPrediction {
                    class_id,
                    confidence: Some(confidence),
                })
            }
            Predictor::NotAClassifier { reason } => {
                Err(InvokeError::InvalidArtifact(reason.clone()))
            }
        }
    }
}

fn first<T>(values: Vec<T>) -> Result<T, PredictError> {
    let got = values.len();
    values
        .into_iter()
        .next()
        .ok_or(PredictError::RowCountMismatch { expected: 1, got })
}
