//! ONNX Runtime backed classifiers.
//!
//! The expected graph is a scikit-learn style export: one `[N, F]` float
//! input, an int64 label output first and, optionally, a float
//! `[N, C]` probability tensor second.

use crate::predictor::{Classifier, PredictError, Predictor, ProbabilisticClassifier};
use ndarray::{Array2, ArrayView2};
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    tensor::TensorElementType,
    value::{Tensor, ValueType},
};
use std::{
    path::Path,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex, MutexGuard,
    },
};
use tracing::{info, warn};

// Sessions run through `&mut self`, so each one sits behind its own lock.
struct SessionPool {
    sessions: Vec<Mutex<Session>>,
    round_robin_counter: AtomicUsize,
}

impl SessionPool {
    fn new(sessions: Vec<Session>) -> Self {
        Self {
            sessions: sessions.into_iter().map(Mutex::new).collect(),
            round_robin_counter: AtomicUsize::new(0),
        }
    }

    fn acquire(&self) -> Result<MutexGuard<'_, Session>, PredictError> {
        let idx = self.round_robin_counter.fetch_add(1, Ordering::Relaxed) % self.sessions.len();
        self.sessions[idx].lock().map_err(|_| PredictError::Poisoned)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Precision {
    F32,
    F64,
}

impl Precision {
    fn of(ty: Option<TensorElementType>) -> Option<Precision> {
        match ty {
            Some(TensorElementType::Float32) => Some(Precision::F32),
            Some(TensorElementType::Float64) => Some(Precision::F64),
            _ => None,
        }
    }
}

/// Input and output names resolved by [`probe`].
#[derive(Debug, Clone, PartialEq, Eq)]
struct Signature {
    input: String,
    precision: Precision,
    label: String,
    probabilities: Option<(String, Precision)>,
}

/// Outcome of inspecting a graph's inputs and outputs.
#[derive(Debug, PartialEq, Eq)]
enum Probe {
    Classifier(Signature),
    NotAClassifier(String),
}

fn tensor_type(value_type: &ValueType) -> Option<TensorElementType> {
    match value_type {
        ValueType::Tensor { ty, .. } => Some(*ty),
        _ => None,
    }
}

type Port = (String, Option<TensorElementType>);

fn probe(inputs: &[Port], outputs: &[Port]) -> Probe {
    let Some((input, input_ty)) = inputs.first() else {
        return Probe::NotAClassifier("the graph has no inputs".to_string());
    };
    let Some(precision) = Precision::of(*input_ty) else {
        return Probe::NotAClassifier(format!(
            "input {input:?} is {input_ty:?}, expected a float tensor"
        ));
    };

    let label = match outputs.first() {
        Some((name, Some(TensorElementType::Int64))) => name.clone(),
        Some((name, other)) => {
            return Probe::NotAClassifier(format!(
                "first output {name:?} is {other:?}; a classifier emits int64 labels, this looks like a bare numeric array"
            ))
        }
        None => return Probe::NotAClassifier("the graph has no outputs".to_string()),
    };

    let probabilities = match outputs.get(1) {
        Some((name, ty)) => match Precision::of(*ty) {
            Some(precision) => Some((name.clone(), precision)),
            None => {
                warn!(output = %name, kind = ?ty, "Probability output is not a float tensor; confidence disabled");
                None
            }
        },
        None => None,
    };

    Probe::Classifier(Signature {
        input: input.clone(),
        precision,
        label,
        probabilities,
    })
}

pub struct OnnxClassifier {
    pool: SessionPool,
    signature: Signature,
}

impl OnnxClassifier {
    fn run(
        &self,
        rows: ArrayView2<'_, f64>,
    ) -> Result<(Vec<i64>, Option<Array2<f64>>), PredictError> {
        // Cast the batch to the precision the graph was exported with
        let input = match self.signature.precision {
            Precision::F32 => Tensor::from_array(rows.mapv(|x| x as f32))?.into_dyn(),
            Precision::F64 => Tensor::from_array(rows.to_owned())?.into_dyn(),
        };

        // Acquire a session from the pool and run inference
        let mut session = self.pool.acquire()?;
        let outputs = session.run(ort::inputs![self.signature.input.as_str() => input])?;

        // Labels are one int64 per row
        let label_output = outputs
            .get(self.signature.label.as_str())
            .ok_or_else(|| PredictError::MissingOutput(self.signature.label.clone()))?;
        let (_, labels) = label_output.try_extract_tensor::<i64>()?;
        let labels = labels.to_vec();

        // Probabilities are [N, C], widened to f64
        let probabilities = match &self.signature.probabilities {
            Some((name, precision)) => {
                let output = outputs
                    .get(name.as_str())
                    .ok_or_else(|| PredictError::MissingOutput(name.clone()))?;
                let (classes, values) = match precision {
                    Precision::F32 => {
                        let (shape, data) = output.try_extract_tensor::<f32>()?;
                        let values: Vec<f64> = data.iter().map(|&p| f64::from(p)).collect();
                        (class_count(shape.as_ref()), values)
                    }
                    Precision::F64 => {
                        let (shape, data) = output.try_extract_tensor::<f64>()?;
                        (class_count(shape.as_ref()), data.to_vec())
                    }
                };
                Some(Array2::from_shape_vec((values.len() / classes, classes), values)?)
            }
            None => None,
        };

        if labels.len() != rows.nrows() {
            return Err(PredictError::RowCountMismatch {
                expected: rows.nrows(),
                got: labels.len(),
            });
        }

        Ok((labels, probabilities))
    }
}

fn class_count(shape: &[i64]) -> usize {
    shape.get(1).copied().unwrap_or(1).max(1) as usize
}

impl Classifier for OnnxClassifier {
    fn predict(&self, rows: ArrayView2<'_, f64>) -> Result<Vec<i64>, PredictError> {
        Ok(self.run(rows)?.0)
    }
}

impl ProbabilisticClassifier for OnnxClassifier {
    fn predict_proba(&self, rows: ArrayView2<'_, f64>) -> Result<Array2<f64>, PredictError> {
        self.run(rows)?
            .1
            .ok_or_else(|| PredictError::MissingOutput("probabilities".to_string()))
    }

    // Labels and probabilities come out of the same run.
    fn predict_with_confidence(
        &self,
        rows: ArrayView2<'_, f64>,
    ) -> Result<Vec<(i64, f64)>, PredictError> {
        let (labels, probabilities) = self.run(rows)?;
        let probabilities =
            probabilities.ok_or_else(|| PredictError::MissingOutput("probabilities".to_string()))?;
        let confidences = crate::predictor::max_per_row(&probabilities);
        if confidences.len() != labels.len() {
            return Err(PredictError::RowCountMismatch {
                expected: labels.len(),
                got: confidences.len(),
            });
        }
        Ok(labels.into_iter().zip(confidences).collect())
    }
}

/// Builds `pool_size` sessions for the graph at `path` and picks the
/// [`Predictor`] variant matching its outputs.
pub fn load_predictor(path: &Path, pool_size: usize) -> Result<Predictor, ort::Error> {
    let cpu_count = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    let pool_size = pool_size.max(1);
    let threads_per_session = (cpu_count / pool_size).max(1);

    let mut sessions = Vec::with_capacity(pool_size);
    for _ in 0..pool_size {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(threads_per_session)?
            .with_inter_threads(1)?
            .commit_from_file(path)?;
        sessions.push(session);
    }
    info!(
        "Session pool: {} sessions with {} threads each",
        pool_size, threads_per_session
    );

    let (inputs, outputs) = {
        let session = &sessions[0];
        let inputs: Vec<_> = session
            .inputs
            .iter()
            .map(|i| (i.name.clone(), tensor_type(&i.input_type)))
            .collect();
        let outputs: Vec<_> = session
            .outputs
            .iter()
            .map(|o| (o.name.clone(), tensor_type(&o.output_type)))
            .collect();
        (inputs, outputs)
    };

    let signature = match probe(&inputs, &outputs) {
        Probe::Classifier(signature) => signature,
        Probe::NotAClassifier(reason) => {
            warn!(model = %path.display(), %reason, "Model artifact cannot classify");
            return Ok(Predictor::NotAClassifier { reason });
        }
    };

    let has_probabilities = signature.probabilities.is_some();
    let classifier = Arc::new(OnnxClassifier {
        pool: SessionPool::new(sessions),
        signature,
    });

    Ok(if has_probabilities {
        Predictor::ClassifierWithConfidence(classifier)
    } else {
        Predictor::ClassifierOnly(classifier)
    })
}
