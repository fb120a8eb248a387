pub mod artifacts;
pub mod cors;
pub mod encoding;
pub mod labels;
pub mod onnx;
pub mod predictor;
pub mod routes;

pub use artifacts::{Artifacts, LoadedModel};
pub use encoding::{encode, Feature, FeatureLayout};
pub use labels::LabelDecoder;
pub use predictor::{Classifier, PredictError, Predictor, ProbabilisticClassifier};
pub use routes::{router, AppState};
