use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use classifier_server::{
    router, AppState, Artifacts, Classifier, FeatureLayout, LabelDecoder, LoadedModel,
    PredictError, Predictor, ProbabilisticClassifier,
};
use common::CorsConfig;
use http_body_util::BodyExt;
use ndarray::{Array2, ArrayView2};
use serde_json::{json, Value};
use std::{
    path::PathBuf,
    sync::{Arc, Mutex},
};
use tower::ServiceExt;

/// Always predicts one class and remembers the rows it was given.
#[derive(Default)]
struct Recording {
    class_id: i64,
    seen: Mutex<Vec<Vec<f64>>>,
}

impl Classifier for Recording {
    fn predict(&self, rows: ArrayView2<'_, f64>) -> Result<Vec<i64>, PredictError> {
        let mut seen = self.seen.lock().unwrap();
        for row in rows.rows() {
            seen.push(row.to_vec());
        }
        Ok(vec![self.class_id; rows.nrows()])
    }
}

impl ProbabilisticClassifier for Recording {
    fn predict_proba(&self, rows: ArrayView2<'_, f64>) -> Result<Array2<f64>, PredictError> {
        let mut out = Array2::from_elem((rows.nrows(), 4), 0.125);
        out.column_mut(self.class_id as usize).fill(0.625);
        Ok(out)
    }
}

struct Broken;

impl Classifier for Broken {
    fn predict(&self, _rows: ArrayView2<'_, f64>) -> Result<Vec<i64>, PredictError> {
        Err(PredictError::MissingOutput("output_label".to_string()))
    }
}

fn feature_order() -> Vec<String> {
    ["Weight", "Height", "Gender", "Age", "FAVC", "CALC", "FCVC", "NCP"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn labels() -> LabelDecoder {
    LabelDecoder::from_name_to_id([
        ("Insufficient_Weight".to_string(), 0),
        ("Normal_Weight".to_string(), 1),
        ("Overweight_Level_I".to_string(), 2),
    ])
}

fn loaded(predictor: Predictor, labels: LabelDecoder) -> Artifacts {
    Artifacts::loaded(LoadedModel {
        model_path: PathBuf::from("obesity_model.onnx"),
        predictor,
        layout: FeatureLayout::from_names(feature_order()),
        labels,
        load_time_ms: 1.0,
    })
}

fn app(artifacts: Artifacts) -> Router {
    router(Arc::new(AppState::new(artifacts)), &CorsConfig::default())
}

fn sample_body() -> Value {
    json!({
        "weight": 70.0,
        "height": 1.75,
        "gender": "Male",
        "age": 25,
        "high_caloric_food": "Yes",
        "alcohol_intake": "Sometimes",
        "vegetable_intake": 2,
        "main_meals": 3
    })
}

fn post_predict(body: &Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/predict")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn health_reports_loaded_model() {
    let app = app(loaded(
        Predictor::ClassifierOnly(Arc::new(Recording::default())),
        labels(),
    ));
    let request = Request::builder().uri("/").body(Body::empty()).unwrap();

    let (status, body) = send(app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["model_loaded"], true);
    assert_eq!(body["message"], "Obesity Classification API is running");
}

#[tokio::test]
async fn predict_encodes_in_loaded_order_and_decodes_label() {
    let classifier = Arc::new(Recording {
        class_id: 2,
        ..Default::default()
    });
    let app = app(loaded(
        Predictor::ClassifierWithConfidence(classifier.clone()),
        labels(),
    ));

    let (status, body) = send(app, post_predict(&sample_body())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["prediction"], "Overweight_Level_I");
    assert_eq!(body["confidence"], 0.625);
    assert_eq!(body["input_data"], sample_body());

    let seen = classifier.seen.lock().unwrap();
    assert_eq!(seen.as_slice(), [vec![70.0, 1.75, 1.0, 25.0, 1.0, 1.0, 2.0, 3.0]]);
}

#[tokio::test]
async fn lowercase_female_encodes_gender_zero() {
    let classifier = Arc::new(Recording::default());
    let app = app(loaded(Predictor::ClassifierOnly(classifier.clone()), labels()));

    let mut body = sample_body();
    body["gender"] = json!("female");
    let (status, _) = send(app, post_predict(&body)).await;
    assert_eq!(status, StatusCode::OK);

    assert_eq!(classifier.seen.lock().unwrap()[0][2], 0.0);
}

#[tokio::test]
async fn classifier_only_returns_null_confidence() {
    let app = app(loaded(
        Predictor::ClassifierOnly(Arc::new(Recording::default())),
        labels(),
    ));

    let (status, body) = send(app, post_predict(&sample_body())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["prediction"], "Insufficient_Weight");
    assert!(body["confidence"].is_null());
}

#[tokio::test]
async fn unmapped_class_gets_synthetic_label() {
    let app = app(loaded(
        Predictor::ClassifierOnly(Arc::new(Recording {
            class_id: 3,
            ..Default::default()
        })),
        LabelDecoder::absent(),
    ));

    let (_, body) = send(app, post_predict(&sample_body())).await;
    assert_eq!(body["prediction"], "Class 3");
}

#[tokio::test]
async fn unloaded_model_fails_health_and_predict() {
    let (status, body) = send(
        app(Artifacts::unavailable()),
        Request::builder().uri("/").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["model_loaded"], false);

    for request_body in [sample_body(), json!({}), json!({"weight": "heavy"})] {
        let (status, body) = send(app(Artifacts::unavailable()), post_predict(&request_body)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["detail"], "Model not loaded");
    }
}

#[tokio::test]
async fn bare_array_artifact_is_invalid() {
    let app = app(loaded(
        Predictor::NotAClassifier {
            reason: "first output is a float tensor".to_string(),
        },
        labels(),
    ));

    let (status, body) = send(app, post_predict(&sample_body())).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let detail = body["detail"].as_str().unwrap();
    assert!(detail.starts_with("Model file appears to be invalid"), "{detail}");
    assert!(detail.contains("obesity_model.onnx"), "{detail}");
}

#[tokio::test]
async fn runtime_failure_is_reported_as_prediction_error() {
    let app = app(loaded(Predictor::ClassifierOnly(Arc::new(Broken)), labels()));

    let (status, body) = send(app, post_predict(&sample_body())).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let detail = body["detail"].as_str().unwrap();
    assert!(detail.starts_with("Prediction error:"), "{detail}");
    assert!(detail.contains("output_label"), "{detail}");
}

#[tokio::test]
async fn missing_field_is_unprocessable() {
    let app = app(loaded(
        Predictor::ClassifierOnly(Arc::new(Recording::default())),
        labels(),
    ));

    let mut body = sample_body();
    body.as_object_mut().unwrap().remove("main_meals");
    let (status, body) = send(app, post_predict(&body)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["detail"].as_str().unwrap().contains("main_meals"));
}

#[tokio::test]
async fn info_describes_loaded_model() {
    let state = Arc::new(AppState::new(loaded(
        Predictor::ClassifierWithConfidence(Arc::new(Recording::default())),
        labels(),
    )));
    let app = router(state, &CorsConfig::default());

    let (status, _) = send(app.clone(), post_predict(&sample_body())).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(app, Request::builder().uri("/info").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["predictor"], "classifier_with_confidence");
    assert_eq!(body["feature_order"], json!(feature_order()));
    assert_eq!(body["classes"][1], "Normal_Weight");
    assert_eq!(body["total_requests"], 1);
}

async fn preflight(origin: &str) -> axum::http::Response<Body> {
    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/predict")
        .header(header::ORIGIN, origin)
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type")
        .body(Body::empty())
        .unwrap();
    app(Artifacts::unavailable()).oneshot(request).await.unwrap()
}

#[tokio::test]
async fn cors_allows_configured_origins_with_credentials() {
    for origin in ["http://localhost:3000", "https://obesity-ui.vercel.app"] {
        let response = preflight(origin).await;
        let headers = response.headers();
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], origin);
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_METHODS], "POST");
    }
}

#[tokio::test]
async fn cors_rejects_other_origins() {
    let response = preflight("https://evil.example").await;
    assert!(response
        .headers()
        .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
        .is_none());
}
