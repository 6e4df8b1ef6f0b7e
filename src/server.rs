//! HTTP surface: health check and the two prediction endpoints

use crate::config::ServerConfig;
use crate::feature_mapper::ValidationError;
use crate::gateway::{Gateway, TaskError, TaskKind};
use crate::metrics::GatewayMetrics;
use crate::types::{ErrorResponse, HealthResponse, PredictionResponse};
use actix_web::middleware::Logger;
use actix_web::{web, App, HttpResponse, HttpServer};
use serde_json::Value;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Register the gateway routes
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(health_check))
        .route("/predict_clas", web::post().to(predict_clas))
        .route("/predict_reg", web::post().to(predict_reg));
}

/// Run the HTTP server until shutdown
pub async fn serve(
    config: &ServerConfig,
    gateway: web::Data<Gateway>,
    metrics: web::Data<GatewayMetrics>,
) -> std::io::Result<()> {
    let bind_address = config.bind_address();
    let max_payload = config.max_payload_bytes;

    info!(address = %bind_address, workers = config.workers, "Starting HTTP server");
    info!("   GET  /              - health check");
    info!("   POST /predict_clas  - loan approval classifier");
    info!("   POST /predict_reg   - loan amount regressor");

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(gateway.clone())
            .app_data(metrics.clone())
            .app_data(web::PayloadConfig::new(max_payload))
            .configure(routes)
            .default_service(web::route().to(not_found))
    })
    .workers(config.workers)
    .bind(&bind_address)?
    .run()
    .await
}

async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse::running())
}

pub async fn not_found() -> HttpResponse {
    HttpResponse::NotFound().json(ErrorResponse::new("Endpoint not found"))
}

async fn predict_clas(
    gateway: web::Data<Gateway>,
    metrics: web::Data<GatewayMetrics>,
    body: web::Bytes,
) -> HttpResponse {
    predict(TaskKind::Classifier, gateway, metrics, body).await
}

async fn predict_reg(
    gateway: web::Data<Gateway>,
    metrics: web::Data<GatewayMetrics>,
    body: web::Bytes,
) -> HttpResponse {
    predict(TaskKind::Regressor, gateway, metrics, body).await
}

async fn predict(
    kind: TaskKind,
    gateway: web::Data<Gateway>,
    metrics: web::Data<GatewayMetrics>,
    body: web::Bytes,
) -> HttpResponse {
    let start_time = Instant::now();
    let endpoint = kind.endpoint();

    let payload: Value = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(endpoint = endpoint, error = %e, "Request body is not valid JSON");
            metrics.record_rejection(endpoint, "invalid_json");
            return HttpResponse::BadRequest()
                .json(ErrorResponse::new(ValidationError::InvalidFormat.to_string()));
        }
    };

    // Models run synchronously; keep them off the async workers.
    let result = web::block(move || gateway.task(kind).predict(&payload)).await;

    match result {
        Ok(Ok(prediction)) => {
            let elapsed = start_time.elapsed();
            metrics.record_prediction(endpoint, elapsed, prediction.len());
            debug!(
                endpoint = endpoint,
                rows = prediction.len(),
                latency_us = elapsed.as_micros() as u64,
                "Prediction served"
            );
            HttpResponse::Ok().json(PredictionResponse::new(prediction))
        }
        Ok(Err(TaskError::Validation(e))) => {
            let reason = match e {
                ValidationError::InvalidFormat => "invalid_format",
                ValidationError::MissingFeature(_) => "missing_feature",
            };
            warn!(endpoint = endpoint, error = %e, "Rejected prediction request");
            metrics.record_rejection(endpoint, reason);
            HttpResponse::BadRequest().json(ErrorResponse::new(e.to_string()))
        }
        Ok(Err(TaskError::Predict(e))) if e.is_client_error() => {
            warn!(endpoint = endpoint, error = %e, "Model rejected input values");
            metrics.record_rejection(endpoint, "invalid_value");
            HttpResponse::BadRequest().json(ErrorResponse::new(e.to_string()))
        }
        Ok(Err(TaskError::Predict(e))) => {
            error!(endpoint = endpoint, error = %e, "Model inference failed");
            metrics.record_rejection(endpoint, "inference_error");
            HttpResponse::InternalServerError().json(ErrorResponse::new(e.to_string()))
        }
        Err(e) => {
            error!(endpoint = endpoint, error = %e, "Blocking prediction task failed");
            metrics.record_rejection(endpoint, "execution_error");
            HttpResponse::InternalServerError().json(ErrorResponse::new("Execution error"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature_mapper::FeatureMatrix;
    use crate::models::inference::matrix_to_f32;
    use crate::models::{PredictError, Predictor};
    use actix_web::http::StatusCode;
    use actix_web::test;
    use serde_json::json;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    /// Approves when cibil_score (column 6) is at least 700
    struct ThresholdClassifier;

    impl Predictor for ThresholdClassifier {
        fn predict(&self, matrix: &FeatureMatrix) -> Result<Vec<Value>, PredictError> {
            let data = matrix_to_f32(matrix)?;
            Ok(data
                .chunks(matrix.n_cols())
                .map(|row| json!(if row[6] >= 700.0 { 1 } else { 0 }))
                .collect())
        }
    }

    /// Returns half the requested loan amount (column 4)
    struct HalfAmountRegressor;

    impl Predictor for HalfAmountRegressor {
        fn predict(&self, matrix: &FeatureMatrix) -> Result<Vec<Value>, PredictError> {
            let data = matrix_to_f32(matrix)?;
            Ok(data
                .chunks(matrix.n_cols())
                .map(|row| json!(row[4] as f64 / 2.0))
                .collect())
        }
    }

    struct BrokenModel;

    impl Predictor for BrokenModel {
        fn predict(&self, _matrix: &FeatureMatrix) -> Result<Vec<Value>, PredictError> {
            Err(PredictError::Runtime("session crashed".to_string()))
        }
    }

    fn classifier_body() -> Value {
        json!({
            "no_of_dependents": 2,
            "education": 1,
            "self_employed": 0,
            "income_annum": 500000,
            "loan_amount": 2000000,
            "loan_term": 12,
            "cibil_score": 750,
            "residential_assets_value": 100000,
            "commercial_assets_value": 50000
        })
    }

    fn regressor_record(loan_amount: u64) -> Value {
        json!({
            "no_of_dependents": 0,
            "education": 0,
            "self_employed": 1,
            "income_annum": 900000,
            "loan_amount": loan_amount,
            "loan_term": 8,
            "residential_assets_value": 300000,
            "commercial_assets_value": 0,
            "loan_status": 1
        })
    }

    macro_rules! gateway_app {
        ($gateway:expr, $metrics:expr) => {
            test::init_service(
                App::new()
                    .app_data($gateway.clone())
                    .app_data($metrics.clone())
                    .configure(routes)
                    .default_service(web::route().to(not_found)),
            )
            .await
        };
    }

    fn stub_gateway() -> web::Data<Gateway> {
        web::Data::new(Gateway::new(
            Arc::new(ThresholdClassifier),
            Arc::new(HalfAmountRegressor),
        ))
    }

    #[actix_web::test]
    async fn test_health_check() {
        let gateway = web::Data::new(Gateway::new(Arc::new(BrokenModel), Arc::new(BrokenModel)));
        let metrics = web::Data::new(GatewayMetrics::new());
        let app = gateway_app!(gateway, metrics);

        let resp = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body, json!({"message": "Server is running"}));
    }

    #[actix_web::test]
    async fn test_predict_clas_single_record() {
        let metrics = web::Data::new(GatewayMetrics::new());
        let app = gateway_app!(stub_gateway(), metrics);

        let req = test::TestRequest::post()
            .uri("/predict_clas")
            .set_json(classifier_body())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body, json!({"prediction": [1]}));
        assert_eq!(metrics.predictions_served.load(Ordering::Relaxed), 1);
    }

    #[actix_web::test]
    async fn test_predict_reg_batch_preserves_order() {
        let metrics = web::Data::new(GatewayMetrics::new());
        let app = gateway_app!(stub_gateway(), metrics);

        let batch = json!([regressor_record(400), regressor_record(100)]);
        let req = test::TestRequest::post()
            .uri("/predict_reg")
            .set_json(batch)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body, json!({"prediction": [200.0, 50.0]}));
        assert_eq!(metrics.rows_predicted.load(Ordering::Relaxed), 2);
    }

    #[actix_web::test]
    async fn test_missing_feature_is_bad_request() {
        let metrics = web::Data::new(GatewayMetrics::new());
        let app = gateway_app!(stub_gateway(), metrics);

        let req = test::TestRequest::post()
            .uri("/predict_clas")
            .set_json(json!({"no_of_dependents": 1}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: ErrorResponse = test::read_body_json(resp).await;
        assert!(body.error.starts_with("Missing feature(s):"));
        assert!(body.error.contains("education"));
        assert_eq!(metrics.requests_rejected.load(Ordering::Relaxed), 1);
    }

    #[actix_web::test]
    async fn test_classifier_payload_on_regressor_endpoint() {
        let metrics = web::Data::new(GatewayMetrics::new());
        let app = gateway_app!(stub_gateway(), metrics);

        let req = test::TestRequest::post()
            .uri("/predict_reg")
            .set_json(classifier_body())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: ErrorResponse = test::read_body_json(resp).await;
        assert_eq!(body.error, "Missing feature(s): loan_status");
    }

    #[actix_web::test]
    async fn test_invalid_bodies_are_bad_request() {
        let metrics = web::Data::new(GatewayMetrics::new());
        let app = gateway_app!(stub_gateway(), metrics);

        for body in ["not json", "\"hello\"", "42", "[1,2,3]", ""] {
            let req = test::TestRequest::post()
                .uri("/predict_clas")
                .insert_header(("content-type", "application/json"))
                .set_payload(body)
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "body {body:?}");
            let parsed: ErrorResponse = test::read_body_json(resp).await;
            assert_eq!(parsed.error, "Invalid input format");
        }
    }

    #[actix_web::test]
    async fn test_extra_fields_are_accepted() {
        let metrics = web::Data::new(GatewayMetrics::new());
        let app = gateway_app!(stub_gateway(), metrics);

        let mut body = classifier_body();
        body["foo"] = json!(1);
        body["cibil_score"] = json!(300);
        let req = test::TestRequest::post()
            .uri("/predict_clas")
            .set_json(body)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body, json!({"prediction": [0]}));
    }

    #[actix_web::test]
    async fn test_empty_batch() {
        let metrics = web::Data::new(GatewayMetrics::new());
        let app = gateway_app!(stub_gateway(), metrics);

        let req = test::TestRequest::post()
            .uri("/predict_reg")
            .set_json(json!([]))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body, json!({"prediction": []}));
    }

    #[actix_web::test]
    async fn test_non_numeric_value_rejected_by_model() {
        let metrics = web::Data::new(GatewayMetrics::new());
        let app = gateway_app!(stub_gateway(), metrics);

        let mut body = classifier_body();
        body["education"] = json!("Graduate");
        let req = test::TestRequest::post()
            .uri("/predict_clas")
            .set_json(body)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: ErrorResponse = test::read_body_json(resp).await;
        assert!(body.error.contains("education"));
    }

    #[actix_web::test]
    async fn test_inference_failure_is_server_error() {
        let gateway = web::Data::new(Gateway::new(Arc::new(BrokenModel), Arc::new(BrokenModel)));
        let metrics = web::Data::new(GatewayMetrics::new());
        let app = gateway_app!(gateway, metrics);

        let req = test::TestRequest::post()
            .uri("/predict_clas")
            .set_json(classifier_body())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: ErrorResponse = test::read_body_json(resp).await;
        assert!(body.error.contains("session crashed"));
    }

    #[actix_web::test]
    async fn test_unknown_route() {
        let metrics = web::Data::new(GatewayMetrics::new());
        let app = gateway_app!(stub_gateway(), metrics);

        let resp =
            test::call_service(&app, test::TestRequest::get().uri("/predict").to_request()).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
