use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error};

use crate::errors::AppError;

const GENERATE_PATH: &str = "/generate";
const TRAIN_PATH: &str = "/train_lut";

/// Residual weight(s) sent to / echoed by the model server: either one value
/// for every block or one per block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Residuals {
    Scalar(f64),
    PerBlock(Vec<f64>),
}

/// Body of `POST {base_url}/generate`.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationRequest {
    pub prompt: String,
    pub length: u32,
    pub lut_name: String,
    pub model: String,
    pub threshold: f64,
    pub residuals: Residuals,
    pub wnn_blocks: Vec<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_scale: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerationResponse {
    pub completion: String,
    #[serde(default)]
    pub residual: Option<Residuals>,
    #[serde(default)]
    pub threshold: Option<f64>,
}

/// Body of `POST {base_url}/train_lut`. `label_context` is sent as `null`
/// when absent; the tuning knobs are omitted.
#[derive(Debug, Clone, Serialize)]
pub struct TrainingRequest {
    pub label: String,
    pub label_context: Option<String>,
    pub lut_name: String,
    pub model: String,
    pub wnn_blocks: Vec<i32>,
    pub sparsity: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub residuals: Option<Residuals>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_scale: Option<f64>,
}

/// Thin JSON client for the LUT model server. One best-effort request per
/// call: no retries and no timeout.
#[derive(Clone)]
pub struct LutClient {
    http: Client,
    base_url: String,
    model: String,
}

impl LutClient {
    pub fn new(base_url: &str, model: &str) -> Result<Self, AppError> {
        let http = Client::builder()
            .pool_max_idle_per_host(8)
            .build()
            .map_err(|e| AppError::Unexpected(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, AppError> {
        let body = self.post(GENERATE_PATH, "Generate", request).await?;
        serde_json::from_value(body).map_err(|e| AppError::MalformedResponse {
            operation: GENERATE_PATH.to_string(),
            message: e.to_string(),
        })
    }

    /// The training reply is implementation-defined; only success is checked.
    pub async fn train(&self, request: &TrainingRequest) -> Result<Value, AppError> {
        self.post(TRAIN_PATH, "Train LUT", request).await
    }

    async fn post<T: Serialize>(
        &self,
        path: &str,
        operation: &str,
        payload: &T,
    ) -> Result<Value, AppError> {
        let url = format!("{}{path}", self.base_url);
        debug!("POST {url}");

        let response = self.http.post(&url).json(payload).send().await.map_err(|e| {
            error!("{operation} request to {url} failed: {e}");
            if e.is_connect() {
                AppError::InferenceUnavailable { host: self.base_url.clone() }
            } else {
                AppError::InferenceTransport {
                    operation: operation.to_string(),
                    message: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        let bytes = response.bytes().await.map_err(|e| AppError::InferenceTransport {
            operation: operation.to_string(),
            message: e.to_string(),
        })?;
        let body = parse_body(&bytes);

        if !status.is_success() {
            let message = server_message(&body)
                .unwrap_or_else(|| format!("{operation} failed with {}", status.as_u16()));
            error!("{operation} returned {status}: {message}");
            return Err(AppError::InferenceFailed { status: status.as_u16(), message });
        }

        Ok(body)
    }
}

/// Unparseable bodies count as `{}`.
fn parse_body(bytes: &[u8]) -> Value {
    serde_json::from_slice(bytes).unwrap_or_else(|_| Value::Object(Default::default()))
}

fn server_message(body: &Value) -> Option<String> {
    ["error", "detail"]
        .iter()
        .filter_map(|key| body.get(*key))
        .find_map(|value| match value {
            Value::Null | Value::Bool(false) => None,
            Value::String(s) if s.is_empty() => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        })
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::json;

    use super::*;
    use crate::test_support::serve;

    fn generation_request() -> GenerationRequest {
        GenerationRequest {
            prompt: "[INST]User: hi\nAssistant:[/INST]".into(),
            length: 128,
            lut_name: "demo-00000000".into(),
            model: "mistral".into(),
            threshold: 0.25,
            residuals: Residuals::PerBlock(vec![0.75, 0.25]),
            wnn_blocks: vec![-1, -4],
            cost_scale: None,
        }
    }

    fn training_request() -> TrainingRequest {
        TrainingRequest {
            label: "[INST]A[/INST]".into(),
            label_context: None,
            lut_name: "demo-00000000".into(),
            model: "mistral".into(),
            wnn_blocks: vec![-1],
            sparsity: 1.0,
            threshold: None,
            residuals: None,
            cost_scale: None,
        }
    }

    #[test]
    fn generation_request_wire_shape() {
        let value = serde_json::to_value(generation_request()).unwrap();
        assert_eq!(value["residuals"], json!([0.75, 0.25]));
        assert_eq!(value["wnn_blocks"], json!([-1, -4]));
        assert!(value.get("cost_scale").is_none());
    }

    #[test]
    fn training_request_sends_null_context_and_omits_knobs() {
        let value = serde_json::to_value(training_request()).unwrap();
        assert_eq!(value["label_context"], Value::Null);
        assert!(value.get("threshold").is_none());
        assert!(value.get("residuals").is_none());
    }

    #[test]
    fn residual_accepts_scalar_or_list() {
        let scalar: GenerationResponse =
            serde_json::from_value(json!({ "completion": "x", "residual": 0.5 })).unwrap();
        assert_eq!(scalar.residual, Some(Residuals::Scalar(0.5)));
        let list: GenerationResponse =
            serde_json::from_value(json!({ "completion": "x", "residual": [0.1, 0.2] })).unwrap();
        assert_eq!(list.residual, Some(Residuals::PerBlock(vec![0.1, 0.2])));
    }

    #[test]
    fn server_message_precedence() {
        assert_eq!(
            server_message(&json!({ "error": "boom", "detail": "ignored" })).as_deref(),
            Some("boom")
        );
        assert_eq!(server_message(&json!({ "error": "", "detail": "d" })).as_deref(), Some("d"));
        assert_eq!(server_message(&json!({})), None);
    }

    #[tokio::test]
    async fn generate_round_trip() {
        let app = Router::new().route(
            "/generate",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["lut_name"], "demo-00000000");
                Json(json!({ "completion": "Assistant: hello", "threshold": 0.3 }))
            }),
        );
        let base = serve(app).await;
        let client = LutClient::new(&base, "mistral").unwrap();

        let resp = client.generate(&generation_request()).await.unwrap();
        assert_eq!(resp.completion, "Assistant: hello");
        assert_eq!(resp.threshold, Some(0.3));
        assert!(resp.residual.is_none());
    }

    #[tokio::test]
    async fn error_field_is_surfaced() {
        let app = Router::new().route(
            "/generate",
            post(|| async {
                (StatusCode::UNPROCESSABLE_ENTITY, Json(json!({ "detail": "bad lut" })))
            }),
        );
        let client = LutClient::new(&serve(app).await, "mistral").unwrap();

        let err = client.generate(&generation_request()).await.unwrap_err();
        assert_eq!(err.to_string(), "bad lut");
    }

    #[tokio::test]
    async fn non_json_error_body_gets_generic_message() {
        let app = Router::new().route(
            "/train_lut",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "<html>oops</html>") }),
        );
        let client = LutClient::new(&serve(app).await, "mistral").unwrap();

        let err = client.train(&training_request()).await.unwrap_err();
        assert_eq!(err.to_string(), "Train LUT failed with 500");
    }

    #[tokio::test]
    async fn non_json_success_body_reports_missing_completion() {
        let app = Router::new().route("/generate", post(|| async { "not json" }));
        let client = LutClient::new(&serve(app).await, "mistral").unwrap();

        let err = client.generate(&generation_request()).await.unwrap_err();
        assert!(matches!(err, AppError::MalformedResponse { .. }));
        assert!(err.to_string().contains("completion"));
    }

    #[tokio::test]
    async fn training_success_ignores_body_shape() {
        let app = Router::new().route("/train_lut", post(|| async { "ok" }));
        let client = LutClient::new(&serve(app).await, "mistral").unwrap();

        let body = client.train(&training_request()).await.unwrap();
        assert_eq!(body, json!({}));
    }

    #[tokio::test]
    async fn refused_connection_is_unavailable() {
        let client = LutClient::new("http://127.0.0.1:1", "mistral").unwrap();
        let err = client.generate(&generation_request()).await.unwrap_err();
        assert!(err.is_inference_unavailable());
    }
}
