use async_trait::async_trait;
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

use crate::anomaly::features::FeatureVector;

/// Why a model call produced no usable score.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelFault {
    #[error("model call timed out after {0:?}")]
    Timeout(Duration),
    #[error("model endpoint unreachable: {0}")]
    Transport(String),
    #[error("model endpoint returned HTTP {0}")]
    Status(u16),
    #[error("model response malformed: {0}")]
    MalformedResponse(String),
}

impl ModelFault {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "timeout",
            Self::Transport(_) => "transport",
            Self::Status(_) => "http_status",
            Self::MalformedResponse(_) => "malformed_response",
        }
    }
}

/// A hosted classifier that scores one feature vector.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn predict(&self, features: &FeatureVector) -> Result<BigDecimal, ModelFault>;
}

/// Request body: `{"instances": [[amount, is_foreign, is_web]]}`.
#[derive(Debug, Serialize)]
struct PredictionRequest<'a> {
    instances: [&'a FeatureVector; 1],
}

/// Response body: `{"predictions": [score, ...]}`. Only the first score is used.
#[derive(Debug, Deserialize)]
struct PredictionResponse {
    predictions: Vec<serde_json::Number>,
}

/// JSON-over-HTTP model endpoint client.
pub struct HttpModelClient {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl HttpModelClient {
    pub fn new(endpoint: &str, timeout: Duration) -> eyre::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| eyre::eyre!("Failed to build model HTTP client: {}", e))?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            timeout,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn classify(&self, e: reqwest::Error) -> ModelFault {
        if e.is_timeout() {
            ModelFault::Timeout(self.timeout)
        } else if e.is_decode() {
            ModelFault::MalformedResponse(e.to_string())
        } else {
            ModelFault::Transport(e.to_string())
        }
    }
}

#[async_trait]
impl ModelClient for HttpModelClient {
    async fn predict(&self, features: &FeatureVector) -> Result<BigDecimal, ModelFault> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&PredictionRequest {
                instances: [features],
            })
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ModelFault::Status(status.as_u16()));
        }

        let body = response.bytes().await.map_err(|e| self.classify(e))?;
        parse_prediction(&body)
    }
}

/// Extract the first prediction from a response body, keeping its literal digits.
pub fn parse_prediction(body: &[u8]) -> Result<BigDecimal, ModelFault> {
    let parsed: PredictionResponse = serde_json::from_slice(body)
        .map_err(|e| ModelFault::MalformedResponse(e.to_string()))?;

    let first = parsed
        .predictions
        .first()
        .ok_or_else(|| ModelFault::MalformedResponse("empty predictions list".to_string()))?;
    let text = first.to_string();
    BigDecimal::from_str(&text)
        .map_err(|_| ModelFault::MalformedResponse(format!("prediction '{}' is not a decimal", text)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};

    async fn spawn_model(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}/invocations", addr)
    }

    #[test]
    fn test_request_shape() {
        let features = FeatureVector([50.0, 1.0, 1.0]);
        let body = serde_json::to_value(PredictionRequest {
            instances: [&features],
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({"instances": [[50.0, 1.0, 1.0]]}));
    }

    #[test]
    fn test_parse_prediction() {
        assert_eq!(parse_prediction(br#"{"predictions": [-1]}"#), Ok(BigDecimal::from(-1)));
        assert_eq!(
            parse_prediction(br#"{"predictions": [1.0, -1.0]}"#),
            Ok(BigDecimal::from(1))
        );
        assert!(matches!(
            parse_prediction(br#"{"predictions": []}"#),
            Err(ModelFault::MalformedResponse(_))
        ));
        assert!(matches!(
            parse_prediction(br#"{"scores": [1]}"#),
            Err(ModelFault::MalformedResponse(_))
        ));
        assert!(matches!(
            parse_prediction(b"<html>"),
            Err(ModelFault::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_parse_prediction_keeps_every_digit() {
        let score = parse_prediction(br#"{"predictions": [-0.123456789012345678901]}"#).unwrap();
        assert_eq!(score.to_string(), "-0.123456789012345678901");
    }

    #[tokio::test]
    async fn test_http_predict_sends_features() {
        let router = Router::new().route(
            "/invocations",
            post(|Json(body): Json<serde_json::Value>| async move {
                // Echo an outlier only for foreign web traffic.
                let is_foreign_web = body["instances"][0][1] == 1.0 && body["instances"][0][2] == 1.0;
                let score = if is_foreign_web { -1.0 } else { 1.0 };
                Json(serde_json::json!({ "predictions": [score] }))
            }),
        );
        let endpoint = spawn_model(router).await;
        let client = HttpModelClient::new(&endpoint, Duration::from_secs(2)).unwrap();

        assert_eq!(
            client.predict(&FeatureVector([50.0, 1.0, 1.0])).await,
            Ok(BigDecimal::from(-1))
        );
        assert_eq!(
            client.predict(&FeatureVector([50.0, 0.0, 1.0])).await,
            Ok(BigDecimal::from(1))
        );
    }

    #[tokio::test]
    async fn test_http_error_status() {
        let router = Router::new().route(
            "/invocations",
            post(|| async { (StatusCode::SERVICE_UNAVAILABLE, "overloaded") }),
        );
        let endpoint = spawn_model(router).await;
        let client = HttpModelClient::new(&endpoint, Duration::from_secs(2)).unwrap();

        assert_eq!(
            client.predict(&FeatureVector([1.0, 0.0, 0.0])).await,
            Err(ModelFault::Status(503))
        );
    }

    #[tokio::test]
    async fn test_http_timeout() {
        let router = Router::new().route(
            "/invocations",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(serde_json::json!({ "predictions": [1.0] }))
            }),
        );
        let endpoint = spawn_model(router).await;
        let client = HttpModelClient::new(&endpoint, Duration::from_millis(100)).unwrap();

        assert_eq!(
            client.predict(&FeatureVector([1.0, 0.0, 0.0])).await,
            Err(ModelFault::Timeout(Duration::from_millis(100)))
        );
    }

    #[tokio::test]
    async fn test_http_unreachable() {
        // Bind then drop to get a port nothing listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client =
            HttpModelClient::new(&format!("http://{}/invocations", addr), Duration::from_secs(1))
                .unwrap();
        let fault = client.predict(&FeatureVector([1.0, 0.0, 0.0])).await.unwrap_err();
        assert_eq!(fault.kind(), "transport");
    }
}
