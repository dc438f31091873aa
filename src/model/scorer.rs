use bigdecimal::BigDecimal;
use std::sync::Arc;
use std::time::Duration;

use crate::anomaly::features::FeatureVector;
use crate::anomaly::types::ANOMALY_SENTINEL;
use crate::config::ModelConfig;

use super::client::{HttpModelClient, ModelClient, ModelFault};

/// What the model said about one transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelScore {
    /// No endpoint configured. Decisions fall back to the rule alone.
    Unscored,
    /// Score returned by the endpoint, with the digits it was sent with.
    Scored(BigDecimal),
    /// The call failed. Treated as an anomaly signal.
    Failsafe(ModelFault),
}

impl ModelScore {
    /// Score to persist. Fail-safe faults persist as the anomaly sentinel.
    pub fn persisted_score(&self) -> Option<BigDecimal> {
        match self {
            Self::Unscored => None,
            Self::Scored(score) => Some(score.clone()),
            Self::Failsafe(_) => Some(BigDecimal::from(ANOMALY_SENTINEL)),
        }
    }
}

/// Bounded-latency wrapper around an optional model client.
pub struct ModelScorer {
    client: Option<Arc<dyn ModelClient>>,
    timeout: Duration,
}

impl ModelScorer {
    pub fn new(client: Arc<dyn ModelClient>, timeout: Duration) -> Self {
        Self {
            client: Some(client),
            timeout,
        }
    }

    pub fn disabled() -> Self {
        Self {
            client: None,
            timeout: Duration::ZERO,
        }
    }

    /// Build an HTTP-backed scorer, or a disabled one when no endpoint is configured.
    pub fn from_config(config: &ModelConfig) -> eyre::Result<Self> {
        match &config.endpoint {
            Some(endpoint) => {
                let timeout = Duration::from_millis(config.timeout_ms);
                let client = HttpModelClient::new(endpoint, timeout)?;
                tracing::info!(endpoint = %client.endpoint(), timeout_ms = config.timeout_ms, "Model scoring enabled");
                Ok(Self::new(Arc::new(client), timeout))
            }
            None => {
                tracing::info!("No model endpoint configured, decisions are rule-only");
                Ok(Self::disabled())
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.client.is_some()
    }

    /// Score one feature vector. Never fails: faults become [`ModelScore::Failsafe`].
    pub async fn score(&self, transaction_id: &str, features: &FeatureVector) -> ModelScore {
        let Some(client) = &self.client else {
            return ModelScore::Unscored;
        };

        let outcome = match tokio::time::timeout(self.timeout, client.predict(features)).await {
            Ok(result) => result,
            Err(_) => Err(ModelFault::Timeout(self.timeout)),
        };

        match outcome {
            Ok(score) => {
                tracing::debug!(transaction_id, score = %score, "Model scored transaction");
                ModelScore::Scored(score)
            }
            Err(fault) => {
                tracing::warn!(
                    transaction_id,
                    fault_kind = fault.kind(),
                    error = %fault,
                    "Model call failed, failing safe to anomalous"
                );
                ModelScore::Failsafe(fault)
            }
        }
    }
}
