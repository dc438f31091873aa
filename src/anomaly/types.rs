use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::ingest::types::Transaction;

/// Model output meaning "outlier". The deployed classifier is a one-class isolation
/// model whose predictions are `-1` (outlier) or `1` (inlier); other model families
/// need their own mapping.
pub const ANOMALY_SENTINEL: i64 = -1;

/// Model output meaning "inlier".
pub const NORMAL_SENTINEL: i64 = 1;

/// Why a transaction was flagged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReasonCode {
    #[serde(rename = "amount_gt_threshold")]
    AmountGtThreshold,
    #[serde(rename = "model_flagged")]
    ModelFlagged,
    #[serde(rename = "model_unavailable_failsafe")]
    ModelUnavailableFailsafe,
    #[serde(rename = "amount_gt_threshold+model_flagged")]
    AmountAndModelFlagged,
    #[serde(rename = "amount_gt_threshold+model_unavailable_failsafe")]
    AmountAndModelUnavailable,
}

impl ReasonCode {
    pub const ALL: [ReasonCode; 5] = [
        Self::AmountGtThreshold,
        Self::ModelFlagged,
        Self::ModelUnavailableFailsafe,
        Self::AmountAndModelFlagged,
        Self::AmountAndModelUnavailable,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AmountGtThreshold => "amount_gt_threshold",
            Self::ModelFlagged => "model_flagged",
            Self::ModelUnavailableFailsafe => "model_unavailable_failsafe",
            Self::AmountAndModelFlagged => "amount_gt_threshold+model_flagged",
            Self::AmountAndModelUnavailable => "amount_gt_threshold+model_unavailable_failsafe",
        }
    }
}

impl FromStr for ReasonCode {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| eyre::eyre!("Unknown reason code '{}'", s))
    }
}

/// Outcome of combining the rule and model signals for one transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Clear,
    Flag(ReasonCode),
}

impl Decision {
    pub fn reason(&self) -> Option<ReasonCode> {
        match self {
            Self::Clear => None,
            Self::Flag(reason) => Some(*reason),
        }
    }
}

/// A flagged transaction, keyed by `transaction_id` in the anomaly store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyRecord {
    pub transaction_id: String,
    pub user_id: String,
    pub amount: BigDecimal,
    pub currency: String,
    pub merchant_category: String,
    pub country: String,
    pub device_type: String,
    pub timestamp: String,
    /// `None` when no model was consulted.
    pub anomaly_score: Option<BigDecimal>,
    pub reason: ReasonCode,
    /// Object key of the batch that produced this record.
    pub source_key: String,
}

impl AnomalyRecord {
    pub fn from_transaction(
        tx: &Transaction,
        anomaly_score: Option<BigDecimal>,
        reason: ReasonCode,
        source_key: &str,
    ) -> Self {
        Self {
            transaction_id: tx.transaction_id.clone(),
            user_id: tx.user_id.clone().unwrap_or_default(),
            amount: tx.amount.clone(),
            currency: tx.currency.clone().unwrap_or_default(),
            merchant_category: tx.merchant_category.clone().unwrap_or_default(),
            country: tx.country.clone().unwrap_or_default(),
            device_type: tx.device_type.clone().unwrap_or_default(),
            timestamp: tx.timestamp.clone().unwrap_or_default(),
            anomaly_score,
            reason,
            source_key: source_key.to_string(),
        }
    }
}
