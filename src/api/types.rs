use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::anomaly::types::AnomalyRecord;

// ============================================================
// Query parameters
// ============================================================

#[derive(Debug, Deserialize)]
pub struct AnomalyParams {
    pub reason: Option<String>,
    pub user_id: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

// ============================================================
// Response types
// ============================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub store_reachable: bool,
    pub model_scoring: bool,
    pub checked_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AnomaliesResponse {
    pub anomalies: Vec<AnomalyRecord>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
