use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use std::sync::Arc;

use crate::anomaly::types::{AnomalyRecord, ReasonCode};
use crate::db::repository::AnomalyQuery;
use crate::ingest::types::TriggerEvent;
use crate::pipeline::EventReport;

use super::types::*;
use super::AppState;

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;

fn api_error(status: StatusCode, msg: impl Into<String>) -> (StatusCode, Json<ErrorResponse>) {
    (
        status,
        Json(ErrorResponse {
            error: msg.into(),
        }),
    )
}

// ============================================================
// Health
// ============================================================

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let store_reachable = match state.pipeline.store().ping().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "Anomaly store health check failed");
            false
        }
    };

    Json(HealthResponse {
        status: if store_reachable { "ok" } else { "degraded" }.to_string(),
        store_reachable,
        model_scoring: state.pipeline.model_enabled(),
        checked_at: Utc::now(),
    })
}

// ============================================================
// Trigger events
// ============================================================

/// Run the pipeline for an object-created event. Always acknowledges once the event
/// parses; per-batch outcomes are in the report.
pub async fn ingest_event(
    State(state): State<Arc<AppState>>,
    Json(event): Json<TriggerEvent>,
) -> Json<EventReport> {
    Json(state.pipeline.handle_event(&event).await)
}

// ============================================================
// Anomalies
// ============================================================

pub async fn list_anomalies(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AnomalyParams>,
) -> ApiResult<AnomaliesResponse> {
    let reason = params
        .reason
        .as_deref()
        .map(str::parse::<ReasonCode>)
        .transpose()
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string()))?;

    let limit = params.limit.unwrap_or(50).clamp(1, 1000);
    let offset = params.offset.unwrap_or(0).max(0);
    let query = AnomalyQuery {
        reason,
        user_id: params.user_id,
        limit,
        offset,
    };

    let page = state
        .pipeline
        .store()
        .list_anomalies(&query)
        .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Json(AnomaliesResponse {
        anomalies: page.anomalies,
        total: page.total,
        limit,
        offset,
    }))
}

pub async fn anomaly_by_id(
    State(state): State<Arc<AppState>>,
    Path(transaction_id): Path<String>,
) -> ApiResult<AnomalyRecord> {
    state
        .pipeline
        .store()
        .get_anomaly(&transaction_id)
        .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .map(Json)
        .ok_or_else(|| {
            api_error(
                StatusCode::NOT_FOUND,
                format!("No anomaly for transaction '{}'", transaction_id),
            )
        })
}
