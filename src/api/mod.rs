pub mod handlers;
pub mod types;

use axum::{
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::pipeline::BatchPipeline;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<BatchPipeline>,
}

pub fn router(pipeline: Arc<BatchPipeline>) -> Router {
    let state = Arc::new(AppState { pipeline });

    Router::new()
        .route("/api/v1/health", get(handlers::health))
        .route("/api/v1/events", post(handlers::ingest_event))
        .route("/api/v1/anomalies", get(handlers::list_anomalies))
        .route(
            "/api/v1/anomalies/{transaction_id}",
            get(handlers::anomaly_by_id),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

pub async fn serve<F>(
    pipeline: Arc<BatchPipeline>,
    host: &str,
    port: u16,
    shutdown: F,
) -> eyre::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = router(pipeline);
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "API server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anomaly::engine::AnomalyEngine;
    use crate::config::Config;
    use crate::db::memory::MemoryAnomalyStore;
    use crate::ingest::object_store::MemoryObjectStore;
    use crate::model::scorer::ModelScorer;
    use crate::ingest::types::TriggerEvent;
    use super::types::{AnomaliesResponse, HealthResponse};

    const SOURCE: &str = "raw-transactions";

    async fn spawn_api() -> (String, Arc<MemoryObjectStore>) {
        let mut config = Config::default();
        config.source.container = SOURCE.to_string();

        let objects = Arc::new(MemoryObjectStore::new());
        let engine = AnomalyEngine::new(&config.rules, ModelScorer::disabled());
        let pipeline = Arc::new(BatchPipeline::new(
            &config,
            objects.clone(),
            engine,
            Arc::new(MemoryAnomalyStore::new()),
        ));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(pipeline)).await.unwrap();
        });
        (format!("http://{}", addr), objects)
    }

    #[tokio::test]
    async fn test_event_then_query() {
        let (base, objects) = spawn_api().await;
        objects
            .put(
                SOURCE,
                "raw/batch_000001.json",
                r#"[{"transaction_id":"t1","amount":15000,"user_id":"u1"},
                    {"transaction_id":"t2","amount":12.5,"user_id":"u2"}]"#,
            )
            .await;
        let client = reqwest::Client::new();

        let event = serde_json::json!({
            "Records": [{"s3": {"bucket": {"name": SOURCE}, "object": {"key": "raw/batch_000001.json"}}}]
        });
        let response = client
            .post(format!("{}/api/v1/events", base))
            .json(&event)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        let report: serde_json::Value = response.json().await.unwrap();
        assert_eq!(report["batches"][0]["status"], "processed");
        assert_eq!(report["batches"][0]["anomalies_written"], 1);

        let page: AnomaliesResponse = client
            .get(format!("{}/api/v1/anomalies?reason=amount_gt_threshold", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.limit, 50);
        assert_eq!(page.anomalies[0].transaction_id, "t1");

        let one = client
            .get(format!("{}/api/v1/anomalies/t1", base))
            .send()
            .await
            .unwrap();
        assert_eq!(one.status(), reqwest::StatusCode::OK);

        let missing = client
            .get(format!("{}/api/v1/anomalies/t2", base))
            .send()
            .await
            .unwrap();
        assert_eq!(missing.status(), reqwest::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unknown_reason_is_bad_request() {
        let (base, _) = spawn_api().await;
        let response = reqwest::get(format!("{}/api/v1/anomalies?reason=bogus", base))
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_malformed_event_is_rejected() {
        let (base, _) = spawn_api().await;
        let response = reqwest::Client::new()
            .post(format!("{}/api/v1/events", base))
            .header("content-type", "application/json")
            .body("{not json")
            .send()
            .await
            .unwrap();
        assert!(response.status().is_client_error());
    }

    #[tokio::test]
    async fn test_wrong_source_event_acknowledged() {
        let (base, _) = spawn_api().await;
        let response = reqwest::Client::new()
            .post(format!("{}/api/v1/events", base))
            .json(&TriggerEvent::single("elsewhere", "b.json"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        let report: serde_json::Value = response.json().await.unwrap();
        assert_eq!(report["batches"][0]["status"], "skipped");
        assert_eq!(report["batches"][0]["fault"]["fault"], "source_mismatch");
    }

    #[tokio::test]
    async fn test_health() {
        let (base, _) = spawn_api().await;
        let health: HealthResponse = reqwest::get(format!("{}/api/v1/health", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(health.status, "ok");
        assert!(health.store_reachable);
        assert!(!health.model_scoring);
    }
}
