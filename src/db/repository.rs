use async_trait::async_trait;
use bigdecimal::BigDecimal;
use sqlx::PgPool;
use std::time::Duration;

use crate::anomaly::types::{AnomalyRecord, ReasonCode};
use crate::config::{is_sql_identifier, StoreConfig};

/// Filters for listing stored anomalies.
#[derive(Debug, Clone, Default)]
pub struct AnomalyQuery {
    pub reason: Option<ReasonCode>,
    pub user_id: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Clone, Default)]
pub struct AnomalyPage {
    pub anomalies: Vec<AnomalyRecord>,
    pub total: i64,
}

/// Durable anomaly storage keyed by transaction id.
///
/// `put_anomaly` is create-or-overwrite: writing the same record twice leaves the
/// same stored state as writing it once.
#[async_trait]
pub trait AnomalyStore: Send + Sync {
    async fn put_anomaly(&self, record: &AnomalyRecord) -> eyre::Result<()>;

    async fn get_anomaly(&self, transaction_id: &str) -> eyre::Result<Option<AnomalyRecord>>;

    /// Ordered by transaction id.
    async fn list_anomalies(&self, query: &AnomalyQuery) -> eyre::Result<AnomalyPage>;

    async fn ping(&self) -> eyre::Result<()>;
}

// ============================================================
// Write retries
// ============================================================

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &StoreConfig) -> Self {
        Self {
            max_retries: config.write_retries,
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
        }
    }
}

/// Write one anomaly, retrying with exponential backoff (capped at 5s).
pub async fn persist_with_retry(
    store: &dyn AnomalyStore,
    record: &AnomalyRecord,
    policy: RetryPolicy,
) -> eyre::Result<()> {
    let mut delay = policy.base_delay;

    for attempt in 0..policy.max_retries {
        match store.put_anomaly(record).await {
            Ok(()) => return Ok(()),
            Err(e) => {
                tracing::warn!(
                    transaction_id = %record.transaction_id,
                    attempt = attempt + 1,
                    max_retries = policy.max_retries,
                    error = %e,
                    delay_ms = delay.as_millis() as u64,
                    "Anomaly write failed, retrying..."
                );
                tokio::time::sleep(delay).await;
                delay = std::cmp::min(delay * 2, Duration::from_secs(5));
            }
        }
    }

    // Final attempt, propagate the error
    store.put_anomaly(record).await.map_err(|e| {
        eyre::eyre!(
            "Anomaly write failed after {} retries: {}",
            policy.max_retries,
            e
        )
    })
}

// ============================================================
// PostgreSQL
// ============================================================

type AnomalyRow = (
    String,
    String,
    BigDecimal,
    String,
    String,
    String,
    String,
    String,
    Option<BigDecimal>,
    String,
    String,
);

const COLUMNS: &str = "transaction_id, user_id, amount, currency, merchant_category, country, \
                       device_type, event_timestamp, anomaly_score, reason, source_key";

pub struct PgAnomalyStore {
    pool: PgPool,
    table: String,
}

impl PgAnomalyStore {
    pub fn new(pool: PgPool, table: &str) -> eyre::Result<Self> {
        if !is_sql_identifier(table) {
            return Err(eyre::eyre!("Invalid anomaly table name '{}'", table));
        }
        Ok(Self {
            pool,
            table: table.to_string(),
        })
    }

    /// Create the anomaly table and its indexes if they do not exist.
    pub async fn ensure_schema(&self) -> eyre::Result<()> {
        let create_table = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                transaction_id    TEXT PRIMARY KEY,
                user_id           TEXT NOT NULL DEFAULT '',
                amount            NUMERIC NOT NULL,
                currency          TEXT NOT NULL DEFAULT '',
                merchant_category TEXT NOT NULL DEFAULT '',
                country           TEXT NOT NULL DEFAULT '',
                device_type       TEXT NOT NULL DEFAULT '',
                event_timestamp   TEXT NOT NULL DEFAULT '',
                anomaly_score     NUMERIC,
                reason            TEXT NOT NULL,
                source_key        TEXT NOT NULL DEFAULT ''
            )",
            self.table
        );
        sqlx::query(&create_table).execute(&self.pool).await?;

        let create_index = format!(
            "CREATE INDEX IF NOT EXISTS {table}_user_id_idx ON {table} (user_id)",
            table = self.table
        );
        sqlx::query(&create_index).execute(&self.pool).await?;

        tracing::info!(table = %self.table, "Anomaly table ready");
        Ok(())
    }
}

fn row_to_record(row: AnomalyRow) -> eyre::Result<AnomalyRecord> {
    let (
        transaction_id,
        user_id,
        amount,
        currency,
        merchant_category,
        country,
        device_type,
        timestamp,
        anomaly_score,
        reason,
        source_key,
    ) = row;

    Ok(AnomalyRecord {
        transaction_id,
        user_id,
        amount,
        currency,
        merchant_category,
        country,
        device_type,
        timestamp,
        anomaly_score,
        reason: reason.parse()?,
        source_key,
    })
}

#[async_trait]
impl AnomalyStore for PgAnomalyStore {
    async fn put_anomaly(&self, record: &AnomalyRecord) -> eyre::Result<()> {
        let sql = format!(
            "INSERT INTO {} ({})
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
             ON CONFLICT (transaction_id) DO UPDATE
             SET user_id = $2, amount = $3, currency = $4, merchant_category = $5,
                 country = $6, device_type = $7, event_timestamp = $8,
                 anomaly_score = $9, reason = $10, source_key = $11",
            self.table, COLUMNS
        );

        sqlx::query(&sql)
            .bind(&record.transaction_id)
            .bind(&record.user_id)
            .bind(&record.amount)
            .bind(&record.currency)
            .bind(&record.merchant_category)
            .bind(&record.country)
            .bind(&record.device_type)
            .bind(&record.timestamp)
            .bind(&record.anomaly_score)
            .bind(record.reason.as_str())
            .bind(&record.source_key)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn get_anomaly(&self, transaction_id: &str) -> eyre::Result<Option<AnomalyRecord>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE transaction_id = $1",
            COLUMNS, self.table
        );

        let row: Option<AnomalyRow> = sqlx::query_as(&sql)
            .bind(transaction_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(row_to_record).transpose()
    }

    async fn list_anomalies(&self, query: &AnomalyQuery) -> eyre::Result<AnomalyPage> {
        let reason = query.reason.map(|r| r.as_str());

        let count_sql = format!(
            "SELECT COUNT(*) FROM {}
             WHERE ($1::TEXT IS NULL OR reason = $1)
               AND ($2::TEXT IS NULL OR user_id = $2)",
            self.table
        );
        let (total,): (i64,) = sqlx::query_as(&count_sql)
            .bind(reason)
            .bind(&query.user_id)
            .fetch_one(&self.pool)
            .await?;

        let list_sql = format!(
            "SELECT {} FROM {}
             WHERE ($1::TEXT IS NULL OR reason = $1)
               AND ($2::TEXT IS NULL OR user_id = $2)
             ORDER BY transaction_id
             LIMIT $3 OFFSET $4",
            COLUMNS, self.table
        );
        let rows: Vec<AnomalyRow> = sqlx::query_as(&list_sql)
            .bind(reason)
            .bind(&query.user_id)
            .bind(query.limit)
            .bind(query.offset)
            .fetch_all(&self.pool)
            .await?;

        let anomalies = rows
            .into_iter()
            .map(row_to_record)
            .collect::<eyre::Result<Vec<_>>>()?;

        Ok(AnomalyPage { anomalies, total })
    }

    async fn ping(&self) -> eyre::Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
