use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use crate::anomaly::types::AnomalyRecord;

use super::repository::{AnomalyPage, AnomalyQuery, AnomalyStore};

/// Anomaly store held in process memory. Same overwrite semantics as the SQL store.
#[derive(Default)]
pub struct MemoryAnomalyStore {
    records: RwLock<BTreeMap<String, AnomalyRecord>>,
}

impl MemoryAnomalyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// All stored records, ordered by transaction id.
    pub async fn snapshot(&self) -> Vec<AnomalyRecord> {
        self.records.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl AnomalyStore for MemoryAnomalyStore {
    async fn put_anomaly(&self, record: &AnomalyRecord) -> eyre::Result<()> {
        self.records
            .write()
            .await
            .insert(record.transaction_id.clone(), record.clone());
        Ok(())
    }

    async fn get_anomaly(&self, transaction_id: &str) -> eyre::Result<Option<AnomalyRecord>> {
        Ok(self.records.read().await.get(transaction_id).cloned())
    }

    async fn list_anomalies(&self, query: &AnomalyQuery) -> eyre::Result<AnomalyPage> {
        let records = self.records.read().await;
        let matching: Vec<&AnomalyRecord> = records
            .values()
            .filter(|r| query.reason.map_or(true, |reason| r.reason == reason))
            .filter(|r| {
                query
                    .user_id
                    .as_deref()
                    .map_or(true, |user| r.user_id == user)
            })
            .collect();

        let total = matching.len() as i64;
        let anomalies = matching
            .into_iter()
            .skip(query.offset.max(0) as usize)
            .take(query.limit.max(0) as usize)
            .cloned()
            .collect();

        Ok(AnomalyPage { anomalies, total })
    }

    async fn ping(&self) -> eyre::Result<()> {
        Ok(())
    }
}
