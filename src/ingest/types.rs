use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};

/// One transaction from a batch, validated at the parse boundary.
///
/// Only `transaction_id` and `amount` carry meaning for scoring. Every other field
/// is optional; absent values are written as empty strings in anomaly records.
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub transaction_id: String,
    pub user_id: Option<String>,
    /// Non-negative, exact decimal. Missing amounts parse as zero.
    pub amount: BigDecimal,
    pub currency: Option<String>,
    pub merchant_category: Option<String>,
    pub country: Option<String>,
    pub device_type: Option<String>,
    /// ISO-8601 string, passed through untouched.
    pub timestamp: Option<String>,
}

/// Location of a newly created batch object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectRef {
    pub container: String,
    pub key: String,
}

impl ObjectRef {
    pub fn new(container: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            key: key.into(),
        }
    }
}

/// Object-created notification. Each record names one batch.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TriggerEvent {
    #[serde(rename = "Records", default)]
    pub records: Vec<EventRecord>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EventRecord {
    pub s3: ObjectNotification,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObjectNotification {
    pub bucket: BucketRef,
    pub object: ObjectKey,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BucketRef {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObjectKey {
    pub key: String,
}

impl TriggerEvent {
    /// Build an event naming a single object.
    pub fn single(container: &str, key: &str) -> Self {
        Self {
            records: vec![EventRecord {
                s3: ObjectNotification {
                    bucket: BucketRef {
                        name: container.to_string(),
                    },
                    object: ObjectKey {
                        key: key.to_string(),
                    },
                },
            }],
        }
    }

    pub fn objects(&self) -> Vec<ObjectRef> {
        self.records
            .iter()
            .map(|r| ObjectRef::new(&r.s3.bucket.name, &r.s3.object.key))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_notification() {
        let json = r#"{
            "Records": [
                {"eventName": "ObjectCreated:Put",
                 "s3": {"bucket": {"name": "raw-transactions", "arn": "x"},
                        "object": {"key": "raw/batch_000001.json", "size": 120}}},
                {"s3": {"bucket": {"name": "other"}, "object": {"key": "b.json"}}}
            ]
        }"#;

        let event: TriggerEvent = serde_json::from_str(json).unwrap();
        let objects = event.objects();
        assert_eq!(objects.len(), 2);
        assert_eq!(
            objects[0],
            ObjectRef::new("raw-transactions", "raw/batch_000001.json")
        );
        assert_eq!(objects[1].container, "other");
    }

    #[test]
    fn test_missing_records_is_empty_event() {
        let event: TriggerEvent = serde_json::from_str("{}").unwrap();
        assert!(event.objects().is_empty());
    }

    #[test]
    fn test_single() {
        let event = TriggerEvent::single("raw", "k.json");
        assert_eq!(event.objects(), vec![ObjectRef::new("raw", "k.json")]);
    }
}
