use bigdecimal::{BigDecimal, Zero};
use serde::Serialize;
use serde_json::{Map as JsonMap, Value as JsonValue};
use std::str::FromStr;

use super::types::Transaction;

/// Faults that cause a whole batch to be skipped.
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[serde(tag = "fault", content = "detail", rename_all = "snake_case")]
pub enum BatchFault {
    #[error("source container '{actual}' does not match expected '{expected}'")]
    SourceMismatch { expected: String, actual: String },
    #[error("batch object could not be read: {0}")]
    Unreadable(String),
    #[error("batch payload is not valid UTF-8")]
    NotUtf8,
    #[error("batch payload is not valid JSON: {0}")]
    NotJson(String),
    #[error("batch payload is a JSON {0}, expected an array of transactions")]
    NotArray(&'static str),
}

/// Faults that cause a single record to be skipped.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RecordFault {
    #[error("record is not a JSON object")]
    NotAnObject,
    #[error("record has no transaction_id")]
    MissingTransactionId,
    #[error("record amount {0} is negative")]
    NegativeAmount(BigDecimal),
    #[error("record amount '{0}' is not a decimal number")]
    InvalidAmount(String),
}

/// Split a batch payload into its records. Records are validated one at a time later
/// so that a bad record never poisons its neighbours.
pub fn parse_batch(payload: &[u8]) -> Result<Vec<JsonValue>, BatchFault> {
    let text = std::str::from_utf8(payload).map_err(|_| BatchFault::NotUtf8)?;
    let value: JsonValue =
        serde_json::from_str(text).map_err(|e| BatchFault::NotJson(e.to_string()))?;

    match value {
        JsonValue::Array(records) => Ok(records),
        JsonValue::Object(_) => Err(BatchFault::NotArray("object")),
        JsonValue::String(_) => Err(BatchFault::NotArray("string")),
        JsonValue::Number(_) => Err(BatchFault::NotArray("number")),
        JsonValue::Bool(_) => Err(BatchFault::NotArray("boolean")),
        JsonValue::Null => Err(BatchFault::NotArray("null")),
    }
}

/// Validate one record into a [`Transaction`].
///
/// Only `transaction_id` and `amount` can fail a record. Descriptive fields of the
/// wrong JSON type fall back to their scalar text, or to absent for arrays and objects.
pub fn parse_record(value: &JsonValue) -> Result<Transaction, RecordFault> {
    let fields = value.as_object().ok_or(RecordFault::NotAnObject)?;

    let transaction_id = text_field(fields, "transaction_id")
        .filter(|id| !id.trim().is_empty())
        .ok_or(RecordFault::MissingTransactionId)?;

    let amount = match fields.get("amount") {
        None | Some(JsonValue::Null) => BigDecimal::zero(),
        Some(JsonValue::Number(number)) => number_to_decimal(number)?,
        Some(other) => return Err(RecordFault::InvalidAmount(other.to_string())),
    };
    if amount < BigDecimal::zero() {
        return Err(RecordFault::NegativeAmount(amount));
    }

    Ok(Transaction {
        transaction_id,
        user_id: text_field(fields, "user_id"),
        amount,
        currency: text_field(fields, "currency"),
        merchant_category: text_field(fields, "merchant_category"),
        country: text_field(fields, "country"),
        device_type: text_field(fields, "device_type"),
        timestamp: text_field(fields, "timestamp"),
    })
}

fn text_field(fields: &JsonMap<String, JsonValue>, name: &str) -> Option<String> {
    match fields.get(name)? {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::Bool(b) => Some(b.to_string()),
        JsonValue::Null | JsonValue::Array(_) | JsonValue::Object(_) => None,
    }
}

/// JSON numbers keep their literal text (`arbitrary_precision`), so the decimal is exact.
fn number_to_decimal(number: &serde_json::Number) -> Result<BigDecimal, RecordFault> {
    let text = number.to_string();
    BigDecimal::from_str(&text).map_err(|_| RecordFault::InvalidAmount(text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_batch_array() {
        let records = parse_batch(br#"[{"transaction_id":"t1"},{"transaction_id":"t2"}]"#).unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_parse_batch_empty_array() {
        assert!(parse_batch(b"[]").unwrap().is_empty());
    }

    #[test]
    fn test_parse_batch_not_json() {
        assert!(matches!(
            parse_batch(b"{not json"),
            Err(BatchFault::NotJson(_))
        ));
    }

    #[test]
    fn test_parse_batch_wrong_shape() {
        assert_eq!(
            parse_batch(br#"{"transaction_id":"t1"}"#),
            Err(BatchFault::NotArray("object"))
        );
        assert_eq!(parse_batch(b"42"), Err(BatchFault::NotArray("number")));
    }

    #[test]
    fn test_parse_batch_not_utf8() {
        assert_eq!(parse_batch(&[0xff, 0xfe, 0x5b]), Err(BatchFault::NotUtf8));
    }

    #[test]
    fn test_parse_record_full() {
        let tx = parse_record(&json!({
            "transaction_id": "txn_123456",
            "user_id": "user_1001",
            "amount": 259.99,
            "currency": "GBP",
            "merchant_category": "retail",
            "country": "GB",
            "device_type": "mobile",
            "timestamp": "2025-12-20T14:32:10Z"
        }))
        .unwrap();

        assert_eq!(tx.transaction_id, "txn_123456");
        assert_eq!(tx.user_id.as_deref(), Some("user_1001"));
        assert_eq!(tx.amount, BigDecimal::from_str("259.99").unwrap());
        assert_eq!(tx.country.as_deref(), Some("GB"));
        assert_eq!(tx.timestamp.as_deref(), Some("2025-12-20T14:32:10Z"));
    }

    #[test]
    fn test_parse_record_defaults() {
        let tx = parse_record(&json!({"transaction_id": "t1", "country": null})).unwrap();
        assert_eq!(tx.amount, BigDecimal::zero());
        assert!(tx.user_id.is_none());
        assert!(tx.country.is_none());
        assert!(tx.device_type.is_none());
    }

    #[test]
    fn test_parse_record_amount_is_exact() {
        let tx = parse_record(&json!({"transaction_id": "t1", "amount": 0.1})).unwrap();
        assert_eq!(tx.amount, BigDecimal::from_str("0.1").unwrap());

        let tx = parse_record(&json!({"transaction_id": "t1", "amount": 15000})).unwrap();
        assert_eq!(tx.amount, BigDecimal::from(15000));
    }

    #[test]
    fn test_parse_record_missing_id() {
        assert_eq!(
            parse_record(&json!({"amount": 15000})),
            Err(RecordFault::MissingTransactionId)
        );
        assert_eq!(
            parse_record(&json!({"transaction_id": "  ", "amount": 1})),
            Err(RecordFault::MissingTransactionId)
        );
    }

    #[test]
    fn test_parse_record_negative_amount() {
        assert!(matches!(
            parse_record(&json!({"transaction_id": "t1", "amount": -5})),
            Err(RecordFault::NegativeAmount(_))
        ));
    }

    #[test]
    fn test_parse_record_wrong_types() {
        assert!(matches!(
            parse_record(&json!({"transaction_id": "t1", "amount": "lots"})),
            Err(RecordFault::InvalidAmount(_))
        ));
        assert_eq!(parse_record(&json!("t1")), Err(RecordFault::NotAnObject));
    }

    #[test]
    fn test_parse_record_lenient_descriptive_fields() {
        let tx = parse_record(&json!({
            "transaction_id": "t1",
            "amount": 50000,
            "user_id": 1001,
            "country": ["GB"],
            "device_type": {"kind": "web"},
            "timestamp": 1766241130
        }))
        .unwrap();

        assert_eq!(tx.amount, BigDecimal::from(50000));
        assert_eq!(tx.user_id.as_deref(), Some("1001"));
        assert!(tx.country.is_none());
        assert!(tx.device_type.is_none());
        assert_eq!(tx.timestamp.as_deref(), Some("1766241130"));
    }

    #[test]
    fn test_numeric_transaction_id_is_kept_as_text() {
        let tx = parse_record(&json!({"transaction_id": 42, "amount": 1})).unwrap();
        assert_eq!(tx.transaction_id, "42");
    }

    #[test]
    fn test_amount_beyond_f64_precision_is_exact() {
        let records =
            parse_batch(br#"[{"transaction_id":"t1","amount":10000.0000000000001}]"#).unwrap();
        let tx = parse_record(&records[0]).unwrap();
        assert_eq!(tx.amount, BigDecimal::from_str("10000.0000000000001").unwrap());
        assert!(tx.amount > BigDecimal::from(10_000));

        let records =
            parse_batch(br#"[{"transaction_id":"t2","amount":12345678901234567.89}]"#).unwrap();
        let tx = parse_record(&records[0]).unwrap();
        assert_eq!(tx.amount.to_string(), "12345678901234567.89");
    }

    #[test]
    fn test_out_of_range_amount_stays_in_its_record() {
        let records = parse_batch(
            br#"[{"transaction_id":"ok","amount":15000},{"transaction_id":"big","amount":1e400}]"#,
        )
        .unwrap();
        assert_eq!(records.len(), 2);

        let ok = parse_record(&records[0]).unwrap();
        assert_eq!(ok.amount, BigDecimal::from(15000));
        let big = parse_record(&records[1]).unwrap();
        assert!(big.amount > BigDecimal::from(10_000));
    }
}
