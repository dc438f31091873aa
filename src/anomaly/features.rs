use bigdecimal::ToPrimitive;
use serde::Serialize;

use crate::ingest::types::Transaction;

pub const FEATURE_COUNT: usize = 3;

/// Model input: `[amount, is_foreign, is_web]`.
///
/// The order is part of the contract with the model endpoint. Changing it requires a
/// retrained model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FeatureVector(pub [f64; FEATURE_COUNT]);

/// Turns transactions into model feature vectors. Never fails.
pub struct FeatureExtractor {
    home_country: String,
}

impl FeatureExtractor {
    pub fn new(home_country: impl Into<String>) -> Self {
        Self {
            home_country: home_country.into(),
        }
    }

    pub fn extract(&self, tx: &Transaction) -> FeatureVector {
        let amount = tx.amount.to_f64().unwrap_or(0.0);

        // A missing country is never foreign.
        let is_foreign = match tx.country.as_deref() {
            Some(country) if country != self.home_country => 1.0,
            _ => 0.0,
        };

        let is_web = match tx.device_type.as_deref() {
            Some("web") => 1.0,
            _ => 0.0,
        };

        FeatureVector([amount, is_foreign, is_web])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;
    use std::str::FromStr;

    fn tx(amount: &str, country: Option<&str>, device: Option<&str>) -> Transaction {
        Transaction {
            transaction_id: "t".to_string(),
            user_id: None,
            amount: BigDecimal::from_str(amount).unwrap(),
            currency: None,
            merchant_category: None,
            country: country.map(str::to_string),
            device_type: device.map(str::to_string),
            timestamp: None,
        }
    }

    #[test]
    fn test_foreign_web() {
        let extractor = FeatureExtractor::new("GB");
        let features = extractor.extract(&tx("50", Some("NG"), Some("web")));
        assert_eq!(features, FeatureVector([50.0, 1.0, 1.0]));
    }

    #[test]
    fn test_domestic_mobile() {
        let extractor = FeatureExtractor::new("GB");
        let features = extractor.extract(&tx("259.99", Some("GB"), Some("mobile")));
        assert_eq!(features, FeatureVector([259.99, 0.0, 0.0]));
    }

    #[test]
    fn test_missing_fields_take_negative_case() {
        let extractor = FeatureExtractor::new("GB");
        let features = extractor.extract(&tx("0", None, None));
        assert_eq!(features, FeatureVector([0.0, 0.0, 0.0]));
    }

    #[test]
    fn test_serializes_as_plain_array() {
        let json = serde_json::to_string(&FeatureVector([50.0, 1.0, 0.0])).unwrap();
        assert_eq!(json, "[50.0,1.0,0.0]");
    }
}
