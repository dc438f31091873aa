use bigdecimal::BigDecimal;

use crate::config::RulesConfig;
use crate::ingest::types::Transaction;
use crate::model::scorer::{ModelScore, ModelScorer};

use super::features::FeatureExtractor;
use super::rules::RuleEvaluator;
use super::types::{AnomalyRecord, Decision, ReasonCode, ANOMALY_SENTINEL};

/// Merge the rule and model signals. Flagging wins over the model's "normal" reading;
/// the model can add a flag but never suppress one.
pub fn combine(rule_flagged: bool, score: &ModelScore) -> Decision {
    let model_flag = match score {
        ModelScore::Unscored => None,
        ModelScore::Scored(s) if *s == BigDecimal::from(ANOMALY_SENTINEL) => {
            Some(ReasonCode::ModelFlagged)
        }
        ModelScore::Scored(_) => None,
        ModelScore::Failsafe(_) => Some(ReasonCode::ModelUnavailableFailsafe),
    };

    match (rule_flagged, model_flag) {
        (false, None) => Decision::Clear,
        (true, None) => Decision::Flag(ReasonCode::AmountGtThreshold),
        (false, Some(reason)) => Decision::Flag(reason),
        (true, Some(ReasonCode::ModelFlagged)) => Decision::Flag(ReasonCode::AmountAndModelFlagged),
        (true, Some(_)) => Decision::Flag(ReasonCode::AmountAndModelUnavailable),
    }
}

/// Result of scoring one transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    pub decision: Decision,
    pub score: ModelScore,
}

impl Assessment {
    /// The anomaly record to persist, if the transaction was flagged.
    pub fn into_record(self, tx: &Transaction, source_key: &str) -> Option<AnomalyRecord> {
        let reason = self.decision.reason()?;
        Some(AnomalyRecord::from_transaction(
            tx,
            self.score.persisted_score(),
            reason,
            source_key,
        ))
    }
}

/// Scores transactions: features, model, rule, then the combined decision.
pub struct AnomalyEngine {
    extractor: FeatureExtractor,
    rules: RuleEvaluator,
    scorer: ModelScorer,
}

impl AnomalyEngine {
    pub fn new(config: &RulesConfig, scorer: ModelScorer) -> Self {
        Self {
            extractor: FeatureExtractor::new(config.home_country.clone()),
            rules: RuleEvaluator::new(config.amount_threshold.clone()),
            scorer,
        }
    }

    pub fn model_enabled(&self) -> bool {
        self.scorer.is_enabled()
    }

    pub async fn assess(&self, tx: &Transaction) -> Assessment {
        let features = self.extractor.extract(tx);
        let score = self.scorer.score(&tx.transaction_id, &features).await;
        let rule_flagged = self.rules.is_flagged(tx);
        let decision = combine(rule_flagged, &score);

        Assessment { decision, score }
    }
}
