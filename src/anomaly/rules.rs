use bigdecimal::BigDecimal;

use crate::ingest::types::Transaction;

/// Deterministic amount threshold. Flags when `amount > threshold` (strictly).
pub struct RuleEvaluator {
    amount_threshold: BigDecimal,
}

impl RuleEvaluator {
    pub fn new(amount_threshold: BigDecimal) -> Self {
        Self { amount_threshold }
    }

    pub fn is_flagged(&self, tx: &Transaction) -> bool {
        check_amount_threshold(&tx.amount, &self.amount_threshold)
    }
}

/// Exact decimal comparison, so `10000.001` is over a `10000` threshold.
pub fn check_amount_threshold(amount: &BigDecimal, threshold: &BigDecimal) -> bool {
    amount > threshold
}
