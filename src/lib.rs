//! Batch transaction anomaly scoring.
//!
//! Each trigger event names newly written batch objects. Every transaction in a batch
//! is scored by an amount rule and an optional hosted classifier; flagged transactions
//! are written to the anomaly store keyed by transaction id.

pub mod anomaly;
pub mod api;
pub mod config;
pub mod db;
pub mod ingest;
pub mod model;
pub mod pipeline;
