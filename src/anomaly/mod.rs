pub mod engine;
pub mod features;
pub mod rules;
pub mod types;
