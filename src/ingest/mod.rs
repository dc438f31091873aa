pub mod batch;
pub mod object_store;
pub mod types;
