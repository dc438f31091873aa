pub mod client;
pub mod scorer;
