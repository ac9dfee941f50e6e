//! Library crate for url-probe-rs exposing reusable modules.
pub mod categorize;
pub mod error;
pub mod export;
pub mod job;
pub mod probe;
pub mod scanner;
pub mod server;
pub mod targets;
pub mod transport;
pub mod types;
