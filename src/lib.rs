//! Claims Triage — rule-driven intake for insurance claim email.

pub mod config;
pub mod error;
pub mod ingest;
pub mod monitor;
pub mod notify;
pub mod pipeline;
pub mod store;
pub mod triage;
