//! The claims intake pipeline.
//!
//! Every document picked up from a mail source flows through:
//! 1. `MailSource::fetch()` for source-specific I/O
//! 2. `PatternExtractor::extract_all()` for entity capture
//! 3. `RuleClassifier::classify()` for priority, claim type and risk
//! 4. Persistence plus the audit trail, then notification fan-out
//!
//! Processed documents are archived; failed ones stay in the drop
//! directory for the next run.

pub mod processor;
pub mod record;
pub mod runner;

pub use processor::{ClaimProcessor, INGEST_PIPELINE};
pub use record::{EntitySummary, RunStats, TriageRecord};
pub use runner::{spawn_health_loop, spawn_ingest_loop};
