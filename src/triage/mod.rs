//! Rule-based triage core — entity extraction and keyword classification.
//!
//! Everything here is deterministic and synchronous: configuration is
//! loaded and validated once, then the extractor and classifier run pure
//! functions of the email text. No I/O, no hidden state.

pub mod classifier;
pub mod config;
pub mod extractor;

pub use classifier::{RuleClassifier, ScoredLabel, TriageDecision};
pub use config::TriageConfig;
pub use extractor::{ExtractionResult, PatternExtractor};
