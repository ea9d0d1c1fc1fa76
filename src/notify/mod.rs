//! Outbound alerting: Teams webhook cards and SMTP email alerts.
//!
//! Delivery failures are logged and swallowed; a dead webhook must never
//! stall the ingest pipeline.

pub mod smtp;
pub mod teams;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::error::NotifyError;
use crate::pipeline::record::{RunStats, TriageRecord};

pub use smtp::{SmtpAlerts, SmtpSettings};
pub use teams::TeamsNotifier;

/// A destination for pipeline alerts.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Short name for log lines.
    fn name(&self) -> &str;

    /// An escalated claim needs human attention.
    async fn high_risk_alert(&self, record: &TriageRecord) -> Result<(), NotifyError>;

    /// A pipeline run finished.
    async fn pipeline_completion(&self, pipeline: &str, stats: &RunStats)
    -> Result<(), NotifyError>;

    /// A pipeline or health check failed.
    async fn error_alert(&self, pipeline: &str, message: &str) -> Result<(), NotifyError>;
}

/// All configured notifiers, fanned out together.
#[derive(Clone, Default)]
pub struct NotifierSet {
    notifiers: Vec<Arc<dyn Notifier>>,
}

impl NotifierSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, notifier: Arc<dyn Notifier>) {
        self.notifiers.push(notifier);
    }

    pub fn len(&self) -> usize {
        self.notifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notifiers.is_empty()
    }

    pub async fn high_risk_alert(&self, record: &TriageRecord) {
        for notifier in &self.notifiers {
            if let Err(e) = notifier.high_risk_alert(record).await {
                warn!(notifier = notifier.name(), "High-risk alert failed: {e}");
            }
        }
    }

    pub async fn pipeline_completion(&self, pipeline: &str, stats: &RunStats) {
        for notifier in &self.notifiers {
            if let Err(e) = notifier.pipeline_completion(pipeline, stats).await {
                warn!(notifier = notifier.name(), "Completion notification failed: {e}");
            }
        }
    }

    pub async fn error_alert(&self, pipeline: &str, message: &str) {
        for notifier in &self.notifiers {
            if let Err(e) = notifier.error_alert(pipeline, message).await {
                warn!(notifier = notifier.name(), "Error alert failed: {e}");
            }
        }
    }
}
