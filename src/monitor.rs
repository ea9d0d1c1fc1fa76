//! Pipeline health monitor.
//!
//! Three probes against the store: recent step failures, emails stuck
//! mid-pipeline, and escalated claims nobody has reviewed. Any probe over
//! its threshold flips the report to unhealthy and raises an error alert.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::DatabaseError;
use crate::notify::NotifierSet;
use crate::store::{Database, PendingHighRisk, ProcessingFailure, UnprocessedCounts};

/// Pipeline name used for health alerts.
pub const HEALTH_PIPELINE: &str = "Pipeline Health Check";

/// Failed steps are counted over this window.
const FAILURE_WINDOW_HOURS: i64 = 24;
/// An email gets this long to finish processing before it counts as stuck.
const UNPROCESSED_GRACE_HOURS: i64 = 2;
/// An escalated claim gets this long to be reviewed.
const REVIEW_GRACE_HOURS: i64 = 4;
/// A stage with more stuck emails than this is unhealthy.
const STUCK_EMAIL_THRESHOLD: i64 = 10;
/// More pending high-risk reviews than this is unhealthy.
const PENDING_REVIEW_THRESHOLD: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

/// One health check result.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub timestamp: DateTime<Utc>,
    pub failures: Vec<ProcessingFailure>,
    pub unprocessed: UnprocessedCounts,
    pub high_risk_pending: Vec<PendingHighRisk>,
    pub status: HealthStatus,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

/// Periodic health checker over the triage store.
pub struct HealthMonitor {
    db: Arc<dyn Database>,
    notifiers: NotifierSet,
}

impl HealthMonitor {
    pub fn new(db: Arc<dyn Database>, notifiers: NotifierSet) -> Self {
        Self { db, notifiers }
    }

    /// Run all probes and alert when anything is over threshold.
    pub async fn run_health_check(&self) -> Result<HealthReport, DatabaseError> {
        info!("Starting pipeline health check");
        let now = Utc::now();

        let failures = self
            .db
            .recent_failures(now - Duration::hours(FAILURE_WINDOW_HOURS))
            .await?;
        let unprocessed = self
            .db
            .unprocessed_counts(now - Duration::hours(UNPROCESSED_GRACE_HOURS))
            .await?;
        let high_risk_pending = self
            .db
            .unreviewed_high_risk(now - Duration::hours(REVIEW_GRACE_HOURS))
            .await?;

        let has_failures = !failures.is_empty();
        let has_stuck_emails = unprocessed.any_above(STUCK_EMAIL_THRESHOLD);
        let has_pending_high_risk = high_risk_pending.len() > PENDING_REVIEW_THRESHOLD;

        let status = if has_failures || has_stuck_emails || has_pending_high_risk {
            HealthStatus::Unhealthy
        } else {
            HealthStatus::Healthy
        };

        let report = HealthReport {
            timestamp: now,
            failures,
            unprocessed,
            high_risk_pending,
            status,
        };

        if report.is_healthy() {
            info!("Pipeline health check: HEALTHY");
        } else {
            warn!("Pipeline health check: UNHEALTHY");
            self.notifiers
                .error_alert(HEALTH_PIPELINE, &alert_message(&report))
                .await;
        }

        Ok(report)
    }
}

fn alert_message(report: &HealthReport) -> String {
    format!(
        "Pipeline Health Alert:\n\
         - Failures in last 24h: {}\n\
         - Unprocessed emails: {}\n\
         - High-risk pending review: {}",
        report.failures.len(),
        report.unprocessed.total(),
        report.high_risk_pending.len(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::error::NotifyError;
    use crate::ingest::email::ClaimEmail;
    use crate::notify::Notifier;
    use crate::pipeline::record::{RunStats, TriageRecord};
    use crate::store::{LibSqlBackend, StepLog, StepStatus};
    use crate::triage::{PatternExtractor, RuleClassifier, TriageConfig};

    #[derive(Default)]
    struct RecordingNotifier {
        errors: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        fn name(&self) -> &str {
            "recording"
        }

        async fn high_risk_alert(&self, _record: &TriageRecord) -> Result<(), NotifyError> {
            Ok(())
        }

        async fn pipeline_completion(
            &self,
            _pipeline: &str,
            _stats: &RunStats,
        ) -> Result<(), NotifyError> {
            Ok(())
        }

        async fn error_alert(&self, pipeline: &str, message: &str) -> Result<(), NotifyError> {
            self.errors
                .lock()
                .unwrap()
                .push((pipeline.to_string(), message.to_string()));
            Ok(())
        }
    }

    fn sample_email(message_id: &str) -> ClaimEmail {
        ClaimEmail {
            message_id: message_id.to_string(),
            subject: "Urgent fatality claim CLAIM #HR0001234".to_string(),
            sender: "field@example.com".to_string(),
            recipients: Vec::new(),
            cc: Vec::new(),
            date: None,
            body_text: "Attorney involved.".to_string(),
            body_html: None,
            attachments: Vec::new(),
            source_name: "hr.json".to_string(),
        }
    }

    fn sample_record(email: ClaimEmail) -> TriageRecord {
        let config = TriageConfig::default_rules();
        let extractor = PatternExtractor::new(&config).unwrap();
        let classifier = RuleClassifier::new(&config);
        let text = email.triage_text();
        let entities = extractor.extract_all(&text);
        let decision = classifier.classify(&text);
        TriageRecord::assemble(email, entities, decision, &config)
    }

    async fn monitor_with_db() -> (HealthMonitor, Arc<LibSqlBackend>, Arc<RecordingNotifier>) {
        let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let recorder = Arc::new(RecordingNotifier::default());
        let mut notifiers = NotifierSet::new();
        notifiers.push(recorder.clone());
        let monitor = HealthMonitor::new(db.clone(), notifiers);
        (monitor, db, recorder)
    }

    #[tokio::test]
    async fn empty_store_is_healthy() {
        let (monitor, _db, recorder) = monitor_with_db().await;
        let report = monitor.run_health_check().await.unwrap();
        assert!(report.is_healthy());
        assert!(report.failures.is_empty());
        assert_eq!(report.unprocessed.total(), 0);
        assert!(recorder.errors.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn recent_failure_flips_unhealthy() {
        let (monitor, db, recorder) = monitor_with_db().await;
        db.log_step(&StepLog {
            pipeline: "email_ingest",
            step: "persist",
            status: StepStatus::Failed,
            email_id: None,
            error: Some("disk full"),
        })
        .await
        .unwrap();

        let report = monitor.run_health_check().await.unwrap();
        assert_eq!(report.status, HealthStatus::Unhealthy);
        assert_eq!(report.failures.len(), 1);

        let errors = recorder.errors.lock().unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].0, HEALTH_PIPELINE);
        assert!(errors[0].1.contains("Failures in last 24h: 1"));
    }

    #[tokio::test]
    async fn stale_unreviewed_high_risk_counts() {
        let (monitor, db, recorder) = monitor_with_db().await;

        // Six stale escalations: one over the threshold of five
        for i in 0..6 {
            let email = sample_email(&format!("<hr-{i}@example.com>"));
            let record = sample_record(email.clone());
            assert!(record.requires_escalation);
            let email_id = db.insert_email(&email).await.unwrap();
            db.insert_entities(&email_id, &record).await.unwrap();
            db.insert_triage(&email_id, &record).await.unwrap();
        }
        let old = (Utc::now() - Duration::hours(6)).to_rfc3339();
        db.conn()
            .execute(
                "UPDATE triage_results SET created_at = ?1",
                libsql::params![old],
            )
            .await
            .unwrap();

        let report = monitor.run_health_check().await.unwrap();
        assert_eq!(report.status, HealthStatus::Unhealthy);
        assert_eq!(report.high_risk_pending.len(), 6);
        assert!(
            recorder.errors.lock().unwrap()[0]
                .1
                .contains("High-risk pending review: 6")
        );
    }

    #[tokio::test]
    async fn five_pending_reviews_still_healthy() {
        let (monitor, db, _recorder) = monitor_with_db().await;

        for i in 0..5 {
            let email = sample_email(&format!("<ok-{i}@example.com>"));
            let record = sample_record(email.clone());
            let email_id = db.insert_email(&email).await.unwrap();
            db.insert_entities(&email_id, &record).await.unwrap();
            db.insert_triage(&email_id, &record).await.unwrap();
        }
        let old = (Utc::now() - Duration::hours(6)).to_rfc3339();
        db.conn()
            .execute(
                "UPDATE triage_results SET created_at = ?1",
                libsql::params![old],
            )
            .await
            .unwrap();

        let report = monitor.run_health_check().await.unwrap();
        assert!(report.is_healthy());
        assert_eq!(report.high_risk_pending.len(), 5);
    }

    #[tokio::test]
    async fn fresh_unprocessed_emails_do_not_alert() {
        let (monitor, db, _recorder) = monitor_with_db().await;
        // Recent email with no entities is within the grace window
        db.insert_email(&sample_email("<fresh@example.com>"))
            .await
            .unwrap();

        let report = monitor.run_health_check().await.unwrap();
        assert!(report.is_healthy());
        assert_eq!(report.unprocessed.total(), 0);
    }

    #[tokio::test]
    async fn report_serializes_for_operators() {
        let (monitor, _db, _recorder) = monitor_with_db().await;
        let report = monitor.run_health_check().await.unwrap();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "HEALTHY");
        assert!(json["unprocessed"]["no_entities"].is_number());
    }
}
