//! Claims email processor — one pass from mailbox document to stored
//! triage verdict.
//!
//! Each email flows through:
//! 1. Dedupe against already-ingested Message-IDs
//! 2. `PatternExtractor::extract_all()` — regex entity extraction
//! 3. `RuleClassifier::classify()` — keyword priority/type/risk
//! 4. Persistence across the email/entities/triage/attachments tables
//! 5. High-risk fan-out to the configured notifiers
//!
//! Failures leave the source document in place for the next run and are
//! written to `processing_log` for the health monitor.

use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, error, info, warn};

use crate::error::{ConfigError, PipelineError};
use crate::ingest::email::ClaimEmail;
use crate::ingest::source::MailSource;
use crate::notify::NotifierSet;
use crate::pipeline::record::{RunStats, TriageRecord};
use crate::store::{Database, StepLog, StepStatus};
use crate::triage::{PatternExtractor, RuleClassifier, TriageConfig};

/// Pipeline name written to `processing_log` and completion notices.
pub const INGEST_PIPELINE: &str = "email_ingest";

/// End-to-end processor for claims emails.
pub struct ClaimProcessor {
    extractor: PatternExtractor,
    classifier: RuleClassifier,
    config: TriageConfig,
    db: Arc<dyn Database>,
    notifiers: NotifierSet,
}

impl ClaimProcessor {
    /// Build a processor, compiling every configured pattern up front.
    pub fn new(
        config: TriageConfig,
        db: Arc<dyn Database>,
        notifiers: NotifierSet,
    ) -> Result<Self, ConfigError> {
        let extractor = PatternExtractor::new(&config)?;
        let classifier = RuleClassifier::new(&config);
        Ok(Self {
            extractor,
            classifier,
            config,
            db,
            notifiers,
        })
    }

    /// Run extraction and classification over one email, storage untouched.
    pub fn evaluate(&self, email: ClaimEmail) -> TriageRecord {
        let text = email.triage_text();
        let entities = self.extractor.extract_all(&text);
        let decision = self.classifier.classify(&text);
        TriageRecord::assemble(email, entities, decision, &self.config)
    }

    /// Process one email end to end.
    ///
    /// Returns `Ok(None)` when the Message-ID was already ingested. On a
    /// persistence error the email may be partially stored; the health
    /// monitor picks those up as unprocessed.
    pub async fn process(&self, email: ClaimEmail) -> Result<Option<TriageRecord>, PipelineError> {
        if self.db.email_seen(&email.message_id).await? {
            debug!(message_id = %email.message_id, "Email already ingested; skipping");
            return Ok(None);
        }

        let record = self.evaluate(email);

        match self.persist(&record).await {
            Ok(email_id) => {
                self.log_step("process_email", StepStatus::Completed, Some(&email_id), None)
                    .await;
                debug!(
                    email_id = %email_id,
                    priority = %record.priority_level,
                    claim_type = %record.claim_type,
                    "Email processed"
                );

                if record.requires_escalation {
                    info!(
                        email_id = %email_id,
                        claim_number = record.summary.claim_number.as_deref().unwrap_or("unknown"),
                        "High-risk claim detected"
                    );
                    self.notifiers.high_risk_alert(&record).await;
                }
                Ok(Some(record))
            }
            Err(e) => {
                self.log_step(
                    "process_email",
                    StepStatus::Failed,
                    None,
                    Some(&e.to_string()),
                )
                .await;
                Err(PipelineError::Persist(e))
            }
        }
    }

    /// One full ingest run over a mail source.
    ///
    /// Documents are fetched in parallel, then processed sequentially so
    /// store writes stay ordered. Successfully processed documents are
    /// archived; failures stay in the drop directory for the next run.
    pub async fn run_ingest(&self, source: &dyn MailSource) -> Result<RunStats, PipelineError> {
        let names = source.list().await?;
        let mut stats = RunStats::default();
        info!(
            count = names.len(),
            source = source.name(),
            "Starting ingest run"
        );

        let fetches: Vec<_> = names
            .iter()
            .map(|name| {
                let name = name.clone();
                async move {
                    let result = source.fetch(&name).await;
                    (name, result)
                }
            })
            .collect();

        for (name, fetched) in join_all(fetches).await {
            stats.fetched += 1;
            let email = match fetched {
                Ok(email) => email,
                Err(e) => {
                    error!(document = %name, error = %e, "Failed to fetch document");
                    self.log_step("fetch", StepStatus::Failed, None, Some(&e.to_string()))
                        .await;
                    stats.failed += 1;
                    continue;
                }
            };

            match self.process(email).await {
                Ok(Some(record)) => {
                    stats.processed += 1;
                    if record.requires_escalation {
                        stats.high_risk += 1;
                    }
                    self.archive(source, &name, &mut stats).await;
                }
                // Duplicate: archive so it stops reappearing every run
                Ok(None) => self.archive(source, &name, &mut stats).await,
                Err(e) => {
                    error!(document = %name, error = %e, "Failed to process email");
                    stats.failed += 1;
                }
            }
        }

        info!(
            fetched = stats.fetched,
            processed = stats.processed,
            failed = stats.failed,
            high_risk = stats.high_risk,
            archived = stats.archived,
            "Ingest run finished"
        );
        self.notifiers
            .pipeline_completion(INGEST_PIPELINE, &stats)
            .await;
        Ok(stats)
    }

    async fn persist(&self, record: &TriageRecord) -> Result<String, crate::error::DatabaseError> {
        let email_id = self.db.insert_email(&record.email).await?;
        self.db.insert_entities(&email_id, record).await?;
        self.db.insert_triage(&email_id, record).await?;
        self.db
            .insert_attachments(&email_id, &record.email.attachments)
            .await?;
        Ok(email_id)
    }

    async fn archive(&self, source: &dyn MailSource, name: &str, stats: &mut RunStats) {
        match source.archive(name).await {
            Ok(()) => stats.archived += 1,
            Err(e) => {
                warn!(document = %name, error = %e, "Failed to archive document");
                self.log_step("archive", StepStatus::Failed, None, Some(&e.to_string()))
                    .await;
            }
        }
    }

    /// Audit-trail write; a failed log write never fails the pipeline.
    async fn log_step(
        &self,
        step: &str,
        status: StepStatus,
        email_id: Option<&str>,
        error: Option<&str>,
    ) {
        let entry = StepLog {
            pipeline: INGEST_PIPELINE,
            step,
            status,
            email_id,
            error,
        };
        if let Err(e) = self.db.log_step(&entry).await {
            warn!("Failed to write processing log: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::error::NotifyError;
    use crate::notify::Notifier;
    use crate::store::LibSqlBackend;

    #[derive(Default)]
    struct RecordingNotifier {
        high_risk: Mutex<Vec<String>>,
        completions: Mutex<Vec<RunStats>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        fn name(&self) -> &str {
            "recording"
        }

        async fn high_risk_alert(&self, record: &TriageRecord) -> Result<(), NotifyError> {
            self.high_risk
                .lock()
                .unwrap()
                .push(record.email.message_id.clone());
            Ok(())
        }

        async fn pipeline_completion(
            &self,
            _pipeline: &str,
            stats: &RunStats,
        ) -> Result<(), NotifyError> {
            self.completions.lock().unwrap().push(stats.clone());
            Ok(())
        }

        async fn error_alert(&self, _pipeline: &str, _message: &str) -> Result<(), NotifyError> {
            Ok(())
        }
    }

    fn sample_email(message_id: &str, body: &str) -> ClaimEmail {
        ClaimEmail {
            message_id: message_id.to_string(),
            subject: "Claim correspondence".to_string(),
            sender: "insured@example.com".to_string(),
            recipients: vec!["claims@example.com".to_string()],
            cc: Vec::new(),
            date: None,
            body_text: body.to_string(),
            body_html: None,
            attachments: Vec::new(),
            source_name: "doc.json".to_string(),
        }
    }

    async fn processor_with(
        notifier: Arc<RecordingNotifier>,
    ) -> (ClaimProcessor, Arc<LibSqlBackend>) {
        let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let mut notifiers = NotifierSet::new();
        notifiers.push(notifier);
        let processor =
            ClaimProcessor::new(TriageConfig::default_rules(), db.clone(), notifiers).unwrap();
        (processor, db)
    }

    #[tokio::test]
    async fn process_stores_all_rows() {
        let notifier = Arc::new(RecordingNotifier::default());
        let (processor, db) = processor_with(notifier).await;

        let email = sample_email(
            "<full@example.com>",
            "CLAIM #FULL123456 for POLICY AB98765432: vehicle damage, estimate $3,200.00.",
        );
        let record = processor.process(email).await.unwrap().unwrap();
        assert_eq!(record.priority_level, "medium");
        assert_eq!(record.claim_type, "auto");

        let stored = db.get_email("<full@example.com>").await.unwrap().unwrap();
        let entities = db.get_entities(&stored.id).await.unwrap().unwrap();
        assert_eq!(entities.claim_number.as_deref(), Some("FULL123456"));
        let triage = db.get_triage(&stored.id).await.unwrap().unwrap();
        assert_eq!(triage.claim_type, "auto");
        assert!(!triage.requires_escalation);
    }

    #[tokio::test]
    async fn duplicate_email_skipped() {
        let notifier = Arc::new(RecordingNotifier::default());
        let (processor, _db) = processor_with(notifier).await;

        let email = sample_email("<dup@example.com>", "General inquiry about claim status.");
        assert!(processor.process(email.clone()).await.unwrap().is_some());
        assert!(processor.process(email).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn high_risk_triggers_notification() {
        let notifier = Arc::new(RecordingNotifier::default());
        let (processor, _db) = processor_with(notifier.clone()).await;

        let email = sample_email(
            "<risky@example.com>",
            "Our attorney will pursue litigation over CLAIM #RISK99887.",
        );
        let record = processor.process(email).await.unwrap().unwrap();
        assert!(record.high_risk);
        assert_eq!(
            notifier.high_risk.lock().unwrap().as_slice(),
            ["<risky@example.com>"]
        );
    }

    #[tokio::test]
    async fn routine_email_does_not_notify() {
        let notifier = Arc::new(RecordingNotifier::default());
        let (processor, _db) = processor_with(notifier.clone()).await;

        let email = sample_email(
            "<routine@example.com>",
            "Question about my claim status, no rush.",
        );
        processor.process(email).await.unwrap().unwrap();
        assert!(notifier.high_risk.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_required_entities_noted() {
        let notifier = Arc::new(RecordingNotifier::default());
        let (processor, db) = processor_with(notifier).await;

        let email = sample_email("<bare@example.com>", "Hello, I would like an update.");
        let record = processor.process(email).await.unwrap().unwrap();
        let notes = record.triage_notes.as_deref().unwrap();
        assert!(notes.contains("claim_number"));
        assert!(notes.contains("policy_number"));

        let stored = db.get_email("<bare@example.com>").await.unwrap().unwrap();
        let triage = db.get_triage(&stored.id).await.unwrap().unwrap();
        assert_eq!(triage.triage_notes.as_deref(), record.triage_notes.as_deref());
    }

    #[tokio::test]
    async fn completion_notice_after_run() {
        use crate::ingest::source::DirSource;

        let notifier = Arc::new(RecordingNotifier::default());
        let (processor, _db) = processor_with(notifier.clone()).await;

        let dir = tempfile::tempdir().unwrap();
        let drop_dir = dir.path().join("drop");
        let archive_dir = dir.path().join("archive");
        let source = DirSource::new(&drop_dir, &archive_dir).unwrap();

        std::fs::write(
            drop_dir.join("claim_001.json"),
            serde_json::json!({
                "message_id": "<run-1@example.com>",
                "subject": "Urgent: CLAIM #RUN1234567",
                "from": "insured@example.com",
                "body_text": "Emergency roof damage from the storm."
            })
            .to_string(),
        )
        .unwrap();
        std::fs::write(drop_dir.join("broken.json"), "{not json").unwrap();

        let stats = processor.run_ingest(&source).await.unwrap();
        assert_eq!(stats.fetched, 2);
        assert_eq!(stats.processed, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.high_risk, 1);
        assert_eq!(stats.archived, 1);

        let completions = notifier.completions.lock().unwrap();
        assert_eq!(completions.len(), 1);
        assert_eq!(completions[0].status(), "FAILED");
    }

    #[tokio::test]
    async fn second_run_archives_duplicates() {
        use crate::ingest::source::DirSource;

        let notifier = Arc::new(RecordingNotifier::default());
        let (processor, _db) = processor_with(notifier).await;

        let dir = tempfile::tempdir().unwrap();
        let drop_dir = dir.path().join("drop");
        let archive_dir = dir.path().join("archive");
        let source = DirSource::new(&drop_dir, &archive_dir).unwrap();

        let doc = serde_json::json!({
            "message_id": "<again@example.com>",
            "subject": "Claim papers",
            "from": "insured@example.com",
            "body_text": "Documents attached for claim."
        })
        .to_string();

        std::fs::write(drop_dir.join("first.json"), &doc).unwrap();
        let stats = processor.run_ingest(&source).await.unwrap();
        assert_eq!(stats.processed, 1);

        // Same message arrives under a new name
        std::fs::write(drop_dir.join("second.json"), &doc).unwrap();
        let stats = processor.run_ingest(&source).await.unwrap();
        assert_eq!(stats.processed, 0);
        assert_eq!(stats.failed, 0);
        assert_eq!(stats.archived, 1);
    }
}
