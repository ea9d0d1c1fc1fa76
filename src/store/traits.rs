//! `Database` trait — single async interface for triage persistence.
//!
//! One processed email fans out over four tables (emails, entities,
//! triage, attachments) plus an audit trail in `processing_log`. The
//! trait keeps the pipeline and health monitor backend-agnostic.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::DatabaseError;
use crate::ingest::attachment::AttachmentInfo;
use crate::ingest::email::ClaimEmail;
use crate::pipeline::record::TriageRecord;

/// Outcome of one pipeline step, written to `processing_log`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Started,
    Completed,
    Failed,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Started => "started",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
        }
    }
}

/// One `processing_log` entry, borrowed from the caller.
#[derive(Debug, Clone, Copy)]
pub struct StepLog<'a> {
    pub pipeline: &'a str,
    pub step: &'a str,
    pub status: StepStatus,
    pub email_id: Option<&'a str>,
    pub error: Option<&'a str>,
}

/// A persisted email row.
#[derive(Debug, Clone)]
pub struct StoredEmail {
    pub id: String,
    pub message_id: String,
    pub subject: String,
    pub sender: String,
    pub has_attachments: bool,
    pub attachment_count: i64,
    pub source_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A persisted entity row for one email.
#[derive(Debug, Clone)]
pub struct StoredEntities {
    pub email_id: String,
    pub claim_number: Option<String>,
    pub policy_number: Option<String>,
    pub insured_name: Option<String>,
    pub date_of_loss: Option<String>,
    pub claim_amount: Option<Decimal>,
    pub phone_numbers: Vec<String>,
    pub email_addresses: Vec<String>,
    /// Full entity-name → matches mapping as stored.
    pub entities: serde_json::Value,
    pub confidence_score: f64,
    pub extraction_method: String,
}

/// A persisted triage verdict for one email.
#[derive(Debug, Clone)]
pub struct StoredTriage {
    pub email_id: String,
    pub priority_level: String,
    pub claim_type: String,
    pub risk_level: String,
    pub requires_escalation: bool,
    pub triage_notes: Option<String>,
    pub confidence_score: f64,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub reviewed_by: Option<String>,
}

/// A grouped failure row from `processing_log`.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessingFailure {
    pub pipeline: String,
    pub step: String,
    pub error: Option<String>,
    pub latest: DateTime<Utc>,
    pub count: i64,
}

/// Emails stuck without downstream rows, per stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UnprocessedCounts {
    /// Emails with no `extracted_entities` row.
    pub no_entities: i64,
    /// Emails with entities but no `triage_results` row.
    pub no_triage: i64,
}

impl UnprocessedCounts {
    pub fn total(&self) -> i64 {
        self.no_entities + self.no_triage
    }

    /// True when any single stage exceeds the threshold.
    pub fn any_above(&self, threshold: i64) -> bool {
        self.no_entities > threshold || self.no_triage > threshold
    }
}

/// An escalated record still waiting on a reviewer.
#[derive(Debug, Clone, Serialize)]
pub struct PendingHighRisk {
    pub email_id: String,
    pub subject: String,
    pub claim_number: Option<String>,
    pub priority_level: String,
    pub pending_since: DateTime<Utc>,
}

/// Backend-agnostic database trait for the triage pipeline.
#[async_trait]
pub trait Database: Send + Sync {
    /// Whether an email with this Message-ID was already ingested.
    async fn email_seen(&self, message_id: &str) -> Result<bool, DatabaseError>;

    /// Insert the email row; returns the generated row id.
    async fn insert_email(&self, email: &ClaimEmail) -> Result<String, DatabaseError>;

    /// Insert the extracted-entity row for an email.
    async fn insert_entities(
        &self,
        email_id: &str,
        record: &TriageRecord,
    ) -> Result<(), DatabaseError>;

    /// Insert the triage verdict for an email.
    async fn insert_triage(
        &self,
        email_id: &str,
        record: &TriageRecord,
    ) -> Result<(), DatabaseError>;

    /// Insert attachment rows for an email.
    async fn insert_attachments(
        &self,
        email_id: &str,
        attachments: &[AttachmentInfo],
    ) -> Result<(), DatabaseError>;

    /// Append one audit-trail entry.
    async fn log_step(&self, entry: &StepLog<'_>) -> Result<(), DatabaseError>;

    /// Look up an email by Message-ID.
    async fn get_email(&self, message_id: &str) -> Result<Option<StoredEmail>, DatabaseError>;

    /// Entity row for an email, if extraction ran.
    async fn get_entities(&self, email_id: &str)
    -> Result<Option<StoredEntities>, DatabaseError>;

    /// Triage row for an email, if triage ran.
    async fn get_triage(&self, email_id: &str) -> Result<Option<StoredTriage>, DatabaseError>;

    /// Failed steps since the cutoff, grouped by pipeline/step/error.
    async fn recent_failures(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<ProcessingFailure>, DatabaseError>;

    /// Emails older than the cutoff that never finished processing.
    async fn unprocessed_counts(
        &self,
        older_than: DateTime<Utc>,
    ) -> Result<UnprocessedCounts, DatabaseError>;

    /// Escalated records unreviewed since before the cutoff, oldest first.
    async fn unreviewed_high_risk(
        &self,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<PendingHighRisk>, DatabaseError>;

    /// Record a reviewer sign-off on an escalated email.
    async fn mark_triage_reviewed(
        &self,
        email_id: &str,
        reviewer: &str,
    ) -> Result<(), DatabaseError>;

    /// Delete emails (and their dependent rows) older than `keep_days`.
    /// Returns the number of emails removed.
    async fn prune_emails(&self, keep_days: u32) -> Result<usize, DatabaseError>;
}
