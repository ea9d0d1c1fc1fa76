//! libSQL backend — async `Database` trait implementation.
//!
//! Supports local file and in-memory databases. One connection is reused
//! for all operations; `libsql::Connection` is `Send + Sync` and safe for
//! concurrent async use.

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use rust_decimal::Decimal;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::ingest::attachment::AttachmentInfo;
use crate::ingest::email::ClaimEmail;
use crate::pipeline::record::TriageRecord;
use crate::store::migrations;
use crate::store::traits::{
    Database, PendingHighRisk, ProcessingFailure, StepLog, StoredEmail, StoredEntities,
    StoredTriage, UnprocessedCounts,
};

/// How entity rows written by this backend were produced.
const EXTRACTION_METHOD: &str = "patterns";

/// libSQL database backend.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Open(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Open(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Open(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        migrations::run_migrations(backend.conn()).await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Open(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Open(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        migrations::run_migrations(backend.conn()).await?;
        Ok(backend)
    }

    /// Get the connection.
    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn parse_optional_datetime(s: &Option<String>) -> Option<DateTime<Utc>> {
    s.as_ref().map(|s| parse_datetime(s))
}

/// Convert `Option<&str>` to libsql Value.
fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

/// Convert `Option<String>` to libsql Value.
fn opt_text_owned(s: Option<String>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s),
        None => libsql::Value::Null,
    }
}

/// Serialize into the JSON TEXT columns.
fn to_json<T: serde::Serialize>(value: &T) -> Result<String, DatabaseError> {
    serde_json::to_string(value).map_err(|e| DatabaseError::Serialization(e.to_string()))
}

/// Parse a JSON string-list column; malformed data degrades to empty.
fn parse_json_list(s: &str) -> Vec<String> {
    serde_json::from_str(s).unwrap_or_default()
}

// ── Row mappers ─────────────────────────────────────────────────────

const EMAIL_COLUMNS: &str =
    "id, message_id, subject, sender, has_attachments, attachment_count, source_name, created_at";

const ENTITY_COLUMNS: &str = "email_id, claim_number, policy_number, insured_name, date_of_loss, \
     claim_amount, phone_numbers, email_addresses, entities_json, confidence_score, extraction_method";

const TRIAGE_COLUMNS: &str = "email_id, priority_level, claim_type, risk_level, \
     requires_escalation, triage_notes, confidence_score, reviewed_at, reviewed_by";

/// Map a libsql Row to a StoredEmail. Column order matches EMAIL_COLUMNS.
fn row_to_email(row: &libsql::Row) -> Result<StoredEmail, libsql::Error> {
    let has_attachments: i64 = row.get(4)?;
    let created_str: String = row.get(7)?;

    Ok(StoredEmail {
        id: row.get(0)?,
        message_id: row.get(1)?,
        subject: row.get(2)?,
        sender: row.get(3)?,
        has_attachments: has_attachments != 0,
        attachment_count: row.get(5)?,
        source_name: row.get(6).ok(),
        created_at: parse_datetime(&created_str),
    })
}

/// Map a libsql Row to a StoredEntities. Column order matches ENTITY_COLUMNS.
fn row_to_entities(row: &libsql::Row) -> Result<StoredEntities, libsql::Error> {
    let amount_str: Option<String> = row.get(5).ok();
    let phones_str: String = row.get(6)?;
    let emails_str: String = row.get(7)?;
    let entities_str: String = row.get(8)?;

    Ok(StoredEntities {
        email_id: row.get(0)?,
        claim_number: row.get(1).ok(),
        policy_number: row.get(2).ok(),
        insured_name: row.get(3).ok(),
        date_of_loss: row.get(4).ok(),
        claim_amount: amount_str.and_then(|s| Decimal::from_str(&s).ok()),
        phone_numbers: parse_json_list(&phones_str),
        email_addresses: parse_json_list(&emails_str),
        entities: serde_json::from_str(&entities_str)
            .unwrap_or_else(|_| serde_json::json!({})),
        confidence_score: row.get(9)?,
        extraction_method: row.get(10)?,
    })
}

/// Map a libsql Row to a StoredTriage. Column order matches TRIAGE_COLUMNS.
fn row_to_triage(row: &libsql::Row) -> Result<StoredTriage, libsql::Error> {
    let escalation: i64 = row.get(4)?;
    let reviewed_str: Option<String> = row.get(7).ok();

    Ok(StoredTriage {
        email_id: row.get(0)?,
        priority_level: row.get(1)?,
        claim_type: row.get(2)?,
        risk_level: row.get(3)?,
        requires_escalation: escalation != 0,
        triage_notes: row.get(5).ok(),
        confidence_score: row.get(6)?,
        reviewed_at: parse_optional_datetime(&reviewed_str),
        reviewed_by: row.get(8).ok(),
    })
}

fn row_to_failure(row: &libsql::Row) -> Result<ProcessingFailure, libsql::Error> {
    let latest_str: String = row.get(3)?;

    Ok(ProcessingFailure {
        pipeline: row.get(0)?,
        step: row.get(1)?,
        error: row.get(2).ok(),
        latest: parse_datetime(&latest_str),
        count: row.get(4)?,
    })
}

fn row_to_pending(row: &libsql::Row) -> Result<PendingHighRisk, libsql::Error> {
    let since_str: String = row.get(4)?;

    Ok(PendingHighRisk {
        email_id: row.get(0)?,
        subject: row.get(1)?,
        claim_number: row.get(2).ok(),
        priority_level: row.get(3)?,
        pending_since: parse_datetime(&since_str),
    })
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl Database for LibSqlBackend {
    async fn email_seen(&self, message_id: &str) -> Result<bool, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                "SELECT COUNT(*) FROM emails WHERE message_id = ?1",
                params![message_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("email_seen: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let count: i64 = row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("email_seen count: {e}")))?;
                Ok(count > 0)
            }
            Ok(None) => Ok(false),
            Err(e) => Err(DatabaseError::Query(format!("email_seen: {e}"))),
        }
    }

    async fn insert_email(&self, email: &ClaimEmail) -> Result<String, DatabaseError> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let recipients_json = to_json(&email.recipients)?;
        let conn = self.conn();
        conn.execute(
            "INSERT INTO emails (id, message_id, subject, sender, recipients, email_date,
                body_text, body_html, has_attachments, attachment_count, source_name, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                id.clone(),
                email.message_id.as_str(),
                email.subject.as_str(),
                email.sender.as_str(),
                recipients_json,
                opt_text_owned(email.date.map(|d| d.to_rfc3339())),
                email.body_text.as_str(),
                opt_text(email.body_html.as_deref()),
                email.has_attachments() as i64,
                email.attachments.len() as i64,
                email.source_name.as_str(),
                now,
            ],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("insert_email: {e}")))?;

        debug!(id = %id, message_id = %email.message_id, "Email inserted into DB");
        Ok(id)
    }

    async fn insert_entities(
        &self,
        email_id: &str,
        record: &TriageRecord,
    ) -> Result<(), DatabaseError> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let summary = &record.summary;
        let phones_json = to_json(&summary.phone_numbers)?;
        let emails_json = to_json(&summary.email_addresses)?;
        let entities_json = to_json(&record.entities)?;
        let conn = self.conn();
        conn.execute(
            "INSERT INTO extracted_entities (id, email_id, claim_number, policy_number,
                insured_name, date_of_loss, claim_amount, phone_numbers, email_addresses,
                entities_json, confidence_score, extraction_method, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                id,
                email_id,
                opt_text(summary.claim_number.as_deref()),
                opt_text(summary.policy_number.as_deref()),
                opt_text(summary.insured_name.as_deref()),
                opt_text(summary.date_of_loss.as_deref()),
                opt_text_owned(summary.claim_amount.map(|d| d.to_string())),
                phones_json,
                emails_json,
                entities_json,
                record.confidence_score,
                EXTRACTION_METHOD,
                now,
            ],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("insert_entities: {e}")))?;

        debug!(email_id = %email_id, "Extracted entities inserted into DB");
        Ok(())
    }

    async fn insert_triage(
        &self,
        email_id: &str,
        record: &TriageRecord,
    ) -> Result<(), DatabaseError> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let conn = self.conn();
        conn.execute(
            "INSERT INTO triage_results (id, email_id, priority_level, claim_type, risk_level,
                requires_escalation, triage_notes, confidence_score, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                id,
                email_id,
                record.priority_level.as_str(),
                record.claim_type.as_str(),
                record.risk_level.as_str(),
                record.requires_escalation as i64,
                opt_text(record.triage_notes.as_deref()),
                record.confidence_score,
                now,
            ],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("insert_triage: {e}")))?;

        debug!(
            email_id = %email_id,
            priority = %record.priority_level,
            escalation = record.requires_escalation,
            "Triage result inserted into DB"
        );
        Ok(())
    }

    async fn insert_attachments(
        &self,
        email_id: &str,
        attachments: &[AttachmentInfo],
    ) -> Result<(), DatabaseError> {
        let conn = self.conn();
        let now = Utc::now().to_rfc3339();
        for attachment in attachments {
            let file_size = match attachment.file_size {
                Some(s) => libsql::Value::Integer(s as i64),
                None => libsql::Value::Null,
            };
            conn.execute(
                "INSERT INTO attachments (id, email_id, filename, file_type, file_category,
                    file_size, blob_path, is_invoice, is_medical_record, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    Uuid::new_v4().to_string(),
                    email_id,
                    attachment.filename.as_str(),
                    attachment.kind.as_str(),
                    attachment.category.as_str(),
                    file_size,
                    opt_text(attachment.blob_path.as_deref()),
                    attachment.is_invoice as i64,
                    attachment.is_medical_record as i64,
                    now.as_str(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_attachments: {e}")))?;
        }

        if !attachments.is_empty() {
            debug!(
                email_id = %email_id,
                count = attachments.len(),
                "Attachments inserted into DB"
            );
        }
        Ok(())
    }

    async fn log_step(&self, entry: &StepLog<'_>) -> Result<(), DatabaseError> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO processing_log (id, pipeline_name, step_name, status, email_id,
                error_message, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                Uuid::new_v4().to_string(),
                entry.pipeline,
                entry.step,
                entry.status.as_str(),
                opt_text(entry.email_id),
                opt_text(entry.error),
                Utc::now().to_rfc3339(),
            ],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("log_step: {e}")))?;
        Ok(())
    }

    async fn get_email(&self, message_id: &str) -> Result<Option<StoredEmail>, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                &format!("SELECT {EMAIL_COLUMNS} FROM emails WHERE message_id = ?1"),
                params![message_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_email: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let email = row_to_email(&row)
                    .map_err(|e| DatabaseError::Query(format!("get_email row parse: {e}")))?;
                Ok(Some(email))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_email: {e}"))),
        }
    }

    async fn get_entities(
        &self,
        email_id: &str,
    ) -> Result<Option<StoredEntities>, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                &format!("SELECT {ENTITY_COLUMNS} FROM extracted_entities WHERE email_id = ?1"),
                params![email_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_entities: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let entities = row_to_entities(&row)
                    .map_err(|e| DatabaseError::Query(format!("get_entities row parse: {e}")))?;
                Ok(Some(entities))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_entities: {e}"))),
        }
    }

    async fn get_triage(&self, email_id: &str) -> Result<Option<StoredTriage>, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                &format!("SELECT {TRIAGE_COLUMNS} FROM triage_results WHERE email_id = ?1"),
                params![email_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_triage: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let triage = row_to_triage(&row)
                    .map_err(|e| DatabaseError::Query(format!("get_triage row parse: {e}")))?;
                Ok(Some(triage))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_triage: {e}"))),
        }
    }

    async fn recent_failures(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<ProcessingFailure>, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                "SELECT pipeline_name, step_name, error_message, MAX(created_at), COUNT(*)
                 FROM processing_log
                 WHERE status = 'failed' AND created_at >= ?1
                 GROUP BY pipeline_name, step_name, error_message
                 ORDER BY MAX(created_at) DESC",
                params![since.to_rfc3339()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("recent_failures: {e}")))?;

        let mut failures = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_failure(&row) {
                Ok(failure) => failures.push(failure),
                Err(e) => {
                    tracing::warn!("Skipping failure row: {e}");
                }
            }
        }
        Ok(failures)
    }

    async fn unprocessed_counts(
        &self,
        older_than: DateTime<Utc>,
    ) -> Result<UnprocessedCounts, DatabaseError> {
        let conn = self.conn();
        let cutoff = older_than.to_rfc3339();

        let mut rows = conn
            .query(
                "SELECT COUNT(*) FROM emails e
                 LEFT JOIN extracted_entities x ON x.email_id = e.id
                 WHERE x.id IS NULL AND e.created_at < ?1",
                params![cutoff.as_str()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("unprocessed_counts entities: {e}")))?;
        let no_entities: i64 = match rows.next().await {
            Ok(Some(row)) => row
                .get(0)
                .map_err(|e| DatabaseError::Query(format!("unprocessed_counts entities: {e}")))?,
            Ok(None) => 0,
            Err(e) => {
                return Err(DatabaseError::Query(format!(
                    "unprocessed_counts entities: {e}"
                )));
            }
        };

        let mut rows = conn
            .query(
                "SELECT COUNT(*) FROM emails e
                 JOIN extracted_entities x ON x.email_id = e.id
                 LEFT JOIN triage_results t ON t.email_id = e.id
                 WHERE t.id IS NULL AND e.created_at < ?1",
                params![cutoff.as_str()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("unprocessed_counts triage: {e}")))?;
        let no_triage: i64 = match rows.next().await {
            Ok(Some(row)) => row
                .get(0)
                .map_err(|e| DatabaseError::Query(format!("unprocessed_counts triage: {e}")))?,
            Ok(None) => 0,
            Err(e) => {
                return Err(DatabaseError::Query(format!(
                    "unprocessed_counts triage: {e}"
                )));
            }
        };

        Ok(UnprocessedCounts {
            no_entities,
            no_triage,
        })
    }

    async fn unreviewed_high_risk(
        &self,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<PendingHighRisk>, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                "SELECT e.id, e.subject, x.claim_number, t.priority_level, t.created_at
                 FROM triage_results t
                 JOIN emails e ON e.id = t.email_id
                 LEFT JOIN extracted_entities x ON x.email_id = e.id
                 WHERE t.requires_escalation = 1 AND t.reviewed_at IS NULL
                   AND t.created_at < ?1
                 ORDER BY t.created_at ASC",
                params![older_than.to_rfc3339()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("unreviewed_high_risk: {e}")))?;

        let mut pending = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_pending(&row) {
                Ok(item) => pending.push(item),
                Err(e) => {
                    tracing::warn!("Skipping high-risk row: {e}");
                }
            }
        }
        Ok(pending)
    }

    async fn mark_triage_reviewed(
        &self,
        email_id: &str,
        reviewer: &str,
    ) -> Result<(), DatabaseError> {
        let conn = self.conn();
        let now = Utc::now().to_rfc3339();
        let updated = conn
            .execute(
                "UPDATE triage_results SET reviewed_at = ?1, reviewed_by = ?2
                 WHERE email_id = ?3 AND reviewed_at IS NULL",
                params![now, reviewer, email_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("mark_triage_reviewed: {e}")))?;

        if updated == 0 {
            return Err(DatabaseError::NotFound {
                entity: "triage_result".to_string(),
                id: email_id.to_string(),
            });
        }

        info!(email_id = %email_id, reviewer = %reviewer, "Triage result marked reviewed");
        Ok(())
    }

    async fn prune_emails(&self, keep_days: u32) -> Result<usize, DatabaseError> {
        let cutoff = (Utc::now() - chrono::Duration::days(keep_days as i64)).to_rfc3339();
        let conn = self.conn();

        // Dependent rows first; the schema's cascade is not relied on.
        for table in ["extracted_entities", "triage_results", "attachments"] {
            conn.execute(
                &format!(
                    "DELETE FROM {table} WHERE email_id IN
                        (SELECT id FROM emails WHERE created_at < ?1)"
                ),
                params![cutoff.as_str()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("prune_emails {table}: {e}")))?;
        }

        let count = conn
            .execute(
                "DELETE FROM emails WHERE created_at < ?1",
                params![cutoff.as_str()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("prune_emails: {e}")))?;

        if count > 0 {
            info!(count, keep_days, "Pruned old emails from DB");
        }
        Ok(count as usize)
    }
}
