//! SMTP email alerts for on-call adjusters.
//!
//! Plain-text alert mail over SMTP with STARTTLS. Quieter than the Teams
//! channel: clean completions are not mailed, only failures and high-risk
//! claims.

use async_trait::async_trait;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use crate::error::NotifyError;
use crate::notify::Notifier;
use crate::pipeline::record::{RunStats, TriageRecord};

/// SMTP relay configuration, built from environment variables.
#[derive(Debug, Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    pub from_address: String,
    pub recipients: Vec<String>,
}

impl SmtpSettings {
    /// Build settings from environment variables.
    ///
    /// Returns `None` unless both `SMTP_SERVER` and `ALERT_RECIPIENTS` are
    /// set (email alerts disabled).
    pub fn from_env() -> Option<Self> {
        let host = std::env::var("SMTP_SERVER").ok()?;

        let recipients: Vec<String> = std::env::var("ALERT_RECIPIENTS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if recipients.is_empty() {
            return None;
        }

        let port: u16 = std::env::var("SMTP_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(587);

        let username = std::env::var("SMTP_USERNAME").unwrap_or_default();
        let password = SecretString::from(std::env::var("SMTP_PASSWORD").unwrap_or_default());
        let from_address =
            std::env::var("ALERT_FROM_ADDRESS").unwrap_or_else(|_| username.clone());

        Some(Self {
            host,
            port,
            username,
            password,
            from_address,
            recipients,
        })
    }
}

/// Email alert notifier.
pub struct SmtpAlerts {
    settings: SmtpSettings,
}

impl SmtpAlerts {
    pub fn new(settings: SmtpSettings) -> Self {
        Self { settings }
    }

    /// Deliver one alert mail. The SMTP transport is blocking, so the
    /// send runs on the blocking pool.
    async fn send(&self, subject: String, body: String) -> Result<(), NotifyError> {
        let settings = self.settings.clone();
        tokio::task::spawn_blocking(move || send_blocking(&settings, &subject, &body))
            .await
            .map_err(|e| NotifyError::Smtp(format!("SMTP task join error: {e}")))??;

        debug!("Alert email sent");
        Ok(())
    }
}

fn send_blocking(settings: &SmtpSettings, subject: &str, body: &str) -> Result<(), NotifyError> {
    let creds = Credentials::new(
        settings.username.clone(),
        settings.password.expose_secret().to_string(),
    );

    let transport = SmtpTransport::relay(&settings.host)
        .map_err(|e| NotifyError::Smtp(format!("SMTP relay error: {e}")))?
        .port(settings.port)
        .credentials(creds)
        .build();

    let mut builder = Message::builder()
        .from(settings.from_address.parse().map_err(|e| {
            NotifyError::Message(format!("Invalid from address: {e}"))
        })?)
        .subject(subject);
    for recipient in &settings.recipients {
        builder = builder.to(recipient.parse().map_err(|e| {
            NotifyError::Message(format!("Invalid recipient {recipient}: {e}"))
        })?);
    }

    let message = builder
        .body(body.to_string())
        .map_err(|e| NotifyError::Message(e.to_string()))?;

    transport
        .send(&message)
        .map_err(|e| NotifyError::Smtp(e.to_string()))?;
    Ok(())
}

#[async_trait]
impl Notifier for SmtpAlerts {
    fn name(&self) -> &str {
        "smtp"
    }

    async fn high_risk_alert(&self, record: &TriageRecord) -> Result<(), NotifyError> {
        let subject = match record.summary.claim_number.as_deref() {
            Some(claim) => format!("High-risk claim {claim} requires attention"),
            None => "High-risk claim requires attention".to_string(),
        };
        self.send(subject, high_risk_body(record)).await
    }

    async fn pipeline_completion(
        &self,
        pipeline: &str,
        stats: &RunStats,
    ) -> Result<(), NotifyError> {
        // Clean runs stay out of the inbox.
        if stats.status() != "FAILED" {
            return Ok(());
        }
        let subject = format!("{pipeline} completed with failures");
        self.send(subject, completion_body(stats)).await
    }

    async fn error_alert(&self, pipeline: &str, message: &str) -> Result<(), NotifyError> {
        let subject = format!("{pipeline} failed");
        self.send(subject, format!("Error: {message}\n")).await
    }
}

fn high_risk_body(record: &TriageRecord) -> String {
    let summary = &record.summary;
    format!(
        "A high-risk claim needs review.\n\n\
         Claim Number: {}\n\
         Policy Number: {}\n\
         Insured Name: {}\n\
         Priority: {}\n\
         Risk Level: {}\n\
         Claim Amount: {}\n\
         Subject: {}\n\
         Sender: {}\n",
        summary.claim_number.as_deref().unwrap_or("N/A"),
        summary.policy_number.as_deref().unwrap_or("N/A"),
        summary.insured_name.as_deref().unwrap_or("N/A"),
        record.priority_level,
        record.risk_level,
        record.entities.first("claim_amount").unwrap_or("N/A"),
        record.email.subject,
        record.email.sender,
    )
}

fn completion_body(stats: &RunStats) -> String {
    format!(
        "Pipeline run finished with failures.\n\n\
         Fetched: {}\n\
         Processed: {}\n\
         Failed: {}\n\
         High Risk: {}\n\
         Archived: {}\n",
        stats.fetched, stats.processed, stats.failed, stats.high_risk, stats.archived,
    )
}
