//! Microsoft Teams webhook notifier.
//!
//! Posts legacy MessageCard payloads, which incoming-webhook connectors
//! still accept. Green for completions, red for failures, orange for
//! high-risk claims.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use tracing::debug;

use crate::error::NotifyError;
use crate::notify::Notifier;
use crate::pipeline::record::{RunStats, TriageRecord};

const COLOR_OK: &str = "00FF00";
const COLOR_FAILED: &str = "FF0000";
const COLOR_HIGH_RISK: &str = "FFA500";

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// Teams incoming-webhook notifier.
pub struct TeamsNotifier {
    webhook_url: SecretString,
    client: reqwest::Client,
}

impl TeamsNotifier {
    pub fn new(webhook_url: SecretString) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(WEBHOOK_TIMEOUT)
            .build()
            .map_err(|e| NotifyError::Request(e.to_string()))?;
        Ok(Self {
            webhook_url,
            client,
        })
    }

    async fn post_card(&self, card: &Value) -> Result<(), NotifyError> {
        let resp = self
            .client
            .post(self.webhook_url.expose_secret())
            .json(card)
            .send()
            .await
            .map_err(|e| NotifyError::Request(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(NotifyError::Rejected {
                status: resp.status().as_u16(),
            });
        }
        debug!("Teams notification sent");
        Ok(())
    }
}

#[async_trait]
impl Notifier for TeamsNotifier {
    fn name(&self) -> &str {
        "teams"
    }

    async fn high_risk_alert(&self, record: &TriageRecord) -> Result<(), NotifyError> {
        self.post_card(&high_risk_card(record)).await
    }

    async fn pipeline_completion(
        &self,
        pipeline: &str,
        stats: &RunStats,
    ) -> Result<(), NotifyError> {
        self.post_card(&completion_card(pipeline, stats)).await
    }

    async fn error_alert(&self, pipeline: &str, message: &str) -> Result<(), NotifyError> {
        self.post_card(&error_card(pipeline, message)).await
    }
}

// ── Card builders ───────────────────────────────────────────────────

fn message_card(color: &str, summary: &str, section: Value) -> Value {
    json!({
        "@type": "MessageCard",
        "@context": "http://schema.org/extensions",
        "themeColor": color,
        "summary": summary,
        "sections": [section],
    })
}

fn subtitle() -> String {
    Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

fn fact(name: &str, value: &str) -> Value {
    json!({ "name": name, "value": value })
}

fn completion_card(pipeline: &str, stats: &RunStats) -> Value {
    let status = stats.status();
    let color = if status == "FAILED" {
        COLOR_FAILED
    } else {
        COLOR_OK
    };
    let facts = vec![
        fact("Status", status),
        fact("Fetched", &stats.fetched.to_string()),
        fact("Processed", &stats.processed.to_string()),
        fact("Failed", &stats.failed.to_string()),
        fact("High Risk", &stats.high_risk.to_string()),
        fact("Archived", &stats.archived.to_string()),
    ];
    message_card(
        color,
        &format!("{pipeline} Completed"),
        json!({
            "activityTitle": format!("📊 {pipeline} Completed"),
            "activitySubtitle": subtitle(),
            "facts": facts,
            "markdown": true,
        }),
    )
}

fn error_card(pipeline: &str, message: &str) -> Value {
    message_card(
        COLOR_FAILED,
        &format!("{pipeline} Failed"),
        json!({
            "activityTitle": format!("🚨 {pipeline} Failed"),
            "activitySubtitle": subtitle(),
            "text": format!("**Error:** {message}"),
            "markdown": true,
        }),
    )
}

fn high_risk_card(record: &TriageRecord) -> Value {
    let summary = &record.summary;
    let facts = vec![
        fact("Claim Number", summary.claim_number.as_deref().unwrap_or("N/A")),
        fact(
            "Policy Number",
            summary.policy_number.as_deref().unwrap_or("N/A"),
        ),
        fact(
            "Insured Name",
            summary.insured_name.as_deref().unwrap_or("N/A"),
        ),
        fact("Priority", &record.priority_level),
        fact("Risk Level", &record.risk_level),
        fact(
            "Claim Amount",
            record.entities.first("claim_amount").unwrap_or("N/A"),
        ),
    ];
    message_card(
        COLOR_HIGH_RISK,
        "High-Risk Claim Detected",
        json!({
            "activityTitle": "⚠️ High-Risk Claim Requires Attention",
            "activitySubtitle": subtitle(),
            "facts": facts,
            "markdown": true,
        }),
    )
}
