//! Triage record assembly — the row-shaped view of one processed email.
//!
//! Extraction and classification produce raw results; this module folds
//! them into the record the store persists and the notifiers report on.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::ingest::email::ClaimEmail;
use crate::triage::classifier::TriageDecision;
use crate::triage::config::TriageConfig;
use crate::triage::extractor::ExtractionResult;

/// Risk label on escalated records.
pub const RISK_HIGH: &str = "high";
/// Risk label on everything else.
pub const RISK_STANDARD: &str = "standard";
/// Priority label that forces escalation even without risk indicators.
const ESCALATION_PRIORITY: &str = "urgent";

/// Scalar entity columns pulled out of an [`ExtractionResult`].
///
/// Single-valued entities keep their first match; phone and email lists
/// are kept whole. Everything is best-effort: absence is `None`/empty,
/// never an error.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EntitySummary {
    pub claim_number: Option<String>,
    pub policy_number: Option<String>,
    pub insured_name: Option<String>,
    pub date_of_loss: Option<String>,
    /// Parsed from the first matched amount string, commas and `$` removed.
    pub claim_amount: Option<Decimal>,
    pub phone_numbers: Vec<String>,
    pub email_addresses: Vec<String>,
}

impl EntitySummary {
    pub fn from_extraction(extracted: &ExtractionResult) -> Self {
        Self {
            claim_number: first_owned(extracted, "claim_number"),
            policy_number: first_owned(extracted, "policy_number"),
            insured_name: first_owned(extracted, "insured_name"),
            date_of_loss: first_owned(extracted, "date_of_loss"),
            claim_amount: extracted.first("claim_amount").and_then(parse_amount),
            phone_numbers: all_owned(extracted, "phone_numbers"),
            email_addresses: all_owned(extracted, "email_addresses"),
        }
    }
}

fn first_owned(extracted: &ExtractionResult, entity: &str) -> Option<String> {
    extracted.first(entity).map(str::to_string)
}

fn all_owned(extracted: &ExtractionResult, entity: &str) -> Vec<String> {
    extracted
        .get(entity)
        .map(|m| m.to_vec())
        .unwrap_or_default()
}

/// Parse a matched currency string (`$12,500.00`) into a decimal amount.
pub fn parse_amount(raw: &str) -> Option<Decimal> {
    let cleaned: String = raw
        .trim()
        .trim_start_matches('$')
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    cleaned.trim_end_matches('.').parse().ok()
}

/// One fully triaged email, ready to persist and report.
#[derive(Debug, Clone, Serialize)]
pub struct TriageRecord {
    pub email: ClaimEmail,
    /// Full entity mapping, declaration order preserved.
    pub entities: ExtractionResult,
    pub summary: EntitySummary,
    pub priority_level: String,
    pub claim_type: String,
    pub high_risk: bool,
    pub risk_level: String,
    pub requires_escalation: bool,
    /// Weakest of the two classification confidences.
    pub confidence_score: f64,
    /// Review note when required entities came up empty.
    pub triage_notes: Option<String>,
    pub processed_at: DateTime<Utc>,
}

impl TriageRecord {
    /// Fold extraction and classification results into a record.
    ///
    /// Escalation is set for high-risk emails and for `urgent` priority;
    /// required-but-missing entities are surfaced in `triage_notes` for
    /// manual review rather than rejecting the email.
    pub fn assemble(
        email: ClaimEmail,
        entities: ExtractionResult,
        decision: TriageDecision,
        config: &TriageConfig,
    ) -> Self {
        let summary = EntitySummary::from_extraction(&entities);
        let missing = config.missing_required(&entities);
        let triage_notes = if missing.is_empty() {
            None
        } else {
            Some(format!("missing required entities: {}", missing.join(", ")))
        };
        let risk_level = if decision.high_risk {
            RISK_HIGH
        } else {
            RISK_STANDARD
        };
        let requires_escalation =
            decision.high_risk || decision.priority.label == ESCALATION_PRIORITY;
        let confidence_score = decision
            .priority
            .confidence
            .min(decision.claim_type.confidence);

        Self {
            email,
            entities,
            summary,
            priority_level: decision.priority.label,
            claim_type: decision.claim_type.label,
            high_risk: decision.high_risk,
            risk_level: risk_level.to_string(),
            requires_escalation,
            confidence_score,
            triage_notes,
            processed_at: Utc::now(),
        }
    }
}

/// Counters for one ingest run, reported on completion.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunStats {
    pub fetched: usize,
    pub processed: usize,
    pub failed: usize,
    pub high_risk: usize,
    pub archived: usize,
}

impl RunStats {
    /// `SUCCESS` when every fetched email made it through.
    pub fn status(&self) -> &'static str {
        if self.failed == 0 { "SUCCESS" } else { "FAILED" }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::triage::classifier::RuleClassifier;
    use crate::triage::extractor::PatternExtractor;

    fn sample_email(body: &str) -> ClaimEmail {
        ClaimEmail::from_json(
            "m.json",
            format!(r#"{{"from": "a@b.com", "subject": "claim update", "body_text": {}}}"#,
                serde_json::to_string(body).unwrap())
            .as_bytes(),
        )
        .unwrap()
    }

    fn assemble(body: &str) -> TriageRecord {
        let config = TriageConfig::default_rules();
        let extractor = PatternExtractor::new(&config).unwrap();
        let classifier = RuleClassifier::new(&config);
        let email = sample_email(body);
        let text = email.triage_text();
        TriageRecord::assemble(
            email,
            extractor.extract_all(&text),
            classifier.classify(&text),
            &config,
        )
    }

    #[test]
    fn parse_amount_handles_currency_formats() {
        assert_eq!(parse_amount("$12,500.00"), Some(Decimal::new(1_250_000, 2)));
        assert_eq!(parse_amount("$ 500"), Some(Decimal::new(500, 0)));
        assert_eq!(parse_amount("$500."), Some(Decimal::new(500, 0)));
        assert_eq!(parse_amount("$"), None);
    }

    #[test]
    fn summary_takes_first_match_per_scalar_entity() {
        let record = assemble(
            "URGENT: CLAIM #CLM12345678 regarding POLICY: POL987654321.\n\
             Estimate $2,400.00 plus rental $300.00. Call 555-123-4567.",
        );
        assert_eq!(record.summary.claim_number.as_deref(), Some("CLM12345678"));
        assert_eq!(record.summary.policy_number.as_deref(), Some("POL987654321"));
        assert_eq!(record.summary.claim_amount, Some(Decimal::new(240_000, 2)));
        assert_eq!(record.summary.phone_numbers, vec!["555-123-4567"]);
        // Both amounts stay in the full mapping even though the summary
        // keeps the first.
        assert_eq!(record.entities.get("claim_amount").unwrap().len(), 2);
    }

    #[test]
    fn urgent_priority_forces_escalation_without_risk_indicators() {
        let record = assemble("URGENT: vehicle damage at CLAIM #CLM12345678");
        assert_eq!(record.priority_level, "urgent");
        assert!(!record.high_risk);
        assert_eq!(record.risk_level, RISK_STANDARD);
        assert!(record.requires_escalation);
    }

    #[test]
    fn high_risk_sets_risk_level_and_escalation() {
        let record = assemble("Our attorney will pursue litigation over this vehicle damage");
        assert!(record.high_risk);
        assert_eq!(record.risk_level, RISK_HIGH);
        assert!(record.requires_escalation);
    }

    #[test]
    fn routine_mail_is_not_escalated() {
        let record = assemble("Status inquiry about my windshield repair, CLAIM #CLM12345678, POLICY #POL987654321");
        assert!(!record.requires_escalation);
        assert_eq!(record.risk_level, RISK_STANDARD);
    }

    #[test]
    fn confidence_is_the_weaker_of_the_two() {
        // Priority keyword matches (1.0) but no claim-type keyword (0.5).
        let record = assemble("urgent question on CLAIM #CLM12345678, POLICY #POL987654321");
        assert_eq!(record.claim_type, "other");
        assert_eq!(record.confidence_score, 0.5);

        // Both match.
        let both = assemble("urgent vehicle damage, CLAIM #CLM12345678, POLICY #POL987654321");
        assert_eq!(both.confidence_score, 1.0);
    }

    #[test]
    fn missing_required_entities_are_noted_not_rejected() {
        let record = assemble("general damage question with no reference numbers");
        let notes = record.triage_notes.as_deref().unwrap();
        assert!(notes.contains("claim_number"));
        assert!(notes.contains("policy_number"));

        let complete = assemble("CLAIM #CLM12345678 under POLICY #POL987654321 damage");
        assert!(complete.triage_notes.is_none());
    }

    #[test]
    fn run_stats_status() {
        let mut stats = RunStats::default();
        stats.fetched = 3;
        stats.processed = 3;
        assert_eq!(stats.status(), "SUCCESS");
        stats.failed = 1;
        assert_eq!(stats.status(), "FAILED");
    }
}
