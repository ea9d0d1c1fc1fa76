//! Keyword classification of claim emails.
//!
//! First-match-wins over the configured label tables: labels are tried in
//! declaration order, keywords within a label in listed order, and the
//! first case-insensitive substring hit decides. Declaration order is the
//! priority ranking, so `urgent` listed before `high` outranks it even
//! when both match.

use serde::Serialize;

use crate::triage::config::{KeywordTable, TriageConfig};

/// Label applied when no priority keyword matches.
pub const FALLBACK_PRIORITY: &str = "low";
/// Label applied when no claim-type keyword matches.
pub const FALLBACK_CLAIM_TYPE: &str = "other";
/// Confidence for a keyword hit.
pub const MATCH_CONFIDENCE: f64 = 1.0;
/// Confidence for the fallback label.
pub const FALLBACK_CONFIDENCE: f64 = 0.5;

/// A classification label with its rule confidence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredLabel {
    pub label: String,
    pub confidence: f64,
}

impl ScoredLabel {
    fn matched(label: &str) -> Self {
        Self {
            label: label.to_string(),
            confidence: MATCH_CONFIDENCE,
        }
    }

    fn fallback(label: &str) -> Self {
        Self {
            label: label.to_string(),
            confidence: FALLBACK_CONFIDENCE,
        }
    }
}

/// Combined verdict for one email.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TriageDecision {
    pub priority: ScoredLabel,
    pub claim_type: ScoredLabel,
    pub high_risk: bool,
}

struct LabeledKeywords {
    label: String,
    // Lowercased at construction; matching lowercases the text instead.
    keywords: Vec<String>,
}

fn lower_table(table: &KeywordTable) -> Vec<LabeledKeywords> {
    table
        .iter()
        .map(|(label, keywords)| LabeledKeywords {
            label: label.to_string(),
            keywords: keywords.iter().map(|k| k.to_lowercase()).collect(),
        })
        .collect()
}

/// Applies the configured keyword tables to raw email text.
pub struct RuleClassifier {
    priority_levels: Vec<LabeledKeywords>,
    claim_types: Vec<LabeledKeywords>,
    high_risk_indicators: Vec<String>,
}

impl RuleClassifier {
    pub fn new(config: &TriageConfig) -> Self {
        Self {
            priority_levels: lower_table(&config.classification.priority_levels),
            claim_types: lower_table(&config.classification.claim_types),
            high_risk_indicators: config
                .triage_rules
                .high_risk_indicators
                .iter()
                .map(|k| k.to_lowercase())
                .collect(),
        }
    }

    /// First matching priority label, or `low` at reduced confidence.
    pub fn classify_priority(&self, text: &str) -> ScoredLabel {
        first_match(&self.priority_levels, &text.to_lowercase(), FALLBACK_PRIORITY)
    }

    /// First matching claim-type label, or `other` at reduced confidence.
    pub fn classify_claim_type(&self, text: &str) -> ScoredLabel {
        first_match(&self.claim_types, &text.to_lowercase(), FALLBACK_CLAIM_TYPE)
    }

    /// True when any configured indicator appears in the text. An empty
    /// indicator list never flags anything.
    pub fn is_high_risk(&self, text: &str) -> bool {
        let lowered = text.to_lowercase();
        self.high_risk_indicators
            .iter()
            .any(|indicator| lowered.contains(indicator.as_str()))
    }

    /// Run all three classifications over one text.
    pub fn classify(&self, text: &str) -> TriageDecision {
        let lowered = text.to_lowercase();
        TriageDecision {
            priority: first_match(&self.priority_levels, &lowered, FALLBACK_PRIORITY),
            claim_type: first_match(&self.claim_types, &lowered, FALLBACK_CLAIM_TYPE),
            high_risk: self
                .high_risk_indicators
                .iter()
                .any(|indicator| lowered.contains(indicator.as_str())),
        }
    }
}

fn first_match(table: &[LabeledKeywords], lowered: &str, fallback: &str) -> ScoredLabel {
    for entry in table {
        for keyword in &entry.keywords {
            if lowered.contains(keyword.as_str()) {
                return ScoredLabel::matched(&entry.label);
            }
        }
    }
    ScoredLabel::fallback(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::triage::config::TriageConfig;

    fn classifier_from(raw: &str) -> RuleClassifier {
        RuleClassifier::new(&TriageConfig::from_yaml(raw).unwrap())
    }

    const TABLES: &str = r#"
classification:
  priority_levels:
    urgent: ["urgent", "emergency"]
    high: ["injury", "hospital"]
    medium: ["damage"]
  claim_types:
    auto: ["vehicle", "car"]
    property: ["home", "house"]
triage_rules:
  high_risk_indicators: ["attorney", "lawsuit", "fatality"]
"#;

    #[test]
    fn earlier_label_wins_when_several_match() {
        let classifier = classifier_from(TABLES);
        // "emergency" (urgent) and "injury" (high) both appear; urgent is
        // declared first and wins.
        let got = classifier.classify_priority("Emergency: head injury reported on site");
        assert_eq!(got.label, "urgent");
        assert_eq!(got.confidence, 1.0);
    }

    #[test]
    fn declaration_order_decides_not_label_name() {
        let classifier = classifier_from(
            r#"
classification:
  priority_levels:
    medium: ["damage"]
    urgent: ["urgent"]
"#,
        );
        // Both keywords present; medium is declared first so it wins even
        // though urgent would seem more severe.
        let got = classifier.classify_priority("urgent hail damage");
        assert_eq!(got.label, "medium");
    }

    #[test]
    fn keyword_matching_is_case_insensitive() {
        let classifier = classifier_from(TABLES);
        assert_eq!(classifier.classify_priority("URGENT!!").label, "urgent");
        assert_eq!(classifier.classify_claim_type("VEHICLE recovered").label, "auto");
    }

    #[test]
    fn keywords_match_as_substrings() {
        let classifier = classifier_from(TABLES);
        // "urgently" contains "urgent"; matching is substring, not word.
        assert_eq!(classifier.classify_priority("please respond urgently").label, "urgent");
    }

    #[test]
    fn claim_type_matches_first_table_entry() {
        let classifier = classifier_from(TABLES);
        let got = classifier.classify_claim_type("Vehicle collision on Highway 101");
        assert_eq!(got.label, "auto");
        assert!(got.confidence > 0.0);
    }

    #[test]
    fn unmatched_text_falls_back_at_half_confidence() {
        let classifier = classifier_from(TABLES);
        let priority = classifier.classify_priority("general correspondence");
        assert_eq!(priority, ScoredLabel { label: "low".into(), confidence: 0.5 });
        let claim_type = classifier.classify_claim_type("general correspondence");
        assert_eq!(claim_type, ScoredLabel { label: "other".into(), confidence: 0.5 });
    }

    #[test]
    fn empty_text_falls_back_everywhere() {
        let classifier = classifier_from(TABLES);
        assert_eq!(classifier.classify_priority("").label, "low");
        assert_eq!(classifier.classify_claim_type("").label, "other");
        assert!(!classifier.is_high_risk(""));
    }

    #[test]
    fn empty_tables_fall_back() {
        let classifier = classifier_from("{}");
        let got = classifier.classify_priority("urgent emergency injury");
        assert_eq!(got, ScoredLabel { label: "low".into(), confidence: 0.5 });
        assert_eq!(classifier.classify_claim_type("vehicle").label, "other");
    }

    #[test]
    fn high_risk_requires_a_configured_indicator() {
        let classifier = classifier_from(TABLES);
        assert!(classifier.is_high_risk("Our ATTORNEY will be in touch"));
        assert!(classifier.is_high_risk("threatening a lawsuit over the denial"));
        assert!(!classifier.is_high_risk("routine glass replacement"));
    }

    #[test]
    fn no_indicators_means_never_high_risk() {
        let classifier = classifier_from("{}");
        assert!(!classifier.is_high_risk("attorney lawsuit fatality"));
    }

    #[test]
    fn combined_decision_matches_individual_calls() {
        let classifier = classifier_from(TABLES);
        let text = "URGENT: vehicle fire, attorney retained";
        let decision = classifier.classify(text);
        assert_eq!(decision.priority, classifier.classify_priority(text));
        assert_eq!(decision.claim_type, classifier.classify_claim_type(text));
        assert_eq!(decision.high_risk, classifier.is_high_risk(text));
        assert!(decision.high_risk);
    }
}
