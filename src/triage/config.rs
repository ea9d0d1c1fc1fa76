//! Declarative triage configuration — entity patterns and keyword tables.
//!
//! Loaded once at startup from a YAML (or JSON) document and passed by
//! reference into the extractor and classifier. Declaration order in the
//! keyword tables is significant: it doubles as the priority ranking for
//! first-match-wins classification, so the tables are kept as ordered
//! association lists rather than hash maps.

use std::fmt;
use std::marker::PhantomData;
use std::path::Path;

use regex::Regex;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ConfigError;
use crate::triage::extractor::ExtractionResult;

// ── Ordered table ───────────────────────────────────────────────────

/// A mapping that preserves declaration order exactly.
///
/// Serde's default map containers reorder keys; this table keeps the
/// configuration author's ordering, which first-match-wins depends on.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderedTable<V>(Vec<(String, V)>);

/// Label → keyword list, in declaration order.
pub type KeywordTable = OrderedTable<Vec<String>>;

impl<V> OrderedTable<V> {
    /// Build a table from (key, value) pairs, preserving their order.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (String, V)>) -> Self {
        Self(pairs.into_iter().collect())
    }

    /// Look up a value by key (linear scan — tables are small).
    pub fn get(&self, key: &str) -> Option<&V> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Iterate entries in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Keys in declaration order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<V> Default for OrderedTable<V> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<'de, V: Deserialize<'de>> Deserialize<'de> for OrderedTable<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TableVisitor<V>(PhantomData<V>);

        impl<'de, V: Deserialize<'de>> Visitor<'de> for TableVisitor<V> {
            type Value = OrderedTable<V>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a mapping")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((key, value)) = map.next_entry::<String, V>()? {
                    entries.push((key, value));
                }
                Ok(OrderedTable(entries))
            }
        }

        deserializer.deserialize_map(TableVisitor(PhantomData))
    }
}

impl<V: Serialize> Serialize for OrderedTable<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, value) in &self.0 {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

// ── Configuration sections ──────────────────────────────────────────

/// Pattern set for one named entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityPatterns {
    /// Regex patterns, applied in order. At most one capture group each;
    /// a pattern with a capture group yields the group text, otherwise the
    /// full match.
    pub patterns: Vec<String>,
    /// Informational flag: downstream review queues care about entities
    /// declared required but never extracted. Extraction itself does not
    /// enforce it.
    #[serde(default)]
    pub required: bool,
}

/// `entity_extraction` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityExtraction {
    #[serde(default)]
    pub entities: OrderedTable<EntityPatterns>,
}

/// `classification` section — ordered label → keywords tables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    #[serde(default)]
    pub priority_levels: KeywordTable,
    #[serde(default)]
    pub claim_types: KeywordTable,
}

/// `triage_rules` section — flat, unordered escalation keywords.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TriageRules {
    #[serde(default)]
    pub high_risk_indicators: Vec<String>,
}

/// Full triage configuration document.
///
/// Every section is optional: a missing section degrades to empty tables,
/// which the extractor and classifier resolve to empty/default results.
/// A malformed regex, by contrast, fails the load.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TriageConfig {
    #[serde(default)]
    pub entity_extraction: EntityExtraction,
    #[serde(default)]
    pub classification: Classification,
    #[serde(default)]
    pub triage_rules: TriageRules,
}

impl TriageConfig {
    /// Load and validate a configuration file.
    ///
    /// YAML is a superset of JSON, so `.yaml` and `.json` documents both
    /// parse through the same path.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml(&raw)
    }

    /// Parse and validate a configuration document.
    pub fn from_yaml(raw: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_yaml::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Compile every configured pattern, failing fast on the first broken
    /// one. A regex that does not compile must never degrade to "no
    /// matches" at runtime.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (entity, def) in self.entity_extraction.entities.iter() {
            for pattern in &def.patterns {
                Regex::new(pattern).map_err(|e| ConfigError::InvalidPattern {
                    entity: entity.to_string(),
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                })?;
            }
        }
        Ok(())
    }

    /// Required entities with no extracted matches.
    ///
    /// Reported for manual review; never enforced as a rejection.
    pub fn missing_required(&self, extracted: &ExtractionResult) -> Vec<String> {
        self.entity_extraction
            .entities
            .iter()
            .filter(|(name, def)| {
                def.required && extracted.get(name).is_none_or(|m| m.is_empty())
            })
            .map(|(name, _)| name.to_string())
            .collect()
    }

    /// Built-in configuration for claims inboxes.
    ///
    /// Used when no configuration file is supplied. Category order matters:
    /// urgent outranks high outranks medium outranks low, and the more
    /// specific claim types come before the generic ones.
    pub fn default_rules() -> Self {
        let entities = OrderedTable::from_pairs([
            (
                "claim_number".to_string(),
                EntityPatterns {
                    patterns: vec![r"CLAIM[\s#:-]*([A-Z0-9]{6,12})".to_string()],
                    required: true,
                },
            ),
            (
                "policy_number".to_string(),
                EntityPatterns {
                    patterns: vec![r"POLICY[\s#:-]*([A-Z0-9]{8,15})".to_string()],
                    required: true,
                },
            ),
            (
                "insured_name".to_string(),
                EntityPatterns {
                    patterns: vec![
                        r"(?i)insured(?:\s+name)?\s*[:\-]\s*([A-Z][A-Za-z'\-]+(?:\s+[A-Z][A-Za-z'\-]+)+)"
                            .to_string(),
                    ],
                    required: false,
                },
            ),
            (
                "date_of_loss".to_string(),
                EntityPatterns {
                    patterns: vec![
                        r"\b\d{1,2}[/-]\d{1,2}[/-]\d{2,4}\b".to_string(),
                        r"\b\d{4}[/-]\d{1,2}[/-]\d{1,2}\b".to_string(),
                        r"(?i)\b(?:Jan|Feb|Mar|Apr|May|Jun|Jul|Aug|Sep|Oct|Nov|Dec)[a-z]*\s+\d{1,2},?\s+\d{4}\b"
                            .to_string(),
                    ],
                    required: false,
                },
            ),
            (
                "claim_amount".to_string(),
                EntityPatterns {
                    patterns: vec![r"\$\s*[\d,]+\.?\d{0,2}".to_string()],
                    required: false,
                },
            ),
            (
                "phone_numbers".to_string(),
                EntityPatterns {
                    patterns: vec![
                        r"(?:\+?1\s*)?\(\d{3}\)[\s.-]?\d{3}[\s.-]?\d{4}".to_string(),
                        r"\b\d{3}[-.]?\d{3}[-.]?\d{4}\b".to_string(),
                    ],
                    required: false,
                },
            ),
            (
                "email_addresses".to_string(),
                EntityPatterns {
                    patterns: vec![
                        r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b".to_string(),
                    ],
                    required: false,
                },
            ),
        ]);

        let priority_levels = OrderedTable::from_pairs([
            (
                "urgent".to_string(),
                keywords(&["urgent", "emergency", "immediate", "asap"]),
            ),
            (
                "high".to_string(),
                keywords(&["injury", "hospital", "injured", "ambulance"]),
            ),
            (
                "medium".to_string(),
                keywords(&["damage", "accident", "repair"]),
            ),
            ("low".to_string(), keywords(&["inquiry", "question", "status"])),
        ]);

        let claim_types = OrderedTable::from_pairs([
            (
                "auto".to_string(),
                keywords(&["vehicle", "car", "collision", "windshield"]),
            ),
            (
                "property".to_string(),
                keywords(&["home", "house", "fire", "roof", "flood"]),
            ),
            (
                "medical".to_string(),
                keywords(&["medical", "treatment", "physician", "diagnosis"]),
            ),
            (
                "liability".to_string(),
                keywords(&["liability", "third party", "negligence"]),
            ),
        ]);

        let high_risk_indicators = keywords(&[
            "attorney",
            "lawyer",
            "lawsuit",
            "litigation",
            "fatality",
            "death",
            "total loss",
            "fraud",
        ]);

        Self {
            entity_extraction: EntityExtraction {
                entities,
            },
            classification: Classification {
                priority_levels,
                claim_types,
            },
            triage_rules: TriageRules {
                high_risk_indicators,
            },
        }
    }
}

fn keywords(words: &[&str]) -> Vec<String> {
    words.iter().map(|w| w.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yaml_keyword_tables_preserve_declaration_order() {
        // Labels deliberately not in alphabetical order.
        let raw = r#"
classification:
  priority_levels:
    urgent: ["urgent", "emergency"]
    high: ["injury"]
    medium: ["damage"]
    low: ["inquiry"]
"#;
        let config = TriageConfig::from_yaml(raw).unwrap();
        let labels: Vec<&str> = config.classification.priority_levels.keys().collect();
        assert_eq!(labels, vec!["urgent", "high", "medium", "low"]);
    }

    #[test]
    fn json_document_parses_through_yaml_path() {
        let raw = r#"{
            "classification": {
                "claim_types": {
                    "auto": ["vehicle", "car"],
                    "property": ["home"]
                }
            }
        }"#;
        let config = TriageConfig::from_yaml(raw).unwrap();
        let labels: Vec<&str> = config.classification.claim_types.keys().collect();
        assert_eq!(labels, vec!["auto", "property"]);
    }

    #[test]
    fn entity_sections_parse_with_required_flag() {
        let raw = r#"
entity_extraction:
  entities:
    claim_number:
      patterns: ["CLAIM[\\s#:-]*([A-Z0-9]{6,12})"]
      required: true
    claim_amount:
      patterns: ["\\$\\s*[\\d,]+"]
"#;
        let config = TriageConfig::from_yaml(raw).unwrap();
        let entities = &config.entity_extraction.entities;
        assert_eq!(entities.len(), 2);
        assert!(entities.get("claim_number").unwrap().required);
        // required defaults to false when omitted
        assert!(!entities.get("claim_amount").unwrap().required);
    }

    #[test]
    fn malformed_pattern_fails_the_load() {
        let raw = r#"
entity_extraction:
  entities:
    claim_number:
      patterns: ["CLAIM[\\s#:-*([A-Z0-9]{6,12})"]
"#;
        let err = TriageConfig::from_yaml(raw).unwrap_err();
        match err {
            ConfigError::InvalidPattern { entity, .. } => {
                assert_eq!(entity, "claim_number");
            }
            other => panic!("expected InvalidPattern, got {other:?}"),
        }
    }

    #[test]
    fn missing_sections_default_to_empty() {
        let config = TriageConfig::from_yaml("{}").unwrap();
        assert!(config.entity_extraction.entities.is_empty());
        assert!(config.classification.priority_levels.is_empty());
        assert!(config.classification.claim_types.is_empty());
        assert!(config.triage_rules.high_risk_indicators.is_empty());
    }

    #[test]
    fn ordered_table_lookup_and_iteration() {
        let table = OrderedTable::from_pairs([
            ("b".to_string(), 2),
            ("a".to_string(), 1),
        ]);
        assert_eq!(table.get("a"), Some(&1));
        assert_eq!(table.get("missing"), None);
        let keys: Vec<&str> = table.keys().collect();
        assert_eq!(keys, vec!["b", "a"]);
    }

    #[test]
    fn ordered_table_serializes_in_order() {
        let table = OrderedTable::from_pairs([
            ("urgent".to_string(), vec!["a".to_string()]),
            ("high".to_string(), vec!["b".to_string()]),
        ]);
        let yaml = serde_yaml::to_string(&table).unwrap();
        let urgent_pos = yaml.find("urgent").unwrap();
        let high_pos = yaml.find("high").unwrap();
        assert!(urgent_pos < high_pos);
    }

    #[test]
    fn default_rules_validate() {
        let config = TriageConfig::default_rules();
        config.validate().unwrap();
        assert!(config.entity_extraction.entities.get("claim_number").is_some());
        assert_eq!(
            config.classification.priority_levels.keys().next(),
            Some("urgent")
        );
    }
}
