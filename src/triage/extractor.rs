//! Regex-driven entity extraction over claim email text.
//!
//! Patterns are compiled once, up front, from the loaded [`TriageConfig`];
//! a pattern that does not compile aborts construction instead of silently
//! matching nothing later. Extraction itself is infallible.

use std::fmt;

use regex::Regex;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::error::ConfigError;
use crate::triage::config::TriageConfig;

/// Entity name → extracted matches, in configuration declaration order.
///
/// Every configured entity is present, including those with no matches.
/// Serializes as a JSON/YAML mapping for persistence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractionResult(Vec<(String, Vec<String>)>);

impl ExtractionResult {
    /// Build a result from (entity, matches) pairs, preserving order.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (String, Vec<String>)>) -> Self {
        Self(pairs.into_iter().collect())
    }

    pub fn get(&self, entity: &str) -> Option<&[String]> {
        self.0
            .iter()
            .find(|(name, _)| name == entity)
            .map(|(_, matches)| matches.as_slice())
    }

    /// First match for an entity, if any.
    pub fn first(&self, entity: &str) -> Option<&str> {
        self.get(entity).and_then(|m| m.first()).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(name, m)| (name.as_str(), m.as_slice()))
    }

    /// Number of entities with at least one match.
    pub fn matched_entities(&self) -> usize {
        self.0.iter().filter(|(_, m)| !m.is_empty()).count()
    }

    /// Total match count across all entities.
    pub fn total_matches(&self) -> usize {
        self.0.iter().map(|(_, m)| m.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|(_, m)| m.is_empty())
    }
}

impl Serialize for ExtractionResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (entity, matches) in &self.0 {
            map.serialize_entry(entity, matches)?;
        }
        map.end()
    }
}

struct CompiledEntity {
    name: String,
    patterns: Vec<Regex>,
}

/// Applies configured regex patterns to raw email text.
pub struct PatternExtractor {
    entities: Vec<CompiledEntity>,
}

impl PatternExtractor {
    /// Compile every configured pattern, in declaration order.
    ///
    /// Fails on the first malformed pattern so broken configuration is
    /// caught at startup rather than at triage time.
    pub fn new(config: &TriageConfig) -> Result<Self, ConfigError> {
        let mut entities = Vec::new();
        for (name, def) in config.entity_extraction.entities.iter() {
            let mut patterns = Vec::with_capacity(def.patterns.len());
            for pattern in &def.patterns {
                let compiled = Regex::new(pattern).map_err(|e| ConfigError::InvalidPattern {
                    entity: name.to_string(),
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                })?;
                patterns.push(compiled);
            }
            entities.push(CompiledEntity {
                name: name.to_string(),
                patterns,
            });
        }
        Ok(Self { entities })
    }

    /// All matches for one entity, in pattern order then text order.
    ///
    /// A pattern with a capture group yields the group text per match,
    /// otherwise the full match. Duplicates are kept; an entity name not
    /// in the configuration yields no matches.
    pub fn extract(&self, text: &str, entity: &str) -> Vec<String> {
        let Some(compiled) = self.entities.iter().find(|e| e.name == entity) else {
            return Vec::new();
        };
        let mut matches = Vec::new();
        for pattern in &compiled.patterns {
            collect_matches(pattern, text, &mut matches);
        }
        matches
    }

    /// Run every configured entity against the text.
    pub fn extract_all(&self, text: &str) -> ExtractionResult {
        let entries = self
            .entities
            .iter()
            .map(|compiled| {
                let mut matches = Vec::new();
                for pattern in &compiled.patterns {
                    collect_matches(pattern, text, &mut matches);
                }
                (compiled.name.clone(), matches)
            })
            .collect();
        ExtractionResult(entries)
    }

    /// Configured entity names, in declaration order.
    pub fn entity_names(&self) -> impl Iterator<Item = &str> {
        self.entities.iter().map(|e| e.name.as_str())
    }
}

impl fmt::Debug for PatternExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PatternExtractor")
            .field("entities", &self.entities.len())
            .finish()
    }
}

fn collect_matches(pattern: &Regex, text: &str, out: &mut Vec<String>) {
    // captures_len counts the implicit whole-match group, so > 1 means the
    // pattern declares its own capture group and that group is the match.
    if pattern.captures_len() > 1 {
        for caps in pattern.captures_iter(text) {
            let captured = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            out.push(captured.to_string());
        }
    } else {
        for m in pattern.find_iter(text) {
            out.push(m.as_str().to_string());
        }
    }
}
