//! Analysis record
//!
//! The JSON shape matches the `analyses` table columns: `key_terms` is an
//! object wrapping a `terms` array and `citation_analysis` wraps a
//! `references` array. Every content field may be absent on read.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// A stored analysis row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub id: Uuid,
    pub paper_id: Uuid,
    #[serde(flatten)]
    pub content: AnalysisContent,
    pub generated_at: DateTime<Utc>,
}

impl Analysis {
    /// Stamp freshly generated content with an id and generation time
    pub fn new(paper_id: Uuid, content: AnalysisContent) -> Self {
        Self {
            id: Uuid::new_v4(),
            paper_id,
            content,
            generated_at: Utc::now(),
        }
    }
}

/// The generated breakdown of a paper
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisContent {
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub key_findings: Option<Vec<String>>,
    #[serde(default)]
    pub methodology_notes: Option<String>,
    #[serde(default)]
    pub section_summaries: Option<SectionSummaries>,
    #[serde(default)]
    pub key_terms: Option<KeyTerms>,
    #[serde(default)]
    pub citation_analysis: Option<CitationAnalysis>,
}

/// Section name to section summary, in document order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SectionSummaries(Vec<(String, String)>);

impl SectionSummaries {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Insert or replace a section, keeping first-insertion order
    pub fn insert(&mut self, name: impl Into<String>, summary: impl Into<String>) {
        let name = name.into();
        let summary = summary.into();
        match self.0.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = summary,
            None => self.0.push((name, summary)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, s)| s.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, s)| (n.as_str(), s.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for SectionSummaries {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut sections = SectionSummaries::new();
        for (name, summary) in iter {
            sections.insert(name, summary);
        }
        sections
    }
}

impl Serialize for SectionSummaries {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, summary) in &self.0 {
            map.serialize_entry(name, summary)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for SectionSummaries {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // serde_json is built with preserve_order, so the map keeps column order
        let map = Map::<String, Value>::deserialize(deserializer)?;
        Ok(map
            .into_iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| (k, value_to_text(v)))
            .collect())
    }
}

/// Wrapper object stored in the `key_terms` column
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeyTerms {
    #[serde(default)]
    pub terms: Option<Vec<KeyTerm>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyTerm {
    pub term: String,
    pub definition: String,
}

/// Wrapper object stored in the `citation_analysis` column
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CitationAnalysis {
    #[serde(default)]
    pub references: Option<Vec<Reference>>,
}

/// A cited work; year and count are free text ("2017", "45000+")
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub title: String,
    #[serde(default)]
    pub authors: String,
    #[serde(default, deserialize_with = "text_or_number")]
    pub year: String,
    #[serde(default, deserialize_with = "text_or_number")]
    pub citations: String,
}

fn value_to_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn text_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(value_to_text(Value::deserialize(deserializer)?))
}
