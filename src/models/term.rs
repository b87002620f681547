use serde::{Deserialize, Serialize};
use std::{collections::HashSet, fmt::Display};

/// A non-empty, trimmed interest term surfaced by profile extraction
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InterestTerm(String);

impl InterestTerm {
    /// Trims the input; returns `None` when nothing is left
    pub fn new(raw: impl AsRef<str>) -> Option<Self> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Builds a request-scoped term list: trimmed, empties dropped,
    /// duplicates (case-sensitive) dropped keeping the first occurrence.
    pub fn unique<I, S>(raw: I) -> Vec<InterestTerm>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        raw.into_iter()
            .filter_map(InterestTerm::new)
            .filter(|term| seen.insert(term.clone()))
            .collect()
    }

    /// Splits a comma-separated query string into unique terms
    pub fn parse_list(csv: &str) -> Vec<InterestTerm> {
        Self::unique(csv.split(','))
    }
}

impl Display for InterestTerm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for InterestTerm {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        InterestTerm::new(&value).ok_or_else(|| "Interest term must not be blank".to_string())
    }
}

impl From<InterestTerm> for String {
    fn from(term: InterestTerm) -> Self {
        term.0
    }
}

/// A canonical entity identifier resolved from an interest term
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedEntity {
    pub id: String,
    pub source_term: InterestTerm,
}

/// A single search match as returned by the search service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityMatch {
    pub entity_id: String,
    #[serde(default)]
    pub name: Option<String>,
}
