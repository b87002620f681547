use serde::{Deserialize, Serialize};

use super::{Category, InterestTerm};

/// One candidate returned by the insights service, normalised
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationRecord {
    pub name: String,
    pub affinity: f64,
    pub category: Category,
}

impl RecommendationRecord {
    /// Returns `None` unless the name is non-empty and the affinity is finite
    pub fn new(name: impl Into<String>, affinity: f64, category: Category) -> Option<Self> {
        let name = name.into();
        if name.trim().is_empty() || !affinity.is_finite() {
            return None;
        }
        Some(Self {
            name,
            affinity,
            category,
        })
    }
}

/// Records sorted by affinity descending, ties in discovery order
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct RankedList(Vec<RecommendationRecord>);

impl RankedList {
    /// Only the ranking service may establish the ordering invariant
    pub(crate) fn from_sorted(records: Vec<RecommendationRecord>) -> Self {
        Self(records)
    }

    pub fn records(&self) -> &[RecommendationRecord] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RecommendationRecord> {
        self.0.iter()
    }
}

/// Contiguous slice of a ranked list dispatched in one matching call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Batch {
    pub start_index: usize,
    pub records: Vec<RecommendationRecord>,
}

/// Number of ranked records for one category
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryCount {
    pub category: Category,
    pub count: usize,
}

/// Summary statistics over a ranked list
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub total_count: usize,
    pub per_category: Vec<CategoryCount>,
    pub message: String,
}

/// A product returned by the matching service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductMatch {
    pub id: serde_json::Value,
    pub title: String,
    #[serde(alias = "product_url")]
    pub url: String,
    #[serde(alias = "imageUrl", default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub price: Option<serde_json::Value>,
    #[serde(alias = "similarity")]
    pub similarity_score: f64,
}

/// Matches for one dispatched record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    pub recommendation: RecommendationRecord,
    pub matches: Vec<ProductMatch>,
}

/// Products matched directly against an extracted seed term, before any
/// insights call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeedMatch {
    pub term: InterestTerm,
    pub matches: Vec<ProductMatch>,
}
