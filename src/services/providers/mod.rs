//! External collaborators
//!
//! Every service the pipeline talks to sits behind a trait so the pipeline can
//! be driven without a network. Each trait has one `reqwest` implementation
//! in this module tree.
use serde_json::Value;

use crate::{
    error::AppResult,
    models::{
        EntityMatch, ExtractedProfile, InterestTerm, MatchResult, RecommendationRecord, SeedMatch,
    },
};

pub mod extraction;
pub mod matching;
pub mod qloo;

pub use extraction::HttpProfileExtractor;
pub use matching::VectorSearchMatcher;
pub use qloo::QlooClient;

/// Free-text → canonical entity search
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait EntitySearch: Send + Sync {
    /// Returns the top matches for one free-text query, in upstream relevance order
    async fn search(&self, query: &str) -> AppResult<Vec<EntityMatch>>;
}

/// Recommendation insights for one category's signal payload
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait InsightsApi: Send + Sync {
    /// Posts a request body and returns the raw JSON response.
    ///
    /// Shape normalisation is the caller's job; the upstream response varies.
    async fn insights(&self, body: &Value) -> AppResult<Value>;
}

/// Downstream product matching
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ProductMatcher: Send + Sync {
    /// Returns, per input record, the matched products
    async fn match_batch(
        &self,
        records: &[RecommendationRecord],
        top_k: usize,
    ) -> AppResult<Vec<MatchResult>>;

    /// Matches bare interest terms, before any insights are known
    async fn match_seed_terms(
        &self,
        terms: &[InterestTerm],
        top_k: usize,
    ) -> AppResult<Vec<SeedMatch>>;
}

/// Text → structured profile (consumed as a black box)
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ProfileExtractor: Send + Sync {
    async fn extract(&self, text: &str) -> AppResult<ExtractedProfile>;
}
