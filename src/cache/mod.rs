//! Term resolution cache
//!
//! The resolver only sees the [`TermCache`] trait. Entries are keyed on the
//! exact term string and never expire; an empty entity list is a valid,
//! cached negative result.
use std::fmt::Display;

use crate::{
    error::AppResult,
    models::{InterestTerm, ResolvedEntity},
};

pub mod memory;
pub mod redis;

pub use self::memory::InMemoryTermCache;
pub use self::redis::{create_redis_client, CacheWriterHandle, RedisTermCache};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    TermSearch(String),
}

impl CacheKey {
    pub fn for_term(term: &InterestTerm) -> Self {
        CacheKey::TermSearch(term.as_str().to_string())
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheKey::TermSearch(term) => write!(f, "search:{}", term),
        }
    }
}

/// Storage for term → resolved entities
#[async_trait::async_trait]
pub trait TermCache: Send + Sync {
    async fn get(&self, key: &CacheKey) -> AppResult<Option<Vec<ResolvedEntity>>>;

    async fn put(&self, key: &CacheKey, entities: &[ResolvedEntity]) -> AppResult<()>;

    /// Backend name for logging
    fn name(&self) -> &'static str;
}
