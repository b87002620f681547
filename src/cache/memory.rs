use std::collections::HashMap;

use tokio::sync::RwLock;

use super::{CacheKey, TermCache};
use crate::{error::AppResult, models::ResolvedEntity};

/// Process-wide term cache with no eviction
#[derive(Default)]
pub struct InMemoryTermCache {
    entries: RwLock<HashMap<CacheKey, Vec<ResolvedEntity>>>,
}

impl InMemoryTermCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl TermCache for InMemoryTermCache {
    async fn get(&self, key: &CacheKey) -> AppResult<Option<Vec<ResolvedEntity>>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &CacheKey, entities: &[ResolvedEntity]) -> AppResult<()> {
        self.entries
            .write()
            .await
            .insert(key.clone(), entities.to_vec());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
