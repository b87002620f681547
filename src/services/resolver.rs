use serde::Serialize;
use std::sync::Arc;
use tracing::instrument;

use crate::{
    cache::{CacheKey, TermCache},
    models::{InterestTerm, ResolvedEntity},
    services::{pacing::Pacer, providers::EntitySearch},
};

/// How one term fared
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TermStatus {
    /// Resolved from the cache or a fresh search. `entities` may be empty.
    Resolved {
        entities: Vec<ResolvedEntity>,
        cached: bool,
    },
    /// The search call failed; nothing was cached
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TermReport {
    pub term: InterestTerm,
    #[serde(flatten)]
    pub status: TermStatus,
}

/// Per-term outcome of one resolution run, in input order
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Resolution {
    pub terms: Vec<TermReport>,
}

impl Resolution {
    /// Entities resolved for a term; `None` when the term failed or was not requested
    pub fn entities_for(&self, term: &InterestTerm) -> Option<&[ResolvedEntity]> {
        self.terms
            .iter()
            .find(|report| &report.term == term)
            .and_then(|report| match &report.status {
                TermStatus::Resolved { entities, .. } => Some(entities.as_slice()),
                TermStatus::Failed { .. } => None,
            })
    }

    /// Every resolved entity ID across all terms, in term order.
    ///
    /// IDs are not deduplicated across terms.
    pub fn entity_ids(&self) -> Vec<String> {
        self.terms
            .iter()
            .filter_map(|report| match &report.status {
                TermStatus::Resolved { entities, .. } => Some(entities),
                TermStatus::Failed { .. } => None,
            })
            .flatten()
            .map(|entity| entity.id.clone())
            .collect()
    }

    /// True when no term produced any entity
    pub fn is_empty(&self) -> bool {
        self.entity_ids().is_empty()
    }

    pub fn failed_terms(&self) -> impl Iterator<Item = &TermReport> {
        self.terms
            .iter()
            .filter(|report| matches!(report.status, TermStatus::Failed { .. }))
    }
}

/// Maps free-text interest terms to canonical entity IDs.
///
/// Terms are looked up in the cache first. Misses are searched one at a time,
/// with the pacer consulted before every search except the first of a run.
pub struct TermResolver {
    search: Arc<dyn EntitySearch>,
    cache: Arc<dyn TermCache>,
    pacer: Arc<dyn Pacer>,
}

impl TermResolver {
    pub fn new(
        search: Arc<dyn EntitySearch>,
        cache: Arc<dyn TermCache>,
        pacer: Arc<dyn Pacer>,
    ) -> Self {
        Self {
            search,
            cache,
            pacer,
        }
    }

    #[instrument(skip_all, fields(terms = terms.len(), cache = self.cache.name()))]
    pub async fn resolve(&self, terms: &[InterestTerm]) -> Resolution {
        let mut reports = Vec::with_capacity(terms.len());
        let mut searches_issued = 0usize;

        for term in terms {
            let key = CacheKey::for_term(term);

            match self.cache.get(&key).await {
                Ok(Some(entities)) => {
                    tracing::debug!(term = %term, entities = entities.len(), "Term cache hit");
                    reports.push(TermReport {
                        term: term.clone(),
                        status: TermStatus::Resolved {
                            entities,
                            cached: true,
                        },
                    });
                    continue;
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(term = %term, error = %e, "Term cache read failed, searching instead");
                }
            }

            if searches_issued > 0 {
                self.pacer.pause().await;
            }
            searches_issued += 1;

            let status = match self.search.search(term.as_str()).await {
                Ok(matches) => {
                    let entities: Vec<ResolvedEntity> = matches
                        .into_iter()
                        .map(|m| ResolvedEntity {
                            id: m.entity_id,
                            source_term: term.clone(),
                        })
                        .collect();

                    if let Err(e) = self.cache.put(&key, &entities).await {
                        tracing::warn!(term = %term, error = %e, "Failed to cache term resolution");
                    }

                    if entities.is_empty() {
                        tracing::info!(term = %term, "No entities found for term");
                    } else {
                        tracing::info!(term = %term, entities = entities.len(), "Term resolved");
                    }

                    TermStatus::Resolved {
                        entities,
                        cached: false,
                    }
                }
                Err(e) => {
                    tracing::warn!(term = %term, error = %e, "Term resolution failed");
                    TermStatus::Failed {
                        error: e.to_string(),
                    }
                }
            };

            reports.push(TermReport {
                term: term.clone(),
                status,
            });
        }

        let resolution = Resolution { terms: reports };

        tracing::info!(
            searches = searches_issued,
            entity_ids = resolution.entity_ids().len(),
            failed = resolution.failed_terms().count(),
            "Term resolution completed"
        );

        resolution
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cache::InMemoryTermCache,
        error::AppError,
        models::EntityMatch,
        services::{pacing::testing::CountingPacer, providers::MockEntitySearch},
    };

    fn terms(raw: &[&str]) -> Vec<InterestTerm> {
        InterestTerm::unique(raw.iter().copied())
    }

    fn matches(ids: &[&str]) -> Vec<EntityMatch> {
        ids.iter()
            .map(|id| EntityMatch {
                entity_id: id.to_string(),
                name: None,
            })
            .collect()
    }

    fn resolver(
        search: MockEntitySearch,
        cache: Arc<InMemoryTermCache>,
        pacer: Arc<CountingPacer>,
    ) -> TermResolver {
        TermResolver::new(Arc::new(search), cache, pacer)
    }

    #[tokio::test]
    async fn test_second_resolve_hits_cache_for_every_term() {
        let mut search = MockEntitySearch::new();
        search
            .expect_search()
            .withf(|q| q == "golf")
            .times(1)
            .returning(|_| Ok(matches(&["E1", "E2"])));
        search
            .expect_search()
            .withf(|q| q == "The Office")
            .times(1)
            .returning(|_| Ok(matches(&["E3"])));

        let cache = Arc::new(InMemoryTermCache::new());
        let resolver = resolver(search, cache, Arc::new(CountingPacer::default()));
        let input = terms(&["golf", "The Office"]);

        let first = resolver.resolve(&input).await;
        let second = resolver.resolve(&input).await;

        assert_eq!(first.entity_ids(), vec!["E1", "E2", "E3"]);
        assert_eq!(second.entity_ids(), first.entity_ids());
        assert!(second.terms.iter().all(|r| matches!(
            r.status,
            TermStatus::Resolved { cached: true, .. }
        )));
    }

    #[tokio::test]
    async fn test_zero_matches_are_cached_and_reported_empty() {
        let mut search = MockEntitySearch::new();
        search
            .expect_search()
            .times(1)
            .returning(|_| Ok(vec![]));

        let cache = Arc::new(InMemoryTermCache::new());
        let resolver = resolver(search, cache.clone(), Arc::new(CountingPacer::default()));
        let input = terms(&["zzznonexistentterm"]);

        let first = resolver.resolve(&input).await;
        assert!(first.is_empty());
        assert_eq!(first.entities_for(&input[0]), Some(&[][..]));

        let cached = cache
            .get(&CacheKey::for_term(&input[0]))
            .await
            .unwrap();
        assert_eq!(cached, Some(vec![]));

        let second = resolver.resolve(&input).await;
        assert!(second.is_empty());
        assert_eq!(
            second.terms[0].status,
            TermStatus::Resolved {
                entities: vec![],
                cached: true
            }
        );
    }

    #[tokio::test]
    async fn test_failed_term_does_not_abort_and_is_not_cached() {
        let mut search = MockEntitySearch::new();
        search
            .expect_search()
            .withf(|q| q == "bad")
            .times(2)
            .returning(|_| Err(AppError::ExternalApi("status 429: slow down".to_string())));
        search
            .expect_search()
            .withf(|q| q == "good")
            .times(1)
            .returning(|_| Ok(matches(&["E9"])));

        let cache = Arc::new(InMemoryTermCache::new());
        let resolver = resolver(search, cache, Arc::new(CountingPacer::default()));
        let input = terms(&["bad", "good"]);

        let first = resolver.resolve(&input).await;
        assert_eq!(first.entity_ids(), vec!["E9"]);
        assert_eq!(first.entities_for(&input[0]), None);

        let failures: Vec<&TermReport> = first.failed_terms().collect();
        assert_eq!(failures.len(), 1);
        match &failures[0].status {
            TermStatus::Failed { error } => assert!(error.contains("slow down")),
            other => panic!("unexpected status: {:?}", other),
        }

        // The failure is retried, the success comes from cache.
        let second = resolver.resolve(&input).await;
        assert_eq!(second.entity_ids(), vec!["E9"]);
    }

    #[tokio::test]
    async fn test_pacing_skips_first_search_and_cache_hits() {
        let mut search = MockEntitySearch::new();
        search
            .expect_search()
            .returning(|q| Ok(matches(&[q])));

        let cache = Arc::new(InMemoryTermCache::new());
        let warm = InterestTerm::new("warm").unwrap();
        cache
            .put(
                &CacheKey::for_term(&warm),
                &[ResolvedEntity {
                    id: "W".to_string(),
                    source_term: warm.clone(),
                }],
            )
            .await
            .unwrap();

        let pacer = Arc::new(CountingPacer::default());
        let resolver = resolver(search, cache, pacer.clone());

        let resolution = resolver.resolve(&terms(&["warm", "a", "b", "c"])).await;

        assert_eq!(resolution.entity_ids(), vec!["W", "a", "b", "c"]);
        assert_eq!(pacer.pauses(), 2);
    }

    #[tokio::test]
    async fn test_entity_ids_are_not_deduplicated_across_terms() {
        let mut search = MockEntitySearch::new();
        search
            .expect_search()
            .returning(|_| Ok(matches(&["SHARED"])));

        let resolver = resolver(
            search,
            Arc::new(InMemoryTermCache::new()),
            Arc::new(CountingPacer::default()),
        );

        let resolution = resolver.resolve(&terms(&["football", "Chiefs"])).await;
        assert_eq!(resolution.entity_ids(), vec!["SHARED", "SHARED"]);
    }

    #[test]
    fn test_report_serialization() {
        let report = TermReport {
            term: InterestTerm::new("golf").unwrap(),
            status: TermStatus::Failed {
                error: "boom".to_string(),
            },
        };

        assert_eq!(
            serde_json::to_value(&report).unwrap(),
            serde_json::json!({ "term": "golf", "status": "failed", "error": "boom" })
        );
    }
}
