use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::{collections::BTreeMap, sync::Arc};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{Category, Demographics, InterestTerm, Profile, RankedList, SeedMatch, Summary},
    services::{
        delivery::{BatchDeliveryController, DeliveryObserver, PipelineRunState},
        insights::{CategoryFailure, InsightsFetcher},
        providers::ProfileExtractor,
        ranking::{self, CategoryGroup},
        resolver::{Resolution, TermResolver},
        signals::SignalBuilder,
    },
};

/// Input to one pipeline run
#[derive(Debug, Clone, Default)]
pub struct RecommendationQuery {
    pub terms: Vec<InterestTerm>,
    /// Caller demographics; when `None`, seeds supply their own
    pub demographics: Option<Demographics>,
    /// Categories to query, in order. Empty means every category.
    pub categories: Vec<Category>,
    /// Per-category seeds from profile extraction
    pub seeds: BTreeMap<Category, Map<String, Value>>,
    /// Extracted terms matched directly against the catalogue before the run
    pub seed_terms: Vec<InterestTerm>,
    pub profile: Option<Profile>,
}

impl RecommendationQuery {
    pub fn new(terms: Vec<InterestTerm>) -> Self {
        Self {
            terms,
            ..Self::default()
        }
    }

    fn categories(&self) -> Vec<Category> {
        if self.categories.is_empty() {
            Category::ALL.to_vec()
        } else {
            self.categories.clone()
        }
    }
}

/// Ranked recommendations and how they were obtained
#[derive(Debug, Clone, Serialize)]
pub struct Recommendations {
    pub queried: Vec<Category>,
    pub category_failures: Vec<CategoryFailure>,
    pub summary: Summary,
    pub by_category: Vec<CategoryGroup>,
    pub ranked: RankedList,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RecommendationOutcome {
    /// No term resolved to any entity; nothing was queried
    NoEntitiesResolved { resolution: Resolution },
    Ranked {
        resolution: Resolution,
        recommendations: Recommendations,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    NoEntitiesResolved,
    Done,
    Failed,
}

/// Result of a full run, from terms to matched products
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Extraction profile, for free-text runs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<Profile>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub seed_matches: Vec<SeedMatch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed_error: Option<String>,
    pub resolution: Resolution,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendations: Option<Recommendations>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery: Option<PipelineRunState>,
}

/// Terms in, ranked and matched products out
pub struct GiftPipeline {
    resolver: TermResolver,
    signals: SignalBuilder,
    fetcher: InsightsFetcher,
    delivery: BatchDeliveryController,
    extractor: Option<Arc<dyn ProfileExtractor>>,
}

impl GiftPipeline {
    pub fn new(
        resolver: TermResolver,
        signals: SignalBuilder,
        fetcher: InsightsFetcher,
        delivery: BatchDeliveryController,
    ) -> Self {
        Self {
            resolver,
            signals,
            fetcher,
            delivery,
            extractor: None,
        }
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn ProfileExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn resolver(&self) -> &TermResolver {
        &self.resolver
    }

    /// Turns a free-text description into a query via the extraction service
    pub async fn query_from_text(&self, text: &str) -> AppResult<RecommendationQuery> {
        let extractor = self.extractor.as_ref().ok_or_else(|| {
            AppError::InvalidInput(
                "Free-text requests need EXTRACTION_API_URL to be configured".to_string(),
            )
        })?;

        let extracted = extractor.extract(text).await?;
        let demographics = extracted.profile.demographics.normalize();
        let terms = InterestTerm::unique(extracted.seed_terms);

        Ok(RecommendationQuery {
            seed_terms: terms.clone(),
            terms,
            demographics: if extracted.seeds.is_empty() {
                Some(demographics)
            } else {
                None
            },
            categories: Vec::new(),
            seeds: extracted.seeds,
            profile: Some(extracted.profile),
        })
    }

    /// Matches seed terms directly. A failure is logged and reported, never fatal.
    async fn match_seed_terms(
        &self,
        query: &RecommendationQuery,
        observer: &dyn DeliveryObserver,
    ) -> (Vec<SeedMatch>, Option<String>) {
        if query.seed_terms.is_empty() {
            return (Vec::new(), None);
        }

        match self.delivery.match_seed_terms(&query.seed_terms).await {
            Ok(matches) => {
                observer.on_seed_matches(&matches);
                (matches, None)
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    terms = query.seed_terms.len(),
                    "Seed term matching failed"
                );
                (Vec::new(), Some(e.to_string()))
            }
        }
    }

    /// Resolve, build signals, fetch insights, rank
    #[instrument(skip_all, fields(terms = query.terms.len()))]
    pub async fn recommend(&self, query: &RecommendationQuery) -> RecommendationOutcome {
        let resolution = self.resolver.resolve(&query.terms).await;
        let entity_ids = resolution.entity_ids();

        if entity_ids.is_empty() {
            tracing::info!(
                terms = query.terms.len(),
                "No entities resolved, skipping insights"
            );
            return RecommendationOutcome::NoEntitiesResolved { resolution };
        }

        let categories = query.categories();
        let payloads = if query.seeds.is_empty() {
            self.signals.build(
                &entity_ids,
                &query.demographics.unwrap_or_default(),
                &categories,
            )
        } else {
            self.signals.build_from_seeds(
                &entity_ids,
                query.demographics.as_ref(),
                &query.seeds,
                &categories,
            )
        };

        let insights = self.fetcher.fetch_all(&payloads).await;
        let ranked = ranking::rank(insights.records);
        let summary = ranking::summarize(&ranked, &insights.queried);
        let by_category = ranking::group_by_category(&ranked, &insights.queried);

        tracing::info!(summary = %summary.message, "Recommendations ranked");

        RecommendationOutcome::Ranked {
            resolution,
            recommendations: Recommendations {
                queried: insights.queried,
                category_failures: insights.failures,
                summary,
                by_category,
                ranked,
            },
        }
    }

    /// Full run: recommend, then deliver the ranked list in batches
    #[instrument(skip_all, fields(run_id = %run_id))]
    pub async fn run(
        &self,
        run_id: Uuid,
        query: &RecommendationQuery,
        observer: &dyn DeliveryObserver,
    ) -> RunReport {
        let started_at = Utc::now();
        let (seed_matches, seed_error) = self.match_seed_terms(query, observer).await;

        let (resolution, recommendations) = match self.recommend(query).await {
            RecommendationOutcome::NoEntitiesResolved { resolution } => {
                return RunReport {
                    run_id,
                    status: RunStatus::NoEntitiesResolved,
                    started_at,
                    finished_at: Utc::now(),
                    profile: query.profile.clone(),
                    seed_matches,
                    seed_error,
                    resolution,
                    recommendations: None,
                    delivery: None,
                };
            }
            RecommendationOutcome::Ranked {
                resolution,
                recommendations,
            } => (resolution, recommendations),
        };

        let delivery = self.delivery.deliver(&recommendations.ranked, observer).await;
        let status = if delivery.succeeded() {
            RunStatus::Done
        } else {
            RunStatus::Failed
        };

        tracing::info!(
            status = ?status,
            matches = delivery.matches.len(),
            products = delivery.progress.cumulative_products,
            "Pipeline run finished"
        );

        RunReport {
            run_id,
            status,
            started_at,
            finished_at: Utc::now(),
            profile: query.profile.clone(),
            seed_matches,
            seed_error,
            resolution,
            recommendations: Some(recommendations),
            delivery: Some(delivery),
        }
    }
}
