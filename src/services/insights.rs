use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::instrument;

use crate::{
    models::{Category, RecommendationRecord},
    services::{pacing::Pacer, providers::InsightsApi, signals::CategorySignalPayload},
};

/// One way the insights service may lay out its result items
pub trait ResponseShape: Send + Sync {
    fn name(&self) -> &'static str;

    /// The item array, if the response has this shape
    fn items<'a>(&self, response: &'a Value) -> Option<&'a Vec<Value>>;
}

/// `{"results": {"entities": [...]}}`
pub struct NestedEntities;

impl ResponseShape for NestedEntities {
    fn name(&self) -> &'static str {
        "results.entities"
    }

    fn items<'a>(&self, response: &'a Value) -> Option<&'a Vec<Value>> {
        response.get("results")?.get("entities")?.as_array()
    }
}

/// `{"results": [...]}`
pub struct FlatResults;

impl ResponseShape for FlatResults {
    fn name(&self) -> &'static str {
        "results"
    }

    fn items<'a>(&self, response: &'a Value) -> Option<&'a Vec<Value>> {
        response.get("results")?.as_array()
    }
}

/// `[...]`
pub struct BareArray;

impl ResponseShape for BareArray {
    fn name(&self) -> &'static str {
        "array"
    }

    fn items<'a>(&self, response: &'a Value) -> Option<&'a Vec<Value>> {
        response.as_array()
    }
}

/// Tries each shape in order; the first match wins
pub struct ResponseNormalizer {
    shapes: Vec<Box<dyn ResponseShape>>,
}

impl Default for ResponseNormalizer {
    fn default() -> Self {
        Self::new(vec![
            Box::new(NestedEntities),
            Box::new(FlatResults),
            Box::new(BareArray),
        ])
    }
}

impl ResponseNormalizer {
    pub fn new(shapes: Vec<Box<dyn ResponseShape>>) -> Self {
        Self { shapes }
    }

    /// Uniform records from a raw response. Unknown shapes yield nothing.
    pub fn normalize(&self, response: &Value, category: Category) -> Vec<RecommendationRecord> {
        let Some((shape, items)) = self
            .shapes
            .iter()
            .find_map(|shape| shape.items(response).map(|items| (shape.name(), items)))
        else {
            tracing::debug!(category = %category, "Unrecognised insights response shape");
            return Vec::new();
        };

        let records: Vec<RecommendationRecord> = items
            .iter()
            .filter_map(|item| normalize_item(item, category))
            .collect();

        tracing::debug!(
            category = %category,
            shape,
            items = items.len(),
            kept = records.len(),
            "Insights response normalised"
        );

        records
    }
}

/// `name` falls back to `title`; `affinity` falls back to `query.affinity`
fn normalize_item(item: &Value, category: Category) -> Option<RecommendationRecord> {
    let name = ["name", "title"]
        .iter()
        .filter_map(|key| item.get(*key).and_then(Value::as_str))
        .find(|s| !s.trim().is_empty())?;

    let affinity = item
        .get("affinity")
        .and_then(Value::as_f64)
        .or_else(|| item.get("query")?.get("affinity")?.as_f64())?;

    RecommendationRecord::new(name, affinity, category)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryFailure {
    pub category: Category,
    pub error: String,
}

/// Accumulated records plus the per-category failure log
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InsightsOutcome {
    /// Records in call order; not sorted
    pub records: Vec<RecommendationRecord>,
    pub queried: Vec<Category>,
    pub failures: Vec<CategoryFailure>,
}

/// Issues one insights call per category, sequentially and paced
pub struct InsightsFetcher {
    api: Arc<dyn InsightsApi>,
    pacer: Arc<dyn Pacer>,
    normalizer: ResponseNormalizer,
}

impl InsightsFetcher {
    pub fn new(api: Arc<dyn InsightsApi>, pacer: Arc<dyn Pacer>) -> Self {
        Self {
            api,
            pacer,
            normalizer: ResponseNormalizer::default(),
        }
    }

    pub fn with_normalizer(mut self, normalizer: ResponseNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    #[instrument(skip_all, fields(categories = payloads.len()))]
    pub async fn fetch_all(&self, payloads: &[CategorySignalPayload]) -> InsightsOutcome {
        let mut outcome = InsightsOutcome::default();

        for (i, payload) in payloads.iter().enumerate() {
            if i > 0 {
                self.pacer.pause().await;
            }

            let category = payload.category;
            outcome.queried.push(category);

            let body = payload.to_request_body();
            tracing::debug!(category = %category, body = %body, "Fetching insights");

            match self.api.insights(&body).await {
                Ok(response) => {
                    let records = self.normalizer.normalize(&response, category);
                    tracing::info!(category = %category, records = records.len(), "Insights fetched");
                    outcome.records.extend(records);
                }
                Err(e) => {
                    tracing::warn!(category = %category, error = %e, "Insights fetch failed");
                    outcome.failures.push(CategoryFailure {
                        category,
                        error: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            records = outcome.records.len(),
            failed = outcome.failures.len(),
            "Insights fetch completed"
        );

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::AppError,
        models::Demographics,
        services::{
            pacing::testing::CountingPacer, providers::MockInsightsApi, signals::SignalBuilder,
        },
    };
    use serde_json::json;

    fn payloads(categories: &[Category]) -> Vec<CategorySignalPayload> {
        SignalBuilder::new().build(&["E1".to_string()], &Demographics::default(), categories)
    }

    fn is_category(body: &Value, category: Category) -> bool {
        body["filter.type"] == json!(category.urn())
    }

    #[test]
    fn test_nested_entities_shape_wins_over_flat() {
        let response = json!({
            "results": { "entities": [{ "name": "Nested", "affinity": 0.5 }] }
        });
        let records = ResponseNormalizer::default().normalize(&response, Category::Book);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "Nested");
    }

    #[test]
    fn test_flat_results_shape() {
        let response = json!({ "results": [{ "title": "Flat", "affinity": 0.4 }] });
        let records = ResponseNormalizer::default().normalize(&response, Category::Movie);
        assert_eq!(records[0].name, "Flat");
        assert_eq!(records[0].category, Category::Movie);
    }

    #[test]
    fn test_bare_array_shape() {
        let response = json!([{ "name": "Bare", "query": { "affinity": 0.3 } }]);
        let records = ResponseNormalizer::default().normalize(&response, Category::Artist);
        assert_eq!(records[0].name, "Bare");
        assert_eq!(records[0].affinity, 0.3);
    }

    #[test]
    fn test_unknown_shape_yields_nothing() {
        let normalizer = ResponseNormalizer::default();
        assert!(normalizer
            .normalize(&json!({ "data": [] }), Category::Book)
            .is_empty());
        assert!(normalizer
            .normalize(&json!({ "results": { "entities": "nope" } }), Category::Book)
            .is_empty());
    }

    #[test]
    fn test_shapes_are_tried_in_configured_order() {
        let response = json!({ "results": [{ "name": "Flat", "affinity": 0.1 }] });
        let bare_only = ResponseNormalizer::new(vec![Box::new(BareArray)]);
        assert!(bare_only.normalize(&response, Category::Book).is_empty());
    }

    #[test]
    fn test_item_fallbacks_and_drops() {
        let category = Category::Podcast;

        let primary = normalize_item(
            &json!({ "name": "N", "title": "T", "affinity": 0.9, "query": { "affinity": 0.1 } }),
            category,
        )
        .unwrap();
        assert_eq!((primary.name.as_str(), primary.affinity), ("N", 0.9));

        let fallback = normalize_item(
            &json!({ "name": "", "title": "T", "query": { "affinity": 0.2 } }),
            category,
        )
        .unwrap();
        assert_eq!((fallback.name.as_str(), fallback.affinity), ("T", 0.2));

        assert!(normalize_item(&json!({ "affinity": 0.9 }), category).is_none());
        assert!(normalize_item(&json!({ "name": "No affinity" }), category).is_none());
        assert!(normalize_item(&json!({ "name": "Str", "affinity": "0.9" }), category).is_none());
    }

    #[tokio::test]
    async fn test_partial_category_failure() {
        let mut api = MockInsightsApi::new();
        api.expect_insights()
            .withf(|body| is_category(body, Category::Movie))
            .times(1)
            .returning(|_| {
                Err(AppError::ExternalApi(
                    "Qloo insights returned status 500: upstream exploded".to_string(),
                ))
            });
        api.expect_insights()
            .withf(|body| is_category(body, Category::Artist))
            .times(1)
            .returning(|_| {
                let items: Vec<Value> = (0..10)
                    .map(|i| json!({ "name": format!("Artist {}", i), "affinity": 0.9 - i as f64 * 0.01 }))
                    .collect();
                Ok(json!({ "results": { "entities": items } }))
            });

        let fetcher = InsightsFetcher::new(Arc::new(api), Arc::new(CountingPacer::default()));
        let outcome = fetcher
            .fetch_all(&payloads(&[Category::Movie, Category::Artist]))
            .await;

        assert_eq!(outcome.records.len(), 10);
        assert!(outcome
            .records
            .iter()
            .all(|r| r.category == Category::Artist));
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].category, Category::Movie);
        assert!(outcome.failures[0].error.contains("upstream exploded"));
        assert_eq!(outcome.queried, vec![Category::Movie, Category::Artist]);
    }

    #[tokio::test]
    async fn test_fetcher_uses_configured_normalizer() {
        let mut api = MockInsightsApi::new();
        api.expect_insights()
            .times(1)
            .returning(|_| Ok(json!({ "results": [{ "name": "Flat", "affinity": 0.4 }] })));

        let fetcher = InsightsFetcher::new(Arc::new(api), Arc::new(CountingPacer::default()))
            .with_normalizer(ResponseNormalizer::new(vec![Box::new(BareArray)]));
        let outcome = fetcher.fetch_all(&payloads(&[Category::Book])).await;

        assert!(outcome.records.is_empty());
        assert!(outcome.failures.is_empty());
        assert_eq!(outcome.queried, vec![Category::Book]);
    }

    #[tokio::test]
    async fn test_records_accumulate_in_call_order_and_calls_are_paced() {
        let mut api = MockInsightsApi::new();
        api.expect_insights().returning(|body| {
            let kind = body["filter.type"].as_str().unwrap_or_default().to_string();
            Ok(json!([
                { "name": format!("{} low", kind), "affinity": 0.1 },
                { "name": format!("{} high", kind), "affinity": 0.9 }
            ]))
        });

        let pacer = Arc::new(CountingPacer::default());
        let fetcher = InsightsFetcher::new(Arc::new(api), pacer.clone());
        let outcome = fetcher
            .fetch_all(&payloads(&[Category::Book, Category::Movie, Category::Place]))
            .await;

        let names: Vec<&str> = outcome.records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "urn:entity:book low",
                "urn:entity:book high",
                "urn:entity:movie low",
                "urn:entity:movie high",
                "urn:entity:place low",
                "urn:entity:place high",
            ]
        );
        assert_eq!(pacer.pauses(), 2);
    }

    #[tokio::test]
    async fn test_no_payloads_no_calls() {
        let api = MockInsightsApi::new();
        let pacer = Arc::new(CountingPacer::default());
        let fetcher = InsightsFetcher::new(Arc::new(api), pacer.clone());

        let outcome = fetcher.fetch_all(&[]).await;
        assert_eq!(outcome, InsightsOutcome::default());
        assert_eq!(pacer.pauses(), 0);
    }
}
