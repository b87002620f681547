use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashSet};

use crate::models::{AgeGroup, Category, DemographicWeights, Demographics, Gender};

const INTEREST_WEIGHT: u32 = 8;
const INSIGHTS_TAKE: u32 = 10;

/// Seed keys forwarded to the insights service untouched
const SEED_PASSTHROUGH_KEYS: [&str; 5] = [
    "signal.location.query",
    "signal.location.weight",
    "filter.geocode.country_code",
    "filter.price_level.min",
    "filter.price_level.max",
];

/// Everything the insights service needs for one category
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategorySignalPayload {
    pub category: Category,
    pub entity_ids: Vec<String>,
    pub demographics: Demographics,
    pub demographic_weights: DemographicWeights,
    pub interest_weight: u32,
    pub take: u32,
    pub explainability: bool,
    /// Extra upstream filters carried over from an extraction seed
    pub extra: Map<String, Value>,
}

impl CategorySignalPayload {
    /// Renders the insights request body.
    ///
    /// Absent demographic fields produce no keys at all.
    pub fn to_request_body(&self) -> Value {
        let mut body = self.extra.clone();

        body.insert("filter.type".into(), json!(self.category.urn()));
        body.insert(
            "signal.interests.entities".into(),
            Value::Array(self.entity_ids.iter().map(|id| json!({ "id": id })).collect()),
        );
        body.insert(
            "signal.interests.entities.weight".into(),
            json!(self.interest_weight),
        );
        body.insert("take".into(), json!(self.take));
        body.insert("feature.explainability".into(), json!(self.explainability));

        if let Some(age_group) = self.demographics.age_group {
            body.insert("signal.demographics.age".into(), json!(age_group.as_str()));
            body.insert(
                "signal.demographics.age.weight".into(),
                json!(self.demographic_weights.age),
            );
        }

        if let Some(gender) = self.demographics.gender {
            body.insert("signal.demographics.gender".into(), json!(gender.as_str()));
            body.insert(
                "signal.demographics.gender.weight".into(),
                json!(self.demographic_weights.gender),
            );
        }

        Value::Object(body)
    }
}

/// Assembles per-category insights payloads. Pure and deterministic.
#[derive(Debug, Clone, Default)]
pub struct SignalBuilder {
    demographic_weights: DemographicWeights,
}

impl SignalBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_demographic_weights(mut self, weights: DemographicWeights) -> Self {
        self.demographic_weights = weights;
        self
    }

    /// One payload per requested category, in request order.
    ///
    /// Entity IDs and categories are deduplicated keeping first occurrence.
    pub fn build(
        &self,
        resolved_ids: &[String],
        demographics: &Demographics,
        categories: &[Category],
    ) -> Vec<CategorySignalPayload> {
        let entity_ids = dedup(resolved_ids.iter().cloned());

        dedup(categories.iter().copied())
            .into_iter()
            .map(|category| CategorySignalPayload {
                category,
                entity_ids: entity_ids.clone(),
                demographics: *demographics,
                demographic_weights: self.demographic_weights,
                interest_weight: INTEREST_WEIGHT,
                take: INSIGHTS_TAKE,
                explainability: true,
                extra: Map::new(),
            })
            .collect()
    }

    /// Like [`build`](Self::build), but starts each category from its
    /// extraction seed. Categories without a seed are not queried.
    ///
    /// A seed contributes its demographic signals (unless `demographics`
    /// overrides them), its result cap, and the passthrough filters. Its
    /// interest signals are always replaced by the resolved IDs.
    pub fn build_from_seeds(
        &self,
        resolved_ids: &[String],
        demographics: Option<&Demographics>,
        seeds: &BTreeMap<Category, Map<String, Value>>,
        categories: &[Category],
    ) -> Vec<CategorySignalPayload> {
        let base_demographics = demographics.copied().unwrap_or_default();

        self.build(resolved_ids, &base_demographics, categories)
            .into_iter()
            .filter_map(|mut payload| {
                let seed = seeds.get(&payload.category)?;

                if demographics.is_none() {
                    let (seeded, weights) = seed_demographics(seed, self.demographic_weights);
                    payload.demographics = seeded;
                    payload.demographic_weights = weights;
                }

                if let Some(take) = seed
                    .get("take")
                    .and_then(Value::as_u64)
                    .and_then(|take| u32::try_from(take).ok())
                    .filter(|take| *take > 0)
                {
                    payload.take = take;
                }

                payload.extra = SEED_PASSTHROUGH_KEYS
                    .iter()
                    .filter_map(|key| seed.get(*key).map(|v| (key.to_string(), v.clone())))
                    .collect();

                if !payload.category.accepts_price_filter() {
                    payload.extra.remove("filter.price_level.min");
                    payload.extra.remove("filter.price_level.max");
                }

                Some(payload)
            })
            .collect()
    }
}

fn dedup<T: Clone + Eq + std::hash::Hash>(items: impl IntoIterator<Item = T>) -> Vec<T> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}

fn seed_demographics(
    seed: &Map<String, Value>,
    defaults: DemographicWeights,
) -> (Demographics, DemographicWeights) {
    let weight = |key: &str, default: u32| {
        seed.get(key)
            .and_then(|v| v.as_u64().or_else(|| v.as_str()?.parse().ok()))
            .and_then(|w| u32::try_from(w).ok())
            .unwrap_or(default)
    };

    let demographics = Demographics {
        age_group: seed
            .get("signal.demographics.age")
            .and_then(Value::as_str)
            .and_then(AgeGroup::from_age_text),
        gender: seed
            .get("signal.demographics.gender")
            .and_then(Value::as_str)
            .and_then(Gender::from_text),
    };

    let weights = DemographicWeights {
        age: weight("signal.demographics.age.weight", defaults.age),
        gender: weight("signal.demographics.gender.weight", defaults.gender),
    };

    (demographics, weights)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_build_one_payload_per_category_in_order() {
        let payloads = SignalBuilder::new().build(
            &ids(&["E1", "E2"]),
            &Demographics::default(),
            &[Category::Movie, Category::Artist, Category::Movie],
        );

        let categories: Vec<Category> = payloads.iter().map(|p| p.category).collect();
        assert_eq!(categories, vec![Category::Movie, Category::Artist]);
        assert!(payloads.iter().all(|p| p.entity_ids == ids(&["E1", "E2"])));
        assert!(payloads.iter().all(|p| p.explainability && p.take == 10));
    }

    #[test]
    fn test_request_body_without_demographics_has_no_demographic_keys() {
        let payload = &SignalBuilder::new().build(
            &ids(&["E1", "E1", "E2"]),
            &Demographics::default(),
            &[Category::Book],
        )[0];

        assert_eq!(
            payload.to_request_body(),
            json!({
                "filter.type": "urn:entity:book",
                "signal.interests.entities": [{ "id": "E1" }, { "id": "E2" }],
                "signal.interests.entities.weight": 8,
                "take": 10,
                "feature.explainability": true
            })
        );
    }

    #[test]
    fn test_request_body_with_demographics_uses_weights() {
        let demographics = Demographics {
            age_group: Some(AgeGroup::ThirtySixToFiftyFive),
            gender: None,
        };
        let payload = &SignalBuilder::new()
            .with_demographic_weights(DemographicWeights { age: 6, gender: 2 })
            .build(&ids(&["E1"]), &demographics, &[Category::Place])[0];

        let body = payload.to_request_body();
        assert_eq!(body["signal.demographics.age"], "36_to_55");
        assert_eq!(body["signal.demographics.age.weight"], 6);
        assert!(body.get("signal.demographics.gender").is_none());
        assert!(body.get("signal.demographics.gender.weight").is_none());
    }

    #[test]
    fn test_build_is_deterministic() {
        let builder = SignalBuilder::new();
        let demographics = Demographics {
            age_group: None,
            gender: Some(Gender::Female),
        };
        let a = builder.build(&ids(&["E1"]), &demographics, &Category::ALL);
        let b = builder.build(&ids(&["E1"]), &demographics, &Category::ALL);
        assert_eq!(a, b);
    }

    fn seed(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_build_from_seeds_replaces_free_text_interests() {
        let mut seeds = BTreeMap::new();
        seeds.insert(
            Category::Place,
            seed(json!({
                "filter.type": "urn:entity:place",
                "signal.interests.entities.query": ["golf", "Tokyo"],
                "signal.interests.tags.query": ["golf"],
                "signal.demographics.age": "36_to_55",
                "signal.demographics.age.weight": 6,
                "signal.location.query": "Tokyo",
                "signal.location.weight": 7,
                "filter.price_level.max": 3,
                "take": 20
            })),
        );
        seeds.insert(
            Category::Movie,
            seed(json!({
                "filter.type": "urn:entity:movie",
                "filter.price_level.max": 3
            })),
        );

        let payloads = SignalBuilder::new().build_from_seeds(
            &ids(&["E1"]),
            None,
            &seeds,
            &[Category::Place, Category::Movie, Category::Book],
        );

        let place = payloads[0].to_request_body();
        assert!(place.get("signal.interests.entities.query").is_none());
        assert!(place.get("signal.interests.tags.query").is_none());
        assert_eq!(place["signal.interests.entities"], json!([{ "id": "E1" }]));
        assert_eq!(place["signal.demographics.age"], "36_to_55");
        assert_eq!(place["signal.demographics.age.weight"], 6);
        assert_eq!(place["signal.location.query"], "Tokyo");
        assert_eq!(place["filter.price_level.max"], 3);
        assert_eq!(place["take"], 20);

        let movie = payloads[1].to_request_body();
        assert!(movie.get("filter.price_level.max").is_none());
    }

    #[test]
    fn test_build_from_seeds_skips_unseeded_categories() {
        let mut seeds = BTreeMap::new();
        seeds.insert(Category::Movie, seed(json!({ "filter.type": "urn:entity:movie" })));

        let payloads = SignalBuilder::new().build_from_seeds(
            &ids(&["E1"]),
            None,
            &seeds,
            &[Category::Place, Category::Movie, Category::Book],
        );

        let categories: Vec<Category> = payloads.iter().map(|p| p.category).collect();
        assert_eq!(categories, vec![Category::Movie]);
    }

    #[test]
    fn test_seed_take_out_of_range_keeps_default() {
        let mut seeds = BTreeMap::new();
        seeds.insert(Category::Book, seed(json!({ "take": 0 })));
        seeds.insert(Category::Movie, seed(json!({ "take": 4_294_967_296u64 })));
        seeds.insert(Category::Artist, seed(json!({ "take": 25 })));

        let payloads = SignalBuilder::new().build_from_seeds(
            &ids(&["E1"]),
            None,
            &seeds,
            &[Category::Book, Category::Movie, Category::Artist],
        );

        let takes: Vec<u32> = payloads.iter().map(|p| p.take).collect();
        assert_eq!(takes, vec![10, 10, 25]);
    }

    #[test]
    fn test_caller_demographics_override_seed() {
        let mut seeds = BTreeMap::new();
        seeds.insert(
            Category::Artist,
            seed(json!({ "signal.demographics.gender": "male" })),
        );
        let demographics = Demographics {
            age_group: Some(AgeGroup::FiftyFiveAndOlder),
            gender: None,
        };

        let payloads = SignalBuilder::new().build_from_seeds(
            &ids(&["E1"]),
            Some(&demographics),
            &seeds,
            &[Category::Artist],
        );

        assert_eq!(payloads[0].demographics, demographics);
    }
}
