/// Vector-search product matching client
///
/// Sends a batch of ranked recommendations and receives, per recommendation,
/// the closest catalogue products.
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};

use crate::{
    error::{AppError, AppResult},
    models::{InterestTerm, MatchResult, ProductMatch, RecommendationRecord, SeedMatch},
    services::providers::ProductMatcher,
};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireRecommendation<'a> {
    name: &'a str,
    affinity: f64,
    entity_type: &'static str,
}

/// Entity type the matching service expects for bare seed terms
const SEED_ENTITY_TYPE: &str = "seedTerm";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MatchRequest<'a> {
    top_recommendations: Vec<WireRecommendation<'a>>,
    top_k: usize,
    start_index: usize,
    batch_size: usize,
}

impl<'a> MatchRequest<'a> {
    fn new(top_recommendations: Vec<WireRecommendation<'a>>, top_k: usize) -> Self {
        let batch_size = top_recommendations.len();
        Self {
            top_recommendations,
            top_k,
            start_index: 0,
            batch_size,
        }
    }
}

#[derive(Debug, Deserialize)]
struct MatchResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    results: Vec<WireResult>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireResult {
    #[serde(default)]
    matches: Vec<ProductMatch>,
}

#[derive(Clone)]
pub struct VectorSearchMatcher {
    http_client: HttpClient,
    api_url: String,
}

impl VectorSearchMatcher {
    pub fn new(api_url: String) -> Self {
        Self {
            http_client: HttpClient::new(),
            api_url,
        }
    }

    fn build_request(records: &[RecommendationRecord], top_k: usize) -> MatchRequest<'_> {
        MatchRequest::new(
            records
                .iter()
                .map(|r| WireRecommendation {
                    name: &r.name,
                    affinity: r.affinity,
                    entity_type: r.category.as_str(),
                })
                .collect(),
            top_k,
        )
    }

    /// Seed terms go out at full affinity
    fn build_seed_request(terms: &[InterestTerm], top_k: usize) -> MatchRequest<'_> {
        MatchRequest::new(
            terms
                .iter()
                .map(|term| WireRecommendation {
                    name: term.as_str(),
                    affinity: 1.0,
                    entity_type: SEED_ENTITY_TYPE,
                })
                .collect(),
            top_k,
        )
    }

    /// Per-item match lists from a successful response.
    ///
    /// The service answers positionally; a response with a different number
    /// of results than items sent is malformed.
    fn checked_results(response: MatchResponse, sent: usize) -> AppResult<Vec<WireResult>> {
        if !response.success {
            return Err(AppError::ExternalApi(format!(
                "Matching service reported failure: {}",
                response.error.unwrap_or_else(|| "unknown error".to_string())
            )));
        }

        if response.results.len() != sent {
            return Err(AppError::ExternalApi(format!(
                "Matching service returned {} results for {} records",
                response.results.len(),
                sent
            )));
        }

        Ok(response.results)
    }

    /// Pairs each returned match list with the record it was requested for
    fn pair_results(
        records: &[RecommendationRecord],
        response: MatchResponse,
    ) -> AppResult<Vec<MatchResult>> {
        Ok(records
            .iter()
            .cloned()
            .zip(Self::checked_results(response, records.len())?)
            .map(|(recommendation, result)| MatchResult {
                recommendation,
                matches: result.matches,
            })
            .collect())
    }

    fn pair_seed_results(
        terms: &[InterestTerm],
        response: MatchResponse,
    ) -> AppResult<Vec<SeedMatch>> {
        Ok(terms
            .iter()
            .cloned()
            .zip(Self::checked_results(response, terms.len())?)
            .map(|(term, result)| SeedMatch {
                term,
                matches: result.matches,
            })
            .collect())
    }

    async fn send(&self, request: &MatchRequest<'_>) -> AppResult<MatchResponse> {
        let response = self
            .http_client
            .post(&self.api_url)
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::upstream("Matching service", status, body));
        }

        let response_text = response.text().await?;
        serde_json::from_str(&response_text).map_err(|e| {
            tracing::error!(error = %e, response = %response_text, "Malformed matching response");
            AppError::ExternalApi(format!("Failed to parse matching response: {}", e))
        })
    }
}

#[async_trait::async_trait]
impl ProductMatcher for VectorSearchMatcher {
    async fn match_batch(
        &self,
        records: &[RecommendationRecord],
        top_k: usize,
    ) -> AppResult<Vec<MatchResult>> {
        let parsed = self.send(&Self::build_request(records, top_k)).await?;
        Self::pair_results(records, parsed)
    }

    async fn match_seed_terms(
        &self,
        terms: &[InterestTerm],
        top_k: usize,
    ) -> AppResult<Vec<SeedMatch>> {
        let parsed = self.send(&Self::build_seed_request(terms, top_k)).await?;
        Self::pair_seed_results(terms, parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Category;
    use serde_json::json;

    fn records() -> Vec<RecommendationRecord> {
        vec![
            RecommendationRecord::new("Dune", 0.9, Category::Book).unwrap(),
            RecommendationRecord::new("The Office", 0.8, Category::TvShow).unwrap(),
        ]
    }

    #[test]
    fn test_build_request_wire_format() {
        let records = records();
        let body = serde_json::to_value(VectorSearchMatcher::build_request(&records, 5)).unwrap();

        assert_eq!(
            body,
            json!({
                "topRecommendations": [
                    { "name": "Dune", "affinity": 0.9, "entityType": "book" },
                    { "name": "The Office", "affinity": 0.8, "entityType": "tv_show" }
                ],
                "topK": 5,
                "startIndex": 0,
                "batchSize": 2
            })
        );
    }

    #[test]
    fn test_pair_results() {
        let response: MatchResponse = serde_json::from_value(json!({
            "success": true,
            "results": [
                { "matches": [{
                    "id": 1, "title": "Dune Poster", "product_url": "https://s/1",
                    "image_url": null, "price": "9.99", "similarity": 0.7
                }], "matchCount": 1 },
                { "matches": [], "matchCount": 0 }
            ]
        }))
        .unwrap();

        let results = VectorSearchMatcher::pair_results(&records(), response).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].recommendation.name, "Dune");
        assert_eq!(results[0].matches[0].title, "Dune Poster");
        assert!(results[1].matches.is_empty());
    }

    #[test]
    fn test_pair_results_rejects_unsuccessful_response() {
        let response: MatchResponse =
            serde_json::from_value(json!({ "success": false, "error": "index offline" })).unwrap();

        let err = VectorSearchMatcher::pair_results(&records(), response).unwrap_err();
        assert!(err.to_string().contains("index offline"));
    }

    #[test]
    fn test_seed_request_wire_format() {
        let terms = InterestTerm::unique(["golf", "Tokyo"]);
        let body =
            serde_json::to_value(VectorSearchMatcher::build_seed_request(&terms, 10)).unwrap();

        assert_eq!(
            body,
            json!({
                "topRecommendations": [
                    { "name": "golf", "affinity": 1.0, "entityType": "seedTerm" },
                    { "name": "Tokyo", "affinity": 1.0, "entityType": "seedTerm" }
                ],
                "topK": 10,
                "startIndex": 0,
                "batchSize": 2
            })
        );
    }

    #[test]
    fn test_pair_seed_results_keeps_term_order() {
        let terms = InterestTerm::unique(["golf", "Tokyo"]);
        let response: MatchResponse = serde_json::from_value(json!({
            "success": true,
            "results": [
                { "matches": [] },
                { "matches": [{
                    "id": "t1", "title": "Tokyo Guide", "url": "https://s/t1",
                    "similarity_score": 0.8
                }] }
            ]
        }))
        .unwrap();

        let seeds = VectorSearchMatcher::pair_seed_results(&terms, response).unwrap();
        assert_eq!(seeds[0].term.as_str(), "golf");
        assert!(seeds[0].matches.is_empty());
        assert_eq!(seeds[1].matches[0].title, "Tokyo Guide");
    }

    #[test]
    fn test_pair_results_rejects_length_mismatch() {
        let response: MatchResponse = serde_json::from_value(json!({
            "success": true,
            "results": [{ "matches": [] }]
        }))
        .unwrap();

        assert!(VectorSearchMatcher::pair_results(&records(), response).is_err());
    }
}
