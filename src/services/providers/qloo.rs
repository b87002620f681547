/// Qloo API client
///
/// Serves both halves of the recommendation lookup:
/// 1. Search: `GET /search` → canonical entity IDs for a free-text term
/// 2. Insights: `POST /v2/insights` → recommendations for one entity type
use reqwest::Client as HttpClient;
use serde::Deserialize;
use serde_json::Value;

use crate::{
    error::{AppError, AppResult},
    models::EntityMatch,
    services::providers::{EntitySearch, InsightsApi},
};

const API_KEY_HEADER: &str = "x-api-key";

/// Matches requested per search call
pub const SEARCH_TAKE: &str = "5";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<Value>,
}

#[derive(Clone)]
pub struct QlooClient {
    http_client: HttpClient,
    api_key: String,
    api_url: String,
}

impl QlooClient {
    pub fn new(api_key: String, api_url: String) -> Self {
        Self {
            http_client: HttpClient::new(),
            api_key,
            api_url: api_url.trim_end_matches('/').to_string(),
        }
    }

    /// Query string sent with every search call
    fn search_params(query: &str) -> [(&'static str, &str); 6] {
        [
            ("query", query),
            ("filter.radius", "0"),
            ("operator.filter.tags", "union"),
            ("page", "1"),
            ("sort_by", "match"),
            ("take", SEARCH_TAKE),
        ]
    }

    /// Keeps matches that carry an entity ID, in upstream order
    fn parse_matches(results: Vec<Value>) -> Vec<EntityMatch> {
        results
            .into_iter()
            .filter_map(|result| serde_json::from_value::<EntityMatch>(result).ok())
            .filter(|m| !m.entity_id.is_empty())
            .collect()
    }
}

#[async_trait::async_trait]
impl EntitySearch for QlooClient {
    async fn search(&self, query: &str) -> AppResult<Vec<EntityMatch>> {
        let url = format!("{}/search", self.api_url);

        let response = self
            .http_client
            .get(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .header(reqwest::header::ACCEPT, "application/json")
            .query(&Self::search_params(query))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::upstream("Qloo search", status, body));
        }

        let parsed: SearchResponse = response.json().await?;
        let matches = Self::parse_matches(parsed.results);

        tracing::debug!(
            query = %query,
            results = matches.len(),
            provider = "qloo",
            "Search completed"
        );

        Ok(matches)
    }
}

#[async_trait::async_trait]
impl InsightsApi for QlooClient {
    async fn insights(&self, body: &Value) -> AppResult<Value> {
        let url = format!("{}/v2/insights", self.api_url);

        let response = self
            .http_client
            .post(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::upstream("Qloo insights", status, body));
        }

        let response_text = response.text().await?;
        tracing::debug!(response = %response_text, "Raw Qloo insights response");

        serde_json::from_str(&response_text).map_err(|e| {
            AppError::ExternalApi(format!("Failed to parse Qloo insights response: {}", e))
        })
    }
}
