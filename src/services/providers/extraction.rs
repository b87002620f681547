/// Profile extraction client
///
/// The extraction service turns a free-text description into a structured
/// profile plus one query seed per category. It is consumed as a black box.
use reqwest::Client as HttpClient;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

use crate::{
    error::{AppError, AppResult},
    models::{Category, ExtractedProfile, Profile},
    services::providers::ProfileExtractor,
};

#[derive(Debug, Deserialize)]
struct ExtractResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    profile: Option<Profile>,
    #[serde(default)]
    queries: Map<String, Value>,
    #[serde(default)]
    legacy: Option<Legacy>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Legacy {
    #[serde(default)]
    seed_terms: Vec<String>,
}

#[derive(Clone)]
pub struct HttpProfileExtractor {
    http_client: HttpClient,
    api_url: String,
}

impl HttpProfileExtractor {
    pub fn new(api_url: String) -> Self {
        Self {
            http_client: HttpClient::new(),
            api_url,
        }
    }

    fn convert(response: ExtractResponse) -> AppResult<ExtractedProfile> {
        if !response.success {
            return Err(AppError::Extraction(
                response
                    .error
                    .unwrap_or_else(|| "extraction service reported failure".to_string()),
            ));
        }

        let mut seeds = BTreeMap::new();
        for (key, value) in response.queries {
            let Ok(category) = key.parse::<Category>() else {
                continue;
            };
            if let Value::Object(seed) = value {
                seeds.insert(category, seed);
            }
        }

        Ok(ExtractedProfile {
            profile: response.profile.unwrap_or_default(),
            seed_terms: response.legacy.map(|l| l.seed_terms).unwrap_or_default(),
            seeds,
        })
    }
}

#[async_trait::async_trait]
impl ProfileExtractor for HttpProfileExtractor {
    async fn extract(&self, text: &str) -> AppResult<ExtractedProfile> {
        let response = self
            .http_client
            .post(&self.api_url)
            .json(&json!({ "text": text }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Extraction(format!(
                "extraction service returned status {}: {}",
                status, body
            )));
        }

        let parsed: ExtractResponse = response.json().await?;
        let extracted = Self::convert(parsed)?;

        tracing::info!(
            seed_terms = extracted.seed_terms.len(),
            seeded_categories = extracted.seeds.len(),
            "Profile extracted"
        );

        Ok(extracted)
    }
}
