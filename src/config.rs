use serde::Deserialize;
use std::time::Duration;

/// Application configuration loaded from environment variables
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Qloo API key, sent as `x-api-key` on search and insights calls
    pub qloo_api_key: String,

    /// Qloo API base URL
    #[serde(default = "default_qloo_api_url")]
    pub qloo_api_url: String,

    /// Product matching (vector search) endpoint
    #[serde(default = "default_matching_api_url")]
    pub matching_api_url: String,

    /// Profile extraction endpoint. Free-text requests are rejected when unset.
    #[serde(default)]
    pub extraction_api_url: Option<String>,

    /// Redis connection URL. The in-process term cache is used when unset.
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Pause between uncached search calls, in milliseconds
    #[serde(default = "default_search_interval_ms")]
    pub search_interval_ms: u64,

    /// Pause between insights calls, in milliseconds
    #[serde(default = "default_insights_interval_ms")]
    pub insights_interval_ms: u64,

    /// When set, insights calls go through a token bucket at this rate
    /// instead of the fixed interval
    #[serde(default)]
    pub insights_rate_per_second: Option<f64>,

    /// Pause between matching batches, in milliseconds
    #[serde(default = "default_batch_interval_ms")]
    pub batch_interval_ms: u64,

    /// Records per matching batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Products requested per record from the matching service
    #[serde(default = "default_match_top_k")]
    pub match_top_k: usize,

    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_qloo_api_url() -> String {
    "https://hackathon.api.qloo.com".to_string()
}

fn default_matching_api_url() -> String {
    "http://localhost:3001/api/vectorsearch".to_string()
}

fn default_search_interval_ms() -> u64 {
    500
}

fn default_insights_interval_ms() -> u64 {
    500
}

fn default_batch_interval_ms() -> u64 {
    1000
}

fn default_batch_size() -> usize {
    20
}

fn default_match_top_k() -> usize {
    5
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let config = envy::from_env::<Config>()
            .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings the pipeline cannot run with
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.qloo_api_key.trim().is_empty() {
            anyhow::bail!("QLOO_API_KEY must not be empty");
        }
        if matches!(self.insights_rate_per_second, Some(rate) if rate.is_nan() || rate <= 0.0) {
            anyhow::bail!("INSIGHTS_RATE_PER_SECOND must be positive");
        }
        if self.batch_size == 0 {
            anyhow::bail!("BATCH_SIZE must be at least 1");
        }
        Ok(())
    }

    pub fn search_interval(&self) -> Duration {
        Duration::from_millis(self.search_interval_ms)
    }

    pub fn insights_interval(&self) -> Duration {
        Duration::from_millis(self.insights_interval_ms)
    }

    pub fn batch_interval(&self) -> Duration {
        Duration::from_millis(self.batch_interval_ms)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
