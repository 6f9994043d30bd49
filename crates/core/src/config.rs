use crate::chunking::ChunkingConfig;
use crate::error::ConfigError;
use std::fmt;
use std::time::Duration;
use url::Url;

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-ada-002";
pub const DEFAULT_COMPLETION_MODEL: &str = "gpt-3.5-turbo-instruct";

/// Provider secret. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let value = value.into().trim().to_string();
        if value.is_empty() {
            None
        } else {
            Some(Self(value))
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

/// Everything the pipeline needs, resolved once at startup and passed in explicitly.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_key: Option<ApiKey>,
    pub api_base: Url,
    pub embedding_model: String,
    pub embedding_batch_size: usize,
    pub completion_model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub chunking: ChunkingConfig,
    pub retrieval_top_k: usize,
    pub request_timeout: Duration,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub offline: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: Url::parse(DEFAULT_API_BASE).expect("default api base is a valid url"),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            embedding_batch_size: 64,
            completion_model: DEFAULT_COMPLETION_MODEL.to_string(),
            max_tokens: 1_024,
            temperature: 0.7,
            chunking: ChunkingConfig::default(),
            retrieval_top_k: 4,
            request_timeout: Duration::from_secs(120),
            max_retries: 2,
            retry_base_delay: Duration::from_secs(1),
            offline: false,
        }
    }
}

impl AppConfig {
    pub fn with_api_base(mut self, api_base: &str) -> Result<Self, ConfigError> {
        self.api_base = Url::parse(api_base)?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.offline && self.api_key.is_none() {
            return Err(ConfigError::MissingApiKey);
        }

        self.chunking
            .validate()
            .map_err(|error| ConfigError::InvalidValue {
                key: "chunking".to_string(),
                details: error.to_string(),
            })?;

        if self.retrieval_top_k == 0 {
            return Err(invalid("retrieval_top_k", "must be at least 1"));
        }
        if self.embedding_batch_size == 0 {
            return Err(invalid("embedding_batch_size", "must be at least 1"));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(invalid("temperature", "must be between 0.0 and 2.0"));
        }
        if self.api_base.cannot_be_a_base() {
            return Err(invalid("api_base", "must be an http(s) base url"));
        }

        Ok(())
    }

    /// Resolve `path` under the api base, keeping any base path such as `/v1`.
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.api_base.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

fn invalid(key: &str, details: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        details: details.to_string(),
    }
}
