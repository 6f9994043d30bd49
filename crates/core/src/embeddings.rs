use crate::config::{ApiKey, AppConfig};
use crate::error::{ConfigError, EmbeddingProviderError};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 128;

/// Turns texts into fixed-dimension vectors, one per input, in input order.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn model(&self) -> &str;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingProviderError>;
}

/// Offline embedder hashing character trigrams into buckets.
#[derive(Debug, Clone, Copy)]
pub struct HashedNgramEmbeddings {
    pub dimensions: usize,
}

impl Default for HashedNgramEmbeddings {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl HashedNgramEmbeddings {
    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        for window in chars.windows(3) {
            let token = window.iter().collect::<String>();
            let mut hash = 1469598103934665603u64;
            for byte in token.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        vector
    }
}

#[async_trait]
impl EmbeddingProvider for HashedNgramEmbeddings {
    fn model(&self) -> &str {
        "hashed-trigram"
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingProviderError> {
        Ok(texts.iter().map(|text| self.embed(text)).collect())
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    index: usize,
    embedding: Vec<f32>,
}

/// OpenAI-compatible `/embeddings` endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiEmbeddings {
    client: Client,
    endpoint: String,
    api_key: ApiKey,
    model: String,
}

impl OpenAiEmbeddings {
    pub fn new(config: &AppConfig) -> Result<Self, ConfigError> {
        let api_key = config.api_key.as_ref().ok_or(ConfigError::MissingApiKey)?;
        let client = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("lammy/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|error| ConfigError::InvalidValue {
                key: "http_client".to_string(),
                details: error.to_string(),
            })?;

        Ok(Self {
            client,
            endpoint: config.endpoint("embeddings"),
            api_key: api_key.clone(),
            model: config.embedding_model.clone(),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddings {
    fn model(&self) -> &str {
        &self.model
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingProviderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(model = %self.model, inputs = texts.len(), "requesting embeddings");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose())
            .json(&EmbeddingRequest {
                model: &self.model,
                input: texts,
            })
            .send()
            .await
            .map_err(|error| {
                EmbeddingProviderError::Unavailable(format!("{}: {error}", self.endpoint))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingProviderError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let payload: EmbeddingResponse = response
            .json()
            .await
            .map_err(|error| EmbeddingProviderError::MalformedResponse(error.to_string()))?;

        order_embeddings(payload, texts.len())
    }
}

fn order_embeddings(
    payload: EmbeddingResponse,
    expected: usize,
) -> Result<Vec<Vec<f32>>, EmbeddingProviderError> {
    if payload.data.len() != expected {
        return Err(EmbeddingProviderError::MalformedResponse(format!(
            "expected {expected} embeddings, received {}",
            payload.data.len()
        )));
    }

    let mut slots: Vec<Option<Vec<f32>>> = vec![None; expected];
    for datum in payload.data {
        let slot = slots.get_mut(datum.index).ok_or_else(|| {
            EmbeddingProviderError::MalformedResponse(format!(
                "embedding index {} out of range",
                datum.index
            ))
        })?;
        if slot.replace(datum.embedding).is_some() {
            return Err(EmbeddingProviderError::MalformedResponse(format!(
                "duplicate embedding index {}",
                datum.index
            )));
        }
    }

    slots
        .into_iter()
        .map(|slot| {
            slot.ok_or_else(|| {
                EmbeddingProviderError::MalformedResponse("missing embedding index".to_string())
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};
    use serde_json::json;

    fn config_for(server: &MockServer) -> AppConfig {
        AppConfig {
            api_key: ApiKey::new("test-key"),
            ..AppConfig::default()
        }
        .with_api_base(&server.url("/v1"))
        .expect("mock url parses")
    }

    #[test]
    fn embedder_is_deterministic() {
        let embedder = HashedNgramEmbeddings::default();
        let first = embedder.embed("Citations follow the APA style");
        let second = embedder.embed("Citations follow the APA style");
        assert_eq!(first, second);
    }

    #[test]
    fn embedder_outputs_expected_length() {
        let embedder = HashedNgramEmbeddings { dimensions: 32 };
        assert_eq!(embedder.embed("abc").len(), 32);
        assert_eq!(embedder.embed("").len(), 32);
    }

    #[tokio::test]
    async fn openai_embeddings_are_returned_in_input_order() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/embeddings")
                    .header("authorization", "Bearer test-key")
                    .json_body_partial(r#"{"model":"text-embedding-ada-002"}"#);
                then.status(200).json_body(json!({
                    "data": [
                        { "index": 1, "embedding": [0.0, 1.0] },
                        { "index": 0, "embedding": [1.0, 0.0] }
                    ]
                }));
            })
            .await;

        let provider = OpenAiEmbeddings::new(&config_for(&server)).expect("provider");
        let vectors = provider
            .embed_batch(&["first".to_string(), "second".to_string()])
            .await
            .expect("embeddings");

        mock.assert_async().await;
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[tokio::test]
    async fn openai_embeddings_surface_http_errors() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/embeddings");
                then.status(401).body("invalid api key");
            })
            .await;

        let provider = OpenAiEmbeddings::new(&config_for(&server)).expect("provider");
        let error = provider
            .embed_batch(&["text".to_string()])
            .await
            .expect_err("401 should fail");

        assert!(matches!(error, EmbeddingProviderError::Http { status: 401, .. }));
    }

    #[tokio::test]
    async fn short_responses_are_malformed() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/embeddings");
                then.status(200).json_body(json!({
                    "data": [{ "index": 0, "embedding": [1.0] }]
                }));
            })
            .await;

        let provider = OpenAiEmbeddings::new(&config_for(&server)).expect("provider");
        let error = provider
            .embed_batch(&["a".to_string(), "b".to_string()])
            .await
            .expect_err("count mismatch should fail");

        assert!(matches!(error, EmbeddingProviderError::MalformedResponse(_)));
    }

    #[test]
    fn provider_requires_api_key() {
        let result = OpenAiEmbeddings::new(&AppConfig::default());
        assert!(matches!(result, Err(ConfigError::MissingApiKey)));
    }
}
