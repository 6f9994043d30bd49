use crate::config::{ApiKey, AppConfig};
use crate::error::{ConfigError, LanguageModelError};
use async_trait::async_trait;
use reqwest::{header::RETRY_AFTER, Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Hosted completion endpoint: one prompt in, one completion out.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LanguageModelError>;
}

/// Returns the prompt unchanged. Used by `--offline` runs and tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoModel;

#[async_trait]
impl LanguageModel for EchoModel {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LanguageModelError> {
        Ok(request.prompt.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
        }
    }

    fn delay_for(&self, attempt: u32, error: &LanguageModelError) -> Duration {
        if let LanguageModelError::RateLimited {
            retry_after: Some(retry_after),
        } = error
        {
            return *retry_after;
        }
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

impl From<&AppConfig> for RetryPolicy {
    fn from(config: &AppConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: config.retry_base_delay,
        }
    }
}

/// Retries transient failures with exponential backoff; everything else is returned as is.
pub async fn complete_with_retry<M>(
    model: &M,
    request: &CompletionRequest,
    policy: RetryPolicy,
) -> Result<String, LanguageModelError>
where
    M: LanguageModel + ?Sized,
{
    let mut attempt = 0u32;
    loop {
        match model.complete(request).await {
            Ok(completion) => return Ok(completion),
            Err(error) if error.is_retryable() && attempt < policy.max_retries => {
                let delay = policy.delay_for(attempt, &error);
                warn!(
                    attempt = attempt + 1,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "completion failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(error) => return Err(error),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    #[serde(default)]
    text: Option<String>,
}

/// OpenAI-compatible `/completions` endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiCompletions {
    client: Client,
    endpoint: String,
    api_key: ApiKey,
    timeout: Duration,
}

impl OpenAiCompletions {
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
            endpoint: config.endpoint("completions"),
            api_key: api_key.clone(),
            timeout: config.request_timeout,
        })
    }
}

#[async_trait]
impl LanguageModel for OpenAiCompletions {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LanguageModelError> {
        debug!(
            model = %request.model,
            prompt_chars = request.prompt.chars().count(),
            max_tokens = request.max_tokens,
            "requesting completion"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose())
            .json(request)
            .send()
            .await
            .map_err(|error| {
                if error.is_timeout() {
                    LanguageModelError::Timeout(self.timeout)
                } else {
                    LanguageModelError::Unavailable(format!("{}: {error}", self.endpoint))
                }
            })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(LanguageModelError::RateLimited { retry_after });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    LanguageModelError::Authentication(body)
                }
                _ => LanguageModelError::Api {
                    status: status.as_u16(),
                    body,
                },
            });
        }

        let payload: CompletionResponse = response.json().await.map_err(|error| {
            if error.is_timeout() {
                LanguageModelError::Timeout(self.timeout)
            } else {
                LanguageModelError::InvalidResponse(error.to_string())
            }
        })?;

        payload
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.text)
            .ok_or_else(|| LanguageModelError::InvalidResponse("response had no choices".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};
    use serde_json::json;

    fn config_for(server: &MockServer) -> AppConfig {
        AppConfig {
            api_key: ApiKey::new("test-key"),
            request_timeout: Duration::from_millis(500),
            ..AppConfig::default()
        }
        .with_api_base(&server.url("/v1"))
        .expect("mock url parses")
    }

    fn request() -> CompletionRequest {
        CompletionRequest {
            model: "gpt-3.5-turbo-instruct".to_string(),
            prompt: "Explain my grade".to_string(),
            max_tokens: 64,
            temperature: 0.7,
        }
    }

    fn fast_retries(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn completion_text_is_returned() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/completions")
                    .header("authorization", "Bearer test-key")
                    .json_body_partial(
                        r#"{"model":"gpt-3.5-turbo-instruct","prompt":"Explain my grade"}"#,
                    );
                then.status(200).json_body(json!({
                    "choices": [{ "text": "1. **Grade Summary**: You received..." }]
                }));
            })
            .await;

        let model = OpenAiCompletions::new(&config_for(&server)).expect("client");
        let completion = model.complete(&request()).await.expect("completion");

        mock.assert_async().await;
        assert!(completion.contains("Grade Summary"));
    }

    #[tokio::test]
    async fn unauthorized_is_not_retried() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/completions");
                then.status(401).body("invalid api key");
            })
            .await;

        let model = OpenAiCompletions::new(&config_for(&server)).expect("client");
        let error = complete_with_retry(&model, &request(), fast_retries(3))
            .await
            .expect_err("401 should fail");

        assert!(matches!(error, LanguageModelError::Authentication(_)));
        assert_eq!(mock.hits_async().await, 1);
    }

    #[tokio::test]
    async fn rate_limits_are_retried_until_exhausted() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/completions");
                then.status(429).body("slow down");
            })
            .await;

        let model = OpenAiCompletions::new(&config_for(&server)).expect("client");
        let error = complete_with_retry(&model, &request(), fast_retries(2))
            .await
            .expect_err("429 should fail after retries");

        assert!(matches!(error, LanguageModelError::RateLimited { .. }));
        assert_eq!(mock.hits_async().await, 3);
    }

    #[tokio::test]
    async fn slow_provider_times_out() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/completions");
                then.status(200)
                    .delay(Duration::from_secs(2))
                    .json_body(json!({ "choices": [{ "text": "late" }] }));
            })
            .await;

        let model = OpenAiCompletions::new(&config_for(&server)).expect("client");
        let error = model.complete(&request()).await.expect_err("should time out");

        assert!(matches!(error, LanguageModelError::Timeout(_)));
    }

    #[tokio::test]
    async fn empty_choices_are_invalid() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/completions");
                then.status(200).json_body(json!({ "choices": [] }));
            })
            .await;

        let model = OpenAiCompletions::new(&config_for(&server)).expect("client");
        let error = model.complete(&request()).await.expect_err("no choices");

        assert!(matches!(error, LanguageModelError::InvalidResponse(_)));
    }

    #[test]
    fn retry_after_header_overrides_backoff() {
        let policy = fast_retries(2);
        let error = LanguageModelError::RateLimited {
            retry_after: Some(Duration::from_secs(3)),
        };
        assert_eq!(policy.delay_for(0, &error), Duration::from_secs(3));
        assert_eq!(
            policy.delay_for(2, &LanguageModelError::Unavailable("down".to_string())),
            Duration::from_millis(4)
        );
    }
}
