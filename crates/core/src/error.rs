use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Form field that was absent or blank at submission time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputField {
    Essay,
    Grade,
    Feedback,
}

impl fmt::Display for InputField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InputField::Essay => "essay",
            InputField::Grade => "grade",
            InputField::Feedback => "feedback",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("missing input: {0}")]
    MissingInput(InputField),

    #[error("pdf parse error: {0}")]
    DocumentParse(String),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("embedding provider error: {0}")]
    Embedding(#[from] EmbeddingProviderError),

    #[error("language model error: {0}")]
    LanguageModel(#[from] LanguageModelError),

    #[error("pipeline worker unavailable: {0}")]
    Worker(String),
}

impl AnalysisError {
    /// Message suitable for showing to the student.
    pub fn user_message(&self) -> String {
        match self {
            AnalysisError::MissingInput(InputField::Essay) => {
                "Please try uploading your essay again.".to_string()
            }
            AnalysisError::MissingInput(field) => {
                format!("Please enter your {field} before submitting.")
            }
            AnalysisError::DocumentParse(_) => {
                "We couldn't read any text from that PDF. Please check the file and upload it again."
                    .to_string()
            }
            AnalysisError::InvalidChunkConfig(details) => {
                format!("The service is misconfigured: {details}")
            }
            AnalysisError::Embedding(error) => {
                format!("The analysis service is unavailable right now ({error}). Please try again later.")
            }
            AnalysisError::LanguageModel(error) => {
                format!("The analysis service is unavailable right now ({error}). Please try again later.")
            }
            AnalysisError::Worker(_) => {
                "The analysis service is shutting down. Please try again later.".to_string()
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum EmbeddingProviderError {
    #[error("embedding provider unreachable: {0}")]
    Unavailable(String),

    #[error("embedding provider returned {status}: {body}")]
    Http { status: u16, body: String },

    #[error("malformed embedding response: {0}")]
    MalformedResponse(String),

    #[error("malformed embedding vector: {0}")]
    MalformedVector(String),

    #[error("embedding dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },
}

#[derive(Debug, Error)]
pub enum LanguageModelError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("rate limited by provider")]
    RateLimited { retry_after: Option<Duration> },

    #[error("provider unreachable: {0}")]
    Unavailable(String),

    #[error("provider returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("invalid completion response: {0}")]
    InvalidResponse(String),
}

impl LanguageModelError {
    /// Transient failures worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LanguageModelError::Timeout(_)
                | LanguageModelError::RateLimited { .. }
                | LanguageModelError::Unavailable(_)
        )
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing api key: set OPENAI_API_KEY or pass --api-key (or use --offline)")]
    MissingApiKey,

    #[error("invalid value for {key}: {details}")]
    InvalidValue { key: String, details: String },

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),
}

pub type Result<T, E = AnalysisError> = std::result::Result<T, E>;
