pub mod chunking;
pub mod composer;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod index;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod prompts;

pub use chunking::{Chunker, Chunks, ChunkingConfig};
pub use composer::{AnalysisComposer, ComposerSettings, EssayContext};
pub use config::{ApiKey, AppConfig};
pub use embeddings::{
    EmbeddingProvider, HashedNgramEmbeddings, OpenAiEmbeddings, DEFAULT_EMBEDDING_DIMENSIONS,
};
pub use error::{
    AnalysisError, ConfigError, EmbeddingProviderError, InputField, LanguageModelError,
};
pub use extractor::{LopdfExtractor, PdfExtractor};
pub use index::{EmbeddingIndex, EmbeddingIndexBuilder};
pub use llm::{CompletionRequest, EchoModel, LanguageModel, OpenAiCompletions, RetryPolicy};
pub use models::{
    AnalysisResult, EssayDocument, EssayRequest, ExtractedText, ScoredChunk, TextChunk,
};
pub use pipeline::FeedbackPipeline;
