use crate::config::AppConfig;
use crate::embeddings::EmbeddingProvider;
use crate::error::{AnalysisError, LanguageModelError};
use crate::index::EmbeddingIndex;
use crate::llm::{complete_with_retry, CompletionRequest, LanguageModel, RetryPolicy};
use crate::models::ScoredChunk;
use crate::prompts::render_analysis_prompt;
use tracing::info;

/// Query used when the feedback gives nothing to search with.
pub const GENERIC_QUERY: &str = "essay content";

#[derive(Debug, Clone)]
pub enum EssayContext {
    Raw(String),
    Retrieved(Vec<ScoredChunk>),
}

impl EssayContext {
    pub fn is_empty(&self) -> bool {
        match self {
            EssayContext::Raw(text) => text.trim().is_empty(),
            EssayContext::Retrieved(chunks) => chunks.is_empty(),
        }
    }

    /// Retrieved passages go back into reading order, one blank line apart.
    pub fn render(&self) -> String {
        match self {
            EssayContext::Raw(text) => text.trim().to_string(),
            EssayContext::Retrieved(chunks) => {
                let mut ordered: Vec<&ScoredChunk> = chunks.iter().collect();
                ordered.sort_by_key(|scored| scored.chunk.index);
                ordered
                    .iter()
                    .map(|scored| scored.chunk.text.trim())
                    .filter(|text| !text.is_empty())
                    .collect::<Vec<_>>()
                    .join("\n\n")
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct ComposerSettings {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_k: usize,
    pub retry: RetryPolicy,
}

impl From<&AppConfig> for ComposerSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            model: config.completion_model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            top_k: config.retrieval_top_k,
            retry: RetryPolicy::from(config),
        }
    }
}

pub fn retrieval_query(feedback: &str) -> &str {
    let trimmed = feedback.trim();
    if trimmed.is_empty() {
        GENERIC_QUERY
    } else {
        trimmed
    }
}

pub struct AnalysisComposer<'m, M: LanguageModel + ?Sized> {
    model: &'m M,
    settings: ComposerSettings,
}

impl<'m, M: LanguageModel + ?Sized> AnalysisComposer<'m, M> {
    pub fn new(model: &'m M, settings: ComposerSettings) -> Self {
        Self { model, settings }
    }

    pub fn settings(&self) -> &ComposerSettings {
        &self.settings
    }

    pub async fn retrieve_context<E>(
        &self,
        index: &EmbeddingIndex<'_, E>,
        feedback: &str,
    ) -> Result<EssayContext, AnalysisError>
    where
        E: EmbeddingProvider + ?Sized,
    {
        let query = retrieval_query(feedback);
        let hits = index.similarity_search(query, self.settings.top_k).await?;
        info!(
            query_chars = query.chars().count(),
            requested = self.settings.top_k,
            retrieved = hits.len(),
            "retrieved essay context"
        );
        Ok(EssayContext::Retrieved(hits))
    }

    pub fn render_prompt(&self, grade: &str, feedback: &str, context: &EssayContext) -> String {
        render_analysis_prompt(grade, feedback, &context.render())
    }

    /// Sends the rendered prompt and returns the completion without interpreting it.
    pub async fn compose(
        &self,
        grade: &str,
        feedback: &str,
        context: &EssayContext,
    ) -> Result<String, LanguageModelError> {
        let request = CompletionRequest {
            model: self.settings.model.clone(),
            prompt: self.render_prompt(grade, feedback, context),
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
        };

        let completion = complete_with_retry(self.model, &request, self.settings.retry).await?;
        Ok(completion.trim().to_string())
    }
}
