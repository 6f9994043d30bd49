use crate::chunking::Chunker;
use crate::composer::{AnalysisComposer, ComposerSettings, EssayContext};
use crate::config::AppConfig;
use crate::embeddings::{EmbeddingProvider, HashedNgramEmbeddings, OpenAiEmbeddings};
use crate::error::{AnalysisError, ConfigError, InputField};
use crate::extractor::{LopdfExtractor, PdfExtractor};
use crate::index::EmbeddingIndexBuilder;
use crate::llm::{EchoModel, LanguageModel, OpenAiCompletions};
use crate::models::{AnalysisResult, EssayDocument, EssayRequest};
use chrono::Utc;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Extract → chunk → embed → retrieve → compose, for one submission at a time.
pub struct FeedbackPipeline {
    config: AppConfig,
    extractor: Arc<dyn PdfExtractor + Send + Sync>,
    embeddings: Arc<dyn EmbeddingProvider>,
    model: Arc<dyn LanguageModel>,
}

impl FeedbackPipeline {
    pub fn new(
        config: AppConfig,
        extractor: Arc<dyn PdfExtractor + Send + Sync>,
        embeddings: Arc<dyn EmbeddingProvider>,
        model: Arc<dyn LanguageModel>,
    ) -> Result<Self, ConfigError> {
        config
            .chunking
            .validate()
            .map_err(|error| ConfigError::InvalidValue {
                key: "chunking".to_string(),
                details: error.to_string(),
            })?;

        Ok(Self {
            config,
            extractor,
            embeddings,
            model,
        })
    }

    /// Wires the hosted providers, or the offline ones when `config.offline` is set.
    pub fn from_config(config: AppConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let (embeddings, model): (Arc<dyn EmbeddingProvider>, Arc<dyn LanguageModel>) =
            if config.offline {
                (Arc::new(HashedNgramEmbeddings::default()), Arc::new(EchoModel))
            } else {
                (
                    Arc::new(OpenAiEmbeddings::new(&config)?),
                    Arc::new(OpenAiCompletions::new(&config)?),
                )
            };

        Self::new(config, Arc::new(LopdfExtractor), embeddings, model)
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub async fn run(&self, request: EssayRequest) -> Result<AnalysisResult, AnalysisError> {
        let (essay, grade, feedback) = validate_request(request)?;
        let request_id = Uuid::new_v4().to_string();

        info!(
            request_id = %request_id,
            essay = essay.file_name.as_deref().unwrap_or("upload"),
            essay_bytes = essay.bytes.len(),
            checksum = %essay.checksum(),
            "analysis started"
        );

        let extractor = Arc::clone(&self.extractor);
        let extracted = tokio::task::spawn_blocking(move || extractor.extract_text(&essay))
            .await
            .map_err(|error| AnalysisError::Worker(format!("extraction task failed: {error}")))??;

        info!(
            request_id = %request_id,
            pages_read = extracted.pages_read,
            pages_skipped = extracted.pages_skipped,
            chars = extracted.text.chars().count(),
            "essay text extracted"
        );

        let chunker = Chunker::new(self.config.chunking.clone())?;
        let index = EmbeddingIndexBuilder::new(self.embeddings.as_ref())
            .with_batch_size(self.config.embedding_batch_size)
            .build(chunker.chunks(&extracted.text))
            .await?;

        info!(
            request_id = %request_id,
            chunks = index.len(),
            dimension = index.dimension().unwrap_or(0),
            "embedding index built"
        );

        let composer = AnalysisComposer::new(self.model.as_ref(), ComposerSettings::from(&self.config));
        let context = composer.retrieve_context(&index, &feedback).await?;
        let analysis = composer.compose(&grade, &feedback, &context).await?;

        let context_chunks = match &context {
            EssayContext::Retrieved(hits) => hits.len(),
            EssayContext::Raw(_) => 0,
        };

        info!(
            request_id = %request_id,
            analysis_chars = analysis.chars().count(),
            "analysis completed"
        );

        Ok(AnalysisResult {
            request_id,
            analysis,
            chunk_count: index.len(),
            context_chunks,
            embedding_model: self.embeddings.model().to_string(),
            completion_model: self.config.completion_model.clone(),
            generated_at: Utc::now(),
        })
    }
}

fn validate_request(request: EssayRequest) -> Result<(EssayDocument, String, String), AnalysisError> {
    let essay = request
        .essay
        .filter(|essay| !essay.is_empty())
        .ok_or(AnalysisError::MissingInput(InputField::Essay))?;

    let grade = request.grade_text.trim().to_string();
    if grade.is_empty() {
        return Err(AnalysisError::MissingInput(InputField::Grade));
    }

    let feedback = request.feedback_text.trim().to_string();
    if feedback.is_empty() {
        return Err(AnalysisError::MissingInput(InputField::Feedback));
    }

    Ok((essay, grade, feedback))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{EmbeddingProviderError, LanguageModelError};
    use crate::extractor::tests::pdf_with_pages;
    use crate::llm::CompletionRequest;
    use crate::models::ExtractedText;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingExtractor {
        calls: AtomicUsize,
    }

    impl PdfExtractor for CountingExtractor {
        fn extract_text(&self, _essay: &EssayDocument) -> Result<ExtractedText, AnalysisError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ExtractedText {
                text: "Citations in this essay follow the APA style.\n".to_string(),
                pages_read: 1,
                pages_skipped: 0,
            })
        }
    }

    struct FailingModel;

    #[async_trait]
    impl LanguageModel for FailingModel {
        async fn complete(&self, _request: &CompletionRequest) -> Result<String, LanguageModelError> {
            Err(LanguageModelError::Authentication("invalid api key".to_string()))
        }
    }

    struct EmptyVectorProvider;

    #[async_trait]
    impl EmbeddingProvider for EmptyVectorProvider {
        fn model(&self) -> &str {
            "empty"
        }

        async fn embed_batch(
            &self,
            texts: &[String],
        ) -> Result<Vec<Vec<f32>>, EmbeddingProviderError> {
            Ok(texts.iter().map(|_| Vec::new()).collect())
        }
    }

    fn offline_config() -> AppConfig {
        AppConfig {
            offline: true,
            ..AppConfig::default()
        }
    }

    fn pipeline_with(
        extractor: Arc<dyn PdfExtractor + Send + Sync>,
        embeddings: Arc<dyn EmbeddingProvider>,
        model: Arc<dyn LanguageModel>,
    ) -> FeedbackPipeline {
        FeedbackPipeline::new(offline_config(), extractor, embeddings, model).expect("valid pipeline")
    }

    fn essay(bytes: Vec<u8>) -> Option<EssayDocument> {
        Some(EssayDocument::new(Some("essay.pdf".to_string()), bytes))
    }

    #[tokio::test]
    async fn missing_essay_never_reaches_the_extractor() {
        let extractor = Arc::new(CountingExtractor::default());
        let pipeline = pipeline_with(
            extractor.clone(),
            Arc::new(HashedNgramEmbeddings::default()),
            Arc::new(EchoModel),
        );

        for missing in [None, essay(Vec::new())] {
            let request = EssayRequest::new(missing, "68/100", "Good structure");
            let result = pipeline.run(request).await;
            assert!(matches!(
                result,
                Err(AnalysisError::MissingInput(InputField::Essay))
            ));
        }

        assert_eq!(extractor.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn blank_grade_or_feedback_is_rejected() {
        let extractor = Arc::new(CountingExtractor::default());
        let pipeline = pipeline_with(
            extractor.clone(),
            Arc::new(HashedNgramEmbeddings::default()),
            Arc::new(EchoModel),
        );

        let result = pipeline
            .run(EssayRequest::new(essay(b"%PDF".to_vec()), "   ", "Good structure"))
            .await;
        assert!(matches!(result, Err(AnalysisError::MissingInput(InputField::Grade))));

        let result = pipeline
            .run(EssayRequest::new(essay(b"%PDF".to_vec()), "68/100", "\n"))
            .await;
        assert!(matches!(
            result,
            Err(AnalysisError::MissingInput(InputField::Feedback))
        ));
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn pdf_essay_flows_into_the_prompt() {
        let pipeline = pipeline_with(
            Arc::new(LopdfExtractor),
            Arc::new(HashedNgramEmbeddings { dimensions: 1024 }),
            Arc::new(EchoModel),
        );
        let pdf = pdf_with_pages(&[
            "Every citation in this essay follows the APA referencing style.",
            "The conclusion restates the thesis about renewable energy.",
        ]);

        let result = pipeline
            .run(EssayRequest::new(
                essay(pdf),
                "68/100",
                "Good structure but weak citations",
            ))
            .await
            .expect("offline pipeline succeeds");

        assert!(result.analysis.contains("68/100"));
        assert!(result.analysis.contains("Good structure but weak citations"));
        assert!(result.analysis.contains("APA referencing style"));
        assert!(result.chunk_count >= 1);
        assert!(result.context_chunks >= 1);
        assert_eq!(result.embedding_model, "hashed-trigram");
    }

    #[tokio::test]
    async fn unreadable_pdf_is_a_document_parse_error() {
        let pipeline = pipeline_with(
            Arc::new(LopdfExtractor),
            Arc::new(HashedNgramEmbeddings::default()),
            Arc::new(EchoModel),
        );

        let result = pipeline
            .run(EssayRequest::new(essay(b"not a pdf".to_vec()), "68/100", "Fine"))
            .await;

        assert!(matches!(result, Err(AnalysisError::DocumentParse(_))));
    }

    #[tokio::test]
    async fn provider_failures_surface_unmodified() {
        let pipeline = pipeline_with(
            Arc::new(CountingExtractor::default()),
            Arc::new(HashedNgramEmbeddings::default()),
            Arc::new(FailingModel),
        );
        let result = pipeline
            .run(EssayRequest::new(essay(b"%PDF".to_vec()), "68/100", "Fine"))
            .await;
        assert!(matches!(
            result,
            Err(AnalysisError::LanguageModel(LanguageModelError::Authentication(_)))
        ));

        let pipeline = pipeline_with(
            Arc::new(CountingExtractor::default()),
            Arc::new(EmptyVectorProvider),
            Arc::new(EchoModel),
        );
        let result = pipeline
            .run(EssayRequest::new(essay(b"%PDF".to_vec()), "68/100", "Fine"))
            .await;
        assert!(matches!(
            result,
            Err(AnalysisError::Embedding(EmbeddingProviderError::MalformedVector(_)))
        ));
    }

    #[test]
    fn online_pipeline_needs_an_api_key() {
        let result = FeedbackPipeline::from_config(AppConfig::default());
        assert!(matches!(result, Err(ConfigError::MissingApiKey)));
    }

    #[test]
    fn offline_pipeline_builds_without_a_key() {
        let pipeline = FeedbackPipeline::from_config(offline_config()).expect("offline pipeline");
        assert!(pipeline.config().offline);
    }
}
