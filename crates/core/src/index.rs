//! Flat in-memory nearest-neighbour index over embedded chunks.
//!
//! The index lives for one analysis request. It borrows the embedding provider it
//! was built with so queries are embedded into the same vector space.

use crate::embeddings::EmbeddingProvider;
use crate::error::EmbeddingProviderError;
use crate::models::{ScoredChunk, TextChunk};
use tracing::debug;

pub const DEFAULT_BATCH_SIZE: usize = 64;

struct IndexEntry {
    chunk: TextChunk,
    vector: Vec<f32>,
    norm: f32,
}

pub struct EmbeddingIndexBuilder<'p, E: EmbeddingProvider + ?Sized> {
    provider: &'p E,
    batch_size: usize,
}

impl<'p, E: EmbeddingProvider + ?Sized> EmbeddingIndexBuilder<'p, E> {
    pub fn new(provider: &'p E) -> Self {
        Self {
            provider,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub async fn build<I>(&self, chunks: I) -> Result<EmbeddingIndex<'p, E>, EmbeddingProviderError>
    where
        I: IntoIterator<Item = TextChunk>,
    {
        let chunks: Vec<TextChunk> = chunks.into_iter().collect();
        let mut entries = Vec::with_capacity(chunks.len());
        let mut dimension: Option<usize> = None;

        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|chunk| chunk.text.clone()).collect();
            let vectors = self.provider.embed_batch(&texts).await?;

            if vectors.len() != batch.len() {
                return Err(EmbeddingProviderError::MalformedResponse(format!(
                    "expected {} embeddings, received {}",
                    batch.len(),
                    vectors.len()
                )));
            }

            for (chunk, vector) in batch.iter().zip(vectors) {
                check_vector(&vector, dimension)?;
                dimension.get_or_insert(vector.len());
                entries.push(IndexEntry {
                    chunk: chunk.clone(),
                    norm: norm(&vector),
                    vector,
                });
            }
        }

        debug!(
            model = self.provider.model(),
            chunks = entries.len(),
            dimension = dimension.unwrap_or(0),
            "built embedding index"
        );

        Ok(EmbeddingIndex {
            provider: self.provider,
            entries,
            dimension,
        })
    }
}

pub struct EmbeddingIndex<'p, E: EmbeddingProvider + ?Sized> {
    provider: &'p E,
    entries: Vec<IndexEntry>,
    dimension: Option<usize>,
}

impl<'p, E: EmbeddingProvider + ?Sized> EmbeddingIndex<'p, E> {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    /// Returns the `min(k, len)` chunks closest to `query` by cosine similarity.
    pub async fn similarity_search(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<ScoredChunk>, EmbeddingProviderError> {
        if self.entries.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let mut vectors = self.provider.embed_batch(&[query.to_string()]).await?;
        let query_vector = vectors.pop().ok_or_else(|| {
            EmbeddingProviderError::MalformedResponse("no embedding for query".to_string())
        })?;

        self.search_by_vector(&query_vector, k)
    }

    pub fn search_by_vector(
        &self,
        query_vector: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredChunk>, EmbeddingProviderError> {
        check_vector(query_vector, self.dimension)?;
        let query_norm = norm(query_vector);

        let mut scored: Vec<ScoredChunk> = self
            .entries
            .iter()
            .map(|entry| ScoredChunk {
                chunk: entry.chunk.clone(),
                score: cosine(query_vector, query_norm, &entry.vector, entry.norm),
            })
            .collect();

        scored.sort_by(|left, right| {
            right
                .score
                .total_cmp(&left.score)
                .then(left.chunk.index.cmp(&right.chunk.index))
        });
        scored.truncate(k);

        Ok(scored)
    }
}

fn check_vector(vector: &[f32], expected: Option<usize>) -> Result<(), EmbeddingProviderError> {
    if vector.is_empty() {
        return Err(EmbeddingProviderError::MalformedVector(
            "embedding has zero dimensions".to_string(),
        ));
    }
    if vector.iter().any(|value| !value.is_finite()) {
        return Err(EmbeddingProviderError::MalformedVector(
            "embedding contains non-finite values".to_string(),
        ));
    }
    match expected {
        Some(expected) if expected != vector.len() => Err(EmbeddingProviderError::DimensionMismatch {
            expected,
            found: vector.len(),
        }),
        _ => Ok(()),
    }
}

fn norm(vector: &[f32]) -> f32 {
    vector.iter().map(|value| value * value).sum::<f32>().sqrt()
}

fn cosine(left: &[f32], left_norm: f32, right: &[f32], right_norm: f32) -> f32 {
    if left_norm == 0.0 || right_norm == 0.0 {
        return 0.0;
    }
    let dot: f32 = left.iter().zip(right).map(|(a, b)| a * b).sum();
    dot / (left_norm * right_norm)
}
