use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Uploaded essay bytes, consumed once by the extractor.
#[derive(Clone)]
pub struct EssayDocument {
    pub file_name: Option<String>,
    pub bytes: Vec<u8>,
}

impl EssayDocument {
    pub fn new(file_name: Option<String>, bytes: Vec<u8>) -> Self {
        Self { file_name, bytes }
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn checksum(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.bytes);
        format!("{:x}", hasher.finalize())
    }
}

impl std::fmt::Debug for EssayDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EssayDocument")
            .field("file_name", &self.file_name)
            .field("len", &self.bytes.len())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedText {
    pub text: String,
    pub pages_read: u32,
    pub pages_skipped: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextChunk {
    pub index: usize,
    /// Offset of the first character, counted in chars.
    pub char_start: usize,
    pub text: String,
}

impl TextChunk {
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: TextChunk,
    pub score: f32,
}

/// One submission: the essay plus the grade and feedback the student received.
#[derive(Debug, Clone, Default)]
pub struct EssayRequest {
    pub essay: Option<EssayDocument>,
    pub grade_text: String,
    pub feedback_text: String,
}

impl EssayRequest {
    pub fn new(
        essay: Option<EssayDocument>,
        grade_text: impl AsRef<str>,
        feedback_text: impl AsRef<str>,
    ) -> Self {
        Self {
            essay,
            grade_text: grade_text.as_ref().trim().to_string(),
            feedback_text: feedback_text.as_ref().trim().to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub request_id: String,
    pub analysis: String,
    pub chunk_count: usize,
    pub context_chunks: usize,
    pub embedding_model: String,
    pub completion_model: String,
    pub generated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_trims_grade_and_feedback() {
        let request = EssayRequest::new(None, "  68/100\n", "\tGood structure  ");
        assert_eq!(request.grade_text, "68/100");
        assert_eq!(request.feedback_text, "Good structure");
    }

    #[test]
    fn checksum_is_reproducible() {
        let first = EssayDocument::new(None, b"abc".to_vec());
        let second = EssayDocument::new(Some("essay.pdf".to_string()), b"abc".to_vec());
        assert_eq!(first.checksum(), second.checksum());
    }
}
