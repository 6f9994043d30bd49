use crate::error::AnalysisError;
use crate::models::{EssayDocument, ExtractedText};
use lopdf::Document;
use tracing::{debug, warn};

pub trait PdfExtractor {
    fn extract_text(&self, document: &EssayDocument) -> Result<ExtractedText, AnalysisError>;
}

/// Reads page text with `lopdf`, in page order, joined without separators.
#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    fn extract_text(&self, essay: &EssayDocument) -> Result<ExtractedText, AnalysisError> {
        if essay.is_empty() {
            return Err(AnalysisError::DocumentParse("essay file is empty".to_string()));
        }

        let document = Document::load_mem(&essay.bytes)
            .map_err(|error| AnalysisError::DocumentParse(error.to_string()))?;

        let mut text = String::new();
        let mut pages_read = 0u32;
        let mut pages_skipped = 0u32;

        // get_pages is a BTreeMap keyed by page number, so iteration is document order.
        for (page_no, _page_id) in document.get_pages() {
            match document.extract_text(&[page_no]) {
                Ok(page_text) if !page_text.trim().is_empty() => {
                    text.push_str(&page_text);
                    pages_read += 1;
                }
                Ok(_) => {
                    debug!(page = page_no, "page has no text");
                    pages_skipped += 1;
                }
                Err(error) => {
                    warn!(page = page_no, error = %error, "skipping unreadable page");
                    pages_skipped += 1;
                }
            }
        }

        if text.trim().is_empty() {
            return Err(AnalysisError::DocumentParse(format!(
                "pdf had no readable page text: {}",
                essay.file_name.as_deref().unwrap_or("upload")
            )));
        }

        Ok(ExtractedText {
            text,
            pages_read,
            pages_skipped,
        })
    }
}
