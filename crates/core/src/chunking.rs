use crate::error::AnalysisError;
use crate::models::TextChunk;

pub const DEFAULT_CHUNK_SIZE: usize = 500;
pub const DEFAULT_CHUNK_OVERLAP: usize = 100;
pub const DEFAULT_SEPARATOR: &str = "\n";

/// Window sizes are counted in characters, not bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub overlap: usize,
    pub separator: String,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_CHUNK_OVERLAP,
            separator: DEFAULT_SEPARATOR.to_string(),
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if self.chunk_size == 0 {
            return Err(AnalysisError::InvalidChunkConfig(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        if self.overlap >= self.chunk_size {
            return Err(AnalysisError::InvalidChunkConfig(format!(
                "overlap {} must be smaller than chunk_size {}",
                self.overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Chunker {
    config: ChunkingConfig,
}

impl Chunker {
    pub fn new(config: ChunkingConfig) -> Result<Self, AnalysisError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ChunkingConfig {
        &self.config
    }

    /// Lazily split `text` into overlapping windows. Call again to restart.
    pub fn chunks<'a>(&'a self, text: &'a str) -> Chunks<'a> {
        Chunks {
            text,
            config: &self.config,
            byte_pos: 0,
            char_pos: 0,
            index: 0,
            done: text.is_empty(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    text: &'a str,
    config: &'a ChunkingConfig,
    byte_pos: usize,
    char_pos: usize,
    index: usize,
    done: bool,
}

impl<'a> Chunks<'a> {
    /// Byte end and char length of the window starting at the cursor.
    fn window_end(&self) -> (usize, usize, bool) {
        let rest = &self.text[self.byte_pos..];
        let hard_end = rest
            .char_indices()
            .nth(self.config.chunk_size)
            .map(|(offset, _)| offset);

        let Some(hard_end) = hard_end else {
            return (rest.len(), rest.chars().count(), true);
        };

        let window = &rest[..hard_end];
        let separator = self.config.separator.as_str();
        if !separator.is_empty() {
            for (offset, _) in window.rmatch_indices(separator) {
                let end = offset + separator.len();
                let chars = window[..end].chars().count();
                // The next window starts `overlap` chars back, so it must still move forward.
                if chars > self.config.overlap {
                    return (end, chars, false);
                }
            }
        }

        (hard_end, self.config.chunk_size, false)
    }
}

impl<'a> Iterator for Chunks<'a> {
    type Item = TextChunk;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let (end, char_len, is_last) = self.window_end();
        let piece = &self.text[self.byte_pos..self.byte_pos + end];
        let chunk = TextChunk {
            index: self.index,
            char_start: self.char_pos,
            text: piece.to_string(),
        };

        if is_last {
            self.done = true;
        } else {
            let advance_chars = char_len - self.config.overlap;
            let advance_bytes = piece
                .char_indices()
                .nth(advance_chars)
                .map(|(offset, _)| offset)
                .unwrap_or(piece.len());
            self.byte_pos += advance_bytes;
            self.char_pos += advance_chars;
        }
        self.index += 1;

        Some(chunk)
    }
}
