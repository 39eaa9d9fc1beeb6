/*!
 * Splitting of source documents into synthesizable text chunks.
 *
 * A document is split into lines; every line keeps its position as its line
 * index. Lines longer than the configured threshold are split again on the
 * sentence terminator. Empty lines are rejected, empty sentence pieces are
 * dropped.
 */

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};

use crate::app_config::ChunkingConfig;
use crate::errors::{DocumentError, ValidationError};

static LINE_BREAK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\r\n|\r|\n").unwrap()
});

/// A text document read from the input directory
#[derive(Debug, Clone, PartialEq)]
pub struct SourceDocument {
    /// Document id derived from the file name
    pub id: String,
    /// File the document was read from
    pub path: PathBuf,
    /// Raw lines in reading order
    pub lines: Vec<String>,
}

impl SourceDocument {
    /// Build a document from its full text
    pub fn from_text(id: impl Into<String>, path: impl Into<PathBuf>, text: &str) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
            lines: split_lines(text),
        }
    }

    /// Read and decode a document from disk
    pub async fn read(id: impl Into<String>, path: &Path) -> Result<Self, DocumentError> {
        let bytes = tokio::fs::read(path).await.map_err(|source| DocumentError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let text = String::from_utf8_lossy(&bytes);
        let text = text.strip_prefix('\u{feff}').unwrap_or(&text);

        Ok(Self::from_text(id, path, text))
    }
}

/// Split text on line-break sequences. A single trailing line break does not
/// open an extra empty line.
pub fn split_lines(text: &str) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }

    let mut lines: Vec<String> = LINE_BREAK.split(text).map(str::to_string).collect();
    if lines.len() > 1 && lines.last().is_some_and(|last| last.is_empty()) {
        lines.pop();
    }
    lines
}

/// One synthesizable piece of text with its position in the document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    /// 0-based index of the originating line
    pub line_index: usize,
    /// 0-based index within the line, 0 when the line was not split
    pub sub_index: usize,
    /// Trimmed, non-empty text
    pub text: String,
}

/// Result of chunking one document
#[derive(Debug, Clone, Default)]
pub struct ChunkedDocument {
    /// Chunks in reading order
    pub chunks: Vec<TextChunk>,
    /// Lines rejected because they were empty after trimming
    pub rejected: Vec<ValidationError>,
}

/// Splits documents into chunks
#[derive(Debug, Clone)]
pub struct Chunker {
    max_line_chars: usize,
    terminator: String,
}

impl Chunker {
    /// Create a chunker splitting lines longer than `max_line_chars` on `terminator`
    pub fn new(max_line_chars: usize, terminator: impl Into<String>) -> Self {
        Self {
            max_line_chars,
            terminator: terminator.into(),
        }
    }

    pub fn from_config(config: &ChunkingConfig) -> Self {
        Self::new(config.max_line_chars, config.sentence_terminator.clone())
    }

    /// Split a document into chunks
    pub fn chunk(&self, document: &SourceDocument) -> ChunkedDocument {
        let mut result = ChunkedDocument::default();

        for (line_index, line) in document.lines.iter().enumerate() {
            match self.chunk_line(&document.id, line_index, line) {
                Ok(chunks) => result.chunks.extend(chunks),
                Err(error) => result.rejected.push(error),
            }
        }

        result
    }

    /// Split one line, rejecting it when it holds no text
    pub fn chunk_line(
        &self,
        doc_id: &str,
        line_index: usize,
        line: &str,
    ) -> Result<Vec<TextChunk>, ValidationError> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptyLine {
                doc_id: doc_id.to_string(),
                line_index,
            });
        }

        if line.chars().count() <= self.max_line_chars || self.terminator.is_empty() {
            return Ok(vec![TextChunk {
                line_index,
                sub_index: 0,
                text: trimmed.to_string(),
            }]);
        }

        // Pieces left empty by the split (e.g. after a final terminator) carry no audio
        let chunks = line
            .split(self.terminator.as_str())
            .map(str::trim)
            .filter(|piece| !piece.is_empty())
            .enumerate()
            .map(|(sub_index, piece)| TextChunk {
                line_index,
                sub_index,
                text: piece.to_string(),
            })
            .collect::<Vec<_>>();

        if chunks.is_empty() {
            // A line made only of terminators and whitespace
            return Err(ValidationError::EmptyLine {
                doc_id: doc_id.to_string(),
                line_index,
            });
        }

        Ok(chunks)
    }
}

impl Default for Chunker {
    fn default() -> Self {
        Self::from_config(&ChunkingConfig::default())
    }
}
