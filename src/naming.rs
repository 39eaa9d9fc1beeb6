/*!
 * Order-preserving fragment names.
 *
 * A fragment is named `{doc_id}-{line_index}{sub_index}.{extension}` with both
 * indices zero-padded to the same width, so that sorting names
 * lexicographically sorts fragments in reading order. The merger relies on
 * this: a directory listing is the only ordering signal it has.
 */

use crate::chunker::TextChunk;
use crate::errors::NamingError;

/// A chunk of text with its assigned fragment name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Document the segment belongs to
    pub doc_id: String,
    /// 0-based index of the originating line
    pub line_index: usize,
    /// 0-based index within the line
    pub sub_index: usize,
    /// Text to synthesize
    pub text: String,
    /// Fragment file name in the staging directory
    pub file_name: String,
}

impl Segment {
    /// Short identity used in log messages
    pub fn label(&self) -> String {
        format!("{} line {} part {}", self.doc_id, self.line_index, self.sub_index)
    }
}

/// Maps segment positions to sortable file names
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamingScheme {
    index_width: usize,
    extension: String,
}

impl NamingScheme {
    /// Create a scheme padding indices to `index_width` digits
    pub fn new(index_width: usize, extension: impl Into<String>) -> Self {
        Self {
            index_width: index_width.max(1),
            extension: extension.into().trim_start_matches('.').to_string(),
        }
    }

    pub fn index_width(&self) -> usize {
        self.index_width
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Largest index representable with the current width
    pub fn max_index(&self) -> usize {
        u32::try_from(self.index_width)
            .ok()
            .and_then(|width| 10usize.checked_pow(width))
            .map(|limit| limit - 1)
            .unwrap_or(usize::MAX)
    }

    /// File name of the fragment at (`line_index`, `sub_index`)
    pub fn file_name(
        &self,
        doc_id: &str,
        line_index: usize,
        sub_index: usize,
    ) -> Result<String, NamingError> {
        let max = self.max_index();
        if line_index > max {
            return Err(NamingError::IndexOverflow {
                kind: "line",
                index: line_index,
                width: self.index_width,
            });
        }
        if sub_index > max {
            return Err(NamingError::IndexOverflow {
                kind: "sub",
                index: sub_index,
                width: self.index_width,
            });
        }

        let width = self.index_width;
        Ok(format!(
            "{}-{:0width$}{:0width$}.{}",
            doc_id, line_index, sub_index, self.extension
        ))
    }

    /// A scheme at least as wide as this one in which both indices fit
    pub fn fitted(&self, max_line_index: usize, max_sub_index: usize) -> Self {
        let needed = digits(max_line_index).max(digits(max_sub_index));
        Self {
            index_width: self.index_width.max(needed),
            extension: self.extension.clone(),
        }
    }

    /// Recover (doc_id, line_index, sub_index) from a fragment name. The width
    /// is read from the name itself, so names of widened schemes parse too.
    pub fn parse(&self, file_name: &str) -> Option<(String, usize, usize)> {
        let stem = file_name.strip_suffix(&format!(".{}", self.extension))?;
        let (doc_id, digits) = stem.rsplit_once('-')?;
        if doc_id.is_empty()
            || digits.is_empty()
            || digits.len() % 2 != 0
            || !digits.bytes().all(|b| b.is_ascii_digit())
        {
            return None;
        }

        let (line, sub) = digits.split_at(digits.len() / 2);
        Some((doc_id.to_string(), line.parse().ok()?, sub.parse().ok()?))
    }

    /// Name every chunk of a document. With `widen_to_fit` the width grows
    /// for this document when its indices need more digits; otherwise an
    /// overflowing index is an error.
    pub fn assign(
        &self,
        doc_id: &str,
        chunks: &[TextChunk],
        widen_to_fit: bool,
    ) -> Result<Vec<Segment>, NamingError> {
        let scheme = if widen_to_fit {
            let (max_line, max_sub) = chunks.iter().fold((0, 0), |(line, sub), chunk| {
                (line.max(chunk.line_index), sub.max(chunk.sub_index))
            });
            self.fitted(max_line, max_sub)
        } else {
            self.clone()
        };

        chunks
            .iter()
            .map(|chunk| {
                Ok(Segment {
                    doc_id: doc_id.to_string(),
                    line_index: chunk.line_index,
                    sub_index: chunk.sub_index,
                    text: chunk.text.clone(),
                    file_name: scheme.file_name(doc_id, chunk.line_index, chunk.sub_index)?,
                })
            })
            .collect()
    }
}

fn digits(mut value: usize) -> usize {
    let mut count = 1;
    while value >= 10 {
        value /= 10;
        count += 1;
    }
    count
}
