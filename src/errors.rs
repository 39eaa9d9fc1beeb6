/*!
 * Error types for the yomiage pipeline.
 *
 * Each stage of the pipeline has its own error type so that failures can be
 * attributed to the unit they belong to: a single line, a single segment,
 * one document, or the whole run. All of them use thiserror for ergonomic
 * definitions.
 */

use std::path::PathBuf;
use thiserror::Error;

/// A unit of text that cannot be synthesized
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A line of the document is empty after trimming
    #[error("line {line_index} of document '{doc_id}' is empty after trimming")]
    EmptyLine {
        /// Document the line belongs to
        doc_id: String,
        /// 0-based position of the line in the document
        line_index: usize,
    },
}

/// Errors raised while requesting audio from the voice service or while
/// persisting the returned stream
#[derive(Error, Debug, Clone)]
pub enum SynthesisError {
    /// The request could not be sent or the body could not be read
    #[error("Synthesis request failed: {0}")]
    RequestFailed(String),

    /// The service answered with a non-success status
    #[error("Voice service responded with error: {status_code} - {message}")]
    ApiError {
        /// HTTP status code
        status_code: u16,
        /// Error body returned by the service
        message: String,
    },

    /// The service could not be reached
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// The request did not complete within the configured timeout
    #[error("Synthesis request timed out: {0}")]
    Timeout(String),

    /// The audio stream could not be written to the staging area
    #[error("Failed to write audio stream to {path:?}: {message}")]
    StreamWrite {
        /// Fragment file being written
        path: PathBuf,
        /// Underlying I/O error
        message: String,
    },
}

impl SynthesisError {
    /// Whether another attempt at the same request may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RequestFailed(_) | Self::ConnectionError(_) | Self::Timeout(_) => true,
            Self::ApiError { status_code, .. } => {
                *status_code >= 500 || *status_code == 408 || *status_code == 429
            }
            Self::StreamWrite { .. } => false,
        }
    }
}

impl From<reqwest::Error> for SynthesisError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout(error.to_string())
        } else if error.is_connect() {
            Self::ConnectionError(error.to_string())
        } else if let Some(status) = error.status() {
            Self::ApiError {
                status_code: status.as_u16(),
                message: error.to_string(),
            }
        } else {
            Self::RequestFailed(error.to_string())
        }
    }
}

/// Errors raised by the staging store
#[derive(Error, Debug)]
pub enum StagingError {
    /// The document id cannot be used as a directory name
    #[error("Invalid document id for staging: '{0}'")]
    InvalidDocumentId(String),

    /// The staging directory could not be created
    #[error("Failed to create staging directory {path:?}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A previous or finished staging directory could not be removed
    #[error("Failed to remove staging directory {path:?}: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A fragment could not be written
    #[error("Failed to write fragment {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The fragment manifest exists but could not be read
    #[error("Failed to read fragment manifest {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The directory listing failed
    #[error("Failed to list staging directory {path:?}: {source}")]
    List {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised by the naming scheme
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NamingError {
    /// An index needs more digits than the configured width
    #[error("{kind} index {index} does not fit in {width} digits")]
    IndexOverflow {
        /// Which index overflowed ("line" or "sub")
        kind: &'static str,
        index: usize,
        width: usize,
    },
}

/// Errors raised while merging the fragments of a document
#[derive(Error, Debug)]
pub enum MergeError {
    /// The staging directory could not be read
    #[error("Staging error: {0}")]
    Staging(#[from] StagingError),

    /// There is nothing to merge
    #[error("No fragments staged for document '{doc_id}'")]
    NoFragments { doc_id: String },

    /// The staged fragments differ from the segments of the document
    #[error("Fragments of document '{doc_id}' are incomplete: missing {missing:?}, unexpected {unexpected:?}")]
    Incomplete {
        doc_id: String,
        missing: Vec<String>,
        unexpected: Vec<String>,
    },

    /// Synthesis of the document never finished, so its fragment set is unknown
    #[error("Document '{doc_id}' has no fragment manifest; synthesize it again")]
    Unsealed { doc_id: String },

    /// The manifest names a file that is not a fragment of the document
    #[error("Fragment manifest of document '{doc_id}' lists foreign entry '{entry}'")]
    ForeignEntry { doc_id: String, entry: String },

    /// The concatenation tool could not be started
    #[error("Failed to run audio concatenation tool: {0}")]
    ToolUnavailable(String),

    /// The concatenation tool reported a failure
    #[error("Audio concatenation failed: {0}")]
    ToolFailed(String),

    /// The concatenation tool did not finish in time
    #[error("Audio concatenation timed out after {secs}s")]
    Timeout { secs: u64 },

    /// Reading fragments or writing the artifact failed
    #[error("Failed to write merged audio {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The reason a document did not produce a final artifact
#[derive(Error, Debug)]
pub enum DocumentError {
    /// The source file could not be read
    #[error("Failed to read document {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Another input file already resolved to the same document id
    #[error("Document id '{doc_id}' of {path:?} is already used by {first:?}")]
    DuplicateId {
        doc_id: String,
        path: PathBuf,
        first: PathBuf,
    },

    /// No document id could be derived from the file name
    #[error("Cannot derive a document id from {0:?}")]
    InvalidId(PathBuf),

    /// The document has no line with synthesizable text
    #[error("Document '{doc_id}' contains no synthesizable text")]
    Empty { doc_id: String },

    /// Staging failed for this document
    #[error("Staging error: {0}")]
    Staging(#[from] StagingError),

    /// A segment could not be named
    #[error("Naming error: {0}")]
    Naming(#[from] NamingError),

    /// One or more segments failed to synthesize
    #[error("{failed} of {total} segments failed to synthesize")]
    SegmentsFailed { failed: usize, total: usize },

    /// Every segment was synthesized but merging failed
    #[error("Merge error: {0}")]
    Merge(#[from] MergeError),
}

/// Errors that abort a whole run
#[derive(Error, Debug)]
pub enum AppError {
    /// The configuration is invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// The input directory cannot be read at all
    #[error("Input directory {path:?} is not readable: {message}")]
    InputUnavailable { path: PathBuf, message: String },

    /// The staging area cannot be read
    #[error("Staging error: {0}")]
    Staging(#[from] StagingError),

    /// The voice service could not be set up
    #[error("Synthesis error: {0}")]
    Synthesis(#[from] SynthesisError),
}
