/*!
 * # yomiage - batch text-to-speech
 *
 * A Rust library that turns directories of text documents into narrated
 * audio by delegating speech synthesis to an external voice service.
 *
 * ## Features
 *
 * - Line-based splitting, with long lines split again on a sentence terminator
 * - Order-preserving fragment names, so completion order never matters
 * - Bounded concurrent requests shared by every document of a run
 * - Optional retries with exponential backoff
 * - Per-document merge through ffmpeg, only when every fragment exists
 * - Merge-only retry of documents left in the staging area
 *
 * ## Architecture
 *
 * The library is organized in these main modules:
 * - `app_config`: Configuration management
 * - `chunker`: Reading documents and splitting them into chunks
 * - `naming`: Fragment file names that sort in reading order
 * - `staging`: Per-document working directories
 * - `synthesis`: The voice service seam:
 *   - `synthesis::http`: HTTP client for the voice service
 *   - `synthesis::retry`: Retry wrapper around any synthesizer
 *   - `synthesis::mock`: In-process synthesizer for tests
 * - `dispatcher`: Concurrent, gated dispatch of segments
 * - `merger`: Concatenation of fragments into the final audio file
 * - `orchestrator`: Discovery and per-document pipelines
 * - `logging`: Logging capability passed to every component
 * - `errors`: Custom error types for the application
 *
 * ## License
 *
 * This project is licensed under the MIT License
 */

// Global lints configuration
// These lints will be allowed but not auto-fixed
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]
// Test names follow test_subject_condition_shouldOutcome
#![cfg_attr(test, allow(non_snake_case))]

// Public modules
pub mod app_config;
pub mod chunker;
pub mod dispatcher;
pub mod errors;
pub mod logging;
pub mod merger;
pub mod naming;
pub mod orchestrator;
pub mod staging;
pub mod synthesis;

// Re-export main types for easier usage
pub use app_config::Config;
pub use chunker::{Chunker, SourceDocument, TextChunk};
pub use dispatcher::{DispatchReport, SynthesisDispatcher};
pub use errors::{AppError, DocumentError, MergeError, StagingError, SynthesisError, ValidationError};
pub use logging::{CapturingLog, FacadeLog, RunLog, SharedLog};
pub use merger::{AudioConcatenator, ByteConcatenator, FfmpegConcatenator, Merger};
pub use naming::{NamingScheme, Segment};
pub use orchestrator::{Orchestrator, RunSummary};
pub use staging::{StagingDirectory, StagingStore};
pub use synthesis::{SynthesisRequest, VoiceSynthesizer};
