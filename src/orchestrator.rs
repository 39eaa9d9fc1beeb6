/*!
 * Batch orchestration.
 *
 * The orchestrator discovers the input documents and drives one pipeline per
 * document: read, stage, chunk, name, dispatch, merge. Documents run
 * concurrently and share the dispatcher's request gate. The failure of one
 * document is recorded in the run summary and never stops the others.
 */

use futures::future::join_all;
use indicatif::ProgressBar;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use walkdir::WalkDir;

use crate::app_config::Config;
use crate::chunker::{Chunker, SourceDocument};
use crate::dispatcher::SynthesisDispatcher;
use crate::errors::{AppError, DocumentError, MergeError, SynthesisError};
use crate::logging::SharedLog;
use crate::merger::{AudioConcatenator, FfmpegConcatenator, Merger};
use crate::naming::NamingScheme;
use crate::staging::StagingStore;
use crate::synthesis::http::HttpSynthesizer;
use crate::synthesis::retry::{RetryPolicy, RetryingSynthesizer};
use crate::synthesis::VoiceSynthesizer;

/// An input file and the document id derived from its name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputDocument {
    pub id: String,
    pub path: PathBuf,
}

/// A document that did not produce an artifact
#[derive(Debug)]
pub struct DocumentFailure {
    pub doc_id: String,
    pub path: PathBuf,
    pub error: DocumentError,
}

/// Aggregate outcome of a run
#[derive(Debug, Default)]
pub struct RunSummary {
    /// Ids of documents merged into a final artifact
    pub succeeded: Vec<String>,
    /// Documents without a final artifact
    pub failed: Vec<DocumentFailure>,
    /// Segments dispatched across all documents
    pub segments_total: usize,
    /// Segments whose synthesis failed
    pub segments_failed: usize,
    /// Lines rejected because they held no text
    pub rejected_lines: usize,
    pub elapsed: Duration,
}

impl RunSummary {
    /// Whether every document produced its artifact
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn documents_total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} documents: {} succeeded, {} failed ({} segments, {} failed, {} lines rejected) in {}",
            self.documents_total(),
            self.succeeded.len(),
            self.failed.len(),
            self.segments_total,
            self.segments_failed,
            self.rejected_lines,
            format_duration(self.elapsed)
        )
    }
}

/// Outcome of one document pipeline
#[derive(Debug)]
struct DocumentOutcome {
    input: InputDocument,
    segments_total: usize,
    segments_failed: usize,
    rejected_lines: usize,
    result: Result<PathBuf, DocumentError>,
}

impl DocumentOutcome {
    fn failed(input: InputDocument, error: DocumentError) -> Self {
        Self {
            input,
            segments_total: 0,
            segments_failed: 0,
            rejected_lines: 0,
            result: Err(error),
        }
    }
}

/// Drives the whole batch
#[derive(Debug)]
pub struct Orchestrator {
    config: Config,
    chunker: Chunker,
    naming: NamingScheme,
    store: StagingStore,
    synthesizer: Arc<dyn VoiceSynthesizer>,
    dispatcher: SynthesisDispatcher,
    merger: Merger,
    log: SharedLog,
}

impl Orchestrator {
    /// Assemble an orchestrator from its collaborators
    pub fn new(
        config: Config,
        synthesizer: Arc<dyn VoiceSynthesizer>,
        concatenator: Arc<dyn AudioConcatenator>,
        log: SharedLog,
    ) -> Self {
        let dispatcher = SynthesisDispatcher::new(
            synthesizer.clone(),
            config.synthesis.concurrent_requests,
            config.synthesis.voice.clone(),
            log.clone(),
        );
        let merger = Merger::new(
            concatenator,
            config.output_dir.clone(),
            config.audio_extension.clone(),
            log.clone(),
        );

        Self {
            chunker: Chunker::from_config(&config.chunking),
            naming: NamingScheme::new(config.naming.index_width, config.audio_extension.clone()),
            store: StagingStore::new(config.staging_dir.clone(), config.audio_extension.clone()),
            synthesizer,
            dispatcher,
            merger,
            log,
            config,
        }
    }

    /// Orchestrator talking to the configured HTTP voice service and merging with ffmpeg
    pub fn from_config(config: Config, log: SharedLog) -> Result<Self, AppError> {
        config.validate().map_err(|e| AppError::Config(e.to_string()))?;

        let http = HttpSynthesizer::from_config(&config.synthesis)?;
        let policy = RetryPolicy::new(config.synthesis.retry_count, config.synthesis.retry_backoff_ms);
        let synthesizer: Arc<dyn VoiceSynthesizer> =
            Arc::new(RetryingSynthesizer::new(http, policy, log.clone()));
        let concatenator: Arc<dyn AudioConcatenator> =
            Arc::new(FfmpegConcatenator::from_config(&config.merge));

        Ok(Self::new(config, synthesizer, concatenator, log))
    }

    /// Report settled segments on `progress`
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.dispatcher = self.dispatcher.with_progress(progress);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn staging(&self) -> &StagingStore {
        &self.store
    }

    pub fn merger(&self) -> &Merger {
        &self.merger
    }

    /// Input documents sorted by path. Files whose name yields no id, or an id
    /// already taken by an earlier file, are returned as failures.
    pub fn discover(&self) -> Result<(Vec<InputDocument>, Vec<DocumentFailure>), AppError> {
        let input_dir = &self.config.input_dir;
        if !input_dir.is_dir() {
            return Err(AppError::InputUnavailable {
                path: input_dir.clone(),
                message: "not a directory".to_string(),
            });
        }

        let mut paths = Vec::new();
        for entry in WalkDir::new(input_dir).min_depth(1).max_depth(1).follow_links(true) {
            let entry = entry.map_err(|e| AppError::InputUnavailable {
                path: input_dir.clone(),
                message: e.to_string(),
            })?;
            let path = entry.path();

            let matches_extension = path
                .extension()
                .is_some_and(|ext| ext.to_string_lossy().eq_ignore_ascii_case(&self.config.text_extension));
            if entry.file_type().is_file() && matches_extension {
                paths.push(path.to_path_buf());
            }
        }
        paths.sort();

        let mut documents = Vec::new();
        let mut failures = Vec::new();
        let mut claimed: HashMap<String, PathBuf> = HashMap::new();

        for path in paths {
            let Some(id) = self.config.document_id.derive(&path) else {
                failures.push(DocumentFailure {
                    doc_id: path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default(),
                    error: DocumentError::InvalidId(path.clone()),
                    path,
                });
                continue;
            };

            if let Some(first) = claimed.get(&id) {
                failures.push(DocumentFailure {
                    error: DocumentError::DuplicateId {
                        doc_id: id.clone(),
                        path: path.clone(),
                        first: first.clone(),
                    },
                    doc_id: id,
                    path,
                });
                continue;
            }

            claimed.insert(id.clone(), path.clone());
            documents.push(InputDocument { id, path });
        }

        Ok((documents, failures))
    }

    /// Convert every input document. Per-document failures end up in the
    /// summary; only an unreadable input directory aborts the run.
    pub async fn run(&self) -> Result<RunSummary, AppError> {
        let start_time = Instant::now();
        let (documents, rejected) = self.discover()?;

        self.log.info(&format!(
            "Found {} documents in {:?}",
            documents.len() + rejected.len(),
            self.config.input_dir
        ));

        let mut summary = RunSummary::default();
        for failure in rejected {
            self.log.error(&format!("Document '{}' skipped: {}", failure.doc_id, failure.error));
            summary.failed.push(failure);
        }

        let outcomes = join_all(documents.into_iter().map(|input| self.process_document(input))).await;

        for outcome in outcomes {
            summary.segments_total += outcome.segments_total;
            summary.segments_failed += outcome.segments_failed;
            summary.rejected_lines += outcome.rejected_lines;

            match outcome.result {
                Ok(output) => {
                    self.log.info(&format!(
                        "Document '{}' merged into {:?}",
                        outcome.input.id, output
                    ));
                    summary.succeeded.push(outcome.input.id);
                }
                Err(error) => {
                    self.log.error(&format!("Document '{}' failed: {}", outcome.input.id, error));
                    summary.failed.push(DocumentFailure {
                        doc_id: outcome.input.id,
                        path: outcome.input.path,
                        error,
                    });
                }
            }
        }

        summary.succeeded.sort();
        summary.failed.sort_by(|a, b| a.path.cmp(&b.path));
        summary.elapsed = start_time.elapsed();
        self.log.info(&format!("Run finished: {}", summary));

        Ok(summary)
    }

    async fn process_document(&self, input: InputDocument) -> DocumentOutcome {
        let document = match SourceDocument::read(input.id.clone(), &input.path).await {
            Ok(document) => document,
            Err(e) => return DocumentOutcome::failed(input, e),
        };

        let directory = match self.store.prepare(&document.id).await {
            Ok(directory) => directory,
            Err(e) => return DocumentOutcome::failed(input, e.into()),
        };

        let chunked = self.chunker.chunk(&document);
        for rejected in &chunked.rejected {
            self.log.error(&format!("Skipping line: {}", rejected));
        }
        let rejected_lines = chunked.rejected.len();

        let segments = match self
            .naming
            .assign(&document.id, &chunked.chunks, self.config.naming.widen_to_fit)
        {
            Ok(segments) if !segments.is_empty() => segments,
            result => {
                let error = match result {
                    Err(e) => DocumentError::from(e),
                    Ok(_) => DocumentError::Empty {
                        doc_id: document.id.clone(),
                    },
                };
                // Nothing was staged for this document
                if let Err(e) = self.store.dispose(&directory).await {
                    self.log.warn(&format!("Could not remove {:?}: {}", directory.path(), e));
                }
                let mut outcome = DocumentOutcome::failed(input, error);
                outcome.rejected_lines = rejected_lines;
                return outcome;
            }
        };

        self.log.debug(&format!(
            "Document '{}': {} lines, {} segments",
            document.id,
            document.lines.len(),
            segments.len()
        ));
        self.dispatcher.progress().inc_length(segments.len() as u64);

        let report = self.dispatcher.dispatch_document(&self.store, &directory, &segments).await;

        let result = if report.is_complete() {
            let expected: Vec<String> = segments.iter().map(|s| s.file_name.clone()).collect();
            match self.store.write_manifest(&directory, &expected).await {
                Ok(()) => self
                    .merger
                    .merge(&self.store, &directory, &expected)
                    .await
                    .map_err(DocumentError::from),
                Err(e) => Err(DocumentError::from(e)),
            }
        } else {
            // Staging keeps the fragments that did succeed
            Err(DocumentError::SegmentsFailed {
                failed: report.failed.len(),
                total: report.total(),
            })
        };

        DocumentOutcome {
            input,
            segments_total: report.total(),
            segments_failed: report.failed.len(),
            rejected_lines,
            result,
        }
    }

    /// Merge every staging directory left on disk by an earlier run whose
    /// synthesis finished, and dispose the ones that merged. Directories of
    /// documents with failed segments are left alone.
    pub async fn merge_staged(&self) -> Result<RunSummary, AppError> {
        let start_time = Instant::now();
        let directories = self.store.existing().await?;

        let mut summary = RunSummary::default();
        for directory in directories {
            let doc_id = directory.doc_id().to_string();

            match self.store.list(&directory).await {
                Ok(fragments) if fragments.is_empty() => {
                    self.log.warn(&format!("No fragments staged for '{}', skipping", doc_id));
                    continue;
                }
                Ok(_) => {}
                Err(e) => {
                    self.log.error(&format!("Document '{}' failed: {}", doc_id, e));
                    summary.failed.push(DocumentFailure {
                        doc_id,
                        path: directory.path().to_path_buf(),
                        error: e.into(),
                    });
                    continue;
                }
            }

            match self.merger.merge_staged(&self.store, &directory).await {
                Ok(output) => {
                    self.log.info(&format!("Document '{}' merged into {:?}", doc_id, output));
                    summary.succeeded.push(doc_id);
                }
                Err(MergeError::Unsealed { .. }) => {
                    self.log.error(&format!(
                        "Document '{}' has unfinished segments in {:?}, not merging; run it again",
                        doc_id,
                        directory.path()
                    ));
                }
                Err(e) => {
                    self.log.error(&format!("Document '{}' failed: {}", doc_id, e));
                    summary.failed.push(DocumentFailure {
                        doc_id,
                        path: directory.path().to_path_buf(),
                        error: e.into(),
                    });
                }
            }
        }

        summary.elapsed = start_time.elapsed();
        self.log.info(&format!("Merge finished: {}", summary));
        Ok(summary)
    }

    /// Probe the voice service with a short request
    pub async fn check_connection(&self) -> Result<(), SynthesisError> {
        self.synthesizer.test_connection().await
    }
}

/// Format a duration for humans (`1h 2m 3s`, `2m 3s`, `3.042s`)
pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}.{:03}s", seconds, duration.subsec_millis())
    }
}
