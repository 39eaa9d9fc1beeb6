/*!
 * Concurrent dispatch of segments to the voice service.
 *
 * Every segment becomes one synthesis request whose audio is streamed into
 * the document's staging directory under the segment's file name. All
 * requests of all documents share one semaphore, so the number of requests
 * in flight never exceeds the configured limit no matter how many documents
 * run at once.
 */

use futures::future::join_all;
use indicatif::ProgressBar;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;

use crate::app_config::VoiceParameters;
use crate::errors::SynthesisError;
use crate::logging::SharedLog;
use crate::naming::Segment;
use crate::staging::{StagingDirectory, StagingStore};
use crate::synthesis::{SynthesisRequest, VoiceSynthesizer};

/// A segment whose synthesis failed
#[derive(Debug, Clone)]
pub struct SegmentFailure {
    pub segment: Segment,
    pub error: SynthesisError,
}

/// Outcome of dispatching every segment of one document
#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    /// Document the segments belong to
    pub doc_id: String,
    /// File names of the fragments written, in segment order
    pub completed: Vec<String>,
    /// Segments that did not produce a fragment
    pub failed: Vec<SegmentFailure>,
}

impl DispatchReport {
    /// Number of segments dispatched
    pub fn total(&self) -> usize {
        self.completed.len() + self.failed.len()
    }

    /// Whether every segment produced a fragment
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Issues synthesis requests behind a shared concurrency gate
#[derive(Clone)]
pub struct SynthesisDispatcher {
    synthesizer: Arc<dyn VoiceSynthesizer>,
    gate: Arc<Semaphore>,
    voice: VoiceParameters,
    log: SharedLog,
    progress: ProgressBar,
}

impl fmt::Debug for SynthesisDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SynthesisDispatcher")
            .field("synthesizer", &self.synthesizer)
            .field("available_permits", &self.gate.available_permits())
            .finish()
    }
}

impl SynthesisDispatcher {
    /// Create a dispatcher allowing at most `concurrent_requests` requests in flight
    pub fn new(
        synthesizer: Arc<dyn VoiceSynthesizer>,
        concurrent_requests: usize,
        voice: VoiceParameters,
        log: SharedLog,
    ) -> Self {
        Self {
            synthesizer,
            gate: Arc::new(Semaphore::new(concurrent_requests.max(1))),
            voice,
            log,
            progress: ProgressBar::hidden(),
        }
    }

    /// Advance `progress` by one for every settled segment
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    pub fn progress(&self) -> &ProgressBar {
        &self.progress
    }

    /// Permits currently free at the gate
    pub fn available_permits(&self) -> usize {
        self.gate.available_permits()
    }

    /// Synthesize one segment and stream its audio into `directory`
    pub async fn dispatch_segment(
        &self,
        store: &StagingStore,
        directory: &StagingDirectory,
        segment: &Segment,
    ) -> Result<u64, SynthesisError> {
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| SynthesisError::RequestFailed(format!("dispatch gate closed: {}", e)))?;

        let start_time = Instant::now();
        let request = SynthesisRequest::new(segment.text.clone(), self.voice.clone());
        let stream = self.synthesizer.synthesize(&request).await?;
        let written = store.write_stream(directory, &segment.file_name, stream).await?;

        self.log.debug(&format!(
            "Synthesized {} ({} bytes) in {:?}",
            segment.file_name,
            written,
            start_time.elapsed()
        ));
        Ok(written)
    }

    /// Dispatch every segment of a document concurrently and wait until all
    /// of them settled. A failing segment never cancels its siblings.
    pub async fn dispatch_document(
        &self,
        store: &StagingStore,
        directory: &StagingDirectory,
        segments: &[Segment],
    ) -> DispatchReport {
        let outcomes = join_all(segments.iter().map(|segment| async move {
            let result = self.dispatch_segment(store, directory, segment).await;
            self.progress.inc(1);
            (segment, result)
        }))
        .await;

        let mut report = DispatchReport {
            doc_id: directory.doc_id().to_string(),
            ..DispatchReport::default()
        };

        for (segment, result) in outcomes {
            match result {
                Ok(_) => report.completed.push(segment.file_name.clone()),
                Err(error) => {
                    self.log.error(&format!(
                        "Segment {} ({}) failed: {}",
                        segment.label(),
                        segment.file_name,
                        error
                    ));
                    report.failed.push(SegmentFailure {
                        segment: segment.clone(),
                        error,
                    });
                }
            }
        }

        report
    }
}
