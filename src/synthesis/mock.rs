/*!
 * Mock synthesizer for testing.
 *
 * This synthesizer simulates different behaviors for testing purposes:
 * - Working: returns the request text as audio bytes
 * - Failing: always returns an error
 * - FailFirst: fails the first N requests, then works
 * - Intermittent: fails every Nth request
 * - FailOn: fails requests whose text contains a needle
 * - BrokenStream: the first N streams break after their first chunk
 */

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::errors::SynthesisError;

use super::{AudioStream, SynthesisRequest, VoiceSynthesizer};

/// Mock behavior configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockBehavior {
    /// Always succeeds
    Working,
    /// Always fails with a server error
    Failing,
    /// Fails the first `count` requests
    FailFirst { count: usize },
    /// Fails every Nth request
    Intermittent { fail_every: usize },
    /// Fails requests whose text contains `needle`
    FailOn { needle: String },
    /// The first `count` streams yield one chunk, then break
    BrokenStream { count: usize },
}

/// Mock synthesizer. The audio of a request is its text encoded as UTF-8,
/// delivered in two chunks.
#[derive(Debug, Clone)]
pub struct MockSynthesizer {
    behavior: MockBehavior,
    /// Delay per request, computed from the request text
    delay: Option<fn(&str) -> u64>,
    calls: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    peak_in_flight: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl MockSynthesizer {
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            delay: None,
            calls: Arc::new(AtomicUsize::new(0)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak_in_flight: Arc::new(AtomicUsize::new(0)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn working() -> Self {
        Self::new(MockBehavior::Working)
    }

    pub fn failing() -> Self {
        Self::new(MockBehavior::Failing)
    }

    pub fn fail_first(count: usize) -> Self {
        Self::new(MockBehavior::FailFirst { count })
    }

    pub fn intermittent(fail_every: usize) -> Self {
        Self::new(MockBehavior::Intermittent {
            fail_every: fail_every.max(1),
        })
    }

    pub fn fail_on(needle: impl Into<String>) -> Self {
        Self::new(MockBehavior::FailOn {
            needle: needle.into(),
        })
    }

    pub fn broken_stream_once() -> Self {
        Self::new(MockBehavior::BrokenStream { count: 1 })
    }

    /// Delay every request by `delay_ms(text)` milliseconds
    pub fn with_delay(mut self, delay_ms: fn(&str) -> u64) -> Self {
        self.delay = Some(delay_ms);
        self
    }

    /// Number of requests received so far
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Texts of all requests in arrival order
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }

    /// Highest number of requests that were being served at the same time
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn should_fail(&self, call: usize, text: &str) -> bool {
        match &self.behavior {
            MockBehavior::Working | MockBehavior::BrokenStream { .. } => false,
            MockBehavior::Failing => true,
            MockBehavior::FailFirst { count } => call < *count,
            MockBehavior::Intermittent { fail_every } => call % fail_every == fail_every - 1,
            MockBehavior::FailOn { needle } => text.contains(needle.as_str()),
        }
    }

    fn audio_for(&self, call: usize, text: &str) -> AudioStream {
        let bytes = Bytes::copy_from_slice(text.as_bytes());
        let middle = bytes.len() / 2;
        let head = bytes.slice(..middle);
        let tail = bytes.slice(middle..);

        let broken = matches!(self.behavior, MockBehavior::BrokenStream { count } if call < count);
        let second = if broken {
            Err(SynthesisError::ConnectionError(format!(
                "Simulated broken stream (request #{})",
                call + 1
            )))
        } else {
            Ok(tail)
        };

        futures::stream::iter(vec![Ok(head), second]).boxed()
    }
}

impl Default for MockSynthesizer {
    fn default() -> Self {
        Self::working()
    }
}

#[async_trait]
impl VoiceSynthesizer for MockSynthesizer {
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<AudioStream, SynthesisError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request.text.clone());

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(current, Ordering::SeqCst);

        if let Some(delay_ms) = self.delay {
            tokio::time::sleep(Duration::from_millis(delay_ms(&request.text))).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.should_fail(call, &request.text) {
            return Err(SynthesisError::ApiError {
                status_code: 503,
                message: format!("Simulated synthesis failure (request #{})", call + 1),
            });
        }

        Ok(self.audio_for(call, &request.text))
    }
}
