/*!
 * Bounded retries around a voice synthesizer.
 *
 * `RetryingSynthesizer` wraps any `VoiceSynthesizer`. A retried request is
 * read fully into memory before it is handed on, so a body that breaks half
 * way is retried like a failed request.
 */

use async_trait::async_trait;
use std::time::Duration;

use crate::errors::SynthesisError;
use crate::logging::SharedLog;

use super::{audio_from_bytes, collect_audio, AudioStream, SynthesisRequest, VoiceSynthesizer};

/// Upper bound of a single backoff delay
const MAX_BACKOFF_MS: u64 = 60_000;

/// Number of retries and the delay between them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first one
    pub max_retries: u32,
    /// Delay before the first retry, doubled on each following retry
    pub backoff_base_ms: u64,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff_base_ms: u64) -> Self {
        Self {
            max_retries,
            backoff_base_ms,
        }
    }

    /// A policy that never retries
    pub fn none() -> Self {
        Self::new(0, 0)
    }

    /// Delay before retry number `retry` (0-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u64.saturating_pow(retry);
        Duration::from_millis(self.backoff_base_ms.saturating_mul(factor).min(MAX_BACKOFF_MS))
    }
}

/// Synthesizer that retries retryable failures of an inner synthesizer
#[derive(Debug)]
pub struct RetryingSynthesizer<S> {
    inner: S,
    policy: RetryPolicy,
    log: SharedLog,
}

impl<S: VoiceSynthesizer> RetryingSynthesizer<S> {
    pub fn new(inner: S, policy: RetryPolicy, log: SharedLog) -> Self {
        Self { inner, policy, log }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    async fn attempt(&self, request: &SynthesisRequest) -> Result<AudioStream, SynthesisError> {
        let stream = self.inner.synthesize(request).await?;
        let audio = collect_audio(stream).await?;
        Ok(audio_from_bytes(audio))
    }
}

#[async_trait]
impl<S: VoiceSynthesizer> VoiceSynthesizer for RetryingSynthesizer<S> {
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<AudioStream, SynthesisError> {
        if self.policy.max_retries == 0 {
            return self.inner.synthesize(request).await;
        }

        let mut retry = 0;
        loop {
            match self.attempt(request).await {
                Ok(stream) => return Ok(stream),
                Err(e) if e.is_retryable() && retry < self.policy.max_retries => {
                    let delay = self.policy.delay_for(retry);
                    retry += 1;
                    self.log.warn(&format!(
                        "Synthesis attempt {} of {} failed ({}), retrying in {:?}",
                        retry,
                        self.policy.max_retries + 1,
                        e,
                        delay
                    ));
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn test_connection(&self) -> Result<(), SynthesisError> {
        self.inner.test_connection().await
    }
}
