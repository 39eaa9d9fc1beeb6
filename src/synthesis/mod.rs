/*!
 * Voice synthesis clients.
 *
 * This module contains the seam between the pipeline and the external voice
 * service:
 * - `http`: client for the HTTP voice service
 * - `retry`: bounded retry wrapper around any synthesizer
 * - `mock`: in-process synthesizer used by tests
 */

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use std::fmt::Debug;
use std::sync::Arc;

use crate::app_config::VoiceParameters;
use crate::errors::SynthesisError;

/// Audio returned by a synthesizer, delivered as it arrives
pub type AudioStream = BoxStream<'static, Result<Bytes, SynthesisError>>;

/// Text used to probe the voice service
pub const CONNECTION_PROBE_TEXT: &str = "テスト";

/// One synthesis request: the text and the voice options to read it with
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisRequest {
    pub text: String,
    pub voice: VoiceParameters,
}

impl SynthesisRequest {
    pub fn new(text: impl Into<String>, voice: VoiceParameters) -> Self {
        Self {
            text: text.into(),
            voice,
        }
    }
}

/// Common trait for all voice synthesizers
///
/// Implementations turn a request into an audio stream. They can be wrapped
/// (see `retry::RetryingSynthesizer`) without the dispatcher noticing.
#[async_trait]
pub trait VoiceSynthesizer: Send + Sync + Debug {
    /// Request audio for one piece of text
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<AudioStream, SynthesisError>;

    /// Check that the service answers with audio
    async fn test_connection(&self) -> Result<(), SynthesisError> {
        let request = SynthesisRequest::new(CONNECTION_PROBE_TEXT, VoiceParameters::default());
        let stream = self.synthesize(&request).await?;
        collect_audio(stream).await?;
        Ok(())
    }
}

#[async_trait]
impl<T: VoiceSynthesizer + ?Sized> VoiceSynthesizer for Arc<T> {
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<AudioStream, SynthesisError> {
        (**self).synthesize(request).await
    }

    async fn test_connection(&self) -> Result<(), SynthesisError> {
        (**self).test_connection().await
    }
}

/// Read a whole audio stream into memory
pub async fn collect_audio(mut stream: AudioStream) -> Result<Bytes, SynthesisError> {
    let mut audio = Vec::new();
    while let Some(chunk) = stream.next().await {
        audio.extend_from_slice(&chunk?);
    }
    Ok(Bytes::from(audio))
}

/// Wrap an in-memory buffer as a single-chunk audio stream
pub fn audio_from_bytes(audio: Bytes) -> AudioStream {
    futures::stream::once(async move { Ok(audio) }).boxed()
}

pub mod http;
pub mod mock;
pub mod retry;
