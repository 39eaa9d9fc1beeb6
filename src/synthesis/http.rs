use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use url::Url;

use crate::app_config::{RequestMethod, SynthesisConfig, VoiceParameters};
use crate::errors::SynthesisError;

use super::{AudioStream, SynthesisRequest, VoiceSynthesizer};

/// Client for an HTTP voice service answering with an audio body
pub struct HttpSynthesizer {
    /// HTTP client for making requests
    client: Client,
    /// Synthesis endpoint
    endpoint: Url,
    /// GET with a query string or POST with a JSON body
    method: RequestMethod,
}

/// Parameters sent to the voice service
#[derive(Debug, Serialize)]
struct VoicePayload<'a> {
    /// Text to read
    text: &'a str,
    /// Voice options, flattened next to the text
    #[serde(flatten)]
    voice: &'a VoiceParameters,
}

impl HttpSynthesizer {
    /// Create a client for `endpoint`
    pub fn new(endpoint: Url, method: RequestMethod, timeout: Duration) -> Self {
        Self {
            endpoint,
            method,
            client: Client::builder()
                .timeout(timeout)
                // One voice server handles many parallel requests from us
                .pool_idle_timeout(Duration::from_secs(90))
                .pool_max_idle_per_host(20)
                .tcp_keepalive(Duration::from_secs(60))
                .build()
                .unwrap_or_default(),
        }
    }

    /// Create a client from the synthesis configuration
    pub fn from_config(config: &SynthesisConfig) -> Result<Self, SynthesisError> {
        let endpoint = config
            .endpoint_url()
            .map_err(|e| SynthesisError::RequestFailed(e.to_string()))?;
        Ok(Self::new(
            endpoint,
            config.method,
            Duration::from_secs(config.timeout_secs),
        ))
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

impl fmt::Debug for HttpSynthesizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpSynthesizer")
            .field("endpoint", &self.endpoint.as_str())
            .field("method", &self.method)
            .finish()
    }
}

#[async_trait]
impl VoiceSynthesizer for HttpSynthesizer {
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<AudioStream, SynthesisError> {
        let payload = VoicePayload {
            text: &request.text,
            voice: &request.voice,
        };

        let builder = match self.method {
            RequestMethod::Get => self.client.get(self.endpoint.clone()).query(&payload),
            RequestMethod::Post => self.client.post(self.endpoint.clone()).json(&payload),
        };

        let response = builder.send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to get error response text".to_string());
            let message: String = error_text.chars().take(500).collect();
            return Err(SynthesisError::ApiError {
                status_code: status.as_u16(),
                message,
            });
        }

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(SynthesisError::from))
            .boxed())
    }
}
