//! JSON-over-HTTP collaborator clients.
//!
//! Each client POSTs one JSON document to a configured endpoint and decodes
//! one JSON document back. Stage timeouts are applied by the pipeline; the
//! client itself only bounds connection setup.

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use bytes::Bytes;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{
    Analysis, ImageAnalyzer, ImageSynthesizer, SpeechSynthesizer, SynthesizedAudio,
    SynthesizedImage,
};
use crate::error::UpstreamError;
use crate::media::MediaFormat;

/// Connect timeout for collaborator clients.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest error body kept in `UpstreamError::Status`.
const MAX_ERROR_BODY: usize = 512;

// =============================================================================
// Endpoint
// =============================================================================

/// Where a collaborator lives and how to authenticate to it.
#[derive(Debug, Clone)]
pub struct HttpEndpoint {
    client: Client,
    url: String,
    model: String,
    api_key: Option<String>,
}

impl HttpEndpoint {
    /// Create an endpoint with its own HTTP client.
    pub fn new(
        url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
    ) -> Result<Self, UpstreamError> {
        let client = Client::builder()
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .build()
            .map_err(|e| UpstreamError::Request(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self::with_client(client, url, model, api_key))
    }

    /// Create an endpoint sharing an existing client's connection pool.
    pub fn with_client(
        client: Client,
        url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            client,
            url: url.into(),
            model: model.into(),
            api_key: api_key.filter(|key| !key.is_empty()),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn post_json<B, R>(&self, body: &B) -> Result<R, UpstreamError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let mut request = self.client.post(&self.url).json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(map_reqwest_error)?;
        handle_response(response).await
    }
}

async fn handle_response<R: DeserializeOwned>(response: Response) -> Result<R, UpstreamError> {
    let status = response.status();
    if !status.is_success() {
        let mut body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        if body.len() > MAX_ERROR_BODY {
            let mut cut = MAX_ERROR_BODY;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
        }
        return Err(UpstreamError::Status {
            status: status.as_u16(),
            body,
        });
    }

    response
        .json::<R>()
        .await
        .map_err(|e| UpstreamError::InvalidResponse(format!("failed to decode response: {}", e)))
}

fn map_reqwest_error(error: reqwest::Error) -> UpstreamError {
    if error.is_timeout() {
        UpstreamError::Request(format!("request timed out: {}", error))
    } else {
        UpstreamError::Request(error.to_string())
    }
}

// =============================================================================
// Image analysis
// =============================================================================

#[derive(Serialize)]
struct AnalyzeRequest<'a> {
    model: &'a str,
    mime_type: &'a str,
    image_base64: String,
}

/// [`ImageAnalyzer`] that POSTs the image as base64 and expects an
/// [`Analysis`] document back.
#[derive(Debug, Clone)]
pub struct HttpImageAnalyzer {
    endpoint: HttpEndpoint,
}

impl HttpImageAnalyzer {
    pub fn new(endpoint: HttpEndpoint) -> Self {
        Self { endpoint }
    }
}

#[async_trait]
impl ImageAnalyzer for HttpImageAnalyzer {
    async fn analyze(&self, image: &[u8], mime_type: &str) -> Result<Analysis, UpstreamError> {
        let request = AnalyzeRequest {
            model: self.endpoint.model(),
            mime_type,
            image_base64: BASE64_STANDARD.encode(image),
        };
        debug!(url = self.endpoint.url(), bytes = image.len(), "analyzing image");

        let analysis: Analysis = self.endpoint.post_json(&request).await?;
        analysis.validate()?;
        Ok(analysis)
    }

    fn model_id(&self) -> &str {
        self.endpoint.model()
    }
}

// =============================================================================
// Image synthesis
// =============================================================================

#[derive(Serialize)]
struct SynthesizeRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct SynthesizeResponse {
    image_base64: String,
    #[serde(default)]
    mime_type: Option<String>,
}

/// [`ImageSynthesizer`] that POSTs a prompt and expects a base64 image back.
#[derive(Debug, Clone)]
pub struct HttpImageSynthesizer {
    endpoint: HttpEndpoint,
}

impl HttpImageSynthesizer {
    pub fn new(endpoint: HttpEndpoint) -> Self {
        Self { endpoint }
    }
}

#[async_trait]
impl ImageSynthesizer for HttpImageSynthesizer {
    async fn synthesize(&self, prompt: &str) -> Result<SynthesizedImage, UpstreamError> {
        let request = SynthesizeRequest {
            model: self.endpoint.model(),
            prompt,
        };
        debug!(url = self.endpoint.url(), prompt_len = prompt.len(), "synthesizing image");

        let response: SynthesizeResponse = self.endpoint.post_json(&request).await?;
        SynthesizedImage::from_base64(response.image_base64, response.mime_type.as_deref())
    }

    fn model_id(&self) -> &str {
        self.endpoint.model()
    }
}

// =============================================================================
// Speech synthesis
// =============================================================================

#[derive(Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    text: &'a str,
}

#[derive(Deserialize)]
struct SpeechResponse {
    audio_base64: String,
    #[serde(default)]
    mime_type: Option<String>,
}

/// [`SpeechSynthesizer`] that POSTs text and expects base64 audio back.
#[derive(Debug, Clone)]
pub struct HttpSpeechSynthesizer {
    endpoint: HttpEndpoint,
}

impl HttpSpeechSynthesizer {
    pub fn new(endpoint: HttpEndpoint) -> Self {
        Self { endpoint }
    }
}

#[async_trait]
impl SpeechSynthesizer for HttpSpeechSynthesizer {
    async fn synthesize_speech(&self, text: &str) -> Result<SynthesizedAudio, UpstreamError> {
        let request = SpeechRequest {
            model: self.endpoint.model(),
            text,
        };

        let response: SpeechResponse = self.endpoint.post_json(&request).await?;
        let bytes = BASE64_STANDARD
            .decode(response.audio_base64.trim())
            .map_err(|e| UpstreamError::InvalidResponse(format!("audio is not base64: {}", e)))?;
        if bytes.is_empty() {
            return Err(UpstreamError::InvalidResponse(
                "synthesized audio is empty".to_string(),
            ));
        }

        Ok(SynthesizedAudio {
            bytes: Bytes::from(bytes),
            mime_type: response
                .mime_type
                .unwrap_or_else(|| MediaFormat::Mp3.mime_type().to_string()),
        })
    }

    fn model_id(&self) -> &str {
        self.endpoint.model()
    }
}
