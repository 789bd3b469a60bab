//! AI collaborators consumed by the scan pipeline.
//!
//! Each collaborator is a narrow capability trait so any vendor SDK can sit
//! behind it:
//!
//! - [`ImageAnalyzer`]: image bytes → structured [`Analysis`]
//! - [`ImageSynthesizer`]: prompt text → generated image
//! - [`SpeechSynthesizer`]: narrative text → audio (optional stage)
//!
//! The [`http`] module provides JSON-over-HTTP implementations, and
//! [`build_image_prompt`] derives the synthesis prompt from an analysis.

pub mod http;
mod prompt;
mod types;

use async_trait::async_trait;

use crate::error::UpstreamError;

pub use http::{
    HttpEndpoint, HttpImageAnalyzer, HttpImageSynthesizer, HttpSpeechSynthesizer,
    DEFAULT_CONNECT_TIMEOUT,
};
pub use prompt::{build_image_prompt, build_narration_text};
pub use types::{
    Analysis, SubAttribute, SynthesizedAudio, SynthesizedImage, MAX_SCORE, MAX_SUB_ATTRIBUTES,
};

/// Image understanding: derive structured attributes from a photo.
#[async_trait]
pub trait ImageAnalyzer: Send + Sync {
    /// Analyze image bytes of the given MIME type.
    ///
    /// Implementations must validate the response with [`Analysis::validate`].
    async fn analyze(&self, image: &[u8], mime_type: &str) -> Result<Analysis, UpstreamError>;

    /// Model identifier recorded in pipeline metrics.
    fn model_id(&self) -> &str;
}

/// Image synthesis from a text prompt.
#[async_trait]
pub trait ImageSynthesizer: Send + Sync {
    async fn synthesize(&self, prompt: &str) -> Result<SynthesizedImage, UpstreamError>;

    fn model_id(&self) -> &str;
}

/// Text-to-speech for the narrative.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize_speech(&self, text: &str) -> Result<SynthesizedAudio, UpstreamError>;

    fn model_id(&self) -> &str;
}
