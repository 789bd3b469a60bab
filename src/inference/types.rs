use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::UpstreamError;
use crate::media::{detect_image, MediaFormat};

/// Highest allowed sub-attribute score.
pub const MAX_SCORE: u8 = 100;

/// Most sub-attributes an analysis may carry.
pub const MAX_SUB_ATTRIBUTES: usize = 8;

/// Structured description of a scanned object, as returned by the analyzer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Analysis {
    /// Creature name
    pub name: String,

    /// What the photographed object was
    pub source_label: String,

    /// Exactly two category tags
    pub tags: [String; 2],

    /// Short narrative description
    pub narrative: String,

    /// Named, scored traits
    #[serde(default)]
    pub sub_attributes: Vec<SubAttribute>,
}

/// A named trait with a 0–100 score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubAttribute {
    pub name: String,
    pub score: u8,
    pub description: String,
}

impl Analysis {
    /// Check the parts of the schema serde cannot express.
    pub fn validate(&self) -> Result<(), UpstreamError> {
        if self.name.trim().is_empty() {
            return Err(UpstreamError::InvalidResponse(
                "analysis has an empty name".to_string(),
            ));
        }
        if self.tags.iter().any(|tag| tag.trim().is_empty()) {
            return Err(UpstreamError::InvalidResponse(
                "analysis has an empty tag".to_string(),
            ));
        }
        if self.sub_attributes.len() > MAX_SUB_ATTRIBUTES {
            return Err(UpstreamError::InvalidResponse(format!(
                "analysis has {} sub-attributes (max {})",
                self.sub_attributes.len(),
                MAX_SUB_ATTRIBUTES
            )));
        }
        if let Some(attr) = self.sub_attributes.iter().find(|a| a.score > MAX_SCORE) {
            return Err(UpstreamError::InvalidResponse(format!(
                "sub-attribute '{}' has score {} (max {})",
                attr.name, attr.score, MAX_SCORE
            )));
        }
        Ok(())
    }
}

/// Image produced by the synthesizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesizedImage {
    /// Raw image bytes
    pub bytes: Bytes,

    /// Base64 form of `bytes`, reused for the embedded fallback
    pub encoded: String,

    pub mime_type: String,
}

impl SynthesizedImage {
    /// Build from raw bytes, detecting the MIME type when not given.
    pub fn from_bytes(bytes: impl Into<Bytes>, mime_type: Option<&str>) -> Self {
        let bytes = bytes.into();
        let encoded = BASE64_STANDARD.encode(&bytes);
        let mime_type = resolve_image_mime(&bytes, mime_type);
        Self {
            bytes,
            encoded,
            mime_type,
        }
    }

    /// Build from the base64 form returned by most image APIs.
    pub fn from_base64(encoded: String, mime_type: Option<&str>) -> Result<Self, UpstreamError> {
        let bytes = BASE64_STANDARD
            .decode(encoded.trim())
            .map_err(|e| UpstreamError::InvalidResponse(format!("image is not base64: {}", e)))?;
        if bytes.is_empty() {
            return Err(UpstreamError::InvalidResponse(
                "synthesized image is empty".to_string(),
            ));
        }
        let mime_type = resolve_image_mime(&bytes, mime_type);
        Ok(Self {
            bytes: Bytes::from(bytes),
            encoded: encoded.trim().to_string(),
            mime_type,
        })
    }

    pub fn format(&self) -> MediaFormat {
        MediaFormat::from_mime_type(&self.mime_type)
    }
}

fn resolve_image_mime(bytes: &[u8], declared: Option<&str>) -> String {
    match detect_image(bytes) {
        MediaFormat::Unknown => declared
            .unwrap_or(MediaFormat::Unknown.mime_type())
            .to_string(),
        detected => detected.mime_type().to_string(),
    }
}

/// Audio produced by the speech synthesizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesizedAudio {
    pub bytes: Bytes,
    pub mime_type: String,
}

impl SynthesizedAudio {
    pub fn format(&self) -> MediaFormat {
        MediaFormat::from_mime_type(&self.mime_type)
    }
}
