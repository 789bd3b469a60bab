use bytes::Bytes;
use serde_json::Value;

use crate::error::ValidationError;
use crate::media::decode_base64_payload;

/// Default upper bound on the decoded image size: 10 MiB, inclusive.
pub const DEFAULT_MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

/// Longest accepted session identifier.
pub const MAX_SESSION_ID_LEN: usize = 128;

/// One scan submission: the photo and the session it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRequest {
    pub image: Bytes,
    pub session_id: String,
}

impl ScanRequest {
    pub fn new(image: impl Into<Bytes>, session_id: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            session_id: session_id.into(),
        }
    }

    /// Build a request from an untyped JSON body.
    ///
    /// Expects `{"image": "<base64 or data URI>", "session_id": "<string>"}`.
    /// Absent or `null` fields map to the `Missing*` errors, fields of the wrong
    /// type to the `Invalid*` errors. Size and session format are checked by
    /// [`ScanRequest::validate`].
    pub fn from_json(body: &Value) -> Result<Self, ValidationError> {
        let image = match body.get("image") {
            None | Some(Value::Null) => return Err(ValidationError::MissingImage),
            Some(Value::String(encoded)) if encoded.trim().is_empty() => {
                return Err(ValidationError::MissingImage)
            }
            Some(Value::String(encoded)) => {
                let (bytes, _declared) =
                    decode_base64_payload(encoded).map_err(ValidationError::InvalidImage)?;
                bytes
            }
            Some(_) => {
                return Err(ValidationError::InvalidImage(
                    "image must be a base64 string".to_string(),
                ))
            }
        };

        let session_id = match body.get("session_id") {
            None | Some(Value::Null) => return Err(ValidationError::MissingSession),
            Some(Value::String(session_id)) => session_id.clone(),
            Some(_) => {
                return Err(ValidationError::InvalidSession(
                    "session_id must be a string".to_string(),
                ))
            }
        };

        Ok(Self::new(image, session_id))
    }

    /// Check size and session rules. `max_image_bytes` is inclusive.
    pub fn validate(&self, max_image_bytes: usize) -> Result<(), ValidationError> {
        if self.image.is_empty() {
            return Err(ValidationError::MissingImage);
        }
        if self.image.len() > max_image_bytes {
            return Err(ValidationError::ImageTooLarge {
                size: self.image.len(),
                max: max_image_bytes,
            });
        }
        validate_session_id(&self.session_id)
    }
}

/// Session identifiers are 1–128 characters from `[A-Za-z0-9_-]`.
pub fn validate_session_id(session_id: &str) -> Result<(), ValidationError> {
    if session_id.is_empty() {
        return Err(ValidationError::MissingSession);
    }
    if session_id.len() > MAX_SESSION_ID_LEN {
        return Err(ValidationError::InvalidSession(format!(
            "longer than {} characters",
            MAX_SESSION_ID_LEN
        )));
    }
    if let Some(c) = session_id
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
    {
        return Err(ValidationError::InvalidSession(format!(
            "unexpected character {:?}",
            c
        )));
    }
    Ok(())
}
