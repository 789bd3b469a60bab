//! Media type detection for scanned and generated images.
//!
//! Image payloads are opaque to the pipeline, but storage paths, upload
//! content types and the embedded-image fallback need a MIME type. Detection
//! looks at magic bytes only; unknown payloads are treated as
//! `application/octet-stream`.

use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use image::ImageFormat;

// =============================================================================
// MediaFormat
// =============================================================================

/// Detected media format of a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaFormat {
    Jpeg,
    Png,
    WebP,
    Gif,
    Mp3,
    Unknown,
}

impl MediaFormat {
    pub const fn mime_type(&self) -> &'static str {
        match self {
            MediaFormat::Jpeg => "image/jpeg",
            MediaFormat::Png => "image/png",
            MediaFormat::WebP => "image/webp",
            MediaFormat::Gif => "image/gif",
            MediaFormat::Mp3 => "audio/mpeg",
            MediaFormat::Unknown => "application/octet-stream",
        }
    }

    /// File extension used in object paths.
    pub const fn extension(&self) -> &'static str {
        match self {
            MediaFormat::Jpeg => "jpg",
            MediaFormat::Png => "png",
            MediaFormat::WebP => "webp",
            MediaFormat::Gif => "gif",
            MediaFormat::Mp3 => "mp3",
            MediaFormat::Unknown => "bin",
        }
    }

    /// Map a declared MIME type back to a format.
    pub fn from_mime_type(mime: &str) -> Self {
        match mime.trim().to_ascii_lowercase().as_str() {
            "image/jpeg" | "image/jpg" => MediaFormat::Jpeg,
            "image/png" => MediaFormat::Png,
            "image/webp" => MediaFormat::WebP,
            "image/gif" => MediaFormat::Gif,
            "audio/mpeg" | "audio/mp3" => MediaFormat::Mp3,
            _ => MediaFormat::Unknown,
        }
    }
}

// =============================================================================
// Detection
// =============================================================================

/// Detect an image format from magic bytes.
pub fn detect_image(bytes: &[u8]) -> MediaFormat {
    match image::guess_format(bytes) {
        Ok(ImageFormat::Jpeg) => MediaFormat::Jpeg,
        Ok(ImageFormat::Png) => MediaFormat::Png,
        Ok(ImageFormat::WebP) => MediaFormat::WebP,
        Ok(ImageFormat::Gif) => MediaFormat::Gif,
        _ => MediaFormat::Unknown,
    }
}

/// Build a `data:` URI embedding already base64-encoded content.
pub fn data_uri(mime_type: &str, base64_body: &str) -> String {
    format!("data:{};base64,{}", mime_type, base64_body)
}

/// Decode either a bare base64 string or a `data:<mime>;base64,<body>` URI.
///
/// Returns the decoded bytes and the declared MIME type, if any.
pub fn decode_base64_payload(input: &str) -> Result<(Vec<u8>, Option<String>), String> {
    let input = input.trim();
    let (declared, body) = match input.strip_prefix("data:") {
        Some(rest) => {
            let (header, body) = rest
                .split_once(',')
                .ok_or_else(|| "data URI has no ',' separator".to_string())?;
            let mime = header
                .strip_suffix(";base64")
                .ok_or_else(|| "data URI is not base64-encoded".to_string())?;
            let mime = (!mime.is_empty()).then(|| mime.to_string());
            (mime, body)
        }
        None => (None, input),
    };

    let bytes = BASE64_STANDARD
        .decode(body)
        .map_err(|e| format!("invalid base64: {}", e))?;
    Ok((bytes, declared))
}
