//! Payload encoding: raw file bytes → base64 `inline_data` for the request body.
//!
//! The provider accepts files inline as base64 inside the JSON body and
//! enforces its own request-size limit. The encoded size is known from the
//! input length alone, so oversize files are rejected before a single byte
//! is encoded or sent.

use crate::error::ExtractError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::path::Path;
use tracing::debug;

/// MIME type used when the extension is unknown.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// MIME type of PDF documents.
pub const PDF_MIME: &str = "application/pdf";

const CONTENT_TYPES: &[(&str, &str)] = &[
    ("pdf", PDF_MIME),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("bmp", "image/bmp"),
    ("webp", "image/webp"),
    ("tif", "image/tiff"),
    ("tiff", "image/tiff"),
    (
        "docx",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    ),
];

/// Resolve a content type from the file name's extension (case-insensitive).
pub fn content_type_for(file_name: &str) -> &'static str {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    ext.and_then(|ext| {
        CONTENT_TYPES
            .iter()
            .find(|(known, _)| *known == ext)
            .map(|(_, mime)| *mime)
    })
    .unwrap_or(OCTET_STREAM)
}

/// Base64 file content tagged with its content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPayload {
    pub mime_type: String,
    pub data: String,
}

impl EncodedPayload {
    /// Size of the base64 text in bytes.
    pub fn encoded_len(&self) -> usize {
        self.data.len()
    }
}

/// Encode `bytes` as standard padded base64, failing fast when the result
/// would exceed `limit` bytes.
pub fn encode_payload(
    bytes: &[u8],
    mime_type: &str,
    limit: usize,
) -> Result<EncodedPayload, ExtractError> {
    let encoded_bytes = base64::encoded_len(bytes.len(), true).unwrap_or(usize::MAX);
    if encoded_bytes > limit {
        return Err(ExtractError::PayloadTooLarge {
            encoded_bytes,
            limit_bytes: limit,
        });
    }

    let data = STANDARD.encode(bytes);
    debug!(
        "Encoded {} bytes → {} bytes base64 ({:.2} MiB)",
        bytes.len(),
        data.len(),
        data.len() as f64 / 1_048_576.0
    );

    Ok(EncodedPayload {
        mime_type: mime_type.to_string(),
        data,
    })
}
