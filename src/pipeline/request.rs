//! Request building: one file + one instruction → the `generateContent` body.
//!
//! The body is serialised exactly once per extraction. The resulting
//! [`Bytes`] is reference-counted, so every candidate of the fallback search
//! sends the same buffer without re-encoding a multi-megabyte payload.

use crate::error::ExtractError;
use crate::pipeline::encode::{content_type_for, encode_payload, PDF_MIME};
use crate::prompts::{generic_instruction, pdf_instruction};
use bytes::Bytes;
use serde::Serialize;

/// Which instruction and content-type rule apply to a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DocumentKind {
    /// Content type from the extension table, generic instruction.
    #[default]
    Generic,
    /// Always `application/pdf`, PDF instruction.
    Pdf,
}

/// Everything sent to the provider for one extraction.
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub content_type: String,
    pub instruction: String,
}

impl ExtractionRequest {
    pub fn new(bytes: Vec<u8>, file_name: &str, kind: DocumentKind) -> Self {
        match kind {
            DocumentKind::Generic => Self::for_file(bytes, file_name),
            DocumentKind::Pdf => Self::for_pdf(bytes, file_name),
        }
    }

    pub fn for_file(bytes: Vec<u8>, file_name: &str) -> Self {
        Self {
            bytes,
            file_name: file_name.to_string(),
            content_type: content_type_for(file_name).to_string(),
            instruction: generic_instruction(file_name),
        }
    }

    pub fn for_pdf(bytes: Vec<u8>, file_name: &str) -> Self {
        Self {
            bytes,
            file_name: file_name.to_string(),
            content_type: PDF_MIME.to_string(),
            instruction: pdf_instruction(file_name),
        }
    }
}

// ── Wire format ──────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct GenerateContentBody<'a> {
    contents: [Content<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 2],
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part<'a> {
    InlineData { inline_data: InlineData<'a> },
    Text { text: &'a str },
}

#[derive(Debug, Serialize)]
struct InlineData<'a> {
    mime_type: &'a str,
    data: &'a str,
}

/// Encode the file and serialise the JSON request body.
///
/// Fails with [`ExtractError::PayloadTooLarge`] before encoding when the
/// base64 form would exceed `max_encoded_bytes`.
pub fn build_body(request: &ExtractionRequest, max_encoded_bytes: usize) -> Result<Bytes, ExtractError> {
    let payload = encode_payload(&request.bytes, &request.content_type, max_encoded_bytes)?;

    let body = GenerateContentBody {
        contents: [Content {
            parts: [
                Part::InlineData {
                    inline_data: InlineData {
                        mime_type: &payload.mime_type,
                        data: &payload.data,
                    },
                },
                Part::Text {
                    text: &request.instruction,
                },
            ],
        }],
    };

    let json = serde_json::to_vec(&body)
        .map_err(|e| ExtractError::Internal(format!("Failed to serialise request body: {e}")))?;
    Ok(Bytes::from(json))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn body_layout_matches_wire_format() {
        let req = ExtractionRequest::for_file(b"abc".to_vec(), "photo.png");
        let body = build_body(&req, 1024).unwrap();
        let v: Value = serde_json::from_slice(&body).unwrap();

        let parts = &v["contents"][0]["parts"];
        assert_eq!(parts[0]["inline_data"]["mime_type"], "image/png");
        assert_eq!(parts[0]["inline_data"]["data"], "YWJj");
        assert!(parts[1]["text"].as_str().unwrap().contains("photo.png"));
        assert_eq!(parts.as_array().unwrap().len(), 2);
    }

    #[test]
    fn pdf_request_forces_pdf_type() {
        let req = ExtractionRequest::for_pdf(vec![1, 2, 3], "scan.bin");
        assert_eq!(req.content_type, "application/pdf");
        assert!(req.instruction.contains("PDF"));
    }

    #[test]
    fn kind_selects_constructor() {
        let generic = ExtractionRequest::new(vec![], "notes.docx", DocumentKind::Generic);
        assert!(generic.content_type.contains("wordprocessingml"));
        let pdf = ExtractionRequest::new(vec![], "notes.docx", DocumentKind::Pdf);
        assert_eq!(pdf.content_type, "application/pdf");
    }

    #[test]
    fn oversize_file_fails_before_serialisation() {
        let req = ExtractionRequest::for_file(vec![0u8; 300], "big.pdf");
        assert!(matches!(
            build_body(&req, 100),
            Err(ExtractError::PayloadTooLarge { .. })
        ));
    }
}
