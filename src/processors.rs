//! File-type dispatch: pick a processor by extension and turn an upload
//! into text.
//!
//! Plain text is decoded locally. Everything else goes through the remote
//! [`Extractor`]; PDFs get the PDF instruction, images and DOCX files the
//! generic one.

use crate::error::ExtractError;
use crate::extract::{not_configured, Extractor};
use crate::pipeline::request::DocumentKind;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Largest upload accepted by [`FileService`] callers, in bytes.
pub const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

pub const DOCUMENT_EXTENSIONS: &[&str] = &[".pdf", ".txt", ".docx"];
pub const IMAGE_EXTENSIONS: &[&str] = &[".png", ".jpg", ".jpeg", ".gif", ".bmp", ".webp", ".tiff"];

/// Converts the raw bytes of one file type into text.
#[async_trait]
pub trait FileProcessor: Send + Sync {
    async fn process(&self, bytes: Vec<u8>, file_name: &str) -> Result<String, ExtractError>;
}

/// `.txt` passthrough; invalid UTF-8 is replaced, never rejected.
pub struct TextProcessor;

#[async_trait]
impl FileProcessor for TextProcessor {
    async fn process(&self, bytes: Vec<u8>, _file_name: &str) -> Result<String, ExtractError> {
        Ok(match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        })
    }
}

/// Sends PDFs to the remote extractor with the PDF instruction.
pub struct PdfProcessor {
    extractor: Extractor,
}

impl PdfProcessor {
    pub fn new(extractor: Extractor) -> Self {
        Self { extractor }
    }
}

#[async_trait]
impl FileProcessor for PdfProcessor {
    async fn process(&self, bytes: Vec<u8>, file_name: &str) -> Result<String, ExtractError> {
        if !self.extractor.is_available() {
            return Err(not_configured());
        }
        let extraction = self
            .extractor
            .extract_bytes(bytes, file_name, DocumentKind::Pdf)
            .await?;
        Ok(extraction.text)
    }
}

/// Sends images and DOCX files to the remote extractor.
pub struct DocumentProcessor {
    extractor: Extractor,
}

impl DocumentProcessor {
    pub fn new(extractor: Extractor) -> Self {
        Self { extractor }
    }
}

#[async_trait]
impl FileProcessor for DocumentProcessor {
    async fn process(&self, bytes: Vec<u8>, file_name: &str) -> Result<String, ExtractError> {
        if !self.extractor.is_available() {
            return Err(not_configured());
        }
        let extraction = self
            .extractor
            .extract_bytes(bytes, file_name, DocumentKind::Generic)
            .await?;
        Ok(extraction.text)
    }
}

/// Metadata about a processed upload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    pub file_name: String,
    pub file_type: String,
    pub file_size: usize,
    pub processed_at: DateTime<Utc>,
    pub processing_time_ms: u64,
}

/// Extracted text plus metadata.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessedFile {
    pub text: String,
    pub info: FileInfo,
}

/// Accepted file types, as reported to clients.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportedTypes {
    pub documents: Vec<String>,
    pub images: Vec<String>,
    pub max_size: String,
    pub max_size_bytes: usize,
}

/// Maps extensions to processors.
#[derive(Clone)]
pub struct FileService {
    processors: BTreeMap<&'static str, Arc<dyn FileProcessor>>,
}

impl std::fmt::Debug for FileService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileService")
            .field("extensions", &self.processors.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl FileService {
    pub fn new(extractor: Extractor) -> Self {
        let text: Arc<dyn FileProcessor> = Arc::new(TextProcessor);
        let pdf: Arc<dyn FileProcessor> = Arc::new(PdfProcessor::new(extractor.clone()));
        let document: Arc<dyn FileProcessor> = Arc::new(DocumentProcessor::new(extractor));

        let mut processors = BTreeMap::new();
        processors.insert(".txt", text);
        processors.insert(".pdf", pdf);
        processors.insert(".docx", Arc::clone(&document));
        for ext in IMAGE_EXTENSIONS {
            processors.insert(*ext, Arc::clone(&document));
        }
        Self { processors }
    }

    /// Lower-cased extension with a leading dot, or `""`.
    pub fn extension_of(file_name: &str) -> String {
        Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e.to_ascii_lowercase()))
            .unwrap_or_default()
    }

    pub fn is_supported(&self, file_name: &str) -> bool {
        self.processors
            .contains_key(Self::extension_of(file_name).as_str())
    }

    /// Extensions this service accepts, sorted.
    pub fn extensions(&self) -> Vec<&'static str> {
        self.processors.keys().copied().collect()
    }

    /// Dispatch `bytes` to the processor registered for `file_name`.
    pub async fn process(&self, bytes: Vec<u8>, file_name: &str) -> Result<ProcessedFile, ExtractError> {
        let extension = Self::extension_of(file_name);
        let processor = self
            .processors
            .get(extension.as_str())
            .ok_or_else(|| ExtractError::UnsupportedFileType {
                extension: extension.clone(),
                supported: self.extensions().join(", "),
            })?;

        let start = Instant::now();
        let size = bytes.len();
        debug!("Processing '{}' ({} bytes) as {}", file_name, size, extension);
        let text = processor.process(bytes, file_name).await?;
        let processing_time_ms = start.elapsed().as_millis() as u64;
        info!(
            "Processed '{}': {} characters in {} ms",
            file_name,
            text.chars().count(),
            processing_time_ms
        );

        Ok(ProcessedFile {
            text,
            info: FileInfo {
                file_name: file_name.to_string(),
                file_type: extension,
                file_size: size,
                processed_at: Utc::now(),
                processing_time_ms,
            },
        })
    }

    pub fn supported_types(&self) -> SupportedTypes {
        SupportedTypes {
            documents: DOCUMENT_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            images: IMAGE_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            max_size: format!("{}MB", MAX_UPLOAD_BYTES / (1024 * 1024)),
            max_size_bytes: MAX_UPLOAD_BYTES,
        }
    }
}
