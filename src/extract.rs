//! Extraction entry points.
//!
//! [`Extractor`] is the façade over the pipeline: it reads the upload,
//! builds the request body once, resolves a fresh candidate plan and hands
//! both to the fallback executor. It carries no mutable state, so a single
//! instance (or cheap clones of it) can serve every concurrent request.

use crate::config::{ExtractorConfig, API_KEY_ENV};
use crate::error::ExtractError;
use crate::pipeline::catalog::{resolve_candidate_plan, CandidatePlan};
use crate::pipeline::executor::{run_plan, Extraction};
use crate::pipeline::request::{build_body, DocumentKind, ExtractionRequest};
use crate::progress::{ExtractionObserver, NoopObserver};
use crate::transport::{HttpTransport, ProviderTransport};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, info};

/// Client for remote text extraction.
///
/// # Example
///
/// ```rust,no_run
/// use filetext::Extractor;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let extractor = Extractor::from_env()?;
///     let file = tokio::fs::File::open("scan.png").await?;
///     let extraction = extractor.extract_from_file(file, "scan.png").await?;
///     println!("{}", extraction.text);
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct Extractor {
    config: Arc<ExtractorConfig>,
    transport: Option<Arc<dyn ProviderTransport>>,
}

impl std::fmt::Debug for Extractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Extractor")
            .field("config", &self.config)
            .field("available", &self.is_available())
            .finish()
    }
}

impl Extractor {
    /// Create an extractor from a built configuration.
    ///
    /// Without a credential the extractor is still constructed; every
    /// extraction then fails with [`ExtractError::NotConfigured`].
    pub fn new(config: ExtractorConfig) -> Result<Self, ExtractError> {
        let transport: Option<Arc<dyn ProviderTransport>> = match (&config.transport, &config.api_key) {
            (Some(t), _) => Some(Arc::clone(t)),
            (None, Some(key)) if config.has_credential() => {
                Some(Arc::new(HttpTransport::new(config.base_url.clone(), key.trim())?))
            }
            _ => None,
        };
        Ok(Self {
            config: Arc::new(config),
            transport,
        })
    }

    /// Shorthand for `Extractor::new(ExtractorConfig::from_env())`.
    pub fn from_env() -> Result<Self, ExtractError> {
        Self::new(ExtractorConfig::from_env())
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// `true` when a non-blank credential is configured.
    pub fn is_available(&self) -> bool {
        self.config.has_credential() && self.transport.is_some()
    }

    fn ready_transport(&self) -> Result<&Arc<dyn ProviderTransport>, ExtractError> {
        match &self.transport {
            Some(t) if self.config.has_credential() => Ok(t),
            _ => Err(not_configured()),
        }
    }

    /// Extract text from any supported file (images, DOCX, PDF, …).
    ///
    /// The content type is derived from `file_name`'s extension.
    pub async fn extract_from_file<R>(&self, reader: R, file_name: &str) -> Result<Extraction, ExtractError>
    where
        R: AsyncRead + Unpin,
    {
        self.ready_transport()?;
        let bytes = read_all(reader, file_name).await?;
        self.extract_bytes(bytes, file_name, DocumentKind::Generic).await
    }

    /// Extract text from a PDF using the PDF-specific instruction.
    pub async fn extract_from_pdf<R>(&self, reader: R, file_name: &str) -> Result<Extraction, ExtractError>
    where
        R: AsyncRead + Unpin,
    {
        self.ready_transport()?;
        let bytes = read_all(reader, file_name).await?;
        self.extract_bytes(bytes, file_name, DocumentKind::Pdf).await
    }

    /// Extract text from bytes already in memory.
    pub async fn extract_bytes(
        &self,
        bytes: Vec<u8>,
        file_name: &str,
        kind: DocumentKind,
    ) -> Result<Extraction, ExtractError> {
        let transport = self.ready_transport()?;
        info!("Extracting text from '{}' ({} bytes, {:?})", file_name, bytes.len(), kind);

        let request = ExtractionRequest::new(bytes, file_name, kind);
        let body = build_body(&request, self.config.max_encoded_bytes)?;
        debug!("Request body: {} bytes, content type {}", body.len(), request.content_type);

        let plan = resolve_candidate_plan(transport.as_ref(), &self.config).await;
        let observer = self.observer();
        observer.on_plan_resolved(plan.source(), plan.len());
        debug!("Candidate plan ({}): {} candidates", plan.source(), plan.len());

        run_plan(
            transport.as_ref(),
            &plan,
            body,
            &self.config.search_policy(),
            observer,
        )
        .await
    }

    /// Resolve the candidate plan an extraction would use right now.
    pub async fn candidate_plan(&self) -> Result<CandidatePlan, ExtractError> {
        let transport = self.ready_transport()?;
        Ok(resolve_candidate_plan(transport.as_ref(), &self.config).await)
    }

    fn observer(&self) -> &dyn ExtractionObserver {
        match &self.config.observer {
            Some(o) => o.as_ref(),
            None => &NoopObserver,
        }
    }
}

/// The error every extraction entry point returns without a credential.
pub(crate) fn not_configured() -> ExtractError {
    ExtractError::NotConfigured {
        hint: format!(
            "Set {API_KEY_ENV} in the environment (or pass an API key in the configuration) to enable extraction."
        ),
    }
}

async fn read_all<R: AsyncRead + Unpin>(mut reader: R, file_name: &str) -> Result<Vec<u8>, ExtractError> {
    let mut bytes = Vec::new();
    reader
        .read_to_end(&mut bytes)
        .await
        .map_err(|source| ExtractError::ReadFailed {
            file_name: file_name.to_string(),
            source,
        })?;
    Ok(bytes)
}
