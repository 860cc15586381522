//! # filetext
//!
//! Extract plain text from uploaded files (PDFs, scans, photos, DOCX) with a
//! remote multimodal model.
//!
//! ## Why this crate?
//!
//! Local OCR and document parsers each cover a slice of the formats people
//! actually upload, and scanned PDFs defeat most of them. A multimodal model
//! reads all of them the way a person would. The hard part is not the call
//! itself but keeping it working: models are renamed and retired, quota is
//! per model, and a 200 response can still be empty. This crate wraps the
//! call in a fallback search that survives all of that and reports failures
//! a user can act on.
//!
//! ## Pipeline Overview
//!
//! ```text
//! upload
//!  │
//!  ├─ 1. Request   pair bytes with instruction + content type
//!  ├─ 2. Encode    base64, reject > 20 MiB before sending
//!  ├─ 3. Catalog   live model listing → ranked candidate plan
//!  │               (static fallback list when the listing fails)
//!  ├─ 4. Execute   {v1beta, v1} × models, one call at a time;
//!  │               404/429/network → next, other statuses → stop
//!  └─ 5. Validate  non-empty, fence-stripped, ≥ 10 characters
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use filetext::{Extractor, ExtractorConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ExtractorConfig::builder().api_key("AIza...").build()?;
//!     let extractor = Extractor::new(config)?;
//!
//!     let pdf = tokio::fs::File::open("contract.pdf").await?;
//!     let extraction = extractor.extract_from_pdf(pdf, "contract.pdf").await?;
//!     eprintln!("{} answered after {} attempts", extraction.model, extraction.attempts);
//!     println!("{}", extraction.text);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `cli`    | on      | Enables the `filetext` binary (clap + anyhow + tracing-subscriber) |
//! | `server` | on      | axum router for `POST /api/v1/files/process` and friends |
//!
//! Library-only users can drop both:
//! ```toml
//! filetext = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod extract;
pub mod pipeline;
pub mod processors;
pub mod progress;
pub mod prompts;
#[cfg(feature = "server")]
pub mod server;
pub mod transport;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ExtractorConfig, ExtractorConfigBuilder};
pub use error::{AttemptError, ExtractError};
pub use extract::Extractor;
pub use pipeline::catalog::{ApiVersion, Candidate, CandidatePlan, PlanSource};
pub use pipeline::executor::{Extraction, SearchPolicy};
pub use pipeline::request::{DocumentKind, ExtractionRequest};
pub use processors::{FileInfo, FileProcessor, FileService, ProcessedFile, SupportedTypes};
pub use progress::{ExtractionObserver, NoopObserver, ObserverHandle};
pub use transport::{HttpTransport, ProviderTransport, RawResponse, TransportError};
