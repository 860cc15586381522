//! Error types for the filetext library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ExtractError`] — **Fatal**: the extraction stops and the caller gets
//!   this back from [`crate::Extractor`] (no credential, payload too large,
//!   provider rejected the request, unusable response, search exhausted).
//!
//! * [`AttemptError`] — **Recoverable**: one candidate (API version × model)
//!   failed in a way that says nothing about the request itself (model
//!   missing at that version, per-model quota, network glitch). The fallback
//!   search records it and moves on to the next candidate. It only reaches
//!   the caller wrapped inside an exhaustion error.

use std::time::Duration;
use thiserror::Error;

use once_cell::sync::Lazy;
use regex::Regex;

/// Where to check quota usage, quoted in rate-limit guidance.
pub const USAGE_DASHBOARD_URL: &str = "https://ai.dev/usage?tab=rate-limit";

/// All fatal errors returned by the filetext library.
#[derive(Debug, Error)]
pub enum ExtractError {
    // ── Configuration ─────────────────────────────────────────────────────
    /// No API credential configured. Raised before any I/O.
    #[error("Text extraction is not available: no API key configured.\n{hint}")]
    NotConfigured { hint: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Input ─────────────────────────────────────────────────────────────
    /// The byte source could not be read to the end.
    #[error("Failed to read '{file_name}': {source}")]
    ReadFailed {
        file_name: String,
        #[source]
        source: std::io::Error,
    },

    /// Base64 payload is above the provider's request-body limit.
    #[error(
        "File is too large for remote extraction: {:.2} MiB encoded (limit: {:.2} MiB)",
        *encoded_bytes as f64 / 1_048_576.0,
        *limit_bytes as f64 / 1_048_576.0
    )]
    PayloadTooLarge {
        encoded_bytes: usize,
        limit_bytes: usize,
    },

    /// No processor is registered for this file extension.
    #[error("Unsupported file type: '{extension}'\nSupported: {supported}")]
    UnsupportedFileType { extension: String, supported: String },

    // ── Provider ──────────────────────────────────────────────────────────
    /// The provider refused the request with a status that is not about
    /// model availability (400, 401, 403, 5xx, …).
    #[error("{}", format_rejection(*status, *code, provider_status.as_deref(), message))]
    ProviderRejected {
        status: u16,
        code: Option<i64>,
        provider_status: Option<String>,
        message: String,
    },

    /// A 200 response whose body is not the expected JSON document.
    #[error("Could not decode response from model '{model}': {detail}")]
    MalformedResponse { model: String, detail: String },

    /// A 200 response without any candidate text.
    #[error("Model '{model}' returned no text{}", reason.as_ref().map(|r| format!(" (reason: {r})")).unwrap_or_default())]
    EmptyResponse {
        model: String,
        reason: Option<String>,
    },

    /// The extracted text is shorter than the configured floor.
    #[error("Model '{model}' extracted too little text ({chars} characters, minimum {min})")]
    InsufficientText {
        model: String,
        chars: usize,
        min: usize,
    },

    // ── Search exhaustion ─────────────────────────────────────────────────
    /// Every candidate failed and the last failure was a quota error.
    #[error(
        "The provider's free quota has been exceeded on every model tried ({attempts} attempts).\n\
Please:\n  1) wait a few minutes and try again{},\n  2) check your usage at {},\n  3) use a different API key or upgrade the plan.\n\
Last error: {last_error}",
        retry_delay.as_ref().map(|d| format!(" (provider suggests {d})")).unwrap_or_default(),
        USAGE_DASHBOARD_URL
    )]
    RateLimited {
        attempts: usize,
        retry_delay: Option<String>,
        last_error: AttemptError,
    },

    /// Every candidate failed for availability reasons.
    #[error("No model available after {attempts} attempts. Last error: {last_error}")]
    NoModelAvailable { attempts: usize, last_error: String },

    /// The search stopped because its total time or attempt budget ran out.
    #[error(
        "Gave up after {attempts} attempts in {elapsed_secs}s (search budget exhausted). Last error: {last_error}"
    )]
    SearchBudgetExceeded {
        attempts: usize,
        elapsed_secs: u64,
        last_error: String,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ExtractError {
    /// Server-suggested wait before retrying, when the search ended on a
    /// quota error that carried a `retryDelay` hint.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ExtractError::RateLimited { retry_delay, .. } => {
                retry_delay.as_deref().and_then(parse_retry_delay)
            }
            _ => None,
        }
    }

    /// `true` for errors caused by missing or invalid configuration.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ExtractError::NotConfigured { .. } | ExtractError::InvalidConfig(_)
        )
    }
}

fn format_rejection(
    status: u16,
    code: Option<i64>,
    provider_status: Option<&str>,
    message: &str,
) -> String {
    match (code, provider_status) {
        (Some(code), Some(ps)) => {
            format!("Provider API error: {message} (status: {ps}, code: {code})")
        }
        _ => format!("Provider API error (HTTP {status}): {message}"),
    }
}

/// A recoverable failure of a single candidate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttemptError {
    /// HTTP 404: the model does not exist at this API version.
    #[error("model {model} not found at API {api_version}")]
    ModelNotFound { model: String, api_version: String },

    /// HTTP 429: quota exhausted for this model.
    #[error("quota exceeded for model {model}. Try again in {}", retry_delay.as_deref().unwrap_or("a few seconds"))]
    QuotaExceeded {
        model: String,
        api_version: String,
        retry_delay: Option<String>,
    },

    /// Could not connect, connection dropped, or the call timed out.
    #[error("request to {model} at API {api_version} failed: {detail}")]
    Transport {
        model: String,
        api_version: String,
        detail: String,
    },
}

impl AttemptError {
    pub fn is_quota(&self) -> bool {
        matches!(self, AttemptError::QuotaExceeded { .. })
    }
}

static RE_RETRY_DELAY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(\d+(?:\.\d+)?)\s*(ms|s|m)?\s*$").unwrap());

/// Parse a protobuf-style duration hint (`"17s"`, `"1.5s"`, `"250ms"`).
pub fn parse_retry_delay(raw: &str) -> Option<Duration> {
    let caps = RE_RETRY_DELAY.captures(raw)?;
    let value: f64 = caps[1].parse().ok()?;
    let secs = match caps.get(2).map(|m| m.as_str()) {
        Some("ms") => value / 1000.0,
        Some("m") => value * 60.0,
        _ => value,
    };
    Some(Duration::from_secs_f64(secs))
}
