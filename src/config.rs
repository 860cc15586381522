//! Configuration types for remote text extraction.
//!
//! All extraction behaviour is controlled through [`ExtractorConfig`], built
//! via its [`ExtractorConfigBuilder`]. The config is immutable once built and
//! is the only state an [`crate::Extractor`] carries, so one instance can be
//! shared by every concurrent upload.

use crate::error::ExtractError;
use crate::pipeline::catalog::{ApiVersion, FALLBACK_MODELS};
use crate::pipeline::executor::SearchPolicy;
use crate::progress::ObserverHandle;
use crate::transport::ProviderTransport;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Public endpoint of the Generative Language API.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Environment variable holding the API credential.
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Environment variable overriding [`DEFAULT_BASE_URL`].
pub const BASE_URL_ENV: &str = "GEMINI_BASE_URL";

/// Configuration for the extraction client.
///
/// # Example
/// ```rust
/// use filetext::ExtractorConfig;
///
/// let config = ExtractorConfig::builder()
///     .api_key("AIza...")
///     .search_timeout_secs(300)
///     .build()
///     .unwrap();
/// assert!(config.has_credential());
/// ```
#[derive(Clone)]
pub struct ExtractorConfig {
    /// API credential, sent as the `key` query parameter. Extraction is
    /// unavailable while this is `None` or blank.
    pub api_key: Option<String>,

    /// Base URL of the provider, without a trailing slash.
    pub base_url: String,

    /// API versions to try, in order. Default: v1beta, then v1.
    ///
    /// Model names are published under v1beta first and only some of them
    /// reach v1, so the beta surface is searched first.
    pub api_versions: Vec<ApiVersion>,

    /// Pinned model list. When set the catalog is not queried at all.
    pub models: Option<Vec<String>>,

    /// Models tried when the catalog cannot be fetched.
    pub fallback_models: Vec<String>,

    /// Per-call timeout in seconds. Default: 300.
    ///
    /// Large scanned PDFs routinely take minutes to process; a timeout
    /// counts as a failure of that candidate only.
    pub call_timeout_secs: u64,

    /// Timeout for the model-listing call in seconds. Default: 30.
    pub catalog_timeout_secs: u64,

    /// Wall-clock budget for the whole fallback search. Default: 600.
    pub search_timeout_secs: u64,

    /// Maximum number of candidates tried per extraction. Default: 40.
    pub max_attempts: usize,

    /// Ceiling on the base64 payload size in bytes. Default: 20 MiB.
    pub max_encoded_bytes: usize,

    /// Minimum number of characters an accepted extraction must have. Default: 10.
    pub min_text_chars: usize,

    /// Pre-constructed transport. Takes precedence over the HTTP transport
    /// built from `base_url` and `api_key`.
    pub transport: Option<Arc<dyn ProviderTransport>>,

    /// Per-attempt event sink.
    pub observer: Option<ObserverHandle>,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_versions: vec![ApiVersion::V1Beta, ApiVersion::V1],
            models: None,
            fallback_models: FALLBACK_MODELS.iter().map(|m| m.to_string()).collect(),
            call_timeout_secs: 300,
            catalog_timeout_secs: 30,
            search_timeout_secs: 600,
            max_attempts: 40,
            max_encoded_bytes: 20 * 1024 * 1024,
            min_text_chars: 10,
            transport: None,
            observer: None,
        }
    }
}

impl fmt::Debug for ExtractorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractorConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("api_versions", &self.api_versions)
            .field("models", &self.models)
            .field("fallback_models", &self.fallback_models)
            .field("call_timeout_secs", &self.call_timeout_secs)
            .field("catalog_timeout_secs", &self.catalog_timeout_secs)
            .field("search_timeout_secs", &self.search_timeout_secs)
            .field("max_attempts", &self.max_attempts)
            .field("max_encoded_bytes", &self.max_encoded_bytes)
            .field("min_text_chars", &self.min_text_chars)
            .field("transport", &self.transport.as_ref().map(|_| "<dyn ProviderTransport>"))
            .finish()
    }
}

impl ExtractorConfig {
    /// Create a new builder for `ExtractorConfig`.
    pub fn builder() -> ExtractorConfigBuilder {
        ExtractorConfigBuilder {
            config: Self::default(),
        }
    }

    /// Defaults plus `GEMINI_API_KEY` / `GEMINI_BASE_URL` from the environment.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.api_key = std::env::var(API_KEY_ENV).ok().filter(|k| !k.trim().is_empty());
        if let Ok(url) = std::env::var(BASE_URL_ENV) {
            if !url.trim().is_empty() {
                config.base_url = url.trim().trim_end_matches('/').to_string();
            }
        }
        config
    }

    /// `true` when a non-blank API key is configured.
    pub fn has_credential(&self) -> bool {
        self.api_key
            .as_deref()
            .is_some_and(|k| !k.trim().is_empty())
    }

    pub(crate) fn search_policy(&self) -> SearchPolicy {
        SearchPolicy {
            call_timeout: Duration::from_secs(self.call_timeout_secs),
            search_timeout: Duration::from_secs(self.search_timeout_secs),
            max_attempts: self.max_attempts,
            min_text_chars: self.min_text_chars,
        }
    }
}

/// Builder for [`ExtractorConfig`].
#[derive(Debug)]
pub struct ExtractorConfigBuilder {
    config: ExtractorConfig,
}

impl ExtractorConfigBuilder {
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn api_versions(mut self, versions: Vec<ApiVersion>) -> Self {
        self.config.api_versions = versions;
        self
    }

    pub fn models<I, S>(mut self, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.models = Some(models.into_iter().map(Into::into).collect());
        self
    }

    pub fn fallback_models<I, S>(mut self, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.fallback_models = models.into_iter().map(Into::into).collect();
        self
    }

    pub fn call_timeout_secs(mut self, secs: u64) -> Self {
        self.config.call_timeout_secs = secs.max(1);
        self
    }

    pub fn catalog_timeout_secs(mut self, secs: u64) -> Self {
        self.config.catalog_timeout_secs = secs.max(1);
        self
    }

    pub fn search_timeout_secs(mut self, secs: u64) -> Self {
        self.config.search_timeout_secs = secs.max(1);
        self
    }

    pub fn max_attempts(mut self, n: usize) -> Self {
        self.config.max_attempts = n.max(1);
        self
    }

    pub fn max_encoded_bytes(mut self, n: usize) -> Self {
        self.config.max_encoded_bytes = n;
        self
    }

    pub fn min_text_chars(mut self, n: usize) -> Self {
        self.config.min_text_chars = n;
        self
    }

    pub fn transport(mut self, transport: Arc<dyn ProviderTransport>) -> Self {
        self.config.transport = Some(transport);
        self
    }

    pub fn observer(mut self, observer: ObserverHandle) -> Self {
        self.config.observer = Some(observer);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractorConfig, ExtractError> {
        let c = &self.config;
        if c.api_versions.is_empty() {
            return Err(ExtractError::InvalidConfig(
                "At least one API version is required".into(),
            ));
        }
        if c.models.as_ref().is_some_and(|m| m.is_empty()) {
            return Err(ExtractError::InvalidConfig(
                "Pinned model list must not be empty".into(),
            ));
        }
        if c.models.is_none() && c.fallback_models.is_empty() {
            return Err(ExtractError::InvalidConfig(
                "Fallback model list must not be empty".into(),
            ));
        }
        if c.max_encoded_bytes == 0 {
            return Err(ExtractError::InvalidConfig(
                "max_encoded_bytes must be ≥ 1".into(),
            ));
        }
        if !c.base_url.starts_with("http://") && !c.base_url.starts_with("https://") {
            return Err(ExtractError::InvalidConfig(format!(
                "base_url must be an HTTP(S) URL, got '{}'",
                c.base_url
            )));
        }
        Ok(self.config)
    }
}
