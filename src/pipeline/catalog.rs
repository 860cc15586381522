//! Model catalog resolution: which {API version × model} pairs to try, in
//! which order.
//!
//! ## Why a catalog at all?
//!
//! Model names on the provider come and go. Hard-coding one model means the
//! client breaks the day it is retired; asking the provider which models
//! exist right now keeps the search short and current. The static
//! [`FALLBACK_MODELS`] list only matters when the listing endpoint itself is
//! unreachable.
//!
//! ## Ranking
//!
//! 1. [`PRIORITY_MODELS`] that appear in the listing, in that fixed order
//! 2. every other `gemini-*` model that supports `generateContent` and is not
//!    a specialised variant (see [`DENYLIST`]), in listing order
//!
//! The plan is rebuilt for every request and never cached.

use crate::config::ExtractorConfig;
use crate::transport::{ProviderTransport, TransportError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Models preferred whenever the catalog lists them.
pub const PRIORITY_MODELS: &[&str] = &[
    "gemini-flash-latest",
    "gemini-pro-latest",
    "gemini-2.0-flash",
    "gemini-2.0-flash-lite",
];

/// Name fragments of specialised models that cannot read documents.
pub const DENYLIST: &[&str] = &[
    "embedding",
    "image",
    "imagen",
    "aqa",
    "robotics",
    "computer-use",
    "audio",
    "tts",
    "live",
];

/// Tried when the catalog is unavailable: flash before pro, `latest`
/// aliases before pinned versions.
pub const FALLBACK_MODELS: &[&str] = &[
    "gemini-flash-latest",
    "gemini-2.0-flash",
    "gemini-2.0-flash-lite",
    "gemini-1.5-flash-latest",
    "gemini-1.5-flash",
    "gemini-1.5-flash-002",
    "gemini-pro-latest",
    "gemini-1.5-pro-latest",
    "gemini-1.5-pro",
    "gemini-1.5-pro-002",
    "gemini-pro",
    "gemini-1.0-pro",
];

/// Upper bound on listing pages followed through `nextPageToken`.
pub const MAX_CATALOG_PAGES: usize = 10;

const MODEL_PREFIX: &str = "gemini-";
const GENERATE_CONTENT: &str = "generateContent";

// ── Candidates ───────────────────────────────────────────────────────────────

/// API surface a model is addressed through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiVersion {
    V1Beta,
    V1,
}

impl ApiVersion {
    pub fn as_str(self) -> &'static str {
        match self {
            ApiVersion::V1Beta => "v1beta",
            ApiVersion::V1 => "v1",
        }
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ApiVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "v1beta" => Ok(ApiVersion::V1Beta),
            "v1" => Ok(ApiVersion::V1),
            other => Err(format!("unknown API version '{other}' (expected v1beta or v1)")),
        }
    }
}

/// One (API version, model) pair of the search.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Candidate {
    pub api_version: ApiVersion,
    pub model: String,
}

impl Candidate {
    pub fn new(api_version: ApiVersion, model: impl Into<String>) -> Self {
        Self {
            api_version,
            model: model.into(),
        }
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.model, self.api_version)
    }
}

/// Where the model list of a plan came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanSource {
    /// Live listing from the provider.
    Catalog,
    /// Static [`FALLBACK_MODELS`] (or the configured override).
    Fallback,
    /// Models pinned in the configuration; the catalog was not consulted.
    Pinned,
}

impl fmt::Display for PlanSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PlanSource::Catalog => "catalog",
            PlanSource::Fallback => "fallback",
            PlanSource::Pinned => "pinned",
        })
    }
}

/// Ordered candidates for a single extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidatePlan {
    candidates: Vec<Candidate>,
    source: PlanSource,
}

impl CandidatePlan {
    /// Cross `versions` (outer loop) with `models` (inner loop).
    pub fn cross(versions: &[ApiVersion], models: &[String], source: PlanSource) -> Self {
        let candidates = versions
            .iter()
            .flat_map(|v| models.iter().map(move |m| Candidate::new(*v, m.clone())))
            .collect();
        Self { candidates, source }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Candidate> {
        self.candidates.iter()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn source(&self) -> PlanSource {
        self.source
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }
}

impl<'a> IntoIterator for &'a CandidatePlan {
    type Item = &'a Candidate;
    type IntoIter = std::slice::Iter<'a, Candidate>;

    fn into_iter(self) -> Self::IntoIter {
        self.candidates.iter()
    }
}

// ── Catalog ──────────────────────────────────────────────────────────────────

/// The catalog could not be used. Never surfaced to callers: the resolver
/// logs it and falls back to the static list.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("model listing request failed: {0}")]
    Transport(#[from] TransportError),

    #[error("model listing returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("could not decode model listing: {0}")]
    Decode(String),

    #[error("model listing contains no eligible model")]
    NoEligibleModel,
}

/// Eligible model names, best first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelCatalog {
    models: Vec<String>,
}

impl ModelCatalog {
    pub fn models(&self) -> &[String] {
        &self.models
    }

    pub fn into_models(self) -> Vec<String> {
        self.models
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListModelsPage {
    #[serde(default)]
    models: Vec<ListedModel>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListedModel {
    name: String,
    #[serde(default)]
    supported_generation_methods: Option<Vec<String>>,
}

impl ListedModel {
    fn supports_generation(&self) -> bool {
        self.supported_generation_methods
            .as_ref()
            .map_or(true, |methods| methods.iter().any(|m| m == GENERATE_CONTENT))
    }
}

/// Query the listing endpoint and rank what it returns.
pub async fn fetch_catalog(
    transport: &dyn ProviderTransport,
    timeout: Duration,
) -> Result<ModelCatalog, CatalogError> {
    let mut listed = Vec::new();
    let mut page_token: Option<String> = None;

    for page in 0..MAX_CATALOG_PAGES {
        let response = transport.list_models(page_token.as_deref(), timeout).await?;
        if response.status != 200 {
            return Err(CatalogError::Status {
                status: response.status,
                body: response.body_text(),
            });
        }

        let parsed: ListModelsPage = serde_json::from_slice(&response.body)
            .map_err(|e| CatalogError::Decode(e.to_string()))?;
        debug!("Catalog page {}: {} models", page + 1, parsed.models.len());

        listed.extend(
            parsed
                .models
                .into_iter()
                .filter(ListedModel::supports_generation)
                .map(|m| strip_models_prefix(&m.name).to_string()),
        );

        match parsed.next_page_token.filter(|t| !t.is_empty()) {
            Some(token) => page_token = Some(token),
            None => break,
        }
    }

    let models = rank_models(&listed);
    if models.is_empty() {
        return Err(CatalogError::NoEligibleModel);
    }
    Ok(ModelCatalog { models })
}

fn strip_models_prefix(name: &str) -> &str {
    name.strip_prefix("models/").unwrap_or(name)
}

fn is_eligible(name: &str) -> bool {
    name.starts_with(MODEL_PREFIX) && !DENYLIST.iter().any(|d| name.contains(d))
}

/// Rank listed model names: priority models first, then the remaining
/// eligible ones in listing order, without duplicates.
pub fn rank_models<S: AsRef<str>>(listed: &[S]) -> Vec<String> {
    let mut ranked: Vec<String> = PRIORITY_MODELS
        .iter()
        .filter(|p| listed.iter().any(|l| l.as_ref() == **p))
        .map(|p| p.to_string())
        .collect();

    for name in listed.iter().map(AsRef::as_ref) {
        if is_eligible(name) && !ranked.iter().any(|r| r == name) {
            ranked.push(name.to_string());
        }
    }
    ranked
}

/// Build the candidate plan for one request: pinned models, else the live
/// catalog, else the fallback list.
pub async fn resolve_candidate_plan(
    transport: &dyn ProviderTransport,
    config: &ExtractorConfig,
) -> CandidatePlan {
    if let Some(pinned) = &config.models {
        debug!("Using {} pinned models", pinned.len());
        return CandidatePlan::cross(&config.api_versions, pinned, PlanSource::Pinned);
    }

    let timeout = Duration::from_secs(config.catalog_timeout_secs);
    match fetch_catalog(transport, timeout).await {
        Ok(catalog) => {
            info!("Catalog lists {} eligible models", catalog.models().len());
            CandidatePlan::cross(&config.api_versions, catalog.models(), PlanSource::Catalog)
        }
        Err(e) => {
            warn!("Model catalog unavailable ({}); using fallback list", e);
            CandidatePlan::cross(
                &config.api_versions,
                &config.fallback_models,
                PlanSource::Fallback,
            )
        }
    }
}
