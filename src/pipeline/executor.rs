//! Fallback execution: walk the candidate plan until one model answers.
//!
//! ## Why sequential?
//!
//! Quota on the provider is per model and per key. Firing every candidate at
//! once would burn the quota of models we never needed and multiply a large
//! upload by the plan length. Candidates are therefore tried strictly one at
//! a time, in plan order, and the first accepted response wins.
//!
//! ## Status classification
//!
//! | Outcome                    | Effect                                       |
//! |----------------------------|----------------------------------------------|
//! | no status (network, timeout) | [`AttemptError::Transport`], next candidate |
//! | 200                        | validate; accepted text or fatal error        |
//! | 404                        | [`AttemptError::ModelNotFound`], next         |
//! | 429                        | [`AttemptError::QuotaExceeded`], next         |
//! | anything else              | [`ExtractError::ProviderRejected`], stop      |
//!
//! A 400 or 401 says the *request* or the *key* is wrong, which no other
//! model can fix, so the search stops there instead of burning the plan.
//!
//! ## Budget
//!
//! [`SearchPolicy`] bounds each call and the search as a whole. Without a
//! total bound a 24-candidate plan at 300 s per call could hold an upload
//! for two hours.

use crate::error::{AttemptError, ExtractError};
use crate::pipeline::catalog::{ApiVersion, Candidate, CandidatePlan};
use crate::pipeline::validate::extract_text;
use crate::progress::ExtractionObserver;
use crate::transport::{ProviderTransport, RawResponse, TransportError};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Limits applied to one fallback search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchPolicy {
    /// Ceiling for a single provider call.
    pub call_timeout: Duration,
    /// Wall-clock budget for the whole search.
    pub search_timeout: Duration,
    /// Maximum number of candidates tried.
    pub max_attempts: usize,
    /// Minimum characters of accepted text.
    pub min_text_chars: usize,
}

impl Default for SearchPolicy {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(300),
            search_timeout: Duration::from_secs(600),
            max_attempts: 40,
            min_text_chars: 10,
        }
    }
}

/// Text accepted from one candidate, with provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Extraction {
    pub text: String,
    pub model: String,
    pub api_version: ApiVersion,
    /// Candidates tried, including the successful one.
    pub attempts: usize,
    pub duration_ms: u64,
}

/// What one provider call means for the search.
#[derive(Debug)]
pub enum TransportOutcome {
    /// HTTP 200; the body still has to pass validation.
    Success(Bytes),
    /// This candidate is unusable; try the next one.
    Retryable(AttemptError),
    /// The request itself was refused; stop the search.
    Fatal(ExtractError),
}

// ── Provider error body ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    details: Vec<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorDetail {
    #[serde(default)]
    retry_info: Option<RetryInfo>,
    #[serde(default)]
    retry_delay: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RetryInfo {
    #[serde(default)]
    retry_delay: Option<String>,
}

fn parse_error_body(body: &[u8]) -> Option<ErrorBody> {
    serde_json::from_slice::<ErrorEnvelope>(body).ok().map(|e| e.error)
}

fn retry_delay_hint(body: &[u8]) -> Option<String> {
    parse_error_body(body)?.details.into_iter().find_map(|d| {
        d.retry_info
            .and_then(|r| r.retry_delay)
            .or(d.retry_delay)
            .filter(|s| !s.is_empty())
    })
}

fn rejection(response: &RawResponse) -> ExtractError {
    match parse_error_body(&response.body) {
        Some(ErrorBody {
            code,
            message: Some(message),
            status,
            ..
        }) => ExtractError::ProviderRejected {
            status: response.status,
            code,
            provider_status: status,
            message,
        },
        _ => ExtractError::ProviderRejected {
            status: response.status,
            code: None,
            provider_status: None,
            message: response.body_text(),
        },
    }
}

/// Map the result of one call to its effect on the search.
pub fn classify(candidate: &Candidate, result: Result<RawResponse, TransportError>) -> TransportOutcome {
    let model = candidate.model.clone();
    let api_version = candidate.api_version.as_str().to_string();

    let response = match result {
        Ok(r) => r,
        Err(e) => {
            return TransportOutcome::Retryable(AttemptError::Transport {
                model,
                api_version,
                detail: e.to_string(),
            })
        }
    };

    match response.status {
        200 => TransportOutcome::Success(response.body),
        404 => TransportOutcome::Retryable(AttemptError::ModelNotFound { model, api_version }),
        429 => TransportOutcome::Retryable(AttemptError::QuotaExceeded {
            model,
            api_version,
            retry_delay: retry_delay_hint(&response.body),
        }),
        _ => TransportOutcome::Fatal(rejection(&response)),
    }
}

/// Try every candidate of `plan` in order with the same request `body`.
///
/// Returns the first accepted extraction. Dropping the returned future
/// cancels the in-flight call and no further candidates are tried.
pub async fn run_plan(
    transport: &dyn ProviderTransport,
    plan: &CandidatePlan,
    body: Bytes,
    policy: &SearchPolicy,
    observer: &dyn ExtractionObserver,
) -> Result<Extraction, ExtractError> {
    let start = Instant::now();
    let total = plan.len().min(policy.max_attempts);
    let mut attempts = 0usize;
    let mut last_error: Option<AttemptError> = None;

    for candidate in plan {
        let elapsed = start.elapsed();
        if attempts >= policy.max_attempts || elapsed >= policy.search_timeout {
            // Ending on a quota failure still reports RateLimited.
            if last_error.as_ref().is_some_and(AttemptError::is_quota) {
                warn!(
                    "Search budget exhausted after {} attempts in {:?}, last candidate over quota",
                    attempts, elapsed
                );
                return Err(exhausted(attempts, last_error));
            }
            let last = last_error
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(|| "no candidate was tried".to_string());
            warn!(
                "Search budget exhausted after {} attempts in {:?}",
                attempts, elapsed
            );
            return Err(ExtractError::SearchBudgetExceeded {
                attempts,
                elapsed_secs: elapsed.as_secs(),
                last_error: last,
            });
        }

        attempts += 1;
        let timeout = policy.call_timeout.min(policy.search_timeout - elapsed);
        observer.on_attempt_start(candidate, attempts, total);
        debug!(
            "Attempt {}/{}: {} (timeout {:?})",
            attempts, total, candidate, timeout
        );

        let result = match tokio::time::timeout(
            timeout,
            transport.generate(candidate, body.clone(), timeout),
        )
        .await
        {
            Ok(r) => r,
            Err(_) => Err(TransportError::Timeout {
                secs: timeout.as_secs(),
            }),
        };

        match classify(candidate, result) {
            TransportOutcome::Success(raw) => {
                let text = extract_text(&raw, &candidate.model, policy.min_text_chars)?;
                let duration_ms = start.elapsed().as_millis() as u64;
                info!(
                    "Extracted {} characters with {} after {} attempts ({} ms)",
                    text.chars().count(),
                    candidate,
                    attempts,
                    duration_ms
                );
                observer.on_success(candidate, text.chars().count());
                return Ok(Extraction {
                    text,
                    model: candidate.model.clone(),
                    api_version: candidate.api_version,
                    attempts,
                    duration_ms,
                });
            }
            TransportOutcome::Retryable(err) => {
                warn!("{} failed: {}", candidate, err);
                observer.on_attempt_failed(candidate, &err);
                last_error = Some(err);
            }
            TransportOutcome::Fatal(err) => {
                warn!("{} rejected the request: {}", candidate, err);
                return Err(err);
            }
        }
    }

    Err(exhausted(attempts, last_error))
}

fn exhausted(attempts: usize, last_error: Option<AttemptError>) -> ExtractError {
    match last_error {
        Some(AttemptError::QuotaExceeded {
            model,
            api_version,
            retry_delay,
        }) => ExtractError::RateLimited {
            attempts,
            retry_delay: retry_delay.clone(),
            last_error: AttemptError::QuotaExceeded {
                model,
                api_version,
                retry_delay,
            },
        },
        Some(err) => ExtractError::NoModelAvailable {
            attempts,
            last_error: err.to_string(),
        },
        None => ExtractError::NoModelAvailable {
            attempts,
            last_error: "candidate plan is empty".to_string(),
        },
    }
}
