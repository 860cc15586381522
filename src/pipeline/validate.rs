//! Response validation: a 200 body is only a success if it carries usable text.
//!
//! The provider answers 200 for safety blocks and for empty generations, so
//! the status code alone says nothing. A 200 that fails validation is fatal
//! for the whole extraction: the request reached a working model, and
//! another model is no more likely to read the same file.

use crate::error::ExtractError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<ResponseCandidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponseCandidate {
    #[serde(default)]
    content: Option<ResponseContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

static RE_OUTER_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z0-9_-]*[ \t]*\r?\n(.*?)\r?\n?```$").unwrap());

/// Remove a single code fence wrapping the whole text, if present.
fn strip_outer_fence(input: &str) -> &str {
    let trimmed = input.trim();
    match RE_OUTER_FENCE.captures(trimmed).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str(),
        None => trimmed,
    }
}

/// Decode a `generateContent` body and return the accepted text.
pub fn extract_text(body: &[u8], model: &str, min_chars: usize) -> Result<String, ExtractError> {
    let response: GenerateContentResponse =
        serde_json::from_slice(body).map_err(|e| ExtractError::MalformedResponse {
            model: model.to_string(),
            detail: e.to_string(),
        })?;

    let block_reason = response
        .prompt_feedback
        .and_then(|f| f.block_reason)
        .filter(|r| !r.is_empty());

    let Some(first) = response.candidates.into_iter().next() else {
        return Err(ExtractError::EmptyResponse {
            model: model.to_string(),
            reason: block_reason,
        });
    };

    let finish_reason = first.finish_reason;
    let text = first
        .content
        .and_then(|c| c.parts.into_iter().find_map(|p| p.text))
        .ok_or_else(|| ExtractError::EmptyResponse {
            model: model.to_string(),
            reason: block_reason.or(finish_reason),
        })?;

    let text = strip_outer_fence(&text).trim().to_string();
    let chars = text.chars().count();
    if chars < min_chars {
        return Err(ExtractError::InsufficientText {
            model: model.to_string(),
            chars,
            min: min_chars,
        });
    }
    Ok(text)
}
