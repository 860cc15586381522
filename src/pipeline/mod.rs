//! Pipeline stages for remote text extraction.
//!
//! Each submodule implements exactly one step. Only [`catalog`] and
//! [`executor`] perform network I/O, and both do it through
//! [`crate::transport::ProviderTransport`] so every stage can be tested
//! without a provider.
//!
//! ## Data Flow
//!
//! ```text
//! request ──▶ encode ──▶ catalog ──▶ executor ──▶ validate
//! (file+prompt) (base64)  (plan)    (fallback)   (text)
//! ```
//!
//! 1. [`request`]  — pair the file with its instruction and content type
//! 2. [`encode`]   — base64-wrap the bytes, rejecting oversize payloads early
//! 3. [`catalog`]  — decide which {API version × model} pairs to try
//! 4. [`executor`] — try candidates one at a time, classify each outcome
//! 5. [`validate`] — accept a 200 body only if it carries enough text

pub mod catalog;
pub mod encode;
pub mod executor;
pub mod request;
pub mod validate;
