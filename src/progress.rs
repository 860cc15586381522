//! Observer trait for per-candidate extraction events.
//!
//! Inject an [`Arc<dyn ExtractionObserver>`] via
//! [`crate::config::ExtractorConfigBuilder::observer`] to see the fallback
//! search as it happens: which plan was chosen, which candidate is being
//! tried, why it was skipped, and which one finally answered.
//!
//! # Example
//!
//! ```rust
//! use filetext::{AttemptError, Candidate, ExtractionObserver, ExtractorConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingObserver {
//!     skipped: AtomicUsize,
//! }
//!
//! impl ExtractionObserver for CountingObserver {
//!     fn on_attempt_failed(&self, candidate: &Candidate, error: &AttemptError) {
//!         self.skipped.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("skipping {candidate}: {error}");
//!     }
//! }
//!
//! let config = ExtractorConfig::builder()
//!     .observer(Arc::new(CountingObserver { skipped: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use crate::error::AttemptError;
use crate::pipeline::catalog::{Candidate, PlanSource};
use std::sync::Arc;

/// Called by the fallback executor as it works through a candidate plan.
///
/// Implementations must be `Send + Sync`: one observer is shared by every
/// extraction running on the same [`crate::Extractor`]. All methods have
/// no-op defaults so callers only override what they care about.
pub trait ExtractionObserver: Send + Sync {
    /// Called once the candidate plan for a request is known.
    fn on_plan_resolved(&self, source: PlanSource, candidates: usize) {
        let _ = (source, candidates);
    }

    /// Called just before the request is sent to `candidate`.
    ///
    /// `attempt` is 1-indexed; `total` is the plan length.
    fn on_attempt_start(&self, candidate: &Candidate, attempt: usize, total: usize) {
        let _ = (candidate, attempt, total);
    }

    /// Called when a candidate fails in a recoverable way.
    fn on_attempt_failed(&self, candidate: &Candidate, error: &AttemptError) {
        let _ = (candidate, error);
    }

    /// Called when a candidate produced accepted text.
    fn on_success(&self, candidate: &Candidate, chars: usize) {
        let _ = (candidate, chars);
    }
}

/// Observer that ignores every event. Used when none is configured.
pub struct NoopObserver;

impl ExtractionObserver for NoopObserver {}

/// Convenience alias matching the type stored in [`crate::config::ExtractorConfig`].
pub type ObserverHandle = Arc<dyn ExtractionObserver>;
