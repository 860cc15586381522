//! Fallback-search behaviour, driven through the public `Extractor` API with
//! a scripted in-memory transport.
//!
//! Every test here is offline and deterministic: time-dependent tests run on
//! a paused Tokio clock.

use async_trait::async_trait;
use bytes::Bytes;
use filetext::{
    ApiVersion, AttemptError, Candidate, DocumentKind, ExtractError, ExtractionObserver,
    Extractor, ExtractorConfig, PlanSource, ProviderTransport, RawResponse, TransportError,
};
use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, ReadBuf};

// ── Test helpers ─────────────────────────────────────────────────────────────

const EXTRACTED: &str = "Invoice 2024-117\nTotal due: 1,250.00 EUR";

#[derive(Clone)]
enum Reply {
    Status(u16, String),
    Fail,
    Hang,
}

fn ok_text(text: &str) -> Reply {
    Reply::Status(
        200,
        serde_json::json!({ "candidates": [{ "content": { "parts": [{ "text": text }] } }] })
            .to_string(),
    )
}

fn not_found() -> Reply {
    Reply::Status(404, r#"{"error":{"code":404,"message":"models/x is not found","status":"NOT_FOUND"}}"#.into())
}

fn quota(delay: &str) -> Reply {
    Reply::Status(
        429,
        serde_json::json!({ "error": {
            "code": 429,
            "message": "You exceeded your current quota",
            "status": "RESOURCE_EXHAUSTED",
            "details": [{ "@type": "type.googleapis.com/google.rpc.RetryInfo", "retryDelay": delay }]
        }})
        .to_string(),
    )
}

/// Replays scripted replies in order and records every call.
/// Once the script runs out every call answers 404.
struct ScriptedTransport {
    listing: Option<String>,
    replies: Mutex<VecDeque<Reply>>,
    calls: Mutex<Vec<String>>,
    list_calls: AtomicUsize,
}

impl ScriptedTransport {
    fn new(replies: Vec<Reply>) -> Arc<Self> {
        Arc::new(Self {
            listing: None,
            replies: Mutex::new(replies.into()),
            calls: Mutex::new(Vec::new()),
            list_calls: AtomicUsize::new(0),
        })
    }

    fn with_listing(listing: &str, replies: Vec<Reply>) -> Arc<Self> {
        Arc::new(Self {
            listing: Some(listing.to_string()),
            replies: Mutex::new(replies.into()),
            calls: Mutex::new(Vec::new()),
            list_calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProviderTransport for ScriptedTransport {
    async fn list_models(
        &self,
        _page_token: Option<&str>,
        _timeout: Duration,
    ) -> Result<RawResponse, TransportError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        match &self.listing {
            Some(body) => Ok(RawResponse::new(200, body.clone())),
            None => Err(TransportError::Connect("connection refused".into())),
        }
    }

    async fn generate(
        &self,
        candidate: &Candidate,
        _body: Bytes,
        _timeout: Duration,
    ) -> Result<RawResponse, TransportError> {
        self.calls.lock().unwrap().push(candidate.to_string());
        let reply = self.replies.lock().unwrap().pop_front().unwrap_or_else(not_found);
        match reply {
            Reply::Status(status, body) => Ok(RawResponse::new(status, body)),
            Reply::Fail => Err(TransportError::Connect("connection reset".into())),
            Reply::Hang => std::future::pending().await,
        }
    }
}

fn extractor_with(transport: Arc<ScriptedTransport>, models: &[&str]) -> Extractor {
    let config = ExtractorConfig::builder()
        .api_key("test-key")
        .transport(transport)
        .models(models.iter().copied())
        .build()
        .unwrap();
    Extractor::new(config).unwrap()
}

/// AsyncRead that records whether it was ever polled.
struct TrackingReader {
    polled: Arc<AtomicBool>,
}

impl AsyncRead for TrackingReader {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        self.polled.store(true, Ordering::SeqCst);
        Poll::Ready(Ok(()))
    }
}

// ── Availability ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_missing_key_fails_before_io() {
    let transport = ScriptedTransport::new(vec![ok_text(EXTRACTED)]);
    let config = ExtractorConfig::builder()
        .transport(transport.clone())
        .build()
        .unwrap();
    let extractor = Extractor::new(config).unwrap();
    assert!(!extractor.is_available());

    let polled = Arc::new(AtomicBool::new(false));
    let err = extractor
        .extract_from_file(TrackingReader { polled: polled.clone() }, "scan.png")
        .await
        .unwrap_err();
    assert!(matches!(err, ExtractError::NotConfigured { .. }));

    let err = extractor
        .extract_from_pdf(TrackingReader { polled: polled.clone() }, "doc.pdf")
        .await
        .unwrap_err();
    assert!(matches!(err, ExtractError::NotConfigured { .. }));

    assert!(!polled.load(Ordering::SeqCst), "input must not be read");
    assert!(transport.calls().is_empty());
    assert_eq!(transport.list_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_blank_key_is_unavailable() {
    let transport = ScriptedTransport::new(vec![]);
    let config = ExtractorConfig::builder()
        .api_key("  ")
        .transport(transport.clone())
        .build()
        .unwrap();
    let extractor = Extractor::new(config).unwrap();
    assert!(!extractor.is_available());
    let err = extractor
        .extract_bytes(b"data".to_vec(), "a.png", DocumentKind::Generic)
        .await
        .unwrap_err();
    assert!(err.is_configuration());
    assert!(transport.calls().is_empty());
}

// ── Fallback order ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_success_on_last_candidate_after_404s() {
    let mut replies = vec![not_found(); 5];
    replies.push(ok_text(EXTRACTED));
    let transport = ScriptedTransport::new(replies);
    let extractor = extractor_with(transport.clone(), &["model-a", "model-b", "model-c"]);

    let extraction = extractor
        .extract_bytes(b"%PDF-1.7".to_vec(), "invoice.pdf", DocumentKind::Pdf)
        .await
        .unwrap();

    assert_eq!(extraction.text, EXTRACTED);
    assert_eq!(extraction.model, "model-c");
    assert_eq!(extraction.api_version, ApiVersion::V1);
    assert_eq!(extraction.attempts, 6);
    assert_eq!(
        transport.calls(),
        vec![
            "model-a@v1beta",
            "model-b@v1beta",
            "model-c@v1beta",
            "model-a@v1",
            "model-b@v1",
            "model-c@v1",
        ]
    );
}

#[tokio::test]
async fn test_first_success_stops_search() {
    let transport = ScriptedTransport::new(vec![not_found(), ok_text(EXTRACTED), ok_text("unused text here")]);
    let extractor = extractor_with(transport.clone(), &["model-a", "model-b", "model-c"]);

    let extraction = extractor
        .extract_bytes(b"png".to_vec(), "scan.png", DocumentKind::Generic)
        .await
        .unwrap();
    assert_eq!(extraction.model, "model-b");
    assert_eq!(transport.calls().len(), 2);
}

#[tokio::test]
async fn test_network_failure_moves_to_next_candidate() {
    let transport = ScriptedTransport::new(vec![Reply::Fail, ok_text(EXTRACTED)]);
    let extractor = extractor_with(transport.clone(), &["model-a", "model-b"]);

    let extraction = extractor
        .extract_bytes(b"png".to_vec(), "scan.png", DocumentKind::Generic)
        .await
        .unwrap();
    assert_eq!(extraction.attempts, 2);
}

#[tokio::test]
async fn test_all_not_found_is_no_model_available() {
    let transport = ScriptedTransport::new(vec![]);
    let extractor = extractor_with(transport.clone(), &["model-a", "model-b"]);

    let err = extractor
        .extract_bytes(b"png".to_vec(), "scan.png", DocumentKind::Generic)
        .await
        .unwrap_err();
    match err {
        ExtractError::NoModelAvailable { attempts, last_error } => {
            assert_eq!(attempts, 4);
            assert!(last_error.contains("model-b"), "got: {last_error}");
        }
        other => panic!("expected NoModelAvailable, got {other:?}"),
    }
    assert_eq!(transport.calls().len(), 4);
}

// ── Quota ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_all_quota_is_rate_limited_with_guidance() {
    let transport = ScriptedTransport::new(vec![quota("17s"); 4]);
    let extractor = extractor_with(transport.clone(), &["model-a", "model-b"]);

    let err = extractor
        .extract_bytes(b"png".to_vec(), "scan.png", DocumentKind::Generic)
        .await
        .unwrap_err();

    assert_eq!(transport.calls().len(), 4);
    assert_eq!(err.retry_after(), Some(Duration::from_secs(17)));
    let msg = err.to_string();
    assert!(msg.contains("https://ai.dev/usage?tab=rate-limit"), "got: {msg}");
    assert!(msg.contains("different API key"), "got: {msg}");
    assert!(msg.contains("wait"), "got: {msg}");
    assert!(matches!(err, ExtractError::RateLimited { attempts: 4, .. }));
}

#[tokio::test]
async fn test_quota_then_not_found_is_no_model_available() {
    let transport = ScriptedTransport::new(vec![quota("5s"), not_found()]);
    let extractor = extractor_with(transport, &["model-a"]);

    let err = extractor
        .extract_bytes(b"png".to_vec(), "scan.png", DocumentKind::Generic)
        .await
        .unwrap_err();
    assert!(matches!(err, ExtractError::NoModelAvailable { .. }));
}

// ── Fatal responses ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_empty_candidates_is_fatal_after_one_call() {
    let transport = ScriptedTransport::new(vec![Reply::Status(200, r#"{"candidates":[]}"#.into())]);
    let extractor = extractor_with(transport.clone(), &["model-a", "model-b"]);

    let err = extractor
        .extract_bytes(b"png".to_vec(), "scan.png", DocumentKind::Generic)
        .await
        .unwrap_err();
    assert!(matches!(err, ExtractError::EmptyResponse { .. }));
    assert_eq!(transport.calls().len(), 1);
}

#[tokio::test]
async fn test_short_text_is_insufficient() {
    let transport = ScriptedTransport::new(vec![ok_text("   Hi  ")]);
    let extractor = extractor_with(transport.clone(), &["model-a", "model-b"]);

    let err = extractor
        .extract_bytes(b"png".to_vec(), "scan.png", DocumentKind::Generic)
        .await
        .unwrap_err();
    assert!(matches!(err, ExtractError::InsufficientText { chars: 2, .. }));
    assert_eq!(transport.calls().len(), 1);
}

#[tokio::test]
async fn test_rejecting_statuses_stop_after_one_call() {
    for status in [400u16, 401, 403, 500] {
        let body = format!(
            r#"{{"error":{{"code":{status},"message":"rejected with {status}","status":"SOME_STATUS"}}}}"#
        );
        let transport = ScriptedTransport::new(vec![Reply::Status(status, body)]);
        let extractor = extractor_with(transport.clone(), &["model-a", "model-b"]);

        let err = extractor
            .extract_bytes(b"png".to_vec(), "scan.png", DocumentKind::Generic)
            .await
            .unwrap_err();
        match err {
            ExtractError::ProviderRejected { status: got, message, .. } => {
                assert_eq!(got, status);
                assert_eq!(message, format!("rejected with {status}"));
            }
            other => panic!("expected ProviderRejected for {status}, got {other:?}"),
        }
        assert_eq!(transport.calls().len(), 1, "status {status}");
    }
}

// ── Input errors ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_oversize_payload_is_rejected_without_calls() {
    let transport = ScriptedTransport::new(vec![ok_text(EXTRACTED)]);
    let config = ExtractorConfig::builder()
        .api_key("test-key")
        .transport(transport.clone())
        .models(["model-a"])
        .max_encoded_bytes(64)
        .build()
        .unwrap();
    let extractor = Extractor::new(config).unwrap();

    let err = extractor
        .extract_bytes(vec![7u8; 100], "big.pdf", DocumentKind::Pdf)
        .await
        .unwrap_err();
    assert!(matches!(err, ExtractError::PayloadTooLarge { .. }));
    assert!(transport.calls().is_empty());
}

#[tokio::test]
async fn test_read_error_is_reported() {
    let transport = ScriptedTransport::new(vec![ok_text(EXTRACTED)]);
    let extractor = extractor_with(transport.clone(), &["model-a"]);
    let reader = tokio_test::io::Builder::new()
        .read(b"partial")
        .read_error(io::Error::new(io::ErrorKind::BrokenPipe, "upload aborted"))
        .build();

    let err = extractor
        .extract_from_file(reader, "scan.png")
        .await
        .unwrap_err();
    assert!(matches!(err, ExtractError::ReadFailed { ref file_name, .. } if file_name == "scan.png"));
    assert!(transport.calls().is_empty());
}

#[tokio::test]
async fn test_extract_from_reader() {
    let transport = ScriptedTransport::new(vec![ok_text(EXTRACTED)]);
    let extractor = extractor_with(transport.clone(), &["model-a"]);
    let reader = tokio_test::io::Builder::new().read(b"%PDF-1.4 ").read(b"body").build();

    let extraction = extractor.extract_from_pdf(reader, "doc.pdf").await.unwrap();
    assert_eq!(extraction.text, EXTRACTED);
    assert_eq!(transport.calls(), vec!["model-a@v1beta"]);
}

// ── Catalog ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_catalog_failure_uses_fallback_list() {
    let transport = ScriptedTransport::new(vec![not_found(), ok_text(EXTRACTED)]);
    let config = ExtractorConfig::builder()
        .api_key("test-key")
        .transport(transport.clone())
        .build()
        .unwrap();
    let extractor = Extractor::new(config).unwrap();

    let plan = extractor.candidate_plan().await.unwrap();
    assert_eq!(plan.source(), PlanSource::Fallback);

    let extraction = extractor
        .extract_bytes(b"png".to_vec(), "scan.png", DocumentKind::Generic)
        .await
        .unwrap();
    assert_eq!(extraction.model, "gemini-2.0-flash");
    assert_eq!(
        transport.calls(),
        vec!["gemini-flash-latest@v1beta", "gemini-2.0-flash@v1beta"]
    );
}

#[tokio::test]
async fn test_catalog_ranking_drives_plan() {
    let listing = r#"{"models":[
        {"name":"models/text-embedding-004","supportedGenerationMethods":["embedContent"]},
        {"name":"models/gemini-2.5-pro","supportedGenerationMethods":["generateContent"]},
        {"name":"models/gemini-2.0-flash-preview-image-generation","supportedGenerationMethods":["generateContent"]},
        {"name":"models/gemini-2.0-flash","supportedGenerationMethods":["generateContent"]}
    ]}"#;
    let transport = ScriptedTransport::with_listing(listing, vec![]);
    let config = ExtractorConfig::builder()
        .api_key("test-key")
        .transport(transport.clone())
        .api_versions(vec![ApiVersion::V1Beta])
        .build()
        .unwrap();
    let extractor = Extractor::new(config).unwrap();

    let plan = extractor.candidate_plan().await.unwrap();
    assert_eq!(plan.source(), PlanSource::Catalog);
    let order: Vec<String> = plan.iter().map(ToString::to_string).collect();
    assert_eq!(order, vec!["gemini-2.0-flash@v1beta", "gemini-2.5-pro@v1beta"]);
}

#[tokio::test]
async fn test_pinned_models_skip_catalog() {
    let transport = ScriptedTransport::new(vec![ok_text(EXTRACTED)]);
    let extractor = extractor_with(transport.clone(), &["model-a"]);
    extractor
        .extract_bytes(b"png".to_vec(), "scan.png", DocumentKind::Generic)
        .await
        .unwrap();
    assert_eq!(transport.list_calls.load(Ordering::SeqCst), 0);
}

// ── Budget and cancellation ──────────────────────────────────────────────────

#[tokio::test]
async fn test_attempt_budget_stops_search() {
    let transport = ScriptedTransport::new(vec![]);
    let config = ExtractorConfig::builder()
        .api_key("test-key")
        .transport(transport.clone())
        .models(["model-a", "model-b", "model-c"])
        .max_attempts(2)
        .build()
        .unwrap();
    let extractor = Extractor::new(config).unwrap();

    let err = extractor
        .extract_bytes(b"png".to_vec(), "scan.png", DocumentKind::Generic)
        .await
        .unwrap_err();
    assert!(matches!(err, ExtractError::SearchBudgetExceeded { attempts: 2, .. }));
    assert_eq!(transport.calls().len(), 2);
}

#[tokio::test]
async fn test_attempt_budget_on_quota_keeps_rate_limit_guidance() {
    let transport = ScriptedTransport::new(vec![quota("20s"); 6]);
    let config = ExtractorConfig::builder()
        .api_key("test-key")
        .transport(transport.clone())
        .models(["model-a", "model-b", "model-c"])
        .max_attempts(4)
        .build()
        .unwrap();
    let extractor = Extractor::new(config).unwrap();

    let err = extractor
        .extract_bytes(b"png".to_vec(), "scan.png", DocumentKind::Generic)
        .await
        .unwrap_err();
    assert!(
        matches!(err, ExtractError::RateLimited { attempts: 4, .. }),
        "got {err:?}"
    );
    assert_eq!(err.retry_after(), Some(Duration::from_secs(20)));
    assert!(err.to_string().contains("https://ai.dev/usage"));
    assert!(err.to_string().contains("different API key"));
    assert_eq!(transport.calls().len(), 4);
}

#[tokio::test]
async fn test_attempt_budget_after_quota_then_not_found() {
    let transport = ScriptedTransport::new(vec![quota("20s"), not_found(), not_found()]);
    let config = ExtractorConfig::builder()
        .api_key("test-key")
        .transport(transport.clone())
        .models(["model-a", "model-b", "model-c"])
        .max_attempts(2)
        .build()
        .unwrap();
    let extractor = Extractor::new(config).unwrap();

    let err = extractor
        .extract_bytes(b"png".to_vec(), "scan.png", DocumentKind::Generic)
        .await
        .unwrap_err();
    assert!(
        matches!(err, ExtractError::SearchBudgetExceeded { attempts: 2, .. }),
        "got {err:?}"
    );
}

#[tokio::test(start_paused = true)]
async fn test_call_timeout_counts_as_candidate_failure() {
    let transport = ScriptedTransport::new(vec![Reply::Hang, ok_text(EXTRACTED)]);
    let config = ExtractorConfig::builder()
        .api_key("test-key")
        .transport(transport.clone())
        .models(["model-a", "model-b"])
        .call_timeout_secs(5)
        .build()
        .unwrap();
    let extractor = Extractor::new(config).unwrap();

    let extraction = extractor
        .extract_bytes(b"png".to_vec(), "scan.png", DocumentKind::Generic)
        .await
        .unwrap();
    assert_eq!(extraction.model, "model-b");
    assert_eq!(extraction.attempts, 2);
}

#[tokio::test(start_paused = true)]
async fn test_time_budget_stops_search() {
    let transport = ScriptedTransport::new(vec![Reply::Hang, Reply::Hang, Reply::Hang]);
    let config = ExtractorConfig::builder()
        .api_key("test-key")
        .transport(transport.clone())
        .models(["model-a", "model-b", "model-c"])
        .call_timeout_secs(300)
        .search_timeout_secs(30)
        .build()
        .unwrap();
    let extractor = Extractor::new(config).unwrap();

    let err = extractor
        .extract_bytes(b"png".to_vec(), "scan.png", DocumentKind::Generic)
        .await
        .unwrap_err();
    match err {
        ExtractError::SearchBudgetExceeded { attempts, elapsed_secs, last_error } => {
            assert_eq!(attempts, 1);
            assert_eq!(elapsed_secs, 30);
            assert!(last_error.contains("timed out"), "got: {last_error}");
        }
        other => panic!("expected SearchBudgetExceeded, got {other:?}"),
    }
    assert_eq!(transport.calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_dropping_future_stops_search() {
    let transport = ScriptedTransport::new(vec![Reply::Hang, ok_text(EXTRACTED)]);
    let extractor = extractor_with(transport.clone(), &["model-a", "model-b"]);

    let outcome = tokio::time::timeout(
        Duration::from_secs(10),
        extractor.extract_bytes(b"png".to_vec(), "scan.png", DocumentKind::Generic),
    )
    .await;
    assert!(outcome.is_err(), "caller deadline should fire first");

    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(transport.calls(), vec!["model-a@v1beta"]);
}

// ── Observer ─────────────────────────────────────────────────────────────────

#[derive(Default)]
struct RecordingObserver {
    events: Mutex<Vec<String>>,
}

impl ExtractionObserver for RecordingObserver {
    fn on_plan_resolved(&self, source: PlanSource, candidates: usize) {
        self.events.lock().unwrap().push(format!("plan {source} {candidates}"));
    }

    fn on_attempt_start(&self, candidate: &Candidate, attempt: usize, total: usize) {
        self.events
            .lock()
            .unwrap()
            .push(format!("start {candidate} {attempt}/{total}"));
    }

    fn on_attempt_failed(&self, candidate: &Candidate, error: &AttemptError) {
        let kind = if error.is_quota() { "quota" } else { "other" };
        self.events.lock().unwrap().push(format!("failed {candidate} {kind}"));
    }

    fn on_success(&self, candidate: &Candidate, chars: usize) {
        self.events.lock().unwrap().push(format!("ok {candidate} {chars}"));
    }
}

#[tokio::test]
async fn test_observer_sees_every_attempt() {
    let observer = Arc::new(RecordingObserver::default());
    let transport = ScriptedTransport::new(vec![quota("1s"), ok_text(EXTRACTED)]);
    let config = ExtractorConfig::builder()
        .api_key("test-key")
        .transport(transport)
        .models(["model-a"])
        .observer(observer.clone())
        .build()
        .unwrap();
    let extractor = Extractor::new(config).unwrap();

    extractor
        .extract_bytes(b"png".to_vec(), "scan.png", DocumentKind::Generic)
        .await
        .unwrap();

    let chars = EXTRACTED.chars().count();
    assert_eq!(
        *observer.events.lock().unwrap(),
        vec![
            "plan pinned 2".to_string(),
            "start model-a@v1beta 1/2".to_string(),
            "failed model-a@v1beta quota".to_string(),
            "start model-a@v1 2/2".to_string(),
            format!("ok model-a@v1 {chars}"),
        ]
    );
}
