//! CLI binary for filetext.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ExtractorConfig`, prints results, and can run the HTTP service.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use filetext::server::{self, AppState};
use filetext::{
    ApiVersion, AttemptError, Candidate, ExtractError, ExtractionObserver, Extractor,
    ExtractorConfig, PlanSource,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── Spinner observer using indicatif ─────────────────────────────────────────

/// Terminal observer: one spinner line for the candidate in flight and a log
/// line for every candidate that was skipped.
struct SpinnerObserver {
    bar: ProgressBar,
}

impl SpinnerObserver {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Preparing");
        bar.set_message("Resolving models…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ExtractionObserver for SpinnerObserver {
    fn on_plan_resolved(&self, source: PlanSource, candidates: usize) {
        self.bar
            .println(dim(&format!("  {candidates} candidates ({source})")));
    }

    fn on_attempt_start(&self, candidate: &Candidate, attempt: usize, total: usize) {
        self.bar.set_prefix(format!("Attempt {attempt}/{total}"));
        self.bar.set_message(candidate.to_string());
    }

    fn on_attempt_failed(&self, candidate: &Candidate, error: &AttemptError) {
        let reason = match error {
            AttemptError::ModelNotFound { .. } => "not found".to_string(),
            AttemptError::QuotaExceeded { .. } => "quota exceeded".to_string(),
            AttemptError::Transport { detail, .. } => detail.clone(),
        };
        self.bar.println(format!(
            "  {} {:<32} {}",
            red("✗"),
            candidate.to_string(),
            dim(&reason)
        ));
    }

    fn on_success(&self, candidate: &Candidate, chars: usize) {
        self.bar.println(format!(
            "  {} {:<32} {}",
            green("✓"),
            candidate.to_string(),
            dim(&format!("{chars} chars"))
        ));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Extract text from a scan (stdout)
  filetext extract scan.png

  # PDF with the PDF-specific instruction, JSON output
  filetext extract --pdf --json contract.pdf > contract.json

  # Skip the catalog and try only these models, v1 only
  filetext extract --model gemini-2.5-flash --model gemini-2.0-flash --api-version v1 photo.jpg

  # Show which candidates would be tried right now
  filetext models

  # Run the HTTP service
  filetext serve --port 9091
  curl -F "file=@scan.png" http://localhost:9091/api/v1/files/process

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY       API key (required for extraction)
  GEMINI_BASE_URL      Override the provider endpoint
  FILETEXT_*           Defaults for the flags below
  PORT                 Port for `serve` (default 9091)
  RUST_LOG             Log filter, overrides -v / -q

A `.env` file in the working directory is loaded automatically.
"#;

/// Extract plain text from files using a multimodal model.
#[derive(Parser, Debug)]
#[command(
    name = "filetext",
    version,
    about = "Extract plain text from PDFs, images and DOCX files with a multimodal model",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// API key for the provider.
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true, global = true)]
    api_key: Option<String>,

    /// Provider base URL.
    #[arg(long, env = "GEMINI_BASE_URL", global = true)]
    base_url: Option<String>,

    /// Model to try (repeatable). Skips the model catalog.
    #[arg(long = "model", env = "FILETEXT_MODELS", value_delimiter = ',', global = true)]
    models: Vec<String>,

    /// API version to try, in order (repeatable): v1beta, v1.
    #[arg(long = "api-version", env = "FILETEXT_API_VERSIONS", value_delimiter = ',', global = true)]
    api_versions: Vec<ApiVersion>,

    /// Per-call timeout in seconds.
    #[arg(long, env = "FILETEXT_CALL_TIMEOUT", default_value_t = 300, global = true)]
    call_timeout: u64,

    /// Budget for the whole fallback search in seconds.
    #[arg(long, env = "FILETEXT_SEARCH_TIMEOUT", default_value_t = 600, global = true)]
    search_timeout: u64,

    /// Maximum number of candidates tried per extraction.
    #[arg(long, env = "FILETEXT_MAX_ATTEMPTS", default_value_t = 40, global = true)]
    max_attempts: usize,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "FILETEXT_VERBOSE", global = true)]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "FILETEXT_QUIET", global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract text from a file and print it.
    Extract {
        /// File to read.
        file: PathBuf,

        /// Treat the file as a PDF regardless of its extension.
        #[arg(long)]
        pdf: bool,

        /// Output structured JSON (text, model, attempts) instead of text.
        #[arg(long, env = "FILETEXT_JSON")]
        json: bool,

        /// Disable the spinner.
        #[arg(long, env = "FILETEXT_NO_PROGRESS")]
        no_progress: bool,
    },

    /// Print the candidate plan an extraction would use right now.
    Models,

    /// Serve the HTTP API.
    Serve {
        /// Port to listen on.
        #[arg(long, env = "PORT", default_value_t = 9091)]
        port: u16,

        /// Address to bind.
        #[arg(long, env = "FILETEXT_HOST", default_value = "0.0.0.0")]
        host: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Missing .env is fine.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = matches!(
        &cli.command,
        Command::Extract { json: false, no_progress: false, .. }
    ) && !cli.quiet;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match &cli.command {
        Command::Extract {
            file,
            pdf,
            json,
            ..
        } => run_extract(&cli, file, *pdf, *json, show_progress).await,
        Command::Models => run_models(&cli).await,
        Command::Serve { port, host } => run_serve(&cli, host, *port).await,
    }
}

async fn run_extract(cli: &Cli, file: &Path, pdf: bool, json: bool, show_progress: bool) -> Result<()> {
    let spinner = show_progress.then(SpinnerObserver::new);
    let observer = spinner
        .clone()
        .map(|s| s as Arc<dyn ExtractionObserver>);
    let extractor = build_extractor(cli, observer)?;

    let file_name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| file.display().to_string());
    let reader = tokio::fs::File::open(file)
        .await
        .with_context(|| format!("Failed to open {}", file.display()))?;

    let result = if pdf {
        extractor.extract_from_pdf(reader, &file_name).await
    } else {
        extractor.extract_from_file(reader, &file_name).await
    };
    if let Some(ref s) = spinner {
        s.finish();
    }

    let extraction = match result {
        Ok(e) => e,
        Err(e) => {
            if let Some(wait) = e.retry_after() {
                eprintln!("{} retry in about {}s", dim("hint:"), wait.as_secs().max(1));
            }
            return Err(report(e));
        }
    };

    if json {
        let out = serde_json::to_string_pretty(&extraction).context("Failed to serialise output")?;
        println!("{out}");
    } else {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle
            .write_all(extraction.text.as_bytes())
            .context("Failed to write to stdout")?;
        if !extraction.text.ends_with('\n') {
            handle.write_all(b"\n").ok();
        }
    }

    if !cli.quiet && !json {
        eprintln!(
            "{}  {} chars  {}@{}  {} attempts  {}ms",
            green("✔"),
            extraction.text.chars().count(),
            bold(&extraction.model),
            extraction.api_version,
            extraction.attempts,
            extraction.duration_ms,
        );
    }
    Ok(())
}

async fn run_models(cli: &Cli) -> Result<()> {
    let extractor = build_extractor(cli, None)?;
    let plan = extractor.candidate_plan().await.map_err(report)?;

    println!("{} {} candidates ({})", bold("◆"), plan.len(), plan.source());
    for (i, candidate) in plan.iter().enumerate() {
        println!("  {:>3}. {}", i + 1, candidate);
    }
    Ok(())
}

async fn run_serve(cli: &Cli, host: &str, port: u16) -> Result<()> {
    let extractor = build_extractor(cli, None)?;
    if !extractor.is_available() {
        tracing::warn!("GEMINI_API_KEY is not set; only .txt uploads will succeed");
    }

    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .with_context(|| format!("Invalid listen address {host}:{port}"))?;
    let environment = if cfg!(debug_assertions) { "debug" } else { "release" };
    let state = AppState::new(extractor).with_environment(environment);

    server::serve(addr, state)
        .await
        .with_context(|| format!("HTTP server on {addr} failed"))
}

/// Map CLI args to an `Extractor`.
fn build_extractor(
    cli: &Cli,
    observer: Option<Arc<dyn ExtractionObserver>>,
) -> Result<Extractor> {
    let mut builder = ExtractorConfig::builder()
        .call_timeout_secs(cli.call_timeout)
        .search_timeout_secs(cli.search_timeout)
        .max_attempts(cli.max_attempts);

    if let Some(ref key) = cli.api_key {
        builder = builder.api_key(key.clone());
    }
    if let Some(ref url) = cli.base_url {
        builder = builder.base_url(url.clone());
    }
    if !cli.models.is_empty() {
        builder = builder.models(cli.models.clone());
    }
    if !cli.api_versions.is_empty() {
        builder = builder.api_versions(cli.api_versions.clone());
    }
    if let Some(obs) = observer {
        builder = builder.observer(obs);
    }

    let config = builder.build().context("Invalid configuration")?;
    Extractor::new(config).context("Failed to initialise extractor")
}

/// Configuration problems read better without the anyhow chain.
fn report(e: ExtractError) -> anyhow::Error {
    if e.is_configuration() {
        anyhow::anyhow!("{e}")
    } else {
        anyhow::Error::new(e).context("Extraction failed")
    }
}
