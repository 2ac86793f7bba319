//! CLI binary for journal-capture.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `CaptureConfig`, stages files and camera frames, applies the requested
//! page order, and prints the finalized text.

use anyhow::{bail, Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use journal_capture::backend;
use journal_capture::config::DEFAULT_MAX_UPLOAD_BYTES;
use journal_capture::{
    Camera, CaptureConfig, CaptureSession, CommandFrameSource, Direction, ProgressCallback,
    StagingProgressCallback, StagingQueue,
};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
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
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar for the batch plus a log line per file.
struct CliProgressCallback {
    bar: ProgressBar,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_position(0);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Staging");
    }
}

impl StagingProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total: usize) {
        self.activate_bar(total);
    }

    fn on_item_start(&self, _index: usize, _total: usize, name: &str) {
        self.bar.set_message(name.to_string());
    }

    fn on_item_staged(&self, index: usize, total: usize, name: &str, bytes: usize) {
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {:<32}  {}",
            green("✓"),
            index + 1,
            total,
            name,
            dim(&format!("{:.1} KiB", bytes as f64 / 1024.0)),
        ));
        self.bar.inc(1);
    }

    fn on_item_error(&self, index: usize, total: usize, name: &str, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        let msg = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {:<32}  {}",
            red("✗"),
            index + 1,
            total,
            name,
            red(&msg),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total: usize, staged: usize) {
        let failed = total.saturating_sub(staged);
        self.bar.println(format!(
            "{} {}/{} files staged{}",
            if failed == 0 { green("✔") } else { cyan("⚠") },
            bold(&staged.to_string()),
            total,
            if failed == 0 {
                String::new()
            } else {
                format!("  ({} skipped)", red(&failed.to_string()))
            }
        ));
    }

    fn on_finalize_start(&self, pages: usize) {
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        self.bar.set_style(spinner_style);
        self.bar.set_prefix("OCR");
        self.bar.set_message(format!("extracting text from {pages} pages…"));
    }

    fn on_finalize_complete(&self, pages: usize, text_len: usize) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} {} pages transcribed  {}",
            green("✔"),
            bold(&pages.to_string()),
            dim(&format!("{text_len} chars")),
        );
    }

    fn on_finalize_error(&self, pages: usize, error: &str) {
        self.bar.finish_and_clear();
        eprintln!("{} OCR failed for {} staged pages: {}", red("✘"), pages, error);
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Transcribe three photographed pages via the journal web app
  journal-capture --backend http://localhost:3000 p1.jpg p2.heic p3.png

  # Offline: store pages locally and OCR them with a vision model
  journal-capture --store ./media --model gpt-4.1-mini page*.jpg -o entry.txt

  # Grab a frame from the webcam first, then add files
  journal-capture --camera notes.jpg

  # Pages were picked out of order: put the third first, drop the second
  journal-capture --drop 2 --order 2,1 a.jpg b.jpg c.jpg

  # Grey, smaller uploads for faded pencil
  journal-capture --grayscale --max-dimension 1600 page.jpg

ENVIRONMENT VARIABLES:
  JOURNAL_BACKEND_URL     Journal web app base URL (enables HTTP mode)
  JOURNAL_USER_ID         Sent as x-user-id to the web app
  JOURNAL_STORE_DIR       Local media store directory (local mode)
  OCR_MODEL_ID            Vision model for local-mode OCR
  OPENAI_API_KEY          OpenAI API key (local mode)
  ANTHROPIC_API_KEY       Anthropic API key (local mode)
  RUST_LOG                Override log filter
"#;

/// Capture handwritten journal pages and transcribe them in page order.
#[derive(Parser, Debug)]
#[command(
    name = "journal-capture",
    version,
    about = "Capture handwritten journal pages and transcribe them in page order",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Image files (JPEG, PNG, WebP, HEIC, …), staged in the given order.
    files: Vec<PathBuf>,

    /// Grab one frame from the camera before staging files.
    #[arg(long)]
    camera: bool,

    /// Command that writes one JPEG frame to stdout.
    #[arg(long, env = "JOURNAL_CAMERA_COMMAND")]
    camera_command: Option<String>,

    /// Write the transcription to this file instead of stdout.
    #[arg(short, long, env = "JOURNAL_OUTPUT")]
    output: Option<PathBuf>,

    /// Journal web app base URL. Without it, pages go to the local store.
    #[arg(long, env = "JOURNAL_BACKEND_URL")]
    backend: Option<String>,

    /// User id sent as x-user-id to the web app.
    #[arg(long, env = "JOURNAL_USER_ID")]
    user_id: Option<String>,

    /// Local media store directory (local mode only).
    #[arg(long, env = "JOURNAL_STORE_DIR", default_value = "journal-media")]
    store: PathBuf,

    /// Vision model for local-mode OCR.
    #[arg(long, env = "OCR_MODEL_ID")]
    model: Option<String>,

    /// Vision provider for local-mode OCR: openai, anthropic, gemini, ollama.
    #[arg(long, env = "JOURNAL_OCR_PROVIDER")]
    provider: Option<String>,

    /// Path to a text file containing a custom OCR system prompt.
    #[arg(long, env = "JOURNAL_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Longest edge of uploaded pages in pixels (never upscales).
    #[arg(long, env = "JOURNAL_MAX_DIMENSION", default_value_t = 2048,
          value_parser = clap::value_parser!(u32).range(1..))]
    max_dimension: u32,

    /// Convert pages to greyscale before upload.
    #[arg(long, env = "JOURNAL_GRAYSCALE")]
    grayscale: bool,

    /// Upload size ceiling in bytes.
    #[arg(long, env = "JOURNAL_MAX_UPLOAD_BYTES", default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
    max_upload_bytes: usize,

    /// HEIC converter program, invoked as `<prog> <in.heic> <out.jpg>`.
    #[arg(long, env = "JOURNAL_HEIC_CONVERTER", default_value = "heif-convert")]
    heic_converter: String,

    /// Remove staged page N (1-based). Repeatable. Applied before --order.
    #[arg(long = "drop", value_name = "N")]
    drop_pages: Vec<usize>,

    /// Final page order as a permutation of staged positions, e.g. 3,1,2.
    #[arg(long)]
    order: Option<String>,

    /// Print the capture (remote ids + text) as JSON.
    #[arg(long)]
    json: bool,

    /// HTTP request timeout in seconds.
    #[arg(long, env = "JOURNAL_REQUEST_TIMEOUT", default_value_t = 120)]
    request_timeout: u64,

    /// Disable progress bar.
    #[arg(long)]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
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

    if cli.files.is_empty() && !cli.camera {
        bail!("Nothing to capture: pass image files and/or --camera");
    }

    // ── Build config & collaborators ─────────────────────────────────────
    let config = build_config(&cli).await?;
    let backends = backend::connect(&config).context("Failed to set up backend")?;

    let mut session = CaptureSession::new(&config, backends.uploader.clone());
    if show_progress {
        let cb: ProgressCallback = CliProgressCallback::new();
        session = session.with_progress(cb);
    }

    // ── Acquire ──────────────────────────────────────────────────────────
    if cli.camera {
        let source = match cli.camera_command {
            Some(ref cmd) => CommandFrameSource::from_command_line(cmd)?,
            None => CommandFrameSource::default(),
        };
        let mut camera = Camera::new(source);
        let captured = session.capture_frame(&mut camera).await;
        camera.release().await;
        captured.context("Camera capture failed")?;
    }

    if !cli.files.is_empty() {
        let report = session.stage_files(&cli.files).await;
        if !cli.quiet && !show_progress {
            for e in &report.errors {
                eprintln!("skipped {e}");
            }
        }
    }

    // ── Arrange ──────────────────────────────────────────────────────────
    apply_drops(session.queue_mut(), &cli.drop_pages)?;
    if let Some(ref order) = cli.order {
        let order = parse_order(order, session.queue().len())?;
        apply_order(session.queue_mut(), &order);
    }

    if session.queue().is_empty() {
        bail!("No pages were staged");
    }

    // ── Finalize ─────────────────────────────────────────────────────────
    let capture = session
        .finalize(backends.ocr.as_ref())
        .await
        .context("Finalize failed; staged pages were kept")?
        .context("No pages were staged")?;

    if let Some(ref path) = cli.output {
        journal_capture::write_text_atomic(path, &capture.text)
            .await
            .context("Failed to write output")?;
        if !cli.quiet {
            eprintln!(
                "{}  {} pages  →  {}",
                green("✔"),
                capture.remote_ids.len(),
                bold(&path.display().to_string())
            );
        }
    } else if cli.json {
        let json = serde_json::to_string_pretty(&capture).context("Failed to serialise capture")?;
        println!("{json}");
    } else {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle
            .write_all(capture.text.as_bytes())
            .context("Failed to write to stdout")?;
        if !capture.text.ends_with('\n') {
            handle.write_all(b"\n").ok();
        }
    }

    Ok(())
}

/// Map CLI args to `CaptureConfig`.
async fn build_config(cli: &Cli) -> Result<CaptureConfig> {
    let mut builder = CaptureConfig::builder()
        .max_dimension_px(cli.max_dimension)
        .grayscale(cli.grayscale)
        .max_upload_bytes(cli.max_upload_bytes)
        .heic_converter(cli.heic_converter.as_str())
        .store_dir(cli.store.clone())
        .request_timeout_secs(cli.request_timeout);

    if let Some(ref url) = cli.backend {
        builder = builder.backend_url(url.as_str());
    }
    if let Some(ref id) = cli.user_id {
        builder = builder.user_id(id.as_str());
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model.as_str());
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.as_str());
    }
    if let Some(ref path) = cli.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }

    builder.build().context("Invalid configuration")
}

/// Remove 1-based positions, highest first so earlier removals don't shift later ones.
fn apply_drops(queue: &mut StagingQueue, drops: &[usize]) -> Result<()> {
    let mut positions = drops.to_vec();
    positions.sort_unstable();
    positions.dedup();
    for &n in positions.iter().rev() {
        if n == 0 || !queue.remove_item(n - 1) {
            bail!("--drop {n}: no staged page at that position");
        }
    }
    Ok(())
}

/// Parse `3,1,2` into 0-based indices, requiring a permutation of `1..=len`.
fn parse_order(s: &str, len: usize) -> Result<Vec<usize>> {
    let order = s
        .split(',')
        .map(|p| {
            p.trim()
                .parse::<usize>()
                .with_context(|| format!("Invalid page number: '{}'", p.trim()))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut seen = vec![false; len];
    for &n in &order {
        if n == 0 || n > len {
            bail!("--order: page {n} is out of range (1–{len})");
        }
        if std::mem::replace(&mut seen[n - 1], true) {
            bail!("--order: page {n} listed twice");
        }
    }
    if order.len() != len {
        bail!("--order must list all {len} staged pages, got {}", order.len());
    }
    Ok(order.into_iter().map(|n| n - 1).collect())
}

/// Rearrange the queue so position `i` holds what was at `order[i]`,
/// using only neighbour swaps.
fn apply_order(queue: &mut StagingQueue, order: &[usize]) {
    let wanted: Vec<String> = order
        .iter()
        .map(|&i| queue.items()[i].remote_id.clone())
        .collect();

    for (target, id) in wanted.iter().enumerate() {
        let Some(mut current) = queue.items().iter().position(|item| &item.remote_id == id)
        else {
            continue;
        };
        while current > target && queue.move_item(current, Direction::Up) {
            current -= 1;
        }
    }
}
