//! CLI binary for archscan.
//!
//! A thin shim over the library crate that maps CLI flags and environment
//! variables to `AnalysisConfig` and prints the analysis.

use anyhow::{Context, Result};
use archscan::config::{DEFAULT_API_URL, DEFAULT_MODEL};
use archscan::{
    analyze_to_file, inspect, mask_secret, result_path, AnalysisConfig, AnalysisError,
    AnalysisProgressCallback, AnalysisResult, InputInventory, ProgressCallback,
};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

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

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a spinner whose message follows the pipeline
/// stage, plus one log line per rasterised PDF and per dropped image.
struct CliProgressCallback {
    bar: ProgressBar,
    encoded: AtomicUsize,
    sampled: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(style);
        bar.set_prefix("Scanning");
        bar.set_message("Looking for PDFs and images…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            encoded: AtomicUsize::new(0),
            sampled: AtomicUsize::new(0),
        })
    }
}

impl AnalysisProgressCallback for CliProgressCallback {
    fn on_discovery(&self, pdfs: usize, images: usize) {
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Found {pdfs} PDFs and {images} images"))
        ));
        self.bar.set_prefix("Rendering");
        self.bar.set_message("Rasterising PDF pages…");
    }

    fn on_pdf_rasterised(&self, pdf: &Path, pages: usize) {
        self.bar.println(format!(
            "  {} {}  {}",
            green("✓"),
            pdf.display(),
            dim(&format!("{pages} pages"))
        ));
    }

    fn on_sampled(&self, sampled: usize, pool: usize) {
        self.sampled.store(sampled, Ordering::SeqCst);
        self.bar.println(format!(
            "{} Sampled {} of {} images",
            cyan("◆"),
            bold(&sampled.to_string()),
            pool
        ));
        self.bar.set_prefix("Encoding");
        self.bar.set_message(format!("0/{sampled}"));
    }

    fn on_image_encoded(&self, _path: &Path) {
        let done = self.encoded.fetch_add(1, Ordering::SeqCst) + 1;
        self.bar
            .set_message(format!("{done}/{}", self.sampled.load(Ordering::SeqCst)));
    }

    fn on_image_dropped(&self, path: &Path, error: &str) {
        // Truncate very long error messages to keep output tidy.
        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} {}  {}",
            red("✗"),
            path.display(),
            red(&msg)
        ));
    }

    fn on_request_sent(&self, images: usize) {
        self.bar.set_prefix("Analysing");
        self.bar
            .set_message(format!("Waiting for the model ({images} images)…"));
    }

    fn on_analysis_complete(&self, chars: usize) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} Analysis received  {}",
            green("✔"),
            dim(&format!("{chars} chars"))
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Analyse ./data, write pages and analysis_result.json to ./output
  archscan

  # Explicit folders, bigger sample, reproducible draw
  archscan /scans/box-17 -o /tmp/box-17 --sample-size 8 --seed 42

  # List what a folder holds (no API key needed)
  archscan --inspect-only /scans/box-17

  # Machine-readable result on stdout
  archscan --json /scans/box-17 > box-17.json

  # Restrict the vocabulary offered to the model
  archscan --material-type "Diaries" --material-type "Historical Photographs"

  # Keep a log of every run next to the results
  archscan --log-file ./output/archscan.log

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          Bearer token for the chat-completion endpoint (required)
  OPENAI_API_URL          Chat-completion endpoint URL
  OPENAI_MODEL            Vision model identifier
  ARCHSCAN_INPUT          Input directory (default ./data)
  ARCHSCAN_OUTPUT         Output directory (default ./output)
  ARCHSCAN_SAMPLE_SIZE    Images sent to the model per run
  ARCHSCAN_MAX_TOKENS     max_tokens for the model response
  ARCHSCAN_SEED           Seed for the sampler's random draw
  ARCHSCAN_DPI            PDF rendering DPI
  ARCHSCAN_PASSWORD       Password for encrypted PDFs
  LOG_LEVEL               Log level when RUST_LOG is unset (default info)
  ARCHSCAN_LOG_FILE       Also append logs to this file
  PDFIUM_LIB_PATH         Path to the pdfium shared library

  A .env file in the working directory is loaded before flags are parsed.
"#;

/// Characterise a folder of scanned archival material with a vision LLM.
#[derive(Parser, Debug)]
#[command(
    name = "archscan",
    version,
    about = "Characterise a folder of scanned archival material with a vision LLM",
    long_about = "Rasterise every PDF in a folder, sample a handful of pages and images, \
and ask a vision model what kind of archival material they show: type, era, condition, \
languages, and digitisation challenges.",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Directory holding PDFs and/or JPEG/PNG images.
    #[arg(env = "ARCHSCAN_INPUT", default_value = "./data")]
    input: PathBuf,

    /// Directory for rasterised pages and analysis_result.json.
    #[arg(short, long, env = "ARCHSCAN_OUTPUT", default_value = "./output")]
    output: PathBuf,

    /// API key for the chat-completion endpoint.
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Chat-completion endpoint URL.
    #[arg(long, env = "OPENAI_API_URL", default_value = DEFAULT_API_URL)]
    api_url: String,

    /// Vision model identifier.
    #[arg(long, env = "OPENAI_MODEL", default_value = DEFAULT_MODEL)]
    model: String,

    /// Maximum number of images sent to the model.
    #[arg(short = 'n', long, env = "ARCHSCAN_SAMPLE_SIZE", default_value_t = 5,
          value_parser = clap::value_parser!(u64).range(1..))]
    sample_size: u64,

    /// max_tokens for the model response.
    #[arg(long, env = "ARCHSCAN_MAX_TOKENS", default_value_t = 1000)]
    max_tokens: usize,

    /// Seed for the sampler's random draw (omit for a fresh draw each run).
    #[arg(long, env = "ARCHSCAN_SEED")]
    seed: Option<u64>,

    /// PDF rendering DPI (72–600).
    #[arg(long, env = "ARCHSCAN_DPI", default_value_t = 200,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// Password for encrypted PDFs.
    #[arg(long, env = "ARCHSCAN_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Longest edge, in pixels, of each image sent to the model.
    #[arg(long, default_value_t = 1024)]
    max_dimension: u32,

    /// Whole-request timeout for the model call, in seconds.
    #[arg(long)]
    api_timeout: Option<u64>,

    /// Material type offered to the model; repeat to build the list.
    #[arg(long = "material-type", value_name = "LABEL")]
    material_types: Vec<String>,

    /// Print the AnalysisResult as JSON on stdout instead of the banner.
    #[arg(long)]
    json: bool,

    /// Disable the progress spinner.
    #[arg(long)]
    no_progress: bool,

    /// List the folder's PDFs and image headers only; no rendering, no model call.
    #[arg(long)]
    inspect_only: bool,

    /// Log level when RUST_LOG is unset: error, warn, info, debug, trace.
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Also append log lines to this file, without colour codes.
    #[arg(long, env = "ARCHSCAN_LOG_FILE", value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all output except errors and the result.
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env must be loaded before clap reads its env fallbacks.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        cli.log_level.as_str()
    };

    let file_layer = match cli.log_file {
        Some(ref path) => Some(
            fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(open_log_file(path)?)),
        ),
        None => None,
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .init();

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let inventory = inspect(&cli.input)
            .await
            .context("Failed to inspect input directory")?;

        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&inventory)
                    .context("Failed to serialize inventory")?
            );
        } else {
            print_inventory(&inventory);
        }
        return Ok(());
    }

    // ── Build config ─────────────────────────────────────────────────────
    let api_key = cli
        .api_key
        .clone()
        .filter(|k| !k.trim().is_empty())
        .ok_or(AnalysisError::MissingApiKey)?;
    info!("Using API key: {}", mask_secret(&api_key));
    info!("Input directory: {}", cli.input.display());
    info!("Output directory: {}", cli.output.display());

    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn AnalysisProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, api_key, progress_cb)?;

    // ── Run analysis ─────────────────────────────────────────────────────
    let result = analyze_to_file(&cli.input, &config)
        .await
        .context("Analysis failed")?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&result).context("Failed to serialise result")?
        );
    } else {
        print_banner(&result, &result_path(&config));
    }

    Ok(())
}

/// Open `path` for appending, creating it and its parent directory if needed.
fn open_log_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Cannot create log directory {}", parent.display()))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Cannot open log file {}", path.display()))
}

/// Map CLI args to `AnalysisConfig`.
fn build_config(
    cli: &Cli,
    api_key: String,
    progress: Option<ProgressCallback>,
) -> Result<AnalysisConfig> {
    let sample_size =
        usize::try_from(cli.sample_size).context("--sample-size does not fit in usize")?;

    let mut builder = AnalysisConfig::builder()
        .api_key(api_key)
        .api_url(&cli.api_url)
        .model(&cli.model)
        .max_tokens(cli.max_tokens)
        .sample_size(sample_size)
        .max_image_dimension(cli.max_dimension)
        .render_dpi(cli.dpi)
        .output_dir(&cli.output);

    if let Some(seed) = cli.seed {
        builder = builder.seed(seed);
    }
    if let Some(ref password) = cli.password {
        builder = builder.pdf_password(password);
    }
    if let Some(secs) = cli.api_timeout {
        builder = builder.request_timeout_secs(secs);
    }
    if !cli.material_types.is_empty() {
        builder = builder.material_types(cli.material_types.iter().cloned());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn print_banner(result: &AnalysisResult, saved_to: &Path) {
    let rule = "=".repeat(80);
    println!("\n{rule}");
    println!("{}", bold("DOCUMENT MATERIAL ANALYSIS"));
    println!("{rule}\n");
    println!("{}", result.analysis);
    println!("\n{rule}");
    println!(
        "{}",
        dim(&format!(
            "{} PDFs, {} images, {} sampled",
            result.total_pdfs,
            result.total_images,
            result.sampled_images.len()
        ))
    );
    println!("Analysis saved to: {}", bold(&saved_to.display().to_string()));
}

fn print_inventory(inventory: &InputInventory) {
    println!("Directory:    {}", inventory.input_directory);
    println!("PDFs:         {}", inventory.pdfs.len());
    for pdf in &inventory.pdfs {
        println!("  {}", pdf.display());
    }
    println!("Images:       {}", inventory.images.len());
    for img in &inventory.images {
        println!(
            "  {}  {}",
            img.path.display(),
            dim(&format!(
                "{}x{} {}",
                img.width,
                img.height,
                img.format.as_deref().unwrap_or("?")
            ))
        );
    }
    if !inventory.unreadable.is_empty() {
        println!("Unreadable:   {}", inventory.unreadable.len());
        for (path, reason) in &inventory.unreadable {
            println!("  {} {}  {}", red("✗"), path.display(), dim(reason));
        }
    }
}
