//! CLI binary for tabularis.
//!
//! A thin shim over the library crate that maps CLI flags to `ClientConfig`,
//! runs the conversion flow and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tabularis::pages;
use tabularis::progress::{file_progress_message, run_summary_message};
use tabularis::{
    is_pdf_file, ClientConfig, ConversionApi, ConversionOrchestrator, ConversionOutcome,
    ConversionProgressCallback, DirectorySink, FlowStep, HttpConversionApi, PlanTier,
    ProgressCallback, QuotaGate, RunReport, SavedArtifact, SelectionLimits, SelectionRequest,
    SelectionValidator, UploadFile,
};
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

/// Terminal progress: a spinner for the single-file flow that turns into a
/// file-count bar for bulk runs, plus one log line per finished file.
struct CliProgressCallback {
    bar: ProgressBar,
    /// Start of the file currently converting.
    file_started: Mutex<Option<Instant>>,
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
            file_started: Mutex::new(None),
        })
    }

    /// Switch to the bar style once the bulk file count is known.
    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} files  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Converting");
        self.bar.reset_eta();
    }

    fn elapsed_secs(&self) -> f64 {
        self.file_started
            .lock()
            .ok()
            .and_then(|mut t| t.take())
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_step(&self, file_name: &str, step: FlowStep) {
        match step {
            FlowStep::Succeeded | FlowStep::Failed => self.bar.finish_and_clear(),
            FlowStep::Idle => {}
            _ => {
                self.bar.set_prefix(file_name.to_string());
                self.bar.set_message(format!("{step}…"));
            }
        }
    }

    fn on_run_start(&self, total_files: usize) {
        self.activate_bar(total_files);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Starting bulk conversion of {total_files} files…"))
        ));
    }

    fn on_file_start(&self, index: usize, total: usize, file_name: &str) {
        if let Ok(mut t) = self.file_started.lock() {
            *t = Some(Instant::now());
        }
        self.bar
            .set_message(file_progress_message(index, total, file_name));
    }

    fn on_file_complete(&self, index: usize, total: usize, artifact: &SavedArtifact) {
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}  {}",
            green("✓"),
            index,
            total,
            artifact.filename,
            dim(&format!("{:.1}s", self.elapsed_secs())),
        ));
        self.bar.inc(1);
    }

    fn on_file_error(&self, index: usize, total: usize, file_name: &str, error: &str) {
        // Truncate very long error messages to keep output tidy.
        let msg = if error.chars().count() > 80 {
            let head: String = error.chars().take(79).collect();
            format!("{head}\u{2026}")
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}  {}  {}",
            red("✗"),
            index,
            total,
            file_name,
            red(&msg),
            dim(&format!("{:.1}s", self.elapsed_secs())),
        ));
        self.bar.inc(1);
    }

    fn on_run_complete(&self, total: usize, succeeded: usize) {
        let failed = total.saturating_sub(succeeded);
        self.bar.finish_and_clear();

        let mark = if failed == 0 {
            green("✔")
        } else if failed == total {
            red("✘")
        } else {
            cyan("⚠")
        };
        eprintln!("{} {}", mark, bold(&run_summary_message(succeeded, total)));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert the default selection of one PDF into the current directory
  tabularis statement.pdf

  # Specific pages into a directory
  tabularis --pages 1-3,5 report.pdf -o out/

  # Every page (Pro, or when the service allows it for this file)
  tabularis --pages all report.pdf

  # Bulk conversion (Pro plan, two or more PDFs)
  tabularis q1.pdf q2.pdf q3.pdf -o quarterly/

  # Page count and plan limits for a file, no conversion
  tabularis --inspect-only report.pdf

  # Plan and usage of the signed-in account
  tabularis --account

  # Canonical form of a page selection (offline)
  tabularis --normalize "7-3, 1,2"

PAGE SELECTIONS:
  Comma-separated pages and ranges: 5   1,3,5   2-9   1-3,7,10-12
  Ranges may be written in either order (7-3 = 3-7). Duplicates are merged.

ENVIRONMENT VARIABLES:
  TABULARIS_API_URL        Base URL of the conversion service
  TABULARIS_TOKEN          Bearer token of the signed-in user
  TABULARIS_PLAN_OVERRIDE  Force plan behaviour locally (free, pro)
  TABULARIS_OUT_DIR        Output directory
  RUST_LOG                 Override log filter (e.g. tabularis=debug)
"#;

/// Convert PDF tables to spreadsheets through a tabularis service.
#[derive(Parser, Debug)]
#[command(
    name = "tabularis",
    version,
    about = "Convert PDF tables to spreadsheets through a tabularis service",
    long_about = "Upload PDF files to a tabularis conversion service, choose which pages to \
convert, and save the resulting spreadsheets. Free plans convert one file at a time within \
their quota; Pro plans can convert many files in one run.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// PDF files to convert. Non-PDF files are ignored.
    files: Vec<PathBuf>,

    /// Page selection: all, 5, 3-15, or 1,3,5-7. Default: the service's suggestion.
    #[arg(long, env = "TABULARIS_PAGES")]
    pages: Option<String>,

    /// Directory to save converted files into.
    #[arg(short = 'o', long = "out-dir", env = "TABULARIS_OUT_DIR", default_value = ".")]
    out_dir: PathBuf,

    /// Base URL of the conversion service.
    #[arg(long, env = "TABULARIS_API_URL", default_value = "http://localhost:8000")]
    api_url: String,

    /// Bearer token of the signed-in user.
    #[arg(long, env = "TABULARIS_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Force plan behaviour locally: free or pro.
    #[arg(long, env = "TABULARIS_PLAN_OVERRIDE", value_enum)]
    plan_override: Option<PlanArg>,

    /// Per-request timeout in seconds.
    #[arg(long, env = "TABULARIS_TIMEOUT", default_value_t = 120)]
    timeout: u64,

    /// Print page count and plan limits only, no conversion.
    #[arg(long)]
    inspect_only: bool,

    /// Print plan and usage of the account, then exit.
    #[arg(long)]
    account: bool,

    /// Print the canonical form of a page selection, then exit.
    #[arg(long, value_name = "SPEC")]
    normalize: Option<String>,

    /// Output structured JSON instead of text.
    #[arg(long, env = "TABULARIS_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "TABULARIS_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "TABULARIS_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "TABULARIS_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum PlanArg {
    Free,
    Pro,
}

impl From<PlanArg> for PlanTier {
    fn from(v: PlanArg) -> Self {
        match v {
            PlanArg::Free => PlanTier::Free,
            PlanArg::Pro => PlanTier::Pro,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level library logs.
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

    // ── Offline: normalise a page selection ──────────────────────────────
    if let Some(ref spec) = cli.normalize {
        let set = pages::parse(spec).with_context(|| format!("Invalid page selection '{spec}'"))?;
        if cli.json {
            println!(
                "{}",
                serde_json::to_string(&set).context("Failed to serialise pages")?
            );
        } else {
            println!("{}", pages::serialize(&set));
        }
        return Ok(());
    }

    let config = build_config(&cli)?;
    let api = Arc::new(HttpConversionApi::new(&config).context("Failed to create API client")?);

    // ── Account ──────────────────────────────────────────────────────────
    if cli.account {
        let account = api.account().await.context("Failed to fetch account")?;
        let quota = QuotaGate::from_account(account, config.plan_override);
        print_quota(&quota, cli.json)?;
        return Ok(());
    }

    if cli.files.is_empty() {
        anyhow::bail!("No input files given");
    }
    let files = read_files(&cli.files).await?;

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        for file in files.iter().filter(|f| is_pdf_file(f)) {
            let inspection = api
                .inspect(file)
                .await
                .with_context(|| format!("Failed to inspect '{}'", file.name))?;
            let validator = SelectionValidator::new(SelectionLimits::from(&inspection));
            if cli.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&inspection)
                        .context("Failed to serialise inspection")?
                );
            } else {
                let default = validator
                    .default_selection()
                    .to_spec()
                    .unwrap_or_else(|| "all".to_string());
                println!("File:             {}", inspection.filename);
                println!("Pages:            {}", inspection.total_pages);
                println!("Convert all:      {}", inspection.can_convert_all);
                println!("Max selectable:   {}", inspection.max_select_pages);
                println!("Free page cap:    {}", inspection.free_max_pages);
                println!("Default pages:    {default}");
                println!();
            }
        }
        return Ok(());
    }

    // ── Run conversion ───────────────────────────────────────────────────
    let progress: Option<ProgressCallback> = show_progress
        .then(|| CliProgressCallback::new() as Arc<dyn ConversionProgressCallback>);

    let sink = Arc::new(DirectorySink::from_config(&config));
    let mut flow = ConversionOrchestrator::new(api, sink).with_plan_override(config.plan_override);
    if let Some(cb) = progress {
        flow = flow.with_progress(cb);
    }
    flow.refresh_quota()
        .await
        .context("Failed to fetch account usage")?;

    let request = match cli.pages.as_deref() {
        Some(spec) => spec
            .parse::<SelectionRequest>()
            .context("Invalid --pages value")?,
        None => SelectionRequest::Default,
    };

    let report = flow.run(files, request).await.context("Conversion failed")?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialise report")?
        );
    }

    match report {
        RunReport::Empty => {
            if !cli.quiet {
                eprintln!("Nothing to convert.");
            }
        }
        RunReport::Single { outcome } => match outcome {
            ConversionOutcome::Succeeded { source, artifact } => {
                if !cli.quiet && !cli.json {
                    let location = artifact
                        .location
                        .as_ref()
                        .map(|p| p.display().to_string())
                        .unwrap_or(artifact.filename);
                    eprintln!("{}  {}  →  {}", green("✔"), source, bold(&location));
                }
            }
            ConversionOutcome::Failed { source, message } => {
                anyhow::bail!("{source}: {message}");
            }
        },
        RunReport::Bulk { summary } => {
            if !cli.quiet && !show_progress && !cli.json {
                eprintln!("{}", summary.state.summary());
            }
            if !summary.state.failed.is_empty() {
                anyhow::bail!(
                    "{} of {} file(s) failed: {}",
                    summary.state.failed.len(),
                    summary.state.total,
                    summary.state.failed.join(", ")
                );
            }
        }
    }

    if !cli.quiet && !cli.json {
        eprintln!(
            "   {} {}",
            dim(flow.quota().plan_label()),
            dim(&format!("usage {}", flow.quota().usage_label()))
        );
    }

    Ok(())
}

/// Map CLI args to `ClientConfig`.
fn build_config(cli: &Cli) -> Result<ClientConfig> {
    let mut builder = ClientConfig::builder()
        .api_base_url(cli.api_url.as_str())
        .plan_override(cli.plan_override.map(PlanTier::from))
        .request_timeout_secs(cli.timeout)
        .output_dir(cli.out_dir.clone());

    if let Some(ref token) = cli.token {
        builder = builder.access_token(token.as_str());
    }

    builder.build().context("Invalid configuration")
}

async fn read_files(paths: &[PathBuf]) -> Result<Vec<UploadFile>> {
    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        files.push(
            UploadFile::from_path(path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?,
        );
    }
    Ok(files)
}

fn print_quota(quota: &QuotaGate, json: bool) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(quota).context("Failed to serialise account")?
        );
        return Ok(());
    }

    println!("Plan:         {}", quota.plan_label());
    println!("Usage:        {}", quota.usage_label());
    if let Some(remaining) = quota.remaining() {
        println!("Remaining:    {remaining}");
        println!("Used:         {:.0}%", quota.usage_percent());
    }
    let resets_in = quota.time_until_reset(chrono::Utc::now());
    if !resets_in.is_empty() {
        println!("Resets in:    {resets_in}");
    }
    if !quota.can_start() {
        println!("{}", red("Conversion limit reached."));
    }
    Ok(())
}
