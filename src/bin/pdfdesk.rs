//! CLI binary for pdfdesk.
//!
//! `pdfdesk serve` runs the HTTP server; the other subcommands are a thin
//! shim over [`pdfdesk::DeskClient`] that upload files to a running server
//! and save what comes back.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use pdfdesk::client::DEFAULT_SERVER;
use pdfdesk::config::MIB;
use pdfdesk::{
    DeskClient, DeskService, Limits, Operation, ProgressCallback, ServiceConfig,
    UploadProgressCallback,
};
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
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

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a percentage bar driven by the client's
/// simulated upload progress.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}%  ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        let bar = ProgressBar::new(100);
        bar.set_style(style);
        bar.set_prefix("Uploading");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl UploadProgressCallback for CliProgressCallback {
    fn on_submit(&self, operation: Operation, file_count: usize, total_bytes: u64) {
        self.bar.set_message(format!(
            "{operation}: {file_count} file(s), {:.2}MB",
            total_bytes as f64 / MIB as f64
        ));
    }

    fn on_progress(&self, percent: u8) {
        if percent >= 90 {
            self.bar.set_prefix("Processing");
        }
        self.bar.set_position(u64::from(percent));
    }

    fn on_complete(&self, _operation: Operation, output_bytes: usize) {
        self.bar
            .finish_with_message(format!("{} {output_bytes} bytes", green("✓")));
    }

    fn on_error(&self, _operation: Operation, error: &str) {
        self.bar.abandon_with_message(format!("{} {error}", red("✗")));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Start the server on the default address (127.0.0.1:3000)
  pdfdesk serve

  # Serve on all interfaces with a 60 s engine timeout
  pdfdesk serve --bind 0.0.0.0:8080 --timeout 60

  # Compress a PDF (writes compressed.pdf unless -o is given)
  pdfdesk compress report.pdf -o report-small.pdf

  # Merge PDFs in the given order
  pdfdesk merge cover.pdf body.pdf appendix.pdf -o book.pdf

  # Convert between PDF and Word
  pdfdesk pdf-to-word scan.pdf -o scan.docx
  pdfdesk word-to-pdf letter.docx

ENGINES:
  compress      Ghostscript   (gs, or --gs-bin / PDFDESK_GS_BIN)
  merge         built in      (lopdf)
  pdf-to-word   LibreOffice   (soffice, or --soffice-bin / PDFDESK_SOFFICE_BIN)
  word-to-pdf   LibreOffice

LIMITS (defaults):
  merge         2–20 files, 100 MB total, 10 MB per file
  other         20 MB per file
"#;

/// Merge, compress and convert PDF / Word documents.
#[derive(Parser, Debug)]
#[command(
    name = "pdfdesk",
    version,
    about = "Merge, compress and convert PDF / Word documents",
    long_about = "Merge, compress and convert PDF / Word documents through a small HTTP \
service. `pdfdesk serve` runs the service; the other subcommands upload files to a \
running service and save the result.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Server the client subcommands talk to.
    #[arg(long, global = true, env = "PDFDESK_SERVER", default_value = DEFAULT_SERVER)]
    server: String,

    /// Disable progress bar.
    #[arg(long, global = true, env = "PDFDESK_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "PDFDESK_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "PDFDESK_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server.
    Serve(ServeArgs),
    /// Compress a PDF.
    Compress(SingleArgs),
    /// Merge 2–20 PDFs, in the given order.
    Merge(MergeArgs),
    /// Convert a PDF to a Word document.
    PdfToWord(SingleArgs),
    /// Convert a Word document to PDF.
    WordToPdf(SingleArgs),
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Address to listen on.
    #[arg(long, env = "PDFDESK_BIND", default_value = "127.0.0.1:3000")]
    bind: SocketAddr,

    /// Directory for per-request scratch workspaces (default: system temp dir).
    #[arg(long, env = "PDFDESK_SCRATCH_DIR")]
    scratch_dir: Option<PathBuf>,

    /// Engine timeout in seconds.
    #[arg(long, env = "PDFDESK_TIMEOUT", default_value_t = 120,
          value_parser = clap::value_parser!(u64).range(1..))]
    timeout: u64,

    /// Ghostscript executable.
    #[arg(long, env = "PDFDESK_GS_BIN", default_value = "gs")]
    gs_bin: PathBuf,

    /// LibreOffice executable.
    #[arg(long, env = "PDFDESK_SOFFICE_BIN", default_value = "soffice")]
    soffice_bin: PathBuf,

    #[command(flatten)]
    limits: LimitArgs,
}

/// Upload limits, shared by the server and the client pre-checks.
#[derive(Args, Debug)]
struct LimitArgs {
    /// Most files one merge accepts.
    #[arg(long, env = "PDFDESK_MAX_MERGE_FILES", default_value_t = 20)]
    max_merge_files: usize,

    /// Aggregate merge size cap in MB.
    #[arg(long, env = "PDFDESK_MAX_MERGE_TOTAL_MB", default_value_t = 100)]
    max_merge_total_mb: u64,

    /// Per-file cap for merge members in MB.
    #[arg(long, env = "PDFDESK_MAX_MERGE_FILE_MB", default_value_t = 10)]
    max_merge_file_mb: u64,

    /// Per-file cap for compress and conversions in MB.
    #[arg(long, env = "PDFDESK_MAX_FILE_MB", default_value_t = 20)]
    max_file_mb: u64,
}

impl LimitArgs {
    fn to_limits(&self) -> Limits {
        Limits {
            max_merge_files: self.max_merge_files,
            max_merge_total_bytes: self.max_merge_total_mb * MIB,
            max_merge_file_bytes: self.max_merge_file_mb * MIB,
            max_file_bytes: self.max_file_mb * MIB,
            ..Limits::default()
        }
    }
}

#[derive(Args, Debug)]
struct SingleArgs {
    /// Input file.
    input: PathBuf,

    /// Where to save the result (default: the server's suggested filename).
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[command(flatten)]
    limits: LimitArgs,
}

#[derive(Args, Debug)]
struct MergeArgs {
    /// Input PDFs, in page order.
    #[arg(required = true, num_args = 1..)]
    inputs: Vec<PathBuf>,

    /// Where to save the result (default: merged.pdf).
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[command(flatten)]
    limits: LimitArgs,
}

/// Wait for shutdown signal (SIGTERM or Ctrl+C)
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down gracefully...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down gracefully...");
        },
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let serving = matches!(cli.command, Command::Serve(_));

    // ── Logging setup ────────────────────────────────────────────────────
    // Client runs keep library INFO logs out of the way of the progress bar.
    let show_progress = !serving && !cli.quiet && !cli.no_progress;
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

    match cli.command {
        Command::Serve(ref args) => serve(args).await,
        Command::Compress(ref args) => {
            run_single(&cli, Operation::Compress, args, show_progress).await
        }
        Command::PdfToWord(ref args) => {
            run_single(&cli, Operation::PdfToDocx, args, show_progress).await
        }
        Command::WordToPdf(ref args) => {
            run_single(&cli, Operation::DocxToPdf, args, show_progress).await
        }
        Command::Merge(ref args) => {
            run_client(
                &cli,
                Operation::Merge,
                &args.inputs,
                args.output.as_ref(),
                &args.limits,
                show_progress,
            )
            .await
        }
    }
}

async fn serve(args: &ServeArgs) -> Result<()> {
    let mut builder = ServiceConfig::builder()
        .bind(args.bind)
        .limits(args.limits.to_limits())
        .transform_timeout(Duration::from_secs(args.timeout))
        .ghostscript_bin(&args.gs_bin)
        .soffice_bin(&args.soffice_bin);
    if let Some(ref dir) = args.scratch_dir {
        builder = builder.scratch_root(dir);
    }
    let config = builder.build().context("Invalid server configuration")?;

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind))?;

    eprintln!(
        "{} pdfdesk listening on {}",
        green("◆"),
        bold(&format!("http://{}", config.bind))
    );
    eprintln!(
        "   {}",
        dim(&format!(
            "scratch: {}  timeout: {}s",
            config.scratch_root().display(),
            config.transform_timeout.as_secs()
        ))
    );

    let service = Arc::new(DeskService::system(config));
    pdfdesk::serve(listener, service, shutdown_signal())
        .await
        .context("Server error")?;
    Ok(())
}

async fn run_single(
    cli: &Cli,
    operation: Operation,
    args: &SingleArgs,
    show_progress: bool,
) -> Result<()> {
    run_client(
        cli,
        operation,
        std::slice::from_ref(&args.input),
        args.output.as_ref(),
        &args.limits,
        show_progress,
    )
    .await
}

async fn run_client(
    cli: &Cli,
    operation: Operation,
    inputs: &[PathBuf],
    output: Option<&PathBuf>,
    limits: &LimitArgs,
    show_progress: bool,
) -> Result<()> {
    let client = DeskClient::new(&cli.server)
        .context("Failed to create client")?
        .with_limits(limits.to_limits());

    let progress: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn UploadProgressCallback>)
    } else {
        None
    };

    let start = Instant::now();
    let download = client
        .submit(operation, inputs, progress)
        .await
        .with_context(|| format!("{operation} request to {} failed", cli.server))?;

    let path = output
        .cloned()
        .unwrap_or_else(|| PathBuf::from(&download.filename));
    download
        .save(&path)
        .await
        .with_context(|| format!("Failed to save {}", path.display()))?;

    if !cli.quiet {
        eprintln!(
            "{}  {}  {} bytes  {}ms  →  {}",
            green("✔"),
            operation,
            download.bytes.len(),
            start.elapsed().as_millis(),
            bold(&path.display().to_string()),
        );
    }
    Ok(())
}
