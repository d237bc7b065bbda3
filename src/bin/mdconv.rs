//! CLI binary for markdown-converter.
//!
//! A thin shim over the library crate: maps flags onto configuration
//! overrides, wires a terminal host (stdin prompts, coloured errors) and an
//! indicatif progress display, then runs the batch or report task.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use config::ValueKind;
use markdown_converter::pipeline::input::find_workspace_root;
use markdown_converter::{
    load_source, CancellationToken, ConversionRunner, ConversionState, ConvertAllTask,
    ConvertedFile, DirectoryDocuments, DocumentList, DocumentProvider, FileReporter, FormatError, HostUi, IgnoreFiles,
    Loader, OutputFormat, ProgressReporter, PromptSpec, ReportOutcome, ReportTask, SettingsStore,
    SourceDocument,
};
use std::io::{self, BufRead, Read, Write};
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

/// Print above the spinner, or straight to stderr when it is hidden.
fn print_line(bar: &ProgressBar, line: String) {
    if bar.is_hidden() {
        eprintln!("{line}");
    } else {
        bar.println(line);
    }
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress reporter using indicatif ────────────────────────────────────

/// Spinner with one log line per written artifact or failed format.
struct CliProgress {
    bar: ProgressBar,
    errors: AtomicUsize,
}

impl CliProgress {
    fn new(enabled: bool) -> Arc<Self> {
        let bar = if enabled {
            let bar = ProgressBar::new_spinner();
            bar.set_style(
                ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner())
                    .tick_strings(TICKS),
            );
            bar.set_prefix("mdconv");
            bar.enable_steady_tick(Duration::from_millis(80));
            bar
        } else {
            ProgressBar::hidden()
        };
        Arc::new(Self {
            bar,
            errors: AtomicUsize::new(0),
        })
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProgressReporter for CliProgress {
    fn report(&self, message: &str) {
        self.bar.set_message(message.to_string());
    }

    fn on_state_change(&self, document: &str, state: ConversionState) {
        if !state.is_terminal() {
            self.bar.set_prefix(document.to_string());
        }
    }

    fn on_format_complete(&self, file: &ConvertedFile) {
        print_line(&self.bar, format!(
            "  {} {:<5} {}",
            green("✓"),
            file.format,
            dim(&file.output_path.display().to_string())
        ));
    }

    fn on_format_error(&self, document: &str, error: &FormatError) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        print_line(&self.bar, format!(
            "  {} {:<5} {}  {}",
            red("✗"),
            error.format(),
            document,
            red(&error.to_string())
        ));
    }
}

// ── Terminal host: prompts on stdin, errors on stderr ────────────────────────

struct TerminalHost {
    bar: ProgressBar,
}

#[async_trait]
impl HostUi for TerminalHost {
    async fn prompt(&self, spec: PromptSpec) -> Option<String> {
        let bar = self.bar.clone();
        tokio::task::spawn_blocking(move || {
            bar.suspend(|| {
                let hint = spec
                    .placeholder
                    .as_deref()
                    .map(|p| format!(" {}", dim(&format!("[{p}]"))))
                    .unwrap_or_default();
                eprint!("{} {}{}: ", cyan("?"), bold(&spec.message), hint);
                io::stderr().flush().ok();

                let mut line = String::new();
                match io::stdin().lock().read_line(&mut line) {
                    Ok(0) | Err(_) => None,
                    Ok(_) => {
                        let answer = line.trim();
                        if answer.is_empty() {
                            spec.value.clone()
                        } else {
                            Some(answer.to_string())
                        }
                    }
                }
            })
        })
        .await
        .ok()
        .flatten()
    }

    fn show_error(&self, message: &str) {
        print_line(&self.bar, format!("{} {}", red("✘"), message));
    }
}

/// Lists written paths on stdout; used with `--quiet`.
struct PrintFiles;

impl FileReporter for PrintFiles {
    fn file_converted(&self, file: &ConvertedFile) {
        println!("{}", file.output_path.display());
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert with the configured formats (PDF by default)
  mdconv convert README.md

  # Several formats, custom destination
  mdconv convert docs/*.md --format html --format pdf \
      --destination '${workspaceFolder}/out/${basename}.${extension}'

  # Override settings for this run
  mdconv convert notes.md --set document.paper.format=Letter --set parser.toc.enabled=true

  # Convert Markdown piped on stdin (needs --workspace for the output folder)
  cat notes.md | mdconv convert - --workspace .

  # Merge TitlePage*.md and Report*.md of a folder into one PDF
  mdconv report docs/ --name Handbook

CONFIGURATION (lowest to highest precedence):
  <config dir>/mdconv/config.toml     global settings
  <workspace>/.mdconv.toml            workspace settings
  MDCONV_<KEY>, MDCONV_<A>__<B>       environment, e.g. MDCONV_DOCUMENT__PAPER__FORMAT=A5
  --set key=value                     command line
  YAML front matter                   per document

ENVIRONMENT VARIABLES:
  MDCONV_CHROME_BIN   Path to Chrome/Chromium used for PDF, PNG and JPEG
  RUST_LOG            Log filter (overrides --verbose)
"#;

/// Convert Markdown documents to HTML, PDF and images.
#[derive(Parser, Debug)]
#[command(
    name = "mdconv",
    version,
    about = "Convert Markdown documents to HTML, PDF, PNG and JPEG",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Workspace folder (default: detected from `.mdconv.toml` or `.git`).
    #[arg(short, long, global = true, env = "MDCONV_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Override a setting, e.g. `document.paper.format=A5` (repeatable).
    #[arg(long = "set", value_name = "KEY=VALUE", global = true)]
    overrides: Vec<String>,

    /// Disable the progress spinner.
    #[arg(long, global = true, env = "MDCONV_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "MDCONV_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors and written paths.
    #[arg(short, long, global = true, env = "MDCONV_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert documents with their resolved settings.
    Convert {
        /// Markdown files or directories; `-` reads one document from stdin.
        #[arg(required = true)]
        inputs: Vec<String>,

        /// Output format (repeatable). Default: `conversion_type` setting.
        #[arg(short, long, value_enum)]
        format: Vec<FormatArg>,

        /// Destination pattern, e.g. `${dirname}/${basename}.${extension}`.
        #[arg(short, long)]
        destination: Option<String>,
    },
    /// Merge the title page and report documents of a folder into one PDF.
    Report {
        /// Folder searched for report documents.
        dir: PathBuf,

        /// Report file name (prompted when omitted).
        #[arg(short, long)]
        name: Option<String>,
    },
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum FormatArg {
    Html,
    Pdf,
    Png,
    Jpeg,
}

impl From<FormatArg> for OutputFormat {
    fn from(v: FormatArg) -> Self {
        match v {
            FormatArg::Html => OutputFormat::Html,
            FormatArg::Pdf => OutputFormat::Pdf,
            FormatArg::Png => OutputFormat::Png,
            FormatArg::Jpeg => OutputFormat::Jpeg,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner gives the feedback; library logs only show errors unless asked.
    let show_progress = !cli.quiet && !cli.no_progress;
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

    // ── Cancellation on Ctrl-C ───────────────────────────────────────────
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    let progress = CliProgress::new(show_progress);
    let host = Arc::new(TerminalHost {
        bar: progress.bar.clone(),
    });

    let result = match &cli.command {
        Command::Convert {
            inputs,
            format,
            destination,
        } => {
            let formats: Vec<OutputFormat> = format.iter().copied().map(Into::into).collect();
            run_convert(&cli, inputs, &formats, destination.as_deref(), host, &progress, &cancel)
                .await
        }
        Command::Report { dir, name } => {
            run_report(&cli, dir, name.as_deref(), host, &progress, &cancel).await
        }
    };
    progress.finish();
    result
}

fn build_runner(
    cli: &Cli,
    workspace: Option<&std::path::Path>,
    destination: Option<&str>,
    host: Arc<TerminalHost>,
) -> Result<ConversionRunner> {
    let mut loader = Loader::standard(workspace);
    for entry in &cli.overrides {
        let (key, value) = entry
            .split_once('=')
            .with_context(|| format!("Invalid --set '{entry}', expected KEY=VALUE"))?;
        loader = loader
            .set_override(key.trim(), parse_value(value.trim()))
            .with_context(|| format!("Invalid --set '{entry}'"))?;
    }
    if let Some(pattern) = destination {
        loader = loader
            .set_override("destination_pattern", pattern.to_string())
            .context("Invalid --destination")?;
    }

    Ok(ConversionRunner::builder()
        .settings(Arc::new(SettingsStore::new(loader)))
        .host(host)
        .build())
}

/// `true`/`false` and integers keep their type; everything else is a string.
fn parse_value(value: &str) -> ValueKind {
    if let Ok(b) = value.parse::<bool>() {
        ValueKind::Boolean(b)
    } else if let Ok(i) = value.parse::<i64>() {
        ValueKind::I64(i)
    } else {
        ValueKind::String(value.to_string())
    }
}

/// `--workspace` made absolute, so relative destinations resolve from it.
async fn canonical_workspace(cli: &Cli) -> Result<Option<PathBuf>> {
    match &cli.workspace {
        Some(dir) => Ok(Some(tokio::fs::canonicalize(dir).await.with_context(|| {
            format!("Workspace folder {} not found", dir.display())
        })?)),
        None => Ok(None),
    }
}

async fn run_convert(
    cli: &Cli,
    inputs: &[String],
    formats: &[OutputFormat],
    destination: Option<&str>,
    host: Arc<TerminalHost>,
    progress: &CliProgress,
    cancel: &CancellationToken,
) -> Result<()> {
    let workspace = canonical_workspace(cli).await?;
    let workspace = workspace.as_deref();
    let config_root = workspace.map(PathBuf::from).or_else(|| {
        std::env::current_dir()
            .ok()
            .and_then(|cwd| find_workspace_root(&cwd))
    });
    let runner = build_runner(cli, config_root.as_deref(), destination, host)?;

    let mut documents = Vec::new();
    for input in inputs {
        if input == "-" {
            let mut text = String::new();
            io::stdin()
                .read_to_string(&mut text)
                .context("Failed to read Markdown from stdin")?;
            let doc = SourceDocument::untitled("Untitled-1", text);
            documents.push(match workspace {
                Some(root) => doc.with_workspace(root),
                None => doc,
            });
            continue;
        }

        let path = PathBuf::from(input);
        if path.is_dir() {
            let mut provider = DirectoryDocuments::new(&path);
            if let Some(root) = workspace {
                provider = provider.with_workspace(root);
            }
            documents.extend(
                provider
                    .documents()
                    .await
                    .with_context(|| format!("Failed to scan {}", path.display()))?,
            );
        } else {
            documents.push(
                load_source(&path, workspace)
                    .await
                    .with_context(|| format!("Failed to load {}", path.display()))?,
            );
        }
    }

    let files: &dyn FileReporter = if cli.quiet { &PrintFiles } else { &IgnoreFiles };
    let summary = ConvertAllTask::new(&runner, DocumentList(documents))
        .with_formats(formats.to_vec())
        .execute(progress, cancel, files)
        .await?;

    let written: usize = summary.completed.iter().map(|o| o.files.len()).sum();
    let format_errors = progress.errors.load(Ordering::SeqCst);
    if !cli.quiet {
        progress.bar.suspend(|| {
            eprintln!(
                "{} {} file(s) written from {} document(s){}{}",
                if summary.failed.is_empty() && format_errors == 0 {
                    green("✔")
                } else {
                    cyan("⚠")
                },
                bold(&written.to_string()),
                summary.completed.len(),
                if format_errors > 0 {
                    red(&format!(", {format_errors} format(s) failed"))
                } else {
                    String::new()
                },
                if summary.cancelled {
                    dim(" (cancelled)")
                } else {
                    String::new()
                },
            );
        });
    }

    if !summary.failed.is_empty() || format_errors > 0 {
        bail!(
            "{} document(s) failed, {} format(s) failed",
            summary.failed.len(),
            format_errors
        );
    }
    Ok(())
}

async fn run_report(
    cli: &Cli,
    dir: &std::path::Path,
    name: Option<&str>,
    host: Arc<TerminalHost>,
    progress: &CliProgress,
    cancel: &CancellationToken,
) -> Result<()> {
    let dir = tokio::fs::canonicalize(dir)
        .await
        .with_context(|| format!("Report folder {} not found", dir.display()))?;
    let workspace = canonical_workspace(cli)
        .await?
        .or_else(|| find_workspace_root(&dir))
        .unwrap_or_else(|| dir.clone());

    let runner = build_runner(cli, Some(&workspace), None, host)?;
    let mut task = ReportTask::new(
        &runner,
        DirectoryDocuments::new(&dir).with_workspace(&workspace),
    );
    if let Some(name) = name {
        task = task.with_output_name(name);
    }

    let files: &dyn FileReporter = if cli.quiet { &PrintFiles } else { &IgnoreFiles };
    let outcome = task
        .execute(progress, cancel, files)
        .await
        .context("Report failed")?;

    if !cli.quiet {
        progress.bar.suspend(|| match &outcome {
            ReportOutcome::NoDocuments => eprintln!("{} No report documents found", cyan("⚠")),
            ReportOutcome::Merged { output, documents } => eprintln!(
                "{} {} document(s) merged  →  {}",
                green("✔"),
                documents,
                bold(&output.display().to_string())
            ),
            ReportOutcome::Cancelled => eprintln!("{} Report cancelled", cyan("⚠")),
        });
    }
    Ok(())
}
