//! # markdown-converter
//!
//! Convert Markdown documents to HTML, PDF, PNG and JPEG, and merge several
//! documents into one PDF report.
//!
//! ## Why this crate?
//!
//! Writing documentation in Markdown is pleasant until it has to be handed
//! over as a PDF with a header, a footer, a table of contents and the right
//! paper size. This crate resolves those settings from layered configuration
//! plus per-document front matter, renders the document once to HTML and lets
//! a headless browser produce every other format from that single rendering.
//!
//! ## Pipeline Overview
//!
//! ```text
//! Markdown
//!  │
//!  ├─ 1. Settings  config layers + front matter → ConversionSettings
//!  ├─ 2. Document  body / header / footer fragments with {{ attributes }}
//!  ├─ 3. Render    parser → anchors → TOC → emoji → asset URLs → page template
//!  ├─ 4. Formats   HTML written directly; PDF/PNG/JPEG via headless Chrome
//!  └─ 5. Output    destination pattern (${workspaceFolder}/${basename}.${extension})
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use markdown_converter::{
//!     load_source, CancellationToken, CollectedFiles, ConversionRunner, NoopProgress,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runner = ConversionRunner::builder().build();
//!     let source = load_source("README.md", None).await?;
//!     let files = CollectedFiles::new();
//!     let outcome = runner
//!         .execute(&source, &NoopProgress, &CancellationToken::new(), &files)
//!         .await?;
//!     for file in &outcome.files {
//!         println!("{} → {}", file.format, file.output_path.display());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `mdconv` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! markdown-converter = { version = "0.1", default-features = false }
//! ```
//!
//! ## Settings precedence
//!
//! Built-in defaults < global `config.toml` < workspace `.mdconv.toml` <
//! `MDCONV_*` environment variables < front matter of the document.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod cancel;
pub mod config;
pub mod convert;
pub mod destination;
pub mod document;
pub mod error;
pub mod front_matter;
pub mod host;
pub mod messages;
pub mod pipeline;
pub mod progress;
pub mod report;
pub mod settings;
pub mod task;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use cancel::CancellationToken;
pub use config::{ConfigurationSource, Loader, RawSettings, SettingsStore};
pub use convert::{ConversionRunner, ConversionRunnerBuilder, ConversionState, DocumentOutcome};
pub use destination::{DestinationContext, DestinationResolver};
pub use document::{Document, Renderable};
pub use error::{describe_error, ConvertError, FormatError, MergeError, ValidationError};
pub use front_matter::FrontMatter;
pub use host::{CollectedFiles, ConvertedFile, FileReporter, HeadlessHost, HostUi, IgnoreFiles, PromptSpec};
pub use pipeline::input::{load_source, SourceDocument};
pub use pipeline::merge::{LopdfMerger, PdfMerger};
pub use pipeline::parser::{ComrakParser, MarkdownParser, ParserSlot};
pub use pipeline::render::{ChromeBackend, PaperOptions, RenderBackend};
pub use progress::{NoopProgress, Progress, ProgressReporter};
pub use report::{ReportOutcome, ReportTask};
pub use settings::{ConversionSettings, OutputFormat, SettingsResolver};
pub use task::{BatchSummary, ConvertAllTask, DirectoryDocuments, DocumentList, DocumentProvider};
