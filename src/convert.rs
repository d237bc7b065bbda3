//! Conversion runner: one document, end to end.
//!
//! ```text
//! Pending ─▶ LoadingSettings ─▶ ParsingFrontMatter ─▶ BuildingDocument ─▶ Rendering
//!        ─▶ { PerFormatConversion(f) ─▶ WritingOutput(f) }* ─▶ Done
//! ```
//!
//! Any state can end in `Aborted` (cancellation) or `Failed` (fatal error).
//! The document is rendered once; each requested format is then emitted in
//! order. A failing format is reported and collected in
//! [`DocumentOutcome::failures`] while the remaining formats continue.

use crate::cancel::CancellationToken;
use crate::config::{RawSettings, SettingsStore};
use crate::destination::{DestinationContext, DestinationResolver};
use crate::document::{Document, Renderable};
use crate::error::{ConvertError, FormatError, ValidationError};
use crate::front_matter;
use crate::host::{ConvertedFile, FileReporter, HeadlessHost, HostUi};
use crate::pipeline::input::{load_template, SourceDocument};
use crate::pipeline::parser::{ComrakParser, MarkdownParser, ParserSlot};
use crate::pipeline::render::{ChromeBackend, PaperOptions, RenderBackend};
use crate::progress::ProgressReporter;
use crate::settings::{ConversionSettings, OutputFormat, SettingsResolver};
use chrono::NaiveDate;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Where a document's conversion currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionState {
    Pending,
    LoadingSettings,
    ParsingFrontMatter,
    BuildingDocument,
    Rendering,
    PerFormatConversion(OutputFormat),
    WritingOutput(OutputFormat),
    Done,
    Aborted,
    Failed,
}

impl ConversionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ConversionState::Done | ConversionState::Aborted | ConversionState::Failed
        )
    }
}

impl fmt::Display for ConversionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversionState::Pending => f.write_str("pending"),
            ConversionState::LoadingSettings => f.write_str("loading settings"),
            ConversionState::ParsingFrontMatter => f.write_str("parsing front matter"),
            ConversionState::BuildingDocument => f.write_str("building document"),
            ConversionState::Rendering => f.write_str("rendering"),
            ConversionState::PerFormatConversion(format) => write!(f, "converting to {format}"),
            ConversionState::WritingOutput(format) => write!(f, "writing {format}"),
            ConversionState::Done => f.write_str("done"),
            ConversionState::Aborted => f.write_str("aborted"),
            ConversionState::Failed => f.write_str("failed"),
        }
    }
}

/// Result of a conversion that did not fail fatally.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentOutcome {
    /// Source document name.
    pub document: String,
    /// [`ConversionState::Done`] or [`ConversionState::Aborted`].
    pub state: ConversionState,
    /// Artifacts written, in format order. Kept on abort (no rollback).
    pub files: Vec<ConvertedFile>,
    /// Formats that failed.
    pub failures: Vec<FormatError>,
}

impl DocumentOutcome {
    fn new(document: &str) -> Self {
        Self {
            document: document.to_string(),
            state: ConversionState::Pending,
            files: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.state == ConversionState::Aborted
    }

    /// Every requested format was written.
    pub fn is_success(&self) -> bool {
        self.state == ConversionState::Done && self.failures.is_empty()
    }

    /// The first written artifact of `format`.
    pub fn file(&self, format: OutputFormat) -> Option<&ConvertedFile> {
        self.files.iter().find(|f| f.format == format)
    }
}

/// Converts documents according to the configured settings.
///
/// Build with [`ConversionRunner::builder`]; every collaborator has a default.
pub struct ConversionRunner {
    settings: Arc<SettingsStore>,
    resolver: SettingsResolver,
    parser: Arc<dyn MarkdownParser>,
    host_parser: Option<Arc<ParserSlot>>,
    backend: Arc<dyn RenderBackend>,
    host: Arc<dyn HostUi>,
    today: Option<NaiveDate>,
}

impl ConversionRunner {
    pub fn builder() -> ConversionRunnerBuilder {
        ConversionRunnerBuilder::default()
    }

    pub fn host(&self) -> &Arc<dyn HostUi> {
        &self.host
    }

    pub fn settings_store(&self) -> &Arc<SettingsStore> {
        &self.settings
    }

    /// Settings of the configuration layers alone (no front matter).
    pub fn base_settings(&self) -> Result<ConversionSettings, ValidationError> {
        let raw = self.settings.current()?;
        self.resolver.resolve_raw(&raw)
    }

    /// Convert `source` into every configured format.
    ///
    /// Returns `Ok` for completed and aborted conversions (check
    /// [`DocumentOutcome::state`]) and `Err` for fatal failures.
    pub async fn execute(
        &self,
        source: &SourceDocument,
        progress: &dyn ProgressReporter,
        cancel: &CancellationToken,
        files: &dyn FileReporter,
    ) -> Result<DocumentOutcome, ConvertError> {
        self.execute_formats(source, None, progress, cancel, files)
            .await
    }

    /// Like [`execute`](Self::execute), optionally forcing the output formats.
    pub async fn execute_formats(
        &self,
        source: &SourceDocument,
        formats: Option<&[OutputFormat]>,
        progress: &dyn ProgressReporter,
        cancel: &CancellationToken,
        files: &dyn FileReporter,
    ) -> Result<DocumentOutcome, ConvertError> {
        info!("Starting conversion: {}", source.name());
        let mut outcome = DocumentOutcome::new(source.name());

        let result = self
            .run(source, formats, progress, cancel, files, &mut outcome)
            .await;

        match result {
            Ok(()) => {
                transition(&mut outcome, ConversionState::Done, progress);
                progress.on_document_complete(
                    source.name(),
                    outcome.files.len(),
                    outcome.failures.len(),
                );
                info!(
                    "Finished {}: {} file(s), {} failed format(s)",
                    source.name(),
                    outcome.files.len(),
                    outcome.failures.len()
                );
                Ok(outcome)
            }
            Err(ConvertError::Cancelled) => {
                info!("Conversion of {} cancelled", source.name());
                transition(&mut outcome, ConversionState::Aborted, progress);
                Ok(outcome)
            }
            Err(e) => {
                warn!("Conversion of {} failed: {}", source.name(), e);
                transition(&mut outcome, ConversionState::Failed, progress);
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        source: &SourceDocument,
        formats: Option<&[OutputFormat]>,
        progress: &dyn ProgressReporter,
        cancel: &CancellationToken,
        files: &dyn FileReporter,
        outcome: &mut DocumentOutcome,
    ) -> Result<(), ConvertError> {
        let name = source.name();

        // ── Step 1: Load configuration layers ───────────────────────────────
        transition(outcome, ConversionState::LoadingSettings, progress);
        progress.on_settings(name);
        let raw: Arc<RawSettings> = self.settings.current()?;
        cancel.check()?;

        // ── Step 2: Front matter + resolution ───────────────────────────────
        transition(outcome, ConversionState::ParsingFrontMatter, progress);
        let (front, body) = front_matter::split(source.text())?;
        let settings = self.resolver.resolve(&raw, &front)?;
        debug!(
            "Resolved settings for {}: formats {:?}, paper {}",
            name,
            settings.conversion_types,
            settings.paper.format.css_size()
        );

        // ── Step 3: Build the document ──────────────────────────────────────
        transition(outcome, ConversionState::BuildingDocument, progress);
        let parser = self.select_parser(&settings, cancel).await?;
        let document = self.build_document(source, body, &settings, parser).await?;
        cancel.check()?;

        // ── Step 4: Render once ─────────────────────────────────────────────
        transition(outcome, ConversionState::Rendering, progress);
        let html = cancel.run_until_cancelled(document.render()).await??;
        let paper_options = PaperOptions {
            paper: *document.paper(),
            header: document.render_header().await?,
            footer: document.render_footer().await?,
            quality: settings.quality,
        };

        // ── Step 5: Emit each format ────────────────────────────────────────
        let selected: Vec<OutputFormat> = match formats {
            Some(list) => list.to_vec(),
            None => settings.conversion_types.iter().copied().collect(),
        };
        let total = selected.len();
        let mut destinations = DestinationResolver::new(self.host.as_ref(), cancel.clone());

        for (index, format) in selected.into_iter().enumerate() {
            cancel.check()?;
            transition(outcome, ConversionState::PerFormatConversion(format), progress);
            progress.on_format_start(name, format, index + 1, total);

            let ctx = DestinationContext {
                source,
                format,
                attributes: document.attributes(),
            };
            let destination = destinations
                .resolve(&settings.destination_pattern, &ctx)
                .await?;

            let bytes = match format {
                OutputFormat::Html => html.clone().into_bytes(),
                _ => {
                    let rendered = cancel
                        .run_until_cancelled(self.backend.render_to_format(
                            &html,
                            format,
                            &paper_options,
                        ))
                        .await?;
                    match rendered {
                        Ok(bytes) => bytes,
                        Err(e) => {
                            record_failure(outcome, name, e, progress);
                            continue;
                        }
                    }
                }
            };

            transition(outcome, ConversionState::WritingOutput(format), progress);
            if let Err(e) = write_atomic(&destination, &bytes).await {
                let failure = FormatError::Write {
                    format,
                    path: destination.clone(),
                    detail: e.to_string(),
                };
                record_failure(outcome, name, failure, progress);
                continue;
            }

            let file = ConvertedFile {
                source_document: name.to_string(),
                output_path: destination,
                format,
            };
            info!("Wrote {} ({} bytes)", file.output_path.display(), bytes.len());
            files.file_converted(&file);
            progress.on_format_complete(&file);
            outcome.files.push(file);
        }

        Ok(())
    }

    /// The host parser when enabled and available, the bundled one otherwise.
    async fn select_parser(
        &self,
        settings: &ConversionSettings,
        cancel: &CancellationToken,
    ) -> Result<Arc<dyn MarkdownParser>, ConvertError> {
        if !settings.system_parser_enabled {
            return Ok(Arc::clone(&self.parser));
        }
        let Some(slot) = &self.host_parser else {
            warn!("System parser enabled but none is registered, using the bundled parser");
            return Ok(Arc::clone(&self.parser));
        };

        match slot.wait(cancel).await? {
            Some(parser) => {
                debug!("Using host parser '{}'", parser.name());
                Ok(parser)
            }
            None => {
                warn!("System parser unavailable, falling back to '{}'", self.parser.name());
                Ok(Arc::clone(&self.parser))
            }
        }
    }

    async fn build_document(
        &self,
        source: &SourceDocument,
        body: &str,
        settings: &ConversionSettings,
        parser: Arc<dyn MarkdownParser>,
    ) -> Result<Document, ConvertError> {
        let base = source.dir().or(source.workspace_root());
        let today = self
            .today
            .unwrap_or_else(|| chrono::Local::now().date_naive());

        let mut builder = Document::builder(settings, parser)
            .title(source.title())
            .default_attribute("title", source.title())
            .default_attribute("date", settings.date_format.format(today))
            .section(body);

        if settings.header_footer_enabled {
            builder = builder
                .header(load_template(&settings.header_template, base).await?)
                .footer(load_template(&settings.footer_template, base).await?);
        }
        if let Some(template) = &settings.template {
            let path = resolve_relative(template, base);
            let text = tokio::fs::read_to_string(&path)
                .await
                .map_err(|source| ConvertError::TemplateUnreadable { path, source })?;
            builder = builder.template(text);
        }
        if let Some(dir) = source.dir() {
            builder = builder.base_dir(dir);
        }

        Ok(builder.build())
    }
}

fn transition(outcome: &mut DocumentOutcome, state: ConversionState, progress: &dyn ProgressReporter) {
    debug!("{}: {} → {}", outcome.document, outcome.state, state);
    outcome.state = state;
    progress.on_state_change(&outcome.document, state);
}

fn record_failure(
    outcome: &mut DocumentOutcome,
    document: &str,
    error: FormatError,
    progress: &dyn ProgressReporter,
) {
    warn!("{}: {}", document, error);
    progress.on_format_error(document, &error);
    outcome.failures.push(error);
}

fn resolve_relative(path: &Path, base: Option<&Path>) -> PathBuf {
    match base {
        Some(base) if path.is_relative() => base.join(path),
        _ => path.to_path_buf(),
    }
}

/// Write `bytes` to `path` via a temporary sibling and a rename.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, bytes).await?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e);
    }
    Ok(())
}

// ── Builder ──────────────────────────────────────────────────────────────

/// Builder for [`ConversionRunner`].
#[derive(Default)]
pub struct ConversionRunnerBuilder {
    settings: Option<Arc<SettingsStore>>,
    resolver: Option<SettingsResolver>,
    parser: Option<Arc<dyn MarkdownParser>>,
    host_parser: Option<Arc<ParserSlot>>,
    backend: Option<Arc<dyn RenderBackend>>,
    host: Option<Arc<dyn HostUi>>,
    today: Option<NaiveDate>,
}

impl ConversionRunnerBuilder {
    /// Configuration layers. Defaults to no configuration at all.
    pub fn settings(mut self, store: Arc<SettingsStore>) -> Self {
        self.settings = Some(store);
        self
    }

    /// Defaults to [`SettingsResolver::from_env`].
    pub fn resolver(mut self, resolver: SettingsResolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Bundled parser. Defaults to [`ComrakParser`].
    pub fn parser(mut self, parser: Arc<dyn MarkdownParser>) -> Self {
        self.parser = Some(parser);
        self
    }

    /// Slot for a host-provided parser, used when `parser.system_parser_enabled`.
    pub fn host_parser(mut self, slot: Arc<ParserSlot>) -> Self {
        self.host_parser = Some(slot);
        self
    }

    /// Defaults to [`ChromeBackend`].
    pub fn backend(mut self, backend: Arc<dyn RenderBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Defaults to [`HeadlessHost`].
    pub fn host(mut self, host: Arc<dyn HostUi>) -> Self {
        self.host = Some(host);
        self
    }

    /// Fix the date used for the `date` attribute.
    pub fn today(mut self, date: NaiveDate) -> Self {
        self.today = Some(date);
        self
    }

    pub fn build(self) -> ConversionRunner {
        ConversionRunner {
            settings: self
                .settings
                .unwrap_or_else(|| Arc::new(SettingsStore::new(RawSettings::default()))),
            resolver: self.resolver.unwrap_or_else(SettingsResolver::from_env),
            parser: self.parser.unwrap_or_else(|| Arc::new(ComrakParser)),
            host_parser: self.host_parser,
            backend: self.backend.unwrap_or_else(|| Arc::new(ChromeBackend::new())),
            host: self.host.unwrap_or_else(|| Arc::new(HeadlessHost)),
            today: self.today,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::CollectedFiles;
    use async_trait::async_trait;
    use crate::progress::NoopProgress;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Writes a marker per format; fails for the listed formats.
    struct FakeBackend {
        fail: Vec<OutputFormat>,
    }

    #[async_trait]
    impl RenderBackend for FakeBackend {
        async fn render_to_format(
            &self,
            _html: &str,
            format: OutputFormat,
            _options: &PaperOptions,
        ) -> Result<Vec<u8>, FormatError> {
            if self.fail.contains(&format) {
                return Err(FormatError::Backend {
                    format,
                    detail: "boom".into(),
                });
            }
            Ok(format.as_str().as_bytes().to_vec())
        }
    }

    #[derive(Default)]
    struct States(Mutex<Vec<ConversionState>>);

    impl ProgressReporter for States {
        fn on_state_change(&self, _document: &str, state: ConversionState) {
            self.0.lock().unwrap().push(state);
        }
    }

    fn runner(toml: &str, fail: Vec<OutputFormat>) -> ConversionRunner {
        let raw = crate::config::Loader::new().with_toml(toml).build().unwrap();
        ConversionRunner::builder()
            .settings(Arc::new(SettingsStore::new(raw)))
            .resolver(SettingsResolver::with_locale("en"))
            .backend(Arc::new(FakeBackend { fail }))
            .today(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap())
            .build()
    }

    fn source(dir: &TempDir, text: &str) -> SourceDocument {
        let path = dir.path().join("notes.md");
        std::fs::write(&path, text).unwrap();
        SourceDocument::from_file(path, text).with_workspace(dir.path())
    }

    #[tokio::test]
    async fn writes_every_format_in_order() {
        let dir = TempDir::new().unwrap();
        let runner = runner(r#"conversion_type = ["PDF", "HTML"]"#, vec![]);
        let files = CollectedFiles::new();
        let states = States::default();

        let outcome = runner
            .execute(&source(&dir, "# Hi {{ date }}"), &states, &CancellationToken::new(), &files)
            .await
            .unwrap();

        assert!(outcome.is_success());
        let written: Vec<_> = files.files().into_iter().map(|f| f.format).collect();
        assert_eq!(written, vec![OutputFormat::Html, OutputFormat::Pdf]);

        let html = std::fs::read_to_string(dir.path().join("notes.html")).unwrap();
        assert!(html.contains("Hi 2024-03-01"), "{html}");
        assert_eq!(std::fs::read(dir.path().join("notes.pdf")).unwrap(), b"PDF");
        assert!(!dir.path().join("notes.pdf.tmp").exists());

        let states = states.0.into_inner().unwrap();
        assert_eq!(
            &states[..5],
            &[
                ConversionState::LoadingSettings,
                ConversionState::ParsingFrontMatter,
                ConversionState::BuildingDocument,
                ConversionState::Rendering,
                ConversionState::PerFormatConversion(OutputFormat::Html),
            ]
        );
        assert_eq!(states.last(), Some(&ConversionState::Done));
    }

    #[tokio::test]
    async fn failing_format_does_not_stop_others() {
        let dir = TempDir::new().unwrap();
        let runner = runner(r#"conversion_type = ["HTML", "PNG", "PDF"]"#, vec![OutputFormat::Png]);
        let outcome = runner
            .execute(&source(&dir, "text"), &NoopProgress, &CancellationToken::new(), &CollectedFiles::new())
            .await
            .unwrap();

        assert_eq!(outcome.state, ConversionState::Done);
        assert_eq!(outcome.files.len(), 2);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].format(), OutputFormat::Png);
        assert!(!outcome.is_success());
        assert!(outcome.file(OutputFormat::Pdf).is_some());
    }

    #[tokio::test]
    async fn front_matter_overrides_formats() {
        let dir = TempDir::new().unwrap();
        let runner = runner(r#"conversion_type = ["PDF"]"#, vec![]);
        let outcome = runner
            .execute(
                &source(&dir, "---\nconversion_type: HTML\n---\n# Body"),
                &NoopProgress,
                &CancellationToken::new(),
                &CollectedFiles::new(),
            )
            .await
            .unwrap();
        let formats: Vec<_> = outcome.files.iter().map(|f| f.format).collect();
        assert_eq!(formats, vec![OutputFormat::Html]);
    }

    #[tokio::test]
    async fn invalid_settings_fail_the_document() {
        let dir = TempDir::new().unwrap();
        let runner = runner("conversion_type = []", vec![]);
        let states = States::default();
        let err = runner
            .execute(&source(&dir, "x"), &states, &CancellationToken::new(), &CollectedFiles::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ConvertError::Validation(ValidationError::NoConversionTypes)));
        assert_eq!(states.0.lock().unwrap().last(), Some(&ConversionState::Failed));
    }

    #[tokio::test]
    async fn cancelled_before_start_is_aborted() {
        let dir = TempDir::new().unwrap();
        let runner = runner(r#"conversion_type = ["HTML"]"#, vec![]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let outcome = runner
            .execute(&source(&dir, "x"), &NoopProgress, &cancel, &CollectedFiles::new())
            .await
            .unwrap();
        assert!(outcome.is_aborted());
        assert!(outcome.files.is_empty());
        assert!(!dir.path().join("notes.html").exists());
    }

    #[tokio::test]
    async fn header_file_from_front_matter_is_loaded() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("header.html"), "<b>{{ title }}</b>").unwrap();
        let runner = runner(r#"conversion_type = ["HTML"]"#, vec![]);
        let src = source(&dir, "---\nHeaderTemplate: header.html\n---\nbody");
        let (front, body) = front_matter::split(src.text()).unwrap();
        let settings = runner
            .resolver
            .resolve(&runner.settings.current().unwrap(), &front)
            .unwrap();
        let doc = runner
            .build_document(&src, body, &settings, Arc::new(ComrakParser))
            .await
            .unwrap();
        assert_eq!(doc.render_header().await.unwrap().as_deref(), Some("<b>notes</b>"));
    }

    #[tokio::test]
    async fn atomic_write_creates_parents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a/b/c.txt");
        write_atomic(&path, b"hello").await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"hello");
    }

    #[test]
    fn state_display() {
        assert_eq!(
            ConversionState::PerFormatConversion(OutputFormat::Jpeg).to_string(),
            "converting to JPEG"
        );
        assert!(ConversionState::Aborted.is_terminal());
        assert!(!ConversionState::Rendering.is_terminal());
    }
}
