//! Integration tests for markdown-converter.
//!
//! Everything runs headlessly: the rendering backend, the PDF merger and the
//! host UI are in-test fakes, so no browser is needed. Output goes to
//! temporary directories.
//!
//! Run with:
//!   cargo test --test pipeline -- --nocapture

use async_trait::async_trait;
use chrono::NaiveDate;
use markdown_converter::report::MergerFactory;
use markdown_converter::{
    CancellationToken, CollectedFiles, ConfigurationSource, ConversionRunner, ConvertAllTask,
    ConvertError, DirectoryDocuments, DocumentList, FormatError, HostUi, Loader, MarkdownParser,
    MergeError, NoopProgress, OutputFormat, PaperOptions, ParserSlot, PdfMerger, PromptSpec,
    RawSettings, RenderBackend, ReportOutcome, ReportTask, SettingsResolver, SettingsStore,
    SourceDocument, ValidationError,
};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

// ── Test doubles ─────────────────────────────────────────────────────────────

/// Returns `"<FORMAT>:<paper>"` bytes, failing for the listed formats.
#[derive(Default)]
struct FakeBackend {
    fail: Vec<OutputFormat>,
    calls: Mutex<Vec<OutputFormat>>,
}

#[async_trait]
impl RenderBackend for FakeBackend {
    async fn render_to_format(
        &self,
        html: &str,
        format: OutputFormat,
        options: &PaperOptions,
    ) -> Result<Vec<u8>, FormatError> {
        self.calls.lock().unwrap().push(format);
        if self.fail.contains(&format) {
            return Err(FormatError::Backend {
                format,
                detail: "renderer crashed".into(),
            });
        }
        assert!(html.contains("<html"), "backend must receive the full page");
        Ok(format!("{}:{}", format, options.paper.format.css_size()).into_bytes())
    }
}

/// Answers prompts from a queue (then dismisses), records errors.
#[derive(Default)]
struct ScriptedHost {
    answers: Mutex<VecDeque<Option<String>>>,
    prompts: Mutex<Vec<String>>,
    errors: Mutex<Vec<String>>,
    cancel_on_prompt: Option<CancellationToken>,
}

impl ScriptedHost {
    fn answering(answers: &[Option<&str>]) -> Self {
        Self {
            answers: Mutex::new(answers.iter().map(|a| a.map(str::to_string)).collect()),
            ..Self::default()
        }
    }

    fn prompt_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl HostUi for ScriptedHost {
    async fn prompt(&self, spec: PromptSpec) -> Option<String> {
        self.prompts.lock().unwrap().push(spec.message);
        if let Some(cancel) = &self.cancel_on_prompt {
            cancel.cancel();
        }
        self.answers.lock().unwrap().pop_front().flatten()
    }

    fn show_error(&self, message: &str) {
        self.errors.lock().unwrap().push(message.to_string());
    }
}

/// Records merge inputs; writes the list of sources as the "merged" file.
#[derive(Default)]
struct RecordingMerges {
    sources: Mutex<Vec<PathBuf>>,
    saved: Mutex<Option<PathBuf>>,
}

struct FakeMerger {
    log: Arc<RecordingMerges>,
}

#[async_trait]
impl PdfMerger for FakeMerger {
    fn add_source(&mut self, path: &Path) -> Result<(), MergeError> {
        if !path.exists() {
            return Err(MergeError::SourceMissing(path.to_path_buf()));
        }
        self.log.sources.lock().unwrap().push(path.to_path_buf());
        Ok(())
    }

    async fn save(&mut self, output: &Path) -> Result<(), MergeError> {
        let listing = self
            .log
            .sources
            .lock()
            .unwrap()
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join("\n");
        std::fs::write(output, listing).map_err(|e| MergeError::Save {
            path: output.to_path_buf(),
            detail: e.to_string(),
        })?;
        *self.log.saved.lock().unwrap() = Some(output.to_path_buf());
        Ok(())
    }
}

fn merger_factory(log: &Arc<RecordingMerges>) -> MergerFactory {
    let log = Arc::clone(log);
    Arc::new(move || {
        Box::new(FakeMerger {
            log: Arc::clone(&log),
        }) as Box<dyn PdfMerger>
    })
}

/// Wraps every rendered body so the parser in use is visible.
struct MarkerParser;

#[async_trait]
impl MarkdownParser for MarkerParser {
    fn name(&self) -> &str {
        "marker"
    }

    async fn render(&self, markdown: &str) -> Result<String, ConvertError> {
        Ok(format!("<pre class=\"marker\">{}</pre>", markdown.trim()))
    }
}

/// Configuration whose TOML can be swapped between runs.
struct SwappableConfig(Arc<Mutex<String>>);

impl ConfigurationSource for SwappableConfig {
    fn load(&self) -> Result<RawSettings, ValidationError> {
        let text = self.0.lock().unwrap().clone();
        Loader::new().with_toml(&text).build()
    }
}

// ── Test helpers ─────────────────────────────────────────────────────────────

fn runner_with(
    toml: &str,
    backend: Arc<FakeBackend>,
    host: Arc<ScriptedHost>,
) -> ConversionRunner {
    let raw = Loader::new().with_toml(toml).build().unwrap();
    ConversionRunner::builder()
        .settings(Arc::new(SettingsStore::new(raw)))
        .resolver(SettingsResolver::with_locale("en-US"))
        .backend(backend)
        .host(host)
        .today(NaiveDate::from_ymd_opt(2024, 5, 17).unwrap())
        .build()
}

fn write_doc(dir: &Path, name: &str, text: &str) -> SourceDocument {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, text).unwrap();
    SourceDocument::from_file(path, text).with_workspace(dir)
}

// ── Conversion runner ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_full_html_page() {
    let dir = TempDir::new().unwrap();
    let runner = runner_with(
        r#"conversion_type = ["HTML"]
[parser.toc]
enabled = true
levels = "1-2"
"#,
        Arc::new(FakeBackend::default()),
        Arc::new(ScriptedHost::default()),
    );
    let source = write_doc(
        dir.path(),
        "guide.md",
        "---\nauthor: Dana\n---\n[[toc]]\n\n# Intro\n\nBy {{ author }} on {{ date }} :rocket:\n\n## Intro\n\n![logo](img/logo.png)\n",
    );

    let outcome = runner
        .execute(&source, &NoopProgress, &CancellationToken::new(), &CollectedFiles::new())
        .await
        .unwrap();
    assert!(outcome.is_success());

    let html = std::fs::read_to_string(dir.path().join("guide.html")).unwrap();
    assert!(html.contains("<title>guide</title>"), "{html}");
    assert!(html.contains(r#"lang="en-US""#), "{html}");
    assert!(html.contains("By Dana on 2024-05-17 "), "{html}");
    assert!(html.contains(r#"<h1 id="intro">Intro</h1>"#), "{html}");
    assert!(html.contains(r#"id="intro-2""#), "{html}");
    assert!(html.contains(r#"<div class="toc">"#), "{html}");
    assert!(html.contains(r#"<img class="emoji""#), "{html}");
    assert!(html.contains("file://"), "asset paths must be absolute: {html}");
}

#[tokio::test]
async fn test_formats_run_in_order_and_failures_are_collected() {
    let dir = TempDir::new().unwrap();
    let backend = Arc::new(FakeBackend {
        fail: vec![OutputFormat::Png],
        ..FakeBackend::default()
    });
    let runner = runner_with(
        r#"conversion_type = ["JPEG", "PNG", "PDF", "HTML"]
destination_pattern = "${workspaceFolder}/out/${basename}.${extension}"
[document.paper]
format = "Letter"
orientation = "Landscape"
"#,
        Arc::clone(&backend),
        Arc::new(ScriptedHost::default()),
    );
    let source = write_doc(dir.path(), "notes.md", "# Notes");
    let files = CollectedFiles::new();

    let outcome = runner
        .execute(&source, &NoopProgress, &CancellationToken::new(), &files)
        .await
        .unwrap();

    assert_eq!(
        *backend.calls.lock().unwrap(),
        vec![OutputFormat::Pdf, OutputFormat::Png, OutputFormat::Jpeg]
    );
    let written: Vec<_> = files.files().iter().map(|f| f.format).collect();
    assert_eq!(written, vec![OutputFormat::Html, OutputFormat::Pdf, OutputFormat::Jpeg]);
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].format(), OutputFormat::Png);

    let pdf = std::fs::read_to_string(dir.path().join("out/notes.pdf")).unwrap();
    assert_eq!(pdf, "PDF:Letter landscape");
    assert!(dir.path().join("out/notes.jpg").exists());
    assert!(!dir.path().join("out/notes.png").exists());
}

#[tokio::test]
async fn test_untitled_document_prompts_once_for_workspace() {
    let out = TempDir::new().unwrap();
    let host = Arc::new(ScriptedHost::answering(&[Some(
        out.path().to_str().unwrap(),
    )]));
    let runner = runner_with(
        r#"conversion_type = ["HTML", "PDF"]
destination_pattern = "${workspaceFolder}/${basename}/${workspaceFolder}.${extension}"
"#,
        Arc::new(FakeBackend::default()),
        Arc::clone(&host),
    );
    let source = SourceDocument::untitled("Untitled-1", "# Draft");

    let files = CollectedFiles::new();
    let outcome = runner
        .execute(&source, &NoopProgress, &CancellationToken::new(), &files)
        .await
        .unwrap();

    assert!(outcome.is_success());
    assert_eq!(host.prompt_count(), 1);
    for file in files.files() {
        assert!(file.output_path.starts_with(out.path()), "{:?}", file.output_path);
    }
}

#[tokio::test]
async fn test_dismissed_workspace_prompt_fails_document() {
    let host = Arc::new(ScriptedHost::answering(&[None]));
    let runner = runner_with(
        r#"conversion_type = ["HTML"]"#,
        Arc::new(FakeBackend::default()),
        Arc::clone(&host),
    );
    let err = runner
        .execute(
            &SourceDocument::untitled("Untitled-2", "text"),
            &NoopProgress,
            &CancellationToken::new(),
            &CollectedFiles::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ConvertError::DestinationUnresolved { .. }), "{err:?}");
}

#[tokio::test]
async fn test_settings_change_applies_to_next_conversion() {
    let dir = TempDir::new().unwrap();
    let toml = Arc::new(Mutex::new(r#"conversion_type = ["HTML"]"#.to_string()));
    let store = Arc::new(SettingsStore::new(SwappableConfig(Arc::clone(&toml))));
    let runner = ConversionRunner::builder()
        .settings(Arc::clone(&store))
        .resolver(SettingsResolver::with_locale("en"))
        .backend(Arc::new(FakeBackend::default()))
        .build();
    let source = write_doc(dir.path(), "a.md", "a");

    let first = runner
        .execute(&source, &NoopProgress, &CancellationToken::new(), &CollectedFiles::new())
        .await
        .unwrap();
    assert_eq!(first.files[0].format, OutputFormat::Html);

    *toml.lock().unwrap() = r#"conversion_type = ["PDF"]"#.to_string();
    let changes = store.subscribe();
    store.invalidate();
    assert!(changes.has_changed().unwrap());

    let second = runner
        .execute(&source, &NoopProgress, &CancellationToken::new(), &CollectedFiles::new())
        .await
        .unwrap();
    assert_eq!(second.files.len(), 1);
    assert_eq!(second.files[0].format, OutputFormat::Pdf);
}

#[tokio::test]
async fn test_system_parser_is_awaited_when_enabled() {
    let dir = TempDir::new().unwrap();
    let raw = Loader::new()
        .with_toml("conversion_type = [\"HTML\"]\n[parser]\nsystem_parser_enabled = true\n")
        .build()
        .unwrap();
    let slot = Arc::new(ParserSlot::new());
    let runner = ConversionRunner::builder()
        .settings(Arc::new(SettingsStore::new(raw)))
        .resolver(SettingsResolver::with_locale("en"))
        .host_parser(Arc::clone(&slot))
        .build();
    let source = write_doc(dir.path(), "sys.md", "*hello*");

    let provider = Arc::clone(&slot);
    tokio::spawn(async move {
        tokio::task::yield_now().await;
        provider.provide(Arc::new(MarkerParser));
    });

    runner
        .execute(&source, &NoopProgress, &CancellationToken::new(), &CollectedFiles::new())
        .await
        .unwrap();
    let html = std::fs::read_to_string(dir.path().join("sys.html")).unwrap();
    assert!(html.contains(r#"<pre class="marker">*hello*</pre>"#), "{html}");
}

#[tokio::test]
async fn test_unavailable_system_parser_falls_back() {
    let dir = TempDir::new().unwrap();
    let raw = Loader::new()
        .with_toml("conversion_type = [\"HTML\"]\n[parser]\nsystem_parser_enabled = true\n")
        .build()
        .unwrap();
    let slot = Arc::new(ParserSlot::new());
    slot.mark_unavailable();
    let runner = ConversionRunner::builder()
        .settings(Arc::new(SettingsStore::new(raw)))
        .resolver(SettingsResolver::with_locale("en"))
        .host_parser(slot)
        .build();
    let source = write_doc(dir.path(), "b.md", "*hello*");

    runner
        .execute(&source, &NoopProgress, &CancellationToken::new(), &CollectedFiles::new())
        .await
        .unwrap();
    let html = std::fs::read_to_string(dir.path().join("b.html")).unwrap();
    assert!(html.contains("<em>hello</em>"), "{html}");
}

// ── Batch task ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_batch_continues_after_a_failed_document() {
    let dir = TempDir::new().unwrap();
    let host = Arc::new(ScriptedHost::default());
    let runner = runner_with(
        r#"conversion_type = ["HTML"]"#,
        Arc::new(FakeBackend::default()),
        Arc::clone(&host),
    );
    let bad = write_doc(dir.path(), "bad.md", "---\nconversion_quality: 500\n---\nx");
    let good = write_doc(dir.path(), "good.md", "y");

    let summary = ConvertAllTask::new(&runner, DocumentList(vec![bad, good]))
        .execute(&NoopProgress, &CancellationToken::new(), &CollectedFiles::new())
        .await
        .unwrap();

    assert_eq!(summary.completed.len(), 1);
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].0, "bad.md");
    let errors = host.errors.lock().unwrap();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].starts_with("ValidationError:"), "{}", errors[0]);
    assert!(dir.path().join("good.html").exists());
}

#[tokio::test]
async fn test_batch_format_override() {
    let dir = TempDir::new().unwrap();
    write_doc(dir.path(), "one.md", "1");
    write_doc(dir.path(), "sub/two.md", "2");
    let runner = runner_with(
        r#"conversion_type = ["PDF"]"#,
        Arc::new(FakeBackend::default()),
        Arc::new(ScriptedHost::default()),
    );

    let files = CollectedFiles::new();
    let summary = ConvertAllTask::new(
        &runner,
        DirectoryDocuments::new(dir.path()).with_workspace(dir.path()),
    )
    .with_formats(vec![OutputFormat::Html])
    .execute(&NoopProgress, &CancellationToken::new(), &files)
    .await
    .unwrap();

    assert_eq!(summary.completed.len(), 2);
    assert!(files.files().iter().all(|f| f.format == OutputFormat::Html));
    assert!(dir.path().join("sub/two.html").exists());
}

// ── Report task ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_report_merges_title_page_first() {
    let dir = TempDir::new().unwrap();
    let docs = vec![
        write_doc(dir.path(), "Report-1.md", "# One"),
        write_doc(dir.path(), "notes.md", "ignored"),
        write_doc(dir.path(), "TitlePage.md", "# Title"),
    ];
    let host = Arc::new(ScriptedHost::answering(&[Some("  "), None, Some("Final")]));
    let runner = runner_with(
        r#"conversion_type = ["HTML"]"#,
        Arc::new(FakeBackend::default()),
        Arc::clone(&host),
    );
    let log = Arc::new(RecordingMerges::default());

    let files = CollectedFiles::new();
    let outcome = ReportTask::new(&runner, DocumentList(docs))
        .with_merger(merger_factory(&log))
        .execute(&NoopProgress, &CancellationToken::new(), &files)
        .await
        .unwrap();

    let output = dir.path().join("Final.pdf");
    assert_eq!(
        outcome,
        ReportOutcome::Merged {
            output: output.clone(),
            documents: 2
        }
    );
    assert_eq!(host.prompt_count(), 3);
    assert_eq!(
        *log.sources.lock().unwrap(),
        vec![dir.path().join("TitlePage.pdf"), dir.path().join("Report-1.pdf")]
    );
    assert!(output.exists());
    assert!(!dir.path().join("notes.pdf").exists());
    assert_eq!(files.files().last().map(|f| f.output_path.clone()), Some(output));
}

#[tokio::test]
async fn test_report_without_matches_succeeds_quietly() {
    let dir = TempDir::new().unwrap();
    let host = Arc::new(ScriptedHost::default());
    let runner = runner_with("", Arc::new(FakeBackend::default()), Arc::clone(&host));
    let log = Arc::new(RecordingMerges::default());

    let outcome = ReportTask::new(
        &runner,
        DocumentList(vec![write_doc(dir.path(), "readme.md", "x")]),
    )
    .with_merger(merger_factory(&log))
    .execute(&NoopProgress, &CancellationToken::new(), &CollectedFiles::new())
    .await
    .unwrap();

    assert_eq!(outcome, ReportOutcome::NoDocuments);
    assert_eq!(host.prompt_count(), 0);
    assert!(log.saved.lock().unwrap().is_none());
}

#[tokio::test]
async fn test_report_aborts_when_a_document_fails() {
    let dir = TempDir::new().unwrap();
    let docs = vec![
        write_doc(dir.path(), "TitlePage.md", "# Title"),
        write_doc(dir.path(), "Report.md", "# Body"),
    ];
    let backend = Arc::new(FakeBackend {
        fail: vec![OutputFormat::Pdf],
        ..FakeBackend::default()
    });
    let runner = runner_with("", Arc::clone(&backend), Arc::new(ScriptedHost::default()));
    let log = Arc::new(RecordingMerges::default());

    let err = ReportTask::new(&runner, DocumentList(docs))
        .with_output_name("Out")
        .with_merger(merger_factory(&log))
        .execute(&NoopProgress, &CancellationToken::new(), &CollectedFiles::new())
        .await
        .unwrap_err();

    match err {
        ConvertError::DocumentFailed { document, .. } => assert_eq!(document, "TitlePage.md"),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(backend.calls.lock().unwrap().len(), 1, "second document must not run");
    assert!(log.saved.lock().unwrap().is_none());
    assert!(!dir.path().join("Out.pdf").exists());
}

#[tokio::test]
async fn test_report_cancelled_while_prompting() {
    let dir = TempDir::new().unwrap();
    let cancel = CancellationToken::new();
    let host = Arc::new(ScriptedHost {
        cancel_on_prompt: Some(cancel.clone()),
        ..ScriptedHost::default()
    });
    let runner = runner_with("", Arc::new(FakeBackend::default()), host);
    let log = Arc::new(RecordingMerges::default());

    let outcome = ReportTask::new(
        &runner,
        DocumentList(vec![write_doc(dir.path(), "Report.md", "x")]),
    )
    .with_merger(merger_factory(&log))
    .execute(&NoopProgress, &cancel, &CollectedFiles::new())
    .await
    .unwrap();

    assert_eq!(outcome, ReportOutcome::Cancelled);
    assert!(log.sources.lock().unwrap().is_empty());
}
