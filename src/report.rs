//! Report task: convert the title page and body documents to PDF, in order,
//! and merge them into a single file.
//!
//! Unlike the batch task, a report is all-or-nothing: the first document that
//! fails (fatally or in its PDF format) abandons the report before anything
//! is merged. Documents are converted strictly one after another so the
//! merge order is the conversion order.

use crate::cancel::CancellationToken;
use crate::convert::ConversionRunner;
use crate::error::ConvertError;
use crate::host::{ConvertedFile, FileReporter, PromptSpec};
use crate::messages;
use crate::pipeline::input::SourceDocument;
use crate::pipeline::merge::{LopdfMerger, PdfMerger};
use crate::progress::ProgressReporter;
use crate::settings::{OutputFormat, ReportSettings};
use crate::task::DocumentProvider;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Creates a fresh merger for each report run.
pub type MergerFactory = Arc<dyn Fn() -> Box<dyn PdfMerger> + Send + Sync>;

/// How a report run ended without error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportOutcome {
    /// No discovered document is a title page or report body.
    NoDocuments,
    /// The merged report was written.
    Merged { output: PathBuf, documents: usize },
    /// The cancellation token fired; nothing was merged.
    Cancelled,
}

/// Builds one merged PDF report from the matching documents of a provider.
pub struct ReportTask<'r, P> {
    runner: &'r ConversionRunner,
    provider: P,
    merger: MergerFactory,
    output_name: Option<String>,
}

impl<'r, P: DocumentProvider> ReportTask<'r, P> {
    pub fn new(runner: &'r ConversionRunner, provider: P) -> Self {
        Self {
            runner,
            provider,
            merger: Arc::new(|| Box::new(LopdfMerger::new()) as Box<dyn PdfMerger>),
            output_name: None,
        }
    }

    pub fn with_merger(mut self, factory: MergerFactory) -> Self {
        self.merger = factory;
        self
    }

    /// Use `name` instead of prompting for the report file name.
    pub fn with_output_name(mut self, name: impl Into<String>) -> Self {
        self.output_name = Some(name.into());
        self
    }

    pub async fn execute(
        &self,
        progress: &dyn ProgressReporter,
        cancel: &CancellationToken,
        files: &dyn FileReporter,
    ) -> Result<ReportOutcome, ConvertError> {
        match self.run(progress, cancel, files).await {
            Err(ConvertError::Cancelled) => {
                info!("{}", messages::CANCELLED);
                Ok(ReportOutcome::Cancelled)
            }
            other => other,
        }
    }

    async fn run(
        &self,
        progress: &dyn ProgressReporter,
        cancel: &CancellationToken,
        files: &dyn FileReporter,
    ) -> Result<ReportOutcome, ConvertError> {
        // ── Step 1: Discover and select ─────────────────────────────────────
        progress.on_search_start();
        let candidates = cancel.run_until_cancelled(self.provider.documents()).await??;
        let settings = self.runner.base_settings()?;
        let documents = select_report_documents(candidates, &settings.report);
        progress.on_documents_found(documents.len());
        if documents.is_empty() {
            info!("No report documents found, nothing to merge");
            return Ok(ReportOutcome::NoDocuments);
        }

        // ── Step 2: Output location ─────────────────────────────────────────
        let name = match &self.output_name {
            Some(name) if !name.trim().is_empty() => name.trim().to_string(),
            _ => self.prompt_output_name(cancel).await?,
        };
        let output = output_path(&documents[0], &name);
        debug!("Report output: {}", output.display());

        // ── Step 3: Convert each document to PDF, in order ──────────────────
        let mut merger = (self.merger)();
        for document in &documents {
            cancel.check()?;
            let outcome = self
                .runner
                .execute_formats(document, Some(&[OutputFormat::Pdf][..]), progress, cancel, files)
                .await
                .map_err(|e| failed(document, e.to_string()))?;

            if outcome.is_aborted() {
                return Err(ConvertError::Cancelled);
            }
            if let Some(failure) = outcome.failures.first() {
                return Err(failed(document, failure.to_string()));
            }
            let pdf = outcome
                .file(OutputFormat::Pdf)
                .ok_or_else(|| failed(document, "no PDF was produced".to_string()))?;
            merger.add_source(&pdf.output_path)?;
        }

        // ── Step 4: Merge ───────────────────────────────────────────────────
        cancel.check()?;
        progress.report(&messages::merging(documents.len(), &output));
        cancel.run_until_cancelled(merger.save(&output)).await??;

        let report = ConvertedFile {
            source_document: name,
            output_path: output.clone(),
            format: OutputFormat::Pdf,
        };
        files.file_converted(&report);
        progress.report(&messages::report_complete(&output));
        info!("Report with {} document(s) written to {}", documents.len(), output.display());

        Ok(ReportOutcome::Merged {
            output,
            documents: documents.len(),
        })
    }

    /// Ask until a non-empty name is given. Only cancellation ends the loop.
    async fn prompt_output_name(&self, cancel: &CancellationToken) -> Result<String, ConvertError> {
        let spec = PromptSpec::new(messages::REPORT_NAME_PROMPT)
            .placeholder(messages::REPORT_NAME_PLACEHOLDER);
        loop {
            cancel.check()?;
            let answer = cancel
                .run_until_cancelled(self.runner.host().prompt(spec.clone()))
                .await?;
            match answer.as_deref().map(str::trim) {
                Some(name) if !name.is_empty() => return Ok(name.to_string()),
                _ => {
                    warn!("Report name is required");
                    tokio::task::yield_now().await;
                }
            }
        }
    }
}

fn failed(document: &SourceDocument, reason: String) -> ConvertError {
    ConvertError::DocumentFailed {
        document: document.name().to_string(),
        reason,
    }
}

fn matches_fragment(document: &SourceDocument, fragment: &str) -> bool {
    !fragment.is_empty()
        && document
            .name()
            .to_lowercase()
            .contains(&fragment.to_lowercase())
}

/// Keep title pages and report bodies; title pages first, otherwise in
/// discovery order.
pub fn select_report_documents(
    documents: Vec<SourceDocument>,
    report: &ReportSettings,
) -> Vec<SourceDocument> {
    let mut selected: Vec<SourceDocument> = documents
        .into_iter()
        .filter(|d| matches_fragment(d, &report.title_page) || matches_fragment(d, &report.body))
        .collect();
    selected.sort_by_key(|d| !matches_fragment(d, &report.title_page));
    selected
}

/// `name` inside the first document's folder, with `.pdf` added when the
/// name has no extension.
fn output_path(first: &SourceDocument, name: &str) -> PathBuf {
    let mut file = PathBuf::from(name);
    if file.extension().is_none() {
        file.set_extension(OutputFormat::Pdf.extension());
    }
    if file.is_absolute() {
        return file;
    }
    let dir = first
        .dir()
        .or(first.workspace_root())
        .map(Path::to_path_buf)
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_default();
    dir.join(file)
}
