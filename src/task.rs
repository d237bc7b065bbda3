//! Document discovery and the batch conversion task.
//!
//! A [`DocumentProvider`] yields the candidate documents of a run (the files
//! of a directory, an explicit list, editor buffers). [`ConvertAllTask`]
//! converts each of them independently: one document failing is shown to the
//! user and the batch moves on to the next.

use crate::cancel::CancellationToken;
use crate::convert::{ConversionRunner, DocumentOutcome};
use crate::error::{describe_error, ConvertError};
use crate::host::FileReporter;
use crate::pipeline::input::{is_markdown_path, load_source, SourceDocument};
use crate::progress::ProgressReporter;
use crate::settings::OutputFormat;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Supplies the candidate documents of a task.
#[async_trait]
pub trait DocumentProvider: Send + Sync {
    async fn documents(&self) -> Result<Vec<SourceDocument>, ConvertError>;
}

/// A fixed, already loaded set of documents.
#[derive(Debug, Clone, Default)]
pub struct DocumentList(pub Vec<SourceDocument>);

#[async_trait]
impl DocumentProvider for DocumentList {
    async fn documents(&self) -> Result<Vec<SourceDocument>, ConvertError> {
        Ok(self.0.clone())
    }
}

/// Every Markdown file below a directory, sorted by path.
#[derive(Debug, Clone)]
pub struct DirectoryDocuments {
    root: PathBuf,
    workspace: Option<PathBuf>,
}

impl DirectoryDocuments {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            workspace: None,
        }
    }

    /// Treat `workspace` as the workspace of every discovered document.
    pub fn with_workspace(mut self, workspace: impl Into<PathBuf>) -> Self {
        self.workspace = Some(workspace.into());
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl DocumentProvider for DirectoryDocuments {
    async fn documents(&self) -> Result<Vec<SourceDocument>, ConvertError> {
        let root = self.root.clone();
        let paths = tokio::task::spawn_blocking(move || markdown_files(&root))
            .await
            .map_err(|e| ConvertError::Internal(format!("discovery task panicked: {e}")))??;
        debug!("Discovered {} Markdown file(s) under {}", paths.len(), self.root.display());

        let mut documents = Vec::with_capacity(paths.len());
        for path in paths {
            documents.push(load_source(&path, self.workspace.as_deref()).await?);
        }
        Ok(documents)
    }
}

fn markdown_files(root: &Path) -> Result<Vec<PathBuf>, ConvertError> {
    let mut paths = Vec::new();
    for entry in WalkDir::new(root).follow_links(true) {
        let entry = entry.map_err(|e| ConvertError::SourceUnreadable {
            path: e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf()),
            source: e
                .into_io_error()
                .unwrap_or_else(|| std::io::Error::other("filesystem loop")),
        })?;
        if entry.file_type().is_file() && is_markdown_path(entry.path()) {
            paths.push(entry.into_path());
        }
    }
    paths.sort();
    Ok(paths)
}

/// Summary of a batch run.
#[derive(Debug, Default)]
pub struct BatchSummary {
    /// Documents that reached `Done`, including those with failed formats.
    pub completed: Vec<DocumentOutcome>,
    /// Documents that failed fatally, with the message shown to the user.
    pub failed: Vec<(String, String)>,
    /// The run was cancelled before every document was attempted.
    pub cancelled: bool,
}

/// Converts every document of a provider, one at a time.
pub struct ConvertAllTask<'r, P> {
    runner: &'r ConversionRunner,
    provider: P,
    formats: Option<Vec<OutputFormat>>,
}

impl<'r, P: DocumentProvider> ConvertAllTask<'r, P> {
    pub fn new(runner: &'r ConversionRunner, provider: P) -> Self {
        Self {
            runner,
            provider,
            formats: None,
        }
    }

    /// Emit `formats` instead of each document's `conversion_type`.
    pub fn with_formats(mut self, formats: Vec<OutputFormat>) -> Self {
        self.formats = Some(formats).filter(|f| !f.is_empty());
        self
    }

    pub async fn execute(
        &self,
        progress: &dyn ProgressReporter,
        cancel: &CancellationToken,
        files: &dyn FileReporter,
    ) -> Result<BatchSummary, ConvertError> {
        progress.on_search_start();
        let documents = cancel.run_until_cancelled(self.provider.documents()).await??;
        progress.on_documents_found(documents.len());

        let mut summary = BatchSummary::default();
        for document in &documents {
            if cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }

            let result = self
                .runner
                .execute_formats(document, self.formats.as_deref(), progress, cancel, files)
                .await;
            match result {
                Ok(outcome) if outcome.is_aborted() => {
                    summary.cancelled = true;
                    break;
                }
                Ok(outcome) => summary.completed.push(outcome),
                Err(e) => {
                    let message = describe_error(&e);
                    warn!("{}: {}", document.name(), message);
                    self.runner.host().show_error(&message);
                    summary.failed.push((document.name().to_string(), message));
                }
            }
        }

        info!(
            "Batch finished: {} completed, {} failed{}",
            summary.completed.len(),
            summary.failed.len(),
            if summary.cancelled { ", cancelled" } else { "" }
        );
        Ok(summary)
    }
}
