//! Host capabilities the pipeline needs: prompts, error display, and the
//! sink that receives converted files.
//!
//! Everything interactive goes through [`HostUi`], so the whole pipeline can
//! run headlessly in tests or behind a CLI, an editor extension or a server.

use crate::settings::OutputFormat;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{debug, warn};

/// A cancelable text-input request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PromptSpec {
    pub message: String,
    pub placeholder: Option<String>,
    /// Pre-filled value.
    pub value: Option<String>,
}

impl PromptSpec {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = Some(placeholder.into());
        self
    }

    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }
}

/// Interactive surface of the host application.
#[async_trait]
pub trait HostUi: Send + Sync {
    /// Ask the user for text. `None` means the prompt was dismissed.
    async fn prompt(&self, spec: PromptSpec) -> Option<String>;

    /// Show a failure to the user.
    fn show_error(&self, message: &str) {
        let _ = message;
    }
}

/// A host that dismisses every prompt; for unattended runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeadlessHost;

#[async_trait]
impl HostUi for HeadlessHost {
    async fn prompt(&self, spec: PromptSpec) -> Option<String> {
        debug!("Dismissing prompt in headless mode: {}", spec.message);
        None
    }

    fn show_error(&self, message: &str) {
        warn!("{}", message);
    }
}

/// One artifact written by a conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertedFile {
    /// Name of the source document.
    pub source_document: String,
    pub output_path: PathBuf,
    pub format: OutputFormat,
}

/// Receives every successfully written artifact, in emission order.
pub trait FileReporter: Send + Sync {
    fn file_converted(&self, file: &ConvertedFile);
}

/// Keeps every reported file; used by the report task to collect merge inputs.
#[derive(Debug, Default)]
pub struct CollectedFiles {
    files: Mutex<Vec<ConvertedFile>>,
}

impl CollectedFiles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the files reported so far.
    pub fn files(&self) -> Vec<ConvertedFile> {
        match self.files.lock() {
            Ok(files) => files.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl FileReporter for CollectedFiles {
    fn file_converted(&self, file: &ConvertedFile) {
        match self.files.lock() {
            Ok(mut files) => files.push(file.clone()),
            Err(poisoned) => poisoned.into_inner().push(file.clone()),
        }
    }
}

/// Discards reported files.
#[derive(Debug, Default, Clone, Copy)]
pub struct IgnoreFiles;

impl FileReporter for IgnoreFiles {
    fn file_converted(&self, _file: &ConvertedFile) {}
}
