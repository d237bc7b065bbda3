//! Progress reporting for conversions and tasks.
//!
//! Pass any [`ProgressReporter`] to [`crate::convert::ConversionRunner::execute`]
//! or to the tasks to receive events as documents are discovered, settings
//! are resolved and each output format is produced.
//!
//! Every event has a default implementation that formats a status line from
//! [`crate::messages`] and forwards it to [`ProgressReporter::report`], so a
//! host that only shows text overrides `report` alone; richer hosts (such as
//! the CLI progress bar) override the structured events they care about.
//!
//! # Example
//!
//! ```rust
//! use markdown_converter::ProgressReporter;
//! use std::sync::Mutex;
//!
//! #[derive(Default)]
//! struct Log(Mutex<Vec<String>>);
//!
//! impl ProgressReporter for Log {
//!     fn report(&self, message: &str) {
//!         self.0.lock().unwrap().push(message.to_string());
//!     }
//! }
//!
//! let log = Log::default();
//! log.on_documents_found(2);
//! assert_eq!(log.0.lock().unwrap()[0], "Found 2 documents");
//! ```

use crate::convert::ConversionState;
use crate::error::FormatError;
use crate::host::ConvertedFile;
use crate::messages;
use crate::settings::OutputFormat;
use std::sync::Arc;

/// Receives progress events. All methods have defaults.
pub trait ProgressReporter: Send + Sync {
    /// A human-readable status line.
    fn report(&self, message: &str) {
        let _ = message;
    }

    /// Document discovery started.
    fn on_search_start(&self) {
        self.report(messages::SEARCHING_DOCUMENTS);
    }

    /// Discovery finished with `count` documents to convert.
    fn on_documents_found(&self, count: usize) {
        self.report(&messages::documents_found(count));
    }

    /// A document moved to a new state. Not reported as text by default.
    fn on_state_change(&self, document: &str, state: ConversionState) {
        let _ = (document, state);
    }

    /// Settings for `document` are being resolved.
    fn on_settings(&self, document: &str) {
        self.report(&messages::loading_settings(document));
    }

    /// Conversion of one format started.
    ///
    /// # Arguments
    /// * `index`: 1-based position of `format` among the requested formats
    /// * `total`: number of requested formats
    fn on_format_start(&self, document: &str, format: OutputFormat, index: usize, total: usize) {
        self.report(&messages::converting(document, format, index, total));
    }

    /// One artifact was written.
    fn on_format_complete(&self, file: &ConvertedFile) {
        self.report(&messages::converted(
            &file.source_document,
            file.format,
            &file.output_path,
        ));
    }

    /// One format failed; the remaining formats continue.
    fn on_format_error(&self, document: &str, error: &FormatError) {
        self.report(&messages::format_failed(
            document,
            error.format(),
            &error.to_string(),
        ));
    }

    /// All formats of `document` were attempted.
    fn on_document_complete(&self, document: &str, files: usize, failures: usize) {
        self.report(&messages::document_complete(document, files, failures));
    }
}

/// Ignores every event.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {}

/// Shared reporter handle.
pub type Progress = Arc<dyn ProgressReporter>;
