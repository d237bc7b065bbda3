//! Error types for the markdown-converter library.
//!
//! Three tiers of failure mirror three tiers of blast radius:
//!
//! * [`ValidationError`]: the settings (configuration layers merged with the
//!   document's front matter) are malformed. Fatal to the one conversion that
//!   tried to resolve them; other documents are unaffected.
//!
//! * [`ConvertError`]: **Fatal** for one document (or, inside a report, for
//!   the whole report). Returned as `Err` from the runner and the tasks.
//!
//! * [`FormatError`]: **Non-fatal**. One output format of one document
//!   failed (browser crashed, image encoding failed) while the other formats
//!   are fine. Collected in [`crate::convert::DocumentOutcome::failures`].
//!
//! Cancellation is not a failure: the runner maps [`ConvertError::Cancelled`]
//! to an aborted outcome at its boundary.

use crate::settings::OutputFormat;
use std::path::PathBuf;
use thiserror::Error;

/// Settings could not be resolved into a [`crate::settings::ConversionSettings`].
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    /// An enum-like string did not match any variant (case-sensitive).
    #[error("Invalid value '{value}' for '{key}'. Expected one of: {expected}")]
    InvalidEnumValue {
        key: String,
        value: String,
        expected: String,
    },

    /// A dimension is missing its unit or uses an unknown unit.
    #[error("Invalid dimension '{value}' for '{key}'. Use a number followed by px, pt, in, cm or mm")]
    InvalidDimension { key: String, value: String },

    /// The TOC level list is not a valid range list of heading levels 1–6.
    #[error("Invalid table-of-contents levels '{0}'. Use levels 1-6, e.g. \"2-4\" or \"1,3\"")]
    InvalidTocLevels(String),

    /// The TOC indicator is not a valid regular expression.
    #[error("Invalid table-of-contents indicator '{pattern}': {reason}")]
    InvalidIndicator { pattern: String, reason: String },

    /// The date format contains an unknown strftime specifier.
    #[error("Invalid date format '{0}'")]
    InvalidDateFormat(String),

    /// Conversion quality outside 0–100.
    #[error("Conversion quality must be 0-100, got {0}")]
    QualityOutOfRange(i64),

    /// No output format was selected.
    #[error("No conversion type selected. Set `conversion_type` to at least one of HTML, PDF, PNG, JPEG")]
    NoConversionTypes,

    /// The document's front matter is not valid YAML or has the wrong shape.
    #[error("Invalid front matter: {0}")]
    FrontMatter(String),

    /// A configuration layer could not be read or deserialised.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl From<config::ConfigError> for ValidationError {
    fn from(e: config::ConfigError) -> Self {
        ValidationError::Config(e.to_string())
    }
}

/// All fatal errors returned by the conversion runner and the tasks.
#[derive(Debug, Error)]
pub enum ConvertError {
    // ── Settings ──────────────────────────────────────────────────────────
    #[error(transparent)]
    Validation(#[from] ValidationError),

    // ── Input errors ──────────────────────────────────────────────────────
    /// The source document could not be read.
    #[error("Failed to read '{path}': {source}")]
    SourceUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A header, footer or document template file exists but cannot be read.
    #[error("Failed to read template '{path}': {source}")]
    TemplateUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Destination ───────────────────────────────────────────────────────
    /// A placeholder in the destination pattern could not be resolved,
    /// usually because the user dismissed the workspace-folder prompt.
    #[error("Unable to resolve the destination path for '{pattern}': {reason}")]
    DestinationUnresolved { pattern: String, reason: String },

    // ── Rendering ─────────────────────────────────────────────────────────
    /// The Markdown parser failed on the document body.
    #[error("Failed to render the document: {0}")]
    Render(String),

    // ── Reports ───────────────────────────────────────────────────────────
    /// Combining the converted documents failed.
    #[error(transparent)]
    Merge(#[from] MergeError),

    /// One document of a report failed; the report is abandoned.
    #[error("Conversion of '{document}' failed, report aborted: {reason}")]
    DocumentFailed { document: String, reason: String },

    // ── Control flow ──────────────────────────────────────────────────────
    /// The cancellation token fired. Not reported as an error to users.
    #[error("Operation cancelled")]
    Cancelled,

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ConvertError {
    /// Short, stable name of the error kind for user-facing messages.
    pub fn kind(&self) -> &'static str {
        match self {
            ConvertError::Validation(_) => "ValidationError",
            ConvertError::SourceUnreadable { .. } | ConvertError::TemplateUnreadable { .. } => {
                "IOError"
            }
            ConvertError::DestinationUnresolved { .. } => "DestinationUnresolved",
            ConvertError::Render(_) => "RenderFailure",
            ConvertError::Merge(_) => "MergeFailure",
            ConvertError::DocumentFailed { .. } => "ReportFailure",
            ConvertError::Cancelled => "Cancelled",
            ConvertError::Internal(_) => "UnknownError",
        }
    }

    /// Whether this value only signals cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ConvertError::Cancelled)
    }
}

/// Format an error for display to the user.
///
/// Known kinds are prefixed with their kind name; anything unexpected is
/// wrapped in a generic "unknown error" message rather than shown raw.
pub fn describe_error(error: &ConvertError) -> String {
    match error {
        ConvertError::Internal(detail) => format!("An unknown error occurred: {detail}"),
        other => format!("{}: {}", other.kind(), other),
    }
}

/// A non-fatal error for one output format of one document.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FormatError {
    /// The rendering backend reported a failure.
    #[error("{format} rendering failed: {detail}")]
    Backend { format: OutputFormat, detail: String },

    /// No rendering backend is available for this format.
    #[error("No renderer available for {format}: {detail}")]
    BackendUnavailable { format: OutputFormat, detail: String },

    /// Converting the rendered image into the requested encoding failed.
    #[error("{format} encoding failed: {detail}")]
    Encode { format: OutputFormat, detail: String },

    /// The artifact could not be written.
    #[error("Failed to write {format} output '{path}': {detail}")]
    Write {
        format: OutputFormat,
        path: PathBuf,
        detail: String,
    },
}

impl FormatError {
    /// The output format this failure belongs to.
    pub fn format(&self) -> OutputFormat {
        match self {
            FormatError::Backend { format, .. }
            | FormatError::BackendUnavailable { format, .. }
            | FormatError::Encode { format, .. }
            | FormatError::Write { format, .. } => *format,
        }
    }
}

/// Errors raised while merging report artifacts.
#[derive(Debug, Error)]
pub enum MergeError {
    /// A source added to the merger does not exist.
    #[error("Merge source not found: '{0}'")]
    SourceMissing(PathBuf),

    /// A source could not be parsed as PDF.
    #[error("Failed to load '{path}' for merging: {detail}")]
    Load { path: PathBuf, detail: String },

    /// The merged file could not be written.
    #[error("Failed to save merged document '{path}': {detail}")]
    Save { path: PathBuf, detail: String },

    /// `save` was called without any sources.
    #[error("Nothing to merge")]
    Empty,
}
