//! User-facing status strings.
//!
//! Kept in one place so that hosts can see every message the pipeline can
//! emit, and so that wording changes never touch orchestration code.

use crate::settings::OutputFormat;
use std::path::Path;

pub const SEARCHING_DOCUMENTS: &str = "Searching for documents…";

pub const WORKSPACE_FOLDER_PROMPT: &str =
    "The document is not saved and no workspace is open. Enter the folder to save the output in";

pub const WORKSPACE_FOLDER_PLACEHOLDER: &str = "Output folder";

pub const REPORT_NAME_PROMPT: &str = "Enter a name for the report file";

pub const REPORT_NAME_PLACEHOLDER: &str = "Report.pdf";

pub const CANCELLED: &str = "Conversion cancelled";

pub fn documents_found(count: usize) -> String {
    match count {
        0 => "No matching documents found".to_string(),
        1 => "Found 1 document".to_string(),
        n => format!("Found {n} documents"),
    }
}

pub fn loading_settings(document: &str) -> String {
    format!("Loading settings for {document}…")
}

pub fn converting(document: &str, format: OutputFormat, index: usize, total: usize) -> String {
    format!("Converting {document} to {format} ({index}/{total})…")
}

pub fn converted(document: &str, format: OutputFormat, output: &Path) -> String {
    format!("Converted {document} to {format}: {}", output.display())
}

pub fn format_failed(document: &str, format: OutputFormat, reason: &str) -> String {
    format!("Converting {document} to {format} failed: {reason}")
}

pub fn document_complete(document: &str, files: usize, failures: usize) -> String {
    if failures == 0 {
        format!("Finished {document} ({files} file(s))")
    } else {
        format!("Finished {document} ({files} file(s), {failures} failed)")
    }
}

pub fn merging(count: usize, output: &Path) -> String {
    format!("Merging {count} document(s) into {}…", output.display())
}

pub fn report_complete(output: &Path) -> String {
    format!("Report written to {}", output.display())
}
