//! Input resolution: source documents, their workspace, and template files.
//!
//! A source document is either backed by a file or *untitled* (text typed
//! into an editor buffer, or piped on stdin). Only file-backed documents
//! have a directory, which matters for relative templates, assets and the
//! destination pattern.

use crate::error::ConvertError;
use crate::config::WORKSPACE_CONFIG_FILE;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// File extensions recognised as Markdown.
pub const MARKDOWN_EXTENSIONS: &[&str] = &["md", "markdown", "mkdwn"];

/// A document to convert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    name: String,
    path: Option<PathBuf>,
    workspace_root: Option<PathBuf>,
    text: String,
}

impl SourceDocument {
    /// A document without a backing file.
    pub fn untitled(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: None,
            workspace_root: None,
            text: text.into(),
        }
    }

    /// A file-backed document whose text is already loaded.
    pub fn from_file(path: impl Into<PathBuf>, text: impl Into<String>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            name,
            path: Some(path),
            workspace_root: None,
            text: text.into(),
        }
    }

    pub fn with_workspace(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace_root = Some(root.into());
        self
    }

    /// File name (with extension) or the untitled buffer's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn workspace_root(&self) -> Option<&Path> {
        self.workspace_root.as_deref()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_untitled(&self) -> bool {
        self.path.is_none()
    }

    /// Name without its extension, used as the default `title` attribute.
    pub fn title(&self) -> String {
        Path::new(&self.name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.name.clone())
    }

    /// Directory containing the file, if file-backed.
    pub fn dir(&self) -> Option<&Path> {
        self.path.as_deref().and_then(Path::parent)
    }
}

/// Read `path` and attach its workspace (given, or detected from ancestors).
pub async fn load_source(
    path: impl AsRef<Path>,
    workspace: Option<&Path>,
) -> Result<SourceDocument, ConvertError> {
    let path = path.as_ref();
    let unreadable = |source| ConvertError::SourceUnreadable {
        path: path.to_path_buf(),
        source,
    };

    let absolute = tokio::fs::canonicalize(path).await.map_err(unreadable)?;
    let text = tokio::fs::read_to_string(&absolute).await.map_err(unreadable)?;
    info!("Loaded {} ({} bytes)", absolute.display(), text.len());

    let root = match workspace {
        Some(root) => Some(root.to_path_buf()),
        None => find_workspace_root(&absolute),
    };
    let doc = SourceDocument::from_file(absolute, text);
    Ok(match root {
        Some(root) => {
            debug!("Workspace root: {}", root.display());
            doc.with_workspace(root)
        }
        None => doc,
    })
}

/// Nearest ancestor directory holding a workspace marker
/// (`.mdconv.toml` or `.git`).
pub fn find_workspace_root(path: &Path) -> Option<PathBuf> {
    let start = if path.is_dir() { Some(path) } else { path.parent() };
    start?
        .ancestors()
        .find(|dir| dir.join(WORKSPACE_CONFIG_FILE).exists() || dir.join(".git").exists())
        .map(Path::to_path_buf)
}

pub fn is_markdown_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            MARKDOWN_EXTENSIONS
                .iter()
                .any(|m| m.eq_ignore_ascii_case(e))
        })
        .unwrap_or(false)
}

/// Resolve a header, footer or page template value.
///
/// When `value` names an existing file (absolute, or relative to `base`)
/// the file's content is returned; otherwise `value` is literal template text.
pub async fn load_template(value: &str, base: Option<&Path>) -> Result<String, ConvertError> {
    let Some(path) = template_path(value, base) else {
        return Ok(value.to_string());
    };
    if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
        return Ok(value.to_string());
    }

    debug!("Loading template from {}", path.display());
    tokio::fs::read_to_string(&path)
        .await
        .map_err(|source| ConvertError::TemplateUnreadable { path, source })
}

fn template_path(value: &str, base: Option<&Path>) -> Option<PathBuf> {
    let value = value.trim();
    // Multi-line or markup values are never paths.
    if value.is_empty() || value.contains(['\n', '<', '{']) {
        return None;
    }
    let candidate = PathBuf::from(value);
    if candidate.is_absolute() {
        return Some(candidate);
    }
    base.map(|b| b.join(candidate))
}
