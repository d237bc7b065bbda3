//! Destination paths: `${…}` placeholder substitution with interactive fallback.
//!
//! | Placeholder          | Value                                                  |
//! |----------------------|--------------------------------------------------------|
//! | `${workspaceFolder}` | workspace root; the file's directory without one;     |
//! |                      | for untitled documents the user is prompted            |
//! | `${dirname}`         | file directory relative to the workspace folder       |
//! | `${basename}`        | source name without extension                          |
//! | `${filename}`        | source name with its own extension                     |
//! | `${extension}`       | output format extension, no leading dot                |
//! | `${<attribute>}`     | document attribute                                     |
//!
//! Unknown names become the empty string. The result is normalised lexically
//! and, if still relative, anchored at the workspace folder, the document's
//! directory or the current directory, in that order.

use crate::cancel::CancellationToken;
use crate::document::Attributes;
use crate::error::ConvertError;
use crate::host::{HostUi, PromptSpec};
use crate::messages;
use crate::pipeline::input::SourceDocument;
use crate::settings::OutputFormat;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::path::{Component, Path, PathBuf};
use tracing::debug;

static RE_PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([^}]*)\}").expect("valid regex"));

/// Identity and location of the document being converted.
#[derive(Debug, Clone, Copy)]
pub struct DestinationContext<'a> {
    pub source: &'a SourceDocument,
    pub format: OutputFormat,
    pub attributes: &'a Attributes,
}

/// Resolves destination patterns for one conversion.
///
/// The answer to the workspace-folder prompt is cached for the lifetime of
/// the resolver, so a conversion producing several formats asks at most once.
pub struct DestinationResolver<'h> {
    host: &'h dyn HostUi,
    cancel: CancellationToken,
    prompted_folder: Option<String>,
}

impl<'h> DestinationResolver<'h> {
    pub fn new(host: &'h dyn HostUi, cancel: CancellationToken) -> Self {
        Self {
            host,
            cancel,
            prompted_folder: None,
        }
    }

    /// Substitute every placeholder of `pattern` and normalise the result.
    pub async fn resolve(
        &mut self,
        pattern: &str,
        ctx: &DestinationContext<'_>,
    ) -> Result<PathBuf, ConvertError> {
        let needs_prompt = ctx.source.is_untitled()
            && ctx.source.workspace_root().is_none()
            && RE_PLACEHOLDER
                .captures_iter(pattern)
                .any(|c| &c[1] == "workspaceFolder");
        if needs_prompt {
            self.ensure_prompted(pattern).await?;
        }

        let workspace = self.workspace_folder(ctx.source);
        let substituted = RE_PLACEHOLDER
            .replace_all(pattern, |caps: &Captures<'_>| {
                self.placeholder(&caps[1], ctx, workspace.as_deref())
            })
            .into_owned();

        let normalized = normalize(Path::new(&substituted));
        let resolved = if normalized.is_absolute() {
            normalized
        } else {
            let anchor = match workspace.as_deref().filter(|w| !w.is_empty()) {
                Some(w) => PathBuf::from(w),
                None => match ctx.source.dir() {
                    Some(dir) => dir.to_path_buf(),
                    None => std::env::current_dir().map_err(|e| {
                        ConvertError::DestinationUnresolved {
                            pattern: pattern.to_string(),
                            reason: format!("no current directory: {e}"),
                        }
                    })?,
                },
            };
            normalize(&anchor.join(normalized))
        };

        debug!("Destination '{}' → {}", pattern, resolved.display());
        Ok(resolved)
    }

    async fn ensure_prompted(&mut self, pattern: &str) -> Result<(), ConvertError> {
        if self.prompted_folder.is_some() {
            return Ok(());
        }
        let spec = PromptSpec::new(messages::WORKSPACE_FOLDER_PROMPT)
            .placeholder(messages::WORKSPACE_FOLDER_PLACEHOLDER);
        let answer = self
            .cancel
            .run_until_cancelled(self.host.prompt(spec))
            .await?;
        match answer {
            Some(folder) => {
                self.prompted_folder = Some(folder);
                Ok(())
            }
            None => Err(ConvertError::DestinationUnresolved {
                pattern: pattern.to_string(),
                reason: "no output folder was given".to_string(),
            }),
        }
    }

    fn workspace_folder(&self, source: &SourceDocument) -> Option<String> {
        if let Some(root) = source.workspace_root() {
            return Some(root.to_string_lossy().into_owned());
        }
        if let Some(dir) = source.dir() {
            return Some(dir.to_string_lossy().into_owned());
        }
        self.prompted_folder.clone()
    }

    fn placeholder(
        &self,
        name: &str,
        ctx: &DestinationContext<'_>,
        workspace: Option<&str>,
    ) -> String {
        let source = ctx.source;
        match name {
            "workspaceFolder" => workspace.unwrap_or_default().to_string(),
            "dirname" => dirname(source),
            "basename" => source.title(),
            "filename" => source.name().to_string(),
            "extension" => ctx.format.extension().to_string(),
            other => ctx.attributes.get(other).cloned().unwrap_or_default(),
        }
    }
}

/// Directory of the file relative to its workspace; empty at the root or
/// without a file.
fn dirname(source: &SourceDocument) -> String {
    let Some(dir) = source.dir() else {
        return String::new();
    };
    let relative = match source.workspace_root() {
        Some(root) => pathdiff::diff_paths(dir, root).unwrap_or_default(),
        None => PathBuf::new(),
    };
    let s = relative.to_string_lossy().into_owned();
    if s == "." {
        String::new()
    } else {
        s
    }
}

/// Collapse `.`, `..` and repeated separators without touching the disk.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    out
}
