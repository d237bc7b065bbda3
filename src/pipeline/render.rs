//! Rendering backends: HTML page → PDF / PNG / JPEG bytes.
//!
//! The runner writes HTML itself; every other format goes through a
//! [`RenderBackend`]. The default backend is [`ChromeBackend`], which shells
//! out to a headless Chrome/Chromium binary:
//!
//! * PDF: `--print-to-pdf`, with page size and margins injected as `@page`
//!   CSS and the header/footer as fixed running elements
//! * PNG/JPEG: `--screenshot` of the first page at the paper's pixel size,
//!   re-encoded by [`crate::pipeline::encode`] when JPEG is requested
//!
//! The child process is spawned with `kill_on_drop`, so dropping the render
//! future (e.g. on cancellation) terminates the browser.

use crate::error::FormatError;
use crate::pipeline::encode::encode_screenshot;
use crate::settings::{OutputFormat, Paper};
use async_trait::async_trait;
use std::env;
use std::path::{Path, PathBuf};
use tempfile::tempdir;
use tokio::process::Command;
use tracing::{debug, info};
use url::Url;
use which::which;

/// Page geometry and decorations passed to the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct PaperOptions {
    pub paper: Paper,
    /// Rendered header HTML, repeated on every page.
    pub header: Option<String>,
    /// Rendered footer HTML, repeated on every page.
    pub footer: Option<String>,
    /// JPEG quality, 0–100.
    pub quality: u8,
}

/// Render entry point for non-HTML output formats.
#[async_trait]
pub trait RenderBackend: Send + Sync {
    async fn render_to_format(
        &self,
        html: &str,
        format: OutputFormat,
        options: &PaperOptions,
    ) -> Result<Vec<u8>, FormatError>;
}

/// Headless Chrome/Chromium backend.
#[derive(Debug, Clone, Default)]
pub struct ChromeBackend {
    binary: Option<PathBuf>,
}

impl ChromeBackend {
    /// Locate the browser on first use.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific browser binary.
    pub fn with_binary(path: impl Into<PathBuf>) -> Self {
        Self {
            binary: Some(path.into()),
        }
    }

    fn binary(&self, format: OutputFormat) -> Result<PathBuf, FormatError> {
        match &self.binary {
            Some(path) => Ok(path.clone()),
            None => resolve_chrome_binary().ok_or_else(|| FormatError::BackendUnavailable {
                format,
                detail: "Unable to locate a Chrome/Chromium binary. Set MDCONV_CHROME_BIN to override the detection.".to_string(),
            }),
        }
    }
}

#[async_trait]
impl RenderBackend for ChromeBackend {
    async fn render_to_format(
        &self,
        html: &str,
        format: OutputFormat,
        options: &PaperOptions,
    ) -> Result<Vec<u8>, FormatError> {
        let backend_error = |detail: String| FormatError::Backend { format, detail };

        let chrome = self.binary(format)?;
        let temp_dir = tempdir().map_err(|e| backend_error(format!("Temp dir error: {e}")))?;
        let html_path = temp_dir.path().join("mdconv-export.html");
        let out_path = temp_dir
            .path()
            .join(if format == OutputFormat::Pdf { "out.pdf" } else { "out.png" });

        let page = match format {
            OutputFormat::Pdf => inject_print_decorations(html, options),
            _ => html.to_string(),
        };
        tokio::fs::write(&html_path, page)
            .await
            .map_err(|e| backend_error(e.to_string()))?;
        let file_url = Url::from_file_path(&html_path).map_err(|_| {
            backend_error("Failed to construct file:// URL for HTML input".to_string())
        })?;

        let mut cmd = Command::new(&chrome);
        cmd.arg("--headless")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--hide-scrollbars")
            .kill_on_drop(true);

        match format {
            OutputFormat::Pdf => {
                cmd.arg("--print-to-pdf-no-header")
                    .arg("--no-pdf-header-footer")
                    .arg(format!("--print-to-pdf={}", out_path.display()));
            }
            _ => {
                let (w, h) = options.paper.format.dimensions();
                cmd.arg(format!("--screenshot={}", out_path.display()))
                    .arg(format!("--window-size={},{}", w.to_pixels(), h.to_pixels()));
            }
        }
        cmd.arg(file_url.as_str());

        debug!("Launching {} for {}", chrome.display(), format);
        let output = cmd.output().await.map_err(|e| {
            backend_error(format!(
                "Failed to launch Chrome ({}): {}",
                chrome.display(),
                e
            ))
        })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(backend_error(format!(
                "Chrome exited with status {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let bytes = read_artifact(&out_path)
            .await
            .map_err(|e| backend_error(format!("No output produced: {e}")))?;
        info!("{} rendered ({} bytes)", format, bytes.len());

        if format.is_image() {
            let quality = options.quality;
            return tokio::task::spawn_blocking(move || encode_screenshot(bytes, format, quality))
                .await
                .map_err(|e| FormatError::Encode {
                    format,
                    detail: format!("encoder task failed: {e}"),
                })?;
        }
        Ok(bytes)
    }
}

async fn read_artifact(path: &Path) -> std::io::Result<Vec<u8>> {
    tokio::fs::read(path).await
}

/// `@page` CSS plus fixed header/footer elements for printing.
pub fn inject_print_decorations(html: &str, options: &PaperOptions) -> String {
    let mut css = format!(
        "@page {{ size: {}; margin: {}; }}\n",
        options.paper.format.css_size(),
        options.paper.margin.css()
    );
    let mut running = String::new();

    if options.header.is_some() || options.footer.is_some() {
        css.push_str(
            ".mdconv-running { position: fixed; left: 0; right: 0; font-size: 9pt; color: #555; }\n\
             .mdconv-header { top: 0; }\n\
             .mdconv-footer { bottom: 0; }\n\
             body { padding: 2em 0; }\n",
        );
    }
    if let Some(header) = &options.header {
        running.push_str(&format!(
            "<div class=\"mdconv-running mdconv-header\">{header}</div>"
        ));
    }
    if let Some(footer) = &options.footer {
        running.push_str(&format!(
            "<div class=\"mdconv-running mdconv-footer\">{footer}</div>"
        ));
    }

    let with_css = inject_before_head_end(html, &format!("<style data-mdconv-print>\n{css}</style>"));
    if running.is_empty() {
        return with_css;
    }
    inject_after_body_start(&with_css, &running)
}

fn inject_before_head_end(html: &str, fragment: &str) -> String {
    match html.find("</head>") {
        Some(idx) => {
            let mut output = String::with_capacity(html.len() + fragment.len());
            output.push_str(&html[..idx]);
            output.push_str(fragment);
            output.push_str(&html[idx..]);
            output
        }
        None => format!("{fragment}{html}"),
    }
}

fn inject_after_body_start(html: &str, fragment: &str) -> String {
    let at = html
        .find("<body")
        .and_then(|start| html[start..].find('>').map(|end| start + end + 1));
    match at {
        Some(idx) => {
            let mut output = String::with_capacity(html.len() + fragment.len());
            output.push_str(&html[..idx]);
            output.push_str(fragment);
            output.push_str(&html[idx..]);
            output
        }
        None => format!("{fragment}{html}"),
    }
}

/// Find a browser: `MDCONV_CHROME_BIN`, `CHROME_BIN`, `PATH`, then
/// well-known install locations.
pub fn resolve_chrome_binary() -> Option<PathBuf> {
    for var in ["MDCONV_CHROME_BIN", "GOOGLE_CHROME_BIN", "CHROME_BIN"] {
        if let Some(path) = env::var_os(var) {
            if !path.is_empty() {
                return Some(PathBuf::from(path));
            }
        }
    }

    for candidate in [
        "google-chrome",
        "google-chrome-stable",
        "chromium",
        "chromium-browser",
        "chrome",
        "msedge",
    ] {
        if let Ok(path) = which(candidate) {
            return Some(path);
        }
    }

    #[cfg(target_os = "macos")]
    let candidates: &[&str] = &[
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
    ];
    #[cfg(target_os = "windows")]
    let candidates: &[&str] = &[
        r"C:\Program Files\Google\Chrome\Application\chrome.exe",
        r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
    ];
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    let candidates: &[&str] = &[
        "/usr/bin/google-chrome",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/chromium-browser",
        "/usr/bin/chromium",
    ];

    candidates
        .iter()
        .map(PathBuf::from)
        .find(|path| path.exists())
}
