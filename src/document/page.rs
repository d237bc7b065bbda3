//! The HTML page that wraps a rendered document body.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::path::Path;
use url::Url;

/// Used when no `document.design.template` is configured.
pub const BUILTIN_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="{{ locale }}">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{{ title }}</title>
<style>
body { font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Helvetica, Arial, sans-serif; line-height: 1.5; color: #24292f; }
.markdown-body { max-width: 980px; margin: 0 auto; }
pre, code { font-family: "SF Mono", Menlo, Consolas, "Liberation Mono", monospace; }
pre { background: #f6f8fa; padding: 16px; overflow: auto; }
table { border-collapse: collapse; }
th, td { border: 1px solid #d0d7de; padding: 6px 13px; }
img.emoji { height: 1em; width: 1em; vertical-align: -0.1em; }
.task-list-item { list-style-type: none; }
</style>
{{ styles }}
</head>
<body>
<article class="markdown-body">
{{ content }}
</article>
</body>
</html>
"#;

const HIGHLIGHT_CDN: &str = "https://cdn.jsdelivr.net/gh/highlightjs/cdn-release@11.9.0/build";

static RE_SLOT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{\s*(title|locale|styles|content)\s*\}\}").expect("valid regex")
});

static RE_SCHEME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*:").expect("valid regex"));

/// Page template plus the `<head>` elements for style sheets and highlighting.
#[derive(Debug, Clone)]
pub struct PageTemplate {
    template: String,
    styles: String,
}

impl PageTemplate {
    /// `template` is the full page text; `None` selects [`BUILTIN_TEMPLATE`].
    ///
    /// Relative style sheet paths resolve against `base`.
    pub fn new(
        template: Option<String>,
        style_sheets: &[String],
        highlight_style: &str,
        base: Option<&Path>,
    ) -> Self {
        let mut styles: Vec<String> = style_sheets
            .iter()
            .map(|sheet| {
                format!(
                    r#"<link rel="stylesheet" href="{}">"#,
                    escape_attr(&style_href(sheet, base))
                )
            })
            .collect();

        if highlight_style != "None" {
            let theme = theme_file_name(highlight_style);
            styles.push(format!(
                r#"<link rel="stylesheet" href="{HIGHLIGHT_CDN}/styles/{theme}.min.css">"#
            ));
            styles.push(format!(
                r#"<script src="{HIGHLIGHT_CDN}/highlight.min.js"></script><script>hljs.highlightAll();</script>"#
            ));
        }

        Self {
            template: template.unwrap_or_else(|| BUILTIN_TEMPLATE.to_string()),
            styles: styles.join("\n"),
        }
    }

    /// Fill the template slots. `content` is inserted as-is, never rescanned.
    pub fn fill(&self, title: &str, locale: &str, content: &str) -> String {
        RE_SLOT
            .replace_all(&self.template, |caps: &Captures<'_>| match &caps[1] {
                "title" => escape_html(title),
                "locale" => escape_attr(locale),
                "styles" => self.styles.clone(),
                _ => content.to_string(),
            })
            .into_owned()
    }
}

fn style_href(sheet: &str, base: Option<&Path>) -> String {
    if RE_SCHEME.is_match(sheet) || sheet.starts_with("//") {
        return sheet.to_string();
    }
    let path = match base {
        Some(base) => base.join(sheet),
        None => Path::new(sheet).to_path_buf(),
    };
    Url::from_file_path(&path)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| sheet.to_string())
}

/// `Atom One Dark` → `atom-one-dark`; `Default` → `default`.
fn theme_file_name(style: &str) -> String {
    style
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

pub(crate) fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn escape_attr(text: &str) -> String {
    escape_html(text).replace('"', "&quot;")
}
