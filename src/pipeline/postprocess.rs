//! Post-processing: document-wide passes over the rendered HTML body.
//!
//! ## Pass Order
//!
//! The passes run exactly once per document, after every section has been
//! rendered and concatenated:
//!
//! 1. Heading anchors (slugified ids, deduplicated in document order)
//! 2. Table of contents (needs the anchors from pass 1)
//! 3. Emoji (must not see the TOC markup as text, so after pass 2)
//! 4. Asset paths (rewrites `src`/`href`, including emoji images from pass 3
//!    which are absolute already and left alone)

use crate::pipeline::emoji::replace_emoji;
use crate::settings::{EmojiType, TocSettings};
use once_cell::sync::Lazy;
use regex::{Captures, NoExpand, Regex};
use std::collections::HashSet;
use std::path::Path;
use tracing::debug;
use url::Url;

/// Inputs of [`apply`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PostProcess<'a> {
    pub toc: Option<&'a TocSettings>,
    pub emoji: EmojiType,
    /// Directory relative asset paths are resolved against.
    pub asset_base: Option<&'a Path>,
}

/// Run all passes in order.
pub fn apply(html: &str, options: &PostProcess<'_>) -> String {
    let (s, headings) = add_heading_anchors(html);
    let s = match options.toc {
        Some(toc) => insert_toc(&s, &headings, toc),
        None => s,
    };
    let s = replace_emoji(&s, options.emoji);
    match options.asset_base {
        Some(base) => rewrite_asset_paths(&s, base),
        None => s,
    }
}

// ── Pass 1: Heading anchors ─────────────────────────────────────────────────

static RE_HEADING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<h([1-6])((?:\s[^>]*)?)>(.*?)</h[1-6]>").expect("valid regex")
});

static RE_ID_ATTR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\sid\s*=\s*"([^"]*)""#).expect("valid regex"));

static RE_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));

/// A heading found in the rendered body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heading {
    pub level: u8,
    pub id: String,
    /// Inner HTML with tags removed.
    pub text: String,
}

/// Give every heading an `id`, returning the headings in document order.
///
/// Headings that already carry an id keep it.
pub fn add_heading_anchors(html: &str) -> (String, Vec<Heading>) {
    let mut used = HashSet::new();
    let mut headings = Vec::new();

    let out = RE_HEADING.replace_all(html, |caps: &Captures<'_>| {
        let level: u8 = caps[1].parse().unwrap_or(1);
        let attrs = &caps[2];
        let inner = &caps[3];
        let text = RE_TAG.replace_all(inner, "").trim().to_string();

        if let Some(existing) = RE_ID_ATTR.captures(attrs) {
            let id = existing[1].to_string();
            used.insert(id.clone());
            headings.push(Heading { level, id, text });
            return caps[0].to_string();
        }

        let id = unique_slug(&slugify(&decode_entities(&text)), &mut used);
        let tag = format!("<h{level}{attrs} id=\"{id}\">{inner}</h{level}>");
        headings.push(Heading { level, id, text });
        tag
    });

    (out.into_owned(), headings)
}

/// Lowercase, keep letters, digits, `-` and `_`, turn whitespace into `-`.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for c in text.trim().chars() {
        if c.is_alphanumeric() || c == '-' || c == '_' {
            slug.extend(c.to_lowercase());
        } else if c.is_whitespace() {
            slug.push('-');
        }
    }
    slug
}

fn unique_slug(base: &str, used: &mut HashSet<String>) -> String {
    let base = if base.is_empty() { "section" } else { base };
    let mut candidate = base.to_string();
    let mut n = 2;
    while used.contains(&candidate) {
        candidate = format!("{base}-{n}");
        n += 1;
    }
    used.insert(candidate.clone());
    candidate
}

fn decode_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

// ── Pass 2: Table of contents ───────────────────────────────────────────────

/// Replace the TOC indicator with a nested list of the selected headings.
///
/// An indicator that forms a paragraph of its own (`<p>[[toc]]</p>`) is
/// replaced together with the paragraph.
pub fn insert_toc(html: &str, headings: &[Heading], toc: &TocSettings) -> String {
    if !toc.indicator.is_match(html) {
        return html.to_string();
    }

    let list = build_toc(headings, toc);
    debug!(
        "Inserting table of contents ({} entries)",
        headings
            .iter()
            .filter(|h| toc.levels.contains(&h.level))
            .count()
    );

    let paragraph = Regex::new(&format!(r"<p>\s*(?:{})\s*</p>", toc.indicator.as_str())).ok();
    let s = match paragraph {
        Some(re) => re.replace_all(html, NoExpand(&list)).into_owned(),
        None => html.to_string(),
    };
    toc.indicator.replace_all(&s, NoExpand(&list)).into_owned()
}

fn build_toc(headings: &[Heading], toc: &TocSettings) -> String {
    let tag = toc.list_type.tag();
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");

    let mut out = format!("<div class=\"{}\">", toc.class);
    let mut stack: Vec<u8> = Vec::new();

    for h in headings.iter().filter(|h| toc.levels.contains(&h.level)) {
        match stack.last() {
            Some(&top) if h.level <= top => {
                while let Some(&top) = stack.last() {
                    if stack.len() > 1 && h.level < top {
                        out.push_str("</li>");
                        out.push_str(&close);
                        stack.pop();
                    } else {
                        break;
                    }
                }
                out.push_str("</li>");
            }
            _ => {
                out.push_str(&open);
                stack.push(h.level);
            }
        }
        out.push_str(&format!("<li><a href=\"#{}\">{}</a>", h.id, h.text));
    }

    for _ in &stack {
        out.push_str("</li>");
        out.push_str(&close);
    }
    out.push_str("</div>");
    out
}

// ── Pass 3: Emoji ───────────────────────────────────────────────────────────
//
// See `pipeline::emoji`.

// ── Pass 4: Asset paths ─────────────────────────────────────────────────────

static RE_ASSET_ATTR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)(\s(?:src|href)\s*=\s*)"([^"]*)""#).expect("valid regex")
});

static RE_SCHEME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*:").expect("valid regex"));

/// Rewrite relative `src`/`href` values to absolute `file://` URLs.
///
/// Fragments, URLs with a scheme and protocol-relative URLs are kept.
/// `base` must be absolute; otherwise nothing is rewritten.
pub fn rewrite_asset_paths(html: &str, base: &Path) -> String {
    if !base.is_absolute() {
        return html.to_string();
    }

    RE_ASSET_ATTR
        .replace_all(html, |caps: &Captures<'_>| {
            let value = &caps[2];
            match resolve_asset(value, base) {
                Some(url) => format!("{}\"{}\"", &caps[1], url),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

fn resolve_asset(value: &str, base: &Path) -> Option<String> {
    if value.is_empty()
        || value.starts_with('#')
        || value.starts_with("//")
        || RE_SCHEME.is_match(value)
    {
        return None;
    }

    let split = value.find(['?', '#']).unwrap_or(value.len());
    let (path, suffix) = value.split_at(split);
    if path.is_empty() {
        return None;
    }

    let url = Url::from_file_path(base.join(path)).ok()?;
    Some(format!("{url}{suffix}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{parse_levels, ListType};

    fn toc(levels: &str, list_type: ListType) -> TocSettings {
        TocSettings {
            class: "toc".into(),
            levels: parse_levels(levels).unwrap(),
            indicator: Regex::new(r"\[\[\s*toc\s*\]\]").unwrap(),
            list_type,
        }
    }

    #[test]
    fn duplicate_headings_get_numbered_anchors() {
        let (html, headings) = add_heading_anchors("<h1>Test</h1><h2>Test</h2><h3>Test</h3>");
        assert_eq!(
            html,
            r#"<h1 id="test">Test</h1><h2 id="test-2">Test</h2><h3 id="test-3">Test</h3>"#
        );
        assert_eq!(headings[1].id, "test-2");
    }

    #[test]
    fn existing_ids_are_kept_and_reserved() {
        let (html, headings) =
            add_heading_anchors(r#"<h2 id="intro">Start</h2><h2>Intro</h2>"#);
        assert!(html.contains(r#"<h2 id="intro">Start</h2>"#), "{html}");
        assert!(html.contains(r#"<h2 id="intro-2">Intro</h2>"#), "{html}");
        assert_eq!(headings[0].id, "intro");
    }

    #[test]
    fn slugs_strip_markup_and_punctuation() {
        assert_eq!(slugify("Hello, World!"), "hello-world");
        assert_eq!(slugify("Ünïcode Café"), "ünïcode-café");
        let (_, headings) = add_heading_anchors("<h2><code>fn</code> &amp; more</h2><h2>!!!</h2>");
        assert_eq!(headings[0].id, "fn--more");
        assert_eq!(headings[1].id, "section");
    }

    #[test]
    fn toc_lists_only_selected_levels() {
        let html = "<p>[[toc]]</p><h1>Not included</h1><h2>Included</h2>";
        let out = apply(
            html,
            &PostProcess {
                toc: Some(&toc("2", ListType::Ordered)),
                ..Default::default()
            },
        );
        assert!(
            out.starts_with(r##"<div class="toc"><ol><li><a href="#included">Included</a></li></ol></div>"##),
            "{out}"
        );
        assert!(!out.contains(r##"href="#not-included""##), "{out}");
        assert!(!out.contains("<p>[[toc]]</p>"), "{out}");
    }

    #[test]
    fn toc_nests_deeper_levels() {
        let headings = vec![
            Heading { level: 2, id: "a".into(), text: "A".into() },
            Heading { level: 3, id: "b".into(), text: "B".into() },
            Heading { level: 2, id: "c".into(), text: "C".into() },
        ];
        let out = build_toc(&headings, &toc("2-3", ListType::Unordered));
        assert_eq!(
            out,
            concat!(
                r##"<div class="toc"><ul><li><a href="#a">A</a>"##,
                r##"<ul><li><a href="#b">B</a></li></ul></li>"##,
                r##"<li><a href="#c">C</a></li></ul></div>"##
            )
        );
    }

    #[test]
    fn toc_without_indicator_is_noop() {
        let html = "<h2>Only</h2>";
        let (anchored, headings) = add_heading_anchors(html);
        assert_eq!(
            insert_toc(&anchored, &headings, &toc("2", ListType::Unordered)),
            anchored
        );
    }

    #[test]
    fn assets_become_file_urls() {
        let base = std::env::temp_dir();
        let html = r##"<img src="img/a.png"><a href="#top">t</a><a href="https://x.org">x</a><a href="notes.md#part">n</a>"##;
        let out = rewrite_asset_paths(html, &base);
        let expected = Url::from_file_path(base.join("img/a.png")).unwrap();
        assert!(out.contains(&format!("src=\"{expected}\"")), "{out}");
        assert!(out.contains(r##"href="#top""##), "{out}");
        assert!(out.contains(r#"href="https://x.org""#), "{out}");
        assert!(out.contains("notes.md#part\""), "{out}");
        assert!(out.contains("file://"), "{out}");
    }

    #[test]
    fn relative_base_leaves_html_alone() {
        let html = r#"<img src="a.png">"#;
        assert_eq!(rewrite_asset_paths(html, Path::new("docs")), html);
    }
}
