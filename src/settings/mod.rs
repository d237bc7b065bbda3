//! Validated conversion settings and the resolver that produces them.
//!
//! [`SettingsResolver::resolve`] is a pure function: it puts the document's
//! [`FrontMatter`] on top of the merged configuration layers field by field,
//! fills unset fields with defaults and validates every value. Enum-like
//! strings must match a variant name exactly (case-sensitive).

pub mod paper;

pub use paper::{Dimension, Margin, Orientation, Paper, PaperFormat, StandardizedFormat, Unit};

use crate::config::RawSettings;
use crate::error::ValidationError;
use crate::front_matter::FrontMatter;
use chrono::format::{Item, StrftimeItems};
use chrono::NaiveDate;
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

// ── Defaults ─────────────────────────────────────────────────────────────

pub const DEFAULT_DESTINATION_PATTERN: &str =
    "${workspaceFolder}/${dirname}/${basename}.${extension}";
pub const DEFAULT_QUALITY: u8 = 90;
pub const DEFAULT_TOC_CLASS: &str = "toc";
pub const DEFAULT_TOC_LEVELS: &str = "2-6";
pub const DEFAULT_TOC_INDICATOR: &str = r"\[\[\s*toc\s*\]\]";
pub const DEFAULT_HIGHLIGHT_STYLE: &str = "Default";
pub const DEFAULT_HEADER_TEMPLATE: &str = r#"<span class="title">{{ title }}</span>"#;
pub const DEFAULT_FOOTER_TEMPLATE: &str = r#"<span class="date">{{ date }}</span>"#;
pub const DEFAULT_TITLE_PAGE_NAME: &str = "TitlePage";
pub const DEFAULT_REPORT_NAME: &str = "Report";

// ── Enumerations ─────────────────────────────────────────────────────────

/// Output artifact kind. Ordered so that HTML is always emitted first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum OutputFormat {
    Html,
    Pdf,
    Png,
    Jpeg,
}

impl OutputFormat {
    pub const NAMES: &'static str = "HTML, PDF, PNG, JPEG";

    pub fn as_str(self) -> &'static str {
        match self {
            OutputFormat::Html => "HTML",
            OutputFormat::Pdf => "PDF",
            OutputFormat::Png => "PNG",
            OutputFormat::Jpeg => "JPEG",
        }
    }

    /// File extension without the leading dot.
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Html => "html",
            OutputFormat::Pdf => "pdf",
            OutputFormat::Png => "png",
            OutputFormat::Jpeg => "jpg",
        }
    }

    /// Whether the format is a raster screenshot of the first page.
    pub fn is_image(self) -> bool {
        matches!(self, OutputFormat::Png | OutputFormat::Jpeg)
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HTML" => Ok(OutputFormat::Html),
            "PDF" => Ok(OutputFormat::Pdf),
            "PNG" => Ok(OutputFormat::Png),
            "JPEG" => Ok(OutputFormat::Jpeg),
            other => Err(invalid_enum("conversion_type", other, Self::NAMES)),
        }
    }
}

/// How `:shortcode:` emoji are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum EmojiType {
    /// Leave shortcodes as written.
    None,
    /// Unicode characters.
    Native,
    /// Twemoji images.
    Twemoji,
    /// GitHub emoji images.
    #[default]
    GitHub,
}

impl FromStr for EmojiType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "None" => Ok(EmojiType::None),
            "Native" => Ok(EmojiType::Native),
            "Twemoji" => Ok(EmojiType::Twemoji),
            "GitHub" => Ok(EmojiType::GitHub),
            other => Err(invalid_enum(
                "parser.emoji_type",
                other,
                "None, Native, Twemoji, GitHub",
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ListType {
    Ordered,
    #[default]
    Unordered,
}

impl ListType {
    /// HTML list element name.
    pub fn tag(self) -> &'static str {
        match self {
            ListType::Ordered => "ol",
            ListType::Unordered => "ul",
        }
    }
}

impl FromStr for ListType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ol" => Ok(ListType::Ordered),
            "ul" => Ok(ListType::Unordered),
            other => Err(invalid_enum("parser.toc.list_type", other, "ul, ol")),
        }
    }
}

/// How the built-in `date` attribute is formatted.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub enum DateFormat {
    /// ISO 8601 calendar date, `2024-03-01`.
    #[default]
    Default,
    /// Long form, `Friday, March 1, 2024`.
    FullDate,
    /// A strftime pattern.
    Custom(String),
}

impl DateFormat {
    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        match value {
            "Default" => Ok(DateFormat::Default),
            "FullDate" => Ok(DateFormat::FullDate),
            pattern => {
                if pattern.is_empty()
                    || StrftimeItems::new(pattern).any(|item| item == Item::Error)
                {
                    return Err(ValidationError::InvalidDateFormat(pattern.to_string()));
                }
                Ok(DateFormat::Custom(pattern.to_string()))
            }
        }
    }

    fn pattern(&self) -> &str {
        match self {
            DateFormat::Default => "%Y-%m-%d",
            DateFormat::FullDate => "%A, %B %-d, %Y",
            DateFormat::Custom(p) => p,
        }
    }

    pub fn format(&self, date: NaiveDate) -> String {
        date.format(self.pattern()).to_string()
    }
}

// ── Table of contents ────────────────────────────────────────────────────

/// Table-of-contents options. Only present when the TOC is enabled.
#[derive(Debug, Clone, Serialize)]
pub struct TocSettings {
    /// CSS class of the container element.
    pub class: String,
    /// Heading levels (1–6) listed in the TOC.
    pub levels: BTreeSet<u8>,
    /// Matches the placeholder replaced by the TOC.
    #[serde(serialize_with = "serialize_regex")]
    pub indicator: Regex,
    pub list_type: ListType,
}

fn serialize_regex<S: serde::Serializer>(re: &Regex, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(re.as_str())
}

impl PartialEq for TocSettings {
    fn eq(&self, other: &Self) -> bool {
        self.class == other.class
            && self.levels == other.levels
            && self.indicator.as_str() == other.indicator.as_str()
            && self.list_type == other.list_type
    }
}

/// Parse a heading-level range list such as `"2-6"` or `"1, 3-4"`.
pub fn parse_levels(spec: &str) -> Result<BTreeSet<u8>, ValidationError> {
    let invalid = || ValidationError::InvalidTocLevels(spec.to_string());
    let level = |s: &str| -> Result<u8, ValidationError> {
        match s.trim().parse::<u8>() {
            Ok(n @ 1..=6) => Ok(n),
            _ => Err(invalid()),
        }
    };

    let mut levels = BTreeSet::new();
    for part in spec.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        match part.split_once('-') {
            Some((from, to)) => {
                let (from, to) = (level(from)?, level(to)?);
                if from > to {
                    return Err(invalid());
                }
                levels.extend(from..=to);
            }
            None => {
                levels.insert(level(part)?);
            }
        }
    }

    if levels.is_empty() {
        return Err(invalid());
    }
    Ok(levels)
}

// ── Settings ─────────────────────────────────────────────────────────────

/// File-name fragments identifying the documents of a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportSettings {
    pub title_page: String,
    pub body: String,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            title_page: DEFAULT_TITLE_PAGE_NAME.to_string(),
            body: DEFAULT_REPORT_NAME.to_string(),
        }
    }
}

/// Fully validated snapshot of everything one conversion needs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversionSettings {
    /// Never empty.
    pub conversion_types: BTreeSet<OutputFormat>,
    /// JPEG quality, 0–100.
    pub quality: u8,
    pub destination_pattern: String,
    /// Never empty.
    pub locale: String,
    pub date_format: DateFormat,
    pub paper: Paper,
    pub emoji_type: EmojiType,
    pub toc: Option<TocSettings>,
    pub attributes: BTreeMap<String, String>,
    pub header_footer_enabled: bool,
    /// Literal text, or a path to a file holding the template.
    pub header_template: String,
    /// Literal text, or a path to a file holding the template.
    pub footer_template: String,
    /// Document template; `None` selects the built-in one.
    pub template: Option<PathBuf>,
    pub style_sheets: Vec<String>,
    /// highlight.js theme name, or `None` to disable highlighting styles.
    pub highlight_style: String,
    pub system_parser_enabled: bool,
    pub report: ReportSettings,
}

/// Turns configuration layers plus front matter into [`ConversionSettings`].
#[derive(Debug, Clone)]
pub struct SettingsResolver {
    host_locale: String,
}

impl SettingsResolver {
    /// Resolver whose locale fallback is `locale` (empty means `en`).
    pub fn with_locale(locale: impl Into<String>) -> Self {
        let locale = locale.into();
        Self {
            host_locale: if locale.trim().is_empty() {
                "en".to_string()
            } else {
                locale
            },
        }
    }

    /// Resolver falling back to the host locale (`LC_ALL`, `LC_MESSAGES`, `LANG`).
    pub fn from_env() -> Self {
        let locale = ["LC_ALL", "LC_MESSAGES", "LANG"]
            .iter()
            .filter_map(|var| std::env::var(var).ok())
            .find_map(|value| normalize_posix_locale(&value))
            .unwrap_or_else(|| "en".to_string());
        Self::with_locale(locale)
    }

    pub fn host_locale(&self) -> &str {
        &self.host_locale
    }

    /// Merge `front` over `base` and validate the result.
    pub fn resolve(
        &self,
        base: &RawSettings,
        front: &FrontMatter,
    ) -> Result<ConversionSettings, ValidationError> {
        self.resolve_raw(&base.overlay(&front.to_overrides()))
    }

    /// Validate already-merged layers.
    pub fn resolve_raw(&self, raw: &RawSettings) -> Result<ConversionSettings, ValidationError> {
        let conversion_types = match &raw.conversion_type {
            None => BTreeSet::from([OutputFormat::Pdf]),
            Some(names) => {
                let types = names
                    .iter()
                    .map(|n| n.parse::<OutputFormat>())
                    .collect::<Result<BTreeSet<_>, _>>()?;
                if types.is_empty() {
                    return Err(ValidationError::NoConversionTypes);
                }
                types
            }
        };

        let quality = match raw.conversion_quality {
            None => DEFAULT_QUALITY,
            Some(q @ 0..=100) => q as u8,
            Some(q) => return Err(ValidationError::QualityOutOfRange(q)),
        };

        let locale = raw
            .locale
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .unwrap_or(&self.host_locale)
            .to_string();

        let date_format = match raw.date_format.as_deref() {
            None => DateFormat::Default,
            Some(s) => DateFormat::parse(s)?,
        };

        let emoji_type = match raw.parser.emoji_type.as_deref() {
            None => EmojiType::default(),
            Some(s) => s.parse()?,
        };

        let document = &raw.document;
        Ok(ConversionSettings {
            conversion_types,
            quality,
            destination_pattern: raw
                .destination_pattern
                .clone()
                .unwrap_or_else(|| DEFAULT_DESTINATION_PATTERN.to_string()),
            locale,
            date_format,
            paper: resolve_paper(raw)?,
            emoji_type,
            toc: resolve_toc(raw)?,
            attributes: document.attributes.clone(),
            header_footer_enabled: document.header_footer_enabled.unwrap_or(true),
            header_template: document
                .header_template
                .clone()
                .unwrap_or_else(|| DEFAULT_HEADER_TEMPLATE.to_string()),
            footer_template: document
                .footer_template
                .clone()
                .unwrap_or_else(|| DEFAULT_FOOTER_TEMPLATE.to_string()),
            template: document.design.template.clone(),
            style_sheets: document.design.style_sheets.clone().unwrap_or_default(),
            highlight_style: document
                .design
                .highlight_style
                .clone()
                .unwrap_or_else(|| DEFAULT_HIGHLIGHT_STYLE.to_string()),
            system_parser_enabled: raw.parser.system_parser_enabled.unwrap_or(false),
            report: ReportSettings {
                title_page: raw
                    .report
                    .title_page
                    .clone()
                    .unwrap_or_else(|| DEFAULT_TITLE_PAGE_NAME.to_string()),
                body: raw
                    .report
                    .body
                    .clone()
                    .unwrap_or_else(|| DEFAULT_REPORT_NAME.to_string()),
            },
        })
    }
}

impl Default for SettingsResolver {
    fn default() -> Self {
        Self::from_env()
    }
}

fn resolve_paper(raw: &RawSettings) -> Result<Paper, ValidationError> {
    let p = &raw.document.paper;

    let format = match (&p.width, &p.height) {
        (Some(w), Some(h)) => PaperFormat::Custom {
            width: Dimension::parse("document.paper.width", w)?,
            height: Dimension::parse("document.paper.height", h)?,
        },
        _ => {
            let format = match p.format.as_deref() {
                None => StandardizedFormat::A4,
                Some(s) => s.parse().map_err(|_| {
                    invalid_enum("document.paper.format", s, StandardizedFormat::NAMES)
                })?,
            };
            let orientation = match p.orientation.as_deref() {
                None => Orientation::Portrait,
                Some(s) => s.parse().map_err(|_| {
                    invalid_enum("document.paper.orientation", s, "Portrait, Landscape")
                })?,
            };
            PaperFormat::Standardized {
                format,
                orientation,
            }
        }
    };

    let side = |key: &str, value: &Option<String>, default: Dimension| match value {
        None => Ok(default),
        Some(v) => Dimension::parse(key, v),
    };
    let d = Margin::default();
    let m = &p.margin;
    let margin = Margin {
        top: side("document.paper.margin.top", &m.top, d.top)?,
        right: side("document.paper.margin.right", &m.right, d.right)?,
        bottom: side("document.paper.margin.bottom", &m.bottom, d.bottom)?,
        left: side("document.paper.margin.left", &m.left, d.left)?,
    };

    Ok(Paper { format, margin })
}

fn resolve_toc(raw: &RawSettings) -> Result<Option<TocSettings>, ValidationError> {
    let t = &raw.parser.toc;
    if !t.enabled.unwrap_or(false) {
        return Ok(None);
    }

    let levels = parse_levels(t.levels.as_deref().unwrap_or(DEFAULT_TOC_LEVELS))?;
    let pattern = t.indicator.as_deref().unwrap_or(DEFAULT_TOC_INDICATOR);
    let indicator = Regex::new(pattern).map_err(|e| ValidationError::InvalidIndicator {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })?;
    let list_type = match t.list_type.as_deref() {
        None => ListType::default(),
        Some(s) => s.parse()?,
    };

    Ok(Some(TocSettings {
        class: t
            .class
            .clone()
            .unwrap_or_else(|| DEFAULT_TOC_CLASS.to_string()),
        levels,
        indicator,
        list_type,
    }))
}

fn invalid_enum(key: &str, value: &str, expected: &str) -> ValidationError {
    ValidationError::InvalidEnumValue {
        key: key.to_string(),
        value: value.to_string(),
        expected: expected.to_string(),
    }
}

/// `de_DE.UTF-8` → `de-DE`; `C` and `POSIX` carry no locale.
fn normalize_posix_locale(value: &str) -> Option<String> {
    let base = value.split(['.', '@']).next().unwrap_or("").trim();
    if base.is_empty() || base == "C" || base == "POSIX" {
        return None;
    }
    Some(base.replace('_', "-"))
}
