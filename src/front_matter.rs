//! YAML front matter: per-document setting overrides.
//!
//! A document may start with a YAML block delimited by `---` lines (the
//! closing line may also be `...`). Known keys override the configuration
//! layers for that document only; any other scalar key becomes a document
//! attribute, so
//!
//! ```yaml
//! ---
//! title: Quarterly numbers
//! HeaderTemplate: ./header.html
//! paper:
//!   format: A5
//! ---
//! ```
//!
//! sets the `title` attribute, loads the header from `header.html` and prints
//! on A5. Both snake_case names and the PascalCase spellings are accepted.

use crate::config::{RawDesign, RawDocument, RawPaper, RawParser, RawSettings, RawToc};
use crate::error::ValidationError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_yaml::Value;
use std::collections::BTreeMap;

static FRONT_MATTER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?ms)\A---[ \t]*\r?\n(.*?)^(?:---|\.\.\.)[ \t]*\r?(?:\n|\z)")
        .expect("valid regex")
});

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::One(s) => vec![s],
            OneOrMany::Many(v) => v,
        }
    }
}

/// Parsed front matter of one document.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct FrontMatter {
    #[serde(alias = "ConversionType")]
    conversion_type: Option<OneOrMany>,
    #[serde(alias = "ConversionQuality")]
    pub conversion_quality: Option<i64>,
    #[serde(alias = "DestinationPattern")]
    pub destination_pattern: Option<String>,
    #[serde(alias = "Locale")]
    pub locale: Option<String>,
    #[serde(alias = "DateFormat")]
    pub date_format: Option<String>,
    #[serde(alias = "Attributes")]
    pub attributes: BTreeMap<String, Value>,
    #[serde(alias = "HeaderFooterEnabled")]
    pub header_footer_enabled: Option<bool>,
    #[serde(alias = "HeaderTemplate")]
    pub header_template: Option<String>,
    #[serde(alias = "FooterTemplate")]
    pub footer_template: Option<String>,
    #[serde(alias = "Paper")]
    pub paper: RawPaper,
    #[serde(alias = "Template")]
    pub template: Option<std::path::PathBuf>,
    #[serde(alias = "HighlightStyle")]
    pub highlight_style: Option<String>,
    #[serde(alias = "StyleSheets")]
    style_sheets: Option<OneOrMany>,
    #[serde(alias = "EmojiType")]
    pub emoji_type: Option<String>,
    #[serde(alias = "Toc")]
    pub toc: RawToc,
    /// Everything else; scalar values become attributes.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl FrontMatter {
    /// Parse a YAML block (without delimiters). Blank input yields no overrides.
    pub fn parse(yaml: &str) -> Result<Self, ValidationError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        match serde_yaml::from_str::<Option<FrontMatter>>(yaml) {
            Ok(fm) => Ok(fm.unwrap_or_default()),
            Err(e) => Err(ValidationError::FrontMatter(e.to_string())),
        }
    }

    /// Output formats requested by the document, if any.
    pub fn conversion_types(&self) -> Option<Vec<String>> {
        self.conversion_type.clone().map(OneOrMany::into_vec)
    }

    /// Attributes declared by the document: loose scalar keys first, then the
    /// explicit `attributes` map, which wins on conflicts.
    pub fn document_attributes(&self) -> BTreeMap<String, String> {
        let mut attributes: BTreeMap<String, String> = self
            .extra
            .iter()
            .filter_map(|(k, v)| scalar_to_string(v).map(|s| (k.clone(), s)))
            .collect();
        attributes.extend(
            self.attributes
                .iter()
                .filter_map(|(k, v)| scalar_to_string(v).map(|s| (k.clone(), s))),
        );
        attributes
    }

    /// The overrides as a configuration layer, ready to be put on top of the
    /// workspace settings with [`RawSettings::overlay`].
    pub fn to_overrides(&self) -> RawSettings {
        RawSettings {
            conversion_type: self.conversion_types(),
            conversion_quality: self.conversion_quality,
            destination_pattern: self.destination_pattern.clone(),
            locale: self.locale.clone(),
            date_format: self.date_format.clone(),
            document: RawDocument {
                attributes: self.document_attributes(),
                header_footer_enabled: self.header_footer_enabled,
                header_template: self.header_template.clone(),
                footer_template: self.footer_template.clone(),
                paper: self.paper.clone(),
                design: RawDesign {
                    template: self.template.clone(),
                    highlight_style: self.highlight_style.clone(),
                    style_sheets: self.style_sheets.clone().map(OneOrMany::into_vec),
                },
            },
            parser: RawParser {
                system_parser_enabled: None,
                emoji_type: self.emoji_type.clone(),
                toc: self.toc.clone(),
            },
            report: Default::default(),
        }
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Split `text` into its front matter and the remaining body.
///
/// Documents without a leading `---` block return default (empty) front
/// matter and the whole text as body.
pub fn split(text: &str) -> Result<(FrontMatter, &str), ValidationError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    match FRONT_MATTER_RE.captures(text) {
        Some(caps) => {
            let whole = caps.get(0).map_or(0, |m| m.end());
            let yaml = caps.get(1).map_or("", |m| m.as_str());
            Ok((FrontMatter::parse(yaml)?, &text[whole..]))
        }
        None => Ok((FrontMatter::default(), text)),
    }
}
