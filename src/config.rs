//! Layered configuration: raw, untyped-enough settings as read from disk.
//!
//! Configuration arrives in layers (global file, workspace file, `MDCONV_*`
//! environment variables, explicit overrides), merged by the [`config`]
//! crate through [`Loader`] and deserialised into [`RawSettings`].
//! Every field is optional: a layer only states what it changes, and
//! [`crate::settings::SettingsResolver`] turns the merged result (plus the
//! document's front matter) into a validated
//! [`crate::settings::ConversionSettings`].
//!
//! Enum-like values stay strings at this level so that resolution can reject
//! unknown variants with a precise [`ValidationError::InvalidEnumValue`]
//! instead of a generic deserialisation failure.
//!
//! [`SettingsStore`] is the process-wide cache: it hands out immutable
//! `Arc<RawSettings>` snapshots and reloads only after [`SettingsStore::invalidate`].

use crate::error::ValidationError;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File, FileFormat, ValueKind};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::debug;

/// File name of the per-workspace configuration layer.
pub const WORKSPACE_CONFIG_FILE: &str = ".mdconv.toml";

/// Prefix of environment-variable overrides (`MDCONV_PARSER__EMOJI_TYPE=None`).
pub const ENV_PREFIX: &str = "MDCONV";

/// Merged configuration layers before validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawSettings {
    /// Output formats, e.g. `["PDF", "HTML"]`.
    pub conversion_type: Option<Vec<String>>,
    /// JPEG quality, 0–100.
    pub conversion_quality: Option<i64>,
    /// Output path pattern with `${…}` placeholders.
    pub destination_pattern: Option<String>,
    pub locale: Option<String>,
    pub date_format: Option<String>,
    pub document: RawDocument,
    pub parser: RawParser,
    pub report: RawReport,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawDocument {
    pub attributes: BTreeMap<String, String>,
    pub header_footer_enabled: Option<bool>,
    /// Literal header text, or a path to a file containing it.
    pub header_template: Option<String>,
    /// Literal footer text, or a path to a file containing it.
    pub footer_template: Option<String>,
    pub paper: RawPaper,
    pub design: RawDesign,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawPaper {
    #[serde(alias = "Format")]
    pub format: Option<String>,
    #[serde(alias = "Orientation")]
    pub orientation: Option<String>,
    #[serde(alias = "Width")]
    pub width: Option<String>,
    #[serde(alias = "Height")]
    pub height: Option<String>,
    #[serde(alias = "Margin")]
    pub margin: RawMargin,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawMargin {
    #[serde(alias = "Top")]
    pub top: Option<String>,
    #[serde(alias = "Right")]
    pub right: Option<String>,
    #[serde(alias = "Bottom")]
    pub bottom: Option<String>,
    #[serde(alias = "Left")]
    pub left: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawDesign {
    /// HTML template wrapping the rendered body.
    pub template: Option<PathBuf>,
    pub highlight_style: Option<String>,
    pub style_sheets: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawParser {
    /// Prefer the host-provided Markdown parser once it is available.
    pub system_parser_enabled: Option<bool>,
    pub emoji_type: Option<String>,
    pub toc: RawToc,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawToc {
    #[serde(alias = "Enabled")]
    pub enabled: Option<bool>,
    #[serde(alias = "Class")]
    pub class: Option<String>,
    /// Range list such as `"2-6"` or `"1,3-4"`. A bare number is accepted too.
    #[serde(alias = "Levels", deserialize_with = "scalar_string")]
    pub levels: Option<String>,
    /// Regular expression matching the TOC placeholder in the rendered body.
    #[serde(alias = "Indicator")]
    pub indicator: Option<String>,
    /// `ul` or `ol`.
    #[serde(alias = "ListType")]
    pub list_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawReport {
    /// File-name fragment identifying the title page of a report.
    pub title_page: Option<String>,
    /// File-name fragment identifying report body documents.
    pub body: Option<String>,
}

impl RawSettings {
    /// Merge `over` on top of `self`, field by field.
    ///
    /// Set fields of `over` win; unset ones fall through to `self`.
    /// Attribute maps are merged key by key.
    pub fn overlay(&self, over: &RawSettings) -> RawSettings {
        fn pick<T: Clone>(base: &Option<T>, over: &Option<T>) -> Option<T> {
            over.clone().or_else(|| base.clone())
        }

        let mut attributes = self.document.attributes.clone();
        attributes.extend(
            over.document
                .attributes
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );

        let (b, o) = (&self.document.paper, &over.document.paper);
        let paper = RawPaper {
            format: pick(&b.format, &o.format),
            orientation: pick(&b.orientation, &o.orientation),
            width: pick(&b.width, &o.width),
            height: pick(&b.height, &o.height),
            margin: RawMargin {
                top: pick(&b.margin.top, &o.margin.top),
                right: pick(&b.margin.right, &o.margin.right),
                bottom: pick(&b.margin.bottom, &o.margin.bottom),
                left: pick(&b.margin.left, &o.margin.left),
            },
        };

        let (b, o) = (&self.parser.toc, &over.parser.toc);
        let toc = RawToc {
            enabled: pick(&b.enabled, &o.enabled),
            class: pick(&b.class, &o.class),
            levels: pick(&b.levels, &o.levels),
            indicator: pick(&b.indicator, &o.indicator),
            list_type: pick(&b.list_type, &o.list_type),
        };

        RawSettings {
            conversion_type: pick(&self.conversion_type, &over.conversion_type),
            conversion_quality: pick(&self.conversion_quality, &over.conversion_quality),
            destination_pattern: pick(&self.destination_pattern, &over.destination_pattern),
            locale: pick(&self.locale, &over.locale),
            date_format: pick(&self.date_format, &over.date_format),
            document: RawDocument {
                attributes,
                header_footer_enabled: pick(
                    &self.document.header_footer_enabled,
                    &over.document.header_footer_enabled,
                ),
                header_template: pick(&self.document.header_template, &over.document.header_template),
                footer_template: pick(&self.document.footer_template, &over.document.footer_template),
                paper,
                design: RawDesign {
                    template: pick(&self.document.design.template, &over.document.design.template),
                    highlight_style: pick(
                        &self.document.design.highlight_style,
                        &over.document.design.highlight_style,
                    ),
                    style_sheets: pick(
                        &self.document.design.style_sheets,
                        &over.document.design.style_sheets,
                    ),
                },
            },
            parser: RawParser {
                system_parser_enabled: pick(
                    &self.parser.system_parser_enabled,
                    &over.parser.system_parser_enabled,
                ),
                emoji_type: pick(&self.parser.emoji_type, &over.parser.emoji_type),
                toc,
            },
            report: RawReport {
                title_page: pick(&self.report.title_page, &over.report.title_page),
                body: pick(&self.report.body, &over.report.body),
            },
        }
    }
}

/// Accept `"2-4"`, `2` or `2.0`-free integers as a string.
fn scalar_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    struct ScalarVisitor;

    impl<'de> serde::de::Visitor<'de> for ScalarVisitor {
        type Value = Option<String>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a string or an integer")
        }

        fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }

        fn visit_string<E: serde::de::Error>(self, v: String) -> Result<Self::Value, E> {
            Ok(Some(v))
        }

        fn visit_i64<E: serde::de::Error>(self, v: i64) -> Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }

        fn visit_u64<E: serde::de::Error>(self, v: u64) -> Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }

        fn visit_none<E: serde::de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_unit<E: serde::de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_some<D: Deserializer<'de>>(self, d: D) -> Result<Self::Value, D::Error> {
            d.deserialize_any(ScalarVisitor)
        }
    }

    deserializer.deserialize_any(ScalarVisitor)
}

// ── Loading ──────────────────────────────────────────────────────────────

/// Something that can produce the merged configuration layers on demand.
///
/// The store calls [`ConfigurationSource::load`] once per generation.
pub trait ConfigurationSource: Send + Sync {
    fn load(&self) -> Result<RawSettings, ValidationError>;
}

/// Fixed settings, mostly useful for embedding and tests.
impl ConfigurationSource for RawSettings {
    fn load(&self) -> Result<RawSettings, ValidationError> {
        Ok(self.clone())
    }
}

/// Helper for layering configuration sources.
///
/// Later layers override earlier ones key by key.
#[derive(Debug, Clone)]
pub struct Loader {
    builder: ConfigBuilder<DefaultState>,
}

impl Loader {
    /// Start an empty loader. Unset keys fall back to resolver defaults.
    pub fn new() -> Self {
        Self {
            builder: Config::builder(),
        }
    }

    /// Global, then workspace, then environment layers.
    pub fn standard(workspace_root: Option<&Path>) -> Self {
        let mut loader = Self::new();
        if let Some(path) = global_config_path() {
            loader = loader.with_optional_file(path);
        }
        if let Some(root) = workspace_root {
            loader = loader.with_optional_file(root.join(WORKSPACE_CONFIG_FILE));
        }
        loader.with_environment()
    }

    /// Layer a configuration file. Missing files trigger an error.
    pub fn with_file(mut self, path: impl AsRef<Path>) -> Self {
        let source = File::from(path.as_ref())
            .format(FileFormat::Toml)
            .required(true);
        self.builder = self.builder.add_source(source);
        self
    }

    /// Layer an optional configuration file (ignored if the file is absent).
    pub fn with_optional_file(mut self, path: impl AsRef<Path>) -> Self {
        let source = File::from(path.as_ref())
            .format(FileFormat::Toml)
            .required(false);
        self.builder = self.builder.add_source(source);
        self
    }

    /// Layer inline TOML text.
    pub fn with_toml(mut self, text: &str) -> Self {
        self.builder = self.builder.add_source(File::from_str(text, FileFormat::Toml));
        self
    }

    /// Layer `MDCONV_*` environment variables (`__` separates nesting levels).
    pub fn with_environment(mut self) -> Self {
        let env = Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("conversion_type")
            .with_list_parse_key("document.design.style_sheets");
        self.builder = self.builder.add_source(env);
        self
    }

    /// Apply a single key/value override (useful for CLI settings).
    pub fn set_override<I>(mut self, key: &str, value: I) -> Result<Self, ValidationError>
    where
        I: Into<ValueKind>,
    {
        self.builder = self.builder.set_override(key, value)?;
        Ok(self)
    }

    /// Finalize the builder and deserialize the merged layers.
    pub fn build(self) -> Result<RawSettings, ValidationError> {
        Ok(self.builder.build()?.try_deserialize()?)
    }
}

impl Default for Loader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigurationSource for Loader {
    fn load(&self) -> Result<RawSettings, ValidationError> {
        self.clone().build()
    }
}

/// `<config dir>/mdconv/config.toml`, if the platform has a config directory.
pub fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("mdconv").join("config.toml"))
}

// ── Cache ────────────────────────────────────────────────────────────────

struct Cached {
    generation: u64,
    settings: Arc<RawSettings>,
}

/// Process-wide cache of the merged configuration layers.
///
/// Snapshots are immutable: invalidation bumps the generation and the next
/// [`SettingsStore::current`] call reloads, while conversions already holding
/// an older snapshot keep using it unchanged.
pub struct SettingsStore {
    source: Box<dyn ConfigurationSource>,
    generation: watch::Sender<u64>,
    cache: Mutex<Option<Cached>>,
}

impl SettingsStore {
    pub fn new(source: impl ConfigurationSource + 'static) -> Self {
        let (generation, _) = watch::channel(0);
        Self {
            source: Box::new(source),
            generation,
            cache: Mutex::new(None),
        }
    }

    /// Current generation of the configuration.
    pub fn generation(&self) -> u64 {
        *self.generation.borrow()
    }

    /// Change-notification stream: yields each new generation number.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.generation.subscribe()
    }

    /// Mark the cached snapshot stale after a configuration change.
    pub fn invalidate(&self) {
        self.generation.send_modify(|g| *g += 1);
        debug!("Settings invalidated (generation {})", self.generation());
    }

    /// Return the snapshot for the current generation, loading it if needed.
    pub fn current(&self) -> Result<Arc<RawSettings>, ValidationError> {
        let generation = self.generation();
        let mut cache = self
            .cache
            .lock()
            .map_err(|_| ValidationError::Config("settings cache poisoned".into()))?;

        if let Some(cached) = cache.as_ref() {
            if cached.generation == generation {
                return Ok(Arc::clone(&cached.settings));
            }
        }

        let settings = Arc::new(self.source.load()?);
        debug!("Loaded settings for generation {}", generation);
        *cache = Some(Cached {
            generation,
            settings: Arc::clone(&settings),
        });
        Ok(settings)
    }
}

impl fmt::Debug for SettingsStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SettingsStore")
            .field("generation", &self.generation())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource {
        loads: Arc<AtomicUsize>,
    }

    impl ConfigurationSource for CountingSource {
        fn load(&self) -> Result<RawSettings, ValidationError> {
            let n = self.loads.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(RawSettings {
                conversion_quality: Some(n as i64),
                ..RawSettings::default()
            })
        }
    }

    #[test]
    fn loader_reads_nested_toml() {
        let raw = Loader::new()
            .with_toml(
                r#"
                conversion_type = ["HTML", "PDF"]
                [document.paper]
                format = "A5"
                [document.paper.margin]
                top = "2cm"
                [parser.toc]
                enabled = true
                levels = 2
                "#,
            )
            .build()
            .expect("toml to deserialize");

        assert_eq!(
            raw.conversion_type,
            Some(vec!["HTML".to_string(), "PDF".to_string()])
        );
        assert_eq!(raw.document.paper.format.as_deref(), Some("A5"));
        assert_eq!(raw.document.paper.margin.top.as_deref(), Some("2cm"));
        assert_eq!(raw.document.paper.margin.left, None);
        assert_eq!(raw.parser.toc.enabled, Some(true));
        assert_eq!(raw.parser.toc.levels.as_deref(), Some("2"));
    }

    #[test]
    fn later_layers_override_earlier() {
        let raw = Loader::new()
            .with_toml("locale = \"de\"\ndate_format = \"FullDate\"")
            .with_toml("locale = \"fr\"")
            .build()
            .expect("layers to merge");
        assert_eq!(raw.locale.as_deref(), Some("fr"));
        assert_eq!(raw.date_format.as_deref(), Some("FullDate"));
    }

    #[test]
    fn overrides_apply_last() {
        let raw = Loader::new()
            .with_toml("destination_pattern = \"a\"")
            .set_override("destination_pattern", "b")
            .expect("override to apply")
            .build()
            .expect("config to build");
        assert_eq!(raw.destination_pattern.as_deref(), Some("b"));
    }

    #[test]
    fn missing_required_file_is_an_error() {
        let result = Loader::new()
            .with_file("/definitely/not/here/mdconv.toml")
            .build();
        assert!(matches!(result, Err(ValidationError::Config(_))));
    }

    #[test]
    fn overlay_is_field_by_field() {
        let base = RawSettings {
            locale: Some("en".into()),
            document: RawDocument {
                attributes: BTreeMap::from([
                    ("author".to_string(), "Jo".to_string()),
                    ("team".to_string(), "core".to_string()),
                ]),
                paper: RawPaper {
                    format: Some("A4".into()),
                    margin: RawMargin {
                        top: Some("1cm".into()),
                        ..RawMargin::default()
                    },
                    ..RawPaper::default()
                },
                ..RawDocument::default()
            },
            ..RawSettings::default()
        };
        let over = RawSettings {
            document: RawDocument {
                attributes: BTreeMap::from([("author".to_string(), "Sam".to_string())]),
                paper: RawPaper {
                    orientation: Some("Landscape".into()),
                    ..RawPaper::default()
                },
                ..RawDocument::default()
            },
            ..RawSettings::default()
        };

        let merged = base.overlay(&over);
        assert_eq!(merged.locale.as_deref(), Some("en"));
        assert_eq!(merged.document.attributes["author"], "Sam");
        assert_eq!(merged.document.attributes["team"], "core");
        assert_eq!(merged.document.paper.format.as_deref(), Some("A4"));
        assert_eq!(merged.document.paper.orientation.as_deref(), Some("Landscape"));
        assert_eq!(merged.document.paper.margin.top.as_deref(), Some("1cm"));
    }

    #[test]
    fn store_caches_until_invalidated() {
        let loads = Arc::new(AtomicUsize::new(0));
        let store = SettingsStore::new(CountingSource {
            loads: Arc::clone(&loads),
        });

        let first = store.current().unwrap();
        let second = store.current().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(loads.load(Ordering::SeqCst), 1);

        store.invalidate();
        let third = store.current().unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 2);
        assert_eq!(third.conversion_quality, Some(2));
        // The earlier snapshot is untouched.
        assert_eq!(first.conversion_quality, Some(1));
    }

    #[test]
    fn invalidation_is_observable() {
        let store = SettingsStore::new(RawSettings::default());
        let rx = store.subscribe();
        store.invalidate();
        store.invalidate();
        assert_eq!(*rx.borrow(), 2);
        assert_eq!(store.generation(), 2);
    }
}
