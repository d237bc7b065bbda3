//! Document model: a small tree of [`Renderable`] nodes.
//!
//! ```text
//! Document
//!  ├─ header  TemplateFragment   (attribute substitution only)
//!  ├─ footer  TemplateFragment
//!  └─ body    DocumentFragment   (concatenates its sections)
//!              ├─ MarkdownFragment ──▶ parser
//!              └─ MarkdownFragment ──▶ parser
//! ```
//!
//! A [`Document`] is built fresh for every conversion from resolved
//! [`ConversionSettings`] and the already-loaded texts (body, templates).
//! Rendering performs no I/O of its own: the only suspension points are the
//! parser calls.

pub mod fragment;
pub mod page;

pub use fragment::{
    render_text_by, substitute_attributes, Attributes, DocumentFragment, MarkdownFragment,
    Renderable, TemplateFragment,
};
pub use page::PageTemplate;

use crate::error::ConvertError;
use crate::pipeline::parser::MarkdownParser;
use crate::pipeline::postprocess::{self, PostProcess};
use crate::settings::{ConversionSettings, DateFormat, EmojiType, Paper, TocSettings};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// One document being converted.
pub struct Document {
    title: String,
    paper: Paper,
    header: Option<TemplateFragment>,
    footer: Option<TemplateFragment>,
    toc: Option<TocSettings>,
    emoji: EmojiType,
    attributes: Arc<Attributes>,
    locale: String,
    date_format: DateFormat,
    body: DocumentFragment,
    parser: Arc<dyn MarkdownParser>,
    page: PageTemplate,
    base_dir: Option<PathBuf>,
}

impl Document {
    pub fn builder(settings: &ConversionSettings, parser: Arc<dyn MarkdownParser>) -> DocumentBuilder {
        DocumentBuilder::new(settings, parser)
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn paper(&self) -> &Paper {
        &self.paper
    }

    pub fn toc(&self) -> Option<&TocSettings> {
        self.toc.as_ref()
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn locale(&self) -> &str {
        &self.locale
    }

    pub fn date_format(&self) -> &DateFormat {
        &self.date_format
    }

    pub fn sections(&self) -> &[Box<dyn Renderable>] {
        self.body.children()
    }

    pub fn header(&self) -> Option<&TemplateFragment> {
        self.header.as_ref()
    }

    pub fn footer(&self) -> Option<&TemplateFragment> {
        self.footer.as_ref()
    }

    /// Rendered header, if headers are enabled.
    pub async fn render_header(&self) -> Result<Option<String>, ConvertError> {
        match &self.header {
            Some(h) => Ok(Some(h.render().await?)),
            None => Ok(None),
        }
    }

    /// Rendered footer, if footers are enabled.
    pub async fn render_footer(&self) -> Result<Option<String>, ConvertError> {
        match &self.footer {
            Some(f) => Ok(Some(f.render().await?)),
            None => Ok(None),
        }
    }

    fn finish(&self, body_html: &str) -> String {
        let processed = postprocess::apply(
            body_html,
            &PostProcess {
                toc: self.toc.as_ref(),
                emoji: self.emoji,
                asset_base: self.base_dir.as_deref(),
            },
        );
        self.page.fill(&self.title, &self.locale, &processed)
    }
}

#[async_trait]
impl Renderable for Document {
    fn content(&self) -> &str {
        self.body.content()
    }

    /// Render `text` as if it were this document's only section.
    async fn render_text(&self, text: &str) -> Result<String, ConvertError> {
        let section = MarkdownFragment::new(text, Arc::clone(&self.attributes), Arc::clone(&self.parser));
        let body_html = section.render().await?;
        Ok(self.finish(&body_html))
    }

    /// Render all sections, post-process once and wrap in the page template.
    async fn render(&self) -> Result<String, ConvertError> {
        debug!(
            "Rendering '{}' ({} sections)",
            self.title,
            self.body.children().len()
        );
        let body_html = self.body.render().await?;
        Ok(self.finish(&body_html))
    }
}

/// Assembles a [`Document`] from settings and loaded texts.
pub struct DocumentBuilder {
    title: String,
    paper: Paper,
    toc: Option<TocSettings>,
    emoji: EmojiType,
    attributes: Attributes,
    locale: String,
    date_format: DateFormat,
    header_footer_enabled: bool,
    header: Option<String>,
    footer: Option<String>,
    sections: Vec<String>,
    parser: Arc<dyn MarkdownParser>,
    template: Option<String>,
    style_sheets: Vec<String>,
    highlight_style: String,
    base_dir: Option<PathBuf>,
}

impl DocumentBuilder {
    fn new(settings: &ConversionSettings, parser: Arc<dyn MarkdownParser>) -> Self {
        Self {
            title: String::new(),
            paper: settings.paper,
            toc: settings.toc.clone(),
            emoji: settings.emoji_type,
            attributes: settings.attributes.clone(),
            locale: settings.locale.clone(),
            date_format: settings.date_format.clone(),
            header_footer_enabled: settings.header_footer_enabled,
            header: Some(settings.header_template.clone()),
            footer: Some(settings.footer_template.clone()),
            sections: Vec::new(),
            parser,
            template: None,
            style_sheets: settings.style_sheets.clone(),
            highlight_style: settings.highlight_style.clone(),
            base_dir: None,
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Directory relative assets and style sheets resolve against.
    pub fn base_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.base_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Attributes not already set; user attributes win.
    pub fn default_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.entry(key.into()).or_insert_with(|| value.into());
        self
    }

    /// Loaded header text (replaces the configured template value).
    pub fn header(mut self, text: impl Into<String>) -> Self {
        self.header = Some(text.into());
        self
    }

    /// Loaded footer text (replaces the configured template value).
    pub fn footer(mut self, text: impl Into<String>) -> Self {
        self.footer = Some(text.into());
        self
    }

    /// Loaded page template text.
    pub fn template(mut self, text: impl Into<String>) -> Self {
        self.template = Some(text.into());
        self
    }

    /// Append a Markdown body section.
    pub fn section(mut self, markdown: impl Into<String>) -> Self {
        self.sections.push(markdown.into());
        self
    }

    pub fn build(self) -> Document {
        let attributes = Arc::new(self.attributes);

        let sections: Vec<Box<dyn Renderable>> = self
            .sections
            .into_iter()
            .map(|text| {
                Box::new(MarkdownFragment::new(
                    text,
                    Arc::clone(&attributes),
                    Arc::clone(&self.parser),
                )) as Box<dyn Renderable>
            })
            .collect();
        let body = DocumentFragment::composite(sections, Arc::clone(&attributes));

        let pipeline: Arc<dyn Renderable> =
            Arc::new(DocumentFragment::new(String::new(), Arc::clone(&attributes)));
        let template_node = |text: Option<String>| {
            text.filter(|_| self.header_footer_enabled)
                .map(|t| TemplateFragment::new(t, Arc::clone(&pipeline)))
        };
        let header = template_node(self.header);
        let footer = template_node(self.footer);

        let page = PageTemplate::new(
            self.template,
            &self.style_sheets,
            &self.highlight_style,
            self.base_dir.as_deref(),
        );

        Document {
            title: self.title,
            paper: self.paper,
            header,
            footer,
            toc: self.toc,
            emoji: self.emoji,
            attributes,
            locale: self.locale,
            date_format: self.date_format,
            body,
            parser: self.parser,
            page,
            base_dir: self.base_dir,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RawSettings;
    use crate::front_matter::FrontMatter;
    use crate::pipeline::parser::ComrakParser;
    use crate::settings::SettingsResolver;

    fn settings(yaml: &str) -> ConversionSettings {
        SettingsResolver::with_locale("en")
            .resolve(&RawSettings::default(), &FrontMatter::parse(yaml).unwrap())
            .unwrap()
    }

    fn doc(yaml: &str, body: &str) -> Document {
        Document::builder(&settings(yaml), Arc::new(ComrakParser))
            .title("Sample")
            .default_attribute("title", "Sample")
            .template("{{ content }}")
            .section(body)
            .build()
    }

    #[tokio::test]
    async fn duplicate_headings_get_distinct_anchors() {
        let html = doc("emoji_type: None", "# Test\n\n# Test\n").render().await.unwrap();
        assert!(html.contains(r#"<h1 id="test">Test</h1>"#), "{html}");
        assert!(html.contains(r#"<h1 id="test-2">Test</h1>"#), "{html}");
    }

    #[tokio::test]
    async fn toc_is_generated_when_enabled() {
        let yaml = "toc:\n  enabled: true\n  levels: 2\n  list_type: ol";
        let body = "[[toc]]\n\n# Not included\n\n## Included\n";
        let html = doc(yaml, body).render().await.unwrap();
        assert!(html.contains(r##"<ol><li><a href="#included">Included</a></li></ol>"##), "{html}");
        assert!(!html.contains(r##"href="#not-included""##), "{html}");
    }

    #[tokio::test]
    async fn emoji_follow_settings() {
        let html = doc("emoji_type: None", "**:sparkles:**").render().await.unwrap();
        assert!(html.contains("<strong>:sparkles:</strong>"), "{html}");

        let html = doc("emoji_type: GitHub", "**:sparkles:**").render().await.unwrap();
        assert!(html.contains("<strong><img class=\"emoji\""), "{html}");
    }

    #[tokio::test]
    async fn attributes_reach_body_and_header() {
        let d = Document::builder(&settings("author: Sam"), Arc::new(ComrakParser))
            .default_attribute("title", "Sample")
            .header("{{ title }} / {{ author }}")
            .section("Written by {{ author }}")
            .build();
        assert!(d.render().await.unwrap().contains("Written by Sam"));
        assert_eq!(
            d.render_header().await.unwrap().as_deref(),
            Some("Sample / Sam")
        );
    }

    #[tokio::test]
    async fn user_attributes_override_defaults() {
        let d = Document::builder(&settings("title: Custom"), Arc::new(ComrakParser))
            .default_attribute("title", "file-name")
            .section("{{ title }}")
            .build();
        assert_eq!(d.attributes()["title"], "Custom");
    }

    #[tokio::test]
    async fn header_footer_can_be_disabled() {
        let d = Document::builder(&settings("header_footer_enabled: false"), Arc::new(ComrakParser))
            .header("h")
            .build();
        assert!(d.render_header().await.unwrap().is_none());
        assert!(d.render_footer().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn task_lists_render_checkboxes() {
        let html = doc("", "- [x] done\n- [ ] todo\n").render().await.unwrap();
        assert_eq!(html.matches("type=\"checkbox\"").count(), 2, "{html}");
    }

    #[tokio::test]
    async fn render_text_uses_document_pipeline() {
        let d = doc("author: Sam", "# Body");
        let html = d.render_text("*{{ author }}*").await.unwrap();
        assert!(html.contains("<em>Sam</em>"), "{html}");
        assert_eq!(d.content(), "# Body");
    }
}
