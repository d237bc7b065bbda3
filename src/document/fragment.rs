//! The render contract and the fragments a document is composed of.

use crate::error::ConvertError;
use crate::pipeline::parser::MarkdownParser;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Attribute name → value, shared by all fragments of a document.
pub type Attributes = BTreeMap<String, String>;

static RE_ATTRIBUTE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z_][\w.\-]*)\s*\}\}").expect("valid regex")
});

/// A node that turns its content (or any text) into output text.
#[async_trait]
pub trait Renderable: Send + Sync {
    /// The node's own source text.
    fn content(&self) -> &str;

    /// Run this node's transformation over `text`.
    async fn render_text(&self, text: &str) -> Result<String, ConvertError>;

    /// Render the node's own content.
    async fn render(&self) -> Result<String, ConvertError> {
        self.render_text(self.content()).await
    }
}

/// Transform `text` with `renderer`'s pipeline, leaving both contents alone.
pub async fn render_text_by(renderer: &dyn Renderable, text: &str) -> Result<String, ConvertError> {
    renderer.render_text(text).await
}

/// Replace `{{ name }}` with the attribute's value; unknown names stay as written.
pub fn substitute_attributes(text: &str, attributes: &Attributes) -> String {
    RE_ATTRIBUTE
        .replace_all(text, |caps: &Captures<'_>| match attributes.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Base fragment: attribute substitution, optionally composed of children.
///
/// A fragment with children renders them in order and concatenates the
/// results; without children it renders its own content.
pub struct DocumentFragment {
    content: String,
    attributes: Arc<Attributes>,
    children: Vec<Box<dyn Renderable>>,
}

impl DocumentFragment {
    pub fn new(content: impl Into<String>, attributes: Arc<Attributes>) -> Self {
        Self {
            content: content.into(),
            attributes,
            children: Vec::new(),
        }
    }

    /// A fragment whose content is the concatenation of `children`.
    pub fn composite(children: Vec<Box<dyn Renderable>>, attributes: Arc<Attributes>) -> Self {
        let content = children
            .iter()
            .map(|c| c.content())
            .collect::<Vec<_>>()
            .join("\n\n");
        Self {
            content,
            attributes,
            children,
        }
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn children(&self) -> &[Box<dyn Renderable>] {
        &self.children
    }
}

#[async_trait]
impl Renderable for DocumentFragment {
    fn content(&self) -> &str {
        &self.content
    }

    async fn render_text(&self, text: &str) -> Result<String, ConvertError> {
        Ok(substitute_attributes(text, &self.attributes))
    }

    async fn render(&self) -> Result<String, ConvertError> {
        if self.children.is_empty() {
            return self.render_text(&self.content).await;
        }
        let mut out = String::new();
        for child in &self.children {
            out.push_str(&child.render().await?);
        }
        Ok(out)
    }
}

/// Markdown section: fragment-level substitution, then the parser.
pub struct MarkdownFragment {
    fragment: DocumentFragment,
    parser: Arc<dyn MarkdownParser>,
}

impl MarkdownFragment {
    pub fn new(
        content: impl Into<String>,
        attributes: Arc<Attributes>,
        parser: Arc<dyn MarkdownParser>,
    ) -> Self {
        Self {
            fragment: DocumentFragment::new(content, attributes),
            parser,
        }
    }
}

#[async_trait]
impl Renderable for MarkdownFragment {
    fn content(&self) -> &str {
        self.fragment.content()
    }

    async fn render_text(&self, text: &str) -> Result<String, ConvertError> {
        let substituted = self.fragment.render_text(text).await?;
        self.parser.render(&substituted).await
    }
}

/// Header or footer: own content, rendered through another node's pipeline.
///
/// Templates are never Markdown-parsed; by default they borrow the
/// attribute substitution of a plain [`DocumentFragment`].
pub struct TemplateFragment {
    content: String,
    pipeline: Arc<dyn Renderable>,
}

impl TemplateFragment {
    pub fn new(content: impl Into<String>, pipeline: Arc<dyn Renderable>) -> Self {
        Self {
            content: content.into(),
            pipeline,
        }
    }
}

#[async_trait]
impl Renderable for TemplateFragment {
    fn content(&self) -> &str {
        &self.content
    }

    async fn render_text(&self, text: &str) -> Result<String, ConvertError> {
        render_text_by(self.pipeline.as_ref(), text).await
    }
}
