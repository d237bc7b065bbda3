//! Markdown → HTML parsers and the host-parser readiness slot.
//!
//! The runner only ever talks to [`MarkdownParser::render`]. The bundled
//! [`ComrakParser`] is always available; a host may additionally provide its
//! own parser through a [`ParserSlot`], which starts out
//! [`ParserAvailability::Pending`] and later becomes `Ready` or `Unavailable`.

use crate::cancel::CancellationToken;
use crate::error::ConvertError;
use async_trait::async_trait;
use comrak::{markdown_to_html, Options};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

/// Render entry point of a Markdown parser.
#[async_trait]
pub trait MarkdownParser: Send + Sync {
    /// Short name used in log messages.
    fn name(&self) -> &str;

    async fn render(&self, markdown: &str) -> Result<String, ConvertError>;
}

/// Bundled CommonMark + GFM parser.
///
/// Raw HTML in the source is passed through, headings get no ids (anchors are
/// assigned during post-processing) and front matter must already be removed.
#[derive(Debug, Clone, Copy, Default)]
pub struct ComrakParser;

impl ComrakParser {
    fn options() -> Options<'static> {
        let mut options = Options::default();
        options.extension.table = true;
        options.extension.strikethrough = true;
        options.extension.autolink = true;
        options.extension.tasklist = true;
        options.extension.footnotes = true;
        options.render.unsafe_ = true;
        options
    }
}

#[async_trait]
impl MarkdownParser for ComrakParser {
    fn name(&self) -> &str {
        "comrak"
    }

    async fn render(&self, markdown: &str) -> Result<String, ConvertError> {
        Ok(markdown_to_html(markdown, &Self::options()))
    }
}

/// Readiness of the host-provided parser.
#[derive(Clone)]
pub enum ParserAvailability {
    Pending,
    Ready(Arc<dyn MarkdownParser>),
    Unavailable,
}

impl fmt::Debug for ParserAvailability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParserAvailability::Pending => f.write_str("Pending"),
            ParserAvailability::Ready(p) => write!(f, "Ready({})", p.name()),
            ParserAvailability::Unavailable => f.write_str("Unavailable"),
        }
    }
}

/// Holds the host parser once the host signals it.
#[derive(Debug)]
pub struct ParserSlot {
    state: watch::Sender<ParserAvailability>,
}

impl ParserSlot {
    pub fn new() -> Self {
        let (state, _) = watch::channel(ParserAvailability::Pending);
        Self { state }
    }

    /// A slot that is already resolved to `parser`.
    pub fn ready(parser: Arc<dyn MarkdownParser>) -> Self {
        let slot = Self::new();
        slot.provide(parser);
        slot
    }

    pub fn provide(&self, parser: Arc<dyn MarkdownParser>) {
        debug!("Host parser '{}' is ready", parser.name());
        self.state.send_replace(ParserAvailability::Ready(parser));
    }

    /// The host will never provide a parser.
    pub fn mark_unavailable(&self) {
        debug!("Host parser marked unavailable");
        self.state.send_replace(ParserAvailability::Unavailable);
    }

    pub fn availability(&self) -> ParserAvailability {
        self.state.borrow().clone()
    }

    /// Wait until the slot leaves `Pending`.
    ///
    /// Returns the parser, or `None` if the host reported it unavailable.
    pub async fn wait(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Option<Arc<dyn MarkdownParser>>, ConvertError> {
        let mut rx = self.state.subscribe();
        let waited = cancel
            .run_until_cancelled(async move {
                rx.wait_for(|s| !matches!(s, ParserAvailability::Pending))
                    .await
                    .map(|state| state.clone())
            })
            .await?;
        match waited {
            Ok(ParserAvailability::Ready(parser)) => Ok(Some(parser)),
            Ok(_) => Ok(None),
            Err(_) => Err(ConvertError::Internal(
                "parser readiness channel closed".into(),
            )),
        }
    }
}

impl Default for ParserSlot {
    fn default() -> Self {
        Self::new()
    }
}
