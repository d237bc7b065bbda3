//! Pipeline stages for Markdown-to-document conversion.
//!
//! Each submodule implements one transformation step, so every stage can be
//! tested on its own and swapped (a host parser, another browser, another
//! PDF library) without touching the others.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ parser ──▶ postprocess ──▶ render ──▶ encode      merge
//! (file)    (comrak)   (anchors/TOC/   (Chrome)   (PNG→JPEG)  (lopdf, reports)
//!                       emoji/assets)
//! ```
//!
//! 1. [`input`]: load the source document, detect its workspace, resolve
//!    header/footer template values
//! 2. [`parser`]: Markdown → HTML through the bundled or a host parser
//! 3. [`postprocess`]: ordered HTML passes; [`emoji`] holds the shortcode table
//! 4. [`render`]: HTML → PDF / screenshot in headless Chrome; the only stage
//!    that spawns a process
//! 5. [`encode`]: re-encode screenshots for JPEG output
//! 6. [`merge`]: concatenate PDFs into a report

pub mod emoji;
pub mod encode;
pub mod input;
pub mod merge;
pub mod parser;
pub mod postprocess;
pub mod render;
