//! Image encoding: browser screenshots (PNG) → requested raster format.
//!
//! The browser only produces PNG screenshots. JPEG output is re-encoded here
//! with the configured quality; alpha is flattened because JPEG has none.

use crate::error::FormatError;
use crate::settings::OutputFormat;
use image::codecs::jpeg::JpegEncoder;
use tracing::debug;

/// Convert PNG bytes into `format`. PNG passes through untouched.
pub fn encode_screenshot(
    png: Vec<u8>,
    format: OutputFormat,
    quality: u8,
) -> Result<Vec<u8>, FormatError> {
    match format {
        OutputFormat::Jpeg => png_to_jpeg(&png, quality),
        _ => Ok(png),
    }
}

/// Re-encode a PNG as JPEG with `quality` (clamped to 1–100).
pub fn png_to_jpeg(png: &[u8], quality: u8) -> Result<Vec<u8>, FormatError> {
    let encode_error = |e: image::ImageError| FormatError::Encode {
        format: OutputFormat::Jpeg,
        detail: e.to_string(),
    };

    let rgb = image::load_from_memory(png).map_err(encode_error)?.to_rgb8();
    let mut buf = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100));
    rgb.write_with_encoder(encoder).map_err(encode_error)?;

    debug!(
        "Encoded {}x{} screenshot → {} bytes JPEG (quality {})",
        rgb.width(),
        rgb.height(),
        buf.len(),
        quality
    );
    Ok(buf)
}
