//! PNG output for framebuffer readback.

use crate::error::CliError;
use offscreen_gl_core::render::flip_rows;
use std::path::Path;

/// Writes bottom-to-top RGBA8 rows from `glReadPixels` as a PNG.
///
/// Rows are flipped in place first so the image is upright.
pub fn write_png(
    mut pixels: Vec<u8>,
    width: u32,
    height: u32,
    path: &Path,
) -> Result<(), CliError> {
    flip_rows(&mut pixels, width, height);
    let img = image::RgbaImage::from_raw(width, height, pixels)
        .ok_or_else(|| CliError::Io("RGBA buffer size mismatch".into()))?;
    img.save(path)
        .map_err(|e| CliError::Io(format!("unable to write {}: {e}", path.display())))
}
