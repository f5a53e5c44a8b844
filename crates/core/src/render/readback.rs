//! Pixel readback from the bound read framebuffer.

use super::api::FramebufferApi;
use super::fbo::gl_dimensions;
use crate::error::ContextError;
use crate::gl_check;

/// Reads `width * height` RGBA8 pixels. Rows come back bottom-to-top, the
/// GL convention; use [`flip_rows`] before handing them to an image writer.
///
/// # Errors
///
/// Returns `InvalidAttributes` if either dimension is zero or exceeds
/// `i32::MAX`.
pub fn read_rgba<G: FramebufferApi + ?Sized>(
    gl: &G,
    width: u32,
    height: u32,
) -> Result<Vec<u8>, ContextError> {
    let (w, h) = gl_dimensions(width, height)?;
    let mut pixels = vec![0u8; width as usize * height as usize * 4];
    gl_check!(gl, gl.read_rgba(w, h, &mut pixels));
    Ok(pixels)
}

/// Reverses row order in place for a tightly packed RGBA8 buffer.
pub fn flip_rows(pixels: &mut [u8], width: u32, height: u32) {
    let stride = width as usize * 4;
    let rows = height as usize;
    if stride == 0 || pixels.len() < stride * rows {
        return;
    }
    let (mut top, mut bottom) = (0, rows.saturating_sub(1));
    while top < bottom {
        let (head, tail) = pixels.split_at_mut(bottom * stride);
        head[top * stride..(top + 1) * stride].swap_with_slice(&mut tail[..stride]);
        top += 1;
        bottom -= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::mock::{Call, RecordingGl};

    #[test]
    fn read_rgba_returns_four_bytes_per_pixel() {
        let gl = RecordingGl::new();
        let pixels = read_rgba(&gl, 3, 2).unwrap();
        assert_eq!(pixels.len(), 3 * 2 * 4);
        assert_eq!(gl.calls(), vec![Call::ReadPixels { width: 3, height: 2 }]);
    }

    #[test]
    fn read_rgba_rejects_zero_dimensions() {
        let gl = RecordingGl::new();
        assert!(read_rgba(&gl, 0, 2).is_err());
        assert!(gl.calls().is_empty());
    }

    #[test]
    fn flip_rows_reverses_row_order() {
        let gl = RecordingGl::new();
        let mut pixels = read_rgba(&gl, 2, 3).unwrap();
        // The recording GL fills each pixel's red channel with its row index.
        assert_eq!(pixels[0], 0);
        flip_rows(&mut pixels, 2, 3);
        let reds: Vec<u8> = pixels.chunks_exact(4).map(|px| px[0]).collect();
        assert_eq!(reds, vec![2, 2, 1, 1, 0, 0]);
    }

    #[test]
    fn flip_rows_twice_is_identity() {
        let original: Vec<u8> = (0..=255).cycle().take(5 * 4 * 4).collect();
        let mut pixels = original.clone();
        flip_rows(&mut pixels, 5, 4);
        assert_ne!(pixels, original);
        flip_rows(&mut pixels, 5, 4);
        assert_eq!(pixels, original);
    }

    #[test]
    fn flip_rows_ignores_short_buffers() {
        let mut pixels = vec![1u8, 2, 3];
        flip_rows(&mut pixels, 4, 4);
        assert_eq!(pixels, vec![1, 2, 3]);
    }
}
