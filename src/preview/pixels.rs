//! Native bitmap normalization
//!
//! Handlers hand back device-independent bitmaps in top-down 32-bit BGRA
//! order. The engine and the CLI work with [`PixelBuffer`], a plain RGBA
//! buffer that can be painted by any toolkit or encoded with `image`.

use image::RgbaImage;

use super::error::{PreviewError, Result};
use crate::host::{AlphaType, HostError, NativeBitmap, Size};

const BYTES_PER_PIXEL: usize = 4;

/// Top-down RGBA pixels
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    pub width: u32,
    pub height: u32,
    /// `width * height * 4` bytes, row-major, no padding
    pub data: Vec<u8>,
}

impl PixelBuffer {
    #[must_use]
    pub const fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    /// RGBA bytes of the pixel at `(x, y)`
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * BYTES_PER_PIXEL;
        self.data
            .get(offset..offset + BYTES_PER_PIXEL)
            .and_then(|px| px.try_into().ok())
    }

    /// Copy into an `image` buffer for encoding
    #[must_use]
    pub fn to_image(&self) -> Option<RgbaImage> {
        RgbaImage::from_raw(self.width, self.height, self.data.clone())
    }
}

/// Convert BGRA bytes of a `size` bitmap into RGBA
///
/// Without a meaningful alpha channel every alpha byte becomes opaque.
///
/// # Errors
///
/// Returns `PreviewError::RenderFailed` if `bgra` does not hold exactly one
/// 32-bit pixel per bitmap pixel.
pub fn normalize_pixels(bgra: &[u8], size: Size, alpha: AlphaType) -> Result<PixelBuffer> {
    let expected = size.width as usize * size.height as usize * BYTES_PER_PIXEL;
    if bgra.len() != expected {
        return Err(PreviewError::RenderFailed(HostError::Unavailable(format!(
            "bitmap copy returned {} bytes, expected {expected}",
            bgra.len()
        ))));
    }

    let keep_alpha = alpha.has_alpha();
    let mut data = Vec::with_capacity(expected);
    for px in bgra.chunks_exact(BYTES_PER_PIXEL) {
        data.extend_from_slice(&[px[2], px[1], px[0], if keep_alpha { px[3] } else { 0xff }]);
    }

    Ok(PixelBuffer {
        width: size.width,
        height: size.height,
        data,
    })
}

/// Read a native bitmap into a [`PixelBuffer`]
///
/// # Errors
///
/// Returns `PreviewError::RenderFailed` if the bitmap cannot be queried or copied.
pub fn normalize<B: NativeBitmap + ?Sized>(bitmap: &B, alpha: AlphaType) -> Result<PixelBuffer> {
    let size = bitmap.size().map_err(PreviewError::RenderFailed)?;
    let bgra = bitmap.read_bgra(size).map_err(PreviewError::RenderFailed)?;
    normalize_pixels(&bgra, size, alpha)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<u8> {
        vec![
            10, 20, 30, 0, //
            40, 50, 60, 128, //
            70, 80, 90, 255, //
            1, 2, 3, 4,
        ]
    }

    #[test]
    fn test_swizzles_bgra_to_rgba() {
        let buffer = normalize_pixels(&sample(), Size::new(2, 2), AlphaType::Argb).unwrap();
        assert_eq!(buffer.pixel(0, 0), Some([30, 20, 10, 0]));
        assert_eq!(buffer.pixel(1, 0), Some([60, 50, 40, 128]));
        assert_eq!(buffer.pixel(1, 1), Some([3, 2, 1, 4]));
        assert_eq!(buffer.pixel(2, 0), None);
    }

    #[test]
    fn test_no_alpha_hint_forces_opaque() {
        for alpha in [AlphaType::Rgb, AlphaType::Unknown] {
            let buffer = normalize_pixels(&sample(), Size::new(2, 2), alpha).unwrap();
            assert!(buffer.data.chunks_exact(4).all(|px| px[3] == 0xff));
        }
    }

    #[test]
    fn test_normalization_is_deterministic() {
        let first = normalize_pixels(&sample(), Size::new(4, 1), AlphaType::Argb).unwrap();
        let second = normalize_pixels(&sample(), Size::new(4, 1), AlphaType::Argb).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_length_mismatch_is_render_failure() {
        let short = normalize_pixels(&sample()[..12], Size::new(2, 2), AlphaType::Rgb);
        assert!(matches!(short, Err(PreviewError::RenderFailed(_))));

        let long = normalize_pixels(&sample(), Size::new(1, 1), AlphaType::Rgb);
        assert!(matches!(long, Err(PreviewError::RenderFailed(_))));
    }

    #[test]
    fn test_to_image_keeps_dimensions() {
        let buffer = normalize_pixels(&sample(), Size::new(2, 2), AlphaType::Argb).unwrap();
        let image = buffer.to_image().unwrap();
        assert_eq!(image.dimensions(), (2, 2));
        assert_eq!(image.get_pixel(1, 0).0, [60, 50, 40, 128]);
    }
}
