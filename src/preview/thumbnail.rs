//! Thumbnail rendering
//!
//! Shared by preview sessions and the headless CLI. The requested size is
//! at least [`MIN_THUMBNAIL_SIZE`]; image factories additionally get their
//! request clamped into [`FACTORY_SIZE_RANGE`], because larger requests come
//! back empty and smaller ones may turn transparent pixels black.

use std::ops::RangeInclusive;

use tracing::debug;

use super::error::{PreviewError, Result};
use super::negotiator::Handler;
use super::pixels::{self, PixelBuffer};
use crate::host::{
    AlphaType, HostError, ImageFactory, ImageFlags, ShellHost, Size, ThumbnailProvider,
};

/// Smallest size ever requested from a handler
pub const MIN_THUMBNAIL_SIZE: u32 = 256;

/// Sizes image factories render reliably
pub const FACTORY_SIZE_RANGE: RangeInclusive<u32> = 769..=1280;

/// Size passed to a bitmap handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThumbnailRequest {
    pub size: u32,
    /// Image factory request, clamped into [`FACTORY_SIZE_RANGE`]
    pub clamped: bool,
}

impl ThumbnailRequest {
    #[must_use]
    pub const fn provider(size: u32) -> Self {
        Self {
            size,
            clamped: false,
        }
    }

    #[must_use]
    pub fn factory(size: u32) -> Self {
        Self {
            size: factory_size(size),
            clamped: true,
        }
    }

    /// The same kind of request for a new size
    #[must_use]
    pub fn resized(self, size: u32) -> Self {
        if self.clamped {
            Self::factory(size)
        } else {
            Self::provider(size)
        }
    }

    /// No bigger request of this kind exists
    #[must_use]
    pub fn is_capped(self) -> bool {
        self.clamped && self.size >= *FACTORY_SIZE_RANGE.end()
    }
}

/// A normalized thumbnail and how it was obtained
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedThumbnail {
    pub pixels: PixelBuffer,
    pub request: ThumbnailRequest,
}

impl RenderedThumbnail {
    /// The handler returned less than requested, or cannot be asked for more
    #[must_use]
    pub fn is_biggest(&self) -> bool {
        self.pixels.size().max_side() < self.request.size || self.request.is_capped()
    }
}

/// Size to request for a display area
#[must_use]
pub const fn thumbnail_size(display: Size) -> u32 {
    let side = display.max_side();
    if side > MIN_THUMBNAIL_SIZE {
        side
    } else {
        MIN_THUMBNAIL_SIZE
    }
}

/// Clamp a request into [`FACTORY_SIZE_RANGE`]
#[must_use]
pub fn factory_size(requested: u32) -> u32 {
    requested.clamp(*FACTORY_SIZE_RANGE.start(), *FACTORY_SIZE_RANGE.end())
}

/// Ask an initialized bitmap handler for a thumbnail of `size` pixels
///
/// The native bitmap is released right after it was copied.
///
/// # Errors
///
/// Returns `PreviewError::RenderFailed` if the handler cannot render or the
/// bitmap cannot be copied.
pub fn render<H: ShellHost>(handler: &Handler<H>, size: u32) -> Result<RenderedThumbnail> {
    let (pixels, request) = match handler {
        Handler::Thumbnail(provider) => {
            let request = ThumbnailRequest::provider(size);
            let (bitmap, alpha) = provider
                .get_thumbnail(request.size)
                .map_err(PreviewError::RenderFailed)?;
            (pixels::normalize(&bitmap, alpha)?, request)
        }
        Handler::ImageFactory(factory) => {
            let request = ThumbnailRequest::factory(size);
            let flags = ImageFlags::BIGGER_SIZE_OK | ImageFlags::THUMBNAIL_ONLY;
            let bitmap = factory
                .get_image(Size::square(request.size), flags)
                .map_err(PreviewError::RenderFailed)?;
            (pixels::normalize(&bitmap, AlphaType::Argb)?, request)
        }
        Handler::Interactive(_) => {
            return Err(PreviewError::RenderFailed(HostError::NoInterface));
        }
    };

    debug!(
        requested = request.size,
        width = pixels.width,
        height = pixels.height,
        "rendered thumbnail"
    );
    Ok(RenderedThumbnail { pixels, request })
}
