//! One-shot previews on the calling thread
//!
//! Used by command-line callers that want a handler's details or a bitmap
//! without a rendering surface. Each call enters and leaves the native scope
//! itself, so it may run on any thread not already holding one.

use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use super::error::{PreviewError, Result};
use super::negotiator::{self, Negotiated};
use super::pixels::PixelBuffer;
use super::thumbnail;
use super::types::{PreviewInfo, PreviewRequest};
use crate::host::{ShellHost, ThreadScope};

/// Negotiate and initialize a handler for `path`, then release it
///
/// # Errors
///
/// Returns `PreviewError::Input` for missing or empty files and the
/// negotiation or initialization error otherwise.
pub fn probe_info<H: ShellHost>(host: &Arc<H>, path: &Path) -> Result<PreviewInfo> {
    let request = PreviewRequest::validated(path)?;
    let _scope = ThreadScope::enter(host).map_err(PreviewError::ThreadScope)?;

    let Negotiated { handler, mut info } = negotiator::negotiate(host.as_ref(), &request)?;
    info.initializer_type = handler.initialize(host.as_ref(), request.path())?;
    debug!(interface = %info.interface_type, "probed");
    Ok(info)
}

/// Render a bitmap of `path` at `size` pixels
///
/// Interactive handlers are skipped; only thumbnail providers and the image
/// factory are considered.
///
/// # Errors
///
/// Returns `PreviewError::NoHandlerFound` if no bitmap source exists and the
/// initialization or render error otherwise.
pub fn probe_thumbnail<H: ShellHost>(
    host: &Arc<H>,
    path: &Path,
    size: u32,
) -> Result<(PreviewInfo, PixelBuffer)> {
    let request = PreviewRequest::validated(path)?;
    let _scope = ThreadScope::enter(host).map_err(PreviewError::ThreadScope)?;

    let Negotiated { handler, mut info } =
        negotiator::negotiate_thumbnail(host.as_ref(), &request)?;
    info.initializer_type = handler.initialize(host.as_ref(), request.path())?;
    let rendered = thumbnail::render(&handler, size)?;
    debug!(
        width = rendered.pixels.width,
        height = rendered.pixels.height,
        "rendered thumbnail"
    );
    Ok((info, rendered.pixels))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::mock::{MockEvent, MockHandler, MockHost, MockImage};
    use crate::host::{AlphaType, InitializerKind, InterfaceKind};
    use crate::preview::InputError;
    use crate::testing::Fixtures;

    #[test]
    fn test_probe_info_reports_initializer_and_releases_everything() {
        let fixtures = Fixtures::new();
        let file = fixtures.file("notes.txt", "hello");
        let host = MockHost::new().with_preview_handler(
            ".txt",
            MockHandler::new("{text}")
                .named("Text Previewer")
                .accepting(&[InitializerKind::File]),
        );
        let shared = Arc::new(host.clone());

        let info = probe_info(&shared, &file).unwrap();
        assert_eq!(info.interface_type, InterfaceKind::PreviewHandler);
        assert_eq!(info.initializer_type, Some(InitializerKind::File));
        assert_eq!(info.handler_name, "Text Previewer");
        assert_eq!(host.live_objects(), 0);
        assert_eq!(host.events().last(), Some(&MockEvent::LeaveThread));
    }

    #[test]
    fn test_probe_info_rejects_empty_file_before_entering_scope() {
        let fixtures = Fixtures::new();
        let file = fixtures.file("empty.txt", "");
        let host = MockHost::new();

        let result = probe_info(&Arc::new(host.clone()), &file);
        assert!(matches!(
            result,
            Err(PreviewError::Input(InputError::EmptyFile(_)))
        ));
        assert!(host.events().is_empty());
    }

    #[test]
    fn test_probe_thumbnail_skips_interactive_handlers() {
        let fixtures = Fixtures::new();
        let file = fixtures.file("photo.jpg", "jpeg");
        let host = MockHost::new()
            .with_preview_handler(".jpg", MockHandler::new("{viewer}"))
            .with_image_factory(".jpg", MockImage::new(300, 200, AlphaType::Rgb));
        let shared = Arc::new(host.clone());

        let (info, pixels) = probe_thumbnail(&shared, &file, 256).unwrap();
        assert_eq!(info.interface_type, InterfaceKind::ShellItemImageFactory);
        assert_eq!(info.initializer_type, None);
        assert_eq!((pixels.width, pixels.height), (300, 200));
        assert!(!host.saw(|e| matches!(e, MockEvent::Activate { .. })));
        assert_eq!(host.live_objects(), 0);
    }
}
