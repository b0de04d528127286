//! Thumbnail command - render a file's thumbnail into a PNG

use std::path::Path;
use std::sync::Arc;

use image::ImageFormat;
use tracing::info;

use crate::{PeekrError, Result, host::ShellHost, host::Size, preview};

/// Execute the thumbnail command, returning the size of the written image
///
/// # Errors
/// Returns an error if no bitmap source exists, rendering fails or the PNG
/// cannot be written
pub fn execute<H: ShellHost>(
    host: &Arc<H>,
    file: &Path,
    output: &Path,
    size: u32,
) -> Result<Size> {
    if size == 0 {
        return Err(PeekrError::InvalidInput("thumbnail size must be positive".into()));
    }

    let (preview_info, pixels) = preview::probe_thumbnail(host, file, size)?;
    let image = pixels.to_image().ok_or_else(|| {
        PeekrError::InvalidInput(format!(
            "thumbnail buffer does not match {}x{}",
            pixels.width, pixels.height
        ))
    })?;
    image.save_with_format(output, ImageFormat::Png)?;

    info!(
        interface = %preview_info.interface_type,
        output = %output.display(),
        "thumbnail written"
    );
    Ok(pixels.size())
}
