//! Theme values handed to interactive handlers

use tracing::{debug, warn};

use crate::config::{Color, FontSpec, PreviewSettings};
use crate::host::{ColorRef, LogFont, PreviewVisuals};

const FW_NORMAL: i32 = 400;
const FW_BOLD: i32 = 700;

/// Native color reference, dropping the alpha channel
#[must_use]
pub fn color_ref(color: Color) -> ColorRef {
    ColorRef((u32::from(color.blue) << 16) | (u32::from(color.green) << 8) | u32::from(color.red))
}

/// Native logical font for a configured font
///
/// The face name is truncated so the terminator always fits.
#[must_use]
pub fn log_font(font: &FontSpec) -> LogFont {
    let mut face_name = [0u16; LogFont::FACE_SIZE];
    for (slot, unit) in face_name
        .iter_mut()
        .take(LogFont::FACE_SIZE - 1)
        .zip(font.face.encode_utf16())
    {
        *slot = unit;
    }

    LogFont {
        height: -font.size_pt,
        weight: if font.bold { FW_BOLD } else { FW_NORMAL },
        italic: font.italic,
        face_name,
    }
}

/// Apply the configured colors and font
///
/// Individual failures are logged; the handler keeps its own defaults for them.
pub fn apply<V: PreviewVisuals + ?Sized>(visuals: &V, settings: &PreviewSettings) {
    if let Some(color) = settings.background_color {
        if let Err(e) = visuals.set_background_color(color_ref(color)) {
            warn!(error = %e, "handler rejected background color");
        }
    }
    if let Some(color) = settings.text_color {
        if let Err(e) = visuals.set_text_color(color_ref(color)) {
            warn!(error = %e, "handler rejected text color");
        }
    }
    if let Some(font) = &settings.font {
        if let Err(e) = visuals.set_font(&log_font(font)) {
            warn!(error = %e, "handler rejected font");
        }
    }
    debug!("applied visuals");
}
