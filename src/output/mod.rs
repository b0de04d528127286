//! Output formatting for CLI display
//!
//! This module provides utilities for formatting preview details in the CLI:
//! labelled fields, human readable file sizes and the one-line summaries the
//! commands print.

use byte_unit::{Byte, UnitType};
use colored::Colorize;
use std::path::Path;

use crate::host::Size;
use crate::preview::PreviewInfo;

/// Width the field labels are padded to
const LABEL_WIDTH: usize = 12;

/// Format a labelled field
#[must_use]
pub fn field(label: &str, value: &str) -> String {
    let label = format!("{label}:");
    format!("{} {value}", format!("{label:<width$}", width = LABEL_WIDTH).bold())
}

/// Human readable size in binary units
#[must_use]
pub fn file_size(bytes: u64) -> String {
    let adjusted = Byte::from_u64(bytes).get_appropriate_unit(UnitType::Binary);
    format!("{adjusted:.1}")
}

/// Every detail of a negotiated preview, one field per line
#[must_use]
pub fn preview_info(info: &PreviewInfo, size: Option<u64>) -> Vec<String> {
    let mut lines = vec![field("File", &info.file.display().to_string())];
    if let Some(bytes) = size {
        lines.push(field("Size", &file_size(bytes)));
    }
    lines.push(field("Extension", &info.file_extension));
    lines.push(field(
        "Interface",
        &format!("{} {}", info.interface_type.to_string().green(), info.iid),
    ));
    if !info.clsid.is_empty() {
        lines.push(field("CLSID", &info.clsid));
    }
    if !info.handler_name.is_empty() {
        lines.push(field("Handler", &info.handler_name));
    }
    let initializer = info
        .initializer_type
        .map_or_else(|| "(none)".dimmed().to_string(), |kind| kind.to_string());
    lines.push(field("Initializer", &initializer));
    lines
}

/// Summary printed after a thumbnail was written
#[must_use]
pub fn thumbnail_written(path: &Path, size: Size, quiet: bool) -> String {
    if quiet {
        path.display().to_string()
    } else {
        format!(
            "Wrote {}x{} thumbnail to {}",
            size.width,
            size.height,
            path.display().to_string().green()
        )
    }
}
