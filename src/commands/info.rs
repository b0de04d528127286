//! Info command - show which handler previews a file

use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use crate::{Result, host::ShellHost, output, preview};

/// Execute the info command
///
/// # Errors
/// Returns an error if no handler can be negotiated or output fails
pub fn execute<H: ShellHost>(
    host: &Arc<H>,
    file: &Path,
    json: bool,
    out: &mut impl Write,
) -> Result<()> {
    let info = preview::probe_info(host, file)?;

    if json {
        writeln!(out, "{}", serde_json::to_string_pretty(&info)?)?;
    } else {
        let size = fs::metadata(file).ok().map(|m| m.len());
        for line in output::preview_info(&info, size) {
            writeln!(out, "{line}")?;
        }
    }
    Ok(())
}
