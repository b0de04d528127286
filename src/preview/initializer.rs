//! Handler input negotiation
//!
//! Handlers accept the file through one of three input methods. They are
//! tried in the fixed order of [`InitializerKind::PRIORITY`]: a read-only
//! stream first, then the file path, then a shell item. A method the handler
//! does not expose is skipped; one it exposes but rejects falls through to
//! the next. Objects created for a rejected attempt are dropped before the
//! next attempt starts.

use std::path::Path;

use tracing::debug;

use super::error::{PreviewError, Result};
use crate::host::{HostResult, Initialize, InitializerKind, ShellHost};

/// Hand `path` to `component` through the first input method it accepts
///
/// # Errors
///
/// Returns `PreviewError::InitializationFailed` if every method was skipped or rejected.
pub fn initialize<H, C>(host: &H, component: &C, path: &Path) -> Result<InitializerKind>
where
    H: ShellHost,
    C: Initialize<H> + ?Sized,
{
    for kind in InitializerKind::PRIORITY {
        if !component.supports(kind) {
            debug!(initializer = %kind, "not exposed");
            continue;
        }
        match attempt(host, component, path, kind) {
            Ok(()) => {
                debug!(initializer = %kind, "accepted");
                return Ok(kind);
            }
            Err(e) => debug!(initializer = %kind, error = %e, "rejected"),
        }
    }
    Err(PreviewError::InitializationFailed)
}

fn attempt<H, C>(host: &H, component: &C, path: &Path, kind: InitializerKind) -> HostResult<()>
where
    H: ShellHost,
    C: Initialize<H> + ?Sized,
{
    match kind {
        InitializerKind::Stream => {
            let stream = host.open_stream(path)?;
            component.initialize_with_stream(&stream)
        }
        InitializerKind::File => component.initialize_with_file(path),
        InitializerKind::Item => {
            let item = host.resolve_item(path)?;
            component.initialize_with_item(&item)
        }
    }
}
