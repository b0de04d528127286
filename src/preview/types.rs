//! Preview data types

use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::error::InputError;
use super::pixels::PixelBuffer;
use crate::host::{ClassId, InitializerKind, InterfaceKind, Size, WindowHandle};

/// Association key used when a file has no extension
pub const WILDCARD_EXTENSION: &str = "*";

/// A file to preview together with its association key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewRequest {
    path: PathBuf,
    extension: String,
}

impl PreviewRequest {
    /// Build a request without touching the file system
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let extension = extension_of(&path);
        Self { path, extension }
    }

    /// Build a request for an existing, non-empty file
    ///
    /// # Errors
    ///
    /// Returns `InputError::FileNotFound` for a missing path, `InputError::EmptyFile`
    /// for a zero-length file and `InputError::Unreadable` if the metadata cannot be read.
    pub fn validated(path: impl Into<PathBuf>) -> Result<Self, InputError> {
        let path = path.into();
        match fs::metadata(&path) {
            Ok(meta) if meta.is_file() && meta.len() == 0 => Err(InputError::EmptyFile(path)),
            Ok(_) => Ok(Self::new(path)),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(InputError::FileNotFound(path)),
            Err(e) => Err(InputError::Unreadable {
                path,
                reason: e.to_string(),
            }),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `.ext` or [`WILDCARD_EXTENSION`]
    #[must_use]
    pub fn extension(&self) -> &str {
        &self.extension
    }
}

/// Association key for a path: `.` plus its final extension, or `*`
#[must_use]
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .map_or_else(|| WILDCARD_EXTENSION.to_string(), |ext| format!(".{}", ext.to_string_lossy()))
}

/// Details about a negotiated preview
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewInfo {
    pub file: PathBuf,
    pub file_extension: String,
    pub interface_type: InterfaceKind,
    pub iid: String,
    /// Empty for the image factory path
    pub clsid: String,
    /// Display name registered for the component, empty when unknown
    pub handler_name: String,
    /// `None` until the handler accepted an input method; always `None` for image factories
    pub initializer_type: Option<InitializerKind>,
}

impl PreviewInfo {
    #[must_use]
    pub fn new(
        request: &PreviewRequest,
        interface_type: InterfaceKind,
        class_id: Option<&ClassId>,
        handler_name: Option<String>,
    ) -> Self {
        Self {
            file: request.path().to_path_buf(),
            file_extension: request.extension().to_string(),
            interface_type,
            iid: interface_type.iid().to_string(),
            clsid: class_id.map(ToString::to_string).unwrap_or_default(),
            handler_name: handler_name.unwrap_or_default(),
            initializer_type: None,
        }
    }
}

/// What the surface is currently showing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PreviewMode {
    /// A message, or nothing
    #[default]
    None,
    /// The handler paints into the surface window itself
    Interactive,
    /// A normalized bitmap painted by the surface
    Thumbnail,
}

/// Lifecycle of a preview session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Created,
    Negotiating,
    InteractiveActive,
    ThumbnailReady,
    Failed,
    Unloading,
    Terminal,
}

impl Phase {
    /// Whether the session reached a stable displaying state
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::InteractiveActive | Self::ThumbnailReady)
    }
}

/// Identifier of a preview session, unique within an engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Everything the surface needs to paint
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisplaySnapshot {
    pub mode: PreviewMode,
    /// Text to show when no preview content is displayed
    pub message: Option<String>,
    /// Thumbnail pixels, only in [`PreviewMode::Thumbnail`]
    pub pixels: Option<Arc<PixelBuffer>>,
}

impl DisplaySnapshot {
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            mode: PreviewMode::None,
            message: Some(message.into()),
            pixels: None,
        }
    }
}

/// Rendering surface the engine draws to
///
/// Implemented by the embedding UI. Repaint requests come from worker threads
/// and must not block.
pub trait Surface: Send + Sync + 'static {
    /// Native window interactive handlers paint into, if one exists yet
    ///
    /// An interactive preview requested before the window exists loads on the
    /// first [`PreviewEngine::bounds_changed`](super::PreviewEngine::bounds_changed)
    /// after it appeared.
    fn window(&self) -> Option<WindowHandle>;

    /// Current size of the preview area
    fn bounds(&self) -> Size;

    /// Ask the surface to repaint from the latest [`DisplaySnapshot`]
    fn request_repaint(&self);
}
