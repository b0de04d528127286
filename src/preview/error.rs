//! Preview error types

use std::path::PathBuf;

use thiserror::Error;

use crate::config::PreviewMessages;
use crate::host::{ClassId, HostError};

/// Problems with the requested file, detected before any session exists
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InputError {
    /// The path does not exist
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// The file has no content
    #[error("File is empty: {}", .0.display())]
    EmptyFile(PathBuf),

    /// The path exists but cannot be inspected
    #[error("Cannot read {}: {reason}", path.display())]
    Unreadable {
        path: PathBuf,
        reason: String,
    },
}

/// Errors that can occur while acquiring or rendering a preview
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PreviewError {
    /// No component of any kind is registered for the extension
    #[error("No preview handler registered")]
    NoHandlerFound,

    /// A component is registered but could not be instantiated
    #[error("Error with CLSID={class_id}: 0x{code:08x}")]
    ActivationFailed {
        class_id: ClassId,
        code: u32,
    },

    /// The component rejected every input method
    #[error("Failed to initialize preview handler")]
    InitializationFailed,

    /// A bitmap or rendering call failed
    #[error("Rendering failed: {0}")]
    RenderFailed(HostError),

    #[error(transparent)]
    Input(#[from] InputError),

    /// The worker thread could not initialize the native subsystem
    #[error("Thread initialization failed: {0}")]
    ThreadScope(HostError),

    /// A task on the session worker panicked
    #[error("Preview worker panicked: {0}")]
    WorkerPanicked(String),

    /// The session worker thread could not be started
    #[error("Failed to start preview worker: {0}")]
    WorkerSpawn(String),

    /// The shell host is not available on this platform
    #[error("Previews are not supported on this platform")]
    UnsupportedPlatform,
}

impl PreviewError {
    /// Text shown on the preview surface for this failure
    #[must_use]
    pub fn user_message(&self, messages: &PreviewMessages) -> String {
        match self {
            Self::NoHandlerFound | Self::RenderFailed(_) => messages.no_preview_available.clone(),
            Self::ActivationFailed { .. } => self.to_string(),
            Self::Input(InputError::FileNotFound(_)) => messages.file_not_found.clone(),
            Self::Input(InputError::EmptyFile(_)) => messages.empty_file.clone(),
            Self::UnsupportedPlatform => messages.non_windows_platform.clone(),
            other => format!("Error: {other}"),
        }
    }
}

/// Result type for preview operations
pub type Result<T> = std::result::Result<T, PreviewError>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod error_tests;
