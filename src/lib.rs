//! Peekr - host shell preview handlers and thumbnail providers
//!
//! This library finds the preview handler, thumbnail provider or image factory
//! the operating system registers for a file, activates it, negotiates how it
//! reads the file and either hosts it inside a window region or renders a
//! bitmap. Superseded previews are torn down asynchronously, and a watchdog
//! abandons teardowns that hang.
//!
//! The native shell sits behind [`host::ShellHost`]; [`host::mock`] provides a
//! scriptable implementation for tests and non-Windows embedders.

use thiserror::Error;

pub mod cli;
pub mod commands;
pub mod config;
pub mod host;
pub mod logging;
pub mod output;
pub mod preview;
pub mod worker;

#[cfg(test)]
pub mod testing;

/// Error enum, contains all failure states of the program
#[derive(Debug, Error)]
pub enum PeekrError {
    /// Preview acquisition error
    #[error("{0}")]
    Preview(#[from] preview::PreviewError),
    /// Represents a configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ::config::ConfigError),
    /// Represents an I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Thumbnail encoding error
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
    /// JSON output error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// Preview commands need the Windows shell
    #[error("{0}")]
    UnsupportedPlatform(String),
    /// Invalid input error
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for command-level operations
pub type Result<T> = std::result::Result<T, PeekrError>;
