//! User-facing preview messages
//!
//! The preview surface shows one of these strings whenever it is not
//! displaying handler content. Every message can be overridden in the
//! `[messages]` table of the configuration file.

use serde::{Deserialize, Serialize};

/// Texts shown on the preview surface
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct PreviewMessages {
    /// Shown before any file was requested
    pub initial: String,
    /// Shown while a handler is being negotiated
    pub loading: String,
    /// Shown for zero-length files
    pub empty_file: String,
    /// Shown for paths that do not exist
    pub file_not_found: String,
    /// Shown when the shell host is not available on this platform
    pub non_windows_platform: String,
    /// Shown when no handler could produce a preview
    pub no_preview_available: String,
}

impl Default for PreviewMessages {
    fn default() -> Self {
        Self {
            initial: "Select a file to preview".to_string(),
            loading: "Loading preview...".to_string(),
            empty_file: "The file is empty".to_string(),
            file_not_found: "File not found".to_string(),
            non_windows_platform: "Previews are only available on Windows".to_string(),
            no_preview_available: "No preview available".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_messages_keep_defaults() {
        let messages: PreviewMessages = toml::from_str(r#"loading = "Bitte warten""#).unwrap();
        assert_eq!(messages.loading, "Bitte warten");
        assert_eq!(messages.empty_file, PreviewMessages::default().empty_file);
    }
}
