//! Configuration module for peekr
//!
//! Manages the preview settings: theme colors and font handed to preview
//! handlers, thumbnail layout, surface behavior, user-facing messages and
//! watchdog timings. Configuration is stored in the user's config directory.

mod messages;

pub use messages::PreviewMessages;

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use config::{Config, ConfigError, File, FileFormat};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Invalid color literal
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Invalid color '{0}': expected #RRGGBB or #AARRGGBB")]
pub struct InvalidColor(pub String);

/// Color written as `#RRGGBB` or `#AARRGGBB`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
    pub alpha: u8,
}

impl Color {
    /// Fully opaque color
    #[must_use]
    pub const fn rgb(red: u8, green: u8, blue: u8) -> Self {
        Self {
            red,
            green,
            blue,
            alpha: 0xff,
        }
    }

    #[must_use]
    pub const fn with_alpha(mut self, alpha: u8) -> Self {
        self.alpha = alpha;
        self
    }
}

impl FromStr for Color {
    type Err = InvalidColor;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidColor(s.to_string());
        let hex = s.trim().strip_prefix('#').ok_or_else(invalid)?;
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(invalid());
        }
        let value = u32::from_str_radix(hex, 16).map_err(|_| invalid())?;
        let [a, r, g, b] = value.to_be_bytes();
        match hex.len() {
            6 => Ok(Self::rgb(r, g, b)),
            8 => Ok(Self::rgb(r, g, b).with_alpha(a)),
            _ => Err(invalid()),
        }
    }
}

impl TryFrom<String> for Color {
    type Error = InvalidColor;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.to_string()
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.alpha == 0xff {
            write!(f, "#{:02X}{:02X}{:02X}", self.red, self.green, self.blue)
        } else {
            write!(
                f,
                "#{:02X}{:02X}{:02X}{:02X}",
                self.alpha, self.red, self.green, self.blue
            )
        }
    }
}

/// Font handed to preview handlers that accept visual customization
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct FontSpec {
    /// Font family name
    pub face: String,
    /// Size in points
    pub size_pt: i32,
    #[serde(default)]
    pub bold: bool,
    #[serde(default)]
    pub italic: bool,
}

impl FontSpec {
    #[must_use]
    pub fn new(face: impl Into<String>, size_pt: i32) -> Self {
        Self {
            face: face.into(),
            size_pt,
            bold: false,
            italic: false,
        }
    }
}

/// Margins around the thumbnail area, in pixels
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Insets {
    pub top: u32,
    pub left: u32,
    pub bottom: u32,
    pub right: u32,
}

impl Insets {
    #[must_use]
    pub const fn uniform(value: u32) -> Self {
        Self {
            top: value,
            left: value,
            bottom: value,
            right: value,
        }
    }

    /// Width left for content inside `width`
    #[must_use]
    pub const fn inner_width(&self, width: u32) -> u32 {
        width.saturating_sub(self.left.saturating_add(self.right))
    }
}

/// Timings of the unload watchdog
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct WatchdogSettings {
    /// Interval between registry sweeps
    pub sweep_interval_ms: u64,
    /// How long a session may spend unloading before its worker is abandoned
    pub unload_timeout_ms: u64,
}

impl WatchdogSettings {
    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    #[must_use]
    pub const fn unload_timeout(&self) -> Duration {
        Duration::from_millis(self.unload_timeout_ms)
    }
}

impl Default for WatchdogSettings {
    fn default() -> Self {
        Self {
            sweep_interval_ms: 10_000,
            unload_timeout_ms: 60_000,
        }
    }
}

/// Preview configuration structure
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct PreviewSettings {
    /// Background color for handlers that accept visuals
    pub background_color: Option<Color>,

    /// Text color for handlers that accept visuals
    pub text_color: Option<Color>,

    /// Font for handlers that accept visuals
    pub font: Option<FontSpec>,

    /// Margins around rendered thumbnails
    pub thumbnail_insets: Insets,

    /// Open the file with its default application on double click
    pub open_on_double_click: bool,

    /// Paint a checkered background behind transparent thumbnails
    pub checkered_background: bool,

    pub messages: PreviewMessages,

    pub watchdog: WatchdogSettings,
}

impl Default for PreviewSettings {
    fn default() -> Self {
        Self {
            background_color: None,
            text_color: None,
            font: None,
            thumbnail_insets: Insets::default(),
            open_on_double_click: true,
            checkered_background: true,
            messages: PreviewMessages::default(),
            watchdog: WatchdogSettings::default(),
        }
    }
}

impl PreviewSettings {
    /// Get the path to the config file
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the system config directory cannot be determined.
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or_else(|| {
            ConfigError::Message("Could not determine config directory".to_string())
        })?;

        Ok(config_dir.join("peekr").join("config.toml"))
    }

    /// Load configuration from file, creating default if it doesn't exist
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the config file cannot be read, parsed, or created.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from an explicit path, creating default if it doesn't exist
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the config file cannot be read, parsed, or created.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            let default_config = Self::default();
            default_config.save_to(path)?;
            return Ok(default_config);
        }

        let settings = Config::builder()
            .add_source(File::from(path).format(FileFormat::Toml))
            .build()?;

        settings.try_deserialize()
    }

    /// Save configuration to file
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the config directory cannot be created, the configuration
    /// cannot be serialized to TOML, or the file cannot be written.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path()?)
    }

    /// Save configuration to an explicit path
    ///
    /// # Errors
    ///
    /// Same as [`PreviewSettings::save`].
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                ConfigError::Message(format!("Failed to create config directory: {e}"))
            })?;
        }

        let toml_string = self.to_toml()?;

        fs::write(path, toml_string)
            .map_err(|e| ConfigError::Message(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Render the configuration as TOML
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the configuration cannot be serialized.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Message(format!("Failed to serialize config: {e}")))
    }
}
