//! Testing utilities for peekr
//!
//! Helpers for building fixture files and started engines backed by the
//! mock shell host.
//!
//! Only available when compiled with `cfg(test)`.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use crate::config::{PreviewSettings, WatchdogSettings};
use crate::host::Size;
use crate::host::mock::{MockHost, MockSurface};
use crate::preview::PreviewEngine;

/// Upper bound for waiting on asynchronous session work
pub const TIMEOUT: Duration = Duration::from_secs(5);

/// Directory of fixture files removed on drop
pub struct Fixtures {
    dir: TempDir,
}

impl Fixtures {
    /// # Panics
    /// Panics if the temporary directory cannot be created.
    #[must_use]
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create fixture directory"),
        }
    }

    /// Write a file with `contents` and return its path
    ///
    /// # Panics
    /// Panics if the file cannot be written.
    pub fn file(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        fs::write(&path, contents).expect("Failed to write fixture");
        path
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

impl Default for Fixtures {
    fn default() -> Self {
        Self::new()
    }
}

/// Settings with a fast watchdog
#[must_use]
pub fn fast_settings() -> PreviewSettings {
    PreviewSettings {
        watchdog: WatchdogSettings {
            sweep_interval_ms: 10,
            unload_timeout_ms: 200,
        },
        ..PreviewSettings::default()
    }
}

/// A started engine over `host` with a 400x300 windowed surface
///
/// # Panics
/// Panics if the engine cannot be started.
pub fn started_engine(
    host: MockHost,
    settings: PreviewSettings,
) -> (PreviewEngine<MockHost>, Arc<MockSurface>) {
    let surface = Arc::new(MockSurface::new(Size::new(400, 300)));
    let engine = PreviewEngine::new(host, surface.clone(), settings);
    engine.start().expect("Failed to start engine");
    (engine, surface)
}
