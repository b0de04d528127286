//! Diagnostic logging setup
//!
//! Library code only emits `tracing` events; the binary installs a
//! `tracing-subscriber` formatter writing to stderr. `PEEKR_LOG` takes an
//! `EnvFilter` directive and overrides the `-v` count.

use tracing_subscriber::EnvFilter;

/// Environment variable holding a filter directive such as `peekr=debug`
pub const LOG_ENV: &str = "PEEKR_LOG";

/// Level selected by the number of `-v` flags
#[must_use]
pub const fn level_for(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Filter from `PEEKR_LOG`, falling back to the verbosity level
#[must_use]
pub fn filter(verbosity: u8) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(format!("peekr={}", level_for(verbosity))))
}

/// Install the global subscriber; later calls are no-ops
pub fn init(verbosity: u8) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter(verbosity))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_levels() {
        assert_eq!(level_for(0), "warn");
        assert_eq!(level_for(1), "info");
        assert_eq!(level_for(2), "debug");
        assert_eq!(level_for(7), "trace");
    }

    #[test]
    fn test_init_twice_is_harmless() {
        init(0);
        init(3);
    }
}
