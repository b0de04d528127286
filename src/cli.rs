//! Command-line interface definitions and parsing
//!
//! This module defines the CLI structure for peekr using the `clap` crate.
//!
//! # Commands
//!
//! - **info**: show which handler previews a file and how it was initialized
//! - **thumbnail**: render a file's thumbnail into a PNG
//! - **open**: open a file with its default application
//! - **config**: show or initialize the settings file
//!
//! # Examples
//!
//! ```
//! use peekr::cli::{Cli, Commands};
//!
//! let cli = Cli::parse_from_args(["peekr", "-v", "info", "notes.txt", "--json"]).unwrap();
//! assert_eq!(cli.verbose, 1);
//! assert!(matches!(cli.command, Commands::Info { json: true, .. }));
//! ```

use clap::{ArgAction, Parser, Subcommand};
use std::ffi::OsString;
use std::path::PathBuf;

use crate::preview::thumbnail::MIN_THUMBNAIL_SIZE;

/// Host Windows shell previews and thumbnails from the command line
#[derive(Parser, Debug)]
#[command(name = "peekr", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress informational output (only print results)
    #[arg(short = 'q', long = "quiet", global = true)]
    pub quiet: bool,
}

/// Available CLI commands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Show the handler that previews a file
    #[command(visible_alias = "i")]
    Info {
        /// File to inspect
        file: PathBuf,

        /// Print the preview details as JSON
        #[arg(long = "json")]
        json: bool,
    },

    /// Render a file's thumbnail into a PNG image
    #[command(visible_alias = "thumb")]
    Thumbnail {
        /// File to render
        file: PathBuf,

        /// PNG file to write
        #[arg(short = 'o', long = "output", value_name = "PNG")]
        output: PathBuf,

        /// Requested size of the larger side in pixels
        #[arg(short = 's', long = "size", default_value_t = MIN_THUMBNAIL_SIZE)]
        size: u32,
    },

    /// Open a file with its default application
    Open {
        /// File to open
        file: PathBuf,
    },

    /// Manage configuration settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

/// Configuration management subcommands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigCommands {
    /// Print the path of the settings file
    Path,

    /// Print the effective settings as TOML
    Show,

    /// Write a settings file with default values
    Init {
        /// Overwrite an existing settings file
        #[arg(short = 'f', long = "force")]
        force: bool,
    },
}

impl Cli {
    /// Parse command line arguments
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Parse an explicit argument list
    ///
    /// # Errors
    ///
    /// Returns `clap::Error` for unknown commands or invalid arguments.
    pub fn parse_from_args<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        Self::try_parse_from(args)
    }
}
