//! Peekr CLI application entry point
//!
//! A headless shell around the preview engine: it asks the Windows shell which
//! handler previews a file, renders thumbnails to PNG files and manages the
//! settings file.
//!
//! # Usage
//!
//! ```bash
//! # Show the handler for a file
//! peekr info report.pdf
//! peekr info report.pdf --json
//!
//! # Render a thumbnail
//! peekr thumbnail clip.mp4 -o clip.png --size 512
//!
//! # Open with the default application
//! peekr open report.pdf
//!
//! # Settings
//! peekr config path
//! peekr config init --force
//!
//! # Verbose logging (or PEEKR_LOG=peekr=debug)
//! peekr -vv info report.pdf
//! ```
//!
//! # Configuration
//!
//! Settings are stored in the user's config directory
//! (`~/.config/peekr/config.toml` on Linux, `%APPDATA%\peekr\config.toml` on
//! Windows) and created with defaults on first use.

use colored::Colorize;
use peekr::{
    PeekrError, Result,
    cli::{Cli, Commands},
    commands,
    config::PreviewSettings,
    logging, output,
};
use std::io::{self, Write};
use std::process::ExitCode;

#[cfg(windows)]
fn preview_host() -> Result<std::sync::Arc<peekr::host::NativeHost>> {
    Ok(std::sync::Arc::new(peekr::host::NativeHost::new()))
}

#[cfg(not(windows))]
fn preview_host() -> Result<std::sync::Arc<peekr::host::mock::MockHost>> {
    let settings = PreviewSettings::load()?;
    Err(PeekrError::UnsupportedPlatform(
        settings.messages.non_windows_platform,
    ))
}

fn run(cli: &Cli) -> Result<()> {
    let quiet = cli.quiet;
    let mut stdout = io::stdout().lock();

    match &cli.command {
        Commands::Info { file, json } => {
            let host = preview_host()?;
            commands::info(&host, file, *json, &mut stdout)?;
        }
        Commands::Thumbnail { file, output: png, size } => {
            let host = preview_host()?;
            let written = commands::thumbnail(&host, file, png, *size)?;
            writeln!(stdout, "{}", output::thumbnail_written(png, written, quiet))?;
        }
        Commands::Open { file } => {
            commands::open(file)?;
        }
        Commands::Config { command } => {
            let path = PreviewSettings::config_path()?;
            commands::config(command, &path, quiet, &mut stdout)?;
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse_args();
    logging::init(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(PeekrError::Preview(error)) => {
            let message = PreviewSettings::load().map_or_else(
                |_| error.to_string(),
                |settings| error.user_message(&settings.messages),
            );
            eprintln!("{}", message.red());
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("{} {e}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}
