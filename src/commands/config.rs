//! Config command - show or initialize the settings file

use std::io::Write;
use std::path::Path;

use colored::Colorize;

use crate::{Result, cli::ConfigCommands, config::PreviewSettings};

/// Execute a config subcommand against the settings file at `path`
///
/// # Errors
/// Returns an error if the settings file cannot be read, parsed or written
pub fn execute(
    command: &ConfigCommands,
    path: &Path,
    quiet: bool,
    out: &mut impl Write,
) -> Result<()> {
    match command {
        ConfigCommands::Path => writeln!(out, "{}", path.display())?,
        ConfigCommands::Show => {
            let settings = PreviewSettings::load_from(path)?;
            write!(out, "{}", settings.to_toml()?)?;
        }
        ConfigCommands::Init { force } => {
            if path.exists() && !force {
                if !quiet {
                    writeln!(
                        out,
                        "{} already exists (use --force to overwrite)",
                        path.display().to_string().yellow()
                    )?;
                }
                return Ok(());
            }
            PreviewSettings::default().save_to(path)?;
            if !quiet {
                writeln!(out, "Wrote default settings to {}", path.display().to_string().green())?;
            }
        }
    }
    Ok(())
}
