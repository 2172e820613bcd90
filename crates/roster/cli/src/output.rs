//! Output formatting

use crate::error::CliResult;
use serde::Serialize;

/// Output format for command results
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable summary lines
    #[default]
    Text,
    /// Pretty-printed JSON
    Json,
}

pub fn print_json<T: Serialize>(data: &T) -> CliResult<()> {
    println!("{}", serde_json::to_string_pretty(data)?);
    Ok(())
}

pub fn print_success(message: &str) {
    println!("✓ {}", message);
}

pub fn print_warning(message: &str) {
    println!("⚠ {}", message);
}
