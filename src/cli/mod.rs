//! Command-line interface

pub mod extract;
pub mod info;
pub mod tag;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use crate::exiftool::{ExifTool, ExifToolError};
use crate::host::ChannelError;
use crate::settings::Settings;

/// Process exit codes
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const UNEXPECTED_FAILURE: i32 = 1;
    pub const WORKER_MISSING: i32 = 2;
    pub const DECODE_ERROR: i32 = 3;
    pub const WORKER_TIMEOUT: i32 = 4;
}

#[derive(Debug, Parser)]
#[command(name = "chhobi", version, about = "Browse and tag photo metadata through a persistent exiftool")]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON
    #[arg(long = "json-logs", global = true)]
    pub json_output: bool,

    /// Settings file (defaults to the per-user config directory)
    #[arg(long, global = true, env = "CHHOBI_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show metadata for one or more files
    Info(info::InfoArgs),
    /// Extract the embedded preview image
    Preview(extract::ExtractArgs),
    /// Extract the embedded thumbnail image
    Thumbnail(extract::ExtractArgs),
    /// Set the caption and add or remove keywords
    Tag(tag::TagArgs),
}

/// Load settings from `--config` or the default location
pub fn load_settings(config: Option<&std::path::Path>) -> anyhow::Result<Settings> {
    let settings = match config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    };
    settings.context("failed to load settings")
}

/// Start the worker for one CLI invocation
pub fn start_tool(settings: &Settings) -> anyhow::Result<ExifTool> {
    ExifTool::start(settings).context("failed to start exiftool")
}

/// The channel failure behind an error chain, if there is one
pub fn channel_error(e: &anyhow::Error) -> Option<&ChannelError> {
    e.chain().find_map(|cause| {
        cause
            .downcast_ref::<ChannelError>()
            .or_else(|| match cause.downcast_ref::<ExifToolError>() {
                Some(ExifToolError::Channel(inner)) => Some(inner),
                _ => None,
            })
    })
}

/// Categorize an error into the appropriate exit code
pub fn categorize_error(e: &anyhow::Error) -> i32 {
    match channel_error(e) {
        Some(ChannelError::BinaryNotFound(_) | ChannelError::LaunchFailed { .. }) => exit_codes::WORKER_MISSING,
        Some(ChannelError::Decode(_)) => exit_codes::DECODE_ERROR,
        Some(ChannelError::Timeout { .. }) => exit_codes::WORKER_TIMEOUT,
        _ if e.chain().any(|c| matches!(c.downcast_ref::<ExifToolError>(), Some(ExifToolError::Record { .. }))) => {
            exit_codes::DECODE_ERROR
        }
        _ => exit_codes::UNEXPECTED_FAILURE,
    }
}
