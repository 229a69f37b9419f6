//! `chhobi info` - show metadata for files

use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, ValueEnum};

use crate::core::{MediaKind, MetadataRecord, SelectionSummary};
use crate::settings::Settings;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Args)]
pub struct InfoArgs {
    /// Files to inspect
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

pub async fn run(args: InfoArgs, settings: &Settings) -> anyhow::Result<()> {
    let tool = Arc::new(super::start_tool(settings)?);
    let records = Arc::clone(&tool)
        .read_metadata_async(args.files)
        .await
        .context("failed to read metadata")?;
    tool.shutdown().context("failed to stop exiftool")?;

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&records)?),
        OutputFormat::Text => print!("{}", render_text(&records)),
    }
    Ok(())
}

fn render_text(records: &[MetadataRecord]) -> String {
    let mut out = String::new();
    for record in records {
        let _ = writeln!(out, "{}", record.source_file.as_deref().unwrap_or("?"));
        let kind = record.media_kind();
        if kind != MediaKind::Unknown {
            let _ = writeln!(out, "  Kind:     {}", kind);
        }
        if let Some(file_type) = &record.file_type {
            let _ = writeln!(out, "  Type:     {}", file_type);
        }
        if let Some(date) = &record.create_date {
            let _ = writeln!(out, "  Created:  {}", date);
        }
        if let Some(duration) = &record.duration {
            let _ = writeln!(out, "  Duration: {}", duration);
        }
        if let Some(model) = &record.model {
            let _ = writeln!(out, "  Camera:   {}", model);
        }
        if let Some(lens) = &record.lens_id {
            let _ = writeln!(out, "  Lens:     {}", lens);
        }
        if let Some(exposure) = record.exposure_summary() {
            let _ = writeln!(out, "  Exposure: {}", exposure);
        }
        if let Some(dof) = &record.depth_of_field {
            let _ = writeln!(out, "  DOF:      {}", dof);
        }
    }

    if !records.is_empty() {
        let summary = SelectionSummary::from_records(records);
        if summary.count > 1 {
            let _ = writeln!(out, "\nCommon to all {} files:", summary.count);
        }
        let _ = writeln!(out, "{}", summary.render());
    }
    out
}
