//! `chhobi tag` - set caption and keywords

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Args;

use crate::core::{KeywordChange, MetadataEdit};
use crate::settings::Settings;

#[derive(Debug, Args)]
pub struct TagArgs {
    /// Files to edit
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Replace the caption (an empty string clears it)
    #[arg(short, long)]
    pub caption: Option<String>,

    /// Add (+keyword) or remove (-keyword) a keyword; repeatable
    #[arg(short = 'k', long = "keyword", value_name = "+KW|-KW", allow_hyphen_values = true)]
    pub keywords: Vec<KeywordChange>,
}

impl TagArgs {
    fn edit(&self) -> MetadataEdit {
        MetadataEdit {
            caption: self.caption.clone(),
            keywords: self.keywords.clone(),
        }
    }
}

pub async fn run(args: TagArgs, settings: &Settings) -> anyhow::Result<()> {
    let edit = args.edit();
    if edit.is_empty() {
        bail!("nothing to do: pass --caption or --keyword");
    }

    let tool = Arc::new(super::start_tool(settings)?);
    Arc::clone(&tool)
        .write_metadata_async(args.files, edit)
        .await
        .context("failed to write metadata")?;

    // Shutting down waits for the worker to finish the write
    tool.shutdown().context("failed to stop exiftool")?;
    Ok(())
}
