//! `chhobi preview` / `chhobi thumbnail` - extract embedded images

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Args;

use crate::exiftool::EmbeddedImage;
use crate::settings::Settings;

#[derive(Debug, Args)]
pub struct ExtractArgs {
    /// Source photo
    pub file: PathBuf,

    /// Where to write the image bytes
    #[arg(short, long)]
    pub output: PathBuf,
}

pub async fn run(image: EmbeddedImage, args: ExtractArgs, settings: &Settings) -> anyhow::Result<()> {
    let tool = Arc::new(super::start_tool(settings)?);
    let bytes = Arc::clone(&tool)
        .embedded_image_async(image, args.file.clone())
        .await
        .with_context(|| format!("failed to extract {} from {}", image.tag(), args.file.display()))?;
    tool.shutdown().context("failed to stop exiftool")?;

    if bytes.is_empty() {
        bail!("{} has no embedded {}", args.file.display(), image.tag());
    }

    tokio::fs::write(&args.output, &bytes)
        .await
        .with_context(|| format!("failed to write {}", args.output.display()))?;
    tracing::info!(output = %args.output.display(), bytes = bytes.len(), "Image written");
    Ok(())
}
