//! ExifTool facade
//!
//! Typed metadata operations on top of one persistent worker channel.

pub mod requests;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::core::{normalize_list_field, MetadataEdit, MetadataRecord};
use crate::host::{ChannelError, ChannelOptions, ProcessChannel, RawRecord, ResponseKind};
use crate::settings::Settings;

pub use requests::{binary_request, read_request, write_request, EmbeddedImage, READ_TAGS};

/// Errors from metadata operations
#[derive(Debug, thiserror::Error)]
pub enum ExifToolError {
    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unexpected metadata for record {index}: {source}")]
    Record {
        index: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Background task failed: {0}")]
    Task(String),
}

impl ExifToolError {
    /// Whether the worker must be restarted before the next request
    pub fn requires_restart(&self) -> bool {
        matches!(self, ExifToolError::Channel(err) if err.requires_restart())
    }
}

/// Metadata access backed by a persistent exiftool process
#[derive(Debug)]
pub struct ExifTool {
    channel: ProcessChannel,
}

impl ExifTool {
    /// Start exiftool as configured in `settings`
    pub fn start(settings: &Settings) -> Result<Self, ExifToolError> {
        Self::with_options(settings.channel_options())
    }

    pub fn with_options(options: ChannelOptions) -> Result<Self, ExifToolError> {
        Ok(Self::from_channel(ProcessChannel::spawn(options)?))
    }

    pub fn from_channel(channel: ProcessChannel) -> Self {
        Self { channel }
    }

    pub fn channel(&self) -> &ProcessChannel {
        &self.channel
    }

    /// Read the standard tag set for a batch of files, one record per file
    pub fn read_metadata<P: AsRef<Path>>(&self, subjects: &[P]) -> Result<Vec<MetadataRecord>, ExifToolError> {
        self.read_raw_metadata(subjects)?
            .into_iter()
            .enumerate()
            .map(|(index, raw)| {
                MetadataRecord::from_raw(raw).map_err(|source| ExifToolError::Record { index, source })
            })
            .collect()
    }

    /// Like [`read_metadata`](Self::read_metadata) but keeps the raw records,
    /// with `Keywords` always normalised to a list
    pub fn read_raw_metadata<P: AsRef<Path>>(&self, subjects: &[P]) -> Result<Vec<RawRecord>, ExifToolError> {
        if subjects.is_empty() {
            return Ok(Vec::new());
        }

        let request = read_request(subjects)?;
        let mut records = self.channel.query_records(&request)?;
        if records.len() != subjects.len() {
            tracing::warn!(
                requested = subjects.len(),
                returned = records.len(),
                "Worker skipped some files; see its diagnostics"
            );
        }

        for record in &mut records {
            normalize_list_field(record, requests::KEYWORDS_TAG);
        }
        Ok(records)
    }

    /// Apply an edit to every file; the worker's answer is only logged
    pub fn write_metadata<P: AsRef<Path>>(&self, subjects: &[P], edit: &MetadataEdit) -> Result<(), ExifToolError> {
        if subjects.is_empty() || edit.is_empty() {
            return Ok(());
        }

        let request = write_request(subjects, edit)?;
        self.channel.submit(&request, ResponseKind::None)?;
        tracing::info!(files = subjects.len(), changes = edit.keywords.len(), "Metadata edit sent");
        Ok(())
    }

    /// Raw bytes of an embedded image; empty when the file has none
    pub fn embedded_image(&self, image: EmbeddedImage, subject: &Path) -> Result<Vec<u8>, ExifToolError> {
        let request = binary_request(image, subject)?;
        let bytes = self.channel.query_bytes(&request)?;
        tracing::debug!(file = %subject.display(), tag = image.tag(), bytes = bytes.len(), "Extracted embedded image");
        Ok(bytes)
    }

    pub fn preview_image(&self, subject: &Path) -> Result<Vec<u8>, ExifToolError> {
        self.embedded_image(EmbeddedImage::Preview, subject)
    }

    pub fn thumbnail_image(&self, subject: &Path) -> Result<Vec<u8>, ExifToolError> {
        self.embedded_image(EmbeddedImage::Thumbnail, subject)
    }

    /// Replace a wedged or dead worker with a fresh one
    pub fn restart(&self) -> Result<(), ExifToolError> {
        tracing::info!("Restarting exiftool worker");
        Ok(self.channel.restart()?)
    }

    pub fn shutdown(&self) -> Result<(), ExifToolError> {
        Ok(self.channel.shutdown()?)
    }

    /// Read metadata without blocking the async runtime
    pub async fn read_metadata_async(
        self: Arc<Self>,
        subjects: Vec<PathBuf>,
    ) -> Result<Vec<MetadataRecord>, ExifToolError> {
        tokio::task::spawn_blocking(move || self.read_metadata(&subjects))
            .await
            .map_err(|e| ExifToolError::Task(e.to_string()))?
    }

    /// Send an edit without blocking the async runtime
    pub async fn write_metadata_async(
        self: Arc<Self>,
        subjects: Vec<PathBuf>,
        edit: MetadataEdit,
    ) -> Result<(), ExifToolError> {
        tokio::task::spawn_blocking(move || self.write_metadata(&subjects, &edit))
            .await
            .map_err(|e| ExifToolError::Task(e.to_string()))?
    }

    /// Extract an embedded image without blocking the async runtime
    pub async fn embedded_image_async(
        self: Arc<Self>,
        image: EmbeddedImage,
        subject: PathBuf,
    ) -> Result<Vec<u8>, ExifToolError> {
        tokio::task::spawn_blocking(move || self.embedded_image(image, &subject))
            .await
            .map_err(|e| ExifToolError::Task(e.to_string()))?
    }
}
