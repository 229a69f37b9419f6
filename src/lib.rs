//! Chhobi - photo organizer core
//!
//! Keeps one exiftool process open in `-stay_open` mode and talks to it over
//! its standard streams:
//! - [`host`]: the framed request/response channel and worker lifecycle
//! - [`exiftool`]: typed metadata reads, writes and embedded image extraction
//! - [`core`]: metadata records, edits and selection summaries

pub mod cli;
pub mod core;
pub mod exiftool;
pub mod host;
pub mod logging;
pub mod settings;

pub use crate::core::{KeywordChange, KeywordOp, MediaKind, MetadataEdit, MetadataRecord, SelectionSummary};
pub use crate::exiftool::{EmbeddedImage, ExifTool, ExifToolError};
pub use crate::host::{ChannelError, ChannelOptions, ChannelState, ProcessChannel, Response, ResponseKind};
pub use crate::settings::Settings;
