//! Core data models: metadata records, edits and selection summaries

mod edit;
mod metadata;
mod selection;

pub use edit::*;
pub use metadata::*;
pub use selection::*;
