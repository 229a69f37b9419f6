//! Request builders
//!
//! Each builder produces the command lines of one batch, without the
//! trailing `-execute` marker. Arguments are one per line, so a value that
//! contains a line break would split into extra commands and is rejected.
//! Subjects that look like options or comments get a `./` prefix.

use std::fmt::Write as _;
use std::path::Path;

use crate::core::MetadataEdit;

use super::ExifToolError;

/// Tags requested for every file of a metadata read
pub const READ_TAGS: &[&str] = &[
    "FileType",
    "CreateDate",
    "Duration",
    "Model",
    "LensID",
    "FocalLength",
    "DOF",
    "ISO",
    "ShutterSpeed",
    "FNumber",
    "Caption-Abstract",
    "Keywords",
];

pub const CAPTION_TAG: &str = "Caption-Abstract";
pub const KEYWORDS_TAG: &str = "Keywords";

/// Embedded images that can be extracted as raw bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddedImage {
    Preview,
    Thumbnail,
}

impl EmbeddedImage {
    pub fn tag(&self) -> &'static str {
        match self {
            EmbeddedImage::Preview => "PreviewImage",
            EmbeddedImage::Thumbnail => "ThumbnailImage",
        }
    }
}

/// JSON read of the fixed tag set for a batch of files
pub fn read_request<P: AsRef<Path>>(subjects: &[P]) -> Result<String, ExifToolError> {
    let mut request = String::from("-j\n");
    push_subjects(&mut request, subjects)?;
    for tag in READ_TAGS {
        let _ = writeln!(request, "-{}", tag);
    }
    Ok(request)
}

/// Caption overwrite and keyword directives applied to a batch of files
pub fn write_request<P: AsRef<Path>>(subjects: &[P], edit: &MetadataEdit) -> Result<String, ExifToolError> {
    let mut request = String::new();
    push_subjects(&mut request, subjects)?;

    if let Some(caption) = &edit.caption {
        check_line("caption", caption)?;
        let _ = writeln!(request, "-{}={}", CAPTION_TAG, caption);
    }

    for change in &edit.keywords {
        check_line("keyword", &change.keyword)?;
        let _ = writeln!(request, "-{}{}={}", KEYWORDS_TAG, change.op.sign(), change.keyword);
    }

    Ok(request)
}

/// Binary extraction of one embedded image from exactly one file
pub fn binary_request(image: EmbeddedImage, subject: &Path) -> Result<String, ExifToolError> {
    let mut request = format!("-{}\n-b\n", image.tag());
    push_subjects(&mut request, &[subject])?;
    Ok(request)
}

fn push_subjects<P: AsRef<Path>>(request: &mut String, subjects: &[P]) -> Result<(), ExifToolError> {
    for subject in subjects {
        let subject = subject.as_ref();
        let text = subject
            .to_str()
            .ok_or_else(|| ExifToolError::InvalidArgument(format!("path is not valid UTF-8: {}", subject.display())))?;
        if text.is_empty() {
            return Err(ExifToolError::InvalidArgument("empty path".to_string()));
        }
        check_line("path", text)?;
        if text.ends_with(char::is_whitespace) {
            return Err(ExifToolError::InvalidArgument(format!(
                "path must not end with whitespace: {:?}",
                text
            )));
        }
        if needs_dot_prefix(text) {
            request.push_str("./");
        }
        request.push_str(text);
        request.push('\n');
    }
    Ok(())
}

/// Relative paths the worker would read as an option, a comment, or trim
fn needs_dot_prefix(path: &str) -> bool {
    path.starts_with(['-', '#']) || path.starts_with(char::is_whitespace)
}

fn check_line(what: &str, value: &str) -> Result<(), ExifToolError> {
    if value.contains(['\n', '\r']) {
        return Err(ExifToolError::InvalidArgument(format!(
            "{} must not contain line breaks: {:?}",
            what, value
        )));
    }
    Ok(())
}
