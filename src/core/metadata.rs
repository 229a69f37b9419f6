//! Metadata record model - the typed view of one file in a structured worker response

use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::host::RawRecord;

/// Metadata for one file, as reported by the worker
///
/// Every field is optional because the worker simply omits tags a file does
/// not carry. Numeric values are kept as display strings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataRecord {
    #[serde(rename = "SourceFile", default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,

    /// e.g. "JPEG", "MOV"
    #[serde(rename = "FileType", default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,

    #[serde(rename = "CreateDate", default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub create_date: Option<String>,

    /// Only present for videos
    #[serde(rename = "Duration", default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,

    #[serde(rename = "Model", default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(rename = "LensID", default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub lens_id: Option<String>,

    #[serde(rename = "FocalLength", default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub focal_length: Option<String>,

    #[serde(rename = "DOF", default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub depth_of_field: Option<String>,

    #[serde(rename = "ISO", default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub iso: Option<String>,

    #[serde(rename = "ShutterSpeed", default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub shutter_speed: Option<String>,

    #[serde(rename = "FNumber", default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub f_number: Option<String>,

    #[serde(rename = "Caption-Abstract", default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,

    /// Always a list, even when the worker reports a single bare keyword
    #[serde(rename = "Keywords", default, deserialize_with = "one_or_many")]
    pub keywords: Vec<String>,
}

/// Coarse media classification used when photos and videos are mixed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Photo,
    Video,
    Unknown,
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaKind::Photo => write!(f, "photo"),
            MediaKind::Video => write!(f, "video"),
            MediaKind::Unknown => write!(f, "unknown"),
        }
    }
}

const VIDEO_FILE_TYPES: &[&str] = &["MOV", "MP4", "M4V", "AVI", "MTS", "M2TS", "3GP", "MKV", "WMV"];

impl MetadataRecord {
    /// Validate and normalise a raw record
    pub fn from_raw(record: RawRecord) -> Result<Self, serde_json::Error> {
        serde_json::from_value(Value::Object(record))
    }

    /// Caption, with an empty caption treated as missing
    pub fn caption(&self) -> Option<&str> {
        self.caption.as_deref().filter(|c| !c.is_empty())
    }

    pub fn has_keyword(&self, keyword: &str) -> bool {
        self.keywords.iter().any(|k| k == keyword)
    }

    pub fn media_kind(&self) -> MediaKind {
        match self.file_type.as_deref() {
            Some(ft) if VIDEO_FILE_TYPES.iter().any(|v| v.eq_ignore_ascii_case(ft)) => MediaKind::Video,
            Some(_) if self.duration.is_some() => MediaKind::Video,
            Some(_) => MediaKind::Photo,
            None if self.duration.is_some() => MediaKind::Video,
            None => MediaKind::Unknown,
        }
    }

    /// One-line exposure summary, e.g. "1/250 f/5.6 ISO 200 50.0 mm"
    pub fn exposure_summary(&self) -> Option<String> {
        let parts: Vec<String> = [
            self.shutter_speed.clone(),
            self.f_number.as_ref().map(|f| format!("f/{}", f)),
            self.iso.as_ref().map(|iso| format!("ISO {}", iso)),
            self.focal_length.clone(),
        ]
        .into_iter()
        .flatten()
        .collect();

        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    }
}

/// Make a logically list-valued field of a raw record always hold an array
///
/// A bare scalar becomes a one-element array and a missing field becomes an
/// empty array, so lookups never fail on records without the field.
pub fn normalize_list_field(record: &mut RawRecord, key: &str) {
    let normalized = match record.remove(key) {
        None | Some(Value::Null) => Value::Array(Vec::new()),
        Some(Value::Array(items)) => Value::Array(items),
        Some(scalar) => Value::Array(vec![scalar]),
    };
    record.insert(key.to_string(), normalized);
}

fn scalar_to_string(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(_) | Value::Object(_) => None,
    }
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Value::Array(items)) => {
            let joined: Vec<String> = items.into_iter().filter_map(scalar_to_string).collect();
            Ok(Some(joined.join(", ")))
        }
        Some(Value::Object(_)) => Err(de::Error::custom("expected a scalar tag value, found an object")),
        Some(other) => Ok(scalar_to_string(other)),
    }
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None => Ok(Vec::new()),
        Some(Value::Array(items)) => Ok(items.into_iter().filter_map(scalar_to_string).collect()),
        Some(Value::Object(_)) => Err(de::Error::custom("expected a keyword list, found an object")),
        Some(scalar) => Ok(scalar_to_string(scalar).into_iter().collect()),
    }
}
