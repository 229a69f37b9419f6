//! Response framing
//!
//! The worker answers every request with an arbitrary amount of output
//! followed by a `{ready}` sentinel. Output arrives in chunks of whatever
//! size the pipe hands us, so the sentinel may be split across reads.

use serde_json::{Map, Value};

/// Sentinel the worker prints after each response
pub const READY_SENTINEL: &[u8] = b"{ready}";

/// How many trailing bytes are inspected for the sentinel after each chunk
pub const TAIL_WINDOW: usize = 32;

/// One flat record of a structured response
pub type RawRecord = Map<String, Value>;

/// Errors produced while decoding a completed response
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("Response is not terminated by the ready sentinel")]
    Incomplete,

    #[error("Invalid JSON in structured response: {source} (starts with {preview:?})")]
    Json {
        #[source]
        source: serde_json::Error,
        preview: String,
    },

    #[error("Structured response must be a JSON array of objects, got {0}")]
    UnexpectedShape(&'static str),
}

/// Accumulates worker output until the sentinel shows up
#[derive(Debug)]
pub struct ResponseFramer {
    sentinel: &'static [u8],
    buffer: Vec<u8>,
}

impl ResponseFramer {
    pub fn new() -> Self {
        Self::with_sentinel(READY_SENTINEL)
    }

    pub fn with_sentinel(sentinel: &'static [u8]) -> Self {
        debug_assert!(!sentinel.is_empty() && sentinel.len() <= TAIL_WINDOW);
        Self {
            sentinel,
            buffer: Vec::with_capacity(4096),
        }
    }

    /// Append a chunk; returns true once the accumulated output is terminated
    pub fn push(&mut self, chunk: &[u8]) -> bool {
        self.buffer.extend_from_slice(chunk);
        self.is_complete()
    }

    /// Check only the tail of the buffer, never the whole payload
    pub fn is_complete(&self) -> bool {
        let start = self.buffer.len().saturating_sub(TAIL_WINDOW);
        self.buffer[start..].trim_ascii_end().ends_with(self.sentinel)
    }

    /// Bytes accumulated so far
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Payload bytes with trailing whitespace and the sentinel removed
    pub fn into_binary(self) -> Result<Vec<u8>, FrameError> {
        if !self.is_complete() {
            return Err(FrameError::Incomplete);
        }
        let mut buffer = self.buffer;
        let end = buffer.trim_ascii_end().len() - self.sentinel.len();
        buffer.truncate(end);
        Ok(buffer)
    }

    /// Pre-sentinel text with surrounding whitespace removed, lossily decoded
    pub fn into_text(self) -> Result<String, FrameError> {
        let payload = self.payload()?;
        Ok(String::from_utf8_lossy(payload).into_owned())
    }

    /// Decode the pre-sentinel bytes as a JSON array of objects
    pub fn into_records(self) -> Result<Vec<RawRecord>, FrameError> {
        let payload = self.payload()?;
        if payload.is_empty() {
            return Ok(Vec::new());
        }

        let value: Value = serde_json::from_slice(payload).map_err(|source| FrameError::Json {
            source,
            preview: preview(payload),
        })?;

        match value {
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::Object(record) => Ok(record),
                    other => Err(FrameError::UnexpectedShape(kind_of(&other))),
                })
                .collect(),
            other => Err(FrameError::UnexpectedShape(kind_of(&other))),
        }
    }

    fn payload(&self) -> Result<&[u8], FrameError> {
        if !self.is_complete() {
            return Err(FrameError::Incomplete);
        }
        let trimmed = self.buffer.trim_ascii();
        Ok(trimmed[..trimmed.len() - self.sentinel.len()].trim_ascii())
    }
}

impl Default for ResponseFramer {
    fn default() -> Self {
        Self::new()
    }
}

fn preview(payload: &[u8]) -> String {
    let head = &payload[..payload.len().min(64)];
    String::from_utf8_lossy(head).into_owned()
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_detects_sentinel_in_single_chunk() {
        let mut framer = ResponseFramer::new();
        assert!(framer.push(b"[{\"Model\":\"X\"}]\n{ready}\n"));
    }

    #[test]
    fn test_detects_sentinel_split_across_chunks() {
        let mut framer = ResponseFramer::new();
        assert!(!framer.push(b"[{\"Model\":\"X\"}]\n{rea"));
        assert!(framer.push(b"dy}\n"));

        let records = framer.into_records().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["Model"], json!("X"));
    }

    #[test]
    fn test_sentinel_byte_by_byte() {
        let mut framer = ResponseFramer::new();
        let input = b"[]{ready}";
        for (i, byte) in input.iter().enumerate() {
            let done = framer.push(std::slice::from_ref(byte));
            assert_eq!(done, i == input.len() - 1);
        }
    }

    #[test]
    fn test_earlier_sentinel_is_not_terminator() {
        let mut framer = ResponseFramer::new();
        let mut payload = b"{ready}".to_vec();
        payload.extend(std::iter::repeat(b'x').take(100));
        assert!(!framer.push(&payload));
        assert!(framer.push(b"{ready}"));

        let bytes = framer.into_binary().unwrap();
        assert_eq!(bytes, payload);
    }

    #[test]
    fn test_trailing_whitespace_beyond_window() {
        let mut framer = ResponseFramer::new();
        framer.push(b"[]{ready}");
        assert!(!framer.push(&[b' '; TAIL_WINDOW]));
    }

    #[test]
    fn test_empty_structured_payload() {
        let mut framer = ResponseFramer::new();
        assert!(framer.push(b"  \n{ready}\n"));
        assert!(framer.into_records().unwrap().is_empty());
    }

    #[test]
    fn test_records_keep_order() {
        let mut framer = ResponseFramer::new();
        framer.push(b"[{\"Model\":\"X\"}, {\"Model\":\"Y\"}]{ready}");
        let records = framer.into_records().unwrap();
        let models: Vec<_> = records.iter().map(|r| r["Model"].clone()).collect();
        assert_eq!(models, vec![json!("X"), json!("Y")]);
    }

    #[test]
    fn test_binary_payload_verbatim() {
        let payload: Vec<u8> = vec![0x00, 0x01, 0xff, b' ', b'\n', 0xd8];
        let mut framer = ResponseFramer::new();
        framer.push(&payload);
        assert!(framer.push(b"{ready}\n"));
        assert_eq!(framer.into_binary().unwrap(), payload);
    }

    #[test]
    fn test_binary_empty_payload() {
        let mut framer = ResponseFramer::new();
        framer.push(b"{ready}\n");
        assert!(framer.into_binary().unwrap().is_empty());
    }

    #[test]
    fn test_malformed_json() {
        let mut framer = ResponseFramer::new();
        framer.push(b"[{\"Model\": }]{ready}");
        let err = framer.into_records().unwrap_err();
        assert!(matches!(err, FrameError::Json { .. }));
        assert!(err.to_string().contains("Model"));
    }

    #[test]
    fn test_non_array_json() {
        let mut framer = ResponseFramer::new();
        framer.push(b"{\"Model\":\"X\"}{ready}");
        assert!(matches!(
            framer.into_records(),
            Err(FrameError::UnexpectedShape("an object"))
        ));
    }

    #[test]
    fn test_incomplete_response() {
        let mut framer = ResponseFramer::new();
        framer.push(b"[]{rea");
        assert!(matches!(framer.into_binary(), Err(FrameError::Incomplete)));
    }

    #[test]
    fn test_text_payload() {
        let mut framer = ResponseFramer::new();
        framer.push(b"    1 image files updated\n{ready}\n");
        assert_eq!(framer.into_text().unwrap(), "1 image files updated");
    }
}
