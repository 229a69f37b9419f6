//! Metadata edits - caption overwrite plus keyword add/remove directives

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Whether a keyword is added or removed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeywordOp {
    Add,
    Remove,
}

impl KeywordOp {
    pub fn sign(&self) -> char {
        match self {
            KeywordOp::Add => '+',
            KeywordOp::Remove => '-',
        }
    }
}

/// One signed keyword directive
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeywordChange {
    pub op: KeywordOp,
    pub keyword: String,
}

impl KeywordChange {
    pub fn add(keyword: impl Into<String>) -> Self {
        Self {
            op: KeywordOp::Add,
            keyword: keyword.into(),
        }
    }

    pub fn remove(keyword: impl Into<String>) -> Self {
        Self {
            op: KeywordOp::Remove,
            keyword: keyword.into(),
        }
    }
}

impl fmt::Display for KeywordChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.op.sign(), self.keyword)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Keyword change must look like +keyword or -keyword, got {0:?}")]
pub struct ParseKeywordChangeError(String);

impl FromStr for KeywordChange {
    type Err = ParseKeywordChangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (op, keyword) = match s.split_at_checked(1) {
            Some(("+", rest)) => (KeywordOp::Add, rest.trim()),
            Some(("-", rest)) => (KeywordOp::Remove, rest.trim()),
            _ => return Err(ParseKeywordChangeError(s.to_string())),
        };
        if keyword.is_empty() {
            return Err(ParseKeywordChangeError(s.to_string()));
        }
        Ok(Self {
            op,
            keyword: keyword.to_string(),
        })
    }
}

/// A batch edit applied to every file of a selection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataEdit {
    /// Replaces the caption when set; an empty string clears it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,

    /// Applied in order
    #[serde(default)]
    pub keywords: Vec<KeywordChange>,
}

impl MetadataEdit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder pattern: set caption
    pub fn with_caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = Some(caption.into());
        self
    }

    /// Builder pattern: add keyword
    pub fn add_keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keywords.push(KeywordChange::add(keyword));
        self
    }

    /// Builder pattern: remove keyword
    pub fn remove_keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keywords.push(KeywordChange::remove(keyword));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.caption.is_none() && self.keywords.is_empty()
    }
}
