//! Selection summary - what a multi-file selection has in common

use std::collections::BTreeSet;

use super::MetadataRecord;

/// Caption and keywords shared by every file in a selection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionSummary {
    /// Number of records summarised
    pub count: usize,
    /// Set only when every file carries the same caption
    pub common_caption: Option<String>,
    /// Keywords present on every file, sorted
    pub common_keywords: Vec<String>,
}

impl SelectionSummary {
    pub fn from_records(records: &[MetadataRecord]) -> Self {
        let Some((first, rest)) = records.split_first() else {
            return Self::default();
        };

        let first_caption = first.caption.clone().unwrap_or_default();
        let same_caption = rest
            .iter()
            .all(|r| r.caption.as_deref().unwrap_or_default() == first_caption);

        let mut keywords: BTreeSet<&str> = first.keywords.iter().map(String::as_str).collect();
        for record in rest {
            keywords.retain(|k| record.has_keyword(k));
        }

        Self {
            count: records.len(),
            common_caption: same_caption.then_some(first_caption),
            common_keywords: keywords.into_iter().map(String::from).collect(),
        }
    }

    /// Text for the info pane
    pub fn render(&self) -> String {
        let caption = match self.common_caption.as_deref() {
            Some(c) if !c.is_empty() => c,
            _ => "-",
        };
        format!("Caption: {}\nKeywords: {}", caption, self.common_keywords.join(", "))
    }
}
