use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::classifier::classify;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    Text,
    Image,
    File,
    Code,
    Url,
    Email,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: usize,
    pub height: usize,
}

/// One remembered clipboard state.
///
/// For images `content` is the fingerprint, never the pixels; the encoded
/// image lives in `image_data` and takes no part in deduplication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClipboardEntry {
    pub id: String,
    pub content: String,
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_type: Option<String>,
    pub size: usize,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub is_pinned: bool,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_size: Option<ImageSize>,
}

impl ClipboardEntry {
    /// Build a text entry, classifying the content on the way in.
    pub fn new_text(content: String) -> Self {
        let classification = classify(&content);

        Self {
            id: generate_id(),
            size: content.chars().count(),
            preview: Some(make_preview(&content)),
            entry_type: classification.entry_type,
            sub_type: classification.sub_type,
            content,
            timestamp: Utc::now(),
            is_pinned: false,
            tags: BTreeSet::new(),
            image_data: None,
            image_size: None,
        }
    }

    /// Build an image entry from its fingerprint and encoded PNG data-URL.
    pub fn new_image(fingerprint: String, data_url: String, size: usize, dims: ImageSize) -> Self {
        Self {
            id: generate_id(),
            content: fingerprint,
            entry_type: EntryType::Image,
            sub_type: None,
            size,
            timestamp: Utc::now(),
            is_pinned: false,
            tags: BTreeSet::new(),
            preview: None,
            image_data: Some(data_url),
            image_size: Some(dims),
        }
    }

    pub fn is_image(&self) -> bool {
        self.entry_type == EntryType::Image
    }
}

/// First `PREVIEW_CHARS` characters, with an ellipsis when cut.
pub fn make_preview(content: &str) -> String {
    let mut chars = content.char_indices();
    match chars.nth(crate::PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &content[..cut]),
        None => content.to_string(),
    }
}

/// Millisecond timestamp plus random suffix, unique within a process lifetime
/// for all practical purposes.
pub fn generate_id() -> String {
    let suffix: u32 = rand::thread_rng().gen();
    format!("{:x}{:08x}", Utc::now().timestamp_millis(), suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_truncation() {
        let short = "x".repeat(100);
        assert_eq!(make_preview(&short), short);

        let long = "y".repeat(101);
        assert_eq!(make_preview(&long), format!("{}...", "y".repeat(100)));
    }

    #[test]
    fn test_preview_respects_char_boundaries() {
        let long = "é".repeat(150);
        let preview = make_preview(&long);
        assert_eq!(preview.chars().count(), 103);
        assert!(preview.ends_with("..."));
    }

    #[test]
    fn test_new_text_classifies() {
        let entry = ClipboardEntry::new_text("https://example.com/page".to_string());
        assert_eq!(entry.entry_type, EntryType::Url);
        assert_eq!(entry.size, 24);
        assert!(!entry.is_pinned);
        assert!(entry.tags.is_empty());
        assert_eq!(entry.preview.as_deref(), Some("https://example.com/page"));
    }

    #[test]
    fn test_ids_are_distinct() {
        let a = ClipboardEntry::new_text("a".to_string());
        let b = ClipboardEntry::new_text("a".to_string());
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_serialized_shape() {
        let entry = ClipboardEntry::new_text("function foo() { return 1; }".to_string());
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["type"], "code");
        assert_eq!(json["subType"], "javascript");
        assert_eq!(json["isPinned"], false);
        assert!(json.get("imageData").is_none());
    }
}
