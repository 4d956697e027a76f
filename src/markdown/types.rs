use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TocEntry {
    pub id: String,
    pub title: String,
    pub depth: u8,
}

/// One rendered Markdown document and its metadata. Identity is the content
/// hash of the source bytes; it never depends on slug, filesystem path, or
/// timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub hash: String,
    pub slug: String,
    pub filename: String,
    pub original_path: String,
    pub folder: Vec<String>,
    pub url: String,
    pub title: String,
    pub html: String,
    pub plaintext: String,
    pub first_paragraph_text: Option<String>,
    pub first_image: Option<String>,
    pub frontmatter: BTreeMap<String, Value>,
    pub word_count: u32,
    pub toc: Vec<TocEntry>,
    /// Outbound link targets: the content hash of each other post this post's
    /// wikilinks resolved to, in the order they were resolved. Unresolved
    /// links and links to external URLs are not included.
    pub links: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Frontmatter {
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub public: Option<bool>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Splits `raw` into `(frontmatter, body)`. Returns an empty frontmatter when
/// no `---` delimited block is present at the start of the document.
pub fn split_frontmatter(raw: &str) -> (Frontmatter, &str) {
    let trimmed = raw.strip_prefix('\u{feff}').unwrap_or(raw);
    if let Some(rest) = trimmed.strip_prefix("---\n").or_else(|| trimmed.strip_prefix("---\r\n")) {
        if let Some(end) = rest.find("\n---") {
            let yaml = &rest[..end];
            let after_marker = &rest[end + 4..];
            let body = after_marker.strip_prefix('\n').unwrap_or(after_marker);
            let fm: Frontmatter = serde_yaml::from_str(yaml).unwrap_or_default();
            return (fm, body);
        }
    }
    (Frontmatter::default(), trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_frontmatter_and_body() {
        let raw = "---\npublic: true\naliases:\n  - Doggo\n---\n# Hello\n";
        let (fm, body) = split_frontmatter(raw);
        assert_eq!(fm.public, Some(true));
        assert_eq!(fm.aliases, vec!["Doggo".to_string()]);
        assert_eq!(body, "# Hello\n");
    }

    #[test]
    fn document_without_frontmatter_is_passed_through() {
        let raw = "# Hello\nbody\n";
        let (fm, body) = split_frontmatter(raw);
        assert!(fm.slug.is_none());
        assert_eq!(body, raw);
    }
}
