//! MarkdownPipeline: parses every Markdown document in a vault, resolves
//! wikilinks/embeds/aliases across the whole set, and renders each to HTML
//! plus the metadata captured in [`types::Post`] (spec §4.5).

mod iframe;
mod mermaid;
mod preprocess;
mod render;
pub mod slug;
pub mod types;

use std::cell::RefCell;
use std::collections::HashMap;

use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::config::MarkdownConfig;
use crate::issues::IssueCollector;
use crate::media::{Media, MimeClass};

pub use types::{Post, TocEntry};

#[derive(Debug, Error)]
pub enum MarkdownError {
    #[error("io error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// One discovered Markdown source file, prior to any parsing.
pub struct RawDocument {
    pub hash: String,
    pub original_path: String,
    pub filename: String,
    pub folder: Vec<String>,
    pub raw: String,
}

/// Hashes and wraps a Markdown file's contents for pipeline processing.
pub fn load_document(original_path: &str, folder: Vec<String>, bytes: &[u8]) -> RawDocument {
    let hash = hex::encode(Sha256::digest(bytes));
    let filename = std::path::Path::new(original_path)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| original_path.to_string());
    RawDocument {
        hash,
        original_path: original_path.to_string(),
        filename,
        folder,
        raw: String::from_utf8_lossy(bytes).into_owned(),
    }
}

/// The per-document interface the raw-text preprocessing pass uses to
/// resolve wikilinks and embeds against the whole-vault reference tables.
pub trait ReferenceResolver {
    fn resolve_media(&self, target: &str) -> Option<String>;
    fn resolve_note(&self, target: &str) -> Option<String>;
    fn remove_dead_links(&self) -> bool;
    fn record_unresolved(&self, stage: &str, target: &str);
}

struct DocResolver<'a> {
    own_hash: &'a str,
    slugs: &'a slug::SlugTable,
    aliases: &'a slug::AliasTable,
    filename_to_hash: &'a HashMap<String, String>,
    media_by_filename: &'a HashMap<String, &'a Media>,
    note_prefix: &'a str,
    remove_dead_links: bool,
    issues: &'a IssueCollector,
    /// Content hash of every post a wikilink in this document resolved to,
    /// in resolution order (spec §3: `Post.links` is a list of resolved
    /// post hashes, not rendered URLs).
    resolved_links: RefCell<Vec<String>>,
}

impl<'a> ReferenceResolver for DocResolver<'a> {
    fn resolve_media(&self, target: &str) -> Option<String> {
        let key = target.to_ascii_lowercase();
        let media = self.media_by_filename.get(&key)?;
        let derivative = media
            .derivatives
            .iter()
            .find(|d| d.size_suffix.map(|s| s.as_str()) == Some("md"))
            .or_else(|| media.derivatives.first())?;
        Some(derivative.public_url.clone())
    }

    fn resolve_note(&self, target: &str) -> Option<String> {
        if let Some(hash) = self.slugs.slug_to_hash.get(target) {
            let slug = self.slugs.hash_to_slug.get(hash)?;
            self.resolved_links.borrow_mut().push(hash.clone());
            return Some(self.note_url(slug));
        }
        if let Some(slug) = self.aliases.alias_to_slug.get(target) {
            if let Some(hash) = self.slugs.slug_to_hash.get(slug.as_str()) {
                self.resolved_links.borrow_mut().push(hash.clone());
            }
            return Some(self.note_url(slug));
        }
        let key = target.to_ascii_lowercase();
        if let Some(hash) = self.filename_to_hash.get(&key) {
            if let Some(slug) = self.slugs.hash_to_slug.get(hash) {
                self.resolved_links.borrow_mut().push(hash.clone());
                return Some(self.note_url(slug));
            }
        }
        let alias_key_match = self
            .aliases
            .alias_to_slug
            .iter()
            .find(|(alias, _)| alias.to_ascii_lowercase() == key)
            .map(|(_, slug)| slug.clone());
        if let Some(slug) = &alias_key_match {
            if let Some(hash) = self.slugs.slug_to_hash.get(slug.as_str()) {
                self.resolved_links.borrow_mut().push(hash.clone());
            }
        }
        alias_key_match.map(|slug| self.note_url(&slug))
    }

    fn remove_dead_links(&self) -> bool {
        self.remove_dead_links
    }

    fn record_unresolved(&self, stage: &str, target: &str) {
        self.issues.warn(
            format!("markdown.{stage}"),
            self.own_hash.to_string(),
            format!("unresolved reference '{target}'"),
        );
    }
}

impl<'a> DocResolver<'a> {
    fn note_url(&self, slug: &str) -> String {
        format!("{}/{}", self.note_prefix.trim_end_matches('/'), slug)
    }
}

/// Renders every document in a vault, running the three reference-resolution
/// passes described in spec §4.5: (1) build the slug table in walk order,
/// (2) build the alias table from frontmatter aliases, (3) resolve and
/// rewrite links/embeds before rendering each document to HTML.
pub fn build_posts(
    documents: Vec<RawDocument>,
    media: &[Media],
    config: &MarkdownConfig,
    issues: &IssueCollector,
) -> Vec<Post> {
    let parsed: Vec<(RawDocument, types::Frontmatter, String)> = documents
        .into_iter()
        .map(|doc| {
            let (frontmatter, body) = types::split_frontmatter(&doc.raw);
            let body = body.to_string();
            (doc, frontmatter, body)
        })
        .collect();

    let slug_candidates: Vec<(String, String)> = parsed
        .iter()
        .map(|(doc, fm, _)| {
            let candidate = fm.slug.clone().unwrap_or_else(|| slug::slugify(&doc.filename));
            (doc.hash.clone(), candidate)
        })
        .collect();
    let slugs = slug::SlugTable::build(&slug_candidates, issues);

    let alias_entries: Vec<(String, Vec<String>)> = parsed
        .iter()
        .map(|(doc, fm, _)| (doc.hash.clone(), fm.aliases.clone()))
        .collect();
    let aliases = slug::AliasTable::build(&alias_entries, &slugs, issues);

    let filename_to_hash: HashMap<String, String> = parsed
        .iter()
        .map(|(doc, _, _)| (doc.filename.to_ascii_lowercase(), doc.hash.clone()))
        .collect();

    let media_by_filename: HashMap<String, &Media> = media
        .iter()
        .map(|m| (m.original_filename.to_ascii_lowercase(), m))
        .collect();

    let mut posts: Vec<Post> = Vec::with_capacity(parsed.len());

    for (doc, frontmatter, body) in parsed {
        let slug = slugs
            .hash_to_slug
            .get(&doc.hash)
            .cloned()
            .unwrap_or_else(|| slug::slugify(&doc.filename));

        let resolver = DocResolver {
            own_hash: &doc.hash,
            slugs: &slugs,
            aliases: &aliases,
            filename_to_hash: &filename_to_hash,
            media_by_filename: &media_by_filename,
            note_prefix: &config.note_prefix,
            remove_dead_links: config.remove_dead_links,
            issues,
            resolved_links: RefCell::new(Vec::new()),
        };

        let segments = preprocess::segment_by_fences(&body);
        let mut rewritten = String::with_capacity(body.len());
        for segment in segments {
            match segment {
                preprocess::Segment::Prose(prose) => {
                    let prose = preprocess::transform_callouts(&prose);
                    let prose = preprocess::transform_links_and_embeds(&prose, &resolver);
                    let prose = preprocess::transform_math(&prose, config.parse_formulas);
                    rewritten.push_str(&prose);
                }
                preprocess::Segment::Code(code) => rewritten.push_str(&code),
            }
        }
        let links = resolver.resolved_links.into_inner();

        let rendered = render::render_body(&rewritten, config);

        let title = frontmatter
            .title
            .clone()
            .unwrap_or_else(|| doc.filename.clone());

        let mut frontmatter_map = frontmatter.extra.clone();
        rewrite_media_field(&mut frontmatter_map, &media_by_filename, config);

        posts.push(Post {
            hash: doc.hash,
            slug: slug.clone(),
            filename: doc.filename,
            original_path: doc.original_path,
            folder: doc.folder,
            url: format!("{}/{}", config.note_prefix.trim_end_matches('/'), slug),
            title,
            html: rendered.html,
            plaintext: rendered.plaintext,
            first_paragraph_text: rendered.first_paragraph_text,
            first_image: rendered.first_image,
            frontmatter: frontmatter_map,
            word_count: rendered.word_count,
            toc: rendered.toc,
            links,
        });
    }

    posts
}

/// Replaces a frontmatter field naming a raw media filename (e.g. `image:
/// cover.png`) with sibling `{field}-{size}` fields pointing at each
/// generated derivative, dropping the original field (spec §4.5).
fn rewrite_media_field(
    frontmatter: &mut std::collections::BTreeMap<String, serde_json::Value>,
    media_by_filename: &HashMap<String, &Media>,
    config: &MarkdownConfig,
) {
    let Some(serde_json::Value::String(filename)) = frontmatter.get(&config.media_field_name).cloned() else {
        return;
    };
    let Some(media) = media_by_filename.get(&filename.to_ascii_lowercase()) else {
        return;
    };
    if media.mime_class != MimeClass::Image {
        return;
    }

    for derivative in &media.derivatives {
        let Some(suffix) = derivative.size_suffix else { continue };
        let key = format!("{}-{}", config.media_field_name, suffix.as_str());
        frontmatter.insert(key, serde_json::Value::String(derivative.public_url.clone()));
    }
    frontmatter.remove(&config.media_field_name);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MarkdownConfig;

    fn doc(path: &str, raw: &str) -> RawDocument {
        load_document(path, Vec::new(), raw.as_bytes())
    }

    #[test]
    fn minimal_vault_renders_title_and_html() {
        let issues = IssueCollector::new();
        let posts = build_posts(
            vec![doc("hello.md", "---\ntitle: Hello\n---\n# Hi\n\nWorld.\n")],
            &[],
            &MarkdownConfig::default(),
            &issues,
        );
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].title, "Hello");
        assert!(posts[0].html.contains("<h1"));
    }

    #[test]
    fn resolves_wikilink_between_two_posts() {
        let issues = IssueCollector::new();
        let posts = build_posts(
            vec![
                doc("dog.md", "# Dog\n"),
                doc("cat.md", "See [[Dog]] for details.\n"),
            ],
            &[],
            &MarkdownConfig::default(),
            &issues,
        );
        let cat = posts.iter().find(|p| p.slug == "cat").unwrap();
        assert!(cat.html.contains(&format!("href=\"{}\"", "/notes/dog")));
        let dog = posts.iter().find(|p| p.slug == "dog").unwrap();
        assert_eq!(cat.links, vec![dog.hash.clone()]);
    }

    #[test]
    fn links_contain_resolved_post_hashes_not_urls_and_skip_external_links() {
        let issues = IssueCollector::new();
        let posts = build_posts(
            vec![
                doc("dog.md", "# Dog\n"),
                doc(
                    "cat.md",
                    "See [[Dog]] and also [an external site](https://example.com/a).\n",
                ),
            ],
            &[],
            &MarkdownConfig::default(),
            &issues,
        );
        let dog = posts.iter().find(|p| p.slug == "dog").unwrap();
        let dog_hash = dog.hash.clone();
        let cat = posts.iter().find(|p| p.slug == "cat").unwrap();
        assert_eq!(cat.links, vec![dog_hash]);
        assert!(cat.html.contains("https://example.com/a"));
    }

    #[test]
    fn slug_collision_resolves_deterministically() {
        let issues = IssueCollector::new();
        let posts = build_posts(
            vec![
                doc("a/dog.md", "# Dog A\n"),
                doc("b/dog.md", "# Dog B\n"),
            ],
            &[],
            &MarkdownConfig::default(),
            &issues,
        );
        let slugs: Vec<&str> = posts.iter().map(|p| p.slug.as_str()).collect();
        assert!(slugs.contains(&"dog"));
        assert!(slugs.contains(&"dog-2"));
    }
}
