//! Slug and alias table construction: the first two reference-resolution
//! passes. Both run to completion, sequentially, before any link rewriting.

use std::collections::HashMap;

use crate::issues::IssueCollector;

/// Lowercases and replaces runs of non-alphanumeric characters with `-`.
pub fn slugify(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut last_was_dash = false;
    for ch in input.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
            last_was_dash = false;
        } else if !last_was_dash && !out.is_empty() {
            out.push('-');
            last_was_dash = true;
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}

pub struct SlugTable {
    /// slug -> post hash, insertion-ordered by first-seen walk order via the
    /// underlying HashMap only for lookups; collision order is enforced by
    /// the caller feeding candidates in walk order.
    pub slug_to_hash: HashMap<String, String>,
    pub hash_to_slug: HashMap<String, String>,
}

impl SlugTable {
    pub fn build(candidates: &[(String, String)], issues: &IssueCollector) -> Self {
        // candidates: (hash, candidate_slug), already in deterministic walk order.
        let mut slug_to_hash = HashMap::new();
        let mut hash_to_slug = HashMap::new();

        for (hash, candidate) in candidates {
            let mut slug = candidate.clone();
            let mut suffix = 2;
            while slug_to_hash.contains_key(&slug) {
                issues.warn(
                    "markdown.slug",
                    hash.clone(),
                    format!("slug '{candidate}' collides, renaming to '{candidate}-{suffix}'"),
                );
                slug = format!("{candidate}-{suffix}");
                suffix += 1;
            }
            slug_to_hash.insert(slug.clone(), hash.clone());
            hash_to_slug.insert(hash.clone(), slug);
        }

        Self { slug_to_hash, hash_to_slug }
    }
}

pub struct AliasTable {
    pub alias_to_slug: HashMap<String, String>,
}

impl AliasTable {
    /// `entries`: (hash, declared aliases) in walk order. `slugs` is the
    /// frozen slug table; aliases colliding with an existing slug or a
    /// previously-registered alias are dropped with a warning.
    pub fn build(entries: &[(String, Vec<String>)], slugs: &SlugTable, issues: &IssueCollector) -> Self {
        let mut alias_to_slug = HashMap::new();

        for (hash, aliases) in entries {
            let own_slug = match slugs.hash_to_slug.get(hash) {
                Some(s) => s.clone(),
                None => continue,
            };
            for alias in aliases {
                if slugs.slug_to_hash.contains_key(alias) || alias_to_slug.contains_key(alias) {
                    issues.warn(
                        "markdown.alias",
                        hash.clone(),
                        format!("alias '{alias}' collides with an existing slug or alias, dropping"),
                    );
                    continue;
                }
                alias_to_slug.insert(alias.clone(), own_slug.clone());
            }
        }

        Self { alias_to_slug }
    }
}
