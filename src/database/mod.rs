//! DatabasePlugin: optionally materializes posts, media, embeddings, and
//! similarity rows into a single-file SQLite database shipped as a build
//! artifact (spec §4.8).
//!
//! `rusqlite` (bundled) is used in place of the ledger's `fjall` store
//! because `fjall` is a directory of SSTables, not a single portable file,
//! and this artifact's contract requires exactly one file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use rusqlite::Connection;
use thiserror::Error;

use crate::markdown::Post;
use crate::media::Media;
use crate::similarity::PairScores;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingKind {
    Text,
    Image,
}

impl EmbeddingKind {
    fn as_str(&self) -> &'static str {
        match self {
            EmbeddingKind::Text => "text",
            EmbeddingKind::Image => "image",
        }
    }
}

fn vector_to_blob(vector: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(vector.len() * 4);
    for value in vector {
        out.extend_from_slice(&value.to_le_bytes());
    }
    out
}

fn create_schema(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS posts (
            hash TEXT PRIMARY KEY,
            slug TEXT NOT NULL UNIQUE,
            title TEXT NOT NULL,
            url TEXT NOT NULL,
            html TEXT NOT NULL,
            word_count INTEGER NOT NULL
         );
         CREATE TABLE IF NOT EXISTS media (
            hash TEXT PRIMARY KEY,
            original_filename TEXT NOT NULL,
            mime_class TEXT NOT NULL
         );
         CREATE TABLE IF NOT EXISTS embeddings (
            hash TEXT NOT NULL,
            kind TEXT NOT NULL,
            vector BLOB NOT NULL,
            PRIMARY KEY (hash, kind)
         );
         CREATE TABLE IF NOT EXISTS similarity (
            hash_a TEXT NOT NULL,
            hash_b TEXT NOT NULL,
            score REAL NOT NULL,
            PRIMARY KEY (hash_a, hash_b)
         );",
    )?;
    Ok(())
}

/// Writes every table in a single transaction, per spec, so a reader never
/// observes a partially populated database.
fn populate(
    conn: &mut Connection,
    posts: &[Post],
    media: &[Media],
    post_embeddings: &HashMap<String, Vec<f32>>,
    media_embeddings: &HashMap<String, Vec<f32>>,
    similarity: &PairScores,
) -> Result<(), DatabaseError> {
    let tx = conn.transaction()?;

    {
        let mut stmt = tx.prepare(
            "INSERT OR REPLACE INTO posts (hash, slug, title, url, html, word_count) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        for post in posts {
            stmt.execute(rusqlite::params![
                post.hash,
                post.slug,
                post.title,
                post.url,
                post.html,
                post.word_count,
            ])?;
        }
    }

    {
        let mut stmt = tx.prepare(
            "INSERT OR REPLACE INTO media (hash, original_filename, mime_class) VALUES (?1, ?2, ?3)",
        )?;
        for item in media {
            stmt.execute(rusqlite::params![
                item.hash,
                item.original_filename,
                format!("{:?}", item.mime_class),
            ])?;
        }
    }

    {
        let mut stmt = tx.prepare(
            "INSERT OR REPLACE INTO embeddings (hash, kind, vector) VALUES (?1, ?2, ?3)",
        )?;
        for (hash, vector) in post_embeddings {
            stmt.execute(rusqlite::params![hash, EmbeddingKind::Text.as_str(), vector_to_blob(vector)])?;
        }
        for (hash, vector) in media_embeddings {
            stmt.execute(rusqlite::params![hash, EmbeddingKind::Image.as_str(), vector_to_blob(vector)])?;
        }
    }

    {
        let mut stmt = tx.prepare(
            "INSERT OR REPLACE INTO similarity (hash_a, hash_b, score) VALUES (?1, ?2, ?3)",
        )?;
        for (key, score) in similarity {
            let Some((hash_a, hash_b)) = key.split_once('-') else { continue };
            stmt.execute(rusqlite::params![hash_a, hash_b, *score as f64])?;
        }
    }

    tx.commit()?;
    Ok(())
}

/// Builds the single-file database at `output_path` when the plugin is
/// enabled. Returns `None` without touching the filesystem when disabled,
/// matching the "no file, no error" contract.
pub fn build_database(
    output_path: &Path,
    enabled: bool,
    posts: &[Post],
    media: &[Media],
    post_embeddings: &HashMap<String, Vec<f32>>,
    media_embeddings: &HashMap<String, Vec<f32>>,
    similarity: &PairScores,
) -> Result<Option<PathBuf>, DatabaseError> {
    if !enabled {
        return Ok(None);
    }

    let mut conn = Connection::open(output_path)?;
    create_schema(&conn)?;
    populate(&mut conn, posts, media, post_embeddings, media_embeddings, similarity)?;
    Ok(Some(output_path.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MimeClass;

    fn sample_post() -> Post {
        Post {
            hash: "h1".to_string(),
            slug: "hello".to_string(),
            filename: "hello".to_string(),
            original_path: "hello.md".to_string(),
            folder: vec![],
            url: "/notes/hello".to_string(),
            title: "Hello".to_string(),
            html: "<p>hi</p>".to_string(),
            plaintext: "hi".to_string(),
            first_paragraph_text: None,
            first_image: None,
            frontmatter: Default::default(),
            word_count: 1,
            toc: vec![],
            links: vec![],
        }
    }

    fn sample_media() -> Media {
        Media {
            hash: "m1".to_string(),
            original_filename: "cover.png".to_string(),
            folder: vec![],
            extension: "png".to_string(),
            mime_class: MimeClass::Image,
            derivatives: vec![],
        }
    }

    #[test]
    fn disabled_plugin_produces_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.sqlite3");
        let result = build_database(&path, false, &[], &[], &HashMap::new(), &HashMap::new(), &HashMap::new()).unwrap();
        assert!(result.is_none());
        assert!(!path.exists());
    }

    #[test]
    fn enabled_plugin_writes_all_four_tables() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.sqlite3");
        let mut post_embeddings = HashMap::new();
        post_embeddings.insert("h1".to_string(), vec![0.1, 0.2, 0.3]);
        let mut similarity = PairScores::new();
        similarity.insert("h1-m1".to_string(), 0.5);

        let result = build_database(
            &path,
            true,
            &[sample_post()],
            &[sample_media()],
            &post_embeddings,
            &HashMap::new(),
            &similarity,
        )
        .unwrap();
        assert!(result.is_some());

        let conn = Connection::open(&path).unwrap();
        let posts: i64 = conn.query_row("SELECT COUNT(*) FROM posts", [], |r| r.get(0)).unwrap();
        let media: i64 = conn.query_row("SELECT COUNT(*) FROM media", [], |r| r.get(0)).unwrap();
        let embeddings: i64 = conn.query_row("SELECT COUNT(*) FROM embeddings", [], |r| r.get(0)).unwrap();
        let sims: i64 = conn.query_row("SELECT COUNT(*) FROM similarity", [], |r| r.get(0)).unwrap();
        assert_eq!(posts, 1);
        assert_eq!(media, 1);
        assert_eq!(embeddings, 1);
        assert_eq!(sims, 1);
    }
}
