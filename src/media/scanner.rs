//! MediaScanner: recursive walk of the input directory, content hashing,
//! cache-hit short-circuit, and bounded-parallel derivative generation.

use std::collections::HashMap;
use std::path::Path;

use rayon::prelude::*;
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::cache::CacheContext;
use crate::issues::IssueCollector;

use super::image_processor::{
    ImageProcessor, ImageProcessorConfig, derivatives_to_output,
};
use super::types::{Media, MediaDerivative, MimeClass, classify};

#[derive(Debug, Clone, Default)]
pub struct ScanStats {
    pub media_hits: u64,
    pub media_misses: u64,
}

pub struct ScanResult {
    pub media: Vec<Media>,
    pub public_urls: HashMap<String, String>,
    /// Freshly generated derivative bytes, keyed by `output_path`, for the
    /// publisher to upload. Cache hits contribute nothing here since their
    /// bytes already live at that path from a prior deployment.
    pub uploads: HashMap<String, Vec<u8>>,
    pub stats: ScanStats,
}

/// Enumerate candidate media files under `root` in deterministic
/// (lexicographic) order, per the ordering guarantee every downstream stage
/// depends on for reproducible tie-breaks and logging.
fn discover(root: &Path) -> Vec<std::path::PathBuf> {
    let mut paths: Vec<_> = WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| {
            let ext = e.path().extension()?.to_str()?.to_ascii_lowercase();
            classify(&ext)?;
            Some(e.path().to_path_buf())
        })
        .collect();
    paths.sort();
    paths
}

fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Scan `root`, hashing and (for cache-miss images) generating derivatives.
/// `concurrency` bounds the rayon thread pool used for the CPU-heavy work.
pub fn scan(
    root: &Path,
    media_prefix: &str,
    public_base: &str,
    cache: &CacheContext,
    processor: &dyn ImageProcessor,
    image_config: &ImageProcessorConfig,
    concurrency: usize,
    issues: &IssueCollector,
) -> ScanResult {
    let files = discover(root);

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(concurrency.max(1))
        .build()
        .expect("failed to build media scanner thread pool");

    let results: Vec<Option<(Media, String, Vec<(String, Vec<u8>)>)>> = pool.install(|| {
        files
            .par_iter()
            .map(|path| process_one(path, root, media_prefix, public_base, cache, processor, image_config, issues))
            .collect()
    });

    let mut media = Vec::new();
    let mut public_urls = HashMap::new();
    let mut uploads = HashMap::new();
    let mut stats = ScanStats::default();

    for item in results.into_iter().flatten() {
        let (m, md_url, new_uploads) = item;
        public_urls.insert(m.hash.clone(), md_url);
        if cache.media.contains_key(&m.hash) {
            stats.media_hits += 1;
        } else {
            stats.media_misses += 1;
        }
        uploads.extend(new_uploads);
        media.push(m);
    }
    // Keep output ordering deterministic (hash order) regardless of the
    // parallel completion order above.
    media.sort_by(|a, b| a.hash.cmp(&b.hash));

    ScanResult { media, public_urls, uploads, stats }
}

#[allow(clippy::too_many_arguments)]
fn process_one(
    path: &Path,
    root: &Path,
    media_prefix: &str,
    public_base: &str,
    cache: &CacheContext,
    processor: &dyn ImageProcessor,
    image_config: &ImageProcessorConfig,
    issues: &IssueCollector,
) -> Option<(Media, String, Vec<(String, Vec<u8>)>)> {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) => {
            issues.error("media", path.display().to_string(), format!("read failed: {e}"));
            return None;
        }
    };
    let hash = hash_bytes(&bytes);
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    let mime_class = classify(&extension).unwrap_or(MimeClass::Other);
    let original_filename = path.file_name()?.to_string_lossy().to_string();
    let folder = path
        .strip_prefix(root)
        .ok()?
        .parent()
        .map(|p| p.components().map(|c| c.as_os_str().to_string_lossy().to_string()).collect())
        .unwrap_or_default();

    if let Some(cached) = cache.media.get(&hash) {
        let md_url = cached
            .iter()
            .find(|d| d.size_suffix.map(|s| s.as_str()) == Some("md"))
            .map(|d| d.public_url.clone())
            .unwrap_or_else(|| format!("{public_base}/{media_prefix}/{hash}.{extension}"));
        return Some((
            Media {
                hash,
                original_filename,
                folder,
                extension,
                mime_class,
                derivatives: cached.clone(),
            },
            md_url,
            Vec::new(),
        ));
    }

    let mut uploads = Vec::new();
    let derivatives = if mime_class == MimeClass::Image {
        match processor.process(&bytes, image_config) {
            Ok(raw) => {
                let derivative_bytes: Vec<Vec<u8>> = raw.iter().map(|d| d.bytes.clone()).collect();
                let outputs = derivatives_to_output(raw, &hash, media_prefix, public_base);
                for (output, bytes) in outputs.iter().zip(derivative_bytes.into_iter()) {
                    uploads.push((output.output_path.clone(), bytes));
                }
                outputs
            }
            Err(e) => {
                issues.error("media", path.display().to_string(), format!("derivative generation failed: {e}"));
                Vec::new()
            }
        }
    } else {
        let output_path = format!("{media_prefix}/{hash}.{extension}");
        uploads.push((output_path.clone(), bytes.clone()));
        vec![MediaDerivative {
            size_suffix: None,
            width: 0,
            height: None,
            format: extension.clone(),
            quality: None,
            byte_size: bytes.len() as u64,
            public_url: format!("{public_base}/{output_path}"),
            output_path,
        }]
    };

    let md_url = derivatives
        .iter()
        .find(|d| d.size_suffix.map(|s| s.as_str()) == Some("md"))
        .map(|d| d.public_url.clone())
        .or_else(|| derivatives.first().map(|d| d.public_url.clone()))
        .unwrap_or_else(|| format!("{public_base}/{media_prefix}/{hash}.{extension}"));

    Some((
        Media {
            hash,
            original_filename,
            folder,
            extension,
            mime_class,
            derivatives,
        },
        md_url,
        uploads,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::image_processor::DefaultImageProcessor;
    use std::io::Write;

    fn write_png(dir: &Path, name: &str, width: u32, height: u32) {
        let img = image::DynamicImage::new_rgb8(width, height);
        let mut buf = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        let mut f = std::fs::File::create(dir.join(name)).unwrap();
        f.write_all(&buf).unwrap();
    }

    #[test]
    fn scans_and_hashes_image_deterministically() {
        let dir = tempfile::TempDir::new().unwrap();
        write_png(dir.path(), "img.png", 100, 100);

        let issues = IssueCollector::new();
        let cache = CacheContext::default();
        let config = ImageProcessorConfig {
            sizes: vec![super::super::image_processor::SizeTarget {
                suffix: super::super::types::SizeSuffix::Xs,
                width: 50,
            }],
            formats: vec![super::super::image_processor::FormatTarget {
                format: super::super::types::ImageFormat::Webp,
                quality: 80,
            }],
            require_md: false,
        };

        let result = scan(
            dir.path(),
            "media",
            "https://cdn.example.com",
            &cache,
            &DefaultImageProcessor,
            &config,
            2,
            &issues,
        );

        assert_eq!(result.media.len(), 1);
        assert_eq!(result.stats.media_misses, 1);
        assert_eq!(result.media[0].hash.len(), 64);
    }

    #[test]
    fn cache_hit_skips_regeneration() {
        let dir = tempfile::TempDir::new().unwrap();
        write_png(dir.path(), "img.png", 100, 100);
        let bytes = std::fs::read(dir.path().join("img.png")).unwrap();
        let hash = hash_bytes(&bytes);

        let mut cache = CacheContext::default();
        cache.media.insert(
            hash.clone(),
            vec![MediaDerivative {
                size_suffix: Some(super::super::types::SizeSuffix::Md),
                width: 50,
                height: Some(50),
                format: "webp".into(),
                quality: Some(80),
                byte_size: 10,
                output_path: format!("media/{hash}-md.webp"),
                public_url: format!("https://cdn.example.com/media/{hash}-md.webp"),
            }],
        );

        let issues = IssueCollector::new();
        let config = ImageProcessorConfig::default();
        let result = scan(
            dir.path(),
            "media",
            "https://cdn.example.com",
            &cache,
            &DefaultImageProcessor,
            &config,
            2,
            &issues,
        );
        assert_eq!(result.stats.media_hits, 1);
        assert_eq!(result.stats.media_misses, 0);
        assert_eq!(result.media[0].derivatives.len(), 1);
    }
}
