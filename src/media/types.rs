use serde::{Deserialize, Serialize};

/// The recognized derivative size tokens, in ascending order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizeSuffix {
    Xs,
    Sm,
    Md,
    Lg,
    Xl,
    #[serde(rename = "2xl")]
    Xxl,
}

impl SizeSuffix {
    pub fn as_str(&self) -> &'static str {
        match self {
            SizeSuffix::Xs => "xs",
            SizeSuffix::Sm => "sm",
            SizeSuffix::Md => "md",
            SizeSuffix::Lg => "lg",
            SizeSuffix::Xl => "xl",
            SizeSuffix::Xxl => "2xl",
        }
    }

    pub const ALL: [SizeSuffix; 6] = [
        SizeSuffix::Xs,
        SizeSuffix::Sm,
        SizeSuffix::Md,
        SizeSuffix::Lg,
        SizeSuffix::Xl,
        SizeSuffix::Xxl,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Webp,
    Jpeg,
}

impl ImageFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Webp => "webp",
            ImageFormat::Jpeg => "jpg",
        }
    }
}

/// A single size/format-specific output of a source media file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaDerivative {
    pub size_suffix: Option<SizeSuffix>,
    pub width: u32,
    pub height: Option<u32>,
    pub format: String,
    pub quality: Option<u8>,
    pub output_path: String,
    pub public_url: String,
    pub byte_size: u64,
}

/// Identity = content hash (SHA-256 of raw bytes). All derivatives for a
/// given media share this hash, which is the sole identifier in output
/// paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Media {
    pub hash: String,
    pub original_filename: String,
    pub folder: Vec<String>,
    pub extension: String,
    pub mime_class: MimeClass,
    pub derivatives: Vec<MediaDerivative>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MimeClass {
    Image,
    Video,
    Model,
    Other,
}

/// The cached subset of a `Media` record reused across runs, keyed by hash
/// in `CacheContext.media`.
pub type MediaDerivativeSet = Vec<MediaDerivative>;

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif", "bmp", "tiff"];
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "webm", "mov", "mkv"];
pub const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "flac", "ogg", "midi", "mid"];
pub const MODEL_EXTENSIONS: &[&str] = &["glb", "gltf", "obj", "fbx", "stl"];

pub fn classify(extension: &str) -> Option<MimeClass> {
    let ext = extension.to_ascii_lowercase();
    if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        Some(MimeClass::Image)
    } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
        Some(MimeClass::Video)
    } else if AUDIO_EXTENSIONS.contains(&ext.as_str()) || MODEL_EXTENSIONS.contains(&ext.as_str()) {
        Some(if MODEL_EXTENSIONS.contains(&ext.as_str()) {
            MimeClass::Model
        } else {
            MimeClass::Other
        })
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_known_extensions() {
        assert_eq!(classify("JPG"), Some(MimeClass::Image));
        assert_eq!(classify("mp4"), Some(MimeClass::Video));
        assert_eq!(classify("glb"), Some(MimeClass::Model));
        assert_eq!(classify("mid"), Some(MimeClass::Other));
        assert_eq!(classify("exe"), None);
    }

    #[test]
    fn size_suffix_string_forms() {
        assert_eq!(SizeSuffix::Md.as_str(), "md");
        assert_eq!(SizeSuffix::Xxl.as_str(), "2xl");
    }
}
