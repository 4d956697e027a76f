//! ImageProcessor capability interface and its `image`-crate-backed default
//! implementation. Modeled as a small trait so the pipeline can swap in a
//! different backend without touching the scanner.

use std::io::Cursor;

use image::{GenericImageView, ImageReader};
use thiserror::Error;

use super::types::{ImageFormat, MediaDerivative, SizeSuffix};

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("decode failed: {0}")]
    Decode(#[from] image::ImageError),

    #[error("unsupported format for encoding: {0:?}")]
    UnsupportedEncode(ImageFormat),
}

/// One configured output: a size to target and the formats/qualities to
/// encode it as.
#[derive(Debug, Clone)]
pub struct SizeTarget {
    pub suffix: SizeSuffix,
    pub width: u32,
}

#[derive(Debug, Clone)]
pub struct FormatTarget {
    pub format: ImageFormat,
    pub quality: u8,
}

#[derive(Debug, Clone)]
pub struct ImageProcessorConfig {
    pub sizes: Vec<SizeTarget>,
    pub formats: Vec<FormatTarget>,
    pub require_md: bool,
}

impl Default for ImageProcessorConfig {
    fn default() -> Self {
        Self {
            sizes: vec![
                SizeTarget { suffix: SizeSuffix::Xs, width: 320 },
                SizeTarget { suffix: SizeSuffix::Sm, width: 640 },
                SizeTarget { suffix: SizeSuffix::Md, width: 1024 },
                SizeTarget { suffix: SizeSuffix::Lg, width: 1600 },
                SizeTarget { suffix: SizeSuffix::Xl, width: 2048 },
                SizeTarget { suffix: SizeSuffix::Xxl, width: 2560 },
            ],
            formats: vec![
                FormatTarget { format: ImageFormat::Webp, quality: 80 },
            ],
            require_md: true,
        }
    }
}

/// Output of processing a single image, before public URLs are attached.
pub struct RawDerivative {
    pub suffix: SizeSuffix,
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
    pub quality: u8,
    pub bytes: Vec<u8>,
}

/// Capability interface for image derivative generation (spec §9: model each
/// plugin as a capability interface with a small method set).
pub trait ImageProcessor: Send + Sync {
    fn process(
        &self,
        bytes: &[u8],
        config: &ImageProcessorConfig,
    ) -> Result<Vec<RawDerivative>, ImageError>;
}

/// Default implementation backed by the `image` crate.
pub struct DefaultImageProcessor;

impl ImageProcessor for DefaultImageProcessor {
    fn process(
        &self,
        bytes: &[u8],
        config: &ImageProcessorConfig,
    ) -> Result<Vec<RawDerivative>, ImageError> {
        let reader = ImageReader::new(Cursor::new(bytes)).with_guessed_format()?;
        let source = reader.decode()?;
        let (source_width, _source_height) = source.dimensions();

        let mut out = Vec::new();
        let mut md_emitted = false;
        for size in &config.sizes {
            // Never upscale: omit the derivative rather than faking it, unless
            // this is the `md` size and the caller requires it to always be
            // present, in which case it is clamped to the source's own width.
            let clamp_to_source = config.require_md && size.suffix == SizeSuffix::Md;
            if source_width < size.width && !clamp_to_source {
                continue;
            }
            let target_width = size.width.min(source_width);

            let resized = if source_width == target_width {
                source.clone()
            } else {
                let ratio = target_width as f64 / source_width as f64;
                let target_height = (source.dimensions().1 as f64 * ratio).round() as u32;
                source.resize(target_width, target_height.max(1), image::imageops::FilterType::Lanczos3)
            };
            let (w, h) = resized.dimensions();

            if size.suffix == SizeSuffix::Md {
                md_emitted = true;
            }

            for format_target in &config.formats {
                let encoded = encode(&resized, format_target.format, format_target.quality)?;
                out.push(RawDerivative {
                    suffix: size.suffix,
                    width: w,
                    height: h,
                    format: format_target.format,
                    quality: format_target.quality,
                    bytes: encoded,
                });
            }
        }

        // `md` must always be present unless explicitly disabled (spec §4.4),
        // even when the configured size list omits an explicit Md entry.
        if config.require_md && !md_emitted {
            for format_target in &config.formats {
                let encoded = encode(&source, format_target.format, format_target.quality)?;
                out.push(RawDerivative {
                    suffix: SizeSuffix::Md,
                    width: source.dimensions().0,
                    height: source.dimensions().1,
                    format: format_target.format,
                    quality: format_target.quality,
                    bytes: encoded,
                });
            }
        }
        Ok(out)
    }
}

fn encode(image: &image::DynamicImage, format: ImageFormat, quality: u8) -> Result<Vec<u8>, ImageError> {
    let mut buf = Vec::new();
    match format {
        ImageFormat::Jpeg => {
            let mut encoder =
                image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, quality);
            encoder.encode_image(image)?;
        }
        ImageFormat::Webp => {
            // The `image` crate's WebP encoder is lossless-only; quality is
            // accepted for API symmetry with the other formats and recorded
            // in the derivative metadata even though it isn't applied here.
            image
                .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::WebP)
                .map_err(ImageError::Decode)?;
        }
    }
    Ok(buf)
}

pub fn derivatives_to_output(
    raw: Vec<RawDerivative>,
    hash: &str,
    media_prefix: &str,
    public_base: &str,
) -> Vec<MediaDerivative> {
    raw.into_iter()
        .map(|d| {
            let output_path = format!("{media_prefix}/{hash}-{}.{}", d.suffix.as_str(), d.format.extension());
            let public_url = format!("{public_base}/{output_path}");
            MediaDerivative {
                size_suffix: Some(d.suffix),
                width: d.width,
                height: Some(d.height),
                format: d.format.extension().to_string(),
                quality: Some(d.quality),
                byte_size: d.bytes.len() as u64,
                output_path,
                public_url,
            }
        })
        .collect()
}
