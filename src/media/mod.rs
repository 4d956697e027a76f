//! MediaScanner + ImageProcessor plugin: discovers media files, computes
//! content hashes, and emits per-size/per-format derivatives.

pub mod image_processor;
pub mod scanner;
pub mod types;

pub use image_processor::{DefaultImageProcessor, ImageProcessor, ImageProcessorConfig};
pub use scanner::{ScanResult, ScanStats, scan};
pub use types::{Media, MediaDerivative, MediaDerivativeSet, MimeClass, SizeSuffix};
