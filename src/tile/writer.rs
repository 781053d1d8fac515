//! Patch encoding and persistence.
//!
//! Patches are written under a directory tree that groups them by label,
//! slide and size:
//!
//! ```text
//! <root>/<label>/<slide>/<size>/<x>_<y>.<ext>
//! ```
//!
//! where `x` and `y` are the top-left pixel of the patch on the slide.

use std::fs;
use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, RgbImage};

use crate::error::ExtractError;

use super::extract::ExtractedPatch;

/// Default JPEG quality (1-100).
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

/// Minimum allowed JPEG quality.
pub const MIN_JPEG_QUALITY: u8 = 1;

/// Maximum allowed JPEG quality.
pub const MAX_JPEG_QUALITY: u8 = 100;

/// Image format used for written patches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PatchFormat {
    /// Lossless PNG
    #[default]
    Png,

    /// JPEG at the given quality (clamped to 1-100)
    Jpeg { quality: u8 },
}

impl PatchFormat {
    /// File extension without the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            PatchFormat::Png => "png",
            PatchFormat::Jpeg { .. } => "jpg",
        }
    }
}

// =============================================================================
// Patch Writer
// =============================================================================

/// Encodes patches and writes them below a root directory.
#[derive(Debug, Clone)]
pub struct PatchWriter {
    root: PathBuf,
    format: PatchFormat,
}

impl PatchWriter {
    pub fn new(root: impl Into<PathBuf>, format: PatchFormat) -> Self {
        Self {
            root: root.into(),
            format,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn format(&self) -> PatchFormat {
        self.format
    }

    /// Encode a patch in the writer's format.
    pub fn encode(&self, patch: &RgbImage) -> Result<Vec<u8>, ExtractError> {
        let mut output = Vec::new();
        let (width, height) = patch.dimensions();

        let result = match self.format {
            PatchFormat::Png => PngEncoder::new(&mut output).write_image(
                patch.as_raw(),
                width,
                height,
                ExtendedColorType::Rgb8,
            ),
            PatchFormat::Jpeg { quality } => {
                JpegEncoder::new_with_quality(&mut output, clamp_quality(quality))
                    .encode_image(patch)
            }
        };

        result.map_err(|e| ExtractError::Encode {
            message: e.to_string(),
        })?;
        Ok(output)
    }

    /// Where a patch with these coordinates is written.
    pub fn path_for(&self, label: &str, slide_name: &str, size: u32, x: u32, y: u32) -> PathBuf {
        self.root
            .join(label)
            .join(slide_name)
            .join(size.to_string())
            .join(format!("{}_{}.{}", x, y, self.format.extension()))
    }

    /// Encode and write one patch, creating directories as needed.
    pub fn write(
        &self,
        patch: &RgbImage,
        label: &str,
        slide_name: &str,
        size: u32,
        x: u32,
        y: u32,
    ) -> Result<PathBuf, ExtractError> {
        let path = self.path_for(label, slide_name, size, x, y);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| ExtractError::Io(format!("{}: {}", parent.display(), e)))?;
        }

        let data = self.encode(patch)?;
        fs::write(&path, data).map_err(|e| ExtractError::Io(format!("{}: {}", path.display(), e)))?;
        Ok(path)
    }

    /// Write every size of an extracted patch.
    pub fn write_all(
        &self,
        patch: &ExtractedPatch,
        label: &str,
        slide_name: &str,
    ) -> Result<Vec<PathBuf>, ExtractError> {
        let (x, y) = (patch.position.x, patch.position.y);
        patch
            .resized
            .iter()
            .map(|(&size, image)| self.write(image, label, slide_name, size, x, y))
            .collect()
    }
}

// =============================================================================
// Utility Functions
// =============================================================================

/// Validate JPEG quality parameter.
#[inline]
pub fn is_valid_quality(quality: u8) -> bool {
    (MIN_JPEG_QUALITY..=MAX_JPEG_QUALITY).contains(&quality)
}

/// Clamp quality to valid range.
#[inline]
pub fn clamp_quality(quality: u8) -> u8 {
    quality.clamp(MIN_JPEG_QUALITY, MAX_JPEG_QUALITY)
}

// =============================================================================
// Tests
// =============================================================================
