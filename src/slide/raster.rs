//! Flat, fully decoded images such as tissue microarray cores.
//!
//! Cores are small enough to hold in memory, so regions are cropped directly
//! from the decoded buffer. Before tiling, a core is padded on every side
//! (see [`expand`]) so that tiles can be centred on tissue at the core edge.

use std::path::Path;

use image::{imageops, DynamicImage, ImageError, ImageReader, Rgb, RgbImage};

use crate::error::SlideError;

use super::reader::SlideImage;

/// Extra border, as a fraction of the patch size, added around a core.
pub const CORE_BORDER_FACTOR: f64 = 0.3;

/// Side length of the top-left block averaged for the padding colour.
const FILL_SAMPLE_SIZE: u32 = 3;

/// Border width, in pixels, added on every side of an expanded core.
///
/// `floor((1 + 0.3 - overlap_threshold) * patch_size)`. Annotation vertices
/// drawn on the unexpanded core must be shifted by the same amount.
pub fn core_border(patch_size: u32, overlap_threshold: f64) -> u32 {
    let border = (1.0 + CORE_BORDER_FACTOR - overlap_threshold) * f64::from(patch_size);
    border.floor().max(0.0) as u32
}

/// Pad `core` on all sides by [`core_border`] pixels.
///
/// The border is filled with the per-channel mean of the top-left 3×3 block,
/// truncated to an integer.
pub fn expand(core: &RgbImage, patch_size: u32, overlap_threshold: f64) -> RgbImage {
    let border = core_border(patch_size, overlap_threshold);
    let (width, height) = core.dimensions();

    let fill = corner_mean(core);
    let mut expanded = RgbImage::from_pixel(width + 2 * border, height + 2 * border, fill);
    imageops::replace(&mut expanded, core, i64::from(border), i64::from(border));
    expanded
}

fn corner_mean(image: &RgbImage) -> Rgb<u8> {
    let block_w = image.width().min(FILL_SAMPLE_SIZE);
    let block_h = image.height().min(FILL_SAMPLE_SIZE);
    let count = block_w * block_h;
    if count == 0 {
        return Rgb([0, 0, 0]);
    }

    let mut sums = [0u32; 3];
    for y in 0..block_h {
        for x in 0..block_w {
            let Rgb(pixel) = image.get_pixel(x, y);
            for (sum, value) in sums.iter_mut().zip(pixel) {
                *sum += u32::from(*value);
            }
        }
    }

    Rgb(sums.map(|sum| (sum / count) as u8))
}

/// Decode an image file, sniffing the format from its header.
///
/// Extensions the `image` crate does not know, such as `.svs` (a TIFF
/// container), still decode when the content is a supported format.
pub(crate) fn open_image(path: &Path) -> Result<DynamicImage, ImageError> {
    ImageReader::open(path)?.with_guessed_format()?.decode()
}

/// Decode an image file into 8-bit RGB.
pub(crate) fn load_rgb(path: &Path) -> Result<RgbImage, SlideError> {
    let image = open_image(path).map_err(|e| match e {
        ImageError::IoError(io) => SlideError::Io(format!("{}: {}", path.display(), io)),
        other => SlideError::Decode {
            message: format!("{}: {}", path.display(), other),
        },
    })?;
    Ok(image.to_rgb8())
}

// =============================================================================
// Raster Image
// =============================================================================

/// A fully loaded RGB image exposed through [`SlideImage`].
#[derive(Debug, Clone)]
pub struct RasterImage {
    image: RgbImage,
}

impl RasterImage {
    pub fn new(image: RgbImage) -> Self {
        Self { image }
    }

    /// Decode an image file (PNG, JPEG or TIFF).
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SlideError> {
        Ok(Self::new(load_rgb(path.as_ref())?))
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn into_inner(self) -> RgbImage {
        self.image
    }

    /// Return a copy padded for core tiling. See [`expand`].
    pub fn expand(&self, patch_size: u32, overlap_threshold: f64) -> Self {
        Self::new(expand(&self.image, patch_size, overlap_threshold))
    }
}

impl From<RgbImage> for RasterImage {
    fn from(image: RgbImage) -> Self {
        Self::new(image)
    }
}

impl SlideImage for RasterImage {
    fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    fn read_region(&self, x: u32, y: u32, size: u32) -> Result<RgbImage, SlideError> {
        let mut region = RgbImage::new(size, size);
        let (width, height) = self.image.dimensions();
        if x >= width || y >= height {
            return Ok(region);
        }

        let crop_w = size.min(width - x);
        let crop_h = size.min(height - y);
        let crop = imageops::crop_imm(&self.image, x, y, crop_w, crop_h).to_image();
        imageops::replace(&mut region, &crop, 0, 0);
        Ok(region)
    }
}

// =============================================================================
// Tests
// =============================================================================
