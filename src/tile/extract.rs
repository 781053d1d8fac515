//! Patch extraction and resizing.
//!
//! Patches are read once at the native patch size and then resampled with a
//! Lanczos filter to every requested size. Extraction keeps no state of its
//! own beyond the source image it reads from.

use std::collections::BTreeMap;

use image::imageops::{self, FilterType};
use image::RgbImage;

use crate::error::{ExtractError, GridError, SlideError};
use crate::slide::SlideImage;

use super::grid::{GridOptions, TileGrid, TilePosition};

/// Luminance above which a pixel counts as blank background.
pub const DEFAULT_BLANK_THRESHOLD: f64 = 210.0;

/// Fraction of blank pixels at which a patch is rejected.
pub const DEFAULT_BLANK_FRACTION: f64 = 0.75;

/// Read the square patch at `(x, y)` from the base level.
pub fn extract<S: SlideImage + ?Sized>(
    source: &S,
    x: u32,
    y: u32,
    size: u32,
) -> Result<RgbImage, SlideError> {
    source.read_region(x, y, size)
}

/// Resample `patch` to `size × size` with a Lanczos3 filter.
///
/// Returns an unchanged copy when the patch already has that size.
pub fn resize(patch: &RgbImage, size: u32) -> RgbImage {
    if patch.dimensions() == (size, size) {
        return patch.clone();
    }
    imageops::resize(patch, size, size, FilterType::Lanczos3)
}

/// Extract a patch of `extract_size` and resize it to `resize_size`.
pub fn extract_and_resize<S: SlideImage + ?Sized>(
    source: &S,
    x: u32,
    y: u32,
    extract_size: u32,
    resize_size: u32,
) -> Result<RgbImage, SlideError> {
    let patch = extract(source, x, y, extract_size)?;
    if extract_size == resize_size {
        return Ok(patch);
    }
    Ok(resize(&patch, resize_size))
}

/// Whether a patch contains enough tissue to keep.
///
/// Luminance is `0.2126 R + 0.7152 G + 0.0722 B`. Returns `true` when the
/// fraction of pixels brighter than `blank_threshold` is strictly less than
/// `blank_fraction`. Empty patches are never tissue.
pub fn check_luminance(patch: &RgbImage, blank_threshold: f64, blank_fraction: f64) -> bool {
    let total = patch.width() as usize * patch.height() as usize;
    if total == 0 {
        return false;
    }

    let bright = patch
        .pixels()
        .filter(|pixel| {
            let [r, g, b] = pixel.0;
            let luminance =
                0.2126 * f64::from(r) + 0.7152 * f64::from(g) + 0.0722 * f64::from(b);
            luminance > blank_threshold
        })
        .count();

    (bright as f64 / total as f64) < blank_fraction
}

/// [`check_luminance`] with the default threshold and fraction.
pub fn is_tissue(patch: &RgbImage) -> bool {
    check_luminance(patch, DEFAULT_BLANK_THRESHOLD, DEFAULT_BLANK_FRACTION)
}

/// Resize `patch` to each of `sizes`, keyed by size.
///
/// `patch_size` is always present in the result.
pub fn resize_all(patch: &RgbImage, patch_size: u32, sizes: &[u32]) -> BTreeMap<u32, RgbImage> {
    let mut resized = BTreeMap::new();
    resized.insert(patch_size, patch.clone());
    for &size in sizes {
        resized
            .entry(size)
            .or_insert_with(|| resize(patch, size));
    }
    resized
}

// =============================================================================
// Patch Extractor
// =============================================================================

/// A patch read from the grid together with its resized variants.
#[derive(Debug, Clone)]
pub struct ExtractedPatch {
    /// Where the patch was read from
    pub position: TilePosition,

    /// The patch at its native size
    pub patch: RgbImage,

    /// The patch at every requested size, native size included
    pub resized: BTreeMap<u32, RgbImage>,
}

/// Tiles a slide image and extracts the patch at each grid position.
pub struct PatchExtractor<'a, S: ?Sized> {
    source: &'a S,
    grid: TileGrid,
    resize_sizes: Vec<u32>,
}

impl<'a, S: SlideImage + ?Sized> PatchExtractor<'a, S> {
    /// Build the grid over `source` and remember the sizes to produce.
    ///
    /// The native patch size is put first in the size list when it was not
    /// requested explicitly.
    pub fn new(
        source: &'a S,
        options: &GridOptions,
        resize_sizes: &[u32],
    ) -> Result<Self, GridError> {
        let grid = TileGrid::for_image(source, options)?;

        let mut sizes = resize_sizes.to_vec();
        if !sizes.contains(&options.patch_size) {
            sizes.insert(0, options.patch_size);
        }

        Ok(Self {
            source,
            grid,
            resize_sizes: sizes,
        })
    }

    pub fn grid(&self) -> &TileGrid {
        &self.grid
    }

    pub fn resize_sizes(&self) -> &[u32] {
        &self.resize_sizes
    }

    pub fn len(&self) -> usize {
        self.grid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grid.is_empty()
    }

    /// Extract the `index`-th patch in grid order.
    pub fn get(&self, index: usize) -> Result<ExtractedPatch, ExtractError> {
        let position = self.grid.get(index)?;
        Ok(self.extract_at(position)?)
    }

    /// Extract the patch at an arbitrary grid position.
    pub fn extract_at(&self, position: TilePosition) -> Result<ExtractedPatch, SlideError> {
        let patch_size = self.grid.patch_size();
        let patch = extract(self.source, position.x, position.y, patch_size)?;
        let resized = resize_all(&patch, patch_size, &self.resize_sizes);
        Ok(ExtractedPatch {
            position,
            patch,
            resized,
        })
    }

    /// Extract every patch in grid order.
    pub fn iter(&self) -> impl Iterator<Item = Result<ExtractedPatch, SlideError>> + '_ {
        self.grid.iter().map(|position| self.extract_at(position))
    }
}

// =============================================================================
// Tests
// =============================================================================
