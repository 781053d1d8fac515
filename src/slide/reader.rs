//! Traits for reading pixels from slide images.
//!
//! Two levels of abstraction live here:
//!
//! - [`SlideImage`] is the capability the grid generator and the patch
//!   extractor depend on: image dimensions and square region reads at full
//!   resolution. Both pyramidal slides and flat raster images (tissue
//!   microarray cores) implement it.
//! - [`TiledPyramid`] describes a tiled, multi-resolution slide. It is what a
//!   [`crate::slide::PyramidalSlide`] stitches regions from.

use image::RgbImage;

use crate::error::SlideError;

// =============================================================================
// Slide Image
// =============================================================================

/// Read access to the base-resolution pixels of an image.
///
/// Implementations return 3-channel RGB regions. Pixels of a region that fall
/// outside the image are black.
pub trait SlideImage {
    /// Width and height of the base (full resolution) image in pixels.
    fn dimensions(&self) -> (u32, u32);

    /// Read the square region `[x, x + size) × [y, y + size)`.
    fn read_region(&self, x: u32, y: u32, size: u32) -> Result<RgbImage, SlideError>;
}

impl<S: SlideImage + ?Sized> SlideImage for &S {
    fn dimensions(&self) -> (u32, u32) {
        (**self).dimensions()
    }

    fn read_region(&self, x: u32, y: u32, size: u32) -> Result<RgbImage, SlideError> {
        (**self).read_region(x, y, size)
    }
}

impl<S: SlideImage + ?Sized> SlideImage for Box<S> {
    fn dimensions(&self) -> (u32, u32) {
        (**self).dimensions()
    }

    fn read_region(&self, x: u32, y: u32, size: u32) -> Result<RgbImage, SlideError> {
        (**self).read_region(x, y, size)
    }
}

// =============================================================================
// Tiled Pyramid Trait
// =============================================================================

/// A tiled, multi-resolution slide.
///
/// Level 0 is the highest resolution. Tiles are addressed by their index in
/// the level's tile grid; edge tiles may be smaller than [`tile_size`].
///
/// [`tile_size`]: TiledPyramid::tile_size
pub trait TiledPyramid {
    fn level_count(&self) -> usize;

    /// `(width, height)` of a level, `None` past the last level.
    fn level_dimensions(&self, level: usize) -> Option<(u32, u32)>;

    /// Base width over level width; 1.0 at level 0.
    fn level_downsample(&self, level: usize) -> Option<f64>;

    /// Nominal tile size of a level.
    fn tile_size(&self, level: usize) -> Option<(u32, u32)>;

    /// Read one decoded tile.
    fn read_tile(&self, level: usize, tile_x: u32, tile_y: u32) -> Result<RgbImage, SlideError>;

    /// Columns and rows of the level's tile grid.
    fn tile_count(&self, level: usize) -> Option<(u32, u32)> {
        let (width, height) = self.level_dimensions(level)?;
        let (tile_width, tile_height) = self.tile_size(level)?;
        if tile_width == 0 || tile_height == 0 {
            return None;
        }
        Some((width.div_ceil(tile_width), height.div_ceil(tile_height)))
    }

    /// Deepest level whose downsample does not exceed `downsample`.
    ///
    /// Levels are assumed to be ordered by increasing downsample. Factors
    /// below 1.0 select level 0 and `f64::INFINITY` selects the last level.
    fn best_level_for_downsample(&self, downsample: f64) -> Option<usize> {
        let deepest = (0..self.level_count())
            .take_while(|&level| {
                self.level_downsample(level)
                    .is_some_and(|factor| factor <= downsample)
            })
            .last();
        deepest.or_else(|| (self.level_count() > 0).then_some(0))
    }
}

// =============================================================================
// Tests
// =============================================================================
