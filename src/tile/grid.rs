//! Tile grid generation.
//!
//! A [`TileGrid`] enumerates the top-left corners of every patch that fits in
//! an image, without touching pixel data. Positions are computed from a
//! linear index, so any index can be read directly and an interrupted run can
//! resume from where it stopped.
//!
//! # Layout
//!
//! With stride `s` and patch size `p` over a `w × h` image:
//!
//! ```text
//! tiles_x = floor((w - p) / s) + 1
//! tiles_y = floor((h - p) / s) + 1
//! index i -> tile (i mod tiles_x, i div tiles_x) -> pixel (tile_x * s, tile_y * s)
//! ```
//!
//! Unshuffled grids are row-major (x varies fastest). Shuffled grids map the
//! index through a permutation fixed at construction from the seed.

use geo::Coord;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::error::{ConfigError, GridError};
use crate::slide::SlideImage;

/// Default patch size in pixels.
pub const DEFAULT_PATCH_SIZE: u32 = 1024;

/// Default shuffle seed.
pub const DEFAULT_SEED: u64 = 1;

// =============================================================================
// Grid Options
// =============================================================================

/// Parameters controlling patch placement.
#[derive(Debug, Clone, PartialEq)]
pub struct GridOptions {
    /// Side length of each square patch
    pub patch_size: u32,

    /// Fraction of a patch shared with its neighbour, in `[0, 1)`
    pub patch_overlap: f64,

    /// Additional gap between patches, only honoured when `patch_overlap` is 0
    pub extra_stride: Option<u32>,

    /// Visit tiles in a seeded random order
    pub shuffle: bool,

    /// Seed for the shuffle permutation
    pub seed: u64,
}

impl GridOptions {
    /// Adjacent, non-overlapping patches in row-major order.
    pub fn new(patch_size: u32) -> Self {
        Self {
            patch_size,
            patch_overlap: 0.0,
            extra_stride: None,
            shuffle: false,
            seed: DEFAULT_SEED,
        }
    }

    pub fn with_overlap(mut self, patch_overlap: f64) -> Self {
        self.patch_overlap = patch_overlap;
        self
    }

    pub fn with_extra_stride(mut self, extra_stride: u32) -> Self {
        self.extra_stride = Some(extra_stride);
        self
    }

    pub fn shuffled(mut self, seed: u64) -> Self {
        self.shuffle = true;
        self.seed = seed;
        self
    }

    /// Pixel distance between the top-left corners of neighbouring patches.
    pub fn stride(&self) -> Result<u32, ConfigError> {
        if self.patch_size == 0 {
            return Err(ConfigError::InvalidPatchSize(self.patch_size));
        }
        if !(0.0..1.0).contains(&self.patch_overlap) {
            return Err(ConfigError::InvalidOverlap(self.patch_overlap));
        }

        if self.patch_overlap == 0.0 {
            return Ok(self
                .patch_size
                .saturating_add(self.extra_stride.unwrap_or(0)));
        }

        let stride = ((1.0 - self.patch_overlap) * f64::from(self.patch_size)).floor() as u32;
        if stride == 0 {
            return Err(ConfigError::ZeroStride {
                patch_size: self.patch_size,
                overlap: self.patch_overlap,
            });
        }
        Ok(stride)
    }
}

impl Default for GridOptions {
    fn default() -> Self {
        Self::new(DEFAULT_PATCH_SIZE)
    }
}

// =============================================================================
// Tile Position
// =============================================================================

/// A patch location on the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TilePosition {
    /// Column in the tile grid (0-indexed from left)
    pub tile_x: u32,

    /// Row in the tile grid (0-indexed from top)
    pub tile_y: u32,

    /// Pixel X of the patch's top-left corner
    pub x: u32,

    /// Pixel Y of the patch's top-left corner
    pub y: u32,
}

impl TilePosition {
    /// Corner points of the patch footprint, clockwise from the top-left.
    pub fn corners(&self, patch_size: u32) -> [Coord<f64>; 4] {
        let x0 = f64::from(self.x);
        let y0 = f64::from(self.y);
        let x1 = x0 + f64::from(patch_size);
        let y1 = y0 + f64::from(patch_size);
        [
            Coord { x: x0, y: y0 },
            Coord { x: x1, y: y0 },
            Coord { x: x1, y: y1 },
            Coord { x: x0, y: y1 },
        ]
    }
}

// =============================================================================
// Tile Grid
// =============================================================================

/// Random-access sequence of patch positions covering an image.
#[derive(Debug, Clone)]
pub struct TileGrid {
    width: u32,
    height: u32,
    patch_size: u32,
    stride: u32,
    tiles_x: u32,
    tiles_y: u32,
    order: Option<Vec<usize>>,
}

impl TileGrid {
    /// Build the grid for an image of `(width, height)` pixels.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the patch size is zero, the overlap
    /// is outside `[0, 1)`, the stride degenerates to zero, or the patch does
    /// not fit inside the image.
    pub fn new((width, height): (u32, u32), options: &GridOptions) -> Result<Self, GridError> {
        let stride = options.stride()?;
        let patch_size = options.patch_size;
        if patch_size > width || patch_size > height {
            return Err(ConfigError::PatchExceedsImage {
                patch_size,
                width,
                height,
            }
            .into());
        }

        let tiles_x = (width - patch_size) / stride + 1;
        let tiles_y = (height - patch_size) / stride + 1;

        let order = options.shuffle.then(|| {
            let mut order: Vec<usize> = (0..tiles_x as usize * tiles_y as usize).collect();
            order.shuffle(&mut SmallRng::seed_from_u64(options.seed));
            order
        });

        Ok(Self {
            width,
            height,
            patch_size,
            stride,
            tiles_x,
            tiles_y,
            order,
        })
    }

    /// Build the grid over a slide image's base dimensions.
    pub fn for_image<S: SlideImage + ?Sized>(
        image: &S,
        options: &GridOptions,
    ) -> Result<Self, GridError> {
        Self::new(image.dimensions(), options)
    }

    /// Total number of tiles.
    pub fn len(&self) -> usize {
        self.tiles_x as usize * self.tiles_y as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn patch_size(&self) -> u32 {
        self.patch_size
    }

    pub fn stride(&self) -> u32 {
        self.stride
    }

    /// Number of tile columns and rows.
    pub fn tile_counts(&self) -> (u32, u32) {
        (self.tiles_x, self.tiles_y)
    }

    pub fn is_shuffled(&self) -> bool {
        self.order.is_some()
    }

    /// Position of the `index`-th tile in iteration order.
    pub fn get(&self, index: usize) -> Result<TilePosition, GridError> {
        let len = self.len();
        if index >= len {
            return Err(GridError::IndexOutOfRange { index, len });
        }
        Ok(self.position(index))
    }

    /// Iterate over every tile.
    pub fn iter(&self) -> TileIter<'_> {
        self.iter_from(0)
    }

    /// Iterate starting at `start`, e.g. to resume an interrupted run.
    pub fn iter_from(&self, start: usize) -> TileIter<'_> {
        TileIter {
            grid: self,
            next: start.min(self.len()),
        }
    }

    fn position(&self, index: usize) -> TilePosition {
        let linear = match &self.order {
            Some(order) => order[index],
            None => index,
        };
        let tiles_x = self.tiles_x as usize;
        let tile_x = (linear % tiles_x) as u32;
        let tile_y = (linear / tiles_x) as u32;
        TilePosition {
            tile_x,
            tile_y,
            x: tile_x * self.stride,
            y: tile_y * self.stride,
        }
    }
}

impl<'a> IntoIterator for &'a TileGrid {
    type Item = TilePosition;
    type IntoIter = TileIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the positions of a [`TileGrid`].
#[derive(Debug, Clone)]
pub struct TileIter<'a> {
    grid: &'a TileGrid,
    next: usize,
}

impl Iterator for TileIter<'_> {
    type Item = TilePosition;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.grid.len() {
            return None;
        }
        let position = self.grid.position(self.next);
        self.next += 1;
        Some(position)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.grid.len() - self.next;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for TileIter<'_> {}

// =============================================================================
// Tests
// =============================================================================
