//! Pyramidal slides assembled from tiles.
//!
//! [`PyramidalSlide`] turns any [`TiledPyramid`] into a [`SlideImage`] by
//! stitching the tiles a region touches. Decoded tiles are kept in an LRU
//! cache: neighbouring patches usually straddle the same tiles, especially
//! when patches overlap or do not align with the tile grid.
//!
//! [`ImagePyramid`] is an in-memory tiled pyramid built from a decoded image.

use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use image::imageops::{self, FilterType};
use image::RgbImage;
use lru::LruCache;
use tracing::debug;

use crate::error::SlideError;

use super::raster::load_rgb;
use super::reader::{SlideImage, TiledPyramid};

/// Default number of decoded tiles kept per slide.
pub const DEFAULT_TILE_CACHE_CAPACITY: usize = 64;

/// Default tile size for [`ImagePyramid`].
pub const DEFAULT_PYRAMID_TILE_SIZE: u32 = 256;

/// Upper bound on the number of levels generated by [`ImagePyramid`].
const MAX_PYRAMID_LEVELS: usize = 16;

type TileKey = (usize, u32, u32);

// =============================================================================
// Pyramidal Slide
// =============================================================================

/// A tiled multi-resolution slide exposed through [`SlideImage`].
///
/// Regions are read from level 0. Lower resolution levels are used by
/// [`thumbnail`](Self::thumbnail) and [`read_level_region`](Self::read_level_region).
pub struct PyramidalSlide<P> {
    pyramid: P,
    tiles: Mutex<LruCache<TileKey, Arc<RgbImage>>>,
}

impl<P: TiledPyramid> PyramidalSlide<P> {
    /// Wrap a pyramid with the default tile cache capacity.
    pub fn new(pyramid: P) -> Self {
        Self::with_cache_capacity(pyramid, DEFAULT_TILE_CACHE_CAPACITY)
    }

    /// Wrap a pyramid, keeping at most `capacity` decoded tiles (minimum 1).
    pub fn with_cache_capacity(pyramid: P, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            pyramid,
            tiles: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn pyramid(&self) -> &P {
        &self.pyramid
    }

    pub fn level_count(&self) -> usize {
        self.pyramid.level_count()
    }

    /// Downsample factor of every level, level 0 first.
    pub fn level_downsamples(&self) -> Vec<f64> {
        (0..self.pyramid.level_count())
            .filter_map(|level| self.pyramid.level_downsample(level))
            .collect()
    }

    /// Dimensions of every level, level 0 first.
    pub fn level_dimensions(&self) -> Vec<(u32, u32)> {
        (0..self.pyramid.level_count())
            .filter_map(|level| self.pyramid.level_dimensions(level))
            .collect()
    }

    /// The whole lowest-resolution level as one image.
    pub fn thumbnail(&self) -> Result<RgbImage, SlideError> {
        self.read_downsampled(f64::INFINITY)
    }

    /// The whole slide, read from the deepest level that is no coarser than
    /// `downsample`.
    ///
    /// The result is not resized, so its dimensions are those of the chosen
    /// level.
    pub fn read_downsampled(&self, downsample: f64) -> Result<RgbImage, SlideError> {
        let level = self
            .pyramid
            .best_level_for_downsample(downsample)
            .ok_or(SlideError::InvalidLevel {
                level: 0,
                levels: 0,
            })?;
        let (width, height) = self.level_size(level)?;
        debug!(level, downsample, width, height, "Reading downsampled slide");
        self.read_level_region(level, 0, 0, width, height)
    }

    /// Read a `width × height` region at `level`, with `(x, y)` in that
    /// level's own pixel space.
    pub fn read_level_region(
        &self,
        level: usize,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    ) -> Result<RgbImage, SlideError> {
        let (level_w, level_h) = self.level_size(level)?;
        let (tile_w, tile_h) = self
            .pyramid
            .tile_size(level)
            .filter(|(w, h)| *w > 0 && *h > 0)
            .ok_or(SlideError::InvalidLevel {
                level,
                levels: self.pyramid.level_count(),
            })?;

        let mut region = RgbImage::new(width, height);
        if width == 0 || height == 0 || x >= level_w || y >= level_h {
            return Ok(region);
        }

        let x_end = x.saturating_add(width).min(level_w);
        let y_end = y.saturating_add(height).min(level_h);

        for tile_y in (y / tile_h)..=((y_end - 1) / tile_h) {
            for tile_x in (x / tile_w)..=((x_end - 1) / tile_w) {
                let tile = self.tile(level, tile_x, tile_y)?;
                let origin_x = tile_x * tile_w;
                let origin_y = tile_y * tile_h;

                // Overlap of the tile and the requested region, in level space
                let left = x.max(origin_x);
                let top = y.max(origin_y);
                let right = x_end.min(origin_x + tile.width());
                let bottom = y_end.min(origin_y + tile.height());
                if left >= right || top >= bottom {
                    continue;
                }

                let piece = imageops::crop_imm(
                    tile.as_ref(),
                    left - origin_x,
                    top - origin_y,
                    right - left,
                    bottom - top,
                )
                .to_image();
                imageops::replace(
                    &mut region,
                    &piece,
                    i64::from(left - x),
                    i64::from(top - y),
                );
            }
        }

        Ok(region)
    }

    fn level_size(&self, level: usize) -> Result<(u32, u32), SlideError> {
        self.pyramid
            .level_dimensions(level)
            .ok_or(SlideError::InvalidLevel {
                level,
                levels: self.pyramid.level_count(),
            })
    }

    fn tile(&self, level: usize, tile_x: u32, tile_y: u32) -> Result<Arc<RgbImage>, SlideError> {
        let key = (level, tile_x, tile_y);
        {
            let mut tiles = self.tiles.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(tile) = tiles.get(&key) {
                return Ok(Arc::clone(tile));
            }
        }

        debug!(level, tile_x, tile_y, "Reading tile");
        let tile = Arc::new(self.pyramid.read_tile(level, tile_x, tile_y)?);
        self.tiles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .put(key, Arc::clone(&tile));
        Ok(tile)
    }
}

impl<P: TiledPyramid> SlideImage for PyramidalSlide<P> {
    fn dimensions(&self) -> (u32, u32) {
        self.pyramid.level_dimensions(0).unwrap_or((0, 0))
    }

    fn read_region(&self, x: u32, y: u32, size: u32) -> Result<RgbImage, SlideError> {
        self.read_level_region(0, x, y, size, size)
    }
}

// =============================================================================
// In-memory Pyramid
// =============================================================================

/// A tiled pyramid held in memory.
///
/// Each level halves the previous one (rounding up) until the smaller side
/// fits in a single tile.
#[derive(Debug, Clone)]
pub struct ImagePyramid {
    levels: Vec<RgbImage>,
    tile_size: u32,
}

impl ImagePyramid {
    /// Build a pyramid from a base image.
    ///
    /// A `tile_size` of zero falls back to [`DEFAULT_PYRAMID_TILE_SIZE`].
    pub fn from_image(base: RgbImage, tile_size: u32) -> Self {
        let tile_size = if tile_size == 0 {
            DEFAULT_PYRAMID_TILE_SIZE
        } else {
            tile_size
        };

        let mut levels = vec![base];
        while levels.len() < MAX_PYRAMID_LEVELS {
            let Some(last) = levels.last() else { break };
            let (width, height) = last.dimensions();
            if width.min(height) <= tile_size {
                break;
            }
            let next = imageops::resize(
                last,
                width.div_ceil(2),
                height.div_ceil(2),
                FilterType::Triangle,
            );
            levels.push(next);
        }

        Self { levels, tile_size }
    }

    /// Decode an image file and build its pyramid.
    pub fn open(path: impl AsRef<Path>, tile_size: u32) -> Result<Self, SlideError> {
        Ok(Self::from_image(load_rgb(path.as_ref())?, tile_size))
    }
}

impl TiledPyramid for ImagePyramid {
    fn level_count(&self) -> usize {
        self.levels.len()
    }

    fn level_dimensions(&self, level: usize) -> Option<(u32, u32)> {
        self.levels.get(level).map(RgbImage::dimensions)
    }

    fn level_downsample(&self, level: usize) -> Option<f64> {
        let base_width = self.levels.first()?.width();
        let width = self.levels.get(level)?.width();
        if width == 0 {
            return Some(1.0);
        }
        Some(f64::from(base_width) / f64::from(width))
    }

    fn tile_size(&self, level: usize) -> Option<(u32, u32)> {
        (level < self.levels.len()).then_some((self.tile_size, self.tile_size))
    }

    fn read_tile(&self, level: usize, tile_x: u32, tile_y: u32) -> Result<RgbImage, SlideError> {
        let image = self.levels.get(level).ok_or(SlideError::InvalidLevel {
            level,
            levels: self.levels.len(),
        })?;

        let (width, height) = image.dimensions();
        let x = tile_x.saturating_mul(self.tile_size);
        let y = tile_y.saturating_mul(self.tile_size);
        if x >= width || y >= height {
            return Err(SlideError::TileOutOfBounds {
                level,
                x: tile_x,
                y: tile_y,
            });
        }

        let tile_w = self.tile_size.min(width - x);
        let tile_h = self.tile_size.min(height - y);
        Ok(imageops::crop_imm(image, x, y, tile_w, tile_h).to_image())
    }
}

// =============================================================================
// Tests
// =============================================================================
