//! Slide image abstraction layer.
//!
//! The grid generator and the patch extractor only ever see a [`SlideImage`]:
//! base-resolution dimensions plus square region reads. Two kinds of image
//! implement it:
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │     Grid generator / Patch extractor    │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │            SlideImage Trait             │
//! │   dimensions() + read_region(x, y, n)   │
//! └────────────────────┬────────────────────┘
//!                      │
//!          ┌───────────┴───────────┐
//!          ▼                       ▼
//! ┌─────────────────┐    ┌─────────────────────┐
//! │ PyramidalSlide  │    │    RasterImage      │
//! │ (tiled, cached) │    │ (TMA core, in RAM)  │
//! └────────┬────────┘    └─────────────────────┘
//!          ▼
//! ┌─────────────────┐
//! │  TiledPyramid   │
//! └────────┬────────┘
//!          │
//!    ┌─────┴──────┐
//!    ▼            ▼
//! TiffPyramid  ImagePyramid
//! (.tif/.svs,  (PNG/JPEG,
//!  lazy tiles)  in RAM)
//! ```
//!
//! Tissue microarray cores are padded with [`expand`] before tiling; the
//! same border is applied to their annotations (see [`core_border`]).

mod pyramid;
mod raster;
mod reader;
mod tiff_pyramid;

pub use pyramid::{
    ImagePyramid, PyramidalSlide, DEFAULT_PYRAMID_TILE_SIZE, DEFAULT_TILE_CACHE_CAPACITY,
};
pub use raster::{core_border, expand, RasterImage, CORE_BORDER_FACTOR};
pub(crate) use raster::open_image;
pub use reader::{SlideImage, TiledPyramid};
pub use tiff_pyramid::TiffPyramid;

use std::path::Path;

/// Extensions opened as lazily decoded TIFF pyramids.
pub const TIFF_EXTENSIONS: &[&str] = &["tif", "tiff", "svs"];

/// Whether `path` names a TIFF container, going by its extension.
pub fn is_tiff_path(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| TIFF_EXTENSIONS.contains(&ext.as_str()))
}

/// Slide name derived from a file path: the file name without its extension.
pub fn slide_name(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}
