//! Tile grid generation and patch extraction.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              Orchestrator               │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │             PatchExtractor              │
//! │  ┌──────────────┐  ┌─────────────────┐  │
//! │  │   TileGrid   │  │ extract/resize  │  │
//! │  │  (positions, │  │ (read once,     │  │
//! │  │   shuffle)   │  │  Lanczos N×)    │  │
//! │  └──────────────┘  └─────────────────┘  │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │               SlideImage                │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`TileGrid`]: random-access, optionally shuffled sequence of [`TilePosition`]s
//! - [`PatchExtractor`]: reads the patch at each grid position in several sizes
//! - [`check_luminance`]: rejects mostly-blank background patches
//! - [`PatchWriter`]: encodes patches to PNG or JPEG on disk
//!
//! # Example
//!
//! ```
//! use wsi_patches::tile::{GridOptions, TileGrid};
//!
//! let grid = TileGrid::new((4096, 2048), &GridOptions::new(1024)).unwrap();
//! assert_eq!(grid.len(), 8);
//!
//! let position = grid.get(5).unwrap();
//! assert_eq!((position.tile_x, position.tile_y), (1, 1));
//! assert_eq!((position.x, position.y), (1024, 1024));
//! ```

mod extract;
mod grid;
mod writer;

pub use extract::{
    check_luminance, extract, extract_and_resize, is_tissue, resize, resize_all, ExtractedPatch,
    PatchExtractor, DEFAULT_BLANK_FRACTION, DEFAULT_BLANK_THRESHOLD,
};
pub use grid::{GridOptions, TileGrid, TileIter, TilePosition, DEFAULT_PATCH_SIZE, DEFAULT_SEED};
pub use writer::{
    clamp_quality, is_valid_quality, PatchFormat, PatchWriter, DEFAULT_JPEG_QUALITY,
    MAX_JPEG_QUALITY, MIN_JPEG_QUALITY,
};
