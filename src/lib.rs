//! # wsi-patches
//!
//! Patch extraction for Whole Slide Images (WSI) and tissue microarray cores.
//!
//! This library tiles slide images into fixed-size patches, labels each patch
//! from polygon annotations, filters out background and records which patches
//! were kept so separate runs can be merged.
//!
//! ## Features
//!
//! - **Lazy slide reading**: TIFF and SVS slides decoded one tile at a time
//! - **Deterministic grids**: random-access tile positions with optional seeded shuffling
//! - **Annotation labeling**: exact containment or area-overlap matching against polygons
//! - **Tissue masks**: text or raster masks restricting extraction to clean areas
//! - **Multi-size output**: each patch read once and resampled to every requested size
//! - **Mergeable metadata**: per-slide coordinates stored as JSON
//!
//! ## Architecture
//!
//! - [`slide`] - Slide image sources (tiled pyramids and in-memory rasters)
//! - [`tile`] - Tile grid, patch extraction and patch writing
//! - [`annotation`] - Polygon annotations, tissue masks and synthesized annotations
//! - [`metadata`] - Coordinate metadata store
//! - [`pipeline`] - Per-slide and batch extraction runs
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use wsi_patches::{
//!     run, ExtractionSettings, GridOptions, PatchFormat, PatchWriter, SlideJob,
//! };
//!
//! let mut settings = ExtractionSettings::new(GridOptions::new(512));
//! settings.resize_sizes = vec![256];
//! settings.check_luminance = true;
//!
//! let writer = PatchWriter::new("patches", PatchFormat::Png);
//! let jobs = [SlideJob::new("slides/VOA-1000A.svs").with_annotation("annotations/VOA-1000A.txt")];
//!
//! let store = run(&settings, &jobs, &writer).unwrap();
//! store.save("patches/slide_coords.json").unwrap();
//! ```

pub mod annotation;
pub mod config;
pub mod error;
pub mod metadata;
pub mod pipeline;
pub mod slide;
pub mod tile;

// Re-export commonly used types
pub use annotation::{
    AnnotationOptions, CoverageRule, MatchMode, PatchCoverage, RegionAnnotation, TissueMask,
    CLEAN_AREA_LABEL,
};
pub use config::{AnnotateConfig, AreaConfig, Cli, Command, ExtractConfig, MergeConfig};
pub use error::{
    AnnotationError, ConfigError, ExtractError, GridError, MetadataError, SlideError,
};
pub use metadata::{CoordsMetadata, SlideCoordsDocument, SlideCoordsStore};
pub use pipeline::{extract_slide, run, ExtractionSettings, Labeler, SlideJob};
pub use slide::{
    ImagePyramid, PyramidalSlide, RasterImage, SlideImage, TiffPyramid, TiledPyramid,
};
pub use tile::{
    check_luminance, extract, extract_and_resize, resize, GridOptions, PatchExtractor,
    PatchFormat, PatchWriter, TileGrid, TilePosition,
};
