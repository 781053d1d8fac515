//! Command-line configuration for wsi-patches.
//!
//! Every option except `--verbose` can also be set through an environment
//! variable with the `WSI_PATCHES_` prefix:
//!
//! - `WSI_PATCHES_OUTPUT_DIR` - Root directory for extracted patches
//! - `WSI_PATCHES_ANNOTATION_DIR` - Directory of `<slide>.txt` annotations
//! - `WSI_PATCHES_MASK_DIR` - Directory of tissue masks
//! - `WSI_PATCHES_PATCH_SIZE` - Patch size in pixels (default: 1024)
//! - `WSI_PATCHES_RESIZE_SIZES` - Comma-separated output sizes
//! - `WSI_PATCHES_PATCH_OVERLAP` - Overlap between neighbouring patches (default: 0)
//! - `WSI_PATCHES_ANNOTATION_OVERLAP` - Required annotation overlap (default: 1)
//! - `WSI_PATCHES_MASK_OVERLAP` - Required tissue mask overlap (default: 0.5)
//! - `WSI_PATCHES_CHECK_LUMINANCE` - Drop mostly blank patches (default: false)
//! - `WSI_PATCHES_SEED` - Shuffle seed (default: 1)
//! - `WSI_PATCHES_JPEG_QUALITY` - JPEG quality (default: 90)

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::annotation::CoverageRule;
use crate::pipeline::{ExtractionSettings, SlideJob, DEFAULT_FALLBACK_LABEL, DEFAULT_MASK_OVERLAP};
use crate::slide::slide_name;
use crate::tile::{
    is_valid_quality, GridOptions, PatchFormat, PatchWriter, DEFAULT_BLANK_FRACTION,
    DEFAULT_BLANK_THRESHOLD, DEFAULT_JPEG_QUALITY, DEFAULT_PATCH_SIZE, DEFAULT_SEED,
};

// =============================================================================
// Default Values
// =============================================================================

/// Default annotation overlap: tiles must lie fully inside a region.
pub const DEFAULT_ANNOTATION_OVERLAP: f64 = 1.0;

/// Default file name of the coordinate metadata written by `extract`.
pub const DEFAULT_METADATA_FILE: &str = "slide_coords.json";

/// Mask file extensions tried in a mask directory, in order.
pub const MASK_EXTENSIONS: &[&str] = &["txt", "png", "tif", "tiff", "svs"];

// =============================================================================
// CLI Arguments
// =============================================================================

/// wsi-patches - Patch extraction for Whole Slide Images.
#[derive(Parser, Debug, Clone)]
#[command(name = "wsi-patches")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn into_command(self) -> Command {
        self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Extract labeled patches from slides
    Extract(ExtractConfig),

    /// Merge coordinate metadata files from separate runs
    Merge(MergeConfig),

    /// Write annotations describing the patches recorded in a metadata file
    Annotate(AnnotateConfig),

    /// Report annotated area per label
    Area(AreaConfig),
}

/// Encoding of written patches.
#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Png,
    Jpeg,
}

// =============================================================================
// Extract
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct ExtractConfig {
    /// Slide images to extract from.
    #[arg(required = true)]
    pub slides: Vec<PathBuf>,

    /// Root directory for extracted patches.
    #[arg(short, long, env = "WSI_PATCHES_OUTPUT_DIR")]
    pub output_dir: PathBuf,

    /// Directory holding one `<slide>.txt` annotation per slide.
    #[arg(long, env = "WSI_PATCHES_ANNOTATION_DIR")]
    pub annotation_dir: Option<PathBuf>,

    /// Directory holding one tissue mask per slide (.txt, .png, .tif, .tiff or .svs).
    #[arg(long, env = "WSI_PATCHES_MASK_DIR")]
    pub mask_dir: Option<PathBuf>,

    /// Where to write coordinate metadata. Defaults to `<output-dir>/slide_coords.json`.
    #[arg(long, env = "WSI_PATCHES_METADATA")]
    pub metadata: Option<PathBuf>,

    // =========================================================================
    // Grid
    // =========================================================================
    /// Side length of extracted patches in pixels.
    #[arg(long, default_value_t = DEFAULT_PATCH_SIZE, env = "WSI_PATCHES_PATCH_SIZE")]
    pub patch_size: u32,

    /// Sizes to save each patch at (comma-separated).
    #[arg(long, env = "WSI_PATCHES_RESIZE_SIZES", value_delimiter = ',')]
    pub resize_sizes: Vec<u32>,

    /// Fraction of a patch shared with its neighbour, in [0, 1).
    #[arg(long, default_value_t = 0.0, env = "WSI_PATCHES_PATCH_OVERLAP")]
    pub patch_overlap: f64,

    /// Extra gap between non-overlapping patches.
    #[arg(long, env = "WSI_PATCHES_EXTRA_STRIDE")]
    pub extra_stride: Option<u32>,

    /// Visit tiles in a seeded random order.
    #[arg(long, default_value_t = false, env = "WSI_PATCHES_SHUFFLE")]
    pub shuffle: bool,

    /// Seed for the shuffle order.
    #[arg(long, default_value_t = DEFAULT_SEED, env = "WSI_PATCHES_SEED")]
    pub seed: u64,

    /// Grid index to start from when resuming.
    #[arg(long, default_value_t = 0, env = "WSI_PATCHES_START_INDEX")]
    pub start_index: usize,

    /// Maximum number of patches kept per slide.
    #[arg(long, env = "WSI_PATCHES_MAX_PATCHES")]
    pub max_patches: Option<usize>,

    // =========================================================================
    // Labeling
    // =========================================================================
    /// Required overlap with an annotation region; 1 means full containment.
    #[arg(long, default_value_t = DEFAULT_ANNOTATION_OVERLAP, env = "WSI_PATCHES_ANNOTATION_OVERLAP")]
    pub annotation_overlap: f64,

    /// Required overlap with the tissue mask.
    #[arg(long, default_value_t = DEFAULT_MASK_OVERLAP, env = "WSI_PATCHES_MASK_OVERLAP")]
    pub mask_overlap: f64,

    /// Require a single mask polygon to cover the tile instead of summing overlaps.
    #[arg(long, default_value_t = false, env = "WSI_PATCHES_SINGLE_REGION_MASK")]
    pub single_region_mask: bool,

    /// Label for tiles of slides without an annotation.
    #[arg(long, default_value = DEFAULT_FALLBACK_LABEL, env = "WSI_PATCHES_FALLBACK_LABEL")]
    pub fallback_label: String,

    /// Slides are tissue microarray cores.
    #[arg(long, default_value_t = false, env = "WSI_PATCHES_IS_TMA")]
    pub is_tma: bool,

    // =========================================================================
    // Background filtering
    // =========================================================================
    /// Drop patches that are mostly blank background.
    #[arg(long, default_value_t = false, env = "WSI_PATCHES_CHECK_LUMINANCE")]
    pub check_luminance: bool,

    /// Luminance above which a pixel is background.
    #[arg(long, default_value_t = DEFAULT_BLANK_THRESHOLD, env = "WSI_PATCHES_BLANK_THRESHOLD")]
    pub blank_threshold: f64,

    /// Fraction of background pixels at which a patch is dropped.
    #[arg(long, default_value_t = DEFAULT_BLANK_FRACTION, env = "WSI_PATCHES_BLANK_FRACTION")]
    pub blank_fraction: f64,

    // =========================================================================
    // Output
    // =========================================================================
    /// Image format of written patches.
    #[arg(long, value_enum, default_value_t = OutputFormat::Png, env = "WSI_PATCHES_FORMAT")]
    pub format: OutputFormat,

    /// JPEG quality (1-100).
    #[arg(long, default_value_t = DEFAULT_JPEG_QUALITY, env = "WSI_PATCHES_JPEG_QUALITY")]
    pub jpeg_quality: u8,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl ExtractConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.patch_size == 0 {
            return Err("patch_size must be greater than 0".to_string());
        }

        if self.resize_sizes.contains(&0) {
            return Err("resize_sizes must all be greater than 0".to_string());
        }

        if !(0.0..1.0).contains(&self.patch_overlap) {
            return Err("patch_overlap must be within [0, 1)".to_string());
        }

        if self.grid().stride().is_err() {
            return Err(format!(
                "patch_overlap {} leaves no stride for patch_size {}",
                self.patch_overlap, self.patch_size
            ));
        }

        for (name, value) in [
            ("annotation_overlap", self.annotation_overlap),
            ("mask_overlap", self.mask_overlap),
            ("blank_fraction", self.blank_fraction),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(format!("{} must be within [0, 1]", name));
            }
        }

        if !is_valid_quality(self.jpeg_quality) {
            return Err("jpeg_quality must be between 1 and 100".to_string());
        }

        if self.fallback_label.trim().is_empty() {
            return Err("fallback_label must not be empty".to_string());
        }

        Ok(())
    }

    pub fn grid(&self) -> GridOptions {
        let mut grid = GridOptions::new(self.patch_size).with_overlap(self.patch_overlap);
        if let Some(extra_stride) = self.extra_stride {
            grid = grid.with_extra_stride(extra_stride);
        }
        if self.shuffle {
            grid = grid.shuffled(self.seed);
        }
        grid
    }

    pub fn settings(&self) -> ExtractionSettings {
        let mut settings = ExtractionSettings::new(self.grid());
        settings.resize_sizes = self.resize_sizes.clone();
        settings.annotation_overlap = self.annotation_overlap;
        settings.mask_overlap = self.mask_overlap;
        settings.coverage_rule = if self.single_region_mask {
            CoverageRule::SingleRegion
        } else {
            CoverageRule::Cumulative
        };
        settings.check_luminance = self.check_luminance;
        settings.blank_threshold = self.blank_threshold;
        settings.blank_fraction = self.blank_fraction;
        settings.max_patches = self.max_patches;
        settings.start_index = self.start_index;
        settings.fallback_label = self.fallback_label.clone();
        settings.is_tma = self.is_tma;
        settings
    }

    pub fn patch_format(&self) -> PatchFormat {
        match self.format {
            OutputFormat::Png => PatchFormat::Png,
            OutputFormat::Jpeg => PatchFormat::Jpeg {
                quality: self.jpeg_quality,
            },
        }
    }

    pub fn writer(&self) -> PatchWriter {
        PatchWriter::new(&self.output_dir, self.patch_format())
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.metadata
            .clone()
            .unwrap_or_else(|| self.output_dir.join(DEFAULT_METADATA_FILE))
    }

    /// One job per slide, pairing it with any annotation or mask found for it.
    pub fn jobs(&self) -> Vec<SlideJob> {
        self.slides
            .iter()
            .map(|slide_path| {
                let name = slide_name(slide_path);
                let mut job = SlideJob::new(slide_path);

                if let Some(dir) = &self.annotation_dir {
                    let path = dir.join(format!("{}.txt", name));
                    if path.is_file() {
                        job = job.with_annotation(path);
                    }
                }

                if let Some(dir) = &self.mask_dir {
                    let found = MASK_EXTENSIONS
                        .iter()
                        .map(|ext| dir.join(format!("{}.{}", name, ext)))
                        .find(|path| path.is_file());
                    if let Some(path) = found {
                        job = job.with_mask(path);
                    }
                }

                job
            })
            .collect()
    }
}

// =============================================================================
// Merge
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct MergeConfig {
    /// Metadata files to merge.
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Merged metadata file to write.
    #[arg(short, long, env = "WSI_PATCHES_MERGE_OUTPUT")]
    pub output: PathBuf,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl MergeConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.inputs.is_empty() {
            return Err("at least one metadata file is required".to_string());
        }
        if self.inputs.contains(&self.output) {
            return Err("output must not be one of the inputs".to_string());
        }
        Ok(())
    }
}

// =============================================================================
// Annotate
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct AnnotateConfig {
    /// Coordinate metadata written by `extract`.
    #[arg(long, env = "WSI_PATCHES_METADATA")]
    pub metadata: PathBuf,

    /// Directory to write `<slide>.txt` annotations into.
    #[arg(short, long, env = "WSI_PATCHES_ANNOTATION_OUTPUT")]
    pub output_dir: PathBuf,

    /// Drop merged regions whose area is not above this value.
    #[arg(long, env = "WSI_PATCHES_SKIP_AREA")]
    pub skip_area: Option<f64>,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl AnnotateConfig {
    pub fn validate(&self) -> Result<(), String> {
        match self.skip_area {
            Some(area) if area.is_nan() || area < 0.0 => {
                Err("skip_area must be a non-negative number".to_string())
            }
            _ => Ok(()),
        }
    }
}

// =============================================================================
// Area
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct AreaConfig {
    /// Annotation files to measure.
    #[arg(required = true)]
    pub annotations: Vec<PathBuf>,

    /// Factor applied to every area, e.g. squared microns per pixel.
    #[arg(long, default_value_t = 1.0, env = "WSI_PATCHES_SCALE_FACTOR")]
    pub scale_factor: f64,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl AreaConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !self.scale_factor.is_finite() || self.scale_factor <= 0.0 {
            return Err("scale_factor must be a positive number".to_string());
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
