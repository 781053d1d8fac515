//! Slide-by-slide extraction runs.
//!
//! [`extract_slide`] walks the tile grid of one opened slide, decides a label
//! for every tile, drops background and writes the kept patches. [`run`]
//! does the same for a batch of slides and gathers their coordinates into a
//! [`SlideCoordsStore`].
//!
//! A slide that cannot be opened or read is skipped with a warning so one
//! corrupt file does not abort a long batch. Invalid settings, annotations
//! or masks stop the run.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::annotation::{
    write_annotation, AnnotationOptions, CoverageRule, PatchCoverage, RegionAnnotation,
    TissueMask,
};
use crate::error::{ConfigError, ExtractError, GridError, SlideError};
use crate::metadata::{CoordsMetadata, SlideCoordsStore};
use crate::slide::{
    is_tiff_path, slide_name, ImagePyramid, PyramidalSlide, RasterImage, SlideImage, TiffPyramid,
    DEFAULT_PYRAMID_TILE_SIZE,
};
use crate::tile::{
    check_luminance, GridOptions, PatchExtractor, PatchWriter, TilePosition,
    DEFAULT_BLANK_FRACTION, DEFAULT_BLANK_THRESHOLD,
};

/// Label given to tiles when no annotation is supplied.
pub const DEFAULT_FALLBACK_LABEL: &str = "Tissue";

/// Default required overlap with a tissue mask.
pub const DEFAULT_MASK_OVERLAP: f64 = 0.5;

// =============================================================================
// Settings
// =============================================================================

/// Parameters shared by every slide of a run.
#[derive(Debug, Clone)]
pub struct ExtractionSettings {
    /// Patch placement
    pub grid: GridOptions,

    /// Sizes every kept patch is written at
    pub resize_sizes: Vec<u32>,

    /// Required overlap with an annotation region, 1 for containment
    pub annotation_overlap: f64,

    /// Required overlap with the tissue mask
    pub mask_overlap: f64,

    /// How mask overlaps combine
    pub coverage_rule: CoverageRule,

    /// Drop mostly-blank patches
    pub check_luminance: bool,

    pub blank_threshold: f64,

    pub blank_fraction: f64,

    /// Stop after this many kept patches per slide
    pub max_patches: Option<usize>,

    /// First grid index to visit, for resuming
    pub start_index: usize,

    /// Label for tiles of unannotated slides
    pub fallback_label: String,

    /// Slides are tissue microarray cores rather than whole slides
    pub is_tma: bool,

    /// Tile size of the in-memory pyramid built for whole slides
    pub pyramid_tile_size: u32,
}

impl ExtractionSettings {
    pub fn new(grid: GridOptions) -> Self {
        Self {
            grid,
            resize_sizes: Vec::new(),
            annotation_overlap: 1.0,
            mask_overlap: DEFAULT_MASK_OVERLAP,
            coverage_rule: CoverageRule::default(),
            check_luminance: false,
            blank_threshold: DEFAULT_BLANK_THRESHOLD,
            blank_fraction: DEFAULT_BLANK_FRACTION,
            max_patches: None,
            start_index: 0,
            fallback_label: DEFAULT_FALLBACK_LABEL.to_string(),
            is_tma: false,
            pyramid_tile_size: DEFAULT_PYRAMID_TILE_SIZE,
        }
    }

    fn annotation_options(&self) -> AnnotationOptions {
        let options = AnnotationOptions::new(self.annotation_overlap);
        if self.is_tma {
            options.for_core(self.grid.patch_size)
        } else {
            options
        }
    }
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self::new(GridOptions::default())
    }
}

/// One slide to extract, with its optional annotation and mask files.
#[derive(Debug, Clone, PartialEq)]
pub struct SlideJob {
    pub slide_path: PathBuf,
    pub annotation_path: Option<PathBuf>,
    pub mask_path: Option<PathBuf>,
}

impl SlideJob {
    pub fn new(slide_path: impl Into<PathBuf>) -> Self {
        Self {
            slide_path: slide_path.into(),
            annotation_path: None,
            mask_path: None,
        }
    }

    pub fn with_annotation(mut self, path: impl Into<PathBuf>) -> Self {
        self.annotation_path = Some(path.into());
        self
    }

    pub fn with_mask(mut self, path: impl Into<PathBuf>) -> Self {
        self.mask_path = Some(path.into());
        self
    }

    /// Slide name: the slide file's stem.
    pub fn slide_name(&self) -> String {
        slide_name(&self.slide_path)
    }
}

// =============================================================================
// Labeler
// =============================================================================

/// Decides which label, if any, a tile is saved under.
#[derive(Debug, Clone)]
pub struct Labeler {
    annotation: Option<RegionAnnotation>,
    mask: Option<TissueMask>,
    fallback_label: String,
}

impl Labeler {
    /// Labels every tile with `fallback_label`.
    pub fn new(fallback_label: impl Into<String>) -> Self {
        Self {
            annotation: None,
            mask: None,
            fallback_label: fallback_label.into(),
        }
    }

    pub fn with_annotation(mut self, annotation: RegionAnnotation) -> Self {
        self.annotation = Some(annotation);
        self
    }

    pub fn with_mask(mut self, mask: TissueMask) -> Self {
        self.mask = Some(mask);
        self
    }

    pub fn annotation(&self) -> Option<&RegionAnnotation> {
        self.annotation.as_ref()
    }

    pub fn mask(&self) -> Option<&TissueMask> {
        self.mask.as_ref()
    }

    /// Label for the tile, or `None` when it is masked out or unannotated.
    pub fn label_for(&self, position: &TilePosition, patch_size: u32) -> Option<&str> {
        let corners = position.corners(patch_size);
        if let Some(mask) = &self.mask {
            if !mask.contains_tile(&corners) {
                return None;
            }
        }
        match &self.annotation {
            Some(annotation) => annotation.first_label(&corners),
            None => Some(self.fallback_label.as_str()),
        }
    }
}

// =============================================================================
// Extraction
// =============================================================================

/// Extract, filter and write the patches of one slide.
///
/// Returns the coordinates of every written patch by label.
pub fn extract_slide<S: SlideImage + ?Sized>(
    source: &S,
    slide_name: &str,
    labeler: &Labeler,
    settings: &ExtractionSettings,
    writer: &PatchWriter,
) -> Result<CoordsMetadata, ExtractError> {
    let extractor = PatchExtractor::new(source, &settings.grid, &settings.resize_sizes)?;
    let patch_size = extractor.grid().patch_size();
    let mut coords = CoordsMetadata::new(slide_name, patch_size);

    let mut unlabeled = 0usize;
    let mut blank = 0usize;

    for position in extractor.grid().iter_from(settings.start_index) {
        if settings
            .max_patches
            .is_some_and(|max_patches| coords.len() >= max_patches)
        {
            break;
        }

        let Some(label) = labeler.label_for(&position, patch_size) else {
            unlabeled += 1;
            continue;
        };

        let patch = extractor.extract_at(position)?;
        if settings.check_luminance
            && !check_luminance(&patch.patch, settings.blank_threshold, settings.blank_fraction)
        {
            debug!(slide = slide_name, x = position.x, y = position.y, "Skipping blank patch");
            blank += 1;
            continue;
        }

        writer.write_all(&patch, label, slide_name)?;
        coords.add_coord(label, position.x, position.y);
    }

    info!(
        slide = slide_name,
        tiles = extractor.len(),
        kept = coords.len(),
        unlabeled,
        blank,
        "Extracted slide"
    );

    Ok(coords)
}

/// Open a slide: a padded core for tissue microarrays, else a tiled pyramid.
///
/// TIFF and SVS slides are decoded tile by tile. Other formats are decoded
/// whole and tiled in memory.
pub fn open_source(
    path: &Path,
    settings: &ExtractionSettings,
) -> Result<Box<dyn SlideImage>, SlideError> {
    if settings.is_tma {
        let core = RasterImage::open(path)?;
        return Ok(Box::new(
            core.expand(settings.grid.patch_size, settings.annotation_overlap),
        ));
    }

    if is_tiff_path(path) {
        return Ok(Box::new(PyramidalSlide::new(TiffPyramid::open(path)?)));
    }

    let pyramid = ImagePyramid::open(path, settings.pyramid_tile_size)?;
    Ok(Box::new(PyramidalSlide::new(pyramid)))
}

/// Build the labeler for a job from its annotation and mask files.
pub fn load_labeler(
    job: &SlideJob,
    settings: &ExtractionSettings,
    slide_size: (u32, u32),
) -> Result<Labeler, ExtractError> {
    let mut labeler = Labeler::new(settings.fallback_label.clone());

    if let Some(path) = &job.annotation_path {
        let annotation = RegionAnnotation::from_file(path, &settings.annotation_options())?;
        labeler = labeler.with_annotation(annotation);
    }

    if let Some(path) = &job.mask_path {
        let mask = TissueMask::from_file(path, slide_size, settings.mask_overlap)?
            .with_rule(settings.coverage_rule);
        labeler = labeler.with_mask(mask);
    }

    Ok(labeler)
}

/// Extract every job into one coordinate store.
pub fn run(
    settings: &ExtractionSettings,
    jobs: &[SlideJob],
    writer: &PatchWriter,
) -> Result<SlideCoordsStore, ExtractError> {
    settings.grid.stride()?;

    let mut store = SlideCoordsStore::new(settings.grid.patch_size)
        .with_resize_sizes(settings.resize_sizes.clone());

    for job in jobs {
        let name = job.slide_name();

        let source = match open_source(&job.slide_path, settings) {
            Ok(source) => source,
            Err(e) => {
                warn!(slide = %name, path = %job.slide_path.display(), error = %e, "Cannot open slide, skipping");
                continue;
            }
        };

        let labeler = load_labeler(job, settings, source.dimensions())?;

        match extract_slide(&*source, &name, &labeler, settings, writer) {
            Ok(coords) => store.consume(coords)?,
            Err(ExtractError::Slide(e)) => {
                warn!(slide = %name, error = %e, "Cannot read slide, skipping");
            }
            Err(ExtractError::Grid(GridError::Config(e @ ConfigError::PatchExceedsImage { .. }))) => {
                warn!(slide = %name, error = %e, "Slide smaller than one patch, skipping");
            }
            Err(e) => return Err(e),
        }
    }

    info!(slides = store.len(), "Extraction finished");
    Ok(store)
}

// =============================================================================
// Derived annotations
// =============================================================================

/// Write one annotation file per slide describing the patches it kept.
///
/// Files are named `<slide>.txt` under `output_dir`.
pub fn write_coverage_annotations(
    store: &SlideCoordsStore,
    output_dir: &Path,
    skip_area: Option<f64>,
) -> Result<Vec<PathBuf>, ExtractError> {
    let mut written = Vec::new();
    for name in store.slide_names() {
        let Some(record) = store.get_slide(name) else {
            continue;
        };

        let coverages: Vec<PatchCoverage> = record
            .labels()
            .map(|label| {
                let mut coverage = PatchCoverage::new(label, record.patch_size());
                coverage.add_coords(record.topleft_coords(label).iter().copied());
                coverage
            })
            .collect();

        let path = output_dir.join(format!("{}.txt", name));
        write_annotation(&path, &coverages, skip_area)?;
        written.push(path);
    }
    Ok(written)
}

/// Region area per label for each annotation file, keyed by slide name.
pub fn annotation_areas(
    paths: &[PathBuf],
    scale_factor: f64,
) -> Result<BTreeMap<String, BTreeMap<String, f64>>, ExtractError> {
    paths
        .iter()
        .map(|path| {
            let annotation = RegionAnnotation::from_file(path, &AnnotationOptions::strict())?;
            Ok((annotation.slide_name().to_string(), annotation.area(scale_factor)))
        })
        .collect()
}
