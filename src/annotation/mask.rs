//! Tissue masks restricting extraction to clean slide areas.
//!
//! A mask is either an annotation text file whose regions are all labeled
//! [`CLEAN_AREA_LABEL`], or a low-resolution grayscale raster where non-zero
//! pixels mark usable tissue. Raster contours are traced, scaled to slide
//! coordinates and merged into one set of polygons.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use geo::{Area, Coord, MultiPolygon};
use image::{GrayImage, ImageError};
use imageproc::contours::find_contours;
use tracing::debug;

use crate::error::{AnnotationError, ConfigError};
use crate::slide::{open_image, slide_name};

use super::geometry::{build_region, overlap_ratio, tile_polygon, union_all, validate_threshold};
use super::parser::{parse_label, parse_vertices};

/// The only label a tissue mask may carry.
pub const CLEAN_AREA_LABEL: &str = "clean_area";

const RASTER_EXTENSIONS: &[&str] = &["png", "tif", "tiff", "svs"];

/// How per-polygon overlaps combine when deciding whether a tile is clean.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CoverageRule {
    /// A single polygon must cover the threshold on its own
    SingleRegion,

    /// Overlaps with separate polygons add up
    #[default]
    Cumulative,
}

/// Clean-area polygons in slide coordinates.
#[derive(Debug, Clone)]
pub struct TissueMask {
    slide_name: String,
    overlap_threshold: f64,
    rule: CoverageRule,
    polygons: Vec<MultiPolygon<f64>>,
}

impl TissueMask {
    /// Read a text mask. Every labeled line must be `clean_area`.
    pub fn from_text<R: BufRead>(
        slide_name: impl Into<String>,
        reader: R,
        overlap_threshold: f64,
    ) -> Result<Self, AnnotationError> {
        let overlap_threshold = validate_threshold("mask_overlap", overlap_threshold)?;

        let mut polygons = Vec::new();
        for line in reader.lines() {
            let line = line.map_err(|e| AnnotationError::Io(e.to_string()))?;
            if line.trim().is_empty() {
                continue;
            }

            let label = parse_label(&line);
            if label != CLEAN_AREA_LABEL {
                return Err(ConfigError::InvalidMaskLabel {
                    label: label.to_string(),
                }
                .into());
            }
            polygons.push(build_region(parse_vertices(&line, 0.0)));
        }

        Ok(Self {
            slide_name: slide_name.into(),
            overlap_threshold,
            rule: CoverageRule::default(),
            polygons,
        })
    }

    /// Trace a raster mask and scale it to a slide of `slide_size`.
    ///
    /// Each axis is scaled by the rounded ratio of slide to mask size.
    /// Contours with fewer than three points are ignored.
    pub fn from_raster(
        slide_name: impl Into<String>,
        mask: &GrayImage,
        slide_size: (u32, u32),
        overlap_threshold: f64,
    ) -> Result<Self, AnnotationError> {
        let overlap_threshold = validate_threshold("mask_overlap", overlap_threshold)?;
        let slide_name = slide_name.into();

        let (mask_w, mask_h) = mask.dimensions();
        let scale_x = scale_ratio(slide_size.0, mask_w);
        let scale_y = scale_ratio(slide_size.1, mask_h);

        let regions: Vec<MultiPolygon<f64>> = find_contours::<u32>(mask)
            .into_iter()
            .filter(|contour| contour.points.len() >= 3)
            .map(|contour| {
                let ring = contour
                    .points
                    .iter()
                    .map(|p| Coord {
                        x: f64::from(p.x) * scale_x,
                        y: f64::from(p.y) * scale_y,
                    })
                    .collect();
                build_region(ring)
            })
            .collect();

        debug!(
            slide = %slide_name,
            contours = regions.len(),
            scale_x,
            scale_y,
            "Traced raster tissue mask"
        );

        let polygons = union_all(regions)
            .0
            .into_iter()
            .map(|polygon| MultiPolygon::new(vec![polygon]))
            .collect();

        Ok(Self {
            slide_name,
            overlap_threshold,
            rule: CoverageRule::default(),
            polygons,
        })
    }

    /// Load a mask file, dispatching on its extension.
    pub fn from_file(
        path: impl AsRef<Path>,
        slide_size: (u32, u32),
        overlap_threshold: f64,
    ) -> Result<Self, AnnotationError> {
        let path = path.as_ref();
        let name = slide_name(path);
        let extension = path
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        if extension == "txt" {
            let file = File::open(path)
                .map_err(|e| AnnotationError::Io(format!("{}: {}", path.display(), e)))?;
            return Self::from_text(name, BufReader::new(file), overlap_threshold);
        }

        if RASTER_EXTENSIONS.contains(&extension.as_str()) {
            let mask = open_image(path)
                .map_err(|e| match e {
                    ImageError::IoError(io) => {
                        AnnotationError::Io(format!("{}: {}", path.display(), io))
                    }
                    other => AnnotationError::Decode {
                        message: format!("{}: {}", path.display(), other),
                    },
                })?
                .to_luma8();
            return Self::from_raster(name, &mask, slide_size, overlap_threshold);
        }

        Err(ConfigError::UnsupportedMaskFormat {
            path: path.display().to_string(),
        }
        .into())
    }

    pub fn with_rule(mut self, rule: CoverageRule) -> Self {
        self.rule = rule;
        self
    }

    pub fn slide_name(&self) -> &str {
        &self.slide_name
    }

    pub fn rule(&self) -> CoverageRule {
        self.rule
    }

    pub fn labels(&self) -> [&'static str; 1] {
        [CLEAN_AREA_LABEL]
    }

    pub fn polygons(&self) -> &[MultiPolygon<f64>] {
        &self.polygons
    }

    /// Clean area, multiplied by `scale_factor`.
    pub fn area(&self, scale_factor: f64) -> BTreeMap<String, f64> {
        let area: f64 = self.polygons.iter().map(|p| p.unsigned_area()).sum();
        BTreeMap::from([(CLEAN_AREA_LABEL.to_string(), area * scale_factor)])
    }

    /// `clean_area` if the tile is covered enough under the mask's rule.
    pub fn label_for_tile(&self, corners: &[Coord<f64>; 4]) -> Option<&'static str> {
        let tile = tile_polygon(corners);
        let mut cumulative = 0.0;

        for polygon in &self.polygons {
            let ratio = overlap_ratio(&tile, polygon);
            if ratio >= self.overlap_threshold {
                return Some(CLEAN_AREA_LABEL);
            }

            cumulative += ratio;
            if self.rule == CoverageRule::Cumulative && cumulative >= self.overlap_threshold {
                return Some(CLEAN_AREA_LABEL);
            }
        }
        None
    }

    /// Whether the tile falls in the clean area.
    pub fn contains_tile(&self, corners: &[Coord<f64>; 4]) -> bool {
        self.label_for_tile(corners).is_some()
    }
}

fn scale_ratio(slide: u32, mask: u32) -> f64 {
    if mask == 0 {
        return 1.0;
    }
    (f64::from(slide) / f64::from(mask)).round().max(1.0)
}
