//! Labeled polygon regions drawn on a slide.
//!
//! A [`RegionAnnotation`] answers "which label does this tile belong to?".
//! When the overlap threshold is exactly 1 a tile matches a region only if
//! all four of its corners lie inside it (boundary included). Below 1 a tile
//! matches when the fraction of its area covered by the region reaches the
//! threshold.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use geo::{Area, Coord, MultiPolygon};
use tracing::info;

use crate::error::AnnotationError;
use crate::slide::{core_border, slide_name};
use crate::tile::TilePosition;

use super::geometry::{build_region, contains_all, overlap_ratio, tile_polygon, validate_threshold};
use super::parser::{parse_label, parse_vertices};

/// Threshold value selecting exact containment.
pub const STRICT_THRESHOLD: f64 = 1.0;

/// How tiles are matched against regions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MatchMode {
    /// All four tile corners inside (or on) the region
    Containment,

    /// Covered fraction of the tile at least this value
    AreaRatio(f64),
}

/// Parameters for reading an annotation.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationOptions {
    /// Required overlap, in `[0, 1]`
    pub overlap_threshold: f64,

    /// Patch size used to expand a tissue microarray core, if the slide is one
    pub core_patch_size: Option<u32>,
}

impl AnnotationOptions {
    pub fn new(overlap_threshold: f64) -> Self {
        Self {
            overlap_threshold,
            core_patch_size: None,
        }
    }

    /// Exact containment.
    pub fn strict() -> Self {
        Self::new(STRICT_THRESHOLD)
    }

    /// Shift vertices by the border [`expand`](crate::slide::expand) adds
    /// around a core of this patch size.
    pub fn for_core(mut self, patch_size: u32) -> Self {
        self.core_patch_size = Some(patch_size);
        self
    }

    fn vertex_offset(&self) -> f64 {
        self.core_patch_size
            .map(|patch_size| f64::from(core_border(patch_size, self.overlap_threshold)))
            .unwrap_or(0.0)
    }
}

impl Default for AnnotationOptions {
    fn default() -> Self {
        Self::strict()
    }
}

#[derive(Debug, Clone)]
struct LabeledRegions {
    label: String,
    regions: Vec<MultiPolygon<f64>>,
}

// =============================================================================
// Region Annotation
// =============================================================================

/// Polygon regions grouped by label, in first-seen label order.
#[derive(Debug, Clone)]
pub struct RegionAnnotation {
    slide_name: String,
    mode: MatchMode,
    groups: Vec<LabeledRegions>,
}

impl RegionAnnotation {
    /// Read one region per line.
    ///
    /// Lines without a label are skipped. Lines with fewer than three
    /// vertices are kept but cover no area.
    pub fn from_reader<R: BufRead>(
        slide_name: impl Into<String>,
        reader: R,
        options: &AnnotationOptions,
    ) -> Result<Self, AnnotationError> {
        let threshold = validate_threshold("annotation_overlap", options.overlap_threshold)?;
        let offset = options.vertex_offset();

        let mut annotation = Self {
            slide_name: slide_name.into(),
            mode: if threshold == STRICT_THRESHOLD {
                MatchMode::Containment
            } else {
                MatchMode::AreaRatio(threshold)
            },
            groups: Vec::new(),
        };

        for (line_no, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| AnnotationError::Io(e.to_string()))?;
            if line.trim().is_empty() {
                continue;
            }

            let label = parse_label(&line);
            if label.is_empty() {
                info!(
                    slide = %annotation.slide_name,
                    line = line_no + 1,
                    "Annotation region has no label, skipping"
                );
                continue;
            }

            let region = build_region(parse_vertices(&line, offset));
            annotation.push(label, region);
        }

        Ok(annotation)
    }

    /// Parse annotation text held in memory.
    pub fn parse(
        slide_name: impl Into<String>,
        text: &str,
        options: &AnnotationOptions,
    ) -> Result<Self, AnnotationError> {
        Self::from_reader(slide_name, text.as_bytes(), options)
    }

    /// Read an annotation file. The slide name is the file stem.
    pub fn from_file(
        path: impl AsRef<Path>,
        options: &AnnotationOptions,
    ) -> Result<Self, AnnotationError> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| AnnotationError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_reader(slide_name(path), BufReader::new(file), options)
    }

    fn push(&mut self, label: &str, region: MultiPolygon<f64>) {
        match self.groups.iter_mut().find(|group| group.label == label) {
            Some(group) => group.regions.push(region),
            None => self.groups.push(LabeledRegions {
                label: label.to_string(),
                regions: vec![region],
            }),
        }
    }

    pub fn slide_name(&self) -> &str {
        &self.slide_name
    }

    pub fn mode(&self) -> MatchMode {
        self.mode
    }

    /// Labels in the order they first appear.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().map(|group| group.label.as_str())
    }

    /// Regions drawn with `label`, one per annotation line.
    pub fn polygons(&self, label: &str) -> &[MultiPolygon<f64>] {
        self.groups
            .iter()
            .find(|group| group.label == label)
            .map(|group| group.regions.as_slice())
            .unwrap_or_default()
    }

    /// Total region area per label, multiplied by `scale_factor`.
    pub fn area(&self, scale_factor: f64) -> BTreeMap<String, f64> {
        self.groups
            .iter()
            .map(|group| {
                let area: f64 = group.regions.iter().map(|r| r.unsigned_area()).sum();
                (group.label.clone(), area * scale_factor)
            })
            .collect()
    }

    /// First label, in label order, with a region matching the tile.
    pub fn first_label(&self, corners: &[Coord<f64>; 4]) -> Option<&str> {
        let tile = tile_polygon(corners);
        self.groups
            .iter()
            .find(|group| self.group_matches(group, corners, &tile))
            .map(|group| group.label.as_str())
    }

    /// Every label with a region matching the tile, each once.
    pub fn all_labels(&self, corners: &[Coord<f64>; 4]) -> Vec<&str> {
        let tile = tile_polygon(corners);
        self.groups
            .iter()
            .filter(|group| self.group_matches(group, corners, &tile))
            .map(|group| group.label.as_str())
            .collect()
    }

    /// [`first_label`](Self::first_label) for a grid position.
    pub fn label_for_tile(&self, position: &TilePosition, patch_size: u32) -> Option<&str> {
        self.first_label(&position.corners(patch_size))
    }

    fn group_matches(
        &self,
        group: &LabeledRegions,
        corners: &[Coord<f64>; 4],
        tile: &MultiPolygon<f64>,
    ) -> bool {
        group.regions.iter().any(|region| match self.mode {
            MatchMode::Containment => contains_all(region, corners),
            MatchMode::AreaRatio(threshold) => overlap_ratio(tile, region) >= threshold,
        })
    }
}
