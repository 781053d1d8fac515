//! Annotations synthesized from extracted patch positions.
//!
//! [`PatchCoverage`] collects the square footprints of patches kept for a
//! label and renders their union back into annotation lines, so a run over
//! an unannotated slide can produce an annotation describing what it
//! extracted.

use std::fs;
use std::path::Path;

use geo::{Area, Coord, LineString, MultiPolygon, Polygon};

use crate::error::AnnotationError;

use super::geometry::union_all;
use super::parser::format_region_line;

/// Union of square patch footprints carrying one label.
#[derive(Debug, Clone)]
pub struct PatchCoverage {
    label: String,
    patch_size: u32,
    footprints: Vec<MultiPolygon<f64>>,
}

impl PatchCoverage {
    pub fn new(label: impl Into<String>, patch_size: u32) -> Self {
        Self {
            label: label.into(),
            patch_size,
            footprints: Vec::new(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Number of patches added so far.
    pub fn patch_count(&self) -> usize {
        self.footprints.len()
    }

    /// Add the patch whose top-left corner is `(x, y)`.
    pub fn add_patch(&mut self, x: u32, y: u32) {
        let (x0, y0) = (f64::from(x), f64::from(y));
        let size = f64::from(self.patch_size);
        let ring = LineString::from(vec![
            Coord { x: x0, y: y0 },
            Coord { x: x0 + size, y: y0 },
            Coord {
                x: x0 + size,
                y: y0 + size,
            },
            Coord { x: x0, y: y0 + size },
        ]);
        self.footprints
            .push(MultiPolygon::new(vec![Polygon::new(ring, Vec::new())]));
    }

    pub fn add_coords(&mut self, coords: impl IntoIterator<Item = (u32, u32)>) {
        for (x, y) in coords {
            self.add_patch(x, y);
        }
    }

    /// Merged regions whose truncated area exceeds `skip_area`.
    pub fn polygons(&self, skip_area: Option<f64>) -> Vec<Polygon<f64>> {
        union_all(self.footprints.clone())
            .0
            .into_iter()
            .filter(|polygon| match skip_area {
                Some(limit) => polygon.unsigned_area().trunc() > limit,
                None => true,
            })
            .collect()
    }

    /// One annotation line per merged region. Holes are not represented.
    pub fn to_lines(&self, skip_area: Option<f64>) -> Vec<String> {
        self.polygons(skip_area)
            .iter()
            .map(|polygon| {
                let ring = &polygon.exterior().0;
                let open = match ring.split_last() {
                    Some((last, rest)) if rest.first() == Some(last) => rest,
                    _ => ring.as_slice(),
                };
                format_region_line(&self.label, open)
            })
            .collect()
    }

    /// Write the annotation to `path`, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>, skip_area: Option<f64>) -> Result<(), AnnotationError> {
        write_annotation(path, std::slice::from_ref(self), skip_area)
    }
}

/// Write several coverages into one annotation file.
pub fn write_annotation(
    path: impl AsRef<Path>,
    coverages: &[PatchCoverage],
    skip_area: Option<f64>,
) -> Result<(), AnnotationError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| AnnotationError::Io(format!("{}: {}", parent.display(), e)))?;
    }

    let mut text = String::new();
    for coverage in coverages {
        for line in coverage.to_lines(skip_area) {
            text.push_str(&line);
            text.push('\n');
        }
    }
    fs::write(path, text).map_err(|e| AnnotationError::Io(format!("{}: {}", path.display(), e)))
}
