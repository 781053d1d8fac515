//! Per-slide patch coordinates and the store that aggregates them.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::MetadataError;

/// Labels mapped to the top-left corners of their patches.
pub type LabelCoords = BTreeMap<String, Vec<(u32, u32)>>;

// =============================================================================
// Coords Metadata
// =============================================================================

/// Top-left coordinates of the patches extracted from one slide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordsMetadata {
    slide_name: String,
    patch_size: u32,
    coords: LabelCoords,
}

impl CoordsMetadata {
    pub fn new(slide_name: impl Into<String>, patch_size: u32) -> Self {
        Self::with_coords(slide_name, patch_size, LabelCoords::new())
    }

    pub fn with_coords(slide_name: impl Into<String>, patch_size: u32, coords: LabelCoords) -> Self {
        Self {
            slide_name: slide_name.into(),
            patch_size,
            coords,
        }
    }

    pub fn slide_name(&self) -> &str {
        &self.slide_name
    }

    pub fn patch_size(&self) -> u32 {
        self.patch_size
    }

    /// Record a patch. Duplicates are kept.
    pub fn add_coord(&mut self, label: &str, x: u32, y: u32) {
        self.coords.entry(label.to_string()).or_default().push((x, y));
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.coords.keys().map(String::as_str)
    }

    /// Coordinates recorded under `label`, in insertion order.
    pub fn topleft_coords(&self, label: &str) -> &[(u32, u32)] {
        self.coords.get(label).map(Vec::as_slice).unwrap_or_default()
    }

    /// Every `(label, (x, y))` pair, grouped by label.
    pub fn iter(&self) -> impl Iterator<Item = (&str, (u32, u32))> {
        self.coords
            .iter()
            .flat_map(|(label, coords)| coords.iter().map(move |&xy| (label.as_str(), xy)))
    }

    /// Number of recorded patches across all labels.
    pub fn len(&self) -> usize {
        self.coords.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn coords(&self) -> &LabelCoords {
        &self.coords
    }
}

// =============================================================================
// Slide Coords Store
// =============================================================================

/// Serialized form of a [`SlideCoordsStore`].
///
/// ```json
/// {
///   "patch_size": 1024,
///   "resize_sizes": [512, 256],
///   "slides": { "VOA-1000A": { "Tumor": [[0, 1024], [1024, 1024]] } }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlideCoordsDocument {
    pub patch_size: u32,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resize_sizes: Vec<u32>,

    #[serde(default)]
    pub slides: BTreeMap<String, LabelCoords>,
}

/// Coordinates for many slides sharing one patch size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlideCoordsStore {
    patch_size: u32,
    resize_sizes: Vec<u32>,
    slides: BTreeMap<String, CoordsMetadata>,
}

impl SlideCoordsStore {
    pub fn new(patch_size: u32) -> Self {
        Self {
            patch_size,
            resize_sizes: Vec::new(),
            slides: BTreeMap::new(),
        }
    }

    pub fn with_resize_sizes(mut self, resize_sizes: Vec<u32>) -> Self {
        self.resize_sizes = resize_sizes;
        self
    }

    pub fn patch_size(&self) -> u32 {
        self.patch_size
    }

    /// Sizes patches were saved at. Defaults to the patch size alone.
    pub fn resize_sizes(&self) -> Vec<u32> {
        if self.resize_sizes.is_empty() {
            vec![self.patch_size]
        } else {
            self.resize_sizes.clone()
        }
    }

    pub fn set_resize_sizes(&mut self, resize_sizes: Vec<u32>) {
        self.resize_sizes = resize_sizes;
    }

    pub fn slide_names(&self) -> impl Iterator<Item = &str> {
        self.slides.keys().map(String::as_str)
    }

    pub fn has_slide(&self, slide_name: &str) -> bool {
        self.slides.contains_key(slide_name)
    }

    pub fn get_slide(&self, slide_name: &str) -> Option<&CoordsMetadata> {
        self.slides.get(slide_name)
    }

    pub fn len(&self) -> usize {
        self.slides.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slides.is_empty()
    }

    fn check(&self, record: &CoordsMetadata) -> Result<(), MetadataError> {
        if self.slides.contains_key(record.slide_name()) {
            return Err(MetadataError::DuplicateSlide {
                slide_name: record.slide_name().to_string(),
            });
        }
        if record.patch_size() != self.patch_size {
            return Err(MetadataError::PatchSizeMismatch {
                expected: self.patch_size,
                actual: record.patch_size(),
            });
        }
        Ok(())
    }

    /// Add one slide's coordinates.
    pub fn consume(&mut self, record: CoordsMetadata) -> Result<(), MetadataError> {
        self.check(&record)?;
        debug!(slide = %record.slide_name(), patches = record.len(), "Recorded slide coordinates");
        self.slides.insert(record.slide_name().to_string(), record);
        Ok(())
    }

    /// Add several slides at once.
    ///
    /// Nothing is inserted unless every record is accepted, including
    /// records that collide with each other.
    pub fn consume_all(&mut self, records: Vec<CoordsMetadata>) -> Result<(), MetadataError> {
        let mut batch = BTreeSet::new();
        for record in &records {
            self.check(record)?;
            if !batch.insert(record.slide_name()) {
                return Err(MetadataError::DuplicateSlide {
                    slide_name: record.slide_name().to_string(),
                });
            }
        }

        for record in records {
            self.slides.insert(record.slide_name().to_string(), record);
        }
        Ok(())
    }

    /// Take every slide of another store with the same patch size.
    pub fn merge(&mut self, other: SlideCoordsStore) -> Result<(), MetadataError> {
        if other.patch_size != self.patch_size {
            return Err(MetadataError::PatchSizeMismatch {
                expected: self.patch_size,
                actual: other.patch_size,
            });
        }
        self.consume_all(other.slides.into_values().collect())?;
        if self.resize_sizes.is_empty() {
            self.resize_sizes = other.resize_sizes;
        }
        Ok(())
    }

    pub fn dump(&self) -> SlideCoordsDocument {
        SlideCoordsDocument {
            patch_size: self.patch_size,
            resize_sizes: self.resize_sizes.clone(),
            slides: self
                .slides
                .iter()
                .map(|(name, record)| (name.clone(), record.coords().clone()))
                .collect(),
        }
    }

    pub fn from_document(document: SlideCoordsDocument) -> Self {
        let patch_size = document.patch_size;
        Self {
            patch_size,
            resize_sizes: document.resize_sizes,
            slides: document
                .slides
                .into_iter()
                .map(|(name, coords)| {
                    let record = CoordsMetadata::with_coords(name.clone(), patch_size, coords);
                    (name, record)
                })
                .collect(),
        }
    }

    /// Write the store as JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), MetadataError> {
        let path = path.as_ref();
        let json =
            serde_json::to_string(&self.dump()).map_err(|e| MetadataError::Json(e.to_string()))?;
        fs::write(path, json).map_err(|e| MetadataError::Io(format!("{}: {}", path.display(), e)))
    }

    /// Read a store written by [`save`](Self::save).
    pub fn load(path: impl AsRef<Path>) -> Result<Self, MetadataError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| MetadataError::Io(format!("{}: {}", path.display(), e)))?;
        let document: SlideCoordsDocument =
            serde_json::from_str(&text).map_err(|e| MetadataError::Json(e.to_string()))?;
        Ok(Self::from_document(document))
    }
}
