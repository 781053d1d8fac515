//! Polygon annotations and tissue masks.
//!
//! Annotations are plain text, one region per line:
//!
//! ```text
//! Tumor [Point: 1200, 800, Point: 2400, 800, Point: 2400, 1900, Point: 1200, 1900]
//! Stroma [Point: 3000, 500, Point: 3600, 500, Point: 3600, 1400]
//! ```
//!
//! # Components
//!
//! - [`RegionAnnotation`]: labels tiles by containment or area overlap
//! - [`TissueMask`]: `clean_area` polygons from text or a raster mask
//! - [`PatchCoverage`]: turns extracted patch positions back into regions
//!
//! # Example
//!
//! ```
//! use geo::Coord;
//! use wsi_patches::annotation::{AnnotationOptions, RegionAnnotation};
//!
//! let text = "Tumor [Point: 0, 0, Point: 512, 0, Point: 512, 512, Point: 0, 512]";
//! let annotation = RegionAnnotation::parse("slide", text, &AnnotationOptions::new(0.5)).unwrap();
//!
//! let tile = [
//!     Coord { x: 256.0, y: 0.0 },
//!     Coord { x: 768.0, y: 0.0 },
//!     Coord { x: 768.0, y: 512.0 },
//!     Coord { x: 256.0, y: 512.0 },
//! ];
//! assert_eq!(annotation.first_label(&tile), Some("Tumor"));
//! ```

mod coverage;
mod geometry;
mod mask;
mod parser;
mod region;

pub use coverage::{write_annotation, PatchCoverage};
pub use mask::{CoverageRule, TissueMask, CLEAN_AREA_LABEL};
pub use parser::{format_region_line, parse_label, parse_vertices};
pub use region::{AnnotationOptions, MatchMode, RegionAnnotation, STRICT_THRESHOLD};
