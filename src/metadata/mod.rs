//! Coordinate metadata for extracted patches.
//!
//! Every extraction run records which patches it kept, per slide and label,
//! in a [`SlideCoordsStore`]. Stores produced by separate workers can be
//! merged as long as they agree on the patch size and share no slide.

mod coords;

pub use coords::{CoordsMetadata, LabelCoords, SlideCoordsDocument, SlideCoordsStore};
