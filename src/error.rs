use thiserror::Error;

/// Invalid parameters or inputs that make an operation meaningless.
///
/// These are always fatal to the calling operation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// An overlap threshold outside `[0, 1]`
    #[error("{name} must be within [0, 1], got {value}")]
    ThresholdOutOfRange { name: &'static str, value: f64 },

    /// Patch size of zero
    #[error("Invalid patch size: {0} (must be greater than 0)")]
    InvalidPatchSize(u32),

    /// Patch overlap outside `[0, 1)`
    #[error("Invalid patch overlap: {0} (must be within [0, 1))")]
    InvalidOverlap(f64),

    /// Overlap so close to 1 that neighbouring tiles share a corner
    #[error("Patch overlap {overlap} with patch size {patch_size} yields a zero stride")]
    ZeroStride { patch_size: u32, overlap: f64 },

    /// Patch does not fit in the image, so the grid would be empty
    #[error("Patch size {patch_size} exceeds image dimensions {width}x{height}")]
    PatchExceedsImage {
        patch_size: u32,
        width: u32,
        height: u32,
    },

    /// Mask file with an extension we cannot read
    #[error("Unsupported mask format: {path} (expected .txt, .png, .tif, .tiff or .svs)")]
    UnsupportedMaskFormat { path: String },

    /// Text mask containing something other than `clean_area`
    #[error("The only accepted mask label is clean_area, got '{label}'")]
    InvalidMaskLabel { label: String },
}

/// Errors while loading region annotations or tissue masks.
#[derive(Debug, Clone, Error)]
pub enum AnnotationError {
    /// Reading the annotation source failed
    #[error("I/O error: {0}")]
    Io(String),

    /// A raster mask could not be decoded
    #[error("Failed to decode mask image: {message}")]
    Decode { message: String },

    /// Invalid construction parameters
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Errors from the tile grid generator.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GridError {
    /// Index past the end of the grid
    #[error("Tile index {index} out of range (grid has {len} tiles)")]
    IndexOutOfRange { index: usize, len: usize },

    /// Invalid grid parameters
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Errors from slide image sources.
#[derive(Debug, Clone, Error)]
pub enum SlideError {
    /// Requested pyramid level does not exist
    #[error("Invalid level {level}: slide has {levels} levels")]
    InvalidLevel { level: usize, levels: usize },

    /// Requested tile is outside the level's tile grid
    #[error("Tile ({x}, {y}) out of bounds at level {level}")]
    TileOutOfBounds { level: usize, x: u32, y: u32 },

    /// The slide file could not be opened
    #[error("I/O error: {0}")]
    Io(String),

    /// The slide file could not be decoded
    #[error("Failed to decode slide: {message}")]
    Decode { message: String },
}

/// Errors from the coordinate metadata store.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MetadataError {
    /// Slide already recorded in the store
    #[error("Slide {slide_name} is already present in the coordinate metadata")]
    DuplicateSlide { slide_name: String },

    /// Record declares a different patch size than the store
    #[error("Patch sizes {actual} and {expected} do not match")]
    PatchSizeMismatch { expected: u32, actual: u32 },

    /// Reading or writing the metadata file failed
    #[error("I/O error: {0}")]
    Io(String),

    /// The metadata file is not valid JSON for the schema
    #[error("JSON error: {0}")]
    Json(String),
}

/// Errors that can occur while extracting patches.
#[derive(Debug, Clone, Error)]
pub enum ExtractError {
    /// Invalid extraction settings
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Reading pixels from the slide failed
    #[error("Slide error: {0}")]
    Slide(#[from] SlideError),

    /// Grid construction or indexing failed
    #[error("Grid error: {0}")]
    Grid(#[from] GridError),

    /// Loading annotations or masks failed
    #[error("Annotation error: {0}")]
    Annotation(#[from] AnnotationError),

    /// Merging coordinate metadata failed
    #[error("Metadata error: {0}")]
    Metadata(#[from] MetadataError),

    /// Encoding a patch image failed
    #[error("Failed to encode patch: {message}")]
    Encode { message: String },

    /// Writing a patch to disk failed
    #[error("I/O error: {0}")]
    Io(String),
}
