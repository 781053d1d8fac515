//! Whole-slide TIFF files (generic tiled TIFF and Aperio SVS) read lazily.
//!
//! Opening a file only parses its image file directories. Pixels are decoded
//! one tile (or strip) at a time when a [`PyramidalSlide`] asks for them, so
//! a slide never has to fit in memory.
//!
//! A whole-slide file holds more images than its pyramid: SVS files add a
//! thumbnail, a label and a macro photograph. A directory becomes a level
//! when it holds interleaved 8-bit gray or colour samples and either
//!
//! - it is the largest such directory (level 0, tiled or stripped), or
//! - it is tiled and shrinks both axes by the same factor, at least 1.5×
//!   beyond the previous level.
//!
//! [`PyramidalSlide`]: super::PyramidalSlide

use std::cmp::Reverse;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use image::RgbImage;
use tiff::decoder::{ChunkType, Decoder, DecodingResult};
use tiff::tags::{PlanarConfiguration, Tag};
use tiff::{ColorType, TiffError, TiffResult};
use tracing::{debug, info};

use crate::error::SlideError;

use super::reader::TiledPyramid;

/// Directories past this index are ignored.
const MAX_DIRECTORIES: usize = 100;

/// Minimum downsample step between consecutive levels.
const MIN_LEVEL_STEP: f64 = 1.5;

/// Largest relative difference between the x and y downsample of a level.
const MAX_AXIS_MISMATCH: f64 = 0.05;

// =============================================================================
// Pixel Layout
// =============================================================================

/// Interleaved 8-bit sample layouts we convert to RGB.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PixelLayout {
    Gray,
    GrayAlpha,
    Rgb,
    Rgba,
    YCbCr,
}

impl PixelLayout {
    fn from_color_type(color: ColorType) -> Option<Self> {
        match color {
            ColorType::Gray(8) => Some(Self::Gray),
            ColorType::GrayA(8) => Some(Self::GrayAlpha),
            ColorType::RGB(8) => Some(Self::Rgb),
            ColorType::RGBA(8) => Some(Self::Rgba),
            ColorType::YCbCr(8) => Some(Self::YCbCr),
            _ => None,
        }
    }

    fn samples(self) -> usize {
        match self {
            Self::Gray => 1,
            Self::GrayAlpha => 2,
            Self::Rgb | Self::YCbCr => 3,
            Self::Rgba => 4,
        }
    }

    fn to_rgb(self, texel: &[u8]) -> [u8; 3] {
        match self {
            Self::Gray | Self::GrayAlpha => [texel[0]; 3],
            Self::Rgb | Self::Rgba => [texel[0], texel[1], texel[2]],
            Self::YCbCr => ycbcr_to_rgb(texel[0], texel[1], texel[2]),
        }
    }
}

/// Full-range (JPEG) YCbCr to RGB.
fn ycbcr_to_rgb(y: u8, cb: u8, cr: u8) -> [u8; 3] {
    let y = f32::from(y);
    let cb = f32::from(cb) - 128.0;
    let cr = f32::from(cr) - 128.0;
    let channel = |value: f32| value.round().clamp(0.0, 255.0) as u8;
    [
        channel(y + 1.402 * cr),
        channel(y - 0.344_136 * cb - 0.714_136 * cr),
        channel(y + 1.772 * cb),
    ]
}

/// Convert `width × height` interleaved texels to RGB.
///
/// Returns `None` when `samples` is too short.
fn decode_texels(layout: PixelLayout, width: u32, height: u32, samples: &[u8]) -> Option<RgbImage> {
    let texels = width as usize * height as usize;
    let samples = samples.get(..texels * layout.samples())?;
    let rgb = samples
        .chunks_exact(layout.samples())
        .flat_map(|texel| layout.to_rgb(texel))
        .collect();
    RgbImage::from_raw(width, height, rgb)
}

// =============================================================================
// Level Selection
// =============================================================================

/// What we need to know about one image file directory.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Directory {
    index: usize,
    width: u32,
    height: u32,
    tiled: bool,
    chunk_width: u32,
    chunk_height: u32,
    layout: PixelLayout,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct TiffLevel {
    directory: Directory,
    downsample: f64,
}

/// Pick pyramid levels out of a file's directories, level 0 first.
fn select_levels(mut directories: Vec<Directory>) -> Vec<TiffLevel> {
    directories.sort_by_key(|d| Reverse(u64::from(d.width) * u64::from(d.height)));
    let Some(&base) = directories.first() else {
        return Vec::new();
    };

    let mut levels = vec![TiffLevel {
        directory: base,
        downsample: 1.0,
    }];
    for directory in directories.into_iter().skip(1) {
        if !directory.tiled {
            continue;
        }

        let downsample_x = f64::from(base.width) / f64::from(directory.width);
        let downsample_y = f64::from(base.height) / f64::from(directory.height);
        let downsample = (downsample_x + downsample_y) / 2.0;

        // Labels and macro images have their own aspect ratio
        if (downsample_x - downsample_y).abs() / downsample > MAX_AXIS_MISMATCH {
            continue;
        }

        let previous = levels.last().map_or(1.0, |level| level.downsample);
        if downsample < previous * MIN_LEVEL_STEP {
            continue;
        }

        levels.push(TiffLevel {
            directory,
            downsample,
        });
    }
    levels
}

/// Summarize the directory the decoder is positioned on.
///
/// `None` for sample layouts we cannot convert.
fn describe(decoder: &mut Decoder<BufReader<File>>, index: usize) -> TiffResult<Option<Directory>> {
    let (width, height) = decoder.dimensions()?;
    let planar = decoder
        .find_tag_unsigned::<u16>(Tag::PlanarConfiguration)?
        .and_then(PlanarConfiguration::from_u16)
        .unwrap_or(PlanarConfiguration::Chunky);
    let layout = PixelLayout::from_color_type(decoder.colortype()?);

    let Some(layout) = layout.filter(|_| planar == PlanarConfiguration::Chunky) else {
        return Ok(None);
    };

    let (chunk_width, chunk_height) = decoder.chunk_dimensions();
    Ok(Some(Directory {
        index,
        width,
        height,
        tiled: decoder.get_chunk_type() == ChunkType::Tile,
        chunk_width,
        chunk_height,
        layout,
    }))
}

fn tiff_error(path: &Path, error: TiffError) -> SlideError {
    match error {
        TiffError::IoError(io) => SlideError::Io(format!("{}: {}", path.display(), io)),
        other => SlideError::Decode {
            message: format!("{}: {}", path.display(), other),
        },
    }
}

// =============================================================================
// TIFF Pyramid
// =============================================================================

struct DecoderState {
    decoder: Decoder<BufReader<File>>,
    /// Directory the decoder is positioned on, `None` after a failed seek.
    directory: Option<usize>,
}

/// A TIFF or SVS file exposed as a [`TiledPyramid`].
///
/// Stripped images are addressed as a single column of full-width tiles.
pub struct TiffPyramid {
    path: PathBuf,
    levels: Vec<TiffLevel>,
    state: Mutex<DecoderState>,
}

impl TiffPyramid {
    /// Parse the directories of a TIFF file. No pixel data is read.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SlideError> {
        let path = path.as_ref();
        let file =
            File::open(path).map_err(|e| SlideError::Io(format!("{}: {}", path.display(), e)))?;
        let mut decoder =
            Decoder::new(BufReader::new(file)).map_err(|e| tiff_error(path, e))?;

        let mut directories = Vec::new();
        let mut index = 0;
        let mut loaded: TiffResult<()> = Ok(());
        loop {
            match loaded.and_then(|()| describe(&mut decoder, index)) {
                Ok(Some(directory)) => directories.push(directory),
                Ok(None) => debug!(
                    path = %path.display(),
                    index,
                    "Skipping directory with unsupported samples"
                ),
                Err(e) => debug!(
                    path = %path.display(),
                    index,
                    error = %e,
                    "Skipping unreadable directory"
                ),
            }

            if !decoder.more_images() || index + 1 >= MAX_DIRECTORIES {
                break;
            }
            index += 1;
            loaded = decoder.next_image();
        }

        let levels = select_levels(directories);
        let Some(base) = levels.first() else {
            return Err(SlideError::Decode {
                message: format!("{}: no readable image directory", path.display()),
            });
        };

        info!(
            path = %path.display(),
            width = base.directory.width,
            height = base.directory.height,
            levels = levels.len(),
            tiled = base.directory.tiled,
            "Opened TIFF pyramid"
        );

        Ok(Self {
            path: path.to_path_buf(),
            levels,
            state: Mutex::new(DecoderState {
                decoder,
                directory: Some(index),
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn level(&self, level: usize) -> Result<&TiffLevel, SlideError> {
        self.levels.get(level).ok_or(SlideError::InvalidLevel {
            level,
            levels: self.levels.len(),
        })
    }
}

impl TiledPyramid for TiffPyramid {
    fn level_count(&self) -> usize {
        self.levels.len()
    }

    fn level_dimensions(&self, level: usize) -> Option<(u32, u32)> {
        self.levels
            .get(level)
            .map(|l| (l.directory.width, l.directory.height))
    }

    fn level_downsample(&self, level: usize) -> Option<f64> {
        self.levels.get(level).map(|l| l.downsample)
    }

    fn tile_size(&self, level: usize) -> Option<(u32, u32)> {
        self.levels
            .get(level)
            .map(|l| (l.directory.chunk_width, l.directory.chunk_height))
    }

    fn read_tile(&self, level: usize, tile_x: u32, tile_y: u32) -> Result<RgbImage, SlideError> {
        let directory = self.level(level)?.directory;
        let (tiles_x, tiles_y) = self.tile_count(level).ok_or(SlideError::InvalidLevel {
            level,
            levels: self.levels.len(),
        })?;
        if tile_x >= tiles_x || tile_y >= tiles_y {
            return Err(SlideError::TileOutOfBounds {
                level,
                x: tile_x,
                y: tile_y,
            });
        }
        let chunk = tile_y * tiles_x + tile_x;

        let (width, height, samples) = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if state.directory != Some(directory.index) {
                state.directory = None;
                state
                    .decoder
                    .seek_to_image(directory.index)
                    .map_err(|e| tiff_error(&self.path, e))?;
                state.directory = Some(directory.index);
            }

            let (width, height) = state.decoder.chunk_data_dimensions(chunk);
            let samples = state
                .decoder
                .read_chunk(chunk)
                .map_err(|e| tiff_error(&self.path, e))?;
            (width, height, samples)
        };

        let DecodingResult::U8(samples) = samples else {
            return Err(SlideError::Decode {
                message: format!("{}: chunk {} is not 8-bit", self.path.display(), chunk),
            });
        };
        decode_texels(directory.layout, width, height, &samples).ok_or_else(|| {
            SlideError::Decode {
                message: format!("{}: chunk {} is truncated", self.path.display(), chunk),
            }
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
