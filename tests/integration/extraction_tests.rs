//! Patch extraction tests.
//!
//! Tests verify:
//! - Pyramidal slides return the same pixels as the flat image they wrap
//! - Decoded tiles are cached across neighbouring reads
//! - Tiled TIFF slides too large to decode whole are read tile by tile
//! - Regions past the image edge are black
//! - Resizing, luminance filtering and patch writing

use image::{GenericImageView, Rgb, RgbImage};

use wsi_patches::slide::{
    ImagePyramid, PyramidalSlide, RasterImage, SlideImage, TiffPyramid, TiledPyramid,
};
use wsi_patches::tile::{
    check_luminance, extract, extract_and_resize, is_tissue, GridOptions, PatchExtractor,
    PatchFormat, PatchWriter, DEFAULT_BLANK_FRACTION, DEFAULT_BLANK_THRESHOLD,
};

use super::test_utils::{
    gradient_image, slide_with_tissue, write_tiled_tiff, CountingPyramid, BACKGROUND, TISSUE,
};

// =============================================================================
// Slide Sources
// =============================================================================

#[test]
fn test_pyramid_region_matches_raster() {
    let base = gradient_image(600, 400);
    let raster = RasterImage::new(base.clone());
    let slide = PyramidalSlide::new(ImagePyramid::from_image(base, 128));

    assert_eq!(slide.dimensions(), raster.dimensions());

    // Straddles nine tiles, the bottom row clipped by the image edge
    let from_pyramid = slide.read_region(100, 150, 256).unwrap();
    let from_raster = raster.read_region(100, 150, 256).unwrap();
    assert_eq!(from_pyramid.dimensions(), (256, 256));
    assert_eq!(from_pyramid, from_raster);
    assert_eq!(*from_pyramid.get_pixel(0, 0), Rgb([100, 150, 0]));
}

#[test]
fn test_region_past_edge_is_black() {
    let base = gradient_image(600, 400);
    let raster = RasterImage::new(base.clone());
    let slide = PyramidalSlide::new(ImagePyramid::from_image(base, 128));

    for region in [
        raster.read_region(500, 300, 256).unwrap(),
        slide.read_region(500, 300, 256).unwrap(),
    ] {
        assert_eq!(region.dimensions(), (256, 256));
        assert_eq!(*region.get_pixel(99, 99), Rgb([(599 % 256) as u8, (399 % 256) as u8, 3]));
        assert_eq!(*region.get_pixel(100, 0), Rgb([0, 0, 0]));
        assert_eq!(*region.get_pixel(0, 100), Rgb([0, 0, 0]));
        assert_eq!(*region.get_pixel(255, 255), Rgb([0, 0, 0]));
    }

    let outside = slide.read_region(700, 0, 32).unwrap();
    assert!(outside.pixels().all(|pixel| *pixel == Rgb([0, 0, 0])));
}

#[test]
fn test_tiles_are_cached() {
    let pyramid = CountingPyramid::new(gradient_image(512, 512), 128);
    let slide = PyramidalSlide::new(pyramid.clone());

    slide.read_region(0, 0, 256).unwrap();
    assert_eq!(pyramid.reads(), 4);

    slide.read_region(0, 0, 256).unwrap();
    assert_eq!(pyramid.reads(), 4);

    // Shares tile (1, 1) with the first read
    slide.read_region(128, 128, 256).unwrap();
    assert_eq!(pyramid.reads(), 7);
}

#[test]
fn test_single_tile_cache_rereads() {
    let pyramid = CountingPyramid::new(gradient_image(512, 512), 128);
    let slide = PyramidalSlide::with_cache_capacity(pyramid.clone(), 1);

    slide.read_region(0, 0, 256).unwrap();
    slide.read_region(0, 0, 256).unwrap();
    assert_eq!(pyramid.reads(), 8);
}

#[test]
fn test_pyramid_levels_and_thumbnail() {
    let pyramid = ImagePyramid::from_image(gradient_image(1000, 600), 128);
    assert_eq!(pyramid.level_count(), 4);
    assert_eq!(pyramid.level_dimensions(1), Some((500, 300)));
    assert_eq!(pyramid.level_dimensions(3), Some((125, 75)));
    assert_eq!(pyramid.level_dimensions(4), None);
    assert_eq!(pyramid.level_downsample(0), Some(1.0));

    let slide = PyramidalSlide::new(pyramid);
    assert_eq!(slide.thumbnail().unwrap().dimensions(), (125, 75));
}

#[test]
fn test_large_tiled_tiff_is_read_lazily() {
    let dir = tempfile::tempdir().unwrap();
    let base_tile = gradient_image(256, 256);
    let path = write_tiled_tiff(
        dir.path(),
        "large.svs",
        &[
            (16384, 16384, base_tile.clone()),
            (4096, 4096, RgbImage::from_pixel(256, 256, TISSUE)),
            (1024, 1024, RgbImage::from_pixel(256, 256, BACKGROUND)),
        ],
    );

    let slide = PyramidalSlide::new(TiffPyramid::open(&path).unwrap());
    assert_eq!(slide.dimensions(), (16384, 16384));
    assert_eq!(slide.level_downsamples(), vec![1.0, 4.0, 16.0]);
    assert_eq!(slide.pyramid().tile_count(0), Some((64, 64)));

    // Straddles the last tile column and the right edge
    let region = slide.read_region(16084, 1000, 512).unwrap();
    assert_eq!(region.dimensions(), (512, 512));
    assert_eq!(*region.get_pixel(0, 0), *base_tile.get_pixel(212, 232));
    assert_eq!(*region.get_pixel(299, 511), *base_tile.get_pixel(255, 231));
    assert_eq!(*region.get_pixel(300, 0), Rgb([0, 0, 0]));

    assert_eq!(slide.pyramid().best_level_for_downsample(5.0), Some(1));
    let level = slide.read_level_region(1, 4000, 4000, 64, 64).unwrap();
    assert!(level.pixels().all(|pixel| *pixel == TISSUE));

    let thumbnail = slide.thumbnail().unwrap();
    assert_eq!(thumbnail.dimensions(), (1024, 1024));
    assert_eq!(*thumbnail.get_pixel(700, 900), BACKGROUND);
}

#[test]
fn test_stripped_tiff_matches_raster() {
    let dir = tempfile::tempdir().unwrap();
    let base = gradient_image(300, 200);
    let path = dir.path().join("flat.tif");
    base.save(&path).unwrap();

    let slide = PyramidalSlide::new(TiffPyramid::open(&path).unwrap());
    assert_eq!(slide.level_count(), 1);
    assert_eq!(
        slide.read_region(250, 150, 100).unwrap(),
        RasterImage::new(base).read_region(250, 150, 100).unwrap()
    );
}

#[test]
fn test_open_missing_slide_fails() {
    let dir = tempfile::tempdir().unwrap();
    assert!(ImagePyramid::open(dir.path().join("missing.png"), 256).is_err());
    assert!(RasterImage::open(dir.path().join("missing.png")).is_err());
    assert!(TiffPyramid::open(dir.path().join("missing.svs")).is_err());
}

// =============================================================================
// Extraction
// =============================================================================

#[test]
fn test_extract_and_resize() {
    let raster = RasterImage::new(gradient_image(512, 512));

    let plain = extract(&raster, 64, 128, 256).unwrap();
    let same = extract_and_resize(&raster, 64, 128, 256, 256).unwrap();
    assert_eq!(plain, same);

    let half = extract_and_resize(&raster, 64, 128, 256, 128).unwrap();
    assert_eq!(half.dimensions(), (128, 128));
}

#[test]
fn test_extractor_reads_grid_positions() {
    let base = gradient_image(512, 384);
    let slide = PyramidalSlide::new(ImagePyramid::from_image(base.clone(), 100));
    let extractor = PatchExtractor::new(&slide, &GridOptions::new(128), &[64, 32]).unwrap();

    assert_eq!(extractor.len(), 12);
    assert_eq!(extractor.resize_sizes(), &[128, 64, 32]);

    let patch = extractor.get(5).unwrap();
    assert_eq!((patch.position.x, patch.position.y), (128, 128));
    assert_eq!(patch.patch, base.view(128, 128, 128, 128).to_image());
    assert_eq!(
        patch.resized.keys().copied().collect::<Vec<_>>(),
        vec![32, 64, 128]
    );
    assert_eq!(patch.resized[&32].dimensions(), (32, 32));
}

#[test]
fn test_extractor_over_expanded_core() {
    let core = RasterImage::new(slide_with_tissue(100, 100, 0, 0, 100, 100));
    let expanded = core.expand(64, 1.0);
    // border floor(0.3 * 64) = 19
    assert_eq!(expanded.dimensions(), (138, 138));

    let extractor = PatchExtractor::new(&expanded, &GridOptions::new(64), &[]).unwrap();
    assert_eq!(extractor.len(), 4);

    // The border takes the core's corner colour
    let first = extractor.get(0).unwrap();
    assert_eq!(*first.patch.get_pixel(0, 0), TISSUE);
}

#[test]
fn test_luminance_separates_tissue_from_background() {
    let raster = RasterImage::new(slide_with_tissue(256, 128, 0, 0, 128, 128));

    let tissue = extract(&raster, 0, 0, 128).unwrap();
    let background = extract(&raster, 128, 0, 128).unwrap();
    assert!(is_tissue(&tissue));
    assert!(!is_tissue(&background));

    // A quarter of tissue leaves 75% blank, which is rejected
    let straddling = extract(&raster, 96, 0, 128).unwrap();
    assert!(!check_luminance(&straddling, DEFAULT_BLANK_THRESHOLD, DEFAULT_BLANK_FRACTION));
    assert!(check_luminance(&straddling, DEFAULT_BLANK_THRESHOLD, 0.8));

    // Raising the threshold above the background makes everything tissue
    assert!(check_luminance(&background, 252.0, DEFAULT_BLANK_FRACTION));
    assert_eq!(*background.get_pixel(0, 0), BACKGROUND);
}

// =============================================================================
// Patch Writer
// =============================================================================

#[test]
fn test_writer_layout_and_formats() {
    let dir = tempfile::tempdir().unwrap();
    let raster = RasterImage::new(gradient_image(256, 256));
    let extractor = PatchExtractor::new(&raster, &GridOptions::new(128), &[64]).unwrap();
    let patch = extractor.get(3).unwrap();

    let png = PatchWriter::new(dir.path(), PatchFormat::Png);
    let written = png.write_all(&patch, "Tumor", "VOA-1").unwrap();
    assert_eq!(
        written,
        vec![
            dir.path().join("Tumor/VOA-1/64/128_128.png"),
            dir.path().join("Tumor/VOA-1/128/128_128.png"),
        ]
    );
    let decoded = image::open(&written[1]).unwrap().to_rgb8();
    assert_eq!(decoded, patch.patch);

    let jpeg = PatchWriter::new(dir.path(), PatchFormat::Jpeg { quality: 90 });
    let path = jpeg.write(&patch.patch, "Stroma", "VOA-1", 128, 128, 128).unwrap();
    assert_eq!(path, dir.path().join("Stroma/VOA-1/128/128_128.jpg"));
    let decoded: RgbImage = image::open(&path).unwrap().to_rgb8();
    assert_eq!(decoded.dimensions(), (128, 128));
}
