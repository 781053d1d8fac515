//! Annotation and tissue mask tests.
//!
//! Tests verify:
//! - Strict containment and overlap-ratio labeling over a grid
//! - Core-expanded annotations line up with expanded images
//! - Raster masks restrict tiles to traced tissue
//! - Synthesized annotations reproduce the extracted area

use image::{GrayImage, Luma};

use wsi_patches::annotation::{
    AnnotationOptions, CoverageRule, MatchMode, PatchCoverage, RegionAnnotation, TissueMask,
    CLEAN_AREA_LABEL,
};
use wsi_patches::error::{AnnotationError, ConfigError};
use wsi_patches::slide::{core_border, RasterImage, SlideImage};
use wsi_patches::tile::{GridOptions, TileGrid};

use super::test_utils::{corners, rect_line, slide_with_tissue, write_text};

fn two_labels() -> String {
    [
        rect_line("Tumor", 0.0, 0.0, 512.0, 512.0),
        rect_line("Stroma", 512.0, 0.0, 1024.0, 512.0),
    ]
    .join("\n")
}

// =============================================================================
// Region Annotation
// =============================================================================

#[test]
fn test_strict_labels_over_grid() {
    let annotation =
        RegionAnnotation::parse("slide", &two_labels(), &AnnotationOptions::strict()).unwrap();
    let grid = TileGrid::new((1024, 1024), &GridOptions::new(256)).unwrap();

    let labels: Vec<Option<&str>> = grid
        .iter()
        .map(|position| annotation.label_for_tile(&position, 256))
        .collect();

    // Top two rows split between the labels, bottom two rows unannotated
    let row = [Some("Tumor"), Some("Tumor"), Some("Stroma"), Some("Stroma")];
    assert_eq!(&labels[0..4], &row);
    assert_eq!(&labels[4..8], &row);
    assert!(labels[8..].iter().all(Option::is_none));
}

#[test]
fn test_strict_mode_rejects_partial_containment() {
    let annotation =
        RegionAnnotation::parse("slide", &two_labels(), &AnnotationOptions::strict()).unwrap();
    // One corner past the bottom edge
    assert_eq!(annotation.first_label(&corners(100.0, 300.0, 256.0)), None);
    assert!(annotation.all_labels(&corners(100.0, 300.0, 256.0)).is_empty());
}

#[test]
fn test_overlap_threshold_boundary() {
    let annotation =
        RegionAnnotation::parse("slide", &two_labels(), &AnnotationOptions::new(0.25)).unwrap();
    assert_eq!(annotation.mode(), MatchMode::AreaRatio(0.25));

    // Exactly a quarter of the tile lies inside Tumor
    let quarter = corners(256.0, 256.0, 512.0);
    assert_eq!(annotation.all_labels(&quarter), vec!["Tumor", "Stroma"]);

    let strict_quarter =
        RegionAnnotation::parse("slide", &two_labels(), &AnnotationOptions::new(0.26)).unwrap();
    assert!(strict_quarter.all_labels(&quarter).is_empty());
}

#[test]
fn test_annotation_threshold_must_be_in_range() {
    let result = RegionAnnotation::parse("slide", &two_labels(), &AnnotationOptions::new(1.2));
    assert!(matches!(
        result,
        Err(AnnotationError::Config(ConfigError::ThresholdOutOfRange {
            name: "annotation_overlap",
            ..
        }))
    ));
}

#[test]
fn test_self_intersecting_region_is_usable() {
    let text = "Tumor [Point: 0, 0, Point: 100, 100, Point: 100, 0, Point: 0, 100]";
    let annotation = RegionAnnotation::parse("slide", text, &AnnotationOptions::new(0.1)).unwrap();

    let area = annotation.area(1.0)["Tumor"];
    assert!(area > 0.0 && area <= 5000.0 + 1e-6);
    assert_eq!(annotation.first_label(&corners(0.0, 40.0, 20.0)), Some("Tumor"));
}

#[test]
fn test_core_annotation_matches_expanded_core() {
    let patch_size = 64;
    let threshold = 1.0;
    let core = RasterImage::new(slide_with_tissue(128, 128, 0, 0, 128, 128));
    let expanded = core.expand(patch_size, threshold);

    let border = core_border(patch_size, threshold);
    assert_eq!(expanded.dimensions(), (128 + 2 * border, 128 + 2 * border));

    // The whole core is annotated in unexpanded coordinates
    let text = rect_line("Tumor", 0.0, 0.0, 128.0, 128.0);
    let options = AnnotationOptions::new(threshold).for_core(patch_size);
    let annotation = RegionAnnotation::parse("core", &text, &options).unwrap();

    let b = f64::from(border);
    assert_eq!(annotation.first_label(&corners(b, b, 128.0)), Some("Tumor"));
    assert_eq!(annotation.first_label(&corners(0.0, 0.0, 64.0)), None);
}

// =============================================================================
// Tissue Mask
// =============================================================================

#[test]
fn test_raster_mask_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("slide.png");

    // 16x16 mask of a 160x160 slide, tissue in the left half
    let mask = GrayImage::from_fn(16, 16, |x, y| {
        if (1..8).contains(&x) && (1..15).contains(&y) {
            Luma([255])
        } else {
            Luma([0])
        }
    });
    mask.save(&path).unwrap();

    let tissue = TissueMask::from_file(&path, (160, 160), 0.9).unwrap();
    assert_eq!(tissue.slide_name(), "slide");
    assert!(tissue.area(1.0)[CLEAN_AREA_LABEL] > 0.0);

    assert!(tissue.contains_tile(&corners(20.0, 20.0, 40.0)));
    assert!(!tissue.contains_tile(&corners(110.0, 10.0, 40.0)));
}

#[test]
fn test_text_mask_rules() {
    let dir = tempfile::tempdir().unwrap();
    let text = [
        rect_line(CLEAN_AREA_LABEL, 0.0, 0.0, 30.0, 100.0),
        rect_line(CLEAN_AREA_LABEL, 30.0, 0.0, 100.0, 100.0),
    ]
    .join("\n");
    let path = write_text(dir.path(), "slide.txt", &text);

    // Tile [0, 60): 30/60 in each strip
    let tile = corners(0.0, 0.0, 60.0);

    let cumulative = TissueMask::from_file(&path, (100, 100), 0.8).unwrap();
    assert_eq!(cumulative.rule(), CoverageRule::Cumulative);
    assert!(cumulative.contains_tile(&tile));

    let single = cumulative.with_rule(CoverageRule::SingleRegion);
    assert!(!single.contains_tile(&tile));
}

#[test]
fn test_text_mask_with_wrong_label_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_text(dir.path(), "slide.txt", &rect_line("Tumor", 0.0, 0.0, 1.0, 1.0));
    let result = TissueMask::from_file(&path, (10, 10), 0.5);
    assert!(matches!(
        result,
        Err(AnnotationError::Config(ConfigError::InvalidMaskLabel { .. }))
    ));
}

// =============================================================================
// Synthesized annotations
// =============================================================================

#[test]
fn test_coverage_round_trips_through_annotation() {
    let grid = TileGrid::new((512, 512), &GridOptions::new(128)).unwrap();
    let mut coverage = PatchCoverage::new("Tumor", 128);
    coverage.add_coords(grid.iter().filter(|p| p.tile_x < 2).map(|p| (p.x, p.y)));

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Annotation/slide.txt");
    coverage.save(&path, Some(1000.0)).unwrap();

    let annotation = RegionAnnotation::from_file(&path, &AnnotationOptions::strict()).unwrap();
    assert_eq!(annotation.area(1.0)["Tumor"], 256.0 * 512.0);

    for position in grid.iter() {
        let expected = (position.tile_x < 2).then_some("Tumor");
        assert_eq!(annotation.label_for_tile(&position, 128), expected);
    }
}
