//! End-to-end extraction tests over slide files on disk.
//!
//! Tests verify:
//! - Annotated, unannotated and masked slides in one batch
//! - Tissue microarray cores with annotations in core coordinates
//! - Slides that are too small or unreadable are skipped
//! - Whole-slide TIFFs larger than memory limits are extracted
//! - Synthesized annotations and area reports from a finished run

use std::path::Path;

use clap::Parser;

use wsi_patches::config::{Cli, Command, ExtractConfig};
use wsi_patches::pipeline::{annotation_areas, run, write_coverage_annotations};
use wsi_patches::tile::{GridOptions, PatchFormat, PatchWriter};
use wsi_patches::{ExtractError, ExtractionSettings, SlideJob, CLEAN_AREA_LABEL};

use super::test_utils::{
    gradient_image, rect_line, slide_with_tissue, write_png, write_text, write_tiled_tiff,
};

fn settings(patch_size: u32) -> ExtractionSettings {
    let mut settings = ExtractionSettings::new(GridOptions::new(patch_size));
    settings.pyramid_tile_size = 100;
    settings
}

fn png_writer(root: &Path) -> PatchWriter {
    PatchWriter::new(root, PatchFormat::Png)
}

fn extract_config(args: &[&str]) -> ExtractConfig {
    let cli = Cli::try_parse_from(args.iter().copied()).unwrap();
    match cli.into_command() {
        Command::Extract(config) => config,
        other => panic!("expected extract, got {:?}", other),
    }
}

// =============================================================================
// Whole slides
// =============================================================================

#[test]
fn test_batch_with_annotation_and_fallback() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("patches");

    // Tissue on the left half only
    let annotated = write_png(
        dir.path(),
        "A.png",
        &slide_with_tissue(512, 512, 0, 0, 256, 512),
    );
    let annotation = write_text(
        dir.path(),
        "annotations/A.txt",
        &[
            rect_line("Tumor", 0.0, 0.0, 256.0, 512.0),
            rect_line("Stroma", 256.0, 0.0, 512.0, 256.0),
        ]
        .join("\n"),
    );
    let plain = write_png(dir.path(), "B.png", &slide_with_tissue(256, 256, 0, 0, 256, 256));

    let mut settings = settings(128);
    settings.resize_sizes = vec![64];
    settings.check_luminance = true;

    let jobs = [
        SlideJob::new(&annotated).with_annotation(&annotation),
        SlideJob::new(&plain),
    ];
    let store = run(&settings, &jobs, &png_writer(&out)).unwrap();

    assert_eq!(store.slide_names().collect::<Vec<_>>(), vec!["A", "B"]);
    assert_eq!(store.resize_sizes(), vec![64]);

    // Stroma tiles are all background
    let a = store.get_slide("A").unwrap();
    assert_eq!(a.labels().collect::<Vec<_>>(), vec!["Tumor"]);
    assert_eq!(a.topleft_coords("Tumor").len(), 8);
    assert!(out.join("Tumor/A/128/128_384.png").exists());
    assert!(out.join("Tumor/A/64/128_384.png").exists());
    assert!(!out.join("Stroma").exists());

    let b = store.get_slide("B").unwrap();
    assert_eq!(
        b.topleft_coords("Tissue"),
        &[(0, 0), (128, 0), (0, 128), (128, 128)]
    );
}

#[test]
fn test_text_mask_limits_extraction() {
    let dir = tempfile::tempdir().unwrap();
    let slide = write_png(dir.path(), "C.png", &slide_with_tissue(512, 512, 0, 0, 512, 512));
    let mask = write_text(
        dir.path(),
        "masks/C.txt",
        &rect_line(CLEAN_AREA_LABEL, 0.0, 0.0, 256.0, 256.0),
    );

    let store = run(
        &settings(128),
        &[SlideJob::new(&slide).with_mask(&mask)],
        &png_writer(&dir.path().join("patches")),
    )
    .unwrap();

    assert_eq!(
        store.get_slide("C").unwrap().topleft_coords("Tissue"),
        &[(0, 0), (128, 0), (0, 128), (128, 128)]
    );
}

#[test]
fn test_resume_and_cap() {
    let dir = tempfile::tempdir().unwrap();
    let slide = write_png(dir.path(), "D.png", &slide_with_tissue(256, 384, 0, 0, 256, 384));

    let mut settings = settings(128);
    settings.start_index = 2;
    settings.max_patches = Some(3);

    let store = run(&settings, &[SlideJob::new(&slide)], &png_writer(dir.path())).unwrap();
    assert_eq!(
        store.get_slide("D").unwrap().topleft_coords("Tissue"),
        &[(0, 128), (128, 128), (0, 256)]
    );
}

#[test]
fn test_large_svs_slide_is_extracted() {
    let dir = tempfile::tempdir().unwrap();
    let tile = gradient_image(256, 256);
    let slide = write_tiled_tiff(dir.path(), "VOA-2000.svs", &[(16384, 16384, tile.clone())]);

    let mut settings = settings(512);
    settings.max_patches = Some(3);
    let out = dir.path().join("patches");
    let store = run(&settings, &[SlideJob::new(&slide)], &png_writer(&out)).unwrap();

    assert_eq!(
        store.get_slide("VOA-2000").unwrap().topleft_coords("Tissue"),
        &[(0, 0), (512, 0), (1024, 0)]
    );
    let patch = image::open(out.join("Tissue/VOA-2000/512/512_0.png"))
        .unwrap()
        .to_rgb8();
    assert_eq!(patch.dimensions(), (512, 512));
    assert_eq!(*patch.get_pixel(300, 10), *tile.get_pixel(44, 10));
}

#[test]
fn test_small_and_broken_slides_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let small = write_png(dir.path(), "small.png", &slide_with_tissue(64, 64, 0, 0, 64, 64));
    let broken = write_text(dir.path(), "broken.png", "not a png");
    let good = write_png(dir.path(), "good.png", &slide_with_tissue(128, 128, 0, 0, 128, 128));

    let jobs = [
        SlideJob::new(&small),
        SlideJob::new(&broken),
        SlideJob::new(&dir.path().join("missing.png")),
        SlideJob::new(&good),
    ];
    let store = run(&settings(128), &jobs, &png_writer(&dir.path().join("out"))).unwrap();
    assert_eq!(store.slide_names().collect::<Vec<_>>(), vec!["good"]);
}

#[test]
fn test_invalid_grid_settings_are_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let slide = write_png(dir.path(), "E.png", &slide_with_tissue(128, 128, 0, 0, 128, 128));

    let settings = ExtractionSettings::new(GridOptions::new(128).with_overlap(1.5));
    let result = run(&settings, &[SlideJob::new(&slide)], &png_writer(dir.path()));
    assert!(matches!(result, Err(ExtractError::Config(_))));
}

// =============================================================================
// Tissue microarray cores
// =============================================================================

#[test]
fn test_tma_core_with_annotation() {
    let dir = tempfile::tempdir().unwrap();
    let core = write_png(dir.path(), "core-7.png", &slide_with_tissue(100, 100, 0, 0, 100, 100));
    let annotation = write_text(
        dir.path(),
        "core-7.txt",
        &rect_line("Tumor", 0.0, 0.0, 100.0, 100.0),
    );

    let mut settings = settings(64);
    settings.is_tma = true;
    settings.annotation_overlap = 0.5;

    // Border floor(0.8 * 64) = 51: a 202px expanded core and a 3x3 grid.
    // Only the centre tile lies inside the shifted annotation.
    let labeled = run(
        &settings,
        &[SlideJob::new(&core).with_annotation(&annotation)],
        &png_writer(&dir.path().join("labeled")),
    )
    .unwrap();
    assert_eq!(
        labeled.get_slide("core-7").unwrap().topleft_coords("Tumor"),
        &[(64, 64)]
    );

    let unlabeled = run(
        &settings,
        &[SlideJob::new(&core)],
        &png_writer(&dir.path().join("unlabeled")),
    )
    .unwrap();
    assert_eq!(unlabeled.get_slide("core-7").unwrap().len(), 9);
}

// =============================================================================
// After extraction
// =============================================================================

#[test]
fn test_coverage_annotations_after_run() {
    let dir = tempfile::tempdir().unwrap();
    let slide = write_png(dir.path(), "F.png", &slide_with_tissue(512, 512, 0, 0, 256, 512));

    let mut settings = settings(128);
    settings.check_luminance = true;
    let store = run(&settings, &[SlideJob::new(&slide)], &png_writer(&dir.path().join("p"))).unwrap();

    let metadata = dir.path().join("slide_coords.json");
    store.save(&metadata).unwrap();
    let reloaded = wsi_patches::SlideCoordsStore::load(&metadata).unwrap();

    let written =
        write_coverage_annotations(&reloaded, &dir.path().join("Annotation"), None).unwrap();
    assert_eq!(written, vec![dir.path().join("Annotation/F.txt")]);

    let areas = annotation_areas(&written, 0.5).unwrap();
    assert_eq!(areas["F"]["Tissue"], 256.0 * 512.0 * 0.5);
}

#[test]
fn test_config_pairs_slides_with_inputs() {
    let dir = tempfile::tempdir().unwrap();
    let a = write_png(dir.path(), "A.png", &slide_with_tissue(8, 8, 0, 0, 8, 8));
    let b = write_png(dir.path(), "B.png", &slide_with_tissue(8, 8, 0, 0, 8, 8));
    write_text(dir.path(), "ann/A.txt", &rect_line("Tumor", 0.0, 0.0, 8.0, 8.0));
    write_png(dir.path(), "masks/B.png", &slide_with_tissue(8, 8, 0, 0, 8, 8));

    let ann = dir.path().join("ann");
    let masks = dir.path().join("masks");
    let config = extract_config(&[
        "wsi-patches",
        "extract",
        a.to_str().unwrap(),
        b.to_str().unwrap(),
        "--output-dir",
        "out",
        "--annotation-dir",
        ann.to_str().unwrap(),
        "--mask-dir",
        masks.to_str().unwrap(),
    ]);

    assert_eq!(
        config.jobs(),
        vec![
            SlideJob::new(&a).with_annotation(ann.join("A.txt")),
            SlideJob::new(&b).with_mask(masks.join("B.png")),
        ]
    );
}
