//! Tile grid tests.
//!
//! Tests verify:
//! - Unshuffled grids are row-major and cover the expected tiles
//! - Shuffled grids are seed-deterministic permutations
//! - Random access agrees with iteration, including resumption

use std::collections::BTreeSet;

use proptest::prelude::*;

use wsi_patches::error::GridError;
use wsi_patches::slide::RasterImage;
use wsi_patches::tile::{GridOptions, TileGrid, TilePosition};

use super::test_utils::gradient_image;

fn positions(grid: &TileGrid) -> Vec<TilePosition> {
    grid.iter().collect()
}

// =============================================================================
// Layout
// =============================================================================

#[test]
fn test_grid_over_exact_multiple() {
    let grid = TileGrid::new((3 * 256, 2 * 256), &GridOptions::new(256)).unwrap();
    assert_eq!(grid.len(), 6);
    assert_eq!(grid.tile_counts(), (3, 2));

    let xy: Vec<(u32, u32)> = grid.iter().map(|p| (p.x, p.y)).collect();
    assert_eq!(
        xy,
        vec![(0, 0), (256, 0), (512, 0), (0, 256), (256, 256), (512, 256)]
    );
}

#[test]
fn test_grid_for_image_uses_source_dimensions() {
    let raster = RasterImage::new(gradient_image(300, 200));
    let grid = TileGrid::for_image(&raster, &GridOptions::new(100)).unwrap();
    assert_eq!(grid.dimensions(), (300, 200));
    assert_eq!(grid.len(), 6);
}

#[test]
fn test_half_overlap_doubles_density() {
    let options = GridOptions::new(256).with_overlap(0.5);
    let grid = TileGrid::new((1024, 1024), &options).unwrap();
    assert_eq!(grid.stride(), 128);
    assert_eq!(grid.tile_counts(), (7, 7));
}

#[test]
fn test_out_of_range_index() {
    let grid = TileGrid::new((512, 512), &GridOptions::new(256)).unwrap();
    assert_eq!(
        grid.get(4),
        Err(GridError::IndexOutOfRange { index: 4, len: 4 })
    );
}

#[test]
fn test_shuffled_grid_differs_by_seed() {
    let dims = (32 * 64, 32 * 64);
    let a = TileGrid::new(dims, &GridOptions::new(64).shuffled(1)).unwrap();
    let b = TileGrid::new(dims, &GridOptions::new(64).shuffled(2)).unwrap();
    assert!(a.is_shuffled());
    assert_ne!(positions(&a), positions(&b));
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #[test]
    fn prop_unshuffled_positions_follow_formula(
        tiles_x in 1u32..12,
        tiles_y in 1u32..12,
        patch in 1u32..64,
    ) {
        let grid = TileGrid::new((tiles_x * patch, tiles_y * patch), &GridOptions::new(patch)).unwrap();
        prop_assert_eq!(grid.len(), (tiles_x * tiles_y) as usize);

        for (index, position) in grid.iter().enumerate() {
            let index = index as u32;
            prop_assert_eq!(position.tile_x, index % tiles_x);
            prop_assert_eq!(position.tile_y, index / tiles_x);
            prop_assert_eq!(position.x, (index % tiles_x) * patch);
            prop_assert_eq!(position.y, (index / tiles_x) * patch);
        }
    }

    #[test]
    fn prop_shuffle_is_a_permutation(
        width in 64u32..1024,
        height in 64u32..1024,
        seed in any::<u64>(),
    ) {
        let plain = TileGrid::new((width, height), &GridOptions::new(64)).unwrap();
        let shuffled = TileGrid::new((width, height), &GridOptions::new(64).shuffled(seed)).unwrap();
        let again = TileGrid::new((width, height), &GridOptions::new(64).shuffled(seed)).unwrap();

        let plain_set: BTreeSet<TilePosition> = plain.iter().collect();
        let shuffled_set: BTreeSet<TilePosition> = shuffled.iter().collect();
        prop_assert_eq!(plain_set, shuffled_set);
        prop_assert_eq!(positions(&shuffled), positions(&again));
    }

    #[test]
    fn prop_random_access_matches_iteration(
        width in 32u32..600,
        height in 32u32..600,
        overlap_pct in 0u32..90,
        start in 0usize..50,
    ) {
        let options = GridOptions::new(32).with_overlap(f64::from(overlap_pct) / 100.0);
        let grid = TileGrid::new((width, height), &options).unwrap();

        let all = positions(&grid);
        for (index, position) in all.iter().enumerate() {
            prop_assert_eq!(grid.get(index).unwrap(), *position);
        }

        let resumed: Vec<TilePosition> = grid.iter_from(start).collect();
        let expected: Vec<TilePosition> = all.iter().skip(start).copied().collect();
        prop_assert_eq!(resumed, expected);
    }

    #[test]
    fn prop_patches_stay_inside_image(
        width in 16u32..800,
        height in 16u32..800,
        extra in 0u32..20,
    ) {
        let options = GridOptions::new(16).with_extra_stride(extra);
        let grid = TileGrid::new((width, height), &options).unwrap();
        for position in grid.iter() {
            prop_assert!(position.x + 16 <= width);
            prop_assert!(position.y + 16 <= height);
        }
    }
}
