//! wsi-patches - Patch extraction for Whole Slide Images.
//!
//! This binary parses the command line and runs one subcommand.

use clap::Parser;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wsi_patches::{
    config::{AnnotateConfig, AreaConfig, Cli, Command, ExtractConfig, MergeConfig},
    pipeline::{annotation_areas, run, write_coverage_annotations},
    SlideCoordsStore,
};

fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Extract(config) => run_extract(config),
        Command::Merge(config) => run_merge(config),
        Command::Annotate(config) => run_annotate(config),
        Command::Area(config) => run_area(config),
    }
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "wsi_patches=debug"
    } else {
        "wsi_patches=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

// =============================================================================
// Extract Command
// =============================================================================

fn run_extract(config: ExtractConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    info!("Configuration:");
    info!("  Slides: {}", config.slides.len());
    info!("  Output: {}", config.output_dir.display());
    info!(
        "  Patch size: {} (overlap {}, resize to {:?})",
        config.patch_size, config.patch_overlap, config.resize_sizes
    );
    if let Some(ref dir) = config.annotation_dir {
        info!("  Annotations: {} (overlap {})", dir.display(), config.annotation_overlap);
    }
    if let Some(ref dir) = config.mask_dir {
        info!("  Masks: {} (overlap {})", dir.display(), config.mask_overlap);
    }

    let settings = config.settings();
    let writer = config.writer();
    let jobs = config.jobs();

    let store = match run(&settings, &jobs, &writer) {
        Ok(store) => store,
        Err(e) => {
            error!("Extraction failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let metadata_path = config.metadata_path();
    if let Err(e) = store.save(&metadata_path) {
        error!("Failed to write {}: {}", metadata_path.display(), e);
        return ExitCode::FAILURE;
    }

    info!(
        "Wrote coordinates for {} slide(s) to {}",
        store.len(),
        metadata_path.display()
    );
    ExitCode::SUCCESS
}

// =============================================================================
// Merge Command
// =============================================================================

fn run_merge(config: MergeConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let mut merged: Option<SlideCoordsStore> = None;
    for path in &config.inputs {
        let store = match SlideCoordsStore::load(path) {
            Ok(store) => store,
            Err(e) => {
                error!("Failed to read {}: {}", path.display(), e);
                return ExitCode::FAILURE;
            }
        };

        match merged.as_mut() {
            None => merged = Some(store),
            Some(target) => {
                if let Err(e) = target.merge(store) {
                    error!("Cannot merge {}: {}", path.display(), e);
                    return ExitCode::FAILURE;
                }
            }
        }
    }

    let Some(merged) = merged else {
        return ExitCode::FAILURE;
    };

    if let Err(e) = merged.save(&config.output) {
        error!("Failed to write {}: {}", config.output.display(), e);
        return ExitCode::FAILURE;
    }

    info!(
        "Merged {} file(s) covering {} slide(s) into {}",
        config.inputs.len(),
        merged.len(),
        config.output.display()
    );
    ExitCode::SUCCESS
}

// =============================================================================
// Annotate Command
// =============================================================================

fn run_annotate(config: AnnotateConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let store = match SlideCoordsStore::load(&config.metadata) {
        Ok(store) => store,
        Err(e) => {
            error!("Failed to read {}: {}", config.metadata.display(), e);
            return ExitCode::FAILURE;
        }
    };

    match write_coverage_annotations(&store, &config.output_dir, config.skip_area) {
        Ok(written) => {
            info!(
                "Wrote {} annotation(s) to {}",
                written.len(),
                config.output_dir.display()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Failed to write annotations: {}", e);
            ExitCode::FAILURE
        }
    }
}

// =============================================================================
// Area Command
// =============================================================================

fn run_area(config: AreaConfig) -> ExitCode {
    if config.verbose {
        init_logging(true);
    }

    if let Err(e) = config.validate() {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    let areas = match annotation_areas(&config.annotations, config.scale_factor) {
        Ok(areas) => areas,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match serde_json::to_string_pretty(&areas) {
        Ok(json) => {
            println!("{}", json);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
