use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mad_tools::{
    commands::{
        extract::extract_bundle, extract_asset::extract_asset, repack::repack_bundle,
        scan::scan_bundles, update::update, update_cab::update_cab,
    },
    logger::{LogSink, NullSink, StderrSink},
};

#[derive(Debug, Subcommand)]
enum Command {
    /// Extract a bundle's files (and re-pack sidecars) to a folder
    Extract {
        /// Path to the bundle file
        bundle: PathBuf,
        /// Path to the folder to output the extracted files
        output_folder: PathBuf,
    },
    /// Extract the single asset payload from an inner container
    ExtractAsset {
        /// Path to the extracted inner container
        container: PathBuf,
        /// Path to the folder to output the asset
        output_folder: PathBuf,
    },
    /// Identify card-text containers across bundles matching a glob
    Scan {
        /// Glob pattern selecting candidate bundle files
        #[clap(default_value = "*")]
        glob: String,
    },
    /// Replace an asset inside a bundle and write the updated bundle
    Update {
        bundle: PathBuf,
        /// The asset bytes as originally extracted
        original_asset: PathBuf,
        /// The replacement asset bytes
        new_asset: PathBuf,
        output: PathBuf,
    },
    /// Replace an asset inside an extracted inner container
    UpdateCab {
        container: PathBuf,
        original_asset: PathBuf,
        new_asset: PathBuf,
        output: PathBuf,
    },
    /// Re-wrap an edited inner container using its metadata sidecar
    Repack {
        container: PathBuf,
        output: PathBuf,
    },
}

/// Tooling for the card-text asset bundles: extraction, identification,
/// and payload replacement.
#[derive(Parser, Debug)]
#[command(name = "mad_bundles")]
#[clap(version)]
struct Cli {
    /// Print per-step diagnostics to stderr
    #[arg(long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let log: &dyn LogSink = if cli.verbose { &StderrSink } else { &NullSink };

    match cli.command {
        Command::Extract {
            bundle,
            output_folder,
        } => extract_bundle(&bundle, &output_folder, log).context("Extract command failed")?,
        Command::ExtractAsset {
            container,
            output_folder,
        } => extract_asset(&container, &output_folder, log)
            .context("Extract-asset command failed")?,
        Command::Scan { glob } => scan_bundles(&glob, log).context("Scan command failed")?,
        Command::Update {
            bundle,
            original_asset,
            new_asset,
            output,
        } => update(&bundle, &original_asset, &new_asset, &output, log)
            .context("Update command failed")?,
        Command::UpdateCab {
            container,
            original_asset,
            new_asset,
            output,
        } => update_cab(&container, &original_asset, &new_asset, &output, log)
            .context("Update-cab command failed")?,
        Command::Repack { container, output } => {
            repack_bundle(&container, &output, log).context("Repack command failed")?
        }
    }

    Ok(())
}
