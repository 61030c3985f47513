use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use crate::logger::LogSink;
use crate::single_asset::SingleAsset;

/// Pull the single meaningful payload out of an inner container and
/// write it as `<name>.bin`.
pub fn extract_asset(container_path: &Path, output_folder: &Path, log: &dyn LogSink) -> Result<()> {
    let data = fs::read(container_path)
        .with_context(|| format!("Failed to read container: {}", container_path.display()))?;

    let asset = SingleAsset::read(&data, log)
        .with_context(|| format!("Failed to locate asset in {}", container_path.display()))?;
    let written = asset
        .extract_to(&data, output_folder, log)
        .context("Failed to write asset payload")?;

    eprintln!("Extracted asset {}: {}", asset.name, written.display());
    Ok(())
}
