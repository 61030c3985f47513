use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use crate::logger::LogSink;
use crate::rebuild::rebuild;

/// Replace an asset inside an already-extracted inner container.
pub fn update_cab(
    container_path: &Path,
    original_asset: &Path,
    new_asset: &Path,
    output_path: &Path,
    log: &dyn LogSink,
) -> Result<()> {
    let container = fs::read(container_path)
        .with_context(|| format!("Failed to read container: {}", container_path.display()))?;
    let original = fs::read(original_asset)
        .with_context(|| format!("Failed to read original asset: {}", original_asset.display()))?;
    let new = fs::read(new_asset)
        .with_context(|| format!("Failed to read new asset: {}", new_asset.display()))?;

    let updated = rebuild(&container, &original, &new, log).context("Container rebuild failed")?;
    fs::write(output_path, &updated)
        .with_context(|| format!("Failed to write container: {}", output_path.display()))?;

    eprintln!("Wrote updated container: {}", output_path.display());
    Ok(())
}
