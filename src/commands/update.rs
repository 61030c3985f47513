use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use crate::logger::LogSink;
use crate::rebuild::update_bundle;

/// Replace an asset inside a bundle end-to-end: unpack the inner
/// container, substitute the payload, re-pack the envelope.
pub fn update(
    bundle_path: &Path,
    original_asset: &Path,
    new_asset: &Path,
    output_path: &Path,
    log: &dyn LogSink,
) -> Result<()> {
    let bundle = fs::read(bundle_path)
        .with_context(|| format!("Failed to read bundle: {}", bundle_path.display()))?;
    let original = fs::read(original_asset)
        .with_context(|| format!("Failed to read original asset: {}", original_asset.display()))?;
    let new = fs::read(new_asset)
        .with_context(|| format!("Failed to read new asset: {}", new_asset.display()))?;

    eprintln!(
        "Replacing {} byte asset with {} bytes ({:+})",
        original.len(),
        new.len(),
        new.len() as i64 - original.len() as i64
    );

    let updated = update_bundle(&bundle, &original, &new, log).context("Bundle update failed")?;
    fs::write(output_path, &updated)
        .with_context(|| format!("Failed to write bundle: {}", output_path.display()))?;

    eprintln!("Wrote updated bundle: {}", output_path.display());
    Ok(())
}
