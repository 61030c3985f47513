use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use crate::bundle::{repack, sidecar_path, BundleMeta};
use crate::logger::LogSink;

/// Wrap an (edited) inner container back into a bundle, using the
/// metadata sidecar written at extraction time.
pub fn repack_bundle(container_path: &Path, output_path: &Path, log: &dyn LogSink) -> Result<()> {
    let meta_path = sidecar_path(container_path);
    let meta = BundleMeta::load(&meta_path)
        .with_context(|| format!("Failed to load sidecar: {}", meta_path.display()))?;
    let payload = fs::read(container_path)
        .with_context(|| format!("Failed to read container: {}", container_path.display()))?;

    let bundle = repack(&meta, &payload, log).context("Bundle re-pack failed")?;
    fs::write(output_path, &bundle)
        .with_context(|| format!("Failed to write bundle: {}", output_path.display()))?;

    eprintln!("Wrote re-packed bundle: {}", output_path.display());
    Ok(())
}
