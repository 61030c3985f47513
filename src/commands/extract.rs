use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use bytes::Bytes;

use crate::bundle::AssetBundle;
use crate::logger::LogSink;

/// Extract every file carried by a bundle into a folder.
pub fn extract_bundle(bundle_path: &Path, output_folder: &Path, log: &dyn LogSink) -> Result<()> {
    let data = fs::read(bundle_path)
        .with_context(|| format!("Failed to read bundle: {}", bundle_path.display()))?;

    let bundle = AssetBundle::parse(Bytes::from(data), log)
        .with_context(|| format!("Failed to parse bundle: {}", bundle_path.display()))?;

    let written = bundle
        .extract_to(output_folder, log)
        .context("Failed to extract bundle contents")?;

    for path in &written {
        eprintln!("Extracted file: {}", path.display());
    }
    if written.len() < bundle.directories.len() {
        eprintln!(
            "Skipped {} entr(ies) with mismatched sizes",
            bundle.directories.len() - written.len()
        );
    }
    Ok(())
}
