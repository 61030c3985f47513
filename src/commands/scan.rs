use std::fs;

use anyhow::{Context, Result};
use bytes::Bytes;

use crate::bundle::AssetBundle;
use crate::constants::CARD_CONTAINER_SUFFIXES;
use crate::logger::LogSink;
use crate::single_asset::scan_for_suffixes;

/// Best-effort identification sweep: try every file matching the glob as
/// a bundle and report which card-text containers it appears to carry.
/// Files that aren't bundles are skipped quietly.
pub fn scan_bundles(pattern: &str, log: &dyn LogSink) -> Result<()> {
    let paths = glob::glob(pattern).context("Invalid glob pattern")?;

    for entry in paths {
        let path = entry.context("Failed to walk glob matches")?;
        if !path.is_file() {
            continue;
        }
        let Ok(data) = fs::read(&path) else { continue };
        let Ok(bundle) = AssetBundle::parse(Bytes::from(data), log) else {
            continue;
        };
        let Ok(payloads) = bundle.assemble_directories(log) else {
            continue;
        };

        for (directory, payload) in bundle.directories.iter().zip(payloads) {
            let Some(payload) = payload else { continue };
            for hit in scan_for_suffixes(&payload, &CARD_CONTAINER_SUFFIXES) {
                println!("{}: {} ({})", path.display(), hit, directory.path);
            }
        }
    }
    Ok(())
}
