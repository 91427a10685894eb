//! Input discovery

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// True if the file name ends in `.<ext>`, ignoring case.
///
/// Works for compound extensions such as `tar.gz`.
pub fn has_extension(path: &Path, ext: &str) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    let ext = ext.trim_start_matches('.');
    let name = name.to_ascii_lowercase();
    let suffix = format!(".{}", ext.to_ascii_lowercase());
    name.len() > suffix.len() && name.ends_with(&suffix)
}

/// List the files directly inside `folder` that match one of `extensions`,
/// sorted by path
pub fn discover_inputs(folder: &Path, extensions: &[String]) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(folder)
        .with_context(|| format!("Failed to read input folder: {:?}", folder))?;

    let mut inputs = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("Failed to list input folder: {:?}", folder))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if extensions.iter().any(|ext| has_extension(&path, ext)) {
            inputs.push(path);
        } else {
            log::trace!("Skipping {:?}", path);
        }
    }
    inputs.sort();

    log::info!("Found {} input files in {:?}", inputs.len(), folder);
    Ok(inputs)
}
