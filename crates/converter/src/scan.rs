use std::path::PathBuf;
use anyhow::{bail, Result};
use walkdir::WalkDir;
use crate::config::TranscodeConfig;
use log::{debug, info, warn};

/// Enumerate source files eligible for conversion.
///
/// Only files whose extension is in `source_formats` are returned; the walk
/// stays at the top level unless `recursive` is set. The result is sorted so
/// batch order does not depend on directory iteration order.
pub fn discover(cfg: &TranscodeConfig) -> Result<Vec<PathBuf>> {
    let root = &cfg.source_directory;
    if !root.is_dir() {
        bail!("Source directory does not exist: {}", root.display());
    }

    info!("Scanning directory: {} (recursive: {})", root.display(), cfg.recursive);

    let mut walker = WalkDir::new(root).follow_links(false).min_depth(1);
    if !cfg.recursive {
        walker = walker.max_depth(1);
    }

    let mut files = Vec::new();
    let mut entry_count = 0;

    for entry in walker.into_iter() {
        entry_count += 1;

        // Log progress every 1000 entries
        if entry_count % 1000 == 0 {
            info!("Scanned {} entries so far in {}...", entry_count, root.display());
        }

        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!("Error reading directory entry: {}", e);
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let matches = path
            .extension()
            .and_then(|s| s.to_str())
            .map(|ext| cfg.is_source_format(ext))
            .unwrap_or(false);

        if matches {
            debug!("Found media file: {}", path.display());
            files.push(path.to_path_buf());
        }
    }

    files.sort();
    info!("Scan complete: {} entries, {} media files", entry_count, files.len());
    Ok(files)
}
