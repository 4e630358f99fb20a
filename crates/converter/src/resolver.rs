use std::fs;
use std::path::{Path, PathBuf};
use log::{debug, info};
use crate::error::FsError;

/// Map a source file into the target tree.
///
/// The path relative to `source_root` is re-rooted under `target_root` and
/// the extension replaced with `target_extension`.
pub fn resolve_target(
    source_path: &Path,
    source_root: &Path,
    target_root: &Path,
    target_extension: &str,
) -> Result<PathBuf, FsError> {
    let relative = source_path
        .strip_prefix(source_root)
        .map_err(|_| FsError::OutsideRoot {
            source_path: source_path.to_path_buf(),
            root: source_root.to_path_buf(),
        })?;

    let mut target = target_root.join(relative);
    target.set_extension(target_extension.trim_start_matches('.'));
    Ok(target)
}

/// Create the parent directories of `target` unless this is a dry run.
///
/// Returns whether anything was created. Existing directories are fine.
pub fn ensure_parent(target: &Path, dry_run: bool) -> Result<bool, FsError> {
    let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) else {
        return Ok(false);
    };

    if parent.is_dir() {
        return Ok(false);
    }

    if dry_run {
        info!("Not creating target directory {} (dry run mode)", parent.display());
        return Ok(false);
    }

    fs::create_dir_all(parent).map_err(|source| FsError::CreateDir {
        path: parent.to_path_buf(),
        source,
    })?;
    debug!("Created target directory {}", parent.display());
    Ok(true)
}

/// Path of the chapter metadata file written next to a target
pub fn metadata_path(target: &Path) -> PathBuf {
    let mut path = target.to_path_buf();
    path.set_extension("ffmetadata");
    path
}
