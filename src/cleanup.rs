use anyhow::Context;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use walkdir::WalkDir;

use crate::filter::{BACKUP_EXTENSION, BINARY_EXTENSIONS, PathFilter, has_extension};

/// Removes the scratch tree. Returns false when it was already absent.
pub fn remove_scratch(dir: &Path) -> anyhow::Result<bool> {
    match fs::remove_dir_all(dir) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e).with_context(|| format!("remove {}", dir.display())),
    }
}

/// Deletes `.py` sources that have a compiled sibling with the same stem.
///
/// With `fresh_since` set, the sibling only counts when it was modified at or after that
/// instant, so binaries left by an older run never cause a deletion.
pub fn remove_sources_if_compiled(
    root: &Path,
    filter: &PathFilter,
    fresh_since: Option<SystemTime>,
) -> anyhow::Result<Vec<PathBuf>> {
    let mut removed = Vec::new();
    let walk = WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .filter_entry(|e| {
            e.depth() == 0 || !e.file_type().is_dir() || filter.descend(e.path())
        });
    for entry in walk {
        let entry = entry.with_context(|| format!("walk {}", root.display()))?;
        let src = entry.path();
        if !src.is_file()
            || !has_extension(src, BACKUP_EXTENSION)
            || filter.is_excluded_file(src)
        {
            continue;
        }
        if compiled_sibling(src, fresh_since)?.is_some() {
            fs::remove_file(src).with_context(|| format!("remove {}", src.display()))?;
            tracing::debug!(path = %src.display(), "removed compiled source");
            removed.push(src.to_path_buf());
        }
    }
    Ok(removed)
}

fn compiled_sibling(
    src: &Path,
    fresh_since: Option<SystemTime>,
) -> anyhow::Result<Option<PathBuf>> {
    for ext in BINARY_EXTENSIONS {
        let bin = src.with_extension(ext);
        let Ok(meta) = fs::metadata(&bin) else {
            continue;
        };
        if !meta.is_file() {
            continue;
        }
        match fresh_since {
            None => return Ok(Some(bin)),
            Some(since) => {
                let modified = meta
                    .modified()
                    .with_context(|| format!("mtime {}", bin.display()))?;
                if modified >= since {
                    return Ok(Some(bin));
                }
                tracing::debug!(binary = %bin.display(), "ignoring stale binary");
            }
        }
    }
    Ok(None)
}
