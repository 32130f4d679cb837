// Purpose: Enumerate compile-eligible sources and sweep intermediate artifacts from this run.
// Inputs/Outputs: Walks a root under a PathFilter; yields root-relative paths or deletes files.
// Invariants: Pruned directories are never entered; the root itself is never pruned.
// Gotchas: Entry order follows the filesystem and differs across platforms.

use anyhow::Context;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use walkdir::{DirEntry, WalkDir};

use crate::filter::{GENERATED_EXTENSION, PathFilter, has_extension};

fn pruned_walk<'a>(
    root: &Path,
    filter: &'a PathFilter,
) -> impl Iterator<Item = walkdir::Result<DirEntry>> + 'a {
    WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .filter_entry(move |e| {
            e.depth() == 0 || !e.file_type().is_dir() || filter.descend(e.path())
        })
}

/// Lazily yields root-relative paths of compile-eligible sources.
pub fn enumerate_sources<'a>(
    root: &'a Path,
    filter: &'a PathFilter,
) -> impl Iterator<Item = anyhow::Result<PathBuf>> + 'a {
    pruned_walk(root, filter).filter_map(move |entry| {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                return Some(Err(
                    anyhow::Error::new(err).context(format!("walk {}", root.display()))
                ));
            }
        };
        // `Path::is_file` follows file symlinks; directory links are never descended.
        if !entry.path().is_file() || !filter.accepts_source(entry.path()) {
            return None;
        }
        Some(
            entry
                .path()
                .strip_prefix(root)
                .map(Path::to_path_buf)
                .with_context(|| format!("strip_prefix {}", entry.path().display())),
        )
    })
}

pub fn collect_sources(root: &Path, filter: &PathFilter) -> anyhow::Result<Vec<PathBuf>> {
    enumerate_sources(root, filter).collect()
}

/// Deletes intermediate artifacts modified strictly after `since`; returns the removed paths.
pub fn sweep_generated(
    root: &Path,
    filter: &PathFilter,
    since: SystemTime,
) -> anyhow::Result<Vec<PathBuf>> {
    let mut removed = Vec::new();
    for entry in pruned_walk(root, filter) {
        let entry = entry.with_context(|| format!("walk {}", root.display()))?;
        let path = entry.path();
        if !path.is_file() || !has_extension(path, GENERATED_EXTENSION) {
            continue;
        }
        let modified = fs::metadata(path)
            .with_context(|| format!("stat {}", path.display()))?
            .modified()
            .with_context(|| format!("mtime {}", path.display()))?;
        if modified > since {
            fs::remove_file(path).with_context(|| format!("remove {}", path.display()))?;
            tracing::debug!(path = %path.display(), "removed generated file");
            removed.push(path.to_path_buf());
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeSet, HashSet};
    use std::fs::File;
    use std::time::Duration;

    fn touch(root: &Path, rel: &str) -> PathBuf {
        let p = root.join(rel);
        fs::create_dir_all(p.parent().expect("parent")).expect("mkdir");
        fs::write(&p, "x = 1\n").expect("write");
        p
    }

    fn set_mtime(path: &Path, t: SystemTime) {
        File::options()
            .write(true)
            .open(path)
            .expect("open")
            .set_modified(t)
            .expect("set mtime");
    }

    fn sources(root: &Path, filter: &PathFilter) -> HashSet<PathBuf> {
        collect_sources(root, filter).expect("walk").into_iter().collect()
    }

    #[test]
    fn eligible_module_list_for_mixed_tree() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let root = tmp.path();
        for rel in ["a.py", "_private.py", "__init__.py", ".hidden/b.py", "sub/c.pyx"] {
            touch(root, rel);
        }
        let got = sources(root, &PathFilter::default());
        let want: HashSet<PathBuf> = ["a.py", "_private.py", "sub/c.pyx"]
            .into_iter()
            .map(PathBuf::from)
            .collect();
        assert_eq!(got, want);
    }

    #[test]
    fn nothing_below_a_hidden_directory_is_yielded() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let root = tmp.path();
        touch(root, ".venv/lib/site/deep/mod.py");
        touch(root, "pkg/.cache/x/y.pyx");
        touch(root, "pkg/ok.py");
        let got = sources(root, &PathFilter::default());
        assert_eq!(got, [PathBuf::from("pkg/ok.py")].into_iter().collect());
    }

    #[test]
    fn excluded_files_and_dirs_never_appear() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let root = tmp.path();
        let main = touch(root, "main.py");
        touch(root, "build/gen.py");
        touch(root, "keep.py");
        let files: BTreeSet<PathBuf> = [main].into_iter().collect();
        let dirs: BTreeSet<PathBuf> = [root.join("build")].into_iter().collect();
        let got = sources(root, &PathFilter::new(files, dirs));
        assert_eq!(got, [PathBuf::from("keep.py")].into_iter().collect());
    }

    #[test]
    fn hidden_root_is_still_walked() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let root = tmp.path().join(".project");
        touch(&root, "a.py");
        let got = sources(&root, &PathFilter::default());
        assert_eq!(got, [PathBuf::from("a.py")].into_iter().collect());
    }

    #[test]
    fn enumeration_is_restartable() {
        let tmp = tempfile::tempdir().expect("tempdir");
        touch(tmp.path(), "a.py");
        touch(tmp.path(), "b/c.py");
        let filter = PathFilter::default();
        assert_eq!(sources(tmp.path(), &filter), sources(tmp.path(), &filter));
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_sources_are_yielded_but_linked_dirs_are_not_entered() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let root = tmp.path();
        let real = touch(root, "shared/real.py");
        std::os::unix::fs::symlink(&real, root.join("link.py")).expect("file symlink");
        std::os::unix::fs::symlink(root.join("shared"), root.join("alias")).expect("dir symlink");

        let got = sources(root, &PathFilter::default());

        let want: HashSet<PathBuf> = ["shared/real.py", "link.py"]
            .into_iter()
            .map(PathBuf::from)
            .collect();
        assert_eq!(got, want);
    }

    #[test]
    fn sweep_only_removes_files_newer_than_start() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let root = tmp.path();
        let start = SystemTime::now();
        let old = touch(root, "legacy/old.c");
        set_mtime(&old, start - Duration::from_secs(3600));
        let same = touch(root, "same.c");
        set_mtime(&same, start);
        let fresh = touch(root, "pkg/fresh.c");
        set_mtime(&fresh, start + Duration::from_secs(5));
        let hidden = touch(root, ".hidden/fresh.c");
        set_mtime(&hidden, start + Duration::from_secs(5));
        let src = touch(root, "pkg/fresh.py");
        set_mtime(&src, start + Duration::from_secs(5));

        let removed = sweep_generated(root, &PathFilter::default(), start).expect("sweep");

        assert_eq!(removed, vec![fresh.clone()]);
        assert!(old.exists());
        assert!(same.exists());
        assert!(!fresh.exists());
        assert!(hidden.exists());
        assert!(src.exists());
    }
}
