use anyhow::Context;
use std::fs::{self, File, FileTimes};
use std::path::Path;
use walkdir::WalkDir;

use crate::filter::{BACKUP_EXTENSION, has_extension};

/// Mirrors every `.py` file under `root` into `backup_dir`, keeping relative paths,
/// permissions and timestamps. Existing copies are overwritten. Returns the number of files copied.
pub fn backup_tree(root: &Path, backup_dir: &Path) -> anyhow::Result<usize> {
    fs::create_dir_all(backup_dir)
        .with_context(|| format!("create backup dir {}", backup_dir.display()))?;

    let mut copied = 0;
    let walk = WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .filter_entry(|e| e.path() != backup_dir);
    for entry in walk {
        let entry = entry.with_context(|| format!("walk {}", root.display()))?;
        let src = entry.path();
        // Follows file symlinks; directory links are not descended.
        if !src.is_file() || !has_extension(src, BACKUP_EXTENSION) {
            continue;
        }
        let rel = src
            .strip_prefix(root)
            .with_context(|| format!("strip_prefix {}", src.display()))?;
        let dst = backup_dir.join(rel);
        copy_preserving(src, &dst)?;
        tracing::debug!(src = %rel.display(), "backed up");
        copied += 1;
    }
    Ok(copied)
}

fn copy_preserving(src: &Path, dst: &Path) -> anyhow::Result<()> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).with_context(|| format!("mkdir {}", parent.display()))?;
    }
    // A read-only copy from an earlier run would make the truncating open fail.
    make_writable(dst)?;
    fs::copy(src, dst).with_context(|| format!("copy {} -> {}", src.display(), dst.display()))?;

    let meta = fs::metadata(src).with_context(|| format!("stat {}", src.display()))?;
    let mut times = FileTimes::new().set_modified(meta.modified()?);
    if let Ok(accessed) = meta.accessed() {
        times = times.set_accessed(accessed);
    }
    // Setting times needs a writable handle, so the source mode is restored last.
    make_writable(dst)?;
    File::options()
        .write(true)
        .open(dst)
        .and_then(|f| f.set_times(times))
        .with_context(|| format!("set times on {}", dst.display()))?;
    fs::set_permissions(dst, meta.permissions())
        .with_context(|| format!("set permissions on {}", dst.display()))?;
    Ok(())
}

fn make_writable(path: &Path) -> anyhow::Result<()> {
    let Ok(meta) = fs::metadata(path) else {
        return Ok(());
    };
    let mut perms = meta.permissions();
    if perms.readonly() {
        #[allow(clippy::permissions_set_readonly_false)]
        perms.set_readonly(false);
        fs::set_permissions(path, perms)
            .with_context(|| format!("make writable {}", path.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::{Duration, SystemTime};

    fn write(root: &Path, rel: &str, body: &str) -> PathBuf {
        let p = root.join(rel);
        fs::create_dir_all(p.parent().expect("parent")).expect("mkdir");
        fs::write(&p, body).expect("write");
        p
    }

    fn snapshot(dir: &Path) -> Vec<(PathBuf, Vec<u8>)> {
        let mut out: Vec<_> = WalkDir::new(dir)
            .into_iter()
            .map(|e| e.expect("walk"))
            .filter(|e| e.file_type().is_file())
            .map(|e| {
                let rel = e.path().strip_prefix(dir).expect("rel").to_path_buf();
                (rel, fs::read(e.path()).expect("read"))
            })
            .collect();
        out.sort();
        out
    }

    #[test]
    fn mirrors_py_files_only_and_skips_itself() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let root = tmp.path();
        write(root, "a.py", "a");
        write(root, "__init__.py", "");
        write(root, "pkg/deep/b.py", "b");
        write(root, "pkg/c.pyx", "c");
        write(root, ".hidden/d.py", "d");
        let backup = root.join(".bak");
        write(&backup, "stale.py", "old");

        let copied = backup_tree(root, &backup).expect("backup");

        assert_eq!(copied, 4);
        assert!(backup.join("a.py").is_file());
        assert!(backup.join("__init__.py").is_file());
        assert!(backup.join("pkg/deep/b.py").is_file());
        assert!(backup.join(".hidden/d.py").is_file());
        assert!(!backup.join("pkg/c.pyx").exists());
        assert!(!backup.join(".bak").exists());
    }

    #[test]
    fn modification_time_is_preserved() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let root = tmp.path();
        let src = write(root, "m.py", "print(1)\n");
        let past = SystemTime::now() - Duration::from_secs(86_400);
        File::options()
            .write(true)
            .open(&src)
            .expect("open")
            .set_modified(past)
            .expect("set mtime");

        backup_tree(root, &root.join(".bak")).expect("backup");

        let got = fs::metadata(root.join(".bak/m.py"))
            .expect("stat")
            .modified()
            .expect("mtime");
        let want = fs::metadata(&src).expect("stat").modified().expect("mtime");
        assert_eq!(got, want);
    }

    #[test]
    fn second_run_produces_identical_backup() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let root = tmp.path();
        write(root, "a.py", "alpha");
        write(root, "x/y/z.py", "zeta");
        let backup = root.join(".bak");

        backup_tree(root, &backup).expect("first backup");
        let first = snapshot(&backup);
        backup_tree(root, &backup).expect("second backup");
        let second = snapshot(&backup);

        assert_eq!(first, second);
    }

    #[test]
    fn overwrites_read_only_copies() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let root = tmp.path();
        let src = write(root, "ro.py", "v1");
        let mut perms = fs::metadata(&src).expect("stat").permissions();
        perms.set_readonly(true);
        fs::set_permissions(&src, perms).expect("chmod");
        let backup = root.join(".bak");
        backup_tree(root, &backup).expect("first backup");

        let mut perms = fs::metadata(&src).expect("stat").permissions();
        #[allow(clippy::permissions_set_readonly_false)]
        perms.set_readonly(false);
        fs::set_permissions(&src, perms).expect("chmod");
        fs::write(&src, "v2").expect("rewrite");
        backup_tree(root, &backup).expect("second backup");

        assert_eq!(fs::read_to_string(backup.join("ro.py")).expect("read"), "v2");
        assert!(!fs::metadata(backup.join("ro.py")).expect("stat").permissions().readonly());
    }

    #[cfg(unix)]
    #[test]
    fn unix_mode_is_preserved() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().expect("tempdir");
        let root = tmp.path();
        let src = write(root, "pkg/mode.py", "m");
        fs::set_permissions(&src, fs::Permissions::from_mode(0o640)).expect("chmod");
        let ro = write(root, "frozen.py", "f");
        fs::set_permissions(&ro, fs::Permissions::from_mode(0o444)).expect("chmod");
        let backup = root.join(".bak");

        backup_tree(root, &backup).expect("backup");

        let mode = |p: PathBuf| fs::metadata(p).expect("stat").permissions().mode() & 0o777;
        assert_eq!(mode(backup.join("pkg/mode.py")), 0o640);
        assert_eq!(mode(backup.join("frozen.py")), 0o444);
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_sources_are_copied() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let root = tmp.path();
        write(root, "shared/real.py", "real");
        std::os::unix::fs::symlink(root.join("shared/real.py"), root.join("link.py"))
            .expect("symlink");
        let backup = root.join(".bak");

        let copied = backup_tree(root, &backup).expect("backup");

        assert_eq!(copied, 2);
        let link = backup.join("link.py");
        assert!(!fs::symlink_metadata(&link).expect("stat").file_type().is_symlink());
        assert_eq!(fs::read_to_string(link).expect("read"), "real");
    }
}
