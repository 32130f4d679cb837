use anyhow::Context;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

/// Exclusive advisory lock held for the duration of one packaging run.
pub struct PackLock {
    _file: File,
    path: PathBuf,
}

impl PackLock {
    /// Fails immediately if another process holds the lock.
    pub fn acquire(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("mkdir {}", parent.display()))?;
        }
        let f = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)
            .with_context(|| format!("open {}", path.display()))?;
        FileExt::try_lock_exclusive(&f).with_context(|| {
            format!("another cypack run holds the lock at {}", path.display())
        })?;
        Ok(Self {
            _file: f,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
