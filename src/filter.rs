use std::collections::BTreeSet;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use crate::config::PackConfig;

/// Extensions accepted as compilable sources.
pub const SOURCE_EXTENSIONS: [&str; 2] = ["py", "pyx"];
/// Extension of the text sources mirrored into the backup directory.
pub const BACKUP_EXTENSION: &str = "py";
/// Intermediate artifact emitted by the translator next to each source.
pub const GENERATED_EXTENSION: &str = "c";
pub const BINARY_EXTENSIONS: [&str; 2] = ["so", "pyd"];

pub const HIDDEN_PREFIX: char = '.';
pub const PRIVATE_PREFIX: &str = "__";

/// Decides which directories are descended into and which files enter the compile set.
#[derive(Debug, Clone, Default)]
pub struct PathFilter {
    excluded_files: BTreeSet<PathBuf>,
    excluded_dirs: BTreeSet<PathBuf>,
}

impl PathFilter {
    pub fn new(excluded_files: BTreeSet<PathBuf>, excluded_dirs: BTreeSet<PathBuf>) -> Self {
        Self {
            excluded_files,
            excluded_dirs,
        }
    }

    pub fn from_config(cfg: &PackConfig) -> Self {
        Self::new(cfg.excluded_files.clone(), cfg.excluded_dir_set())
    }

    /// Directory rule: hidden names and excluded absolute paths are pruned with their subtree.
    pub fn descend(&self, dir: &Path) -> bool {
        !is_hidden(dir) && !self.excluded_dirs.contains(dir)
    }

    pub fn is_excluded_file(&self, file: &Path) -> bool {
        self.excluded_files.contains(file)
    }

    /// File rules: not excluded, recognized extension, no private prefix.
    pub fn accepts_source(&self, file: &Path) -> bool {
        if self.is_excluded_file(file) {
            return false;
        }
        let Some(name) = file.file_name().and_then(OsStr::to_str) else {
            return false;
        };
        !name.starts_with(PRIVATE_PREFIX) && has_any_extension(file, &SOURCE_EXTENSIONS)
    }
}

pub fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(OsStr::to_str)
        .is_some_and(|name| name.starts_with(HIDDEN_PREFIX))
}

pub fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension().and_then(OsStr::to_str) == Some(ext)
}

pub fn has_any_extension(path: &Path, exts: &[&str]) -> bool {
    exts.iter().any(|ext| has_extension(path, ext))
}
