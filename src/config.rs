// Purpose: Describe one packaging run: project root, exclusions, scratch/backup names, toolchain knobs.
// Inputs/Outputs: Built from defaults, an optional cypack.toml, environment overrides and CLI flags.
// Invariants: Scratch and backup directories are always part of the excluded directory set.
// Gotchas: Relative entries are resolved against the root, never against the process cwd.

use anyhow::{Context, bail};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Component, Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "cypack.toml";
pub const DEFAULT_SCRATCH_DIR: &str = "build";
pub const DEFAULT_BACKUP_DIR: &str = ".bak";
pub const DEFAULT_ENTRY_POINT: &str = "main.py";
pub const DEFAULT_PYTHON: &str = "python3";
pub const LOCK_FILE_NAME: &str = ".cypack.lock";

pub const ENV_PYTHON: &str = "CYPACK_PYTHON";
pub const ENV_CC: &str = "CYPACK_CC";

#[derive(Debug, Clone)]
pub struct PackConfig {
    pub root: PathBuf,
    pub excluded_files: BTreeSet<PathBuf>,
    pub excluded_dirs: BTreeSet<PathBuf>,
    pub scratch_dir_name: String,
    pub backup_dir_name: String,
    pub remove_sources: bool,
    pub require_fresh_binary: bool,
    pub python: String,
    pub cc: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub pack: PackSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PackSection {
    #[serde(default)]
    pub scratch_dir: Option<String>,
    #[serde(default)]
    pub backup_dir: Option<String>,
    /// Replaces the default entry-point exclusion when present.
    #[serde(default)]
    pub exclude_files: Option<Vec<String>>,
    #[serde(default)]
    pub exclude_dirs: Vec<String>,
    #[serde(default)]
    pub remove_sources: Option<bool>,
    #[serde(default)]
    pub require_fresh_binary: Option<bool>,
    #[serde(default)]
    pub python: Option<String>,
    #[serde(default)]
    pub cc: Option<String>,
}

impl ConfigFile {
    pub fn parse(toml_text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str::<ConfigFile>(toml_text)?)
    }
}

impl PackConfig {
    /// Defaults for `root`; the root is canonicalized so exclusion checks compare absolute paths.
    pub fn new(root: &Path) -> anyhow::Result<Self> {
        let root = fs::canonicalize(root)
            .with_context(|| format!("resolve project root {}", root.display()))?;
        if !root.is_dir() {
            bail!("project root {} is not a directory", root.display());
        }
        let mut excluded_files = BTreeSet::new();
        excluded_files.insert(root.join(DEFAULT_ENTRY_POINT));
        Ok(Self {
            root,
            excluded_files,
            excluded_dirs: BTreeSet::new(),
            scratch_dir_name: DEFAULT_SCRATCH_DIR.to_string(),
            backup_dir_name: DEFAULT_BACKUP_DIR.to_string(),
            remove_sources: true,
            require_fresh_binary: true,
            python: DEFAULT_PYTHON.to_string(),
            cc: None,
        })
    }

    /// Defaults, then `cypack.toml` (or `explicit`), then environment.
    pub fn load(root: &Path, explicit: Option<&Path>) -> anyhow::Result<Self> {
        let mut cfg = Self::new(root)?;
        let path = match explicit {
            Some(p) => Some(p.to_path_buf()),
            None => {
                let implicit = cfg.root.join(CONFIG_FILE_NAME);
                implicit.is_file().then_some(implicit)
            }
        };
        if let Some(path) = path {
            let text = fs::read_to_string(&path)
                .with_context(|| format!("read {}", path.display()))?;
            let file = ConfigFile::parse(&text)
                .with_context(|| format!("parse {}", path.display()))?;
            cfg.apply_file(&file)?;
            tracing::debug!(path = %path.display(), "loaded configuration file");
        }
        cfg.apply_env_from(|key| std::env::var(key).ok());
        Ok(cfg)
    }

    pub fn apply_file(&mut self, file: &ConfigFile) -> anyhow::Result<()> {
        let pack = &file.pack;
        if let Some(name) = &pack.scratch_dir {
            self.scratch_dir_name = validate_dir_name("scratch_dir", name)?;
        }
        if let Some(name) = &pack.backup_dir {
            self.backup_dir_name = validate_dir_name("backup_dir", name)?;
        }
        if let Some(files) = &pack.exclude_files {
            self.excluded_files = files
                .iter()
                .map(|f| resolve_in_root(&self.root, f))
                .collect();
        }
        for dir in &pack.exclude_dirs {
            self.excluded_dirs.insert(resolve_in_root(&self.root, dir));
        }
        if let Some(v) = pack.remove_sources {
            self.remove_sources = v;
        }
        if let Some(v) = pack.require_fresh_binary {
            self.require_fresh_binary = v;
        }
        if let Some(python) = &pack.python {
            self.python = python.clone();
        }
        if let Some(cc) = &pack.cc {
            self.cc = Some(cc.clone());
        }
        Ok(())
    }

    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(python) = non_empty(ENV_PYTHON) {
            self.python = python;
        }
        if let Some(cc) = non_empty(ENV_CC).or_else(|| non_empty("CC")) {
            self.cc = Some(cc);
        }
    }

    pub fn scratch_dir(&self) -> PathBuf {
        self.root.join(&self.scratch_dir_name)
    }

    pub fn scratch_temp_dir(&self) -> PathBuf {
        self.scratch_dir().join("temp")
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.root.join(&self.backup_dir_name)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.backup_dir().join(LOCK_FILE_NAME)
    }

    /// User exclusions plus the scratch and backup directories.
    pub fn excluded_dir_set(&self) -> BTreeSet<PathBuf> {
        let mut dirs = self.excluded_dirs.clone();
        dirs.insert(self.scratch_dir());
        dirs.insert(self.backup_dir());
        dirs
    }
}

fn validate_dir_name(key: &str, name: &str) -> anyhow::Result<String> {
    let trimmed = name.trim();
    let mut parts = Path::new(trimmed).components();
    match (parts.next(), parts.next()) {
        (Some(Component::Normal(_)), None) => Ok(trimmed.to_string()),
        _ => bail!("{key} must be a single directory name, got {name:?}"),
    }
}

/// Joins `entry` onto `root` lexically, dropping `.` and folding `..`.
pub fn resolve_in_root(root: &Path, entry: &str) -> PathBuf {
    let entry = Path::new(entry);
    let mut out = if entry.is_absolute() {
        PathBuf::new()
    } else {
        root.to_path_buf()
    };
    for c in entry.components() {
        match c {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
