// Purpose: Rename platform-tagged extension binaries to their canonical `<stem>.<ext>` form.
// Inputs/Outputs: Walks a tree under a PathFilter and renames matching files in place.
// Invariants: An existing canonical file is replaced, never duplicated.
// Gotchas: The stem may itself contain dots; only the trailing tag segment is dropped.
//          Hidden and excluded directories are pruned, so binaries under `.venv/` keep their tags.

use anyhow::Context;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use walkdir::WalkDir;

use crate::filter::PathFilter;

static TAGGED_BINARY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<stem>.+)\.(?P<tag>(?:cpython|cp\d|pypy|graalpy|abi)[0-9A-Za-z_\-]*)\.(?P<ext>so|pyd)$",
    )
    .expect("tagged binary pattern")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedBinary {
    pub stem: String,
    pub tag: String,
    pub ext: String,
}

impl TaggedBinary {
    pub fn parse(file_name: &str) -> Option<Self> {
        let caps = TAGGED_BINARY.captures(file_name)?;
        Some(Self {
            stem: caps["stem"].to_string(),
            tag: caps["tag"].to_string(),
            ext: caps["ext"].to_string(),
        })
    }

    pub fn canonical_name(&self) -> String {
        format!("{}.{}", self.stem, self.ext)
    }
}

/// Renames every tagged binary below `dir`; returns the canonical paths written.
pub fn normalize_tree(dir: &Path, filter: &PathFilter) -> anyhow::Result<Vec<PathBuf>> {
    let mut renamed = Vec::new();
    let walk = WalkDir::new(dir)
        .min_depth(1)
        .into_iter()
        .filter_entry(|e| {
            e.depth() == 0 || !e.file_type().is_dir() || filter.descend(e.path())
        });
    for entry in walk {
        let entry = entry.with_context(|| format!("walk {}", dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(tagged) = entry.file_name().to_str().and_then(TaggedBinary::parse) else {
            continue;
        };
        let from = entry.path();
        let to = from.with_file_name(tagged.canonical_name());
        if to.is_file() {
            fs::remove_file(&to).with_context(|| format!("remove {}", to.display()))?;
        }
        fs::rename(from, &to)
            .with_context(|| format!("rename {} -> {}", from.display(), to.display()))?;
        tracing::debug!(from = %from.display(), to = %to.display(), tag = %tagged.tag, "normalized");
        renamed.push(to);
    }
    Ok(renamed)
}
