// Purpose: Define the seam between the orchestrator and the external ahead-of-time toolchain.
// Inputs/Outputs: Takes root-relative module paths plus a scratch dir; reports built and failed modules.
// Invariants: Binaries land beside their sources; objects only under the scratch dir.
// Gotchas: A toolchain-wide Err means nothing was attempted; per-module failures are data, not Err.

pub mod cython;

use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use thiserror::Error;

pub use cython::CythonToolchain;

/// Translator language level; fixed.
pub const LANGUAGE_LEVEL: u8 = 3;
/// Translator directives passed with every module; fixed.
pub const COMPILER_DIRECTIVES: &[(&str, &str)] = &[("always_allow_keywords", "True")];

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("failed to run {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{tool} exited with {status}: {stderr}")]
    ToolFailed {
        tool: String,
        status: ExitStatus,
        stderr: String,
    },
    #[error("toolchain probe failed: {0}")]
    Probe(String),
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl CompileError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

#[derive(Debug)]
pub struct ModuleFailure {
    pub module: PathBuf,
    pub error: CompileError,
}

/// What one compiler invocation produced.
#[derive(Debug, Default)]
pub struct CompiledSet {
    /// Absolute paths of the binaries written beside their sources.
    pub built: Vec<PathBuf>,
    pub failed: Vec<ModuleFailure>,
}

impl CompiledSet {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

pub trait Toolchain {
    fn name(&self) -> &str;

    /// Compiles each root-relative module in `modules` under `root`, using `temp_dir` for objects.
    fn compile(
        &self,
        root: &Path,
        modules: &[PathBuf],
        temp_dir: &Path,
    ) -> Result<CompiledSet, CompileError>;
}

/// Dotted import name of a root-relative module path, e.g. `pkg/sub/mod.py` -> `pkg.sub.mod`.
pub fn module_name(rel: &Path) -> String {
    let stem = rel.with_extension("");
    stem.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(".")
}
