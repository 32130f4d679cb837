// Purpose: Run the packaging pipeline: backup, compile, sweep, scratch removal, rename, source removal.
// Inputs/Outputs: Owns a PackConfig and a Toolchain; returns a PackReport describing every stage.
// Invariants: Stages advance linearly; a compile failure degrades the run but never halts it.
//             Backup opens every pass, so the same Packer may back up or run again.
// Gotchas: The start timestamp is captured at construction and gates both sweep and source removal.

use owo_colors::OwoColorize;
use std::path::PathBuf;
use std::time::SystemTime;

use crate::backup::backup_tree;
use crate::cleanup::{remove_scratch, remove_sources_if_compiled};
use crate::config::PackConfig;
use crate::filter::PathFilter;
use crate::lock::PackLock;
use crate::normalize::normalize_tree;
use crate::toolchain::{CompileError, CompiledSet, Toolchain};
use crate::walker::{collect_sources, sweep_generated};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Created,
    BackedUp,
    Compiled,
    Swept,
    Normalized,
    SourcesRemoved,
    Done,
}

#[derive(Debug)]
pub enum CompileOutcome {
    Built(CompiledSet),
    /// The toolchain could not run at all; later stages still ran.
    Degraded(CompileError),
}

#[derive(Debug)]
pub struct PackReport {
    pub backed_up: usize,
    pub modules: Vec<PathBuf>,
    pub compile: CompileOutcome,
    pub swept: Vec<PathBuf>,
    pub scratch_removed: bool,
    pub normalized: Vec<PathBuf>,
    pub sources_removed: Vec<PathBuf>,
}

impl PackReport {
    pub fn compile_failed(&self) -> bool {
        match &self.compile {
            CompileOutcome::Built(set) => !set.is_complete(),
            CompileOutcome::Degraded(_) => true,
        }
    }
}

pub struct Packer<T> {
    config: PackConfig,
    filter: PathFilter,
    toolchain: T,
    started_at: SystemTime,
    stage: Stage,
}

impl<T: Toolchain> Packer<T> {
    pub fn new(config: PackConfig, toolchain: T) -> Self {
        let filter = PathFilter::from_config(&config);
        Self {
            config,
            filter,
            toolchain,
            started_at: SystemTime::now(),
            stage: Stage::Created,
        }
    }

    pub fn with_start_time(mut self, started_at: SystemTime) -> Self {
        self.started_at = started_at;
        self
    }

    pub fn config(&self) -> &PackConfig {
        &self.config
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn started_at(&self) -> SystemTime {
        self.started_at
    }

    /// Root-relative paths of the modules one run would compile.
    pub fn modules(&self) -> anyhow::Result<Vec<PathBuf>> {
        collect_sources(&self.config.root, &self.filter)
    }

    pub fn backup(&mut self) -> anyhow::Result<usize> {
        let copied = backup_tree(&self.config.root, &self.config.backup_dir())?;
        tracing::info!(
            files = copied,
            dir = %self.config.backup_dir().display(),
            "backed up sources"
        );
        self.stage = Stage::Created;
        self.advance(Stage::BackedUp);
        Ok(copied)
    }

    pub fn normalize(&self) -> anyhow::Result<Vec<PathBuf>> {
        normalize_tree(&self.config.root, &self.filter)
    }

    pub fn run(&mut self) -> anyhow::Result<PackReport> {
        let lock = PackLock::acquire(&self.config.lock_path())?;
        tracing::debug!(lock = %lock.path().display(), "acquired run lock");

        let backed_up = self.backup()?;

        let modules = self.modules()?;
        tracing::info!(count = modules.len(), toolchain = self.toolchain.name(), "compiling");
        let compile = self.compile(&modules);
        self.advance(Stage::Compiled);

        let swept = sweep_generated(&self.config.root, &self.filter, self.started_at)?;
        tracing::info!(files = swept.len(), "swept generated files");
        self.advance(Stage::Swept);

        let scratch = self.config.scratch_dir();
        let scratch_removed = remove_scratch(&scratch)?;
        tracing::info!(dir = %scratch.display(), removed = scratch_removed, "scratch directory");

        let normalized = self.normalize()?;
        tracing::info!(files = normalized.len(), "normalized binary names");
        self.advance(Stage::Normalized);

        let mut sources_removed = Vec::new();
        if self.config.remove_sources {
            let fresh_since = self.config.require_fresh_binary.then_some(self.started_at);
            sources_removed =
                remove_sources_if_compiled(&self.config.root, &self.filter, fresh_since)?;
            tracing::info!(files = sources_removed.len(), "removed compiled sources");
            self.advance(Stage::SourcesRemoved);
        }

        self.advance(Stage::Done);
        drop(lock);
        Ok(PackReport {
            backed_up,
            modules,
            compile,
            swept,
            scratch_removed,
            normalized,
            sources_removed,
        })
    }

    fn compile(&self, modules: &[PathBuf]) -> CompileOutcome {
        if modules.is_empty() {
            tracing::info!("no eligible modules");
            return CompileOutcome::Built(CompiledSet::default());
        }
        match self
            .toolchain
            .compile(&self.config.root, modules, &self.config.scratch_temp_dir())
        {
            Ok(set) => {
                for failure in &set.failed {
                    eprintln!(
                        "{} {}: {}",
                        "error:".red().bold(),
                        failure.module.display(),
                        failure.error
                    );
                }
                if !set.is_complete() {
                    tracing::warn!(
                        built = set.built.len(),
                        failed = set.failed.len(),
                        "continuing with partially compiled module set"
                    );
                }
                CompileOutcome::Built(set)
            }
            Err(err) => {
                eprintln!("{} {}", "error:".red().bold(), err.red());
                tracing::warn!(error = %err, "toolchain failed; continuing with cleanup stages");
                CompileOutcome::Degraded(err)
            }
        }
    }

    fn advance(&mut self, next: Stage) {
        debug_assert!(next > self.stage, "stage {:?} after {:?}", next, self.stage);
        tracing::debug!(from = ?self.stage, to = ?next, "stage");
        self.stage = next;
    }
}
