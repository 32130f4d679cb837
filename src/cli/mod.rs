use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::config::PackConfig;
use crate::logging::{self, Verbosity};
use crate::packer::{CompileOutcome, PackReport, Packer};
use crate::toolchain::{CythonToolchain, module_name};

pub const EXIT_OK: i32 = 0;
pub const EXIT_FATAL: i32 = 1;
/// Only returned with `build --strict`.
pub const EXIT_COMPILE_FAILED: i32 = 2;

/// Back up, compile and package a Python source tree as native extension modules
#[derive(Parser, Debug)]
#[command(name = "cypack", version = env!("CYPACK_BUILD_VERSION"), about, long_about = None)]
pub struct Cli {
    /// Project root (defaults to the current directory)
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// Configuration file (defaults to <root>/cypack.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run the whole pipeline (default)
    Build {
        /// Keep sources even when a compiled module exists
        #[arg(long)]
        keep_sources: bool,

        /// Exit with status 2 when any module failed to compile
        #[arg(long)]
        strict: bool,
    },
    /// Print the modules a build would compile
    List {
        /// Emit a JSON array instead of one path per line
        #[arg(long)]
        json: bool,
    },
    /// Only mirror sources into the backup directory
    Backup,
    /// Only rename platform-tagged binaries to their canonical names
    Normalize,
}

impl Default for Command {
    fn default() -> Self {
        Command::Build {
            keep_sources: false,
            strict: false,
        }
    }
}

#[derive(Serialize)]
struct ListedModule {
    path: String,
    module: String,
}

pub fn run_cli<I>(args: I) -> i32
where
    I: IntoIterator<Item = String>,
{
    let argv = std::iter::once("cypack".to_string()).chain(args);
    let cli = match Cli::try_parse_from(argv) {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return if err.use_stderr() { EXIT_FATAL } else { EXIT_OK };
        }
    };
    logging::init(Verbosity::from_flags(cli.verbose, cli.quiet));
    match execute(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err}");
            for cause in err.chain().skip(1) {
                eprintln!("  caused by: {cause}");
            }
            EXIT_FATAL
        }
    }
}

fn execute(cli: Cli) -> anyhow::Result<i32> {
    let root = match &cli.root {
        Some(root) => root.clone(),
        None => std::env::current_dir().context("determine current directory")?,
    };
    let mut cfg = PackConfig::load(&root, cli.config.as_deref())?;
    let command = cli.command.unwrap_or_default();
    if let Command::Build { keep_sources: true, .. } = command {
        cfg.remove_sources = false;
    }
    let toolchain = CythonToolchain::from_config(&cfg);
    let mut packer = Packer::new(cfg, toolchain);

    match command {
        Command::Build { strict, .. } => {
            let report = packer.run()?;
            print_summary(&report);
            println!("Done.");
            if strict && report.compile_failed() {
                return Ok(EXIT_COMPILE_FAILED);
            }
        }
        Command::List { json } => {
            let modules = packer.modules()?;
            print_modules(&modules, json)?;
        }
        Command::Backup => {
            let copied = packer.backup()?;
            println!("backed up {copied} files to {}", packer.config().backup_dir().display());
        }
        Command::Normalize => {
            for path in packer.normalize()? {
                println!("{}", display_rel(&packer.config().root, &path));
            }
        }
    }
    Ok(EXIT_OK)
}

fn print_modules(modules: &[PathBuf], json: bool) -> anyhow::Result<()> {
    if json {
        let listed = modules
            .iter()
            .map(|p| ListedModule {
                path: p.to_string_lossy().replace('\\', "/"),
                module: module_name(p),
            })
            .collect::<Vec<_>>();
        println!("{}", serde_json::to_string_pretty(&listed)?);
    } else {
        for p in modules {
            println!("{}", p.display());
        }
    }
    Ok(())
}

fn print_summary(report: &PackReport) {
    let built = match &report.compile {
        CompileOutcome::Built(set) => set.built.len(),
        CompileOutcome::Degraded(_) => 0,
    };
    eprintln!(
        "backed up {}, compiled {}/{}, swept {}, renamed {}, removed {} sources",
        report.backed_up,
        built,
        report.modules.len(),
        report.swept.len(),
        report.normalized.len(),
        report.sources_removed.len()
    );
}

fn display_rel(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .display()
        .to_string()
}
