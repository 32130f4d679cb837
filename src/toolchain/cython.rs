use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use super::{
    COMPILER_DIRECTIVES, CompileError, CompiledSet, LANGUAGE_LEVEL, ModuleFailure, Toolchain,
    module_name,
};
use crate::config::PackConfig;
use crate::filter::GENERATED_EXTENSION;

const PROBE_SCRIPT: &str = "import sysconfig\n\
print(sysconfig.get_config_var('EXT_SUFFIX') or '')\n\
print(sysconfig.get_paths()['include'])\n";

/// Interpreter facts needed to build an extension module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PythonProbe {
    pub ext_suffix: String,
    pub include_dir: PathBuf,
}

impl PythonProbe {
    pub fn parse(stdout: &str) -> Result<Self, CompileError> {
        let mut lines = stdout.lines().map(str::trim);
        let ext_suffix = lines.next().unwrap_or_default().to_string();
        let include_dir = lines.next().unwrap_or_default();
        if ext_suffix.is_empty() {
            return Err(CompileError::Probe("interpreter reports no EXT_SUFFIX".into()));
        }
        if include_dir.is_empty() {
            return Err(CompileError::Probe("interpreter reports no include dir".into()));
        }
        Ok(Self {
            ext_suffix,
            include_dir: PathBuf::from(include_dir),
        })
    }
}

/// Translates with Cython, then compiles and links with the system C compiler.
#[derive(Debug, Clone)]
pub struct CythonToolchain {
    python: String,
    /// Resolved on first compile when unset.
    cc: Option<String>,
}

impl CythonToolchain {
    pub fn new(python: impl Into<String>, cc: Option<String>) -> Self {
        Self {
            python: python.into(),
            cc,
        }
    }

    pub fn from_config(cfg: &PackConfig) -> Self {
        Self::new(cfg.python.clone(), cfg.cc.clone())
    }

    pub fn probe(&self) -> Result<PythonProbe, CompileError> {
        let stdout = run_tool(&self.python, &["-c".into(), PROBE_SCRIPT.into()])?;
        PythonProbe::parse(&stdout)
    }

    fn translate(&self, src: &Path, c_path: &Path) -> Result<(), CompileError> {
        let mut args: Vec<OsString> = vec![
            "-m".into(),
            "cython".into(),
            format!("-{}", LANGUAGE_LEVEL).into(),
        ];
        for (key, value) in COMPILER_DIRECTIVES {
            args.push("-X".into());
            args.push(format!("{key}={value}").into());
        }
        args.push(src.into());
        args.push("-o".into());
        args.push(c_path.into());
        run_tool(&self.python, &args).map(|_| ())
    }

    fn compile_object(
        &self,
        cc: &str,
        probe: &PythonProbe,
        c_path: &Path,
        obj: &Path,
    ) -> Result<(), CompileError> {
        let mut include = OsString::from("-I");
        include.push(&probe.include_dir);
        let args: Vec<OsString> = vec![
            "-fPIC".into(),
            "-O2".into(),
            include,
            "-c".into(),
            c_path.into(),
            "-o".into(),
            obj.into(),
        ];
        run_tool(cc, &args).map(|_| ())
    }

    fn link(&self, cc: &str, obj: &Path, out: &Path) -> Result<(), CompileError> {
        let mut args: Vec<OsString> = vec!["-shared".into()];
        if cfg!(target_os = "macos") {
            args.push("-undefined".into());
            args.push("dynamic_lookup".into());
        }
        if is_gcc(cc) {
            args.push("-pthread".into());
        }
        args.push(obj.into());
        args.push("-o".into());
        args.push(out.into());
        run_tool(cc, &args).map(|_| ())
    }

    fn compile_module(
        &self,
        cc: &str,
        probe: &PythonProbe,
        root: &Path,
        rel: &Path,
        temp_dir: &Path,
    ) -> Result<PathBuf, CompileError> {
        let src = root.join(rel);
        let c_path = src.with_extension(GENERATED_EXTENSION);
        let obj = temp_dir.join(rel).with_extension("o");
        if let Some(parent) = obj.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| CompileError::io(format!("mkdir {}", parent.display()), e))?;
        }
        let stem = src
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let out = src.with_file_name(format!("{stem}{}", probe.ext_suffix));

        self.translate(&src, &c_path)?;
        self.compile_object(cc, probe, &c_path, &obj)?;
        self.link(cc, &obj, &out)?;
        Ok(out)
    }
}

impl Toolchain for CythonToolchain {
    fn name(&self) -> &str {
        "cython"
    }

    fn compile(
        &self,
        root: &Path,
        modules: &[PathBuf],
        temp_dir: &Path,
    ) -> Result<CompiledSet, CompileError> {
        let probe = self.probe()?;
        let cc = self.cc.clone().unwrap_or_else(resolve_cc);
        tracing::debug!(
            ext_suffix = %probe.ext_suffix,
            include = %probe.include_dir.display(),
            cc = %cc,
            "probed interpreter"
        );
        let mut set = CompiledSet::default();
        for rel in modules {
            match self.compile_module(&cc, &probe, root, rel, temp_dir) {
                Ok(out) => {
                    tracing::info!(module = %module_name(rel), "compiled");
                    set.built.push(out);
                }
                Err(error) => {
                    tracing::warn!(module = %module_name(rel), %error, "module failed to compile");
                    set.failed.push(ModuleFailure {
                        module: rel.clone(),
                        error,
                    });
                }
            }
        }
        Ok(set)
    }
}

fn run_tool(cmd: &str, args: &[OsString]) -> Result<String, CompileError> {
    tracing::debug!(
        "run {} {}",
        cmd,
        args.iter()
            .map(|a| a.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ")
    );
    let out = Command::new(cmd)
        .args(args)
        .output()
        .map_err(|source| CompileError::Spawn {
            tool: cmd.to_string(),
            source,
        })?;
    if !out.status.success() {
        return Err(CompileError::ToolFailed {
            tool: cmd.to_string(),
            status: out.status,
            stderr: String::from_utf8_lossy(&out.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&out.stdout).into_owned())
}

fn resolve_cc() -> String {
    if command_exists("gcc") {
        return "gcc".to_string();
    }
    "clang".to_string()
}

fn is_gcc(cc: &str) -> bool {
    cc.to_ascii_lowercase().contains("gcc")
}

fn command_exists(cmd: &str) -> bool {
    Command::new(cmd).arg("--version").output().is_ok()
}
