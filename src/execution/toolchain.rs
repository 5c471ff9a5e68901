//! Toolchain discovery and environment-qualification scripts
//!
//! Activating the compiler toolchain only affects the shell session that
//! sources its setup script, so every build command is fed to a fresh shell
//! together with the activation call.

use crate::core::BuildError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::debug;

/// Variable that stops depot_tools from looking for its own toolchain
pub const DISABLE_AUTO_TOOLCHAIN: (&str, &str) = ("DEPOT_TOOLS_WIN_TOOLCHAIN", "0");

/// Shell the environment script is written for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellDialect {
    /// `cmd.exe`, sourcing a `vcvars*.bat`
    Cmd,
    /// POSIX `sh`, sourcing a shell script
    Posix,
}

impl ShellDialect {
    /// Shell program and the arguments that make it read commands from stdin
    pub fn shell(self) -> (&'static str, &'static [&'static str]) {
        match self {
            ShellDialect::Cmd => ("cmd.exe", &["/k"]),
            ShellDialect::Posix => ("sh", &["-s"]),
        }
    }

    /// Script fed to the shell's stdin
    ///
    /// Lines, in order: activate the toolchain with its output suppressed,
    /// disable downstream toolchain auto-detection, the quoted command, and
    /// an explicit `exit` so the shell ends with the command's status.
    pub fn script(self, setup_script: &Path, args: &[String]) -> String {
        let (var, value) = DISABLE_AUTO_TOOLCHAIN;
        let command = args
            .iter()
            .map(|arg| self.quote(arg))
            .collect::<Vec<_>>()
            .join(" ");
        let lines = match self {
            ShellDialect::Cmd => [
                format!("call {} >nul", self.quote(&setup_script.to_string_lossy())),
                format!("set {}={}", var, value),
                command,
                "exit".to_string(),
            ],
            ShellDialect::Posix => [
                format!(". {} >/dev/null", self.quote(&setup_script.to_string_lossy())),
                format!("export {}={}", var, value),
                command,
                "exit".to_string(),
            ],
        };
        let mut script = lines.join("\n");
        script.push('\n');
        script
    }

    fn quote(self, arg: &str) -> String {
        match self {
            ShellDialect::Cmd => format!("\"{}\"", arg),
            ShellDialect::Posix => format!("'{}'", arg.replace('\'', r"'\''")),
        }
    }
}

/// A located toolchain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    /// Environment setup script
    pub setup_script: PathBuf,
    pub dialect: ShellDialect,
}

impl Toolchain {
    /// Script that runs `args` in this toolchain's environment
    pub fn script_for(&self, args: &[String]) -> String {
        self.dialect.script(&self.setup_script, args)
    }
}

/// Finds the toolchain for each build-process invocation
#[async_trait]
pub trait ToolchainLocator: Send + Sync {
    async fn locate(&self) -> Result<Toolchain, BuildError>;
}

/// 64-bit host tools; the target CPU comes from args.gn
const VCVARS_SCRIPT: &str = "vcvars64.bat";

/// Locates the latest Visual Studio installation through `vswhere`
#[derive(Debug, Clone)]
pub struct VsWhereLocator {
    vswhere: PathBuf,
}

impl VsWhereLocator {
    pub fn new(vswhere: impl Into<PathBuf>) -> Self {
        Self {
            vswhere: vswhere.into(),
        }
    }

    /// `vswhere.exe` at its fixed location under `ProgramFiles(x86)`
    pub fn with_default_path() -> Self {
        let program_files = std::env::var("ProgramFiles(x86)")
            .unwrap_or_else(|_| r"C:\Program Files (x86)".to_string());
        Self::new(
            PathBuf::from(program_files)
                .join("Microsoft Visual Studio")
                .join("Installer")
                .join("vswhere.exe"),
        )
    }
}

#[async_trait]
impl ToolchainLocator for VsWhereLocator {
    async fn locate(&self) -> Result<Toolchain, BuildError> {
        let output = Command::new(&self.vswhere)
            .args(["-prerelease", "-latest", "-property", "installationPath"])
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                BuildError::ToolchainDiscovery(format!(
                    "could not run {}: {}",
                    self.vswhere.display(),
                    e
                ))
            })?;

        if !output.status.success() {
            return Err(BuildError::ToolchainDiscovery(format!(
                "{} exited with {}",
                self.vswhere.display(),
                output.status
            )));
        }

        let install_path = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if install_path.is_empty() {
            return Err(BuildError::ToolchainDiscovery(
                "no Visual Studio installation found".to_string(),
            ));
        }

        let setup_script = PathBuf::from(install_path)
            .join("VC")
            .join("Auxiliary")
            .join("Build")
            .join(VCVARS_SCRIPT);
        if !setup_script.exists() {
            return Err(BuildError::ToolchainDiscovery(format!(
                "could not find vcvars batch script in expected location: {}",
                setup_script.display()
            )));
        }

        debug!("Located toolchain setup script {}", setup_script.display());
        Ok(Toolchain {
            setup_script,
            dialect: ShellDialect::Cmd,
        })
    }
}

/// Uses an explicitly configured setup script
#[derive(Debug, Clone)]
pub struct ScriptLocator {
    toolchain: Toolchain,
}

impl ScriptLocator {
    /// Dialect is picked from the extension: `.bat`/`.cmd` for `cmd.exe`, else `sh`
    pub fn new(setup_script: impl Into<PathBuf>) -> Self {
        let setup_script = setup_script.into();
        let dialect = match setup_script.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("bat") || ext.eq_ignore_ascii_case("cmd") => {
                ShellDialect::Cmd
            }
            _ => ShellDialect::Posix,
        };
        Self {
            toolchain: Toolchain {
                setup_script,
                dialect,
            },
        }
    }
}

#[async_trait]
impl ToolchainLocator for ScriptLocator {
    async fn locate(&self) -> Result<Toolchain, BuildError> {
        if !self.toolchain.setup_script.is_file() {
            return Err(BuildError::ToolchainDiscovery(format!(
                "setup script not found: {}",
                self.toolchain.setup_script.display()
            )));
        }
        Ok(self.toolchain.clone())
    }
}
