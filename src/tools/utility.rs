//! [`SourceTools`] backed by the source-preparation utility scripts

use crate::core::{Arch, BuildLayout, ExtractorPath, Extractors};
use crate::tools::{SourceTools, ToolError};
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Output;
use tokio::process::Command;
use tracing::debug;

/// Runs `downloads.py`, `prune_binaries.py`, `patches.py` and
/// `domain_substitution.py` from the utilities directory, and the packaging
/// script from the root.
///
/// Contracts the scripts are held to:
/// - `downloads.py retrieve` exiting non-zero is treated as a network failure
/// - `downloads.py check` exiting non-zero is an integrity mismatch
/// - `prune_binaries.py` exiting non-zero prints one unremovable path per
///   stdout line
#[derive(Debug, Clone)]
pub struct UtilityScripts {
    python: String,
    utils_dir: PathBuf,
    package_script: PathBuf,
}

impl UtilityScripts {
    pub fn new(
        python: impl Into<String>,
        utils_dir: impl Into<PathBuf>,
        package_script: impl Into<PathBuf>,
    ) -> Self {
        Self {
            python: python.into(),
            utils_dir: utils_dir.into(),
            package_script: package_script.into(),
        }
    }

    /// Scripts named by a resolved layout
    pub fn from_layout(layout: &BuildLayout) -> Self {
        Self::new(
            layout.python.clone(),
            layout.utils_dir.clone(),
            layout.package_script.clone(),
        )
    }

    async fn run_script(
        &self,
        script: &Path,
        args: Vec<OsString>,
        cwd: Option<&Path>,
    ) -> Result<Output, ToolError> {
        let tool = script
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| script.display().to_string());
        debug!("Running {} {:?}", script.display(), args);

        let mut command = Command::new(&self.python);
        command.arg(script).args(&args).kill_on_drop(true);
        if let Some(cwd) = cwd {
            command.current_dir(cwd);
        }

        command
            .output()
            .await
            .map_err(|source| ToolError::Io { tool, source })
    }

    async fn run_utility(&self, name: &str, args: Vec<OsString>) -> Result<Output, ToolError> {
        self.run_script(&self.utils_dir.join(name), args, None).await
    }
}

fn manifest_args(manifests: &[PathBuf], cache: &Path) -> Vec<OsString> {
    let mut args = Vec::new();
    for manifest in manifests {
        args.push("-i".into());
        args.push(manifest.clone().into_os_string());
    }
    args.push("-c".into());
    args.push(cache.as_os_str().to_owned());
    args
}

fn extractor_arg(path: &ExtractorPath) -> OsString {
    match path {
        ExtractorPath::Registry => path.to_string().into(),
        ExtractorPath::Path(path) => path.clone().into_os_string(),
    }
}

/// Failure text of a finished script, stderr preferred
fn failure_message(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    if !stderr.is_empty() {
        return stderr.to_string();
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stdout = stdout.trim();
    if !stdout.is_empty() {
        return stdout.to_string();
    }
    match output.status.code() {
        Some(code) => format!("exited with code {}", code),
        None => "terminated by signal".to_string(),
    }
}

fn failed(tool: &str, output: &Output) -> ToolError {
    ToolError::Failed {
        tool: tool.to_string(),
        exit_code: output.status.code(),
        message: failure_message(output),
    }
}

#[async_trait]
impl SourceTools for UtilityScripts {
    async fn retrieve(
        &self,
        manifests: &[PathBuf],
        cache: &Path,
        ssl_verification: bool,
    ) -> Result<(), ToolError> {
        let mut args: Vec<OsString> = vec!["retrieve".into()];
        args.extend(manifest_args(manifests, cache));
        args.push("--hide-progress-bar".into());
        if !ssl_verification {
            args.push("--disable-ssl-verification".into());
        }

        let output = self.run_utility("downloads.py", args).await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(ToolError::Network(failure_message(&output)))
        }
    }

    async fn verify(&self, manifests: &[PathBuf], cache: &Path) -> Result<(), ToolError> {
        let mut args: Vec<OsString> = vec!["check".into()];
        args.extend(manifest_args(manifests, cache));

        let output = self.run_utility("downloads.py", args).await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(ToolError::IntegrityMismatch(failure_message(&output)))
        }
    }

    async fn unpack(
        &self,
        manifests: &[PathBuf],
        cache: &Path,
        tree: &Path,
        extractors: &Extractors,
    ) -> Result<(), ToolError> {
        let mut args: Vec<OsString> = vec!["unpack".into()];
        args.extend(manifest_args(manifests, cache));
        args.push("--7z-path".into());
        args.push(extractor_arg(&extractors.seven_zip));
        args.push("--winrar-path".into());
        args.push(extractor_arg(&extractors.winrar));
        args.push(tree.as_os_str().to_owned());

        let output = self.run_utility("downloads.py", args).await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(failed("downloads.py unpack", &output))
        }
    }

    async fn prune(&self, tree: &Path, pruning_list: &Path) -> Result<Vec<String>, ToolError> {
        let args = vec![tree.as_os_str().to_owned(), pruning_list.as_os_str().to_owned()];

        let output = self.run_utility("prune_binaries.py", args).await?;
        if output.status.success() {
            return Ok(Vec::new());
        }

        let unremovable: Vec<String> = String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        if unremovable.is_empty() {
            Err(failed("prune_binaries.py", &output))
        } else {
            Ok(unremovable)
        }
    }

    async fn apply_patches(
        &self,
        series_dir: &Path,
        tree: &Path,
        patch_binary: &Path,
    ) -> Result<(), ToolError> {
        let args = vec![
            "apply".into(),
            "--patch-bin".into(),
            patch_binary.as_os_str().to_owned(),
            tree.as_os_str().to_owned(),
            series_dir.as_os_str().to_owned(),
        ];

        let output = self.run_utility("patches.py", args).await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(failed("patches.py", &output))
        }
    }

    async fn substitute_domains(
        &self,
        regex_list: &Path,
        files_list: &Path,
        tree: &Path,
    ) -> Result<(), ToolError> {
        let args = vec![
            "apply".into(),
            "-r".into(),
            regex_list.as_os_str().to_owned(),
            "-f".into(),
            files_list.as_os_str().to_owned(),
            tree.as_os_str().to_owned(),
        ];

        let output = self.run_utility("domain_substitution.py", args).await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(failed("domain_substitution.py", &output))
        }
    }

    async fn package(&self, root: &Path, arch: Arch) -> Result<(), ToolError> {
        let args = vec!["--cpu-arch".into(), arch.package_arch().into()];

        let output = self
            .run_script(&self.package_script, args, Some(root))
            .await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(failed("package.py", &output))
        }
    }
}
