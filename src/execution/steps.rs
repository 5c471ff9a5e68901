//! Step bodies - what each pipeline step does

use crate::core::{Arch, BuildError, ExecutionContext, PipelineConfig, Step};
use crate::execution::retry::{RetryError, RetryExecutor, RetryPolicy};
use crate::execution::runner::{CommandRunner, Invocation};
use crate::reporting::ReportingSink;
use crate::tools::{ProfileFetcher, SourceTools, ToolError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, error, info};

/// Executes the body of a single step
#[async_trait]
pub trait StepBody: Send + Sync {
    async fn run(&self, step: Step, ctx: &mut ExecutionContext) -> Result<(), BuildError>;
}

#[async_trait]
impl<T: StepBody + ?Sized> StepBody for Arc<T> {
    async fn run(&self, step: Step, ctx: &mut ExecutionContext) -> Result<(), BuildError> {
        (**self).run(step, ctx).await
    }
}

/// The build's step bodies
pub struct BuildSteps {
    config: PipelineConfig,
    runner: Arc<dyn CommandRunner>,
    tools: Arc<dyn SourceTools>,
    profiles: Arc<dyn ProfileFetcher>,
    retry: RetryExecutor,
    sink: Arc<dyn ReportingSink>,
}

impl BuildSteps {
    pub fn new(
        config: PipelineConfig,
        runner: Arc<dyn CommandRunner>,
        tools: Arc<dyn SourceTools>,
        profiles: Arc<dyn ProfileFetcher>,
        sink: Arc<dyn ReportingSink>,
    ) -> Self {
        let retry = RetryExecutor::new(RetryPolicy::default(), sink.clone());
        Self {
            config,
            runner,
            tools,
            profiles,
            retry,
            sink,
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = RetryExecutor::new(policy, self.sink.clone());
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    async fn setup_environment(&self, ctx: &ExecutionContext) -> Result<(), BuildError> {
        let layout = &self.config.layout;

        create_dir(&layout.source_tree).await?;
        create_dir(&layout.download_cache).await?;
        for var in ["TMP", "TEMP"] {
            if let Some(dir) = ctx.var(var).map(PathBuf::from) {
                create_dir(&dir).await?;
            }
        }

        info!("Downloading required files");
        self.retry
            .execute(
                "Downloading sources",
                || {
                    self.tools.retrieve(
                        &layout.download_manifests,
                        &layout.download_cache,
                        self.config.ssl_verification,
                    )
                },
                ToolError::is_transient,
            )
            .await
            .map_err(|e| from_retry("Downloading sources", e))?;

        self.tools
            .verify(&layout.download_manifests, &layout.download_cache)
            .await
            .map_err(tool_error)?;

        info!("Unpacking downloads");
        self.tools
            .unpack(
                &layout.download_manifests,
                &layout.download_cache,
                &layout.source_tree,
                &self.config.extractors,
            )
            .await
            .map_err(tool_error)?;

        info!("Pruning binaries");
        let unremovable = self
            .tools
            .prune(&layout.source_tree, &layout.pruning_list)
            .await
            .map_err(tool_error)?;
        if !unremovable.is_empty() {
            return Err(BuildError::UnremovableFiles(unremovable));
        }

        let patch_binary = layout.source_tree.join(&layout.patch_binary);
        for series in &layout.patch_series {
            info!("Applying patches from {}", series.display());
            self.tools
                .apply_patches(series, &layout.source_tree, &patch_binary)
                .await
                .map_err(tool_error)?;
        }

        if self.config.skip_domain_substitution {
            debug!("Domain substitution skipped");
        } else {
            info!("Applying domain substitution");
            self.tools
                .substitute_domains(
                    &layout.domain_regex_list,
                    &layout.domain_substitution_list,
                    &layout.source_tree,
                )
                .await
                .map_err(tool_error)?;
        }

        Ok(())
    }

    async fn download_pgo_profiles(&self) -> Result<(), BuildError> {
        let build_dir = self.config.layout.source_tree.join("chrome").join("build");
        let target = self.config.arch.pgo_target();

        let name_file = build_dir.join(format!("{}.pgo.txt", target));
        let name = tokio::fs::read_to_string(&name_file)
            .await
            .map_err(|e| BuildError::io(&name_file, e))?
            .trim()
            .to_string();
        if name.is_empty() {
            return Err(BuildError::Config(format!(
                "{} does not name a profile",
                name_file.display()
            )));
        }

        let profile = build_dir.join("pgo_profiles").join(&name);
        if profile.exists() {
            self.sink
                .notice(&format!("PGO profile {} already present, refreshing timestamp", name));
            return touch(&profile);
        }

        info!("Downloading PGO profile {}", name);
        let data = self
            .retry
            .execute(
                "Downloading PGO profile",
                || self.profiles.fetch(&name),
                ToolError::is_transient,
            )
            .await
            .map_err(|e| from_retry("Downloading PGO profile", e))?;

        if let Some(parent) = profile.parent() {
            create_dir(parent).await?;
        }
        // A partial download must never sit at the final path
        let partial = build_dir.join("pgo_profiles").join(format!("{}.part", name));
        tokio::fs::write(&partial, data)
            .await
            .map_err(|e| BuildError::io(&partial, e))?;
        tokio::fs::rename(&partial, &profile)
            .await
            .map_err(|e| BuildError::io(&profile, e))
    }

    async fn create_args_gn(&self) -> Result<(), BuildError> {
        let layout = &self.config.layout;

        let base = read_flags(&layout.base_flags).await?;
        let mut platform = read_flags(&layout.platform_flags).await?;
        if self.config.arch == Arch::X86 {
            platform = platform.replace(Arch::X64.gn_token(), Arch::X86.gn_token());
        }

        let args_gn = layout.args_gn_path();
        if let Some(parent) = args_gn.parent() {
            create_dir(parent).await?;
        }
        info!("Writing {}", args_gn.display());
        tokio::fs::write(&args_gn, format!("{}\n{}", base, platform))
            .await
            .map_err(|e| BuildError::io(&args_gn, e))
    }

    async fn bootstrap_gn(&self, ctx: &ExecutionContext) -> Result<(), BuildError> {
        let layout = &self.config.layout;
        let gn = layout.gn_binary.to_string_lossy().into_owned();
        let output_dir = layout.output_dir.to_string_lossy().into_owned();

        let bootstrap = Invocation::new(
            [
                layout.python.clone(),
                layout.gn_bootstrap_script.to_string_lossy().into_owned(),
                "-o".to_string(),
                gn.clone(),
                "--skip-generate-buildfiles".to_string(),
            ],
            ctx,
        );
        self.runner.run(&bootstrap).await?;

        let generate = Invocation::new(
            [
                gn,
                "gen".to_string(),
                output_dir,
                "--fail-on-unused-args".to_string(),
            ],
            ctx,
        );
        self.runner.run(&generate).await
    }

    async fn build(&self, ctx: &ExecutionContext) -> Result<(), BuildError> {
        let layout = &self.config.layout;

        let mut args = vec![
            layout.ninja_binary.to_string_lossy().into_owned(),
            "-C".to_string(),
            layout.output_dir.to_string_lossy().into_owned(),
        ];
        args.extend(layout.build_targets.iter().cloned());

        let deadline = self.config.ci.then(|| layout.ci_build_timeout());
        self.runner
            .run(&Invocation::new(args, ctx).with_timeout(deadline))
            .await
    }

    async fn package(&self, ctx: &ExecutionContext) -> Result<(), BuildError> {
        self.tools
            .package(ctx.root(), self.config.arch)
            .await
            .map_err(tool_error)
    }
}

#[async_trait]
impl StepBody for BuildSteps {
    async fn run(&self, step: Step, ctx: &mut ExecutionContext) -> Result<(), BuildError> {
        match step {
            Step::SetupEnvironment => self.setup_environment(ctx).await,
            Step::DownloadPgoProfiles => self.download_pgo_profiles().await,
            Step::CreateArgsGn => self.create_args_gn().await,
            Step::BootstrapGn => self.bootstrap_gn(ctx).await,
            Step::Build => self.build(ctx).await,
            Step::Package => self.package(ctx).await,
        }
    }
}

/// Log a tool's own failure output before it is folded into a `BuildError`
fn tool_error(err: ToolError) -> BuildError {
    if let ToolError::Failed { tool, message, .. } = &err {
        error!("{} output:\n{}", tool, message);
    }
    err.into()
}

fn from_retry(operation: &str, err: RetryError<ToolError>) -> BuildError {
    match err {
        RetryError::Exhausted {
            attempts,
            last_error,
        } => BuildError::RetriesExhausted {
            operation: operation.to_string(),
            attempts,
            last_error: last_error.to_string(),
        },
        RetryError::Fatal(e) => tool_error(e),
    }
}

async fn create_dir(path: &Path) -> Result<(), BuildError> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| BuildError::io(path, e))
}

async fn read_flags(path: &Path) -> Result<String, BuildError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| BuildError::io(path, e))
}

fn touch(path: &Path) -> Result<(), BuildError> {
    std::fs::File::options()
        .write(true)
        .open(path)
        .and_then(|file| file.set_modified(SystemTime::now()))
        .map_err(|e| BuildError::io(path, e))
}
