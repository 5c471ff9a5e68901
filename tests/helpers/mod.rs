//! Test utility functions for stagebuild

#![allow(dead_code)]

use async_trait::async_trait;
use stagebuild::core::{Arch, BuildError, BuildLayout, ExecutionContext, Extractors, PipelineConfig};
use stagebuild::execution::{
    BuildSteps, CommandRunner, Invocation, Orchestrator, RetryPolicy, RunReport,
};
use stagebuild::reporting::ReportingSink;
use stagebuild::tools::{ProfileFetcher, SourceTools, ToolError};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Source tools that record each call and fail on demand
#[derive(Default)]
pub struct MockTools {
    calls: Mutex<Vec<String>>,
    retrieve_failures: AtomicUsize,
    integrity_mismatch: Mutex<Option<String>>,
    unremovable: Mutex<Vec<String>>,
    package_error: Mutex<Option<ToolError>>,
}

impl MockTools {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` retrieve calls with a network error
    pub fn failing_retrieve(self, n: usize) -> Self {
        self.retrieve_failures.store(n, Ordering::SeqCst);
        self
    }

    pub fn with_integrity_mismatch(self, file: &str) -> Self {
        *self.integrity_mismatch.lock().unwrap() = Some(file.to_string());
        self
    }

    pub fn with_unremovable(self, files: &[&str]) -> Self {
        *self.unremovable.lock().unwrap() = files.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn failing_package(self, error: ToolError) -> Self {
        *self.package_error.lock().unwrap() = Some(error);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, name: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == name).count()
    }

    fn record(&self, call: &str) {
        self.calls.lock().unwrap().push(call.to_string());
    }
}

#[async_trait]
impl SourceTools for MockTools {
    async fn retrieve(&self, _: &[PathBuf], _: &Path, _: bool) -> Result<(), ToolError> {
        self.record("retrieve");
        let remaining = self.retrieve_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.retrieve_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(ToolError::Network("connection reset by peer".to_string()));
        }
        Ok(())
    }

    async fn verify(&self, _: &[PathBuf], _: &Path) -> Result<(), ToolError> {
        self.record("verify");
        match self.integrity_mismatch.lock().unwrap().clone() {
            Some(file) => Err(ToolError::IntegrityMismatch(file)),
            None => Ok(()),
        }
    }

    async fn unpack(&self, _: &[PathBuf], _: &Path, _: &Path, _: &Extractors) -> Result<(), ToolError> {
        self.record("unpack");
        Ok(())
    }

    async fn prune(&self, _: &Path, _: &Path) -> Result<Vec<String>, ToolError> {
        self.record("prune");
        Ok(self.unremovable.lock().unwrap().clone())
    }

    async fn apply_patches(&self, series_dir: &Path, _: &Path, _: &Path) -> Result<(), ToolError> {
        self.record(&format!("patch:{}", series_dir.display()));
        Ok(())
    }

    async fn substitute_domains(&self, _: &Path, _: &Path, _: &Path) -> Result<(), ToolError> {
        self.record("substitute_domains");
        Ok(())
    }

    async fn package(&self, _: &Path, arch: Arch) -> Result<(), ToolError> {
        self.record(&format!("package:{}", arch.package_arch()));
        match self.package_error.lock().unwrap().take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

/// Command runner that records invocations and replays scripted results
#[derive(Default)]
pub struct RecordingRunner {
    invocations: Mutex<Vec<Invocation>>,
    results: Mutex<VecDeque<Result<(), BuildError>>>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the result of the next invocation; unqueued invocations succeed
    pub fn then(self, result: Result<(), BuildError>) -> Self {
        self.results.lock().unwrap().push_back(result);
        self
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations.lock().unwrap().clone()
    }

    pub fn programs(&self) -> Vec<String> {
        self.invocations().iter().map(|i| i.program()).collect()
    }
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn run(&self, invocation: &Invocation) -> Result<(), BuildError> {
        self.invocations.lock().unwrap().push(invocation.clone());
        self.results.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }
}

/// Profile fetcher serving fixed bytes after any queued failures
#[derive(Default)]
pub struct MockProfiles {
    fetches: AtomicUsize,
    failures: Mutex<VecDeque<ToolError>>,
}

impl MockProfiles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next fetch with `error`
    pub fn then_fail(self, error: ToolError) -> Self {
        self.failures.lock().unwrap().push_back(error);
        self
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProfileFetcher for MockProfiles {
    async fn fetch(&self, _name: &str) -> Result<Vec<u8>, ToolError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        match self.failures.lock().unwrap().pop_front() {
            Some(error) => Err(error),
            None => Ok(b"profdata".to_vec()),
        }
    }
}

/// Sink that records every notification as `kind:message`
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.with_prefix("error:")
    }

    pub fn warnings(&self) -> Vec<String> {
        self.with_prefix("warning:")
    }

    fn with_prefix(&self, prefix: &str) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| e.strip_prefix(prefix).map(str::to_string))
            .collect()
    }

    fn push(&self, kind: &str, message: &str) {
        self.events.lock().unwrap().push(format!("{}:{}", kind, message));
    }
}

impl ReportingSink for RecordingSink {
    fn start_group(&self, name: &str) {
        self.push("group", name);
    }

    fn end_group(&self, name: &str) {
        self.push("endgroup", name);
    }

    fn notice(&self, message: &str) {
        self.push("notice", message);
    }

    fn warning(&self, message: &str) {
        self.push("warning", message);
    }

    fn error(&self, message: &str) {
        self.push("error", message);
    }
}

/// A checkout in a temporary directory with flag files in place
pub struct Checkout {
    pub dir: TempDir,
    pub layout: BuildLayout,
}

impl Checkout {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let layout = BuildLayout::default().resolve(dir.path());

        std::fs::create_dir_all(layout.base_flags.parent().unwrap()).unwrap();
        std::fs::write(&layout.base_flags, "is_official_build=true\nenable_nacl=false").unwrap();
        std::fs::write(&layout.platform_flags, "target_cpu=\"x64\"\nv8_target_cpu=\"x64\"").unwrap();

        Self { dir, layout }
    }

    pub fn config(&self) -> PipelineConfig {
        PipelineConfig::new(self.layout.clone())
    }

    pub fn context(&self) -> ExecutionContext {
        ExecutionContext::new(self.dir.path(), &self.layout.source_tree, Default::default())
    }

    /// Create a completion marker file
    pub fn touch(&self, path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, "").unwrap();
    }

    /// Write the profile name file the PGO step reads
    pub fn pgo_name(&self, target: &str, name: &str) {
        let path = self
            .layout
            .source_tree
            .join("chrome/build")
            .join(format!("{}.pgo.txt", target));
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, name).unwrap();
    }
}

/// Collaborators a scenario inspects after the run
pub struct Harness {
    pub tools: Arc<MockTools>,
    pub runner: Arc<RecordingRunner>,
    pub profiles: Arc<MockProfiles>,
    pub sink: Arc<RecordingSink>,
}

impl Harness {
    pub fn new(tools: MockTools, runner: RecordingRunner) -> Self {
        Self {
            tools: Arc::new(tools),
            runner: Arc::new(runner),
            profiles: Arc::new(MockProfiles::default()),
            sink: Arc::new(RecordingSink::default()),
        }
    }

    pub fn with_profiles(mut self, profiles: MockProfiles) -> Self {
        self.profiles = Arc::new(profiles);
        self
    }

    pub fn orchestrator(&self, config: PipelineConfig) -> Orchestrator<BuildSteps> {
        let steps = BuildSteps::new(
            config.clone(),
            self.runner.clone(),
            self.tools.clone(),
            self.profiles.clone(),
            self.sink.clone(),
        )
        .with_retry_policy(RetryPolicy {
            max_attempts: 5,
            backoff: Duration::ZERO,
        });
        Orchestrator::new(config, steps, self.sink.clone())
    }

    pub async fn run(&self, checkout: &Checkout, config: PipelineConfig) -> RunReport {
        let mut ctx = checkout.context();
        self.orchestrator(config).run_with_context(&mut ctx).await
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new(MockTools::new(), RecordingRunner::new())
    }
}
