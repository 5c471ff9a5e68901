//! Execution context - working directory and environment threaded through steps

use crate::core::Step;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Where relative paths of the current step resolve
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkingDir {
    /// The orchestrator's launch directory
    Root,
    /// The extracted source tree
    SourceTree,
}

/// Execution context for a pipeline run
///
/// Holds the working directory and environment the steps would otherwise
/// mutate process-wide. Steps run strictly one after another, so the context
/// is only changed between step bodies.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    root: PathBuf,
    source_tree: PathBuf,
    working_dir: WorkingDir,

    /// Environment captured at startup
    inherited_env: HashMap<String, String>,

    /// Variables set during the run, applied to every child process
    env_overrides: BTreeMap<String, String>,
}

impl ExecutionContext {
    /// Create a context rooted at `root`, with an explicit inherited environment
    pub fn new(
        root: impl Into<PathBuf>,
        source_tree: impl Into<PathBuf>,
        inherited_env: HashMap<String, String>,
    ) -> Self {
        Self {
            root: root.into(),
            source_tree: source_tree.into(),
            working_dir: WorkingDir::Root,
            inherited_env,
            env_overrides: BTreeMap::new(),
        }
    }

    /// Create a context that inherits the current process environment
    pub fn from_process(root: impl Into<PathBuf>, source_tree: impl Into<PathBuf>) -> Self {
        Self::new(root, source_tree, std::env::vars().collect())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn source_tree(&self) -> &Path {
        &self.source_tree
    }

    pub fn working_dir(&self) -> WorkingDir {
        self.working_dir
    }

    /// Directory the current step's commands run in
    pub fn cwd(&self) -> &Path {
        match self.working_dir {
            WorkingDir::Root => &self.root,
            WorkingDir::SourceTree => &self.source_tree,
        }
    }

    /// Resolve a path against the current working directory
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        self.cwd().join(path)
    }

    /// Move into the source tree; stays there until `return_to_root`
    pub fn enter_source_tree(&mut self) {
        if self.working_dir != WorkingDir::SourceTree {
            debug!("Entering source tree {}", self.source_tree.display());
            self.working_dir = WorkingDir::SourceTree;
        }
    }

    pub fn return_to_root(&mut self) {
        if self.working_dir != WorkingDir::Root {
            debug!("Returning to root {}", self.root.display());
            self.working_dir = WorkingDir::Root;
        }
    }

    /// Apply the working-directory discipline for `step`
    ///
    /// From `BootstrapGn` on the context is in the source tree; `Package`
    /// switches back to the root. Earlier steps never leave the root.
    pub fn align_for(&mut self, step: Step) {
        if step == Step::Package {
            self.return_to_root();
        } else if step.runs_in_source_tree() {
            self.enter_source_tree();
        }
    }

    /// Look up a variable, preferring values set during the run
    pub fn var(&self, key: &str) -> Option<&str> {
        self.env_overrides
            .get(key)
            .or_else(|| self.inherited_env.get(key))
            .map(String::as_str)
    }

    /// Set a variable for every later child process
    pub fn set_var(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.env_overrides.insert(key.into(), value.into());
    }

    /// Variables to apply on top of the inherited environment of a child
    pub fn env_overrides(&self) -> &BTreeMap<String, String> {
        &self.env_overrides
    }
}
