//! External collaborators the step bodies delegate to
//!
//! Source acquisition, pruning, patching, domain substitution and packaging
//! are black boxes behind [`SourceTools`]; the PGO profile download sits
//! behind [`ProfileFetcher`].

pub mod pgo;
pub mod utility;

pub use pgo::{HttpProfileFetcher, ProfileFetcher};
pub use utility::UtilityScripts;

use crate::core::{Arch, BuildError, Extractors};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Failure reported by a collaborator
#[derive(Debug, Error)]
pub enum ToolError {
    /// Transient network failure; worth retrying
    #[error("network error: {0}")]
    Network(String),

    /// A downloaded artifact failed verification
    #[error("{0}")]
    IntegrityMismatch(String),

    /// The download server refused the request
    #[error("{url}: HTTP {status}")]
    Http { url: String, status: u16 },

    #[error("{tool} failed: {message}")]
    Failed {
        tool: String,
        exit_code: Option<i32>,
        message: String,
    },

    #[error("failed to run {tool}: {source}")]
    Io {
        tool: String,
        #[source]
        source: std::io::Error,
    },
}

impl ToolError {
    /// Whether a retry may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, ToolError::Network(_))
    }
}

impl From<ToolError> for BuildError {
    fn from(err: ToolError) -> Self {
        match err {
            ToolError::Network(message) => BuildError::Download(message),
            ToolError::IntegrityMismatch(message) => BuildError::IntegrityMismatch(message),
            err @ ToolError::Http { .. } => BuildError::Download(err.to_string()),
            ToolError::Failed {
                tool, exit_code, ..
            } => BuildError::ProcessFailed {
                command: tool,
                exit_code,
            },
            ToolError::Io { tool, source } => BuildError::Spawn {
                command: tool,
                source,
            },
        }
    }
}

/// Source-preparation and packaging collaborators
#[async_trait]
pub trait SourceTools: Send + Sync {
    /// Download every archive listed in the manifests into the cache
    async fn retrieve(
        &self,
        manifests: &[PathBuf],
        cache: &Path,
        ssl_verification: bool,
    ) -> Result<(), ToolError>;

    /// Verify cached archives against the manifests' hashes
    async fn verify(&self, manifests: &[PathBuf], cache: &Path) -> Result<(), ToolError>;

    /// Unpack cached archives into the source tree
    async fn unpack(
        &self,
        manifests: &[PathBuf],
        cache: &Path,
        tree: &Path,
        extractors: &Extractors,
    ) -> Result<(), ToolError>;

    /// Remove the listed binaries; returns the paths that could not be removed
    async fn prune(&self, tree: &Path, pruning_list: &Path) -> Result<Vec<String>, ToolError>;

    /// Apply a patch series directory to the tree
    async fn apply_patches(
        &self,
        series_dir: &Path,
        tree: &Path,
        patch_binary: &Path,
    ) -> Result<(), ToolError>;

    /// Replace vendor endpoints in the listed source files
    async fn substitute_domains(
        &self,
        regex_list: &Path,
        files_list: &Path,
        tree: &Path,
    ) -> Result<(), ToolError>;

    /// Package the build outputs, run from the root
    async fn package(&self, root: &Path, arch: Arch) -> Result<(), ToolError>;
}
