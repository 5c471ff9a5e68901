//! Build error taxonomy and exit-code mapping

use std::path::PathBuf;
use thiserror::Error;

/// Exit code for a run that completed every selected step
pub const EXIT_SUCCESS: i32 = 0;

/// Exit code for any fatal error that is not a tool failure or a cancellation
pub const EXIT_FAILURE: i32 = 1;

/// Exit code when an invoked external tool reported failure
pub const EXIT_TOOL_FAILED: i32 = 123;

/// Exit code when an operation was cancelled via deadline or interrupt
pub const EXIT_CANCELLED: i32 = 124;

/// Errors that terminate a pipeline run
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Toolchain discovery failed: {0}")]
    ToolchainDiscovery(String),

    #[error("{command} exited with {}", describe_exit(.exit_code))]
    ProcessFailed {
        command: String,
        exit_code: Option<i32>,
    },

    #[error("{command} was cancelled after exceeding its {timeout_secs}s deadline")]
    Cancelled { command: String, timeout_secs: u64 },

    #[error("File checksum does not match: {0}")]
    IntegrityMismatch(String),

    #[error("Files could not be pruned: {}", .0.join(", "))]
    UnremovableFiles(Vec<String>),

    #[error("Download failed: {0}")]
    Download(String),

    #[error("{operation} failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        operation: String,
        attempts: usize,
        last_error: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to run {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "no exit code (terminated by signal)".to_string(),
    }
}

impl BuildError {
    /// Attach a path to an I/O error
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BuildError::Io {
            path: path.into(),
            source,
        }
    }

    /// Process exit code the orchestrator reports for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            BuildError::Cancelled { .. } => EXIT_CANCELLED,
            BuildError::ProcessFailed { .. } => EXIT_TOOL_FAILED,
            _ => EXIT_FAILURE,
        }
    }
}
