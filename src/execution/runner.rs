//! Process runner - toolchain-qualified, cancellable subprocess execution

use crate::core::{BuildError, ExecutionContext};
use crate::execution::process_group::{self, ProcessGroup};
use crate::execution::toolchain::ToolchainLocator;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// A command to run in the build environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Program followed by its arguments
    pub args: Vec<String>,

    pub working_dir: PathBuf,

    /// Variables applied on top of the inherited environment
    pub env: BTreeMap<String, String>,

    /// Deadline for the whole invocation; `None` waits indefinitely
    pub timeout: Option<Duration>,
}

impl Invocation {
    /// Invocation in the context's current working directory and environment
    pub fn new<I, S>(args: I, ctx: &ExecutionContext) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
            working_dir: ctx.cwd().to_path_buf(),
            env: ctx.env_overrides().clone(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Short name used in logs and errors
    pub fn program(&self) -> String {
        self.args.first().cloned().unwrap_or_default()
    }
}

/// Runs build commands
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run to completion, failing on non-zero exit or deadline expiry
    async fn run(&self, invocation: &Invocation) -> Result<(), BuildError>;
}

/// How a timed-out process is brought down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CancellationPolicy {
    /// Interrupts sent to the process group before waiting for exit
    pub interrupt_attempts: u32,

    /// Pause after each interrupt
    pub interrupt_interval: Duration,

    /// Time allowed for voluntary exit before the group is killed
    pub grace_period: Duration,
}

impl Default for CancellationPolicy {
    fn default() -> Self {
        Self {
            interrupt_attempts: 3,
            interrupt_interval: Duration::from_secs(1),
            grace_period: Duration::from_secs(10),
        }
    }
}

impl CancellationPolicy {
    /// Longest time cancellation can take after the deadline, before the kill
    pub fn max_escalation(&self) -> Duration {
        self.interrupt_interval * self.interrupt_attempts + self.grace_period
    }
}

const GROUP_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Runs commands inside a freshly activated toolchain environment
///
/// The toolchain is located again for every invocation, so a missing
/// toolchain fails that invocation only. Each command runs as the root of a
/// new process group, so interrupts reach the shell and the tool it started.
pub struct ProcessRunner<L> {
    locator: L,
    policy: CancellationPolicy,
}

impl<L: ToolchainLocator> ProcessRunner<L> {
    pub fn new(locator: L) -> Self {
        Self {
            locator,
            policy: CancellationPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: CancellationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &CancellationPolicy {
        &self.policy
    }

    fn spawn(&self, shell: &str, shell_args: &[&str], invocation: &Invocation) -> Result<(Child, ProcessGroup), BuildError> {
        let mut command = Command::new(shell);
        command
            .args(shell_args)
            .current_dir(&invocation.working_dir)
            .envs(&invocation.env)
            .stdin(Stdio::piped())
            .kill_on_drop(true);
        process_group::configure(&mut command);

        let spawn_error = |source| BuildError::Spawn {
            command: invocation.program(),
            source,
        };
        let child = command.spawn().map_err(spawn_error)?;
        let group = ProcessGroup::attach(&child).map_err(spawn_error)?;
        Ok((child, group))
    }

    /// Escalate from interrupts to a forced kill; the caller reports `Cancelled`
    ///
    /// The group is killed at the end even when the shell exited early, so no
    /// tool it started outlives the cancellation.
    async fn cancel(&self, child: &mut Child, group: &ProcessGroup, program: &str) {
        for attempt in 1..=self.policy.interrupt_attempts {
            warn!("Sending keyboard interrupt to {} ({}/{})", program, attempt, self.policy.interrupt_attempts);
            group.interrupt();
            if settle(child, group, self.policy.interrupt_interval).await {
                info!("{} exited after interrupt", program);
                group.kill();
                return;
            }
        }

        if settle(child, group, self.policy.grace_period).await {
            info!("{} exited during grace period", program);
        } else {
            warn!("{} ignored interrupts, killing process group {}", program, group.pid());
        }
        group.kill();
        if let Err(e) = child.kill().await {
            debug!("Kill of {} reported: {}", program, e);
        }
    }
}

/// Wait up to `within` for the shell to exit and every process it started to go away
async fn settle(child: &mut Child, group: &ProcessGroup, within: Duration) -> bool {
    let drained = async {
        if let Err(e) = child.wait().await {
            debug!("Wait on process group {} failed: {}", group.pid(), e);
        }
        while group.is_alive() {
            tokio::time::sleep(GROUP_POLL_INTERVAL).await;
        }
    };
    timeout(within, drained).await.is_ok()
}

#[async_trait]
impl<L: ToolchainLocator> CommandRunner for ProcessRunner<L> {
    async fn run(&self, invocation: &Invocation) -> Result<(), BuildError> {
        let toolchain = self.locator.locate().await?;
        let program = invocation.program();
        let script = toolchain.script_for(&invocation.args);
        let (shell, shell_args) = toolchain.dialect.shell();

        info!("Running {} in {}", invocation.args.join(" "), invocation.working_dir.display());
        debug!("Shell script:\n{}", script);

        let (mut child, group) = self.spawn(shell, shell_args, invocation)?;

        if let Some(mut stdin) = child.stdin.take() {
            // A shell that dies early surfaces through its exit status
            if let Err(e) = stdin.write_all(script.as_bytes()).await {
                warn!("Failed to write script to {} stdin: {}", shell, e);
            }
        }

        let wait_error = |source| BuildError::Spawn {
            command: program.clone(),
            source,
        };

        let status = match invocation.timeout {
            None => child.wait().await.map_err(wait_error)?,
            Some(limit) => match timeout(limit, child.wait()).await {
                Ok(status) => status.map_err(wait_error)?,
                Err(_) => {
                    warn!("{} exceeded its {}s deadline", program, limit.as_secs());
                    self.cancel(&mut child, &group, &program).await;
                    return Err(BuildError::Cancelled {
                        command: program,
                        timeout_secs: limit.as_secs(),
                    });
                }
            },
        };

        check_status(&program, status)
    }
}

fn check_status(program: &str, status: ExitStatus) -> Result<(), BuildError> {
    if status.success() {
        debug!("{} exited successfully", program);
        Ok(())
    } else {
        warn!("{} exited with {}", program, status);
        Err(BuildError::ProcessFailed {
            command: program.to_string(),
            exit_code: status.code(),
        })
    }
}
