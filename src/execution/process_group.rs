//! Process groups - signalling a command together with everything it started
//!
//! On unix the command leads a new process group. On Windows it starts in a
//! new console process group, and a job object tracks its whole process tree.

use std::io;
use tokio::process::{Child, Command};

/// Put the command into its own group when it is spawned
pub fn configure(command: &mut Command) {
    #[cfg(unix)]
    command.process_group(0);

    #[cfg(windows)]
    {
        const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
        command.creation_flags(CREATE_NEW_PROCESS_GROUP);
    }
}

/// The processes belonging to one spawned command
pub struct ProcessGroup {
    pid: u32,
    #[cfg(windows)]
    job: windows::Job,
}

impl ProcessGroup {
    /// Track a freshly spawned child; call before it is given any work
    #[cfg(not(windows))]
    pub fn attach(child: &Child) -> io::Result<Self> {
        Ok(Self { pid: pid_of(child)? })
    }

    /// Track a freshly spawned child; call before it is given any work
    #[cfg(windows)]
    pub fn attach(child: &Child) -> io::Result<Self> {
        let job = windows::Job::new()?;
        job.assign(child)?;
        Ok(Self {
            pid: pid_of(child)?,
            job,
        })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Ask every member to stop, like a keyboard interrupt would
    pub fn interrupt(&self) {
        #[cfg(unix)]
        unix::signal(self.pid, Some(nix::sys::signal::Signal::SIGINT));

        #[cfg(windows)]
        windows::ctrl_break(self.pid);
    }

    /// Whether any member is still running; the leader must already be reaped
    #[cfg(unix)]
    pub fn is_alive(&self) -> bool {
        unix::signal(self.pid, None)
    }

    #[cfg(windows)]
    pub fn is_alive(&self) -> bool {
        self.job.active_processes() > 0
    }

    /// Forcefully terminate every remaining member
    pub fn kill(&self) {
        #[cfg(unix)]
        unix::signal(self.pid, Some(nix::sys::signal::Signal::SIGKILL));

        #[cfg(windows)]
        self.job.terminate();
    }
}

fn pid_of(child: &Child) -> io::Result<u32> {
    child
        .id()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "process already exited"))
}

#[cfg(unix)]
mod unix {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;
    use tracing::debug;

    /// Signal the group led by `pid`; `None` sends nothing. Returns whether the group exists.
    pub fn signal(pid: u32, signal: Option<Signal>) -> bool {
        let Ok(raw) = i32::try_from(pid) else {
            return false;
        };
        match killpg(Pid::from_raw(raw), signal) {
            Ok(()) => true,
            Err(Errno::ESRCH) => false,
            Err(e) => {
                debug!("Signal {:?} to process group {} failed: {}", signal, pid, e);
                true
            }
        }
    }
}

#[cfg(windows)]
mod windows {
    use std::io;
    use std::ptr;
    use tokio::process::Child;
    use tracing::debug;
    use windows_sys::Win32::Foundation::{CloseHandle, HANDLE};
    use windows_sys::Win32::System::Console::{GenerateConsoleCtrlEvent, CTRL_BREAK_EVENT};
    use windows_sys::Win32::System::JobObjects::{
        AssignProcessToJobObject, CreateJobObjectW, JobObjectBasicAccountingInformation,
        QueryInformationJobObject, TerminateJobObject, JOBOBJECT_BASIC_ACCOUNTING_INFORMATION,
    };

    /// Exit code given to processes terminated through the job
    const KILLED_EXIT_CODE: u32 = 1;

    pub fn ctrl_break(pid: u32) {
        // SAFETY: plain FFI call without pointers
        if unsafe { GenerateConsoleCtrlEvent(CTRL_BREAK_EVENT, pid) } == 0 {
            debug!(
                "CTRL_BREAK to process group {} failed: {}",
                pid,
                io::Error::last_os_error()
            );
        }
    }

    /// Owned job object handle
    pub struct Job(HANDLE);

    // SAFETY: job handles may be used from any thread
    unsafe impl Send for Job {}
    unsafe impl Sync for Job {}

    impl Job {
        pub fn new() -> io::Result<Self> {
            // SAFETY: null attributes and name request an anonymous job
            let handle = unsafe { CreateJobObjectW(ptr::null(), ptr::null()) };
            if handle.is_null() {
                return Err(io::Error::last_os_error());
            }
            Ok(Self(handle))
        }

        pub fn assign(&self, child: &Child) -> io::Result<()> {
            let process = child
                .raw_handle()
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "process already exited"))?;
            // SAFETY: both handles are valid for the duration of the call
            if unsafe { AssignProcessToJobObject(self.0, process) } == 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        }

        pub fn active_processes(&self) -> u32 {
            // SAFETY: the struct is plain data, and the size passed matches it
            unsafe {
                let mut info: JOBOBJECT_BASIC_ACCOUNTING_INFORMATION = std::mem::zeroed();
                let ok = QueryInformationJobObject(
                    self.0,
                    JobObjectBasicAccountingInformation,
                    ptr::addr_of_mut!(info).cast(),
                    std::mem::size_of::<JOBOBJECT_BASIC_ACCOUNTING_INFORMATION>() as u32,
                    ptr::null_mut(),
                );
                if ok == 0 {
                    debug!("Job query failed: {}", io::Error::last_os_error());
                    return 0;
                }
                info.ActiveProcesses
            }
        }

        pub fn terminate(&self) {
            // SAFETY: the handle is owned and open
            if unsafe { TerminateJobObject(self.0, KILLED_EXIT_CODE) } == 0 {
                debug!("Job termination failed: {}", io::Error::last_os_error());
            }
        }
    }

    impl Drop for Job {
        fn drop(&mut self) {
            // SAFETY: the handle is owned and closed exactly once
            unsafe { CloseHandle(self.0) };
        }
    }
}
