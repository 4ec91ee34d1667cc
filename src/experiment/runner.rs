//! Launching one simulation run.
//!
//! Runs are strictly sequential: the result file is a single-slot mailbox
//! that is cleared before every launch and read once the process exits.
//! Each simulation gets its own process group so that wrappers such as
//! `./waf --run` or `sh -c` cannot leave writers behind for the next run.

use std::fs;
use std::io;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::tpa::record::{RecordError, ResultRecord};

/// Everything needed to launch one run
#[derive(Debug, Clone, PartialEq)]
pub struct RunInvocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    pub result_file: PathBuf,
    pub timeout: Duration,
    /// 1-based attempt index within the cycle
    pub rng_run: u32,
}

/// Per-run failures; the run is discarded and the cycle goes on
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("Failed to launch {program}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to wait for simulation process")]
    Wait(#[source] io::Error),

    #[error("Failed to clear stale result file {path}")]
    ClearResult {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("Simulation did not finish within {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("Result file {path} was not written")]
    MissingResult { path: String },

    #[error("Malformed result record in {path}")]
    Malformed {
        path: String,
        #[source]
        source: RecordError,
    },
}

/// Something that can execute a simulation run and hand back its record
pub trait SimulationRunner {
    fn run(&mut self, invocation: &RunInvocation) -> Result<ResultRecord, RunError>;
}

/// Runs the simulation as a child process
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    poll_interval: Duration,
    show_output: bool,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            show_output: false,
        }
    }
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pass the simulation's stdout/stderr through instead of discarding it
    pub fn with_output(mut self, show_output: bool) -> Self {
        self.show_output = show_output;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    fn clear_result(&self, invocation: &RunInvocation) -> Result<(), RunError> {
        match fs::remove_file(&invocation.result_file) {
            Ok(()) => {
                log::debug!("Removed stale result file {}", invocation.result_file.display());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(RunError::ClearResult {
                path: invocation.result_file.display().to_string(),
                source,
            }),
        }
    }

    /// Kill the whole process group of a launched simulation
    fn kill_group(child: &mut Child) {
        #[cfg(unix)]
        {
            let pgid = child.id() as libc::pid_t;
            // SAFETY: the child was spawned as leader of its own process group,
            // so `pgid` names only the simulation and its descendants. The call
            // fails with ESRCH once every member has exited.
            unsafe {
                libc::killpg(pgid, libc::SIGKILL);
            }
        }
        #[cfg(not(unix))]
        {
            let _ = child.kill();
        }
    }

    fn stdio(&self) -> Stdio {
        if self.show_output {
            Stdio::inherit()
        } else {
            Stdio::null()
        }
    }
}

impl SimulationRunner for ProcessRunner {
    fn run(&mut self, invocation: &RunInvocation) -> Result<ResultRecord, RunError> {
        self.clear_result(invocation)?;

        log::debug!(
            "Launching {} {}",
            invocation.program.display(),
            invocation.args.join(" ")
        );
        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .current_dir(&invocation.working_dir)
            .stdin(Stdio::null())
            .stdout(self.stdio())
            .stderr(self.stdio());
        #[cfg(unix)]
        std::os::unix::process::CommandExt::process_group(&mut command, 0);
        let mut child = command
            .spawn()
            .map_err(|source| RunError::Spawn {
                program: invocation.program.display().to_string(),
                source,
            })?;

        let deadline = Instant::now() + invocation.timeout;
        let status = loop {
            if let Some(status) = child.try_wait().map_err(RunError::Wait)? {
                break status;
            }
            if Instant::now() >= deadline {
                log::warn!(
                    "Run {} exceeded {:?}, killing simulation",
                    invocation.rng_run,
                    invocation.timeout
                );
                Self::kill_group(&mut child);
                child.wait().map_err(RunError::Wait)?;
                // A descendant may have written before the kill landed
                self.clear_result(invocation)?;
                return Err(RunError::Timeout {
                    timeout: invocation.timeout,
                });
            }
            thread::sleep(self.poll_interval);
        };

        if !status.success() {
            log::warn!("Run {} exited with {}", invocation.rng_run, status);
        }
        // Background leftovers must not outlive their run
        Self::kill_group(&mut child);

        let content = match fs::read_to_string(&invocation.result_file) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(RunError::MissingResult {
                    path: invocation.result_file.display().to_string(),
                })
            }
            Err(source) => {
                return Err(RunError::Malformed {
                    path: invocation.result_file.display().to_string(),
                    source: RecordError::Unreadable(source.to_string()),
                })
            }
        };

        content.parse().map_err(|source| RunError::Malformed {
            path: invocation.result_file.display().to_string(),
            source,
        })
    }
}
