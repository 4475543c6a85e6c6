//! OS process workers.
//!
//! Spawns each worker as a direct child of the supervisor with
//! `std::process::Command`. Signals go through `kill(2)`; child discovery and
//! diagnostics read `/proc`.

use std::os::unix::process::CommandExt;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use tracing::{debug, warn};

use super::{SpawnSpec, Worker, WorkerFactory, WorkerId, procfs};
use crate::error::WorkerError;

const SHELL: &str = "/bin/sh";
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Default grace period between SIGTERM and SIGKILL.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Factory producing [`ProcessWorker`]s.
#[derive(Debug, Clone)]
pub struct ProcessSpawner {
    stop_timeout: Duration,
}

impl ProcessSpawner {
    /// Create a spawner whose workers wait up to `stop_timeout` for a graceful
    /// exit before being killed.
    #[must_use]
    pub const fn new(stop_timeout: Duration) -> Self {
        Self { stop_timeout }
    }
}

impl Default for ProcessSpawner {
    fn default() -> Self {
        Self::new(DEFAULT_STOP_TIMEOUT)
    }
}

impl WorkerFactory for ProcessSpawner {
    type Worker = ProcessWorker;

    fn spawn(&mut self, id: WorkerId, spec: &SpawnSpec) -> Result<ProcessWorker, WorkerError> {
        let mut cmd = build_command(spec)?;
        let child = cmd
            .spawn()
            .map_err(|e| WorkerError::Spawn(format!("{}: {e}", spec.command)))?;

        Ok(ProcessWorker {
            id,
            pid: child.id(),
            command: spec.command.clone(),
            child,
            started_at: Instant::now(),
            stop_timeout: self.stop_timeout,
        })
    }
}

fn build_command(spec: &SpawnSpec) -> Result<Command, WorkerError> {
    let mut cmd = if spec.shell {
        let mut cmd = Command::new(SHELL);
        cmd.arg("-c").arg(&spec.command);
        cmd
    } else {
        let mut parts = spec.command.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| WorkerError::Spawn("empty command".to_string()))?;
        let mut cmd = Command::new(program);
        cmd.args(parts);
        cmd
    };

    cmd.current_dir(&spec.working_dir)
        .envs(&spec.env)
        .stdin(Stdio::null());

    if let Some(gid) = spec.gid {
        cmd.gid(gid);
    }
    if let Some(uid) = spec.uid {
        cmd.uid(uid);
    }

    Ok(cmd)
}

/// A worker running as a child process of the supervisor.
#[derive(Debug)]
pub struct ProcessWorker {
    id: WorkerId,
    pid: u32,
    command: String,
    child: Child,
    started_at: Instant,
    stop_timeout: Duration,
}

impl ProcessWorker {
    /// Pool-local id this worker was spawned with.
    #[must_use]
    pub const fn id(&self) -> WorkerId {
        self.id
    }

    /// Time since the process was started.
    #[must_use]
    pub fn age(&self) -> Duration {
        self.started_at.elapsed()
    }

    #[allow(clippy::cast_possible_wrap)] // pids fit in pid_t
    fn os_pid(pid: u32) -> Pid {
        Pid::from_raw(pid as i32)
    }

    fn signal_pid(pid: u32, signal: Signal) -> Result<(), WorkerError> {
        kill(Self::os_pid(pid), signal).map_err(|errno| WorkerError::from_errno(pid, errno))
    }

    fn wait_for_exit(&mut self, timeout: Duration) -> Result<bool, WorkerError> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.has_exited()? {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            std::thread::sleep(STOP_POLL_INTERVAL);
        }
    }
}

impl Worker for ProcessWorker {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn has_exited(&mut self) -> Result<bool, WorkerError> {
        self.child
            .try_wait()
            .map(|status| status.is_some())
            .map_err(|source| WorkerError::Os {
                pid: self.pid,
                source,
            })
    }

    fn stop(&mut self) -> Result<(), WorkerError> {
        if self.has_exited()? {
            return Err(WorkerError::ProcessGone { pid: self.pid });
        }

        Self::signal_pid(self.pid, Signal::SIGTERM)?;
        if self.wait_for_exit(self.stop_timeout)? {
            return Ok(());
        }

        warn!(
            pid = self.pid,
            timeout = ?self.stop_timeout,
            "worker ignored SIGTERM, sending SIGKILL"
        );
        match self.child.kill() {
            Ok(()) => {},
            // The process exited between the last poll and the kill.
            Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => return Ok(()),
            Err(source) => {
                return Err(WorkerError::Os {
                    pid: self.pid,
                    source,
                });
            },
        }
        self.child.wait().map_err(|source| WorkerError::Os {
            pid: self.pid,
            source,
        })?;
        Ok(())
    }

    fn send_signal(&mut self, signal: Signal) -> Result<(), WorkerError> {
        if self.has_exited()? {
            return Err(WorkerError::ProcessGone { pid: self.pid });
        }
        Self::signal_pid(self.pid, signal)
    }

    fn send_signal_child(&mut self, pid: u32, signal: Signal) -> Result<(), WorkerError> {
        Self::signal_pid(pid, signal)
    }

    fn send_signal_children(&mut self, signal: Signal) -> Result<(), WorkerError> {
        for pid in self.children()? {
            match Self::signal_pid(pid, signal) {
                Err(WorkerError::ProcessGone { pid }) => {
                    debug!(pid, "child exited before it could be signaled");
                },
                other => other?,
            }
        }
        Ok(())
    }

    fn children(&self) -> Result<Vec<u32>, WorkerError> {
        procfs::children_of(self.pid).map_err(|source| WorkerError::Os {
            pid: self.pid,
            source,
        })
    }

    fn info(&self) -> String {
        let age = self.age().as_secs();
        let Some(stat) = procfs::read_stat(self.pid) else {
            return format!("{}: pid={} state=gone age={age}s", self.id, self.pid);
        };
        // Right after spawn the kernel may not have published the new argv yet.
        let cmdline = procfs::cmdline(self.pid)
            .filter(|line| !line.is_empty())
            .unwrap_or_else(|| self.command.clone());
        let rss = procfs::rss_kib(self.pid)
            .map_or_else(|| "-".to_string(), |kib| format!("{kib}kB"));
        format!(
            "{}: pid={} state={} rss={rss} age={age}s cmd={cmdline}",
            self.id, self.pid, stat.state
        )
    }
}
