//! Worker handle contract.
//!
//! The pool never creates processes itself. It asks a [`WorkerFactory`] for a
//! new [`Worker`] and drives it through this trait, which keeps convergence
//! logic independent of fork/exec mechanics. [`process`] provides the OS
//! process implementation used by the daemon.

use std::collections::BTreeMap;
use std::path::PathBuf;

use nix::sys::signal::Signal;

use crate::error::WorkerError;

mod procfs;
pub mod process;

#[cfg(test)]
pub(crate) mod mock;

pub use process::{ProcessSpawner, ProcessWorker};

/// Pool-local worker identifier. The first id issued is 1.
pub type WorkerId = u64;

/// Process-creation parameters for one worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnSpec {
    /// Program and arguments, or a shell command line when `shell` is set.
    pub command: String,
    /// Working directory for the process.
    pub working_dir: PathBuf,
    /// Run `command` through `/bin/sh -c`.
    pub shell: bool,
    /// User id to run as.
    pub uid: Option<u32>,
    /// Group id to run as.
    pub gid: Option<u32>,
    /// Extra environment variables.
    pub env: BTreeMap<String, String>,
}

/// Control surface for one running worker process.
pub trait Worker {
    /// OS process id.
    fn pid(&self) -> u32;

    /// Poll for liveness. Returns true once the process has exited.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Os`] if the process state cannot be queried.
    fn has_exited(&mut self) -> Result<bool, WorkerError>;

    /// Terminate the process, possibly blocking briefly until it exits.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::ProcessGone`] if the process was already gone,
    /// or [`WorkerError::Os`] for any other failure.
    fn stop(&mut self) -> Result<(), WorkerError>;

    /// Send `signal` to the process.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::ProcessGone`] or [`WorkerError::Os`].
    fn send_signal(&mut self, signal: Signal) -> Result<(), WorkerError>;

    /// Send `signal` to one child process of the worker.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::ProcessGone`] if the child is gone, or
    /// [`WorkerError::Os`].
    fn send_signal_child(&mut self, pid: u32, signal: Signal) -> Result<(), WorkerError>;

    /// Send `signal` to every child process of the worker.
    ///
    /// Children that vanish between listing and signaling are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Os`] for failures other than a vanished child.
    fn send_signal_children(&mut self, signal: Signal) -> Result<(), WorkerError>;

    /// Process ids of the worker's direct children.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Os`] if the process table cannot be read.
    fn children(&self) -> Result<Vec<u32>, WorkerError>;

    /// One-line diagnostic description.
    fn info(&self) -> String;
}

/// Creates worker handles for a pool.
pub trait WorkerFactory {
    /// The handle type this factory produces.
    type Worker: Worker;

    /// Start a new worker process.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Spawn`] if the process cannot be created.
    fn spawn(&mut self, id: WorkerId, spec: &SpawnSpec) -> Result<Self::Worker, WorkerError>;
}
