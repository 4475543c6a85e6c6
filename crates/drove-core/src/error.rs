//! Error types for worker and pool operations.
//!
//! Errors fall into two tiers. Conditions a command caller can recover from
//! (unknown worker id, wrong arity, unknown signal or option) never reach
//! these types: the dispatcher renders them as `"error: ..."` strings.
//! Everything here is fatal for the current convergence pass or command and
//! propagates to the scheduler, with one exception: [`WorkerError::ProcessGone`]
//! is consumed by the pool and never escapes a [`PoolError`].

use thiserror::Error;

/// Errors reported by a worker handle or its factory.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// The worker process no longer exists.
    ///
    /// The pool treats this as a successful termination: the desired end
    /// state already holds.
    #[error("process {pid} is already gone")]
    ProcessGone {
        /// OS process id of the missing process.
        pid: u32,
    },

    /// Any other OS failure while controlling a process.
    #[error("os error on process {pid}: {source}")]
    Os {
        /// OS process id the operation targeted.
        pid: u32,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The worker process could not be created.
    #[error("failed to spawn worker: {0}")]
    Spawn(String),
}

impl WorkerError {
    /// Map an errno from a process-control syscall targeting `pid`.
    ///
    /// `ESRCH` becomes [`WorkerError::ProcessGone`]; everything else is
    /// [`WorkerError::Os`].
    #[must_use]
    pub fn from_errno(pid: u32, errno: nix::errno::Errno) -> Self {
        if errno == nix::errno::Errno::ESRCH {
            Self::ProcessGone { pid }
        } else {
            Self::Os {
                pid,
                source: std::io::Error::from(errno),
            }
        }
    }

    /// Returns true for the "process already absent" condition.
    #[must_use]
    pub const fn is_process_gone(&self) -> bool {
        matches!(self, Self::ProcessGone { .. })
    }
}

/// Fatal errors surfaced by pool operations and the command dispatcher.
#[derive(Debug, Error)]
pub enum PoolError {
    /// A worker operation failed for a reason other than the process being
    /// gone.
    #[error(transparent)]
    Worker(WorkerError),

    /// An argument that must be an integer was not.
    #[error("malformed argument {value:?}: expected an integer")]
    MalformedArgument {
        /// The offending argument text.
        value: String,
    },

    /// An option value could not be parsed or resolved.
    #[error("invalid value {value:?} for option {option}: {reason}")]
    InvalidValue {
        /// External option name.
        option: &'static str,
        /// The rejected value text.
        value: String,
        /// Why the value was rejected.
        reason: String,
    },
}

impl From<WorkerError> for PoolError {
    fn from(err: WorkerError) -> Self {
        Self::Worker(err)
    }
}
