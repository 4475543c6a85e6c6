//! # drove-core
//!
//! Supervision core for a fleet of identical worker processes.
//!
//! A [`WorkerPool`] keeps a configured number of workers running a command,
//! replacing workers that die and culling surplus ones. Its configuration can
//! be changed at runtime through named options, and a [`Dispatcher`] exposes
//! the whole surface as a textual command protocol:
//!
//! - Convergence: [`WorkerPool::reap_and_manage`], driven by an external
//!   scheduler on a fixed interval
//! - Lifecycle: [`WorkerPool::start`], [`WorkerPool::stop`],
//!   [`WorkerPool::restart`], [`WorkerPool::reload`]
//! - Options: [`WorkerPool::set_option`] returns an [`Action`] telling the
//!   pool whether to converge or replace every worker
//! - Signal relay to workers and their children
//!
//! Process creation sits behind the [`WorkerFactory`] trait;
//! [`ProcessSpawner`] is the OS implementation.
//!
//! ## Example
//!
//! ```no_run
//! use drove_core::{Dispatcher, PoolSettings, ProcessSpawner, WorkerPool};
//!
//! let settings = PoolSettings::new("web", "python3 -m http.server").with_num_flies(2);
//! let mut pool = WorkerPool::new(settings, ProcessSpawner::default());
//! pool.reap_and_manage()?;
//!
//! let dispatcher = Dispatcher::new();
//! assert_eq!(dispatcher.dispatch(&mut pool, "ttin", &[])?, "3");
//! # Ok::<(), drove_core::PoolError>(())
//! ```

pub mod config;
pub mod dispatch;
pub mod error;
pub mod options;
pub mod pool;
pub mod signal;
pub mod util;
pub mod worker;

pub use config::{Config, ConfigError, DaemonConfig, PoolConfig};
pub use dispatch::Dispatcher;
pub use error::{PoolError, WorkerError};
pub use options::{Action, PoolOption};
pub use pool::{PoolSettings, SignalDelivery, WorkerPool};
pub use worker::{ProcessSpawner, ProcessWorker, SpawnSpec, Worker, WorkerFactory, WorkerId};
