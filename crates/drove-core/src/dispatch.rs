//! Command dispatch.
//!
//! Maps command names to handlers operating on a [`WorkerPool`]. A handler
//! returns `Ok` with either a result (`"ok"`, a status word, requested data)
//! or a recoverable error rendered as `"error: <message>"`. `Err` is reserved
//! for fatal conditions the scheduler must handle.

use std::collections::BTreeMap;

use nix::sys::signal::Signal;
use tracing::debug;

use crate::error::PoolError;
use crate::options::PoolOption;
use crate::pool::{SignalDelivery, WorkerPool};
use crate::signal::parse_signal;
use crate::worker::{WorkerFactory, WorkerId};

const OK: &str = "ok";
const INVALID_ARITY: &str = "error: invalid number of parameters";
const OPTION_NOT_FOUND: &str = "error: option not found";

/// A command handler.
pub type Handler<F> = fn(&mut WorkerPool<F>, &[&str]) -> Result<String, PoolError>;

/// Command table for one pool type.
pub struct Dispatcher<F: WorkerFactory> {
    handlers: BTreeMap<&'static str, Handler<F>>,
}

impl<F: WorkerFactory> Default for Dispatcher<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: WorkerFactory> Dispatcher<F> {
    /// Build the full command table.
    #[must_use]
    pub fn new() -> Self {
        let entries: [(&'static str, Handler<F>); 24] = [
            ("set", handle_set),
            ("mset", handle_mset),
            ("get", handle_get),
            ("mget", handle_mget),
            ("options", handle_options),
            ("status", handle_status),
            ("stop", handle_stop),
            ("start", handle_start),
            ("restart", handle_restart),
            ("flies", handle_flies),
            ("numflies", handle_numflies),
            ("info", handle_info),
            ("quit", handle_quit),
            ("kill", handle_quit),
            ("reload", handle_reload),
            ("hup", handle_reload),
            ("ttin", handle_ttin),
            ("ttou", handle_ttou),
            ("kill_child", handle_kill_child),
            ("quit_child", handle_quit_child),
            ("children", handle_children),
            ("signal", handle_signal),
            ("kill_children", handle_kill_children),
            ("quit_children", handle_quit_children),
        ];
        Self {
            handlers: entries.into_iter().collect(),
        }
    }

    /// Registered command names, sorted.
    pub fn commands(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.handlers.keys().copied()
    }

    /// Whether `command` is registered.
    #[must_use]
    pub fn contains(&self, command: &str) -> bool {
        self.handlers.contains_key(command)
    }

    /// Run `command` with `args` against `pool`.
    ///
    /// Unknown commands yield a recoverable error string.
    ///
    /// # Errors
    ///
    /// Returns fatal errors from the handler: malformed integer arguments,
    /// invalid option values, spawn failures and OS failures.
    pub fn dispatch(
        &self,
        pool: &mut WorkerPool<F>,
        command: &str,
        args: &[&str],
    ) -> Result<String, PoolError> {
        debug!(pool = %pool.name(), command, ?args, "dispatching command");
        match self.handlers.get(command) {
            Some(handler) => handler(pool, args),
            None => Ok(error(format!("unknown command {command}"))),
        }
    }
}

fn error(message: impl std::fmt::Display) -> String {
    format!("error: {message}")
}

fn parse_id(arg: &str) -> Result<WorkerId, PoolError> {
    arg.trim()
        .parse()
        .map_err(|_| PoolError::MalformedArgument {
            value: arg.to_string(),
        })
}

fn parse_pid(arg: &str) -> Result<u32, PoolError> {
    arg.trim()
        .parse()
        .map_err(|_| PoolError::MalformedArgument {
            value: arg.to_string(),
        })
}

fn worker_not_found(id: WorkerId) -> String {
    error(format!("worker '{id}' not found"))
}

fn render_delivery(id: WorkerId, delivery: SignalDelivery) -> String {
    match delivery {
        SignalDelivery::Sent => OK.to_string(),
        SignalDelivery::WorkerNotFound => worker_not_found(id),
        SignalDelivery::ChildNotFound => error("child not found"),
        SignalDelivery::ProcessGone => error("process not found"),
    }
}

fn render_option<F: WorkerFactory>(pool: &WorkerPool<F>, option: PoolOption) -> String {
    format!("{}: {}", option.name(), pool.get_option(option))
}

fn handle_set<F: WorkerFactory>(
    pool: &mut WorkerPool<F>,
    args: &[&str],
) -> Result<String, PoolError> {
    let [key, value, ..] = args else {
        return Ok(INVALID_ARITY.to_string());
    };
    let action = pool.set_option(key, value)?;
    pool.apply_action(action)?;
    Ok(OK.to_string())
}

fn handle_mset<F: WorkerFactory>(
    pool: &mut WorkerPool<F>,
    args: &[&str],
) -> Result<String, PoolError> {
    if args.len() < 2 {
        return Ok(INVALID_ARITY.to_string());
    }
    // A trailing key without a value is dropped.
    let pairs: Vec<(&str, &str)> = args
        .chunks_exact(2)
        .map(|pair| (pair[0], pair[1]))
        .collect();
    let action = pool.set_options(&pairs)?;
    pool.apply_action(action)?;
    Ok(OK.to_string())
}

fn handle_get<F: WorkerFactory>(
    pool: &mut WorkerPool<F>,
    args: &[&str],
) -> Result<String, PoolError> {
    let Some(name) = args.first() else {
        return Ok(INVALID_ARITY.to_string());
    };
    Ok(PoolOption::from_name(name).map_or_else(
        || OPTION_NOT_FOUND.to_string(),
        |option| pool.get_option(option),
    ))
}

fn handle_mget<F: WorkerFactory>(
    pool: &mut WorkerPool<F>,
    args: &[&str],
) -> Result<String, PoolError> {
    if args.is_empty() {
        return Ok(INVALID_ARITY.to_string());
    }
    let mut lines = Vec::with_capacity(args.len());
    for name in args {
        let Some(option) = PoolOption::from_name(name) else {
            return Ok(OPTION_NOT_FOUND.to_string());
        };
        lines.push(render_option(pool, option));
    }
    Ok(lines.join("\n"))
}

fn handle_options<F: WorkerFactory>(
    pool: &mut WorkerPool<F>,
    _args: &[&str],
) -> Result<String, PoolError> {
    Ok(PoolOption::ALL
        .into_iter()
        .map(|option| render_option(pool, option))
        .collect::<Vec<_>>()
        .join("\n"))
}

fn handle_status<F: WorkerFactory>(
    pool: &mut WorkerPool<F>,
    _args: &[&str],
) -> Result<String, PoolError> {
    let status = if pool.is_stopped() { "stopped" } else { "active" };
    Ok(status.to_string())
}

fn handle_stop<F: WorkerFactory>(
    pool: &mut WorkerPool<F>,
    _args: &[&str],
) -> Result<String, PoolError> {
    pool.stop()?;
    Ok(OK.to_string())
}

fn handle_start<F: WorkerFactory>(
    pool: &mut WorkerPool<F>,
    _args: &[&str],
) -> Result<String, PoolError> {
    pool.start()?;
    Ok(OK.to_string())
}

fn handle_restart<F: WorkerFactory>(
    pool: &mut WorkerPool<F>,
    _args: &[&str],
) -> Result<String, PoolError> {
    pool.restart()?;
    Ok(OK.to_string())
}

fn handle_flies<F: WorkerFactory>(
    pool: &mut WorkerPool<F>,
    _args: &[&str],
) -> Result<String, PoolError> {
    Ok(pool
        .worker_ids()
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(","))
}

fn handle_numflies<F: WorkerFactory>(
    pool: &mut WorkerPool<F>,
    _args: &[&str],
) -> Result<String, PoolError> {
    Ok(pool.num_flies().to_string())
}

fn handle_info<F: WorkerFactory>(
    pool: &mut WorkerPool<F>,
    args: &[&str],
) -> Result<String, PoolError> {
    match args.first() {
        Some(arg) => {
            let id = parse_id(arg)?;
            Ok(pool.worker_info(id).unwrap_or_else(|| worker_not_found(id)))
        },
        None => Ok(pool.workers_info().join("\n")),
    }
}

fn handle_quit<F: WorkerFactory>(
    pool: &mut WorkerPool<F>,
    args: &[&str],
) -> Result<String, PoolError> {
    match args.first() {
        Some(arg) => {
            let id = parse_id(arg)?;
            if pool.terminate(id)? {
                Ok(OK.to_string())
            } else {
                Ok(worker_not_found(id))
            }
        },
        None => {
            pool.stop()?;
            Ok(OK.to_string())
        },
    }
}

fn handle_reload<F: WorkerFactory>(
    pool: &mut WorkerPool<F>,
    _args: &[&str],
) -> Result<String, PoolError> {
    pool.reload()?;
    Ok(OK.to_string())
}

fn handle_ttin<F: WorkerFactory>(
    pool: &mut WorkerPool<F>,
    _args: &[&str],
) -> Result<String, PoolError> {
    Ok(pool.increment()?.to_string())
}

fn handle_ttou<F: WorkerFactory>(
    pool: &mut WorkerPool<F>,
    _args: &[&str],
) -> Result<String, PoolError> {
    Ok(pool.decrement()?.to_string())
}

fn signal_child<F: WorkerFactory>(
    pool: &mut WorkerPool<F>,
    args: &[&str],
    signal: Signal,
) -> Result<String, PoolError> {
    let [worker, child, ..] = args else {
        return Ok(INVALID_ARITY.to_string());
    };
    let id = parse_id(worker)?;
    let child = parse_pid(child)?;
    Ok(render_delivery(id, pool.signal_child(id, child, signal)?))
}

fn handle_kill_child<F: WorkerFactory>(
    pool: &mut WorkerPool<F>,
    args: &[&str],
) -> Result<String, PoolError> {
    signal_child(pool, args, Signal::SIGKILL)
}

fn handle_quit_child<F: WorkerFactory>(
    pool: &mut WorkerPool<F>,
    args: &[&str],
) -> Result<String, PoolError> {
    signal_child(pool, args, Signal::SIGQUIT)
}

fn handle_children<F: WorkerFactory>(
    pool: &mut WorkerPool<F>,
    args: &[&str],
) -> Result<String, PoolError> {
    let Some(arg) = args.first() else {
        return Ok(INVALID_ARITY.to_string());
    };
    let id = parse_id(arg)?;
    Ok(match pool.children(id)? {
        Some(children) => children
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(","),
        None => worker_not_found(id),
    })
}

fn handle_signal<F: WorkerFactory>(
    pool: &mut WorkerPool<F>,
    args: &[&str],
) -> Result<String, PoolError> {
    let [worker, name, ..] = args else {
        return Ok(INVALID_ARITY.to_string());
    };
    let Some(signal) = parse_signal(name) else {
        return Ok(error(format!("unknown signal {name}")));
    };
    let id = parse_id(worker)?;
    Ok(render_delivery(id, pool.signal_worker(id, signal)?))
}

fn signal_children<F: WorkerFactory>(
    pool: &mut WorkerPool<F>,
    args: &[&str],
    signal: Signal,
) -> Result<String, PoolError> {
    let Some(arg) = args.first() else {
        return Ok(INVALID_ARITY.to_string());
    };
    let id = parse_id(arg)?;
    Ok(render_delivery(id, pool.signal_children(id, signal)?))
}

fn handle_kill_children<F: WorkerFactory>(
    pool: &mut WorkerPool<F>,
    args: &[&str],
) -> Result<String, PoolError> {
    signal_children(pool, args, Signal::SIGKILL)
}

fn handle_quit_children<F: WorkerFactory>(
    pool: &mut WorkerPool<F>,
    args: &[&str],
) -> Result<String, PoolError> {
    signal_children(pool, args, Signal::SIGQUIT)
}
