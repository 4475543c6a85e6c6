//! Runtime-mutable pool options.
//!
//! Every option has a fixed external name (matched by tooling, so never
//! renamed), a parser applied by [`WorkerPool::set_option`], a renderer used
//! by [`WorkerPool::get_option`], and an [`Action`] describing what the pool
//! must do for the change to take effect.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use tracing::debug;

use crate::error::PoolError;
use crate::pool::WorkerPool;
use crate::util::{default_working_dir, env_to_str, parse_env, to_bool, to_gid, to_uid};
use crate::worker::WorkerFactory;

/// What applying an option change requires.
///
/// Ordered so that the strongest action of a batch is its maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Action {
    /// A convergence pass is enough.
    #[default]
    Converge,
    /// New workers must be spawned with the new parameters and the old ones
    /// retired.
    Replace,
}

/// The options exposed through `get`/`set`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolOption {
    /// Target worker count.
    NumFlies,
    /// Pause between spawns, in seconds.
    WarmupDelay,
    /// Worker working directory.
    WorkingDir,
    /// Worker user.
    Uid,
    /// Worker group.
    Gid,
    /// Reload by SIGHUP instead of replacement.
    SendHup,
    /// Run the command through the shell.
    Shell,
    /// Worker environment, as `K=V,K2=V2`.
    Env,
}

impl PoolOption {
    /// All options, in display order.
    pub const ALL: [Self; 8] = [
        Self::NumFlies,
        Self::WarmupDelay,
        Self::WorkingDir,
        Self::Uid,
        Self::Gid,
        Self::SendHup,
        Self::Shell,
        Self::Env,
    ];

    /// External option name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::NumFlies => "num_flies",
            Self::WarmupDelay => "warmup_delay",
            Self::WorkingDir => "working_dir",
            Self::Uid => "uid",
            Self::Gid => "gid",
            Self::SendHup => "send_hup",
            Self::Shell => "shell",
            Self::Env => "env",
        }
    }

    /// Look up an option by its external name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|opt| opt.name() == name)
    }

    /// Action required after changing this option.
    #[must_use]
    pub const fn action(self) -> Action {
        match self {
            Self::NumFlies | Self::WarmupDelay | Self::SendHup => Action::Converge,
            Self::WorkingDir | Self::Uid | Self::Gid | Self::Shell | Self::Env => Action::Replace,
        }
    }
}

fn invalid(option: PoolOption, value: &str, reason: impl Into<String>) -> PoolError {
    PoolError::InvalidValue {
        option: option.name(),
        value: value.to_string(),
        reason: reason.into(),
    }
}

/// A parsed option value, ready to be stored.
#[derive(Debug)]
enum OptionValue {
    NumFlies(usize),
    WarmupDelay(Duration),
    WorkingDir(PathBuf),
    Uid(Option<u32>),
    Gid(Option<u32>),
    SendHup(bool),
    Shell(bool),
    Env(BTreeMap<String, String>),
}

/// Parse `value` for `option` without touching the pool.
fn parse_value(option: PoolOption, value: &str) -> Result<OptionValue, PoolError> {
    let parsed = match option {
        PoolOption::NumFlies => {
            let count: i64 = value
                .trim()
                .parse()
                .map_err(|_| invalid(option, value, "expected an integer"))?;
            OptionValue::NumFlies(usize::try_from(count).unwrap_or(0))
        },
        PoolOption::WarmupDelay => {
            let secs: f64 = value
                .trim()
                .parse()
                .map_err(|_| invalid(option, value, "expected a number of seconds"))?;
            OptionValue::WarmupDelay(
                Duration::try_from_secs_f64(secs)
                    .map_err(|e| invalid(option, value, e.to_string()))?,
            )
        },
        PoolOption::WorkingDir => OptionValue::WorkingDir(if value.trim().is_empty() {
            default_working_dir()
        } else {
            PathBuf::from(value)
        }),
        PoolOption::Uid => {
            OptionValue::Uid(to_uid(value).map_err(|reason| invalid(option, value, reason))?)
        },
        PoolOption::Gid => {
            OptionValue::Gid(to_gid(value).map_err(|reason| invalid(option, value, reason))?)
        },
        PoolOption::SendHup => {
            OptionValue::SendHup(to_bool(value).map_err(|reason| invalid(option, value, reason))?)
        },
        PoolOption::Shell => {
            OptionValue::Shell(to_bool(value).map_err(|reason| invalid(option, value, reason))?)
        },
        PoolOption::Env => {
            OptionValue::Env(parse_env(value).map_err(|reason| invalid(option, value, reason))?)
        },
    };
    Ok(parsed)
}

impl<F: WorkerFactory> WorkerPool<F> {
    /// Parse and apply one option by external name.
    ///
    /// Unknown names are ignored and yield [`Action::Converge`]. A negative
    /// `num_flies` is clamped to zero. The returned action is not performed;
    /// see [`apply_action`](Self::apply_action).
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidValue`] if the value does not parse or
    /// resolve. The option is left unchanged in that case.
    pub fn set_option(&mut self, name: &str, value: &str) -> Result<Action, PoolError> {
        self.set_options(&[(name, value)])
    }

    /// Parse every `(name, value)` pair, then apply them all.
    ///
    /// Nothing is applied unless every known option parses. Unknown names are
    /// ignored. Returns the strongest action of the batch, not yet performed.
    ///
    /// # Errors
    ///
    /// Returns the first [`PoolError::InvalidValue`]; no option changes.
    pub fn set_options(&mut self, pairs: &[(&str, &str)]) -> Result<Action, PoolError> {
        let mut parsed = Vec::with_capacity(pairs.len());
        for &(name, value) in pairs {
            match PoolOption::from_name(name) {
                Some(option) => parsed.push((option, value, parse_value(option, value)?)),
                None => debug!(pool = %self.name, option = name, "ignoring unknown option"),
            }
        }

        let mut action = Action::Converge;
        for (option, value, parsed) in parsed {
            self.store(parsed);
            debug!(pool = %self.name, option = option.name(), value, "option set");
            action = action.max(option.action());
        }
        Ok(action)
    }

    fn store(&mut self, value: OptionValue) {
        match value {
            OptionValue::NumFlies(count) => self.num_flies = count,
            OptionValue::WarmupDelay(delay) => self.warmup_delay = delay,
            OptionValue::WorkingDir(dir) => self.working_dir = dir,
            OptionValue::Uid(uid) => self.uid = uid,
            OptionValue::Gid(gid) => self.gid = gid,
            OptionValue::SendHup(send_hup) => self.send_hup = send_hup,
            OptionValue::Shell(shell) => self.shell = shell,
            OptionValue::Env(env) => self.env = env,
        }
    }

    /// Render the current value of an option.
    ///
    /// Unset uid/gid render as the empty string.
    #[must_use]
    pub fn get_option(&self, option: PoolOption) -> String {
        match option {
            PoolOption::NumFlies => self.num_flies.to_string(),
            PoolOption::WarmupDelay => self.warmup_delay.as_secs_f64().to_string(),
            PoolOption::WorkingDir => self.working_dir.display().to_string(),
            PoolOption::Uid => self.uid.map(|uid| uid.to_string()).unwrap_or_default(),
            PoolOption::Gid => self.gid.map(|gid| gid.to_string()).unwrap_or_default(),
            PoolOption::SendHup => self.send_hup.to_string(),
            PoolOption::Shell => self.shell.to_string(),
            PoolOption::Env => env_to_str(&self.env),
        }
    }

    /// Perform the action resulting from option changes.
    ///
    /// # Errors
    ///
    /// Propagates convergence errors.
    pub fn apply_action(&mut self, action: Action) -> Result<(), PoolError> {
        match action {
            Action::Converge => self.reap_and_manage(),
            Action::Replace => self.replace_all(),
        }
    }
}
