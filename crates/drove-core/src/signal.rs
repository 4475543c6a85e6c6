//! Signal name resolution.
//!
//! Commands name signals textually (`hup`, `TTIN`, `SIGKILL`). Resolution goes
//! through a fixed table rather than the platform's full signal set so the
//! accepted vocabulary is the same everywhere.

use nix::sys::signal::Signal;

/// Canonical signal names accepted by the `signal` command.
pub const SIGNAL_NAMES: &[(&str, Signal)] = &[
    ("HUP", Signal::SIGHUP),
    ("INT", Signal::SIGINT),
    ("QUIT", Signal::SIGQUIT),
    ("KILL", Signal::SIGKILL),
    ("TERM", Signal::SIGTERM),
    ("USR1", Signal::SIGUSR1),
    ("USR2", Signal::SIGUSR2),
    ("ALRM", Signal::SIGALRM),
    ("CHLD", Signal::SIGCHLD),
    ("CONT", Signal::SIGCONT),
    ("STOP", Signal::SIGSTOP),
    ("TSTP", Signal::SIGTSTP),
    ("TTIN", Signal::SIGTTIN),
    ("TTOU", Signal::SIGTTOU),
    ("WINCH", Signal::SIGWINCH),
];

/// Resolve a signal name, case-insensitively, with or without a `SIG` prefix.
///
/// Returns `None` for anything outside [`SIGNAL_NAMES`].
#[must_use]
pub fn parse_signal(name: &str) -> Option<Signal> {
    let upper = name.trim().to_ascii_uppercase();
    let bare = upper.strip_prefix("SIG").unwrap_or(&upper);
    SIGNAL_NAMES
        .iter()
        .find(|(candidate, _)| *candidate == bare)
        .map(|(_, signal)| *signal)
}
