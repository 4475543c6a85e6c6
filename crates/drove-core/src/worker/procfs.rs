//! Minimal `/proc` readers for child discovery and diagnostics.

use std::fs;
use std::io;
use std::path::Path;

const PROC_ROOT: &str = "/proc";

/// Fields of interest from `/proc/<pid>/stat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct StatFields {
    pub state: char,
    pub ppid: u32,
}

/// Parse the content of a `/proc/<pid>/stat` file.
///
/// The command name (field 2) may contain spaces and parentheses, so parsing
/// resumes after the last `)`.
pub(crate) fn parse_stat(content: &str) -> Option<StatFields> {
    let rest = &content[content.rfind(')')? + 1..];
    let mut fields = rest.split_whitespace();
    let state = fields.next()?.chars().next()?;
    let ppid = fields.next()?.parse().ok()?;
    Some(StatFields { state, ppid })
}

pub(crate) fn read_stat(pid: u32) -> Option<StatFields> {
    let content = fs::read_to_string(Path::new(PROC_ROOT).join(pid.to_string()).join("stat")).ok()?;
    parse_stat(&content)
}

/// Direct children of `pid`, in ascending pid order.
pub(crate) fn children_of(pid: u32) -> io::Result<Vec<u32>> {
    let mut children = Vec::new();
    for entry in fs::read_dir(PROC_ROOT)? {
        let Ok(entry) = entry else { continue };
        let Some(candidate) = entry.file_name().to_str().and_then(|n| n.parse::<u32>().ok())
        else {
            continue;
        };
        // Processes can exit while we scan; a missing stat file is not an error.
        if read_stat(candidate).is_some_and(|stat| stat.ppid == pid) {
            children.push(candidate);
        }
    }
    children.sort_unstable();
    Ok(children)
}

/// Extract `VmRSS` in KiB from the content of `/proc/<pid>/status`.
pub(crate) fn parse_rss_kib(status: &str) -> Option<u64> {
    status
        .lines()
        .find_map(|line| line.strip_prefix("VmRSS:"))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|kib| kib.parse().ok())
}

pub(crate) fn rss_kib(pid: u32) -> Option<u64> {
    let status =
        fs::read_to_string(Path::new(PROC_ROOT).join(pid.to_string()).join("status")).ok()?;
    parse_rss_kib(&status)
}

/// Command line of `pid` with NUL separators replaced by spaces.
pub(crate) fn cmdline(pid: u32) -> Option<String> {
    let raw = fs::read(Path::new(PROC_ROOT).join(pid.to_string()).join("cmdline")).ok()?;
    let line = raw
        .split(|b| *b == 0)
        .filter(|part| !part.is_empty())
        .map(String::from_utf8_lossy)
        .collect::<Vec<_>>()
        .join(" ");
    Some(line)
}
