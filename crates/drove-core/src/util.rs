//! Value parsing helpers shared by the option registry and configuration.
//!
//! Parsers return a human-readable reason on failure; callers attach the
//! option name and the rejected text.

use std::collections::BTreeMap;
use std::path::PathBuf;

use nix::unistd::{Group, User};

const TRUTHY: &[&str] = &["true", "1", "yes", "on", "y"];
const FALSY: &[&str] = &["false", "0", "no", "off", "n"];

/// Parse a boolean token.
///
/// Accepts `true/1/yes/on/y` and `false/0/no/off/n`, case-insensitively.
///
/// # Errors
///
/// Returns a reason string for any other token.
pub fn to_bool(value: &str) -> Result<bool, String> {
    let token = value.trim().to_ascii_lowercase();
    if TRUTHY.contains(&token.as_str()) {
        Ok(true)
    } else if FALSY.contains(&token.as_str()) {
        Ok(false)
    } else {
        Err(format!("{value:?} is not a boolean"))
    }
}

/// Resolve a user name or numeric uid.
///
/// An empty value means "unset" and yields `None`.
///
/// # Errors
///
/// Returns a reason string when the name does not resolve to a user.
pub fn to_uid(value: &str) -> Result<Option<u32>, String> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    if let Ok(uid) = value.parse::<u32>() {
        return Ok(Some(uid));
    }
    match User::from_name(value) {
        Ok(Some(user)) => Ok(Some(user.uid.as_raw())),
        Ok(None) => Err(format!("no such user {value:?}")),
        Err(errno) => Err(format!("failed to look up user {value:?}: {errno}")),
    }
}

/// Resolve a group name or numeric gid.
///
/// An empty value means "unset" and yields `None`.
///
/// # Errors
///
/// Returns a reason string when the name does not resolve to a group.
pub fn to_gid(value: &str) -> Result<Option<u32>, String> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    if let Ok(gid) = value.parse::<u32>() {
        return Ok(Some(gid));
    }
    match Group::from_name(value) {
        Ok(Some(group)) => Ok(Some(group.gid.as_raw())),
        Ok(None) => Err(format!("no such group {value:?}")),
        Err(errno) => Err(format!("failed to look up group {value:?}: {errno}")),
    }
}

/// Parse an environment blob of the form `K=V,K2=V2`.
///
/// Keys and values are trimmed. Empty segments are skipped, so an empty blob
/// is an empty mapping.
///
/// # Errors
///
/// Returns a reason string for a segment without `=` or with an empty key.
pub fn parse_env(value: &str) -> Result<BTreeMap<String, String>, String> {
    let mut env = BTreeMap::new();
    for segment in value.split(',') {
        if segment.trim().is_empty() {
            continue;
        }
        let (key, val) = segment
            .split_once('=')
            .ok_or_else(|| format!("{segment:?} is not a KEY=VALUE pair"))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(format!("{segment:?} has an empty key"));
        }
        env.insert(key.to_string(), val.trim().to_string());
    }
    Ok(env)
}

/// Render an environment mapping as `K=V` pairs joined by `,`, sorted by key.
#[must_use]
pub fn env_to_str(env: &BTreeMap<String, String>) -> String {
    env.iter()
        .map(|(key, val)| format!("{key}={val}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Working directory used when none is configured: the supervisor's own.
#[must_use]
pub fn default_working_dir() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"))
}
