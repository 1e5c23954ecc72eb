//! Helpers for reading typed values out of environment variables.

use std::env;
use std::fmt::Display;
use std::str::FromStr;

/// Trimmed value of `name`, treating empty strings as unset.
pub(crate) fn env_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse `name` as `T`, falling back to `default` when unset.
pub(crate) fn parse_env<T>(name: &str, default: T) -> Result<T, String>
where
    T: FromStr,
    T::Err: Display,
{
    match env_var(name) {
        Some(value) => value
            .parse()
            .map_err(|e| format!("Invalid value for {name}: {value} ({e})")),
        None => Ok(default),
    }
}

/// Parse an optional numeric variable; unset stays `None`.
pub(crate) fn parse_env_opt<T>(name: &str) -> Result<Option<T>, String>
where
    T: FromStr,
    T::Err: Display,
{
    env_var(name)
        .map(|value| {
            value
                .parse()
                .map_err(|e| format!("Invalid value for {name}: {value} ({e})"))
        })
        .transpose()
}

pub(crate) fn parse_bool(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub(crate) fn parse_env_bool(name: &str, default: bool) -> Result<bool, String> {
    match env_var(name) {
        Some(value) => parse_bool(&value)
            .ok_or_else(|| format!("Invalid value for {name}: {value} (expected true or false)")),
        None => Ok(default),
    }
}
