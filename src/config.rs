#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use std::{
    collections::HashMap,
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

pub const DEFAULT_ENV_PATH: &str = ".env";
pub const DEFAULT_RELAY_PORT: u16 = 8080;
pub const DEFAULT_RELAY_HOST: &str = "127.0.0.1";

/// Cobalt-compatible conversion endpoint tried first.
pub const DEFAULT_COBALT_URL: &str = "https://api.cobalt.tools/api/json";
/// Polling converter (loader.to-style ajax API).
pub const DEFAULT_CONVERTER_URL: &str = "https://loader.to";
/// Second converter speaking the same ajax protocol on a different host.
pub const DEFAULT_CONVERTER_ALT_URL: &str = "https://p.oceansaver.in";
/// Base of the external download page handed out when every provider fails.
pub const DEFAULT_FALLBACK_URL: &str = "https://www.y2mate.com";

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2000;
pub const DEFAULT_POLL_ATTEMPTS: u32 = 30;

/// Fully resolved runtime settings for the relay.
#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub relay_host: String,
    pub relay_port: u16,
    pub cobalt_url: String,
    pub converter_url: String,
    pub converter_alt_url: String,
    pub fallback_url: String,
    pub poll_interval: Duration,
    pub poll_attempts: u32,
}

pub fn load_settings() -> Result<RelaySettings> {
    resolve_settings(SettingsOverrides::default())
}

/// Values that take precedence over both the environment and the `.env` file.
/// Used by the binary's command line flags.
#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub relay_host: Option<String>,
    pub relay_port: Option<u16>,
    pub env_path: Option<PathBuf>,
}

pub fn resolve_settings(overrides: SettingsOverrides) -> Result<RelaySettings> {
    let env_path = overrides
        .env_path
        .as_deref()
        .unwrap_or_else(|| Path::new(DEFAULT_ENV_PATH));
    let file_vars = read_env_file(env_path)?;
    build_settings_with_overrides(&file_vars, env_var_string, overrides)
}

#[cfg(test)]
fn build_settings(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
) -> Result<RelaySettings> {
    build_settings_with_overrides(file_vars, env_lookup, SettingsOverrides::default())
}

fn build_settings_with_overrides(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
    overrides: SettingsOverrides,
) -> Result<RelaySettings> {
    let relay_host = overrides
        .relay_host
        .and_then(|value| {
            let trimmed = value.trim().to_string();
            if trimmed.is_empty() { None } else { Some(trimmed) }
        })
        .or_else(|| lookup_value("GRABTUBE_HOST", file_vars, &env_lookup))
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_RELAY_HOST.to_string());
    let relay_port = overrides
        .relay_port
        .or_else(|| {
            lookup_value("GRABTUBE_PORT", file_vars, &env_lookup)
                .and_then(|value| value.parse::<u16>().ok())
        })
        .unwrap_or(DEFAULT_RELAY_PORT);

    let cobalt_url = endpoint_value(
        "GRABTUBE_COBALT_URL",
        DEFAULT_COBALT_URL,
        file_vars,
        &env_lookup,
    );
    let converter_url = endpoint_value(
        "GRABTUBE_CONVERTER_URL",
        DEFAULT_CONVERTER_URL,
        file_vars,
        &env_lookup,
    );
    let converter_alt_url = endpoint_value(
        "GRABTUBE_CONVERTER_ALT_URL",
        DEFAULT_CONVERTER_ALT_URL,
        file_vars,
        &env_lookup,
    );
    let fallback_url = endpoint_value(
        "GRABTUBE_FALLBACK_URL",
        DEFAULT_FALLBACK_URL,
        file_vars,
        &env_lookup,
    );

    let poll_interval_ms = lookup_value("GRABTUBE_POLL_INTERVAL_MS", file_vars, &env_lookup)
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(DEFAULT_POLL_INTERVAL_MS);
    let poll_attempts = lookup_value("GRABTUBE_POLL_ATTEMPTS", file_vars, &env_lookup)
        .and_then(|value| value.parse::<u32>().ok())
        .filter(|attempts| *attempts > 0)
        .unwrap_or(DEFAULT_POLL_ATTEMPTS);

    Ok(RelaySettings {
        relay_host,
        relay_port,
        cobalt_url,
        converter_url,
        converter_alt_url,
        fallback_url,
        poll_interval: Duration::from_millis(poll_interval_ms),
        poll_attempts,
    })
}

/// Provider endpoints are plain strings; a blank value means "use the
/// default", and trailing slashes are dropped so path joining stays uniform.
fn endpoint_value(
    key: &str,
    default: &str,
    file_vars: &HashMap<String, String>,
    env_lookup: &impl Fn(&str) -> Option<String>,
) -> String {
    lookup_value(key, file_vars, env_lookup)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| default.to_string())
        .trim_end_matches('/')
        .to_string()
}

fn env_var_string(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn lookup_value(
    key: &str,
    file_vars: &HashMap<String, String>,
    env_lookup: &impl Fn(&str) -> Option<String>,
) -> Option<String> {
    env_lookup(key).or_else(|| file_vars.get(key).cloned())
}

pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    let mut vars = HashMap::new();
    if !path.exists() {
        return Ok(vars);
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let line = trimmed.strip_prefix("export ").unwrap_or(trimmed);
        let Some((key, value_raw)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = value_raw.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|value| value.strip_suffix('"'))
            .or_else(|| {
                value
                    .strip_prefix('\'')
                    .and_then(|value| value.strip_suffix('\''))
            })
            .unwrap_or(value);
        vars.insert(key.to_string(), value.to_string());
    }
    Ok(vars)
}
