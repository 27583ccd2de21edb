use std::{collections::HashMap, fs, path::Path, time::Duration};

use anyhow::{bail, Context};
use console_core::{Routes, Timings};
use serde::Deserialize;

const DEFAULT_CONFIG_FILE: &str = "console.toml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Settings {
    pub debounce_ms: u64,
    pub grace_period_ms: u64,
    pub redirect_delay_ms: u64,
    pub login_path: String,
    pub home_path: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            debounce_ms: 700,
            grace_period_ms: 150,
            redirect_delay_ms: 2000,
            login_path: "/login".into(),
            home_path: "/".into(),
        }
    }
}

impl Settings {
    pub fn timings(&self) -> Timings {
        Timings {
            debounce_window: Duration::from_millis(self.debounce_ms),
            grace_period: Duration::from_millis(self.grace_period_ms),
            redirect_delay: Duration::from_millis(self.redirect_delay_ms),
        }
    }

    pub fn routes(&self) -> Routes {
        Routes {
            login: self.login_path.clone(),
            home: self.home_path.clone(),
        }
    }
}

/// Defaults, then `console.toml` (or the explicit file), then the environment.
pub fn load_settings(config_path: Option<&Path>) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();

    match config_path {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("failed to read config file '{}'", path.display()))?;
            apply_file(&mut settings, &raw)
                .with_context(|| format!("invalid config file '{}'", path.display()))?;
        }
        None => {
            if let Ok(raw) = fs::read_to_string(DEFAULT_CONFIG_FILE) {
                apply_file(&mut settings, &raw)
                    .with_context(|| format!("invalid config file '{DEFAULT_CONFIG_FILE}'"))?;
            }
        }
    }

    apply_env(&mut settings, |key| std::env::var(key).ok())?;
    Ok(settings)
}

fn apply_file(settings: &mut Settings, raw: &str) -> anyhow::Result<()> {
    let file_cfg: HashMap<String, toml::Value> = toml::from_str(raw)?;

    for (key, value) in &file_cfg {
        let value = match value {
            toml::Value::String(v) => v.clone(),
            toml::Value::Integer(v) => v.to_string(),
            other => bail!("'{key}' must be a string or an integer, got {}", other.type_str()),
        };
        apply_value(settings, key, &value)?;
    }
    Ok(())
}

fn apply_env(
    settings: &mut Settings,
    lookup: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<()> {
    for key in ["debounce_ms", "grace_period_ms", "redirect_delay_ms", "login_path", "home_path"] {
        let upper = key.to_ascii_uppercase();
        // APP__ wins over CONSOLE_ when both are set.
        for var in [format!("CONSOLE_{upper}"), format!("APP__{upper}")] {
            if let Some(v) = lookup(&var) {
                apply_value(settings, key, &v).with_context(|| format!("invalid {var}"))?;
            }
        }
    }
    Ok(())
}

fn apply_value(settings: &mut Settings, key: &str, value: &str) -> anyhow::Result<()> {
    match key {
        "debounce_ms" => settings.debounce_ms = parse_ms(value)?,
        "grace_period_ms" => settings.grace_period_ms = parse_ms(value)?,
        "redirect_delay_ms" => settings.redirect_delay_ms = parse_ms(value)?,
        "login_path" => settings.login_path = parse_path(value)?,
        "home_path" => settings.home_path = parse_path(value)?,
        other => tracing::warn!(key = other, "ignoring unknown config key"),
    }
    Ok(())
}

fn parse_ms(value: &str) -> anyhow::Result<u64> {
    value
        .trim()
        .parse::<u64>()
        .with_context(|| format!("'{value}' is not a number of milliseconds"))
}

fn parse_path(value: &str) -> anyhow::Result<String> {
    let value = value.trim();
    if !value.starts_with('/') {
        bail!("route '{value}' must start with '/'");
    }
    Ok(value.to_string())
}
