//! User model configuration: aliases, per-command defaults and the file
//! loader that produces them.
//!
//! Only the shape is validated here. Whether a default points at a known
//! model is decided during resolution.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{bail, Context, Result};
use indexmap::IndexMap;
use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::env::SecretSource;
use crate::models::Provider;

pub const CONFIG_ENV: &str = "WAVESPEED_CONFIG";
pub const LOCAL_CONFIG_FILE: &str = "wavespeed.config.json";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelAlias {
    pub provider: Provider,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default, alias = "apiKeyEnv")]
    pub api_key_env_name: Option<String>,
    #[serde(default, alias = "model")]
    pub model_name: Option<String>,
    #[serde(default)]
    pub request_defaults: Map<String, Value>,
}

impl ModelAlias {
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            base_url: None,
            api_key_env_name: None,
            model_name: None,
            request_defaults: Map::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelDefaults {
    #[serde(default)]
    pub global_model: Option<String>,
    #[serde(default)]
    pub commands: IndexMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelConfig {
    #[serde(default)]
    pub models: IndexMap<String, ModelAlias>,
    #[serde(default)]
    pub defaults: Option<ModelDefaults>,
}

impl ModelConfig {
    pub fn command_default(&self, command: &str) -> Option<&str> {
        self.defaults
            .as_ref()
            .and_then(|defaults| defaults.commands.get(command))
            .map(|id| id.trim())
            .filter(|id| !id.is_empty())
    }

    pub fn global_default(&self) -> Option<&str> {
        self.defaults
            .as_ref()
            .and_then(|defaults| defaults.global_model.as_deref())
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }

    /// Commands whose configured default is `id`.
    pub fn commands_defaulting_to(&self, id: &str) -> Vec<String> {
        self.defaults
            .as_ref()
            .map(|defaults| {
                defaults
                    .commands
                    .iter()
                    .filter(|(_, model)| model.trim() == id)
                    .map(|(command, _)| command.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadedConfig {
    pub path: PathBuf,
    pub config: ModelConfig,
}

/// Parses a configuration document and expands `${VAR}` references in
/// `baseUrl` and `modelName`.
pub fn parse_config(raw: &str, env: &dyn SecretSource) -> Result<ModelConfig> {
    let mut config: ModelConfig =
        serde_json::from_str(raw).context("invalid model configuration JSON")?;
    for alias in config.models.values_mut() {
        alias.base_url = alias
            .base_url
            .as_deref()
            .map(|value| interpolate_env(value, env))
            .filter(|value| !value.trim().is_empty());
        alias.model_name = alias
            .model_name
            .as_deref()
            .map(|value| interpolate_env(value, env))
            .filter(|value| !value.trim().is_empty());
        alias.api_key_env_name = alias
            .api_key_env_name
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string);
    }
    Ok(config)
}

pub fn load_config(path: &Path, env: &dyn SecretSource) -> Result<LoadedConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed reading config {}", path.display()))?;
    let config =
        parse_config(&raw, env).with_context(|| format!("failed parsing {}", path.display()))?;
    Ok(LoadedConfig {
        path: path.to_path_buf(),
        config,
    })
}

/// Finds and loads the configuration file, if any.
///
/// Order: explicit path, `WAVESPEED_CONFIG`, `./wavespeed.config.json`,
/// `$HOME/.config/wavespeed/config.json`. An explicit or env-provided path
/// must exist; the conventional locations are optional.
pub fn discover_config(
    explicit: Option<&Path>,
    cwd: &Path,
    env: &dyn SecretSource,
) -> Result<Option<LoadedConfig>> {
    if let Some(path) = explicit {
        if !path.is_file() {
            bail!("config file not found: {}", path.display());
        }
        return load_config(path, env).map(Some);
    }
    if let Some(path) = env.get(CONFIG_ENV) {
        let path = PathBuf::from(path);
        if !path.is_file() {
            bail!("{CONFIG_ENV} points at a missing file: {}", path.display());
        }
        return load_config(&path, env).map(Some);
    }

    let mut candidates = vec![cwd.join(LOCAL_CONFIG_FILE)];
    if let Some(home) = env.get("HOME") {
        candidates.push(
            PathBuf::from(home)
                .join(".config")
                .join("wavespeed")
                .join("config.json"),
        );
    }
    for candidate in candidates {
        if candidate.is_file() {
            tracing::debug!(path = %candidate.display(), "using model configuration");
            return load_config(&candidate, env).map(Some);
        }
    }
    Ok(None)
}

fn interpolate_env(raw: &str, env: &dyn SecretSource) -> String {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("env reference pattern compiles")
    });
    pattern
        .replace_all(raw, |caps: &regex::Captures<'_>| {
            env.get(&caps[1]).unwrap_or_default()
        })
        .trim()
        .to_string()
}
