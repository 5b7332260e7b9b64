use std::path::Path;

use serde_json::Map;

use super::descriptor::{
    ApiKey, ModelDescriptor, ModelListing, ModelOrigin, Provider, ResolvedModelSummary,
    DEFAULT_MODEL_ID, DEFAULT_MODEL_NAME, NATIVE_API_KEY_ENV, NATIVE_BASE_URL,
};
use super::registry::ModelRegistry;
use crate::config::{ModelAlias, ModelConfig};
use crate::env::SecretSource;
use crate::errors::{ConfigErrorKind, ConfigurationError};

/// Turns a command name, an optional explicit model id and the user
/// configuration into a [`ModelDescriptor`].
///
/// Precedence, first match wins: explicit id, `defaults.commands[command]`,
/// `defaults.globalModel`, then the built-in native model. Every level looks
/// the id up in the config aliases first and the registry second.
pub struct ModelResolver<'a> {
    registry: &'a ModelRegistry,
    env: &'a dyn SecretSource,
}

#[derive(Debug, Clone, Copy)]
enum Level<'c> {
    Explicit,
    Command(&'c str),
    Global,
}

impl Level<'_> {
    fn missing_kind(self) -> ConfigErrorKind {
        match self {
            Self::Explicit => ConfigErrorKind::UnknownModel,
            Self::Command(_) => ConfigErrorKind::InvalidDefaultCommand,
            Self::Global => ConfigErrorKind::InvalidDefaultGlobal,
        }
    }

    fn missing_message(self, id: &str) -> String {
        match self {
            Self::Explicit => format!(
                "Unknown model '{id}': not defined under \"models\" in the config and not a registry model."
            ),
            Self::Command(command) => format!(
                "Default model '{id}' for command '{command}' is not defined in the config or registry."
            ),
            Self::Global => format!(
                "Global default model '{id}' is not defined in the config or registry."
            ),
        }
    }
}

/// One entry before normalization, from whichever table matched.
struct Candidate<'a> {
    id: &'a str,
    provider: Provider,
    base_url: Option<&'a str>,
    api_key_env_name: Option<&'a str>,
    model_name: Option<&'a str>,
    request_defaults: Map<String, serde_json::Value>,
    origin: ModelOrigin,
}

impl<'a> Candidate<'a> {
    fn from_alias(id: &'a str, alias: &'a ModelAlias) -> Self {
        Self {
            id,
            provider: alias.provider,
            base_url: non_blank(alias.base_url.as_deref()),
            api_key_env_name: non_blank(alias.api_key_env_name.as_deref()),
            model_name: non_blank(alias.model_name.as_deref()),
            request_defaults: alias.request_defaults.clone(),
            origin: ModelOrigin::Config,
        }
    }

    fn builtin() -> Self {
        Self {
            id: DEFAULT_MODEL_ID,
            provider: Provider::WavespeedNative,
            base_url: Some(NATIVE_BASE_URL),
            api_key_env_name: Some(NATIVE_API_KEY_ENV),
            model_name: Some(DEFAULT_MODEL_NAME),
            request_defaults: Map::new(),
            origin: ModelOrigin::Builtin,
        }
    }

    /// Native entries get the well-known origin and variable; everything
    /// else must spell both out.
    fn endpoint(&self) -> Result<(String, String), ConfigurationError> {
        if self.provider.is_native() {
            return Ok((
                self.base_url.unwrap_or(NATIVE_BASE_URL).to_string(),
                self.api_key_env_name.unwrap_or(NATIVE_API_KEY_ENV).to_string(),
            ));
        }
        let Some(base_url) = self.base_url else {
            return Err(ConfigurationError::new(
                ConfigErrorKind::MissingBaseUrl,
                Some(self.id),
                format!(
                    "Model '{}' uses provider '{}' and must set \"baseUrl\".",
                    self.id, self.provider
                ),
            ));
        };
        let Some(env_name) = self.api_key_env_name else {
            return Err(ConfigurationError::new(
                ConfigErrorKind::MissingApiKeyEnv,
                Some(self.id),
                format!(
                    "Model '{}' uses provider '{}' and must set \"apiKeyEnv\".",
                    self.id, self.provider
                ),
            ));
        };
        Ok((base_url.to_string(), env_name.to_string()))
    }
}

impl<'a> ModelResolver<'a> {
    pub fn new(registry: &'a ModelRegistry, env: &'a dyn SecretSource) -> Self {
        Self { registry, env }
    }

    pub fn resolve(
        &self,
        command: &str,
        explicit: Option<&str>,
        config: Option<&ModelConfig>,
    ) -> Result<ModelDescriptor, ConfigurationError> {
        if let Some(id) = non_blank(explicit) {
            return self.lookup(id, config, Level::Explicit);
        }
        if let Some(config) = config {
            if let Some(id) = config.command_default(command) {
                return self.lookup(id, Some(config), Level::Command(command));
            }
            if let Some(id) = config.global_default() {
                return self.lookup(id, Some(config), Level::Global);
            }
        }
        self.finalize(Candidate::builtin())
    }

    fn lookup(
        &self,
        id: &str,
        config: Option<&ModelConfig>,
        level: Level<'_>,
    ) -> Result<ModelDescriptor, ConfigurationError> {
        let candidate = self.candidate(id, config).ok_or_else(|| {
            ConfigurationError::new(level.missing_kind(), Some(id), level.missing_message(id))
        })?;
        let resolved = self.finalize(candidate)?;
        tracing::debug!(
            model = %resolved.id,
            provider = %resolved.provider,
            base_url = %resolved.base_url,
            "resolved model"
        );
        Ok(resolved)
    }

    fn candidate<'c>(&'c self, id: &'c str, config: Option<&'c ModelConfig>) -> Option<Candidate<'c>> {
        if let Some((key, alias)) = config.and_then(|config| config.models.get_key_value(id)) {
            return Some(Candidate::from_alias(key.as_str(), alias));
        }
        if let Some(model) = self.registry.get(id) {
            return Some(Candidate {
                id: model.id.as_str(),
                provider: model.provider,
                base_url: non_blank(model.base_url.as_deref()),
                api_key_env_name: None,
                model_name: non_blank(Some(model.model_name.as_str())),
                request_defaults: Map::new(),
                origin: ModelOrigin::Registry,
            });
        }
        (id == DEFAULT_MODEL_ID).then(Candidate::builtin)
    }

    fn finalize(&self, candidate: Candidate<'_>) -> Result<ModelDescriptor, ConfigurationError> {
        let (base_url, api_key_env_name) = candidate.endpoint()?;
        let Some(secret) = self.env.get(&api_key_env_name) else {
            return Err(ConfigurationError::new(
                ConfigErrorKind::MissingSecret,
                Some(candidate.id),
                format!(
                    "Environment variable {api_key_env_name} is not set (required by model '{}').",
                    candidate.id
                ),
            ));
        };
        Ok(ModelDescriptor {
            id: candidate.id.to_string(),
            provider: candidate.provider,
            base_url,
            api_key: ApiKey::new(secret),
            api_key_env_name,
            model_name: candidate.model_name.map(str::to_string),
            request_defaults: candidate.request_defaults,
            sourced_from_config: candidate.origin == ModelOrigin::Config,
        })
    }

    /// Summaries of every configured, registry and built-in model. Never
    /// fails: unresolvable gaps are shown as empty strings.
    pub fn list_models(&self, config: Option<&ModelConfig>, source: Option<&Path>) -> ModelListing {
        let global_default = config.and_then(ModelConfig::global_default);
        let mut models = Vec::new();

        if let Some(config) = config {
            for (id, alias) in &config.models {
                models.push(self.summarize(Candidate::from_alias(id, alias), config, global_default));
            }
        }
        let empty = ModelConfig::default();
        let lookup_config = config.unwrap_or(&empty);
        for model in self.registry.list() {
            if lookup_config.models.contains_key(&model.id) {
                continue;
            }
            if let Some(candidate) = self.candidate(&model.id, None) {
                models.push(self.summarize(candidate, lookup_config, global_default));
            }
        }
        let mut builtin = self.summarize(Candidate::builtin(), lookup_config, global_default);
        builtin.is_global_default = global_default.is_none();
        models.push(builtin);

        ModelListing {
            models,
            source: source.map(|path| path.display().to_string()),
        }
    }

    fn summarize(
        &self,
        candidate: Candidate<'_>,
        config: &ModelConfig,
        global_default: Option<&str>,
    ) -> ResolvedModelSummary {
        let (base_url, api_key_env_name) = if candidate.provider.is_native() {
            (
                candidate.base_url.unwrap_or(NATIVE_BASE_URL).to_string(),
                candidate.api_key_env_name.unwrap_or(NATIVE_API_KEY_ENV).to_string(),
            )
        } else {
            (
                candidate.base_url.unwrap_or_default().to_string(),
                candidate.api_key_env_name.unwrap_or_default().to_string(),
            )
        };
        let has_api_key = !api_key_env_name.is_empty() && self.env.get(&api_key_env_name).is_some();
        ResolvedModelSummary {
            id: candidate.id.to_string(),
            provider: candidate.provider,
            base_url,
            api_key_env_name,
            model_name: candidate.model_name.unwrap_or_default().to_string(),
            has_api_key,
            origin: candidate.origin,
            is_global_default: global_default == Some(candidate.id),
            default_for_commands: config.commands_defaulting_to(candidate.id),
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}
