use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const NATIVE_BASE_URL: &str = "https://api.wavespeed.ai/api/v3";
pub const NATIVE_API_KEY_ENV: &str = "WAVESPEED_API_KEY";
pub const DEFAULT_MODEL_ID: &str = "default";
pub const DEFAULT_MODEL_NAME: &str = "bytedance/seedream-v4";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Provider {
    #[serde(rename = "wavespeed", alias = "wavespeed-native")]
    WavespeedNative,
    #[serde(rename = "openai")]
    OpenAi,
    #[serde(rename = "openai-compatible")]
    OpenAiCompatible,
    #[serde(rename = "custom")]
    Custom,
}

impl Provider {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::WavespeedNative => "wavespeed",
            Self::OpenAi => "openai",
            Self::OpenAiCompatible => "openai-compatible",
            Self::Custom => "custom",
        }
    }

    pub fn is_native(self) -> bool {
        self == Self::WavespeedNative
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Secret API key. Formatting never reveals more than the last four
/// characters.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn redacted(&self) -> String {
        let count = self.0.chars().count();
        if count <= 4 {
            return "****".to_string();
        }
        let tail: String = self.0.chars().skip(count - 4).collect();
        format!("****{tail}")
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ApiKey({})", self.redacted())
    }
}

impl fmt::Display for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}

/// Fully resolved, ready-to-use target for one API call.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelDescriptor {
    pub id: String,
    pub provider: Provider,
    pub base_url: String,
    pub api_key: ApiKey,
    pub api_key_env_name: String,
    pub model_name: Option<String>,
    /// Provider-specific pass-through parameters merged into payloads.
    pub request_defaults: Map<String, Value>,
    pub sourced_from_config: bool,
}

impl ModelDescriptor {
    /// Remote model identifier sent in payloads and used for endpoint paths.
    pub fn remote_model(&self) -> &str {
        self.model_name.as_deref().unwrap_or(self.id.as_str())
    }

    pub fn base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelOrigin {
    Config,
    Registry,
    Builtin,
}

/// Display row for model listings. Gaps are empty strings, never errors.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedModelSummary {
    pub id: String,
    pub provider: Provider,
    pub base_url: String,
    pub api_key_env_name: String,
    pub model_name: String,
    pub has_api_key: bool,
    pub origin: ModelOrigin,
    pub is_global_default: bool,
    pub default_for_commands: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelListing {
    pub models: Vec<ResolvedModelSummary>,
    pub source: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::{ApiKey, Provider};

    #[test]
    fn api_key_formatting_is_redacted() {
        let key = ApiKey::new("sk-abcdef123456");
        assert_eq!(format!("{key}"), "****3456");
        assert_eq!(format!("{key:?}"), "ApiKey(****3456)");
        assert_eq!(ApiKey::new("abc").redacted(), "****");
        assert_eq!(key.expose(), "sk-abcdef123456");
    }

    #[test]
    fn provider_tags_round_trip_through_serde() -> anyhow::Result<()> {
        let native: Provider = serde_json::from_str("\"wavespeed-native\"")?;
        assert_eq!(native, Provider::WavespeedNative);
        let compat: Provider = serde_json::from_str("\"openai-compatible\"")?;
        assert_eq!(compat, Provider::OpenAiCompatible);
        assert_eq!(serde_json::to_string(&Provider::WavespeedNative)?, "\"wavespeed\"");
        assert!(serde_json::from_str::<Provider>("\"replicate\"").is_err());
        Ok(())
    }
}
