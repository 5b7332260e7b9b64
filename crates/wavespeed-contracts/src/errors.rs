use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigErrorKind {
    UnknownModel,
    InvalidDefaultCommand,
    InvalidDefaultGlobal,
    MissingBaseUrl,
    MissingApiKeyEnv,
    MissingSecret,
}

impl ConfigErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UnknownModel => "unknown_model",
            Self::InvalidDefaultCommand => "invalid_default_command",
            Self::InvalidDefaultGlobal => "invalid_default_global",
            Self::MissingBaseUrl => "missing_base_url",
            Self::MissingApiKeyEnv => "missing_api_key_env",
            Self::MissingSecret => "missing_secret",
        }
    }

    pub fn exit_hint(self) -> ExitHint {
        match self {
            Self::MissingSecret => ExitHint::Secret,
            _ => ExitHint::Configuration,
        }
    }
}

impl fmt::Display for ConfigErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which class of user action fixes the error. The outermost adapter maps
/// this to an exit code or protocol error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitHint {
    /// The configuration file or a model id must be corrected.
    Configuration,
    /// An environment variable must be set.
    Secret,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} [{kind}]")]
pub struct ConfigurationError {
    pub kind: ConfigErrorKind,
    pub model_id: Option<String>,
    pub message: String,
}

impl ConfigurationError {
    pub fn new(kind: ConfigErrorKind, model_id: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            kind,
            model_id: model_id.map(str::to_string),
            message: message.into(),
        }
    }

    pub fn exit_hint(&self) -> ExitHint {
        self.kind.exit_hint()
    }

    pub fn is_missing_secret(&self) -> bool {
        self.kind == ConfigErrorKind::MissingSecret
    }
}
