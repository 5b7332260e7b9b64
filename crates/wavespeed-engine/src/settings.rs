use std::path::PathBuf;
use std::time::Duration;

use wavespeed_contracts::env::SecretSource;
use wavespeed_contracts::models::NATIVE_BASE_URL;

use crate::tasks::PollPolicy;

pub const POLL_INTERVAL_ENV: &str = "WAVESPEED_POLL_INTERVAL_MS";
pub const POLL_TIMEOUT_ENV: &str = "WAVESPEED_POLL_TIMEOUT_SECS";
pub const POLL_RETRIES_ENV: &str = "WAVESPEED_POLL_RETRIES";
pub const CACHE_DIR_ENV: &str = "WAVESPEED_CACHE_DIR";
pub const API_BASE_ENV: &str = "WAVESPEED_API_BASE";

/// Runtime knobs read from the environment, clamped to sane ranges.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub poll: PollPolicy,
    pub cache_dir: PathBuf,
    /// Native API origin used for catalogue fetches.
    pub api_base: String,
}

impl EngineSettings {
    pub fn from_env(env: &dyn SecretSource) -> Self {
        let poll = PollPolicy {
            interval: Duration::from_millis(clamped(env, POLL_INTERVAL_ENV, 2_000, 100, 30_000)),
            timeout: Duration::from_secs(clamped(env, POLL_TIMEOUT_ENV, 600, 5, 3_600)),
            max_retries: clamped(env, POLL_RETRIES_ENV, 3, 0, 10) as u32,
            ..PollPolicy::default()
        };
        let cache_dir = env
            .get(CACHE_DIR_ENV)
            .map(PathBuf::from)
            .or_else(|| {
                env.get("HOME")
                    .map(|home| PathBuf::from(home).join(".cache").join("wavespeed"))
            })
            .unwrap_or_else(|| std::env::temp_dir().join("wavespeed"));
        let api_base = env
            .get(API_BASE_ENV)
            .map(|value| value.trim_end_matches('/').to_string())
            .unwrap_or_else(|| NATIVE_BASE_URL.to_string());
        Self {
            poll,
            cache_dir,
            api_base,
        }
    }
}

fn clamped(env: &dyn SecretSource, name: &str, default: u64, min: u64, max: u64) -> u64 {
    let Some(raw) = env.get(name) else {
        return default;
    };
    match raw.trim().parse::<u64>() {
        Ok(value) => value.clamp(min, max),
        Err(_) => {
            tracing::warn!(name, value = %raw, default, "ignoring non-numeric setting");
            default
        }
    }
}
