use std::path::Path;

use anyhow::Context;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const CACHE_SCHEMA_VERSION: u32 = 2;
pub const CACHE_FILE_NAME: &str = "models-cache.json";
pub const DESCRIPTION_MAX_CHARS: usize = 150;

/// Compact projection of one remote catalogue entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedModel {
    pub model_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub model_type: String,
    pub base_price: f64,
    pub description: String,
}

impl CachedModel {
    /// Projects a raw catalogue row. Rows without an id are skipped.
    pub fn from_remote(row: &Value) -> Option<Self> {
        let obj = row.as_object()?;
        let text = |keys: &[&str]| {
            keys.iter()
                .filter_map(|key| obj.get(*key).and_then(Value::as_str))
                .map(str::trim)
                .find(|value| !value.is_empty())
                .map(str::to_string)
        };
        let model_id = text(&["model_id", "modelId", "id"])?;
        let name = text(&["name", "title"]).unwrap_or_else(|| model_id.clone());
        let model_type = text(&["type", "model_type"]).unwrap_or_else(|| "unknown".to_string());
        let base_price = ["base_price", "basePrice", "price"]
            .iter()
            .filter_map(|key| obj.get(*key))
            .find_map(price_value)
            .unwrap_or(0.0);
        let description = truncate_chars(
            &text(&["description"]).unwrap_or_default(),
            DESCRIPTION_MAX_CHARS,
        );
        Some(Self {
            model_id,
            name,
            model_type,
            base_price,
            description,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelCacheSnapshot {
    pub version: u32,
    /// Epoch milliseconds of the live fetch that produced this snapshot.
    pub fetched_at: u64,
    pub ttl_ms: u64,
    pub model_count: usize,
    /// Type tag to model ids, in catalogue order.
    pub type_index: IndexMap<String, Vec<String>>,
    pub models: Vec<CachedModel>,
}

impl ModelCacheSnapshot {
    pub fn build(models: Vec<CachedModel>, fetched_at: u64, ttl_ms: u64) -> Self {
        let mut type_index: IndexMap<String, Vec<String>> = IndexMap::new();
        for model in &models {
            type_index
                .entry(model.model_type.clone())
                .or_default()
                .push(model.model_id.clone());
        }
        Self {
            version: CACHE_SCHEMA_VERSION,
            fetched_at,
            ttl_ms,
            model_count: models.len(),
            type_index,
            models,
        }
    }

    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.fetched_at)
    }

    pub fn get(&self, model_id: &str) -> Option<&CachedModel> {
        self.models.iter().find(|model| model.model_id == model_id)
    }
}

/// Loads a snapshot file. Missing, unreadable or other-version files read
/// as absent.
pub fn read_snapshot(path: &Path) -> Option<ModelCacheSnapshot> {
    let raw = std::fs::read_to_string(path).ok()?;
    let parsed: Value = serde_json::from_str(&raw).ok()?;
    let version = parsed.get("version").and_then(Value::as_u64);
    if version != Some(CACHE_SCHEMA_VERSION as u64) {
        tracing::debug!(
            path = %path.display(),
            ?version,
            "ignoring model cache file with incompatible version"
        );
        return None;
    }
    serde_json::from_value(parsed).ok()
}

pub fn write_snapshot(path: &Path, snapshot: &ModelCacheSnapshot) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed creating {}", parent.display()))?;
    }
    let payload = serde_json::to_string_pretty(snapshot).context("failed encoding model cache")?;
    std::fs::write(path, payload).with_context(|| format!("failed writing {}", path.display()))?;
    Ok(())
}

fn price_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(raw) => raw.trim().trim_start_matches('$').parse::<f64>().ok(),
        _ => None,
    }
}

fn truncate_chars(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars.saturating_sub(1)).collect::<String>() + "…"
}
