use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde_json::Value;
use wavespeed_contracts::catalog::{CatalogSource, POPULAR_PAGE_URL};

use crate::transport::{truncate_text, Transport};

/// Live catalogue and popular-page fetches over the engine transport.
pub struct HttpCatalogSource {
    transport: Arc<dyn Transport>,
    api_base: String,
}

impl HttpCatalogSource {
    pub fn new(transport: Arc<dyn Transport>, api_base: impl Into<String>) -> Self {
        Self {
            transport,
            api_base: api_base.into(),
        }
    }
}

impl CatalogSource for HttpCatalogSource {
    fn fetch_models(&self, api_key: &str) -> Result<Vec<Value>> {
        let url = format!("{}/models", self.api_base.trim_end_matches('/'));
        let reply = self.transport.get_text(&url, Some(api_key))?;
        if !reply.is_success() {
            bail!(
                "model catalogue request failed ({}): {}",
                reply.status,
                truncate_text(&reply.body, 512)
            );
        }
        let parsed: Value =
            serde_json::from_str(&reply.body).context("model catalogue returned invalid JSON")?;
        catalogue_rows(parsed)
    }

    fn fetch_popular_page(&self) -> Result<String> {
        let reply = self.transport.get_text(POPULAR_PAGE_URL, None)?;
        if !reply.is_success() {
            bail!("popular models page request failed ({})", reply.status);
        }
        Ok(reply.body)
    }
}

/// Accepts `[...]`, `{data: [...]}` and `{data: {items: [...]}}`.
fn catalogue_rows(value: Value) -> Result<Vec<Value>> {
    match value {
        Value::Array(rows) => Ok(rows),
        Value::Object(mut obj) => match obj.remove("data") {
            Some(Value::Array(rows)) => Ok(rows),
            Some(Value::Object(mut data)) => match data.remove("items") {
                Some(Value::Array(rows)) => Ok(rows),
                _ => bail!("model catalogue payload has no model list"),
            },
            _ => bail!("model catalogue payload has no model list"),
        },
        _ => bail!("model catalogue payload has no model list"),
    }
}
