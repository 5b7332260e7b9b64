use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;

use super::popular::{
    fallback_popular_ids, parse_popular_page, RecommendedModel, FALLBACK_POPULAR_MODELS,
    RECOMMENDED_MAX, RECOMMENDED_MIN,
};
use super::snapshot::{
    read_snapshot, write_snapshot, CachedModel, ModelCacheSnapshot, CACHE_FILE_NAME,
};
use crate::clock::Clock;

pub const DEFAULT_MEMORY_TTL: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_FILE_TTL: Duration = Duration::from_secs(24 * 60 * 60);
pub const DEFAULT_POPULAR_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Where the live catalogue and the popular-models page come from.
pub trait CatalogSource: Send + Sync {
    /// Raw catalogue rows.
    fn fetch_models(&self, api_key: &str) -> Result<Vec<Value>>;
    /// HTML of the public model listing page.
    fn fetch_popular_page(&self) -> Result<String>;
}

#[derive(Debug, Clone)]
pub struct ModelCacheOptions {
    pub cache_dir: PathBuf,
    pub memory_ttl: Duration,
    pub file_ttl: Duration,
    pub popular_ttl: Duration,
}

impl ModelCacheOptions {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            memory_ttl: DEFAULT_MEMORY_TTL,
            file_ttl: DEFAULT_FILE_TTL,
            popular_ttl: DEFAULT_POPULAR_TTL,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheSource {
    Memory,
    File,
    Live,
    /// A refresh failed and an older snapshot was served instead.
    Stale,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelFilter {
    pub model_type: Option<String>,
    pub query: Option<String>,
    pub max_price: Option<f64>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub last_source: Option<CacheSource>,
    pub model_count: usize,
    pub fetched_at: Option<u64>,
    pub snapshot_age_ms: Option<u64>,
    pub popular_count: usize,
    pub cache_path: String,
    pub memory_ttl_ms: u64,
    pub file_ttl_ms: u64,
}

#[derive(Debug, Clone)]
struct PopularList {
    ids: Vec<String>,
    fetched_at: u64,
}

/// Two-tier (memory, then file) cache of the remote model catalogue.
///
/// One instance is owned by the composition root and shared by every call
/// site in the process. Reads never block on each other; queries only look
/// at the snapshot already held in memory.
pub struct ModelCache {
    source: Arc<dyn CatalogSource>,
    clock: Arc<dyn Clock>,
    options: ModelCacheOptions,
    snapshot: Option<ModelCacheSnapshot>,
    /// `None` while the held snapshot is only a stale placeholder.
    memory_loaded_at: Option<u64>,
    popular: Option<PopularList>,
    hits: u64,
    misses: u64,
    last_source: Option<CacheSource>,
}

impl ModelCache {
    pub fn new(
        source: Arc<dyn CatalogSource>,
        clock: Arc<dyn Clock>,
        options: ModelCacheOptions,
    ) -> Self {
        Self {
            source,
            clock,
            options,
            snapshot: None,
            memory_loaded_at: None,
            popular: None,
            hits: 0,
            misses: 0,
            last_source: None,
        }
    }

    pub fn cache_path(&self) -> PathBuf {
        self.options.cache_dir.join(CACHE_FILE_NAME)
    }

    pub fn get_models(&mut self, api_key: &str, force_refresh: bool) -> Result<Vec<CachedModel>> {
        if force_refresh {
            self.misses += 1;
            self.refresh(api_key)?;
            return Ok(self.held_models());
        }

        let now = self.clock.now_ms();
        let memory_ttl = ttl_ms(self.options.memory_ttl);
        let memory_fresh = self
            .memory_loaded_at
            .is_some_and(|loaded_at| now.saturating_sub(loaded_at) < memory_ttl);
        if self.snapshot.is_some() && memory_fresh {
            self.hits += 1;
            self.last_source = Some(CacheSource::Memory);
            return Ok(self.held_models());
        }

        let path = self.cache_path();
        if let Some(file_snapshot) = read_snapshot(&path) {
            if file_snapshot.age_ms(now) < ttl_ms(self.options.file_ttl) {
                tracing::debug!(path = %path.display(), "model catalogue served from file cache");
                self.adopt(file_snapshot, now);
                self.hits += 1;
                self.last_source = Some(CacheSource::File);
                return Ok(self.held_models());
            }
            if self.snapshot.is_none() {
                tracing::debug!(
                    path = %path.display(),
                    "file cache is stale; holding it while refreshing"
                );
                self.snapshot = Some(file_snapshot);
                self.memory_loaded_at = None;
            }
        }

        self.misses += 1;
        self.refresh(api_key)?;
        Ok(self.held_models())
    }

    /// Fetches the live catalogue and replaces the snapshot. Falls back to
    /// the held snapshot when the fetch fails and one exists.
    fn refresh(&mut self, api_key: &str) -> Result<()> {
        let rows = match self.source.fetch_models(api_key) {
            Ok(rows) => rows,
            Err(err) if self.snapshot.is_some() => {
                tracing::warn!(
                    error = %format!("{err:#}"),
                    "model catalogue refresh failed; serving cached snapshot"
                );
                self.last_source = Some(CacheSource::Stale);
                return Ok(());
            }
            Err(err) => return Err(err.context("failed to fetch model catalogue")),
        };

        let now = self.clock.now_ms();
        let models: Vec<CachedModel> = rows.iter().filter_map(CachedModel::from_remote).collect();
        let snapshot = ModelCacheSnapshot::build(models, now, ttl_ms(self.options.file_ttl));
        tracing::info!(models = snapshot.model_count, "model catalogue refreshed");

        let path = self.cache_path();
        if let Err(err) = write_snapshot(&path, &snapshot) {
            tracing::warn!(
                path = %path.display(),
                error = %format!("{err:#}"),
                "could not persist model cache"
            );
        }
        self.adopt(snapshot, now);
        self.last_source = Some(CacheSource::Live);
        Ok(())
    }

    fn adopt(&mut self, snapshot: ModelCacheSnapshot, now: u64) {
        self.snapshot = Some(snapshot);
        self.memory_loaded_at = Some(now);
    }

    fn held_models(&self) -> Vec<CachedModel> {
        self.snapshot
            .as_ref()
            .map(|snapshot| snapshot.models.clone())
            .unwrap_or_default()
    }

    pub fn snapshot(&self) -> Option<&ModelCacheSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn filter_models(&self, filter: &ModelFilter) -> Vec<CachedModel> {
        let Some(snapshot) = &self.snapshot else {
            return Vec::new();
        };
        let query = filter
            .query
            .as_deref()
            .map(|value| value.trim().to_lowercase())
            .filter(|value| !value.is_empty());
        let rows = snapshot.models.iter().filter(|model| {
            if let Some(model_type) = filter.model_type.as_deref() {
                if !model.model_type.eq_ignore_ascii_case(model_type) {
                    return false;
                }
            }
            if let Some(max_price) = filter.max_price {
                if model.base_price > max_price {
                    return false;
                }
            }
            query
                .as_deref()
                .map(|query| matches_query(model, query))
                .unwrap_or(true)
        });
        match filter.limit {
            Some(limit) => rows.take(limit).cloned().collect(),
            None => rows.cloned().collect(),
        }
    }

    pub fn search_models(&self, query: &str, limit: Option<usize>) -> Vec<CachedModel> {
        self.filter_models(&ModelFilter {
            query: Some(query.to_string()),
            limit,
            ..ModelFilter::default()
        })
    }

    pub fn get_models_by_type(&self, model_type: &str) -> Vec<CachedModel> {
        let Some(snapshot) = &self.snapshot else {
            return Vec::new();
        };
        snapshot
            .type_index
            .get(model_type)
            .map(|ids| ids.iter().filter_map(|id| snapshot.get(id)).cloned().collect())
            .unwrap_or_default()
    }

    /// Model count per type, largest first.
    pub fn get_type_counts(&self) -> Vec<(String, usize)> {
        let Some(snapshot) = &self.snapshot else {
            return Vec::new();
        };
        let mut counts: Vec<(String, usize)> = snapshot
            .type_index
            .iter()
            .map(|(model_type, ids)| (model_type.clone(), ids.len()))
            .collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        counts
    }

    /// Popular models that exist in the catalogue, priced from it, padded
    /// from the fallback list when fewer than three survive. Never fails.
    pub fn get_recommended_models(&mut self, api_key: Option<&str>) -> Vec<RecommendedModel> {
        let popular = self.popular_ids();
        if self.snapshot.is_none() {
            if let Some(api_key) = api_key {
                if let Err(err) = self.get_models(api_key, false) {
                    tracing::warn!(
                        error = %format!("{err:#}"),
                        "catalogue unavailable for recommendations"
                    );
                }
            }
        }

        let snapshot = self.snapshot.as_ref();
        let mut out: Vec<RecommendedModel> = popular
            .iter()
            .filter_map(|id| snapshot.and_then(|snapshot| snapshot.get(id)))
            .take(RECOMMENDED_MAX)
            .map(|model| RecommendedModel {
                model_id: model.model_id.clone(),
                name: model.name.clone(),
                model_type: model.model_type.clone(),
                price: Some(model.base_price),
                from_fallback: false,
            })
            .collect();

        if out.len() < RECOMMENDED_MIN {
            for (id, name, model_type) in FALLBACK_POPULAR_MODELS {
                if out.len() >= RECOMMENDED_MAX {
                    break;
                }
                if out.iter().any(|row| row.model_id == *id) {
                    continue;
                }
                let live = snapshot.and_then(|snapshot| snapshot.get(id));
                out.push(RecommendedModel {
                    model_id: (*id).to_string(),
                    name: live
                        .map(|model| model.name.clone())
                        .unwrap_or_else(|| (*name).to_string()),
                    model_type: live
                        .map(|model| model.model_type.clone())
                        .unwrap_or_else(|| (*model_type).to_string()),
                    price: live.map(|model| model.base_price),
                    from_fallback: true,
                });
            }
        }
        out
    }

    fn popular_ids(&mut self) -> Vec<String> {
        let now = self.clock.now_ms();
        if let Some(popular) = &self.popular {
            if now.saturating_sub(popular.fetched_at) < ttl_ms(self.options.popular_ttl) {
                return popular.ids.clone();
            }
        }
        let ids = match self.source.fetch_popular_page() {
            Ok(html) => {
                let ids = parse_popular_page(&html);
                if ids.is_empty() {
                    tracing::warn!("popular models page had no model links; using fallback list");
                    fallback_popular_ids()
                } else {
                    ids
                }
            }
            Err(err) => {
                tracing::warn!(
                    error = %format!("{err:#}"),
                    "popular models page unavailable; using fallback list"
                );
                fallback_popular_ids()
            }
        };
        self.popular = Some(PopularList {
            ids: ids.clone(),
            fetched_at: now,
        });
        ids
    }

    /// Drops the in-memory state and deletes the cache file.
    pub fn invalidate(&mut self) {
        self.snapshot = None;
        self.popular = None;
        self.memory_loaded_at = None;
        let path = self.cache_path();
        if let Err(err) = remove_file_if_present(&path) {
            tracing::debug!(path = %path.display(), error = %err, "cache file removal failed");
        }
    }

    /// Forgets memory state and counters; the file is left alone.
    pub fn reset(&mut self) {
        self.snapshot = None;
        self.popular = None;
        self.memory_loaded_at = None;
        self.hits = 0;
        self.misses = 0;
        self.last_source = None;
    }

    pub fn get_stats(&self) -> CacheStats {
        let now = self.clock.now_ms();
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            last_source: self.last_source,
            model_count: self
                .snapshot
                .as_ref()
                .map(|snapshot| snapshot.model_count)
                .unwrap_or(0),
            fetched_at: self.snapshot.as_ref().map(|snapshot| snapshot.fetched_at),
            snapshot_age_ms: self.snapshot.as_ref().map(|snapshot| snapshot.age_ms(now)),
            popular_count: self
                .popular
                .as_ref()
                .map(|popular| popular.ids.len())
                .unwrap_or(0),
            cache_path: self.cache_path().display().to_string(),
            memory_ttl_ms: ttl_ms(self.options.memory_ttl),
            file_ttl_ms: ttl_ms(self.options.file_ttl),
        }
    }
}

fn matches_query(model: &CachedModel, query: &str) -> bool {
    model.model_id.to_lowercase().contains(query)
        || model.name.to_lowercase().contains(query)
        || model.description.to_lowercase().contains(query)
}

fn ttl_ms(duration: Duration) -> u64 {
    duration.as_millis() as u64
}

fn remove_file_if_present(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).with_context(|| format!("failed removing {}", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use anyhow::bail;
    use serde_json::{json, Value};

    use super::{CacheSource, CatalogSource, ModelCache, ModelCacheOptions, ModelFilter};
    use crate::catalog::popular::{FALLBACK_POPULAR_MODELS, RECOMMENDED_MIN};
    use crate::catalog::snapshot::{write_snapshot, ModelCacheSnapshot, CACHE_SCHEMA_VERSION};
    use crate::clock::ManualClock;

    const START_MS: u64 = 1_700_000_000_000;

    #[derive(Default)]
    struct FakeSource {
        rows: Mutex<Vec<Value>>,
        fail: AtomicBool,
        fetches: AtomicUsize,
        page: Mutex<Option<String>>,
        page_fetches: AtomicUsize,
    }

    impl FakeSource {
        fn with_rows(rows: Vec<Value>) -> Arc<Self> {
            let source = Self::default();
            *source.rows.lock().unwrap() = rows;
            Arc::new(source)
        }

        fn fetches(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    impl CatalogSource for FakeSource {
        fn fetch_models(&self, _api_key: &str) -> anyhow::Result<Vec<Value>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                bail!("catalogue offline");
            }
            Ok(self.rows.lock().unwrap().clone())
        }

        fn fetch_popular_page(&self) -> anyhow::Result<String> {
            self.page_fetches.fetch_add(1, Ordering::SeqCst);
            match self.page.lock().unwrap().clone() {
                Some(html) => Ok(html),
                None => bail!("page offline"),
            }
        }
    }

    fn catalogue() -> Vec<Value> {
        vec![
            json!({"model_id": "bytedance/seedream-v4", "name": "Seedream v4",
                   "type": "text-to-image", "base_price": 0.027, "description": "ByteDance image model"}),
            json!({"model_id": "bytedance/seedream-v4/edit", "name": "Seedream v4 Edit",
                   "type": "image-to-image", "base_price": 0.027}),
            json!({"model_id": "wavespeed-ai/flux-dev", "name": "FLUX dev",
                   "type": "text-to-image", "base_price": 0.012}),
            json!({"model_id": "wavespeed-ai/wan-2.2/t2v-480p", "name": "WAN",
                   "type": "text-to-video", "base_price": 0.15}),
        ]
    }

    fn cache_for(
        source: &Arc<FakeSource>,
        clock: &Arc<ManualClock>,
        dir: &std::path::Path,
    ) -> ModelCache {
        ModelCache::new(source.clone(), clock.clone(), ModelCacheOptions::new(dir))
    }

    #[test]
    fn memory_tier_serves_repeat_reads() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let source = FakeSource::with_rows(catalogue());
        let clock = Arc::new(ManualClock::new(START_MS));
        let mut cache = cache_for(&source, &clock, temp.path());

        assert_eq!(cache.get_models("key", false)?.len(), 4);
        clock.advance(Duration::from_secs(60));
        assert_eq!(cache.get_models("key", false)?.len(), 4);

        assert_eq!(source.fetches(), 1);
        let stats = cache.get_stats();
        assert_eq!((stats.hits, stats.misses), (1, 1));
        assert_eq!(stats.last_source, Some(CacheSource::Memory));
        assert!(cache.cache_path().is_file());
        Ok(())
    }

    #[test]
    fn file_tier_serves_after_memory_ttl() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let source = FakeSource::with_rows(catalogue());
        let clock = Arc::new(ManualClock::new(START_MS));
        let mut cache = cache_for(&source, &clock, temp.path());

        cache.get_models("key", false)?;
        clock.advance(Duration::from_secs(6 * 60));
        let models = cache.get_models("key", false)?;

        assert_eq!(models.len(), 4);
        assert_eq!(source.fetches(), 1);
        assert_eq!(cache.get_stats().last_source, Some(CacheSource::File));

        let mut fresh_process = cache_for(&source, &clock, temp.path());
        fresh_process.get_models("key", false)?;
        assert_eq!(source.fetches(), 1);
        Ok(())
    }

    #[test]
    fn force_refresh_always_fetches() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let source = FakeSource::with_rows(catalogue());
        let clock = Arc::new(ManualClock::new(START_MS));
        let mut cache = cache_for(&source, &clock, temp.path());

        cache.get_models("key", false)?;
        cache.get_models("key", true)?;
        cache.get_models("key", true)?;
        assert_eq!(source.fetches(), 3);
        assert_eq!(cache.get_stats().misses, 3);
        assert_eq!(cache.get_stats().last_source, Some(CacheSource::Live));
        Ok(())
    }

    #[test]
    fn failed_refresh_serves_stale_snapshot() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let source = FakeSource::with_rows(catalogue());
        let clock = Arc::new(ManualClock::new(START_MS));
        let mut cache = cache_for(&source, &clock, temp.path());

        cache.get_models("key", false)?;
        source.fail.store(true, Ordering::SeqCst);
        clock.advance(Duration::from_secs(25 * 60 * 60));

        let models = cache.get_models("key", false)?;
        assert_eq!(models.len(), 4);
        assert_eq!(source.fetches(), 2);
        assert_eq!(cache.get_stats().last_source, Some(CacheSource::Stale));

        assert_eq!(cache.get_models("key", true)?.len(), 4);
        Ok(())
    }

    #[test]
    fn failed_refresh_without_any_snapshot_is_an_error() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let source = FakeSource::with_rows(catalogue());
        source.fail.store(true, Ordering::SeqCst);
        let clock = Arc::new(ManualClock::new(START_MS));
        let mut cache = cache_for(&source, &clock, temp.path());

        let err = cache.get_models("key", false).err().map(|err| format!("{err:#}"));
        assert!(err.unwrap_or_default().contains("catalogue offline"));
        Ok(())
    }

    #[test]
    fn stale_file_is_held_as_placeholder_during_refresh() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let source = FakeSource::with_rows(catalogue());
        source.fail.store(true, Ordering::SeqCst);
        let clock = Arc::new(ManualClock::new(START_MS));
        let mut cache = cache_for(&source, &clock, temp.path());

        let old = ModelCacheSnapshot::build(
            vec![crate::catalog::CachedModel::from_remote(&json!({"model_id": "old/model"}))
                .expect("row")],
            START_MS - 48 * 60 * 60 * 1000,
            0,
        );
        write_snapshot(&cache.cache_path(), &old)?;

        let models = cache.get_models("key", false)?;
        assert_eq!(source.fetches(), 1);
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].model_id, "old/model");
        Ok(())
    }

    #[test]
    fn placeholder_is_not_treated_as_fresh_memory() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let source = FakeSource::with_rows(catalogue());
        source.fail.store(true, Ordering::SeqCst);
        let clock = Arc::new(ManualClock::new(START_MS));
        let mut cache = cache_for(&source, &clock, temp.path());

        let old = ModelCacheSnapshot::build(
            vec![crate::catalog::CachedModel::from_remote(&json!({"model_id": "old/model"}))
                .expect("row")],
            START_MS - 48 * 60 * 60 * 1000,
            0,
        );
        write_snapshot(&cache.cache_path(), &old)?;
        assert_eq!(cache.get_models("key", false)?.len(), 1);
        assert_eq!(cache.get_stats().last_source, Some(CacheSource::Stale));

        source.fail.store(false, Ordering::SeqCst);
        clock.advance(Duration::from_secs(1));
        let models = cache.get_models("key", false)?;
        assert_eq!(source.fetches(), 2);
        assert_eq!(models.len(), 4);
        assert_eq!(cache.get_stats().last_source, Some(CacheSource::Live));

        clock.advance(Duration::from_secs(1));
        cache.get_models("key", false)?;
        assert_eq!(source.fetches(), 2);
        assert_eq!(cache.get_stats().last_source, Some(CacheSource::Memory));
        Ok(())
    }

    #[test]
    fn incompatible_cache_file_is_ignored() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let source = FakeSource::with_rows(catalogue());
        let clock = Arc::new(ManualClock::new(START_MS));
        let mut cache = cache_for(&source, &clock, temp.path());

        let mut old = ModelCacheSnapshot::build(Vec::new(), START_MS, 0);
        old.version = CACHE_SCHEMA_VERSION + 1;
        write_snapshot(&cache.cache_path(), &old)?;

        assert_eq!(cache.get_models("key", false)?.len(), 4);
        assert_eq!(source.fetches(), 1);
        Ok(())
    }

    #[test]
    fn queries_use_the_held_snapshot_only() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let source = FakeSource::with_rows(catalogue());
        let clock = Arc::new(ManualClock::new(START_MS));
        let mut cache = cache_for(&source, &clock, temp.path());

        assert!(cache.filter_models(&ModelFilter::default()).is_empty());
        assert!(cache.get_type_counts().is_empty());
        assert!(cache.get_models_by_type("text-to-image").is_empty());
        assert_eq!(source.fetches(), 0);

        cache.get_models("key", false)?;
        let by_type: Vec<String> = cache
            .get_models_by_type("text-to-image")
            .into_iter()
            .map(|model| model.model_id)
            .collect();
        assert_eq!(by_type, vec!["bytedance/seedream-v4", "wavespeed-ai/flux-dev"]);

        let cheap = cache.filter_models(&ModelFilter {
            max_price: Some(0.02),
            ..ModelFilter::default()
        });
        assert_eq!(cheap.len(), 1);
        assert_eq!(cache.search_models("BYTEDANCE", Some(1)).len(), 1);
        assert_eq!(cache.search_models("image model", None).len(), 1);
        assert_eq!(
            cache.get_type_counts().first().cloned(),
            Some(("text-to-image".to_string(), 2))
        );
        Ok(())
    }

    #[test]
    fn recommended_models_are_cross_referenced_and_priced() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let source = FakeSource::with_rows(catalogue());
        *source.page.lock().unwrap() = Some(
            r#"<a href="/models/wavespeed-ai/flux-dev">a</a>
               <a href="/models/unknown/ghost">b</a>
               <a href="/models/bytedance/seedream-v4">c</a>
               <a href="/models/bytedance/seedream-v4/edit">d</a>"#
                .to_string(),
        );
        let clock = Arc::new(ManualClock::new(START_MS));
        let mut cache = cache_for(&source, &clock, temp.path());

        let recommended = cache.get_recommended_models(Some("key"));
        let ids: Vec<&str> = recommended.iter().map(|row| row.model_id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["wavespeed-ai/flux-dev", "bytedance/seedream-v4", "bytedance/seedream-v4/edit"]
        );
        assert_eq!(recommended[0].price, Some(0.012));
        assert!(recommended.iter().all(|row| !row.from_fallback));

        cache.get_recommended_models(Some("key"));
        assert_eq!(source.page_fetches.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[test]
    fn recommended_models_pad_from_fallback() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let source = FakeSource::with_rows(catalogue());
        *source.page.lock().unwrap() =
            Some(r#"<a href="/models/wavespeed-ai/flux-dev">only one</a>"#.to_string());
        let clock = Arc::new(ManualClock::new(START_MS));
        let mut cache = cache_for(&source, &clock, temp.path());

        let recommended = cache.get_recommended_models(Some("key"));
        assert!(recommended.len() >= RECOMMENDED_MIN);
        assert_eq!(recommended[0].model_id, "wavespeed-ai/flux-dev");
        assert_eq!(
            recommended
                .iter()
                .filter(|row| row.model_id == "wavespeed-ai/flux-dev")
                .count(),
            1
        );
        let padded = recommended
            .iter()
            .find(|row| row.model_id == "bytedance/seedream-v4")
            .expect("padded entry");
        assert!(padded.from_fallback);
        assert_eq!(padded.price, Some(0.027));
        let unpriced = recommended
            .iter()
            .find(|row| row.model_id == "google/nano-banana/edit")
            .expect("fallback-only entry");
        assert_eq!(unpriced.price, None);
        assert_eq!(recommended.len(), FALLBACK_POPULAR_MODELS.len());
        Ok(())
    }

    #[test]
    fn recommended_models_survive_total_outage() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let source = FakeSource::with_rows(Vec::new());
        source.fail.store(true, Ordering::SeqCst);
        let clock = Arc::new(ManualClock::new(START_MS));
        let mut cache = cache_for(&source, &clock, temp.path());

        let recommended = cache.get_recommended_models(Some("key"));
        assert_eq!(recommended.len(), FALLBACK_POPULAR_MODELS.len());
        assert!(recommended.iter().all(|row| row.from_fallback && row.price.is_none()));
        Ok(())
    }

    #[test]
    fn invalidate_clears_memory_and_file() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let source = FakeSource::with_rows(catalogue());
        let clock = Arc::new(ManualClock::new(START_MS));
        let mut cache = cache_for(&source, &clock, temp.path());

        cache.get_models("key", false)?;
        assert!(cache.cache_path().is_file());
        cache.invalidate();
        assert!(!cache.cache_path().exists());
        assert!(cache.snapshot().is_none());
        cache.invalidate();

        cache.get_models("key", false)?;
        assert_eq!(source.fetches(), 2);

        cache.reset();
        assert_eq!(cache.get_stats().hits, 0);
        assert!(cache.snapshot().is_none());
        Ok(())
    }
}
