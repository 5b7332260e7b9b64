mod cache;
mod popular;
mod snapshot;

pub use cache::{
    CacheSource, CacheStats, CatalogSource, ModelCache, ModelCacheOptions, ModelFilter,
    DEFAULT_FILE_TTL, DEFAULT_MEMORY_TTL, DEFAULT_POPULAR_TTL,
};
pub use popular::{
    fallback_popular_ids, parse_popular_page, RecommendedModel, FALLBACK_POPULAR_MODELS,
    POPULAR_PAGE_URL, RECOMMENDED_MAX, RECOMMENDED_MIN,
};
pub use snapshot::{
    read_snapshot, write_snapshot, CachedModel, ModelCacheSnapshot, CACHE_FILE_NAME,
    CACHE_SCHEMA_VERSION, DESCRIPTION_MAX_CHARS,
};
