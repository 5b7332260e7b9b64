use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

pub const POPULAR_PAGE_URL: &str = "https://wavespeed.ai/models";
pub const RECOMMENDED_MIN: usize = 3;
pub const RECOMMENDED_MAX: usize = 10;

/// (model id, display name, type) served when the listing page cannot be
/// scraped.
pub const FALLBACK_POPULAR_MODELS: &[(&str, &str, &str)] = &[
    ("bytedance/seedream-v4", "Seedream v4", "text-to-image"),
    ("bytedance/seedream-v4/edit", "Seedream v4 Edit", "image-to-image"),
    ("bytedance/seedream-v4/sequential", "Seedream v4 Sequential", "text-to-image"),
    ("google/nano-banana/text-to-image", "Nano Banana", "text-to-image"),
    ("google/nano-banana/edit", "Nano Banana Edit", "image-to-image"),
    ("wavespeed-ai/flux-kontext-pro", "FLUX Kontext Pro", "image-to-image"),
    ("wavespeed-ai/flux-dev", "FLUX.1 [dev]", "text-to-image"),
    ("wavespeed-ai/qwen-image/text-to-image", "Qwen Image", "text-to-image"),
    ("bytedance/seededit-v3", "SeedEdit v3", "image-to-image"),
    ("wavespeed-ai/wan-2.2/t2v-480p", "WAN 2.2 T2V", "text-to-video"),
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecommendedModel {
    pub model_id: String,
    pub name: String,
    pub model_type: String,
    /// Current catalogue price, when the catalogue knows the model.
    pub price: Option<f64>,
    pub from_fallback: bool,
}

pub fn fallback_popular_ids() -> Vec<String> {
    FALLBACK_POPULAR_MODELS
        .iter()
        .map(|(id, _, _)| (*id).to_string())
        .collect()
}

/// Extracts model ids from `/models/{owner}/{name...}` links, in page order
/// and without duplicates.
pub fn parse_popular_page(html: &str) -> Vec<String> {
    static LINK: OnceLock<Regex> = OnceLock::new();
    let pattern = LINK.get_or_init(|| {
        Regex::new(r#"href="/models/([A-Za-z0-9_.-]+/[A-Za-z0-9_./-]+?)/?(?:[?#][^"]*)?""#)
            .expect("popular link pattern compiles")
    });
    let mut ids: Vec<String> = Vec::new();
    for caps in pattern.captures_iter(html) {
        let id = caps[1].to_string();
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    ids
}
