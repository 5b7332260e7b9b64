use indexmap::IndexMap;
use serde::Serialize;

use super::descriptor::Provider;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Generate,
    Edit,
    Sequential,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistryModel {
    pub id: String,
    pub name: String,
    pub provider: Provider,
    pub model_name: String,
    pub base_url: Option<String>,
    pub description: String,
    pub capabilities: Vec<Capability>,
    pub is_recommended: bool,
}

impl RegistryModel {
    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}

#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: IndexMap<String, RegistryModel>,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new(None)
    }
}

impl ModelRegistry {
    pub fn new(models: Option<IndexMap<String, RegistryModel>>) -> Self {
        Self {
            models: models.unwrap_or_else(default_models),
        }
    }

    pub fn get(&self, id: &str) -> Option<&RegistryModel> {
        self.models.get(id)
    }

    pub fn list(&self) -> impl Iterator<Item = &RegistryModel> {
        self.models.values()
    }

    pub fn by_capability(&self, capability: Capability) -> Vec<RegistryModel> {
        self.models
            .values()
            .filter(|model| model.supports(capability))
            .cloned()
            .collect()
    }

    pub fn recommended(&self) -> Vec<&RegistryModel> {
        self.models
            .values()
            .filter(|model| model.is_recommended)
            .collect()
    }
}

fn default_models() -> IndexMap<String, RegistryModel> {
    use Capability::{Edit, Generate, Sequential};

    let mut map = IndexMap::new();

    let mut insert = |id: &str,
                      name: &str,
                      model_name: &str,
                      description: &str,
                      capabilities: &[Capability],
                      is_recommended: bool| {
        map.insert(
            id.to_string(),
            RegistryModel {
                id: id.to_string(),
                name: name.to_string(),
                provider: Provider::WavespeedNative,
                model_name: model_name.to_string(),
                base_url: None,
                description: description.to_string(),
                capabilities: capabilities.to_vec(),
                is_recommended,
            },
        );
    };

    insert(
        "seedream-v4",
        "Seedream v4",
        "bytedance/seedream-v4",
        "ByteDance Seedream 4.0 text-to-image with edit and sequential variants.",
        &[Generate, Edit, Sequential],
        true,
    );
    insert(
        "seedream-v4.5",
        "Seedream v4.5",
        "bytedance/seedream-v4.5",
        "Seedream 4.5 with improved typography and multi-image consistency.",
        &[Generate, Edit, Sequential],
        true,
    );
    insert(
        "seedream-v3",
        "Seedream v3",
        "bytedance/seedream-v3",
        "Previous-generation Seedream text-to-image.",
        &[Generate],
        false,
    );
    insert(
        "seededit-v3",
        "SeedEdit v3",
        "bytedance/seededit-v3",
        "Instruction-based single image editing.",
        &[Edit],
        false,
    );
    insert(
        "flux-kontext-pro",
        "FLUX Kontext Pro",
        "wavespeed-ai/flux-kontext-pro",
        "FLUX Kontext text-to-image and in-context editing.",
        &[Generate, Edit],
        false,
    );

    map
}
