pub mod catalog_source;
pub mod operations;
pub mod outputs;
pub mod settings;
pub mod tasks;
pub mod transport;

#[cfg(test)]
mod test_support;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use wavespeed_contracts::catalog::{ModelCache, ModelCacheOptions};
use wavespeed_contracts::clock::{Clock, SystemClock};
use wavespeed_contracts::config::LoadedConfig;
use wavespeed_contracts::env::SecretSource;
use wavespeed_contracts::errors::{ConfigErrorKind, ConfigurationError};
use wavespeed_contracts::models::{
    ModelDescriptor, ModelListing, ModelRegistry, ModelResolver, NATIVE_API_KEY_ENV,
};
use wavespeed_contracts::tasks::{Operation, OperationResult};

use crate::catalog_source::HttpCatalogSource;
use crate::operations::{run_operation, warn_on_missing_capability, ImageRequest};
use crate::outputs::SavedOutput;
use crate::settings::EngineSettings;
use crate::tasks::TaskClient;
use crate::transport::{HttpTransport, Transport};

/// Composition root: owns the registry, the loaded configuration, the task
/// client and the process-wide model cache.
pub struct WavespeedEngine {
    env: Arc<dyn SecretSource>,
    registry: ModelRegistry,
    config: Option<LoadedConfig>,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    tasks: TaskClient,
    cache: ModelCache,
    settings: EngineSettings,
}

impl WavespeedEngine {
    pub fn new(env: Arc<dyn SecretSource>, config: Option<LoadedConfig>) -> Result<Self> {
        let settings = EngineSettings::from_env(env.as_ref());
        let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new()?);
        Ok(Self::with_parts(
            env,
            config,
            transport,
            Arc::new(SystemClock),
            settings,
        ))
    }

    pub fn with_parts(
        env: Arc<dyn SecretSource>,
        config: Option<LoadedConfig>,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
        settings: EngineSettings,
    ) -> Self {
        let tasks = TaskClient::new(transport.clone(), clock.clone(), settings.poll);
        let cache = build_cache(&transport, &clock, &settings);
        Self {
            env,
            registry: ModelRegistry::default(),
            config,
            transport,
            clock,
            tasks,
            cache,
            settings,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn config(&self) -> Option<&LoadedConfig> {
        self.config.as_ref()
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn resolve_model(
        &self,
        command: &str,
        explicit: Option<&str>,
    ) -> Result<ModelDescriptor, ConfigurationError> {
        ModelResolver::new(&self.registry, self.env.as_ref()).resolve(
            command,
            explicit,
            self.config.as_ref().map(|loaded| &loaded.config),
        )
    }

    pub fn list_models(&self) -> ModelListing {
        ModelResolver::new(&self.registry, self.env.as_ref()).list_models(
            self.config.as_ref().map(|loaded| &loaded.config),
            self.config.as_ref().map(|loaded| loaded.path.as_path()),
        )
    }

    /// Resolves the model and runs one operation.
    ///
    /// Resolution and request validation errors are returned as `Err`; every
    /// failure after submission is reported inside the `OperationResult`.
    pub fn run(
        &self,
        operation: Operation,
        explicit_model: Option<&str>,
        request: ImageRequest,
    ) -> Result<OperationResult> {
        let model = self.resolve_model(operation.command_name(), explicit_model)?;
        let request = request.normalized(operation)?;
        warn_on_missing_capability(&self.registry, operation, &model);
        Ok(run_operation(&self.tasks, operation, &model, &request))
    }

    pub fn generate_image(&self, model: Option<&str>, request: ImageRequest) -> Result<OperationResult> {
        self.run(Operation::Generate, model, request)
    }

    pub fn edit_image(&self, model: Option<&str>, request: ImageRequest) -> Result<OperationResult> {
        self.run(Operation::Edit, model, request)
    }

    pub fn generate_sequential(
        &self,
        model: Option<&str>,
        request: ImageRequest,
    ) -> Result<OperationResult> {
        self.run(Operation::GenerateSequential, model, request)
    }

    pub fn edit_sequential(
        &self,
        model: Option<&str>,
        request: ImageRequest,
    ) -> Result<OperationResult> {
        self.run(Operation::EditSequential, model, request)
    }

    pub fn save_outputs(&self, result: &OperationResult, out_dir: &Path) -> Result<Vec<SavedOutput>> {
        outputs::save_outputs(self.transport.as_ref(), result, out_dir)
    }

    /// The native key, which is what the catalogue endpoint accepts.
    pub fn catalog_api_key(&self) -> Result<String, ConfigurationError> {
        self.env.get(NATIVE_API_KEY_ENV).ok_or_else(|| {
            ConfigurationError::new(
                ConfigErrorKind::MissingSecret,
                None,
                format!(
                    "Environment variable {NATIVE_API_KEY_ENV} is not set (required for the model catalogue)."
                ),
            )
        })
    }

    pub fn cache(&mut self) -> &mut ModelCache {
        &mut self.cache
    }

    /// Replaces the cache with a fresh instance. The cache file is kept.
    pub fn reset_cache(&mut self) {
        self.cache = build_cache(&self.transport, &self.clock, &self.settings);
    }
}

fn build_cache(
    transport: &Arc<dyn Transport>,
    clock: &Arc<dyn Clock>,
    settings: &EngineSettings,
) -> ModelCache {
    let source = HttpCatalogSource::new(transport.clone(), settings.api_base.clone());
    ModelCache::new(
        Arc::new(source),
        clock.clone(),
        ModelCacheOptions::new(settings.cache_dir.clone()),
    )
}
