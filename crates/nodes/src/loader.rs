//! Model loader node

use crate::registry::{NodeClass, NODE_CATEGORY};
use crate::schema::{InputKind, InputSpec, NodeSchema};
use crate::{AssetResolver, NodeError, PluginSettings};
use reconstruction::{
    select_device, CachePolicy, DeviceSelector, ModelCache, ModelConfig, ModelFactory, ModelHandle,
    ModelKey, ReconstructionError,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Graph type name of a loaded model
pub const MODEL_TYPE: &str = "TRIPOSR_MODEL";

/// Loads checkpoints and keeps them cached for later invocations
pub struct ModelLoaderNode {
    schema: NodeSchema,
    category: String,
    config_path: PathBuf,
    resolver: Arc<dyn AssetResolver>,
    devices: Box<dyn DeviceSelector>,
    factory: Box<dyn ModelFactory>,
    cache: ModelCache,
}

impl ModelLoaderNode {
    pub fn new(
        settings: &PluginSettings,
        resolver: Arc<dyn AssetResolver>,
        devices: Box<dyn DeviceSelector>,
        factory: Box<dyn ModelFactory>,
    ) -> Result<Self, NodeError> {
        settings.validate()?;
        let schema = Self::build_schema(settings, resolver.as_ref());
        schema.validate()?;

        Ok(Self {
            schema,
            category: settings.checkpoint_category.clone(),
            config_path: settings.model_config.clone(),
            resolver,
            devices,
            factory,
            cache: ModelCache::with_capacity(settings.cache_policy, settings.max_cached_models),
        })
    }

    fn build_schema(settings: &PluginSettings, resolver: &dyn AssetResolver) -> NodeSchema {
        let class = NodeClass::ModelLoader;
        NodeSchema {
            class_name: class.class_name().to_string(),
            display_name: class.display_name().to_string(),
            category: NODE_CATEGORY.to_string(),
            inputs: vec![
                InputSpec::new(
                    "model",
                    InputKind::Choice {
                        options: resolver.list(&settings.checkpoint_category),
                    },
                ),
                InputSpec::new(
                    "chunk_size",
                    InputKind::Int {
                        default: settings.default_chunk_size,
                        min: 1,
                        max: settings.max_chunk_size,
                    },
                ),
            ],
            outputs: vec![MODEL_TYPE.to_string()],
            output_node: false,
        }
    }

    pub fn schema(&self) -> &NodeSchema {
        &self.schema
    }

    pub fn cache_policy(&self) -> CachePolicy {
        self.cache.policy()
    }

    /// Number of models currently held
    pub fn cached_models(&self) -> usize {
        self.cache.len()
    }

    /// Load `model` with `chunk_size`, or return the cached handle
    pub fn load(&mut self, model: &str, chunk_size: i64) -> Result<Arc<ModelHandle>, NodeError> {
        let chunk_size = self.schema.check_int("chunk_size", chunk_size)? as usize;
        let key = ModelKey::new(model, chunk_size);

        let resolver = &self.resolver;
        let devices = &self.devices;
        let factory = &self.factory;
        let category = &self.category;
        let config_path = &self.config_path;

        let handle = self.cache.get_or_load(key, || {
            let checkpoint = resolver.full_path(category, model).ok_or_else(|| {
                ReconstructionError::ResourceNotFound(format!("checkpoint {}/{}", category, model))
            })?;
            let config = ModelConfig::from_file(config_path)?;

            let device = select_device(devices.as_ref());
            info!("Loading {} on {}", checkpoint.display(), device);
            let built = factory.build(&checkpoint, &config, device)?;
            Ok(ModelHandle::new(model, device, built, chunk_size))
        })?;

        Ok(handle)
    }

    /// Forget a cached model; returns whether one was held
    pub fn evict(&mut self, model: &str, chunk_size: i64) -> bool {
        let key = ModelKey::new(model, chunk_size.max(0) as usize);
        self.cache.evict(&key).is_some()
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    /// Re-list available checkpoints into the schema
    pub fn refresh_choices(&mut self) {
        let options = self.resolver.list(&self.category);
        if let Some(input) = self.schema.inputs.iter_mut().find(|i| i.name == "model") {
            input.kind = InputKind::Choice { options };
        }
    }
}
