//! Plugin settings

use crate::NodeError;
use reconstruction::CachePolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Environment variable prefix, e.g. `TRIPOSR_OUTPUT_DIR`
pub const ENV_PREFIX: &str = "TRIPOSR";

/// How the saver names its files
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamingKind {
    /// strftime template input, e.g. `Mesh_%Y-%m-%d-%M-%S-%f.obj`
    #[default]
    Timestamp,
    /// filename prefix input plus a running counter
    Counter,
}

/// Settings shared by all three nodes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginSettings {
    /// Root holding one folder per asset category
    pub models_root: PathBuf,

    /// Where saved meshes go
    pub output_dir: PathBuf,

    /// Model configuration file
    pub model_config: PathBuf,

    /// Asset category of reconstruction checkpoints
    pub checkpoint_category: String,

    /// Chunk size bounds offered by the loader
    pub default_chunk_size: i64,
    pub max_chunk_size: i64,

    pub cache_policy: CachePolicy,

    /// Models the loader keeps before dropping the least recently used
    pub max_cached_models: usize,

    /// U²-Net export used for background removal; removal is unavailable without it
    pub segmentation_model: Option<PathBuf>,

    pub naming: NamingKind,
}

impl Default for PluginSettings {
    fn default() -> Self {
        Self {
            models_root: PathBuf::from("models"),
            output_dir: PathBuf::from("output"),
            model_config: PathBuf::from("config.yaml"),
            checkpoint_category: "checkpoints".to_string(),
            default_chunk_size: 8192,
            max_chunk_size: 10000,
            cache_policy: CachePolicy::Keyed,
            max_cached_models: 1,
            segmentation_model: None,
            naming: NamingKind::Timestamp,
        }
    }
}

impl PluginSettings {
    /// Defaults, then `file` if given, then `TRIPOSR_*` environment variables
    pub fn load(file: Option<&Path>) -> Result<Self, NodeError> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            info!("Reading plugin settings from {}", path.display());
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(config::Environment::with_prefix(ENV_PREFIX));

        let settings: PluginSettings = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| NodeError::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), NodeError> {
        if self.max_chunk_size < 1 {
            return Err(NodeError::Config(format!(
                "max_chunk_size must be at least 1, got {}",
                self.max_chunk_size
            )));
        }
        if !(1..=self.max_chunk_size).contains(&self.default_chunk_size) {
            return Err(NodeError::Config(format!(
                "default_chunk_size {} outside [1, {}]",
                self.default_chunk_size, self.max_chunk_size
            )));
        }
        if self.max_cached_models == 0 {
            return Err(NodeError::Config("max_cached_models must be at least 1".into()));
        }
        if self.checkpoint_category.is_empty() {
            return Err(NodeError::Config("checkpoint_category must not be empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_defaults_valid() {
        let settings = PluginSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.max_chunk_size, 10000);
    }

    #[test]
    fn test_file_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("triposr.toml");
        fs::write(
            &path,
            "output_dir = \"/tmp/meshes\"\ncache_policy = \"first_call_wins\"\nnaming = \"counter\"\nmax_chunk_size = 9000\ndefault_chunk_size = 512\n",
        )
        .unwrap();

        let settings = PluginSettings::load(Some(&path)).unwrap();
        assert_eq!(settings.output_dir, PathBuf::from("/tmp/meshes"));
        assert_eq!(settings.cache_policy, CachePolicy::FirstCallWins);
        assert_eq!(settings.naming, NamingKind::Counter);
        assert_eq!(settings.default_chunk_size, 512);
        assert_eq!(settings.checkpoint_category, "checkpoints");
    }

    #[test]
    fn test_inconsistent_chunk_bounds() {
        let settings = PluginSettings {
            default_chunk_size: 20000,
            ..Default::default()
        };
        assert!(matches!(settings.validate(), Err(NodeError::Config(_))));
    }

    #[test]
    fn test_zero_cached_models_rejected() {
        let settings = PluginSettings {
            max_cached_models: 0,
            ..Default::default()
        };
        assert!(matches!(settings.validate(), Err(NodeError::Config(_))));
    }

    #[test]
    fn test_missing_file() {
        let result = PluginSettings::load(Some(Path::new("/nonexistent/triposr.toml")));
        assert!(matches!(result, Err(NodeError::Config(_))));
    }
}
