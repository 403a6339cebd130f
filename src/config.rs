use crate::{error::BlockPropsError, properties::PropertyTemplate};
use serde::{Deserialize, Serialize};
use std::{
    fs::{read_to_string, write},
    path::PathBuf,
    time::Duration,
};

/// Tunables for a [`PropertyEngine`](crate::engine::PropertyEngine).
///
/// Every field has a default, so a partial (or empty) TOML file is a valid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Quiescence window before a modified document is re-indexed.
    pub debounce_ms: u64,
    /// Freshness window of the suggestion cache.
    pub suggestion_ttl_secs: u64,
    /// Extension appended to note link targets that lack one.
    pub default_extension: String,
    /// Maximum number of characters of a query result's context snippet.
    pub context_len: usize,
    pub max_suggestions: usize,
    /// Whether block references fall back to a corpus scan when the current document misses.
    pub search_corpus: bool,
    pub enable_presets: bool,
    pub templates: Vec<PropertyTemplate>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            debounce_ms: 500,
            suggestion_ttl_secs: 30,
            default_extension: "md".to_string(),
            context_len: 60,
            max_suggestions: 10,
            search_corpus: true,
            enable_presets: true,
            templates: Vec::new(),
        }
    }
}

impl EngineConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn suggestion_ttl(&self) -> Duration {
        Duration::from_secs(self.suggestion_ttl_secs)
    }

    pub fn template(&self, name: &str) -> Option<&PropertyTemplate> {
        self.templates.iter().find(|t| t.name == name)
    }

    /// True when the `preset` key should be offered during key completion.
    pub fn presets_active(&self) -> bool {
        self.enable_presets && !self.templates.is_empty()
    }
}

pub trait ConfigProvider: Send + Sync {
    fn get_config(&self) -> Result<EngineConfig, BlockPropsError>;
    fn set_config(&self, config: &EngineConfig) -> Result<(), BlockPropsError>;
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TomlConfigProvider {
    path: PathBuf,
}

impl TomlConfigProvider {
    pub fn new(path: PathBuf) -> Self {
        TomlConfigProvider { path }
    }
}

impl ConfigProvider for TomlConfigProvider {
    fn get_config(&self) -> Result<EngineConfig, BlockPropsError> {
        tracing::debug!("Attempting to read engine config from: {:?}", &self.path);
        if !self.path.exists() {
            tracing::debug!("Config file not found, using defaults.");
            return Ok(EngineConfig::default());
        }
        let content = read_to_string(&self.path)?;
        Ok(toml::from_str(&content)?)
    }

    fn set_config(&self, config: &EngineConfig) -> Result<(), BlockPropsError> {
        tracing::debug!("Attempting to write engine config to: {:?}", &self.path);
        let toml_string = toml::to_string(config)?;
        write(&self.path, toml_string)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::properties::TemplateProperty;
    use test_log::test;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let provider = TomlConfigProvider::new(dir.path().join("absent.toml"));
        assert_eq!(provider.get_config().unwrap(), EngineConfig::default());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blockprops.toml");
        std::fs::write(&path, "debounce_ms = 50\n").unwrap();
        let config = TomlConfigProvider::new(path).get_config().unwrap();
        assert_eq!(config.debounce(), Duration::from_millis(50));
        assert_eq!(config.suggestion_ttl(), Duration::from_secs(30));
        assert_eq!(config.context_len, 60);
    }

    #[test]
    fn test_config_persists_templates() {
        let dir = tempfile::tempdir().unwrap();
        let provider = TomlConfigProvider::new(dir.path().join("blockprops.toml"));
        let config = EngineConfig {
            templates: vec![PropertyTemplate {
                name: "task".to_string(),
                properties: vec![TemplateProperty {
                    key: "status".to_string(),
                    value: "todo".to_string(),
                }],
            }],
            ..Default::default()
        };
        provider.set_config(&config).unwrap();
        let loaded = provider.get_config().unwrap();
        assert_eq!(loaded, config);
        assert!(loaded.presets_active());
        assert_eq!(loaded.template("task").map(|t| t.render()).as_deref(), Some("status: todo"));
    }

    #[test]
    fn test_malformed_file_is_a_serialization_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blockprops.toml");
        std::fs::write(&path, "debounce_ms = \"soon\"").unwrap();
        let err = TomlConfigProvider::new(path).get_config().unwrap_err();
        assert!(matches!(err, BlockPropsError::Serialization(_)));
    }
}
