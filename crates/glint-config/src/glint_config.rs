use std::{fs, path::Path, path::PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    allocator_config::AllocatorConfig, logging_config::LoggingConfig,
    module_config::ModuleConfig, paths::ProjectPaths,
};

#[derive(Debug)]
pub enum ConfigLoadError {
    NotFound,
    ParseError(String),
    IoError(String),
}

impl std::fmt::Display for ConfigLoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigLoadError::NotFound => write!(f, "Config file not found"),
            ConfigLoadError::ParseError(msg) => write!(f, "Failed to parse config: {}", msg),
            ConfigLoadError::IoError(msg) => write!(f, "IO error reading config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigLoadError {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlintConfig {
    /// Script heap placement and pool sizes
    #[serde(default)]
    pub allocator: AllocatorConfig,

    /// Where `require` looks for scripts
    #[serde(default)]
    pub modules: ModuleConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl GlintConfig {
    /// Default location of the config file, if a home directory exists
    pub fn config_path() -> Option<PathBuf> {
        ProjectPaths::new("glint").map(|p| p.config_dir().join("config.toml"))
    }

    /// Load from the default location
    pub fn load() -> Result<Self, ConfigLoadError> {
        let path = Self::config_path().ok_or(ConfigLoadError::NotFound)?;
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigLoadError> {
        if !path.exists() {
            return Err(ConfigLoadError::NotFound);
        }

        let content =
            fs::read_to_string(path).map_err(|e| ConfigLoadError::IoError(e.to_string()))?;
        let config =
            toml::from_str(&content).map_err(|e| ConfigLoadError::ParseError(e.to_string()))?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        // Create parent directories if they don't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let content = toml::to_string_pretty(&self).context("Failed to serialize config")?;
        fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
        info!("Saved config to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_not_found() {
        let dir = TempDir::new().unwrap();
        let result = GlintConfig::load_from(&dir.path().join("config.toml"));
        assert!(matches!(result, Err(ConfigLoadError::NotFound)));
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "").unwrap();

        let config = GlintConfig::load_from(&path).unwrap();
        assert_eq!(config, GlintConfig::default());
        assert_eq!(config.allocator.threshold_bytes, 16);
        assert!(config.allocator.prefer_extended);
        assert_eq!(config.modules.mount_path, PathBuf::from("/sdcard"));
        assert_eq!(config.modules.entry, "main");
        assert!(!config.logging.file);
    }

    #[test]
    fn test_partial_sections() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
[allocator]
threshold_bytes = 256
prefer_extended = false

[modules]
mount_path = "/store"
extension = ".lc"
"#,
        )
        .unwrap();

        let config = GlintConfig::load_from(&path).unwrap();
        assert_eq!(config.allocator.threshold_bytes, 256);
        assert!(!config.allocator.prefer_extended);
        assert_eq!(config.allocator.near_capacity, 320 * 1024);
        assert_eq!(config.modules.mount_path, PathBuf::from("/store"));
        assert_eq!(config.modules.bare_extension(), "lc");
        assert_eq!(config.modules.entry, "main");
    }

    #[test]
    fn test_parse_error_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[allocator\nthreshold_bytes = ").unwrap();

        let result = GlintConfig::load_from(&path);
        assert!(matches!(result, Err(ConfigLoadError::ParseError(_))));
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = GlintConfig::default();
        config.allocator.extended_capacity = 2 * 1024 * 1024;
        config.logging.filter = Some("info,timers=debug".to_string());
        config.save_to(&path).unwrap();

        let loaded = GlintConfig::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }
}
