//! Runtime configuration for the CLI.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use notenav_content::ProcessorConfig;
use notenav_core::{defaults, ContentSettings};

/// Everything the CLI needs to index one vault.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub vault_path: PathBuf,
    pub database_url: String,
    pub settings: ContentSettings,
    pub read_cache_capacity: usize,
    pub processor: ProcessorConfig,
}

impl AppConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `VAULT_PATH` | (required) | Vault root directory |
    /// | `DATABASE_URL` | `sqlite://notenav.db` | SQLite database URL |
    /// | `CONTENT_SETTINGS` | (none) | JSON file with content settings |
    /// | `READ_CACHE_CAPACITY` | `256` | Cached file bodies |
    pub fn from_env() -> Result<Self> {
        let mut config = Self::from_lookup(|key| std::env::var(key).ok())?;
        config.processor = ProcessorConfig::from_env();
        Ok(config)
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let Some(vault_path) = lookup("VAULT_PATH").filter(|v| !v.trim().is_empty()) else {
            bail!("VAULT_PATH must be set to the vault root directory");
        };
        let vault_path = PathBuf::from(vault_path);
        if !vault_path.is_dir() {
            bail!("VAULT_PATH is not a directory: {}", vault_path.display());
        }

        let database_url =
            lookup("DATABASE_URL").unwrap_or_else(|| defaults::DATABASE_URL.to_string());

        let settings = match lookup("CONTENT_SETTINGS") {
            Some(path) => load_settings(Path::new(&path))?,
            None => ContentSettings::default(),
        };

        let read_cache_capacity = lookup("READ_CACHE_CAPACITY")
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(defaults::READ_CACHE_CAPACITY);

        Ok(Self {
            vault_path,
            database_url,
            settings,
            read_cache_capacity,
            processor: ProcessorConfig::default(),
        })
    }
}

/// Read a content settings JSON file. Missing keys take their defaults.
pub fn load_settings(path: &Path) -> Result<ContentSettings> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read settings file {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("Invalid settings file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, String)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_vault_path_required() {
        let err = AppConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(err.to_string().contains("VAULT_PATH"));
    }

    #[test]
    fn test_vault_path_must_be_directory() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope").display().to_string();
        let err = AppConfig::from_lookup(lookup(&[("VAULT_PATH", missing)])).unwrap_err();
        assert!(err.to_string().contains("not a directory"));
    }

    #[test]
    fn test_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let vault = dir.path().display().to_string();
        let config = AppConfig::from_lookup(lookup(&[("VAULT_PATH", vault)])).unwrap();

        assert_eq!(config.vault_path, dir.path());
        assert_eq!(config.database_url, defaults::DATABASE_URL);
        assert_eq!(config.settings, ContentSettings::default());
        assert_eq!(config.read_cache_capacity, defaults::READ_CACHE_CAPACITY);
    }

    #[test]
    fn test_overrides_and_settings_file() {
        let dir = tempfile::tempdir().unwrap();
        let settings_path = dir.path().join("settings.json");
        std::fs::write(
            &settings_path,
            r#"{"show_tags": false, "preview_length": 80, "custom_property_field": "status"}"#,
        )
        .unwrap();

        let config = AppConfig::from_lookup(lookup(&[
            ("VAULT_PATH", dir.path().display().to_string()),
            ("DATABASE_URL", "sqlite::memory:".into()),
            ("CONTENT_SETTINGS", settings_path.display().to_string()),
            ("READ_CACHE_CAPACITY", "8".into()),
        ]))
        .unwrap();

        assert_eq!(config.database_url, "sqlite::memory:");
        assert_eq!(config.read_cache_capacity, 8);
        assert!(!config.settings.show_tags);
        assert_eq!(config.settings.preview_length, 80);
        assert_eq!(config.settings.custom_property_field, "status");
        assert!(config.settings.show_file_preview);
    }

    #[test]
    fn test_invalid_settings_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();

        let err = load_settings(&path).unwrap_err();
        assert!(err.to_string().contains("Invalid settings file"));
    }

    #[test]
    fn test_invalid_cache_capacity_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::from_lookup(lookup(&[
            ("VAULT_PATH", dir.path().display().to_string()),
            ("READ_CACHE_CAPACITY", "lots".into()),
        ]))
        .unwrap();
        assert_eq!(config.read_cache_capacity, defaults::READ_CACHE_CAPACITY);
    }
}
