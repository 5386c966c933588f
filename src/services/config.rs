use crate::models::config::ScannerConfig;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Persists [`ScannerConfig`] as JSON in the platform config directory
pub struct ConfigManager {
    config_dir: PathBuf,
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new ConfigManager instance
    ///
    /// This will create the config directory if it doesn't exist.
    pub fn new() -> Result<Self, String> {
        let config_dir = dirs::config_dir()
            .ok_or("Failed to determine config directory")?
            .join("label-scanner");

        fs::create_dir_all(&config_dir)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;

        Ok(Self::in_dir(config_dir))
    }

    /// Manager rooted at an explicit directory
    pub fn in_dir(config_dir: PathBuf) -> Self {
        let config_path = config_dir.join("scanner.json");
        Self {
            config_dir,
            config_path,
        }
    }

    /// Save configuration to disk
    pub fn save(&self, config: &ScannerConfig) -> Result<(), String> {
        config.validate()?;

        fs::create_dir_all(&self.config_dir)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;

        // Pretty print for hand editing
        let json = serde_json::to_string_pretty(config)
            .map_err(|e| format!("Failed to serialize config: {}", e))?;

        fs::write(&self.config_path, json)
            .map_err(|e| format!("Failed to write config file: {}", e))?;

        debug!(path = %self.config_path.display(), "config saved");
        Ok(())
    }

    /// Load configuration from disk
    ///
    /// If config file doesn't exist, returns default configuration
    pub fn load(&self) -> Result<ScannerConfig, String> {
        if !self.config_exists() {
            return Ok(ScannerConfig::default());
        }

        Self::load_from(&self.config_path)
    }

    /// Read and validate a config file at any path; missing sections take defaults
    pub fn load_from(path: &Path) -> Result<ScannerConfig, String> {
        let content = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file: {}", e))?;

        let config: ScannerConfig = serde_json::from_str(&content)
            .map_err(|e| format!("Failed to parse config file: {}", e))?;

        config.validate()?;
        Ok(config)
    }

    /// Get the config file path
    pub fn config_file_path(&self) -> &Path {
        &self.config_path
    }

    /// Check if config file exists
    pub fn config_exists(&self) -> bool {
        self.config_path.exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Helper to create a temporary test config manager
    fn create_test_manager() -> ConfigManager {
        use std::sync::atomic::{AtomicUsize, Ordering};
        static COUNTER: AtomicUsize = AtomicUsize::new(0);

        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        let temp_dir = std::env::temp_dir().join(format!("label-scanner-test-{}-{}", std::process::id(), id));
        let _ = fs::remove_dir_all(&temp_dir);

        ConfigManager::in_dir(temp_dir)
    }

    fn cleanup_test_files(manager: &ConfigManager) {
        let _ = fs::remove_dir_all(&manager.config_dir);
    }

    #[test]
    fn test_config_load_default_when_not_exists() {
        let manager = create_test_manager();
        assert!(!manager.config_exists());

        let config = manager.load().expect("load() should return default when file doesn't exist");
        assert_eq!(config, ScannerConfig::default());

        cleanup_test_files(&manager);
    }

    #[test]
    fn test_config_save_and_load() {
        let manager = create_test_manager();

        let mut config = ScannerConfig::default();
        config.stability.cooldown_ms = 1200;
        config.matching.fuzzy_threshold = 0.8;
        config.engine.languages = vec!["eng".to_string()];

        manager.save(&config).expect("save should succeed");
        assert!(manager.config_file_path().ends_with("scanner.json"));

        let loaded = manager.load().expect("load should succeed");
        assert_eq!(loaded, config);

        cleanup_test_files(&manager);
    }

    #[test]
    fn test_partial_file_takes_defaults() {
        let manager = create_test_manager();
        fs::create_dir_all(&manager.config_dir).unwrap();
        fs::write(manager.config_file_path(), r#"{"weight": {"max_kg": 25.0}}"#).unwrap();

        let loaded = manager.load().unwrap();
        assert_eq!(loaded.weight.max_kg, 25.0);
        assert_eq!(loaded.weight.min_kg, 0.05);
        assert_eq!(loaded.stability, ScannerConfig::default().stability);

        cleanup_test_files(&manager);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let manager = create_test_manager();

        let mut config = ScannerConfig::default();
        config.preprocessing.roi_width_ratio = 1.5;
        assert!(manager.save(&config).is_err());
        assert!(!manager.config_exists());

        fs::create_dir_all(&manager.config_dir).unwrap();
        fs::write(manager.config_file_path(), r#"{"weight": {"min_kg": 10.0, "max_kg": 1.0}}"#).unwrap();
        assert!(manager.load().is_err());

        cleanup_test_files(&manager);
    }

    #[test]
    fn test_malformed_json() {
        let manager = create_test_manager();
        fs::create_dir_all(&manager.config_dir).unwrap();
        fs::write(manager.config_file_path(), "{ not json").unwrap();

        let err = manager.load().unwrap_err();
        assert!(err.contains("Failed to parse config file"));

        cleanup_test_files(&manager);
    }
}
