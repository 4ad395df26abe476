use std::path::{Path, PathBuf};

use surveykit_common::{Error, Result};
use tracing::{debug, info};

use crate::model::AppConfig;

/// Environment variables recognized by the loader. Values set here win over
/// the config file, which wins over built-in defaults.
pub const ENV_DB_PATH: &str = "SURVEYKIT_DB_PATH";
pub const ENV_IMGBB_KEY: &str = "IMGBB_API_KEY";
pub const ENV_IMGBB_ENDPOINT: &str = "IMGBB_ENDPOINT";

/// Loads `AppConfig` from an optional YAML file plus environment overrides.
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new(config_path: Option<PathBuf>) -> Self {
        Self { config_path }
    }

    pub fn load(&self) -> Result<AppConfig> {
        let mut config = match &self.config_path {
            Some(path) => Self::load_file(path)?,
            None => {
                debug!("no config file given, using defaults");
                AppConfig::default()
            }
        };
        Self::apply_env(&mut config);
        Ok(config)
    }

    fn load_file(path: &Path) -> Result<AppConfig> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;
        let config: AppConfig = serde_yaml::from_str(&contents)
            .map_err(|e| Error::Config(format!("failed to parse {}: {e}", path.display())))?;
        info!("config loaded from {}", path.display());
        Ok(config)
    }

    fn apply_env(config: &mut AppConfig) {
        if let Ok(path) = std::env::var(ENV_DB_PATH)
            && !path.is_empty()
        {
            config.database.path = PathBuf::from(path);
        }
        if let Ok(key) = std::env::var(ENV_IMGBB_KEY)
            && !key.is_empty()
        {
            config.imgbb.api_key = Some(key);
        }
        if let Ok(endpoint) = std::env::var(ENV_IMGBB_ENDPOINT)
            && !endpoint.is_empty()
        {
            config.imgbb.endpoint = endpoint;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;

    // Process environment is shared across test threads; every test that
    // reaches apply_env takes this lock, and mutating tests restore the
    // variables before releasing it.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_env() {
        unsafe {
            std::env::remove_var(ENV_DB_PATH);
            std::env::remove_var(ENV_IMGBB_KEY);
            std::env::remove_var(ENV_IMGBB_ENDPOINT);
        }
    }

    fn config_file() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::with_suffix(".yml").unwrap();
        writeln!(file, "database:").unwrap();
        writeln!(file, "  path: /data/site-surveys.db").unwrap();
        writeln!(file, "imgbb:").unwrap();
        writeln!(file, "  api_key: file-key").unwrap();
        file
    }

    #[test]
    fn missing_file_is_an_error() {
        let loader = ConfigLoader::new(Some(PathBuf::from("/nonexistent/config.yml")));
        let err = loader.load().unwrap_err();
        assert!(err.to_string().contains("configuration error"));
    }

    #[test]
    fn file_values_override_defaults() {
        let _guard = ENV_LOCK.lock().unwrap();
        let file = config_file();

        let loader = ConfigLoader::new(Some(file.path().to_path_buf()));
        let config = loader.load().unwrap();
        assert_eq!(config.database.path, PathBuf::from("/data/site-surveys.db"));
        assert_eq!(config.imgbb.api_key.as_deref(), Some("file-key"));
    }

    #[test]
    fn no_file_yields_defaults() {
        let _guard = ENV_LOCK.lock().unwrap();
        let loader = ConfigLoader::new(None);
        let config = loader.load().unwrap();
        assert_eq!(config.database.path, PathBuf::from("surveykit.db"));
    }

    #[test]
    fn env_values_override_file_and_defaults() {
        let _guard = ENV_LOCK.lock().unwrap();
        unsafe {
            std::env::set_var(ENV_DB_PATH, "/env/override.db");
            std::env::set_var(ENV_IMGBB_KEY, "env-key");
            std::env::set_var(ENV_IMGBB_ENDPOINT, "https://mirror.example/upload");
        }

        let file = config_file();
        let loader = ConfigLoader::new(Some(file.path().to_path_buf()));
        let config = loader.load().unwrap();
        clear_env();

        assert_eq!(config.database.path, PathBuf::from("/env/override.db"));
        assert_eq!(config.imgbb.api_key.as_deref(), Some("env-key"));
        assert_eq!(config.imgbb.endpoint, "https://mirror.example/upload");
    }

    #[test]
    fn empty_env_values_are_ignored() {
        let _guard = ENV_LOCK.lock().unwrap();
        unsafe {
            std::env::set_var(ENV_DB_PATH, "");
            std::env::set_var(ENV_IMGBB_KEY, "");
            std::env::set_var(ENV_IMGBB_ENDPOINT, "");
        }

        let file = config_file();
        let loader = ConfigLoader::new(Some(file.path().to_path_buf()));
        let config = loader.load().unwrap();
        clear_env();

        // Blank variables fall through to the file value or the default.
        assert_eq!(config.database.path, PathBuf::from("/data/site-surveys.db"));
        assert_eq!(config.imgbb.api_key.as_deref(), Some("file-key"));
        assert_eq!(config.imgbb.endpoint, "https://api.imgbb.com/1/upload");
    }
}
