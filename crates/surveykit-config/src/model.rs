use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub imgbb: ImgbbConfig,
}

/// Where the survey database lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("surveykit.db"),
        }
    }
}

/// ImgBB upload endpoint and credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImgbbConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
}

impl Default for ImgbbConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.imgbb.com/1/upload".to_string(),
            api_key: None,
        }
    }
}
