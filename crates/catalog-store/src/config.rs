//! Store Configuration
//!
//! Where the database and the rolling logs live.

use std::path::PathBuf;

/// Path value selecting an in-memory database
pub const IN_MEMORY: &str = ":memory:";

pub const ENV_DB_PATH: &str = "CATALOG_DB_PATH";
pub const ENV_LOG_DIR: &str = "CATALOG_LOG_DIR";
pub const ENV_APP_NAME: &str = "CATALOG_APP_NAME";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub db_path: PathBuf,
    pub log_dir: PathBuf,
    pub app_name: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("catalog.db"),
            log_dir: PathBuf::from("logs"),
            app_name: "Catalog".to_string(),
        }
    }
}

impl StoreConfig {
    pub fn in_memory() -> Self {
        Self::default().with_db_path(IN_MEMORY)
    }

    pub fn with_db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.db_path = path.into();
        self
    }

    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = dir.into();
        self
    }

    pub fn with_app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    /// Read `CATALOG_DB_PATH`, `CATALOG_LOG_DIR` and `CATALOG_APP_NAME`,
    /// keeping defaults for unset or empty variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();
        if let Some(path) = get(ENV_DB_PATH) {
            config.db_path = PathBuf::from(path);
        }
        if let Some(dir) = get(ENV_LOG_DIR) {
            config.log_dir = PathBuf::from(dir);
        }
        if let Some(name) = get(ENV_APP_NAME) {
            config.app_name = name;
        }
        config
    }

    pub fn is_in_memory(&self) -> bool {
        self.db_path.as_os_str() == IN_MEMORY
    }
}
