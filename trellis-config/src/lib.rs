// Configuration management for Trellis servers

pub mod env;
pub mod error;
pub mod loader;
pub mod settings;
pub mod validation;

pub use env::EnvLoader;
pub use error::{ConfigError, Result};
pub use loader::{ConfigLoader, FileFormat};
pub use settings::ServerSettings;
pub use validation::{ConfigValidator, Validate};

use parking_lot::RwLock;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Flat key-value configuration store.
///
/// Sources are layered in the order they are loaded; a later source
/// overwrites keys set by an earlier one.
#[derive(Clone, Default)]
pub struct ConfigManager {
    config: Arc<RwLock<HashMap<String, Value>>>,
    env_prefix: Option<String>,
}

impl ConfigManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only read `PREFIX_*` environment variables
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            config: Arc::default(),
            env_prefix: Some(prefix.into()),
        }
    }

    pub fn load_env(&self) -> Result<()> {
        let vars = EnvLoader::new(self.env_prefix.clone()).load()?;
        debug!(count = vars.len(), prefix = ?self.env_prefix, "Loaded configuration from environment");
        self.extend(vars.into_iter().map(|(key, value)| (key, Value::String(value))));
        Ok(())
    }

    /// Export a `.env` file into the environment, then read the environment.
    /// Without a path a missing `.env` is not an error.
    pub fn load_dotenv(&self, path: Option<&str>) -> Result<()> {
        match path {
            Some(path) => {
                dotenvy::from_path(path).map_err(|e| ConfigError::LoadError(e.to_string()))?;
            }
            None => {
                if let Err(err) = dotenvy::dotenv() {
                    debug!(error = %err, "No .env file loaded");
                }
            }
        }
        self.load_env()
    }

    /// Load a JSON, TOML or `.env` file, format chosen by its name
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let data = ConfigLoader::auto(path)?.load_file(path)?;

        match data {
            Value::Object(map) => {
                debug!(path = %path.display(), keys = map.len(), "Loaded configuration file");
                self.extend(map);
                Ok(())
            }
            _ => Err(ConfigError::ParseError(format!(
                "{} does not contain a table of settings",
                path.display()
            ))),
        }
    }

    pub fn set<T: Serialize>(&self, key: &str, value: T) -> Result<()> {
        let value =
            serde_json::to_value(value).map_err(|e| ConfigError::SerializationError(e.to_string()))?;
        self.config.write().insert(key.to_string(), value);
        Ok(())
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let value = self
            .config
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| ConfigError::KeyNotFound(key.to_string()))?;

        serde_json::from_value(value).map_err(|e| ConfigError::DeserializationError(e.to_string()))
    }

    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.get(key).unwrap_or(default)
    }

    pub fn has(&self, key: &str) -> bool {
        self.config.read().contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.config.read().keys().cloned().collect()
    }

    /// Copy every key of `other` into this manager
    pub fn merge(&self, other: &ConfigManager) -> Result<()> {
        let snapshot: Vec<(String, Value)> = other
            .config
            .read()
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        self.extend(snapshot);
        Ok(())
    }

    /// Deserialize the whole store into `T` and validate it
    pub fn load_validated<T: DeserializeOwned + Validate>(&self) -> Result<T> {
        let object: Map<String, Value> = self
            .config
            .read()
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        let loaded: T = serde_json::from_value(Value::Object(object))
            .map_err(|e| ConfigError::DeserializationError(e.to_string()))?;
        loaded.validate()?;
        Ok(loaded)
    }

    fn extend(&self, entries: impl IntoIterator<Item = (String, Value)>) {
        self.config.write().extend(entries);
    }
}

impl std::fmt::Debug for ConfigManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys = self.keys();
        keys.sort();
        f.debug_struct("ConfigManager")
            .field("keys", &keys)
            .field("env_prefix", &self.env_prefix)
            .finish()
    }
}
