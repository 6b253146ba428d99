// Environment variable loading

use crate::{ConfigError, Result};
use std::collections::HashMap;
use std::env;

/// Reads configuration from the process environment.
///
/// With a prefix, only `PREFIX_*` variables are read and the prefix is
/// stripped: `TRELLIS_ROOT_PATH` becomes `root_path`.
#[derive(Debug, Clone, Default)]
pub struct EnvLoader {
    prefix: Option<String>,
}

impl EnvLoader {
    pub fn new(prefix: Option<String>) -> Self {
        Self { prefix }
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    /// All matching variables, keys lowercased
    pub fn load(&self) -> Result<HashMap<String, String>> {
        Ok(self.collect(env::vars()))
    }

    /// Same as [`load`](Self::load) over an explicit set of variables
    pub fn collect(&self, vars: impl IntoIterator<Item = (String, String)>) -> HashMap<String, String> {
        vars.into_iter()
            .filter_map(|(key, value)| self.key_for(&key).map(|key| (key, value)))
            .collect()
    }

    fn key_for(&self, var: &str) -> Option<String> {
        match &self.prefix {
            Some(prefix) => {
                let rest = var.strip_prefix(prefix.as_str())?.strip_prefix('_')?;
                (!rest.is_empty()).then(|| rest.to_lowercase())
            }
            None => Some(var.to_lowercase()),
        }
    }

    /// One variable, looked up as `PREFIX_KEY`
    pub fn load_var(&self, key: &str) -> Result<String> {
        let name = match &self.prefix {
            Some(prefix) => format!("{}_{}", prefix, key.to_uppercase()),
            None => key.to_uppercase(),
        };
        env::var(&name).map_err(ConfigError::EnvError)
    }

    pub fn load_var_or(&self, key: &str, default: &str) -> String {
        self.load_var(key).unwrap_or_else(|_| default.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_prefix_is_stripped() {
        let loader = EnvLoader::new(Some("TRELLIS".to_string()));
        let found = loader.collect(vars(&[
            ("TRELLIS_ROOT_PATH", "/api"),
            ("TRELLIS_PORT", "8080"),
            ("TRELLISX_PORT", "1"),
            ("TRELLIS_", "empty"),
            ("HOME", "/root"),
        ]));

        assert_eq!(found.len(), 2);
        assert_eq!(found["root_path"], "/api");
        assert_eq!(found["port"], "8080");
    }

    #[test]
    fn test_without_prefix_everything_is_read() {
        let loader = EnvLoader::default();
        let found = loader.collect(vars(&[("LOG_LEVEL", "debug")]));
        assert_eq!(found["log_level"], "debug");
    }

    #[test]
    fn test_missing_var_falls_back() {
        let loader = EnvLoader::new(Some("TRELLIS_UNIT".to_string()));
        assert!(loader.load_var("NONEXISTENT_4711").is_err());
        assert_eq!(loader.load_var_or("NONEXISTENT_4711", "fallback"), "fallback");
    }
}
