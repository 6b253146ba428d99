//! Server settings
//!
//! Settings are layered: built-in defaults, then an optional file, then
//! `TRELLIS_*` environment variables.
//!
//! ```ignore
//! let settings = ServerSettings::load(Some("trellis.toml"))?;
//! let _guard = settings.log_config()?.init()?;
//!
//! let app = settings
//!     .apply(ControllerServer::new(scope, registry))
//!     .build()?;
//! app.listen(settings.port).await?;
//! ```

use crate::{ConfigError, ConfigManager, ConfigValidator, Result, Validate};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;
use trellis_core::context::suppress_user_reset_from_env;
use trellis_core::{
    ControllerServer, DEFAULT_ROUTING_ROOT_PATH, LogConfig, LogFormat, LogLevel, RoutingConfig,
};

/// Prefix of the environment variables read by [`ServerSettings::from_env`]
pub const ENV_PREFIX: &str = "TRELLIS";

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "warning", "error"];
const LOG_FORMATS: &[&str] = &["json", "plain", "pretty", "compact"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Mount point of every controller route
    pub root_path: String,
    /// Fail the build when no controller is registered
    #[serde(deserialize_with = "flag")]
    pub force_controllers: bool,
    #[serde(deserialize_with = "flag")]
    pub suppress_user_reset: bool,
    #[serde(deserialize_with = "port")]
    pub port: u16,
    pub log_level: String,
    pub log_format: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            root_path: DEFAULT_ROUTING_ROOT_PATH.to_string(),
            force_controllers: true,
            suppress_user_reset: suppress_user_reset_from_env(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: "plain".to_string(),
        }
    }
}

impl ServerSettings {
    /// Defaults overridden by `TRELLIS_*` variables
    pub fn from_env() -> Result<Self> {
        Self::load(None::<&Path>)
    }

    /// Defaults, then `file` if given, then `TRELLIS_*` variables
    pub fn load(file: Option<impl AsRef<Path>>) -> Result<Self> {
        let manager = ConfigManager::with_prefix(ENV_PREFIX);
        if let Some(file) = file {
            manager.load_file(file)?;
        }
        manager.load_env()?;
        manager.load_validated()
    }

    /// Configure the dispatcher with these settings
    pub fn apply(&self, server: ControllerServer) -> ControllerServer {
        server
            .with_routing_config(RoutingConfig {
                root_path: self.root_path.clone(),
            })
            .force_controllers(self.force_controllers)
            .suppress_user_reset(self.suppress_user_reset)
    }

    pub fn log_config(&self) -> Result<LogConfig> {
        let level = LogLevel::from_str(&self.log_level).ok_or_else(|| {
            ConfigError::ValidationError(format!("unknown log level {:?}", self.log_level))
        })?;
        let format = LogFormat::from_str(&self.log_format).ok_or_else(|| {
            ConfigError::ValidationError(format!("unknown log format {:?}", self.log_format))
        })?;
        Ok(LogConfig::new().level(level).format(format))
    }
}

impl Validate for ServerSettings {
    fn validate(&self) -> Result<()> {
        ConfigValidator::is_route_path(&self.root_path, "root_path")?;
        ConfigValidator::is_port(self.port, "port")?;
        ConfigValidator::one_of(&self.log_level, LOG_LEVELS, "log_level")?;
        ConfigValidator::one_of(&self.log_format, LOG_FORMATS, "log_format")?;
        Ok(())
    }
}

/// Environment values arrive as strings; files may carry native types
#[derive(Deserialize)]
#[serde(untagged)]
enum Loose<T> {
    Native(T),
    Text(String),
}

fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<bool, D::Error> {
    match Loose::<bool>::deserialize(deserializer)? {
        Loose::Native(value) => Ok(value),
        Loose::Text(text) => match text.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" | "" => Ok(false),
            other => Err(serde::de::Error::custom(format!("invalid boolean {:?}", other))),
        },
    }
}

fn port<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<u16, D::Error> {
    match Loose::<u16>::deserialize(deserializer)? {
        Loose::Native(value) => Ok(value),
        Loose::Text(text) => text
            .trim()
            .parse()
            .map_err(|e| serde::de::Error::custom(format!("invalid port {:?}: {}", text, e))),
    }
}
