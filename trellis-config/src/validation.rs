// Configuration validation

use crate::{ConfigError, Result};

/// Checks run after configuration is deserialized
pub trait Validate {
    fn validate(&self) -> Result<()>;
}

/// Reusable field checks
pub struct ConfigValidator;

impl ConfigValidator {
    pub fn not_empty(value: &str, field: &str) -> Result<()> {
        if value.is_empty() {
            return Err(invalid(field, "cannot be empty"));
        }
        Ok(())
    }

    /// Route paths are absolute
    pub fn is_route_path(value: &str, field: &str) -> Result<()> {
        if !value.starts_with('/') {
            return Err(invalid(field, &format!("must start with '/', got {:?}", value)));
        }
        Ok(())
    }

    pub fn one_of(value: &str, allowed: &[&str], field: &str) -> Result<()> {
        if !allowed.iter().any(|candidate| candidate.eq_ignore_ascii_case(value)) {
            return Err(invalid(
                field,
                &format!("must be one of {}, got {:?}", allowed.join(", "), value),
            ));
        }
        Ok(())
    }

    pub fn is_port(value: u16, field: &str) -> Result<()> {
        if value == 0 {
            return Err(invalid(field, "must be a valid port number"));
        }
        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::ValidationError(format!("{} {}", field, reason))
}
