// Error types for the Trellis framework

use http::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors, raised while building the server
    #[error("Two controllers cannot have the same name: {0}")]
    DuplicatedControllerName(String),

    #[error(
        "No controllers have been found! Please ensure that you have register at least one Controller."
    )]
    NoControllersFound,

    #[error("Provider not found: {0}")]
    ProviderNotFound(String),

    #[error("Dependency injection error: {0}")]
    DependencyInjection(String),

    // Request errors
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Route not found: {0}")]
    RouteNotFound(String),

    #[error("Invalid argument at position {index}: {reason}")]
    Argument { index: usize, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        let status = match self {
            Error::RouteNotFound(_) | Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Argument { .. } | Error::Deserialization(_) | Error::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Error::Forbidden(_) => StatusCode::FORBIDDEN,

            // Default to 500 for everything else
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        status.as_u16()
    }

    /// Check if this is a client error (4xx)
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }

    /// Check if this is a server error (5xx)
    pub fn is_server_error(&self) -> bool {
        self.status_code() >= 500
    }

    /// Check if this error can only happen while the server is being built.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Error::DuplicatedControllerName(_)
                | Error::NoControllersFound
                | Error::ProviderNotFound(_)
                | Error::DependencyInjection(_)
        )
    }
}

/// Treats the error as a failure to read input. `serde_json` reports bad
/// serialize input as a data error too, so code that serializes must
/// `map_err` into [`Error::Serialization`] rather than use `?`.
impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() || err.is_syntax() || err.is_eof() {
            Error::Deserialization(err.to_string())
        } else {
            Error::Serialization(err.to_string())
        }
    }
}
