// Core library for the trellis controller framework
// Metadata registry, request-scoped DI, action results and the dispatcher

pub mod application;
pub mod container;
pub mod content;
pub mod context;
pub mod controller;
pub mod debug;
pub mod error;
pub mod extensions;
pub mod handler;
pub mod http;
pub mod logging;
pub mod message;
pub mod metadata;
pub mod middleware;
pub mod params;
pub mod results;
pub mod routing;
pub mod server;

// Re-export commonly used types
pub use application::*;
pub use container::{BindingBuilder, Lifetime, Scope, ServiceId, ids};
pub use content::*;
pub use context::*;
pub use controller::*;
pub use debug::{EndpointInfo, RawMetadata, RouteInfo, get_raw_metadata, get_route_info};
pub use error::*;
pub use extensions::*;
pub use handler::*;
pub use http::*;
pub use logging::{LogConfig, LogFormat, LogLevel, LogOutput};
pub use message::*;
pub use metadata::*;
pub use middleware::*;
pub use params::*;
pub use results::*;
pub use routing::{Route, Router, join_paths};
pub use server::*;
