// Trellis - controller-based routing for Rust HTTP services
//
// Controllers declare their routes in a metadata registry; the controller
// server turns them into an application with request-scoped dependency
// injection, declarative middleware and typed action results.

// Re-export core functionality
pub use trellis_core::*;

// Re-export optional crates
#[cfg(feature = "config")]
pub use trellis_config;

// Prelude for common imports
pub mod prelude {
    pub use crate::{
        Action,
        ActionArgs,
        ActionOutput,
        ActionResult,
        Application,
        AuthProvider,
        BaseMiddleware,
        Controller,
        ControllerServer,
        Error,
        HttpController,
        HttpMethod,
        HttpRequest,
        HttpResponse,
        Injected,
        MetadataRegistry,
        MiddlewareFactory,
        MiddlewareRef,
        Next,
        ParameterType,
        Principal,
        Request,
        RequestContext,
        RequestHandler,
        Response,
        ResponseMessage,
        Scope,
        ServiceId,
        bind_middleware,
        handler_fn,
    };

    #[cfg(feature = "config")]
    pub use trellis_config::ServerSettings;
}
