// Middleware declared on controllers and actions
//
// A controller or action lists its middleware as `MiddlewareRef`s. When the
// server is built, the resolver turns every ref into a plain `RequestHandler`:
// handler refs are used as they are, service refs become wrappers that
// resolve a fresh `BaseMiddleware` from the request scope on every request.

use crate::container::BindingBuilder;
use crate::logging::{debug, trace};
use crate::{
    BoxedHandler, Error, Next, Request, RequestContext, RequestHandler, Response, Scope, ServiceId,
};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Middleware resolved through dependency injection
#[async_trait]
pub trait BaseMiddleware: Send + Sync {
    /// Same contract as [`RequestHandler::handle`], plus the injected request
    /// state. Returning `Err` fails the request.
    async fn handle(
        &self,
        injected: &Injected,
        req: Request,
        res: Response,
        next: Next,
    ) -> Result<(), Error>;
}

/// State injected into a [`BaseMiddleware`] for one invocation
#[derive(Debug, Clone)]
pub struct Injected {
    pub http_context: Arc<RequestContext>,
    /// Payload supplied by a [`MiddlewareFactory`] ref
    pub middleware_context: Option<Value>,
}

impl Injected {
    /// Bind a service in the request scope
    pub fn bind<T: Send + Sync + 'static>(&self, id: impl Into<ServiceId>) -> BindingBuilder<'_, T> {
        self.http_context.scope().bind(id)
    }

    /// Replace a service in the request scope
    pub fn rebind<T: Send + Sync + 'static>(
        &self,
        id: impl Into<ServiceId>,
    ) -> BindingBuilder<'_, T> {
        self.http_context.scope().rebind(id)
    }
}

/// A middleware identifier paired with a per-route payload
#[derive(Debug, Clone, PartialEq)]
pub struct MiddlewareFactory {
    pub identifier: ServiceId,
    pub context: Value,
}

impl MiddlewareFactory {
    pub fn new(identifier: impl Into<ServiceId>, context: Value) -> Self {
        Self {
            identifier: identifier.into(),
            context,
        }
    }
}

/// A declared middleware
#[derive(Clone)]
pub enum MiddlewareRef {
    /// Used directly as a chain step
    Handler(BoxedHandler),
    /// A [`BaseMiddleware`] bound under this id
    Service(ServiceId),
    Factory(MiddlewareFactory),
}

impl std::fmt::Debug for MiddlewareRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MiddlewareRef::Handler(_) => f.write_str("Handler"),
            MiddlewareRef::Service(id) => f.debug_tuple("Service").field(id).finish(),
            MiddlewareRef::Factory(factory) => f.debug_tuple("Factory").field(factory).finish(),
        }
    }
}

impl From<BoxedHandler> for MiddlewareRef {
    fn from(handler: BoxedHandler) -> Self {
        MiddlewareRef::Handler(handler)
    }
}

impl From<ServiceId> for MiddlewareRef {
    fn from(id: ServiceId) -> Self {
        MiddlewareRef::Service(id)
    }
}

impl From<&'static str> for MiddlewareRef {
    fn from(id: &'static str) -> Self {
        MiddlewareRef::Service(ServiceId::new(id))
    }
}

impl From<MiddlewareFactory> for MiddlewareRef {
    fn from(factory: MiddlewareFactory) -> Self {
        MiddlewareRef::Factory(factory)
    }
}

/// Register a [`BaseMiddleware`] under `id`, one instance per request
pub fn bind_middleware<M, F>(scope: &Scope, id: impl Into<ServiceId>, factory: F)
where
    M: BaseMiddleware + 'static,
    F: Fn(&Scope) -> Result<M, Error> + Send + Sync + 'static,
{
    scope
        .bind::<Arc<dyn BaseMiddleware>>(id)
        .in_request_scope()
        .to_factory(move |scope| Ok(Arc::new(factory(scope)?) as Arc<dyn BaseMiddleware>));
}

/// Turns middleware refs into chain steps
pub struct MiddlewareResolver<'a> {
    scope: &'a Scope,
}

impl<'a> MiddlewareResolver<'a> {
    /// `scope` is the application scope, used to check every service ref
    /// can be built before any request arrives
    pub fn new(scope: &'a Scope) -> Self {
        Self { scope }
    }

    pub fn resolve(&self, refs: &[MiddlewareRef]) -> Result<Vec<BoxedHandler>, Error> {
        refs.iter().map(|item| self.resolve_one(item)).collect()
    }

    fn resolve_one(&self, item: &MiddlewareRef) -> Result<BoxedHandler, Error> {
        let (identifier, context) = match item {
            MiddlewareRef::Handler(handler) => return Ok(handler.clone()),
            MiddlewareRef::Service(id) => (id.clone(), None),
            MiddlewareRef::Factory(factory) => {
                (factory.identifier.clone(), Some(factory.context.clone()))
            }
        };

        // Fail fast on misconfiguration; the instance is discarded
        self.scope
            .resolve::<Arc<dyn BaseMiddleware>>(&identifier)?;
        debug!(middleware = %identifier, "Middleware resolved");

        Ok(Arc::new(ScopedMiddleware {
            identifier,
            context,
        }))
    }
}

/// Chain step resolving its middleware from the request scope
struct ScopedMiddleware {
    identifier: ServiceId,
    context: Option<Value>,
}

impl ScopedMiddleware {
    async fn run(&self, req: Request, res: Response, next: Next) -> Result<(), Error> {
        let http_context = RequestContext::from_request(&req).ok_or_else(|| {
            Error::Internal(format!(
                "No request context attached while running middleware {}",
                self.identifier
            ))
        })?;

        let middleware: Arc<dyn BaseMiddleware> =
            http_context.scope().resolve(&self.identifier)?;
        let injected = Injected {
            http_context,
            middleware_context: self.context.clone(),
        };

        trace!(middleware = %self.identifier, "Running middleware");
        middleware.handle(&injected, req, res, next).await
    }
}

#[async_trait]
impl RequestHandler for ScopedMiddleware {
    async fn handle(&self, req: Request, res: Response, next: Next) -> Result<(), Error> {
        if let Err(err) = self.run(req, res, next.clone()).await {
            debug!(middleware = %self.identifier, error = %err, "Middleware failed");
            next.fail(err);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{HttpRequest, handler_fn};

    struct Tagging;

    #[async_trait]
    impl BaseMiddleware for Tagging {
        async fn handle(
            &self,
            injected: &Injected,
            _req: Request,
            res: Response,
            next: Next,
        ) -> Result<(), Error> {
            let tag = injected
                .middleware_context
                .as_ref()
                .and_then(|ctx| ctx["tag"].as_str())
                .unwrap_or("none")
                .to_string();
            res.set_header("x-tag", tag);
            next.call();
            Ok(())
        }
    }

    #[test]
    fn test_handler_refs_pass_through() {
        let scope = Scope::new();
        let handler = handler_fn(|_req, _res, _next| async move { Ok(()) });
        let resolved = MiddlewareResolver::new(&scope)
            .resolve(&[MiddlewareRef::Handler(handler.clone())])
            .unwrap();

        assert_eq!(resolved.len(), 1);
        assert!(Arc::ptr_eq(&resolved[0], &handler));
    }

    #[test]
    fn test_unbound_service_fails_fast() {
        let scope = Scope::new();
        let result = MiddlewareResolver::new(&scope).resolve(&["Missing".into()]);
        assert!(matches!(result, Err(Error::ProviderNotFound(_))));
    }

    #[tokio::test]
    async fn test_factory_ref_injects_payload() {
        let app = Scope::new();
        bind_middleware(&app, "Tagging", |_| Ok(Tagging));

        let steps = MiddlewareResolver::new(&app)
            .resolve(&[MiddlewareFactory::new("Tagging", serde_json::json!({"tag": "admin"})).into()])
            .unwrap();

        let req = Request::new(HttpRequest::new("GET", "/"));
        let res = Response::new();
        let context = RequestContext::create(req.clone(), res.clone(), &app, false)
            .await
            .unwrap();
        context.attach();

        let next = Next::new();
        steps[0].handle(req, res.clone(), next.clone()).await.unwrap();

        assert!(next.is_called());
        assert_eq!(res.header("x-tag").as_deref(), Some("admin"));
    }

    #[tokio::test]
    async fn test_missing_context_fails_request() {
        let app = Scope::new();
        bind_middleware(&app, "Tagging", |_| Ok(Tagging));
        let steps = MiddlewareResolver::new(&app).resolve(&["Tagging".into()]).unwrap();

        let next = Next::new();
        steps[0]
            .handle(
                Request::new(HttpRequest::new("GET", "/")),
                Response::new(),
                next.clone(),
            )
            .await
            .unwrap();

        assert!(matches!(next.take(), Some(crate::http::Signal::Fail(_))));
    }
}
