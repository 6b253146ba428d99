//! Controller dispatcher
//!
//! [`ControllerServer`] turns a [`MetadataRegistry`] into routes on an
//! [`Application`]. Every request then goes through the same stages:
//!
//! 1. a request context is created and attached to the request
//! 2. the application-wide handlers added by [`ControllerServer::set_config`] run
//! 3. controller middleware, then action middleware
//! 4. the action is invoked with its extracted arguments
//! 5. its output is normalized and written to the response
//!
//! Any error after the first stage is handed to the application's error path.
//!
//! ```ignore
//! let scope = Scope::new();
//! let mut registry = MetadataRegistry::new();
//! registry.controller::<HealthController>("/health")
//!     .action(Action::get("/", "check", |c: Arc<HealthController>, _| async move { Ok(c.ok()) }))
//!     .register();
//!
//! let app = ControllerServer::new(scope, registry)
//!     .set_config(|app| { app.use_handler(request_logger()); })
//!     .build()?;
//! app.listen(3000).await?;
//! ```

use crate::container::ids;
use crate::context::suppress_user_reset_from_env;
use crate::logging::{debug, info, trace};
use crate::routing::join_paths;
use crate::{
    ActionDescriptor, ActionOutput, Application, AuthProvider, BoxedHandler, Error,
    MetadataRegistry, MiddlewareResolver, Next, ParameterBinding, Request, RequestContext,
    RequestHandler, Response, ResponseMessage, Router, Scope, extract_parameters,
};
use async_trait::async_trait;
use std::sync::Arc;

pub const DEFAULT_ROUTING_ROOT_PATH: &str = "/";

/// Hook run once against the application while the server is built
pub type ConfigFn = Box<dyn FnOnce(&mut Application) + Send>;

/// Where controller routes are mounted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingConfig {
    pub root_path: String,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            root_path: DEFAULT_ROUTING_ROOT_PATH.to_string(),
        }
    }
}

/// Builds an [`Application`] serving every registered controller
pub struct ControllerServer {
    scope: Scope,
    registry: MetadataRegistry,
    router: Router,
    app: Application,
    routing_config: RoutingConfig,
    config_fn: Option<ConfigFn>,
    error_config_fn: Option<ConfigFn>,
    force_controllers: bool,
    suppress_user_reset: bool,
}

impl ControllerServer {
    /// `scope` must hold every controller dependency and middleware
    pub fn new(scope: Scope, registry: MetadataRegistry) -> Self {
        Self {
            scope,
            registry,
            router: Router::new(),
            app: Application::new(),
            routing_config: RoutingConfig::default(),
            config_fn: None,
            error_config_fn: None,
            force_controllers: true,
            suppress_user_reset: suppress_user_reset_from_env(),
        }
    }

    /// Mount controller routes on an existing router
    pub fn with_router(mut self, router: Router) -> Self {
        self.router = router;
        self
    }

    pub fn with_routing_config(mut self, config: RoutingConfig) -> Self {
        self.routing_config = config;
        self
    }

    /// Build on top of an existing application
    pub fn with_application(mut self, app: Application) -> Self {
        self.app = app;
        self
    }

    /// Look up the user of every request through the provider built by
    /// `factory`, one provider per request
    pub fn with_auth_provider<P, F>(self, factory: F) -> Self
    where
        P: AuthProvider + 'static,
        F: Fn(&Scope) -> Result<P, Error> + Send + Sync + 'static,
    {
        self.scope
            .rebind::<Arc<dyn AuthProvider>>(ids::AUTH_PROVIDER)
            .in_request_scope()
            .to_factory(move |scope| Ok(Arc::new(factory(scope)?) as Arc<dyn AuthProvider>));
        self
    }

    /// Whether building without any controller is an error (default: true)
    pub fn force_controllers(mut self, force: bool) -> Self {
        self.force_controllers = force;
        self
    }

    /// Silence the warning logged when a request's user is replaced
    pub fn suppress_user_reset(mut self, suppress: bool) -> Self {
        self.suppress_user_reset = suppress;
        self
    }

    /// Hook for application-wide handlers, run before controller routes are added
    pub fn set_config(mut self, f: impl FnOnce(&mut Application) + Send + 'static) -> Self {
        self.config_fn = Some(Box::new(f));
        self
    }

    /// Hook for error handlers, run after controller routes are added
    pub fn set_error_config(mut self, f: impl FnOnce(&mut Application) + Send + 'static) -> Self {
        self.error_config_fn = Some(Box::new(f));
        self
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn registry(&self) -> &MetadataRegistry {
        &self.registry
    }

    /// Wire everything up.
    ///
    /// Fails on configuration errors: duplicate controller names, no
    /// controllers while they are forced, controllers or middleware that
    /// cannot be resolved.
    pub fn build(mut self) -> Result<Application, Error> {
        let mut app = std::mem::take(&mut self.app);

        app.use_handler(Arc::new(ContextInit {
            scope: self.scope.clone(),
            suppress_user_reset: self.suppress_user_reset,
        }));

        if let Some(config) = self.config_fn.take() {
            config(&mut app);
        }

        self.register_controllers(&mut app)?;

        if let Some(config) = self.error_config_fn.take() {
            config(&mut app);
        }

        info!(
            controllers = self.registry.controllers().len(),
            root = %self.routing_config.root_path,
            "Controller server built"
        );
        Ok(app)
    }

    fn register_controllers(&mut self, app: &mut Application) -> Result<(), Error> {
        // Stand-in context for build-time resolution
        self.scope
            .rebind::<Arc<RequestContext>>(ids::HTTP_CONTEXT)
            .to_constant(RequestContext::placeholder());

        for controller in self.registry.controllers() {
            if self.scope.is_bound_named(&ids::CONTROLLER, &controller.name) {
                return Err(Error::DuplicatedControllerName(controller.name.clone()));
            }
            controller.bind(&self.scope)?;
        }

        if !self.scope.is_bound(&ids::CONTROLLER) {
            if self.force_controllers {
                return Err(Error::NoControllersFound);
            }
            debug!("No controllers registered");
        }

        let resolver = MiddlewareResolver::new(&self.scope);
        let mut router = std::mem::take(&mut self.router);

        for controller in self.registry.controllers() {
            controller.probe(&self.scope)?;

            let controller_middleware = resolver.resolve(&controller.middleware)?;

            for action in self.registry.actions_for(controller.target) {
                let params = self
                    .registry
                    .parameters_for(controller.target, &action.key)
                    .to_vec();
                let route_middleware = resolver.resolve(&action.middleware)?;

                let mut chain: Vec<BoxedHandler> = controller_middleware.clone();
                chain.extend(route_middleware);
                chain.push(Arc::new(ActionHandler {
                    controller: controller.name.clone(),
                    action: action.clone(),
                    params,
                }));

                let path = join_paths(&controller.base_path, &action.path);
                debug!(
                    controller = %controller.name,
                    action = %action.key,
                    method = %action.method,
                    path = %path,
                    steps = chain.len(),
                    "Route registered"
                );
                router.route(action.method, path, chain);
            }
        }

        // Instances built while probing are not reused
        self.scope.release();

        app.use_router(self.routing_config.root_path.clone(), router);
        Ok(())
    }
}

/// First step of every request: builds and attaches the request context
struct ContextInit {
    scope: Scope,
    suppress_user_reset: bool,
}

#[async_trait]
impl RequestHandler for ContextInit {
    async fn handle(&self, req: Request, res: Response, next: Next) -> Result<(), Error> {
        let context =
            RequestContext::create(req, res, &self.scope, self.suppress_user_reset).await?;
        context.attach();
        next.call();
        Ok(())
    }
}

/// Last step of an action's chain
struct ActionHandler {
    controller: String,
    action: ActionDescriptor,
    params: Vec<ParameterBinding>,
}

impl ActionHandler {
    async fn dispatch(&self, req: &Request, res: &Response, next: &Next) -> Result<(), Error> {
        let context = RequestContext::from_request(req).ok_or_else(|| {
            Error::Internal("No request context attached to the request".to_string())
        })?;

        let args = extract_parameters(req, res, next, &self.params, Some(context.as_ref()));
        trace!(
            controller = %self.controller,
            action = %self.action.key,
            args = args.len(),
            "Invoking action"
        );

        let output = self
            .action
            .invoke(context.scope(), &self.controller, args)
            .await?;
        normalize(output, res).await
    }
}

#[async_trait]
impl RequestHandler for ActionHandler {
    async fn handle(&self, req: Request, res: Response, next: Next) -> Result<(), Error> {
        if let Err(err) = self.dispatch(&req, &res, &next).await {
            debug!(
                controller = %self.controller,
                action = %self.action.key,
                error = %err,
                "Action failed"
            );
            next.fail(err);
        }
        Ok(())
    }
}

/// Write an action's output to the response
pub async fn normalize(output: ActionOutput, res: &Response) -> Result<(), Error> {
    match output {
        ActionOutput::Message(message) => emit(&message, res).await,
        ActionOutput::Result(result) => {
            let message = result.to_response_message().await?;
            emit(&message, res).await
        }
        ActionOutput::SideEffect(effect) => {
            effect();
            Ok(())
        }
        ActionOutput::Value(value) => {
            if res.headers_sent() {
                return Ok(());
            }
            match value {
                None => res.send_status(204),
                Some(value) => res.send_value(&value),
            }
        }
    }
}

/// Copy a response message to the response: message headers first, then
/// content headers, then the status and body
pub async fn emit(message: &ResponseMessage, res: &Response) -> Result<(), Error> {
    for (name, value) in message.headers.iter() {
        res.append_header(name, value.to_string());
    }

    match &message.content {
        Some(content) => {
            for (name, value) in content.headers().iter() {
                res.append_header(name, value.to_string());
            }
            let body = content.read_as_string().await?;
            res.status(message.status_code);
            res.send(body)
        }
        None => res.send_status(message.status_code),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{OkNegotiatedContentResult, StringContent};
    use serde_json::json;

    #[tokio::test]
    async fn test_emit_keeps_both_header_sets() {
        let res = Response::new();
        let message = ResponseMessage::new(203)
            .with_header("x-trace", 17i64)
            .with_content(StringContent::new("body"));

        emit(&message, &res).await.unwrap();

        let out = res.to_http_response();
        assert_eq!(out.status, 203);
        assert_eq!(out.header("x-trace"), Some("17"));
        assert_eq!(out.header("content-type"), Some("text/plain"));
        assert_eq!(out.text(), "body");
    }

    #[tokio::test]
    async fn test_emit_without_content_sends_status() {
        let res = Response::new();
        emit(&ResponseMessage::new(404), &res).await.unwrap();

        let out = res.to_http_response();
        assert_eq!(out.status, 404);
        assert!(out.body.is_empty());
    }

    #[tokio::test]
    async fn test_normalize_variants() {
        let res = Response::new();
        normalize(ActionOutput::none(), &res).await.unwrap();
        assert_eq!(res.to_http_response().status, 204);

        let res = Response::new();
        normalize(json!({"a": 1}).into(), &res).await.unwrap();
        assert_eq!(res.to_http_response().json::<serde_json::Value>().unwrap(), json!({"a": 1}));

        let res = Response::new();
        normalize(OkNegotiatedContentResult::new(json!([1])).into(), &res)
            .await
            .unwrap();
        assert_eq!(res.to_http_response().text(), "[1]");

        let res = Response::new();
        let effect_res = res.clone();
        normalize(
            ActionOutput::side_effect(move || {
                let _ = effect_res.status(201).send("manual");
            }),
            &res,
        )
        .await
        .unwrap();
        assert_eq!(res.to_http_response().text(), "manual");
    }

    #[tokio::test]
    async fn test_value_ignored_after_response_sent() {
        let res = Response::new();
        res.status(202).send("already").unwrap();

        normalize("late".into(), &res).await.unwrap();
        assert_eq!(res.to_http_response().text(), "already");
    }

    #[test]
    fn test_default_routing_config() {
        assert_eq!(RoutingConfig::default().root_path, "/");
    }
}
