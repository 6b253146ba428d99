//! Routing metadata
//!
//! The registry is filled at startup, before the server is built, and only
//! read afterwards. Controllers are listed most recently registered first;
//! actions keep their registration order; parameter bindings of one action
//! are stored most recently registered first.
//!
//! ```ignore
//! let mut registry = MetadataRegistry::new();
//!
//! registry
//!     .controller::<UserController>("/users")
//!     .middleware(ServiceId::new("Auth"))
//!     .action(
//!         Action::get("/:id", "get_user", |c: Arc<UserController>, args| async move {
//!             let id: u64 = args.parse(0)?;
//!             Ok(c.ok_with(c.find(id)?))
//!         })
//!         .param_named(0, ParameterType::Params, "id"),
//!     )
//!     .register();
//! ```

use crate::container::ids;
use crate::logging::debug;
use crate::{
    ActionArgs, ActionOutput, Controller, Error, HttpMethod, MiddlewareRef, ParameterBinding,
    ParameterType, Scope,
};
use futures_util::future::BoxFuture;
use std::any::TypeId;
use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

pub type ActionFuture = BoxFuture<'static, Result<ActionOutput, Error>>;

type Invoker = Arc<dyn Fn(&Scope, &str, ActionArgs) -> ActionFuture + Send + Sync>;
type ControllerHook = Arc<dyn Fn(&Scope, &str) -> Result<(), Error> + Send + Sync>;

/// One registered controller
#[derive(Clone)]
pub struct ControllerDescriptor {
    pub target: TypeId,
    pub name: String,
    pub base_path: String,
    pub middleware: Vec<MiddlewareRef>,
    binder: ControllerHook,
    probe: ControllerHook,
}

impl ControllerDescriptor {
    pub fn new<C: Controller>(base_path: impl Into<String>, middleware: Vec<MiddlewareRef>) -> Self {
        let binder: ControllerHook = Arc::new(|scope: &Scope, name: &str| {
            scope
                .bind::<Arc<C>>(ids::CONTROLLER)
                .named(name)
                .in_request_scope()
                .to_factory(|scope| Ok(Arc::new(C::create(scope)?)));
            Ok(())
        });
        let probe: ControllerHook = Arc::new(|scope: &Scope, name: &str| {
            scope
                .resolve_named::<Arc<C>>(&ids::CONTROLLER, name)
                .map(|_| ())
        });

        Self {
            target: TypeId::of::<C>(),
            name: C::name(),
            base_path: base_path.into(),
            middleware,
            binder,
            probe,
        }
    }

    /// Bind the controller under [`ids::CONTROLLER`], named by its name,
    /// one instance per request
    pub fn bind(&self, scope: &Scope) -> Result<(), Error> {
        (self.binder)(scope, &self.name)
    }

    /// Build one instance to surface constructor failures early
    pub fn probe(&self, scope: &Scope) -> Result<(), Error> {
        (self.probe)(scope, &self.name)
    }
}

impl std::fmt::Debug for ControllerDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerDescriptor")
            .field("name", &self.name)
            .field("base_path", &self.base_path)
            .field("middleware", &self.middleware)
            .finish()
    }
}

/// One verb+path bound method of a controller
#[derive(Clone)]
pub struct ActionDescriptor {
    pub controller: TypeId,
    pub key: String,
    pub method: HttpMethod,
    pub path: String,
    pub middleware: Vec<MiddlewareRef>,
    invoker: Invoker,
}

impl ActionDescriptor {
    /// Resolve the controller named `controller` from `scope` and run the action
    pub fn invoke(&self, scope: &Scope, controller: &str, args: ActionArgs) -> ActionFuture {
        (self.invoker)(scope, controller, args)
    }
}

impl std::fmt::Debug for ActionDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionDescriptor")
            .field("key", &self.key)
            .field("method", &self.method)
            .field("path", &self.path)
            .field("middleware", &self.middleware)
            .finish()
    }
}

/// Store of controller, action and parameter metadata
#[derive(Clone, Debug, Default)]
pub struct MetadataRegistry {
    controllers: Vec<ControllerDescriptor>,
    actions: HashMap<TypeId, Vec<ActionDescriptor>>,
    parameters: HashMap<(TypeId, String), Vec<ParameterBinding>>,
}

impl MetadataRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_controller(&mut self, descriptor: ControllerDescriptor) {
        debug!(
            controller = %descriptor.name,
            path = %descriptor.base_path,
            "Controller registered"
        );
        self.controllers.insert(0, descriptor);
    }

    pub fn register_action(&mut self, descriptor: ActionDescriptor) {
        debug!(
            action = %descriptor.key,
            method = %descriptor.method,
            path = %descriptor.path,
            "Action registered"
        );
        self.actions
            .entry(descriptor.controller)
            .or_default()
            .push(descriptor);
    }

    pub fn register_parameter(&mut self, target: TypeId, method_key: &str, binding: ParameterBinding) {
        self.parameters
            .entry((target, method_key.to_string()))
            .or_default()
            .insert(0, binding);
    }

    pub fn controllers(&self) -> &[ControllerDescriptor] {
        &self.controllers
    }

    pub fn actions_for(&self, target: TypeId) -> &[ActionDescriptor] {
        self.actions.get(&target).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn parameters_for(&self, target: TypeId, method_key: &str) -> &[ParameterBinding] {
        self.parameters
            .get(&(target, method_key.to_string()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Forget every registered controller, action and parameter
    pub fn clear(&mut self) {
        self.controllers.clear();
        self.actions.clear();
        self.parameters.clear();
    }

    /// Start registering controller `C` under `base_path`
    pub fn controller<C: Controller>(&mut self, base_path: impl Into<String>) -> ControllerBuilder<'_, C> {
        ControllerBuilder {
            registry: self,
            base_path: base_path.into(),
            middleware: Vec::new(),
            actions: Vec::new(),
        }
    }
}

/// Typed action declaration for controller `C`
pub struct Action<C> {
    method: HttpMethod,
    path: String,
    key: String,
    middleware: Vec<MiddlewareRef>,
    params: Vec<ParameterBinding>,
    invoker: Invoker,
    _controller: PhantomData<fn() -> C>,
}

impl<C: Controller> Action<C> {
    pub fn new<F, Fut, R>(method: HttpMethod, path: impl Into<String>, key: impl Into<String>, f: F) -> Self
    where
        F: Fn(Arc<C>, ActionArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, Error>> + Send + 'static,
        R: Into<ActionOutput> + 'static,
    {
        let invoker: Invoker = Arc::new(
            move |scope: &Scope, controller: &str, args: ActionArgs| -> ActionFuture {
                match scope.resolve_named::<Arc<C>>(&ids::CONTROLLER, controller) {
                    Ok(instance) => {
                        let fut = f(instance, args);
                        Box::pin(async move { fut.await.map(Into::into) })
                    }
                    Err(err) => Box::pin(async move { Err(err) }),
                }
            },
        );

        Self {
            method,
            path: path.into(),
            key: key.into(),
            middleware: Vec::new(),
            params: Vec::new(),
            invoker,
            _controller: PhantomData,
        }
    }

    pub fn get<F, Fut, R>(path: impl Into<String>, key: impl Into<String>, f: F) -> Self
    where
        F: Fn(Arc<C>, ActionArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, Error>> + Send + 'static,
        R: Into<ActionOutput> + 'static,
    {
        Self::new(HttpMethod::GET, path, key, f)
    }

    pub fn post<F, Fut, R>(path: impl Into<String>, key: impl Into<String>, f: F) -> Self
    where
        F: Fn(Arc<C>, ActionArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, Error>> + Send + 'static,
        R: Into<ActionOutput> + 'static,
    {
        Self::new(HttpMethod::POST, path, key, f)
    }

    pub fn put<F, Fut, R>(path: impl Into<String>, key: impl Into<String>, f: F) -> Self
    where
        F: Fn(Arc<C>, ActionArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, Error>> + Send + 'static,
        R: Into<ActionOutput> + 'static,
    {
        Self::new(HttpMethod::PUT, path, key, f)
    }

    pub fn patch<F, Fut, R>(path: impl Into<String>, key: impl Into<String>, f: F) -> Self
    where
        F: Fn(Arc<C>, ActionArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, Error>> + Send + 'static,
        R: Into<ActionOutput> + 'static,
    {
        Self::new(HttpMethod::PATCH, path, key, f)
    }

    pub fn delete<F, Fut, R>(path: impl Into<String>, key: impl Into<String>, f: F) -> Self
    where
        F: Fn(Arc<C>, ActionArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, Error>> + Send + 'static,
        R: Into<ActionOutput> + 'static,
    {
        Self::new(HttpMethod::DELETE, path, key, f)
    }

    pub fn head<F, Fut, R>(path: impl Into<String>, key: impl Into<String>, f: F) -> Self
    where
        F: Fn(Arc<C>, ActionArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, Error>> + Send + 'static,
        R: Into<ActionOutput> + 'static,
    {
        Self::new(HttpMethod::HEAD, path, key, f)
    }

    pub fn all<F, Fut, R>(path: impl Into<String>, key: impl Into<String>, f: F) -> Self
    where
        F: Fn(Arc<C>, ActionArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, Error>> + Send + 'static,
        R: Into<ActionOutput> + 'static,
    {
        Self::new(HttpMethod::ALL, path, key, f)
    }

    pub fn middleware(mut self, middleware: impl Into<MiddlewareRef>) -> Self {
        self.middleware.push(middleware.into());
        self
    }

    /// Bind argument `index` to the whole of `kind`
    pub fn param(mut self, index: usize, kind: ParameterType) -> Self {
        self.params.push(ParameterBinding::new(index, kind));
        self
    }

    /// Bind argument `index` to the entry `name` of `kind`
    pub fn param_named(mut self, index: usize, kind: ParameterType, name: impl Into<String>) -> Self {
        self.params.push(ParameterBinding::named(index, kind, name));
        self
    }
}

/// Fluent registration of one controller, see [`MetadataRegistry::controller`]
#[must_use = "nothing is registered until `register` is called"]
pub struct ControllerBuilder<'r, C> {
    registry: &'r mut MetadataRegistry,
    base_path: String,
    middleware: Vec<MiddlewareRef>,
    actions: Vec<Action<C>>,
}

impl<'r, C: Controller> ControllerBuilder<'r, C> {
    pub fn middleware(mut self, middleware: impl Into<MiddlewareRef>) -> Self {
        self.middleware.push(middleware.into());
        self
    }

    pub fn action(mut self, action: Action<C>) -> Self {
        self.actions.push(action);
        self
    }

    pub fn register(self) {
        let target = TypeId::of::<C>();
        self.registry
            .register_controller(ControllerDescriptor::new::<C>(self.base_path, self.middleware));

        for action in self.actions {
            for binding in action.params {
                self.registry.register_parameter(target, &action.key, binding);
            }
            self.registry.register_action(ActionDescriptor {
                controller: target,
                key: action.key,
                method: action.method,
                path: action.path,
                middleware: action.middleware,
                invoker: action.invoker,
            });
        }
    }
}
