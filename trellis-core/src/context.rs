// Per-request context: transport handles, request scope and current user

use crate::container::ids;
use crate::logging::{trace, warn};
use crate::{Error, HttpRequest, Request, Response, Scope};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::sync::{Arc, Weak};

/// Environment variable that silences the user-reset warning when set
pub const SUPPRESS_USER_RESET_ENV: &str = "AUTH_SUPPRESS_USER_RESET";

/// An authenticated (or anonymous) user
#[async_trait]
pub trait Principal: Send + Sync {
    /// Free-form user details
    fn details(&self) -> &Value;

    async fn is_authenticated(&self) -> bool;

    /// Content-based authorization
    async fn is_resource_owner(&self, resource_id: &Value) -> bool;

    /// Role-based authorization
    async fn is_in_role(&self, role: &str) -> bool;
}

/// Looks up the user behind a request
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn get_user(
        &self,
        req: &Request,
        res: &Response,
    ) -> Result<Option<Arc<dyn Principal>>, Error>;
}

/// Everything the framework knows about one in-flight request.
///
/// Created before any application middleware runs and attached to the
/// request, so middleware and actions can recover it with
/// [`RequestContext::from_request`] or resolve it from the request scope
/// under [`ids::HTTP_CONTEXT`].
pub struct RequestContext {
    request: Request,
    response: Response,
    scope: Scope,
    user: RwLock<Option<Arc<dyn Principal>>>,
    suppress_user_reset: bool,
}

/// Extension slot holding the context; releases the request scope when the
/// request's extensions are cleared
struct ContextSlot(Arc<RequestContext>);

impl Drop for ContextSlot {
    fn drop(&mut self) {
        self.0.scope.release();
    }
}

impl RequestContext {
    /// Build the context for a request.
    ///
    /// Derives a child of `app_scope`, looks up the user through the
    /// [`AuthProvider`] bound under [`ids::AUTH_PROVIDER`] (if any) and binds
    /// the context itself into the child scope.
    pub async fn create(
        request: Request,
        response: Response,
        app_scope: &Scope,
        suppress_user_reset: bool,
    ) -> Result<Arc<Self>, Error> {
        let scope = app_scope.create_child();

        let user = if scope.is_bound(&ids::AUTH_PROVIDER) {
            let provider: Arc<dyn AuthProvider> = scope.resolve(&ids::AUTH_PROVIDER)?;
            provider.get_user(&request, &response).await?
        } else {
            None
        };

        trace!(
            path = %request.path(),
            authenticated_user = user.is_some(),
            "Request context created"
        );

        let context = Arc::new(Self {
            request,
            response,
            scope,
            user: RwLock::new(user),
            suppress_user_reset,
        });

        // Weak so the scope does not keep its own context alive
        let weak: Weak<RequestContext> = Arc::downgrade(&context);
        context
            .scope
            .rebind::<Arc<RequestContext>>(ids::HTTP_CONTEXT)
            .to_factory(move |_| {
                weak.upgrade().ok_or_else(|| {
                    Error::DependencyInjection("Request context has been released".to_string())
                })
            });

        Ok(context)
    }

    /// Stand-in context bound while the server is being built, so that
    /// controllers and middleware depending on a context can be probed
    pub fn placeholder() -> Arc<Self> {
        Arc::new(Self {
            request: Request::new(HttpRequest::default()),
            response: Response::new(),
            scope: Scope::new(),
            user: RwLock::new(None),
            suppress_user_reset: true,
        })
    }

    /// Associate the context with its request
    pub fn attach(self: &Arc<Self>) {
        self.request
            .extensions_mut()
            .insert(ContextSlot(Arc::clone(self)));
    }

    /// The context attached to a request, if any
    pub fn from_request(req: &Request) -> Option<Arc<Self>> {
        req.extensions()
            .get::<ContextSlot>()
            .map(|slot| Arc::clone(&slot.0))
    }

    /// The context bound in a request scope
    pub fn from_scope(scope: &Scope) -> Result<Arc<Self>, Error> {
        scope.resolve(&ids::HTTP_CONTEXT)
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn response(&self) -> &Response {
        &self.response
    }

    /// The request's own dependency scope
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn user(&self) -> Option<Arc<dyn Principal>> {
        self.user.read().clone()
    }

    /// Replace the current user. Overwriting an existing user is allowed but
    /// logged, unless suppressed.
    pub fn set_user(&self, user: Option<Arc<dyn Principal>>) {
        let mut slot = self.user.write();
        if slot.is_some() && !self.suppress_user_reset {
            warn!(
                "An user is already set. Setting again may be a mistake. Set the environment var \"{}\" to suppress this warning.",
                SUPPRESS_USER_RESET_ENV
            );
        }
        *slot = user;
    }
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("request", &self.request)
            .field("has_user", &self.user.read().is_some())
            .finish()
    }
}

/// Whether the environment asks to silence user-reset warnings
pub fn suppress_user_reset_from_env() -> bool {
    std::env::var(SUPPRESS_USER_RESET_ENV).is_ok_and(|value| !value.is_empty())
}
