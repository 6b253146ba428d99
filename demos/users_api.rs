//! A small user directory served by controllers.
//!
//! ```bash
//! TRELLIS_PORT=8080 TRELLIS_LOG_LEVEL=debug cargo run --example users_api
//! curl localhost:8080/users/1
//! curl -X POST -H 'content-type: application/json' -H 'x-user: admin' \
//!     -d '{"name":"grace"}' localhost:8080/users
//! ```

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use trellis::prelude::*;
use trellis::trellis_config::ServerSettings;

#[derive(Clone, Serialize, Deserialize)]
struct User {
    id: u64,
    name: String,
}

#[derive(Default)]
struct UserStore {
    users: RwLock<Vec<User>>,
}

impl UserStore {
    fn find(&self, id: u64) -> Option<User> {
        self.users.read().iter().find(|u| u.id == id).cloned()
    }

    fn add(&self, name: String) -> User {
        let mut users = self.users.write();
        let user = User {
            id: users.len() as u64 + 1,
            name,
        };
        users.push(user.clone());
        user
    }
}

struct UserController {
    store: Arc<UserStore>,
}

impl Controller for UserController {
    fn create(scope: &Scope) -> Result<Self, Error> {
        Ok(Self {
            store: scope.resolve(&ServiceId::new("UserStore"))?,
        })
    }
}

struct Admin {
    details: Value,
}

#[async_trait]
impl Principal for Admin {
    fn details(&self) -> &Value {
        &self.details
    }

    async fn is_authenticated(&self) -> bool {
        true
    }

    async fn is_resource_owner(&self, _resource_id: &Value) -> bool {
        true
    }

    async fn is_in_role(&self, role: &str) -> bool {
        role == "admin"
    }
}

/// Treats the `x-user` header as the caller's name
struct HeaderAuth;

#[async_trait]
impl AuthProvider for HeaderAuth {
    async fn get_user(
        &self,
        req: &Request,
        _res: &Response,
    ) -> Result<Option<Arc<dyn Principal>>, Error> {
        Ok(req.header("x-user").map(|name| {
            Arc::new(Admin {
                details: json!({ "name": name }),
            }) as Arc<dyn Principal>
        }))
    }
}

/// Rejects anonymous callers
struct RequireUser;

#[async_trait]
impl BaseMiddleware for RequireUser {
    async fn handle(
        &self,
        injected: &Injected,
        _req: Request,
        _res: Response,
        next: Next,
    ) -> Result<(), Error> {
        match injected.http_context.user() {
            Some(user) if user.is_in_role("admin").await => {
                next.call();
                Ok(())
            }
            _ => Err(Error::Unauthorized("admin role required".to_string())),
        }
    }
}

fn routes(registry: &mut MetadataRegistry) {
    registry
        .controller::<UserController>("/users")
        .action(
            Action::get("/:id", "get_user", |c: Arc<UserController>, args: ActionArgs| async move {
                let id: u64 = args.parse(0)?;
                Ok(match c.store.find(id) {
                    Some(user) => ActionOutput::from(c.ok_with(user)),
                    None => ActionOutput::from(c.not_found()),
                })
            })
            .param_named(0, ParameterType::Params, "id"),
        )
        .action(
            Action::post("/", "create_user", |c: Arc<UserController>, args: ActionArgs| async move {
                let name = args.value(0)?["name"]
                    .as_str()
                    .ok_or_else(|| Error::BadRequest("name must be a string".to_string()))?
                    .to_string();
                let user = c.store.add(name);
                Ok(c.created(format!("/users/{}", user.id), user))
            })
            .param(0, ParameterType::Body)
            .middleware("RequireUser"),
        )
        .register();
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let settings = ServerSettings::from_env()?;
    let _guard = settings.log_config()?.init()?;

    let scope = Scope::new();
    scope
        .bind::<Arc<UserStore>>("UserStore")
        .in_singleton_scope()
        .to_factory(|_| Ok(Arc::new(UserStore::default())));
    bind_middleware(&scope, "RequireUser", |_| Ok(RequireUser));

    let mut registry = MetadataRegistry::new();
    routes(&mut registry);

    for route in trellis::get_route_info(&registry) {
        tracing::info!(controller = %route.controller, endpoints = route.endpoints.len(), "Routes");
    }

    let app = settings
        .apply(ControllerServer::new(scope, registry))
        .with_auth_provider(|_| Ok(HeaderAuth))
        .build()?;

    app.listen(settings.port).await
}
