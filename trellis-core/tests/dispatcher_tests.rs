// End-to-end tests of the controller dispatcher, driven through
// `Application::handle` without sockets

use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use trellis_core::*;

#[derive(Clone)]
struct Greeter {
    greeting: String,
}

struct UserController {
    greeter: Arc<Greeter>,
}

impl Controller for UserController {
    fn create(scope: &Scope) -> Result<Self, Error> {
        Ok(Self {
            greeter: scope.resolve(&ServiceId::new("Greeter"))?,
        })
    }
}

struct TestUser {
    details: Value,
}

#[async_trait]
impl Principal for TestUser {
    fn details(&self) -> &Value {
        &self.details
    }

    async fn is_authenticated(&self) -> bool {
        true
    }

    async fn is_resource_owner(&self, resource_id: &Value) -> bool {
        self.details["id"] == *resource_id
    }

    async fn is_in_role(&self, role: &str) -> bool {
        role == "admin"
    }
}

struct HeaderAuth;

#[async_trait]
impl AuthProvider for HeaderAuth {
    async fn get_user(
        &self,
        req: &Request,
        _res: &Response,
    ) -> Result<Option<Arc<dyn Principal>>, Error> {
        Ok(req.header("x-user").map(|name| {
            Arc::new(TestUser {
                details: json!({"name": name, "id": 7}),
            }) as Arc<dyn Principal>
        }))
    }
}

fn app_scope() -> Scope {
    let scope = Scope::new();
    scope
        .bind::<Arc<Greeter>>("Greeter")
        .in_singleton_scope()
        .to_constant(Arc::new(Greeter {
            greeting: "hello".to_string(),
        }));
    scope
}

fn user_routes(registry: &mut MetadataRegistry) {
    registry
        .controller::<UserController>("/users")
        .action(Action::get("/", "list", |_c: Arc<UserController>, args: ActionArgs| async move {
            Ok(json!({ "args": args.len() }))
        }))
        .action(
            Action::get("/:id", "get_user", |c: Arc<UserController>, args: ActionArgs| async move {
                let id: u64 = args.parse(0)?;
                Ok(c.ok_with(json!({ "id": id, "greeting": c.greeter.greeting })))
            })
            .param_named(0, ParameterType::Params, "id"),
        )
        .action(
            Action::get("/me/key", "api_key", |_c: Arc<UserController>, args: ActionArgs| async move {
                args.string(0)
            })
            .param_named(0, ParameterType::Headers, "X-Api-Key"),
        )
        .action(
            Action::get("/me/profile", "profile", |_c: Arc<UserController>, args: ActionArgs| async move {
                let user = args.principal(0)?;
                let (req, _res, _next) = args.transport()?;
                Ok(json!({
                    "args": args.len(),
                    "user": user.map(|u| u.details().clone()),
                    "path": req.path(),
                }))
            })
            .param(0, ParameterType::Principal),
        )
        .action(Action::delete("/:id", "remove", |_c: Arc<UserController>, _args| async move {
            Ok(())
        }))
        .action(Action::post("/", "create", |c: Arc<UserController>, args: ActionArgs| async move {
            let body = args.value(0)?.clone();
            Ok(c.created("/users/42", body))
        })
        .param(0, ParameterType::Body))
        .action(Action::get("/old/home", "moved", |c: Arc<UserController>, _args| async move {
            Ok(c.redirect("/users/"))
        }))
        .action(Action::put("/:id", "update", |c: Arc<UserController>, _args| async move {
            Ok(c.bad_request_message("name is required"))
        }))
        .action(Action::patch("/:id", "touch", |c: Arc<UserController>, _args| async move {
            Ok(c.ok())
        }))
        .action(Action::get("/fail/forbidden", "forbidden", |_c: Arc<UserController>, _args| async move {
            Err::<(), _>(Error::Forbidden("not yours".to_string()))
        }))
        .register();
}

fn build() -> Application {
    let mut registry = MetadataRegistry::new();
    user_routes(&mut registry);
    ControllerServer::new(app_scope(), registry)
        .with_auth_provider(|_| Ok(HeaderAuth))
        .suppress_user_reset(true)
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_action_without_bindings_gets_transport_arguments() {
    let app = build();
    let res = app.handle(HttpRequest::new("GET", "/users/")).await;

    assert_eq!(res.status, 200);
    assert_eq!(res.json::<Value>().unwrap(), json!({"args": 3}));
}

#[tokio::test]
async fn test_route_param_and_constructor_injection() {
    let app = build();
    let res = app.handle(HttpRequest::new("GET", "/users/12")).await;

    assert_eq!(res.status, 200);
    assert_eq!(res.header("content-type"), Some("application/json"));
    assert_eq!(
        res.json::<Value>().unwrap(),
        json!({"id": 12, "greeting": "hello"})
    );
}

#[tokio::test]
async fn test_header_binding_is_case_insensitive() {
    let app = build();
    let res = app
        .handle(HttpRequest::new("GET", "/users/me/key").with_header("x-API-key", "s3cret"))
        .await;

    assert_eq!(res.status, 200);
    assert_eq!(res.text(), "s3cret");
}

#[tokio::test]
async fn test_principal_binding_with_transport_appended() {
    let app = build();

    let res = app
        .handle(HttpRequest::new("GET", "/users/me/profile").with_header("X-User", "ada"))
        .await;
    assert_eq!(
        res.json::<Value>().unwrap(),
        json!({"args": 4, "user": {"name": "ada", "id": 7}, "path": "/users/me/profile"})
    );

    let anonymous = app.handle(HttpRequest::new("GET", "/users/me/profile")).await;
    assert_eq!(anonymous.json::<Value>().unwrap()["user"], Value::Null);
}

#[tokio::test]
async fn test_absent_return_value_is_no_content() {
    let app = build();
    let res = app.handle(HttpRequest::new("DELETE", "/users/3")).await;

    assert_eq!(res.status, 204);
    assert!(res.body.is_empty());
}

#[tokio::test]
async fn test_created_result() {
    let app = build();
    let res = app
        .handle(
            HttpRequest::new("POST", "/users/")
                .with_json(&json!({"name": "ada"}))
                .unwrap(),
        )
        .await;

    assert_eq!(res.status, 201);
    assert_eq!(res.header("location"), Some("/users/42"));
    assert_eq!(res.json::<Value>().unwrap(), json!({"name": "ada"}));
}

#[tokio::test]
async fn test_redirect_result() {
    let app = build();
    let res = app.handle(HttpRequest::new("GET", "/users/old/home")).await;

    assert_eq!(res.status, 302);
    assert_eq!(res.header("location"), Some("/users/"));
}

#[tokio::test]
async fn test_bad_request_message_and_ok_results() {
    let app = build();

    let res = app.handle(HttpRequest::new("PUT", "/users/1")).await;
    assert_eq!(res.status, 400);
    assert_eq!(res.header("content-type"), Some("text/plain"));
    assert_eq!(res.text(), "name is required");

    let res = app.handle(HttpRequest::new("PATCH", "/users/1")).await;
    assert_eq!(res.status, 200);
    assert!(res.body.is_empty());
}

#[tokio::test]
async fn test_action_error_uses_default_rendering() {
    let app = build();
    let res = app.handle(HttpRequest::new("GET", "/users/fail/forbidden")).await;

    assert_eq!(res.status, 403);
    assert_eq!(
        res.json::<Value>().unwrap(),
        json!({"error": "Forbidden: not yours", "status": 403})
    );
}

#[tokio::test]
async fn test_error_config_runs_after_routes() {
    let mut registry = MetadataRegistry::new();
    user_routes(&mut registry);

    let app = ControllerServer::new(app_scope(), registry)
        .set_error_config(|app| {
            app.use_error_handler(error_handler_fn(|err, _req, res, _next| async move {
                res.status(err.status_code());
                res.send_json(&json!({ "message": err.to_string(), "handled": true }))
            }));
        })
        .build()
        .unwrap();

    let res = app.handle(HttpRequest::new("GET", "/users/fail/forbidden")).await;
    assert_eq!(res.status, 403);
    assert_eq!(res.json::<Value>().unwrap()["handled"], true);
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let app = build();
    let res = app.handle(HttpRequest::new("GET", "/orders")).await;
    assert_eq!(res.status, 404);
}

#[tokio::test]
async fn test_root_path_prefixes_every_route() {
    let mut registry = MetadataRegistry::new();
    user_routes(&mut registry);

    let app = ControllerServer::new(app_scope(), registry)
        .with_routing_config(RoutingConfig {
            root_path: "/api/v1".to_string(),
        })
        .build()
        .unwrap();

    assert_eq!(app.handle(HttpRequest::new("GET", "/api/v1/users/5")).await.status, 200);
    assert_eq!(app.handle(HttpRequest::new("GET", "/users/5")).await.status, 404);
}

#[tokio::test]
async fn test_config_handlers_run_before_controllers() {
    let mut registry = MetadataRegistry::new();
    user_routes(&mut registry);

    let app = ControllerServer::new(app_scope(), registry)
        .set_config(|app| {
            app.use_handler(handler_fn(|req, res, next| async move {
                // The request context exists before application middleware
                let has_context = RequestContext::from_request(&req).is_some();
                res.set_header("x-context", has_context.to_string());
                next.call();
                Ok(())
            }));
        })
        .build()
        .unwrap();

    let res = app.handle(HttpRequest::new("GET", "/users/")).await;
    assert_eq!(res.header("x-context"), Some("true"));
}

struct Duplicate;
struct AlsoDuplicate;

impl Controller for Duplicate {
    fn create(_scope: &Scope) -> Result<Self, Error> {
        Ok(Duplicate)
    }

    fn name() -> String {
        "Shared".to_string()
    }
}

impl Controller for AlsoDuplicate {
    fn create(_scope: &Scope) -> Result<Self, Error> {
        Ok(AlsoDuplicate)
    }

    fn name() -> String {
        "Shared".to_string()
    }
}

#[test]
fn test_duplicate_controller_names_fail_build() {
    let mut registry = MetadataRegistry::new();
    registry.controller::<Duplicate>("/a").register();
    registry.controller::<AlsoDuplicate>("/b").register();

    let result = ControllerServer::new(Scope::new(), registry).build();
    match result {
        Err(Error::DuplicatedControllerName(name)) => assert_eq!(name, "Shared"),
        other => panic!("expected duplicate name error, got {:?}", other.err()),
    }
}

#[tokio::test]
async fn test_no_controllers() {
    let forced = ControllerServer::new(Scope::new(), MetadataRegistry::new()).build();
    assert!(matches!(forced, Err(Error::NoControllersFound)));

    let app = ControllerServer::new(Scope::new(), MetadataRegistry::new())
        .force_controllers(false)
        .build()
        .unwrap();
    assert_eq!(app.handle(HttpRequest::new("GET", "/")).await.status, 404);
}

#[test]
fn test_unresolvable_controller_fails_build() {
    let mut registry = MetadataRegistry::new();
    user_routes(&mut registry);

    // Greeter is never bound
    let result = ControllerServer::new(Scope::new(), registry).build();
    assert!(matches!(result, Err(Error::ProviderNotFound(_))));
}

struct VisitController {
    context: Arc<RequestContext>,
    visit: Arc<Visit>,
}

struct Visit {
    number: usize,
}

impl Controller for VisitController {
    fn create(scope: &Scope) -> Result<Self, Error> {
        Ok(Self {
            context: RequestContext::from_scope(scope)?,
            visit: scope.resolve(&ServiceId::new("Visit"))?,
        })
    }
}

#[tokio::test]
async fn test_request_lifetime_and_context_injection() {
    let counter = Arc::new(AtomicUsize::new(0));
    let scope = Scope::new();
    let visits = counter.clone();
    scope
        .bind::<Arc<Visit>>("Visit")
        .in_request_scope()
        .to_factory(move |_| {
            Ok(Arc::new(Visit {
                number: visits.fetch_add(1, Ordering::SeqCst),
            }))
        });

    let mut registry = MetadataRegistry::new();
    registry
        .controller::<VisitController>("/visits")
        .action(Action::get("/", "show", |c: Arc<VisitController>, _args| async move {
            let again: Arc<Visit> = c.context.scope().resolve(&ServiceId::new("Visit"))?;
            Ok(json!({
                "number": c.visit.number,
                "same_instance": Arc::ptr_eq(&again, &c.visit),
                "path": c.context.request().path(),
            }))
        }))
        .register();

    let app = ControllerServer::new(scope, registry).build().unwrap();
    // One instance was built while probing the controller
    let probed = counter.load(Ordering::SeqCst);

    let first = app.handle(HttpRequest::new("GET", "/visits")).await;
    let second = app.handle(HttpRequest::new("GET", "/visits")).await;

    let first: Value = first.json().unwrap();
    let second: Value = second.json().unwrap();
    assert_eq!(first["same_instance"], true);
    assert_eq!(first["path"], "/visits");
    assert_eq!(first["number"], probed);
    assert_eq!(second["number"], probed + 1);
}

#[test]
fn test_debug_route_info_matches_registration() {
    let mut registry = MetadataRegistry::new();
    user_routes(&mut registry);

    let info = get_route_info(&registry);
    assert_eq!(info[0].controller, "UserController");

    let profile = info[0]
        .endpoints
        .iter()
        .find(|endpoint| endpoint.route == "GET /users/me/profile")
        .unwrap();
    assert_eq!(profile.args, Some(vec!["@PrincipalUser".to_string()]));
}
