// Routing table for HTTP requests

use crate::{BoxedHandler, HttpMethod};
use std::collections::HashMap;

/// Route definition with its handler chain
#[derive(Clone)]
pub struct Route {
    pub method: HttpMethod,
    pub path: String,
    pub handlers: Vec<BoxedHandler>,
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

/// Ordered set of routes.
///
/// Routes are matched in registration order; when several routes match a
/// request, a chain that runs to completion falls through to the next match.
#[derive(Clone, Default, Debug)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    /// Add a route to the router
    pub fn add_route(&mut self, route: Route) {
        self.routes.push(route);
    }

    /// Register a handler chain for a verb and path pattern
    pub fn route(
        &mut self,
        method: HttpMethod,
        path: impl Into<String>,
        handlers: Vec<BoxedHandler>,
    ) -> &mut Self {
        self.add_route(Route {
            method,
            path: path.into(),
            handlers,
        });
        self
    }

    pub fn get(&mut self, path: impl Into<String>, handlers: Vec<BoxedHandler>) -> &mut Self {
        self.route(HttpMethod::GET, path, handlers)
    }

    pub fn post(&mut self, path: impl Into<String>, handlers: Vec<BoxedHandler>) -> &mut Self {
        self.route(HttpMethod::POST, path, handlers)
    }

    pub fn all(&mut self, path: impl Into<String>, handlers: Vec<BoxedHandler>) -> &mut Self {
        self.route(HttpMethod::ALL, path, handlers)
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Every route matching the request, in registration order, with the
    /// route parameters extracted from the path
    pub fn matches(&self, method: &str, path: &str) -> Vec<(&Route, HashMap<String, String>)> {
        self.routes
            .iter()
            .filter(|route| route.method.matches(method))
            .filter_map(|route| match_path(&route.path, path).map(|params| (route, params)))
            .collect()
    }
}

/// Join a controller base path and an action sub-path
pub fn join_paths(base: &str, sub: &str) -> String {
    format!("{}{}", base, sub)
}

/// Strip a mount point from a request path, returning the remainder when the
/// path lies below it
pub(crate) fn strip_mount<'a>(root: &str, path: &'a str) -> Option<&'a str> {
    let root = root.trim_end_matches('/');
    if root.is_empty() {
        return Some(path);
    }

    let rest = path.strip_prefix(root)?;
    if rest.is_empty() {
        Some("/")
    } else if rest.starts_with('/') {
        Some(rest)
    } else {
        None
    }
}

/// Match a route path pattern against a request path
/// Returns Some(params) if matched, None otherwise
pub(crate) fn match_path(pattern: &str, path: &str) -> Option<HashMap<String, String>> {
    if pattern == "*" {
        return Some(HashMap::new());
    }

    let pattern_parts: Vec<&str> = pattern.split('/').filter(|s| !s.is_empty()).collect();
    let path_parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    if pattern_parts.len() != path_parts.len() {
        return None;
    }

    let mut params = HashMap::new();

    for (pattern_part, path_part) in pattern_parts.iter().zip(path_parts.iter()) {
        if let Some(param_name) = pattern_part.strip_prefix(':') {
            let value = urlencoding::decode(path_part)
                .map(|decoded| decoded.into_owned())
                .unwrap_or_else(|_| path_part.to_string());
            params.insert(param_name.to_string(), value);
        } else if pattern_part != path_part {
            return None;
        }
    }

    Some(params)
}
