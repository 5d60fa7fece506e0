use crate::errors::RouteError;
use crate::routing::parser::normalize_path;
use crate::routing::types::{HttpMethod, Route, RouteMatch};
use std::cmp::Reverse;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Routes kept in match priority order: most specific template first, ties in
/// registration order.
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: Vec<Arc<Route>>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    pub fn add_route(&mut self, route: Route) -> Result<(), RouteError> {
        if let Some(existing) = self.routes.iter().find(|existing| {
            existing.method == route.method
                && existing.template.normalized() == route.template.normalized()
        }) {
            return Err(RouteError::RouteConflict {
                method: route.method,
                pattern: route.template.pattern().to_string(),
                existing: existing.describe(),
            });
        }

        let rank = Reverse(route.template.specificity());
        let position = self
            .routes
            .iter()
            .position(|existing| Reverse(existing.template.specificity()) > rank)
            .unwrap_or(self.routes.len());
        log::debug!("route {} -> {}", route.describe(), route.resource);
        self.routes.insert(position, Arc::new(route));
        Ok(())
    }

    pub fn routes(&self) -> &[Arc<Route>] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Finds the route serving `method` on `path`.
    ///
    /// `HEAD` falls back to the `GET` route when no `HEAD` route matches.
    pub fn match_route(&self, method: HttpMethod, path: &str) -> Result<RouteMatch, RouteError> {
        let path = normalize_path(path);
        let mut path_matched = false;
        let mut get_fallback: Option<&Arc<Route>> = None;

        for route in &self.routes {
            if !route.template.is_match(&path) {
                continue;
            }
            path_matched = true;
            if route.method == method {
                return Ok(Self::matched(route, &path));
            }
            if method == HttpMethod::HEAD && route.method == HttpMethod::GET {
                get_fallback.get_or_insert(route);
            }
        }

        if let Some(route) = get_fallback {
            return Ok(Self::matched(route, &path));
        }
        if !path_matched {
            return Err(RouteError::NoRoute { method, path });
        }
        let allowed = self.allowed_methods(&path).unwrap_or_default();
        Err(RouteError::MethodNotAllowed {
            method,
            path,
            allowed,
        })
    }

    /// Methods served at `path`, including the implicit `HEAD` and `OPTIONS`.
    /// `None` when no template matches the path at all.
    pub fn allowed_methods(&self, path: &str) -> Option<BTreeSet<HttpMethod>> {
        let path = normalize_path(path);
        let mut allowed: BTreeSet<HttpMethod> = self
            .routes
            .iter()
            .filter(|route| route.template.is_match(&path))
            .map(|route| route.method)
            .collect();
        if allowed.is_empty() {
            return None;
        }
        if allowed.contains(&HttpMethod::GET) {
            allowed.insert(HttpMethod::HEAD);
        }
        allowed.insert(HttpMethod::OPTIONS);
        Some(allowed)
    }

    fn matched(route: &Arc<Route>, path: &str) -> RouteMatch {
        RouteMatch {
            route: Arc::clone(route),
            path_params: route.template.captures(path).unwrap_or_default(),
        }
    }
}

/// `Allow` header value for a method set.
pub fn allow_header(methods: &BTreeSet<HttpMethod>) -> String {
    methods
        .iter()
        .map(HttpMethod::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
