//! # Router
//!
//! Per-method route tables searched in registration order.
//!
//! The first route whose pattern matches wins, so register specific routes
//! before general ones: `/users/new` must come before `/users/{id}` to be
//! reachable. Registering the same method and pattern twice replaces the
//! earlier route in its original position.

use crate::error::Error;
use crate::middleware::Middleware;
use crate::path::PathParams;
use crate::route::{Handler, Route, RouteTarget};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

/// HTTP methods supported by the router
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// HTTP GET
    Get,
    /// HTTP POST
    Post,
    /// HTTP PUT
    Put,
    /// HTTP PATCH
    Patch,
    /// HTTP DELETE
    Delete,
}

impl Method {
    /// Every supported method
    pub const ALL: [Self; 5] = [Self::Get, Self::Post, Self::Put, Self::Patch, Self::Delete];

    /// Canonical method token
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = Error;

    /// Method tokens are case-sensitive, as in HTTP
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| Error::MethodNotAllowed {
                method: s.to_string(),
            })
    }
}

/// A successful lookup: the route plus its captured parameters
#[derive(Debug)]
pub struct RouteMatch<'r> {
    /// The matched route
    pub route: &'r Route,
    /// Captured parameters in declaration order
    pub params: PathParams,
}

/// Outcome of a route lookup
#[derive(Debug)]
pub enum Lookup<'r> {
    /// A route matched
    Found(RouteMatch<'r>),
    /// The method is known but no pattern matched
    NotFound,
    /// The method has no route table
    MethodNotAllowed,
}

/// Route table keyed by method
#[derive(Clone)]
pub struct Router {
    tables: HashMap<Method, Vec<Route>>,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    /// Create a router with an empty table for every supported method
    #[must_use]
    pub fn new() -> Self {
        Self {
            tables: Method::ALL.into_iter().map(|m| (m, Vec::new())).collect(),
        }
    }

    /// Register a route.
    ///
    /// `pattern` is parsed once here. Re-registering an existing
    /// `(method, pattern)` pair overwrites that route in place, keeping its
    /// match priority.
    pub fn add_route(
        &mut self,
        method: Method,
        pattern: &str,
        target: impl Into<RouteTarget>,
        middleware: Vec<Arc<dyn Middleware>>,
    ) -> &mut Self {
        let route = Route::new(method, pattern, target.into(), middleware);
        let table = self.tables.entry(method).or_default();

        match table.iter_mut().find(|r| r.pattern.source() == pattern) {
            Some(existing) => {
                debug!(%method, pattern, "Replacing route");
                *existing = route;
            }
            None => {
                debug!(%method, pattern, "Registering route");
                table.push(route);
            }
        }
        self
    }

    /// Find the first route for `method` whose pattern matches `path`
    #[must_use]
    pub fn lookup(&self, method: &str, path: &str) -> Lookup<'_> {
        let Some(table) = method.parse::<Method>().ok().and_then(|m| self.tables.get(&m)) else {
            return Lookup::MethodNotAllowed;
        };

        table
            .iter()
            .find_map(|route| {
                route
                    .pattern
                    .match_path(path)
                    .map(|params| RouteMatch { route, params })
            })
            .map_or(Lookup::NotFound, Lookup::Found)
    }

    /// Routes registered for `method`, in match order
    #[must_use]
    pub fn routes(&self, method: Method) -> &[Route] {
        self.tables.get(&method).map(Vec::as_slice).unwrap_or_default()
    }

    /// Convenience method to add a GET route
    pub fn get(&mut self, pattern: &str, handler: Handler) -> &mut Self {
        self.add_route(Method::Get, pattern, handler, Vec::new())
    }

    /// Convenience method to add a POST route
    pub fn post(&mut self, pattern: &str, handler: Handler) -> &mut Self {
        self.add_route(Method::Post, pattern, handler, Vec::new())
    }

    /// Convenience method to add a PUT route
    pub fn put(&mut self, pattern: &str, handler: Handler) -> &mut Self {
        self.add_route(Method::Put, pattern, handler, Vec::new())
    }

    /// Convenience method to add a PATCH route
    pub fn patch(&mut self, pattern: &str, handler: Handler) -> &mut Self {
        self.add_route(Method::Patch, pattern, handler, Vec::new())
    }

    /// Convenience method to add a DELETE route
    pub fn delete(&mut self, pattern: &str, handler: Handler) -> &mut Self {
        self.add_route(Method::Delete, pattern, handler, Vec::new())
    }
}
