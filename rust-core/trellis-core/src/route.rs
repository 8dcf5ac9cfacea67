//! # Route Metadata
//!
//! A registered route: its method, pre-parsed pattern, target and the
//! middleware that runs only for it.

use crate::middleware::{BoxFuture, Middleware};
use crate::path::RoutePattern;
use crate::request::Request;
use crate::response::Response;
use crate::router::Method;
use std::future::Future;
use std::sync::Arc;

/// Route handler
///
/// Receives the request and the path parameter values **positionally**, in
/// the order the parameters are declared in the pattern. For
/// `/users/{user}/posts/{post}` the second argument is `[user, post]`.
pub type Handler = Arc<dyn Fn(Request, Vec<String>) -> BoxFuture<'static, Response> + Send + Sync>;

/// Wrap an async function or closure into a [`Handler`]
pub fn handler<F, Fut>(f: F) -> Handler
where
    F: Fn(Request, Vec<String>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    Arc::new(
        move |req: Request, args: Vec<String>| -> BoxFuture<'static, Response> {
            Box::pin(f(req, args))
        },
    )
}

/// What a matched route resolves to
#[derive(Clone)]
pub enum RouteTarget {
    /// Invoke this handler
    Handler(Handler),
    /// Redirect to `/<identifier>`
    Redirect(String),
}

impl std::fmt::Debug for RouteTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Handler(_) => f.write_str("Handler(..)"),
            Self::Redirect(to) => f.debug_tuple("Redirect").field(to).finish(),
        }
    }
}

impl From<Handler> for RouteTarget {
    fn from(handler: Handler) -> Self {
        Self::Handler(handler)
    }
}

impl From<&str> for RouteTarget {
    fn from(identifier: &str) -> Self {
        Self::Redirect(identifier.to_string())
    }
}

impl From<String> for RouteTarget {
    fn from(identifier: String) -> Self {
        Self::Redirect(identifier)
    }
}

/// A single registered route
#[derive(Clone)]
pub struct Route {
    /// HTTP method this route answers
    pub method: Method,
    /// Pattern, parsed once at registration
    pub pattern: RoutePattern,
    /// Handler or redirect target
    pub target: RouteTarget,
    /// Route-specific middleware, run after the global chain
    pub middleware: Vec<Arc<dyn Middleware>>,
}

impl Route {
    /// Create a route, parsing `pattern`
    #[must_use]
    pub fn new(
        method: Method,
        pattern: &str,
        target: RouteTarget,
        middleware: Vec<Arc<dyn Middleware>>,
    ) -> Self {
        Self {
            method,
            pattern: RoutePattern::parse(pattern),
            target,
            middleware,
        }
    }
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("pattern", &self.pattern.source())
            .field("target", &self.target)
            .field("middleware", &self.middleware.len())
            .finish()
    }
}
