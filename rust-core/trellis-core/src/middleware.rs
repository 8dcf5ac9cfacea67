//! # Middleware System
//!
//! Continuation-style middleware. Each middleware gets the request and a
//! [`Next`] continuation; calling `next.run(req)` hands control to the rest
//! of the chain and eventually the route handler. Returning without calling
//! it short-circuits the chain: later middleware and the handler never run,
//! and the middleware's own response is what the client sees.
//!
//! Global middleware always runs before route middleware, each group in
//! registration order.

use crate::request::Request;
use crate::response::Response;
use crate::route::Handler;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// A boxed future for async middleware and handlers
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Middleware trait for request/response interception
pub trait Middleware: Send + Sync {
    /// Process the request. Call `next.run(req)` to continue the chain.
    fn handle<'a>(&'a self, req: &'a Request, next: Next<'a>) -> BoxFuture<'a, Response>;

    /// Middleware name for logging
    fn name(&self) -> &'static str {
        "Unknown"
    }
}

/// The remainder of a middleware chain, ending in the route handler
pub struct Next<'a> {
    remaining: &'a [Arc<dyn Middleware>],
    endpoint: &'a Handler,
}

impl<'a> Next<'a> {
    /// Build a continuation over `middleware` that ends in `endpoint`
    #[must_use]
    pub fn new(middleware: &'a [Arc<dyn Middleware>], endpoint: &'a Handler) -> Self {
        Self {
            remaining: middleware,
            endpoint,
        }
    }

    /// Run the next middleware, or the handler when none are left.
    ///
    /// The handler receives the path parameters positionally, in pattern
    /// declaration order.
    pub fn run(self, req: &'a Request) -> BoxFuture<'a, Response> {
        match self.remaining.split_first() {
            Some((current, rest)) => {
                debug!(middleware = current.name(), "Entering middleware");
                current.handle(req, Next::new(rest, self.endpoint))
            }
            None => (self.endpoint)(req.clone(), req.params().positional()),
        }
    }
}

/// Ordered list of global middleware
#[derive(Default, Clone)]
pub struct MiddlewareChain {
    middlewares: Vec<Arc<dyn Middleware>>,
}

impl MiddlewareChain {
    /// Create a new empty middleware chain
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a middleware to the chain
    pub fn add<M: Middleware + 'static>(&mut self, middleware: M) {
        self.middlewares.push(Arc::new(middleware));
    }

    /// Add an already shared middleware to the chain
    pub fn add_shared(&mut self, middleware: Arc<dyn Middleware>) {
        self.middlewares.push(middleware);
    }

    /// Run the global chain, then `route_middleware`, then `endpoint`
    pub async fn run(
        &self,
        route_middleware: &[Arc<dyn Middleware>],
        req: &Request,
        endpoint: &Handler,
    ) -> Response {
        let stack: Vec<Arc<dyn Middleware>> = self
            .middlewares
            .iter()
            .chain(route_middleware)
            .cloned()
            .collect();
        Next::new(&stack, endpoint).run(req).await
    }

    /// Get the number of middlewares
    #[must_use]
    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    /// Check if chain is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }
}

/// Logs each request and its response status with elapsed time
#[derive(Default)]
pub struct LoggingMiddleware;

impl LoggingMiddleware {
    /// Create a new logging middleware
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Middleware for LoggingMiddleware {
    fn handle<'a>(&'a self, req: &'a Request, next: Next<'a>) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let start = Instant::now();
            let request_id = req.header("x-request-id").unwrap_or("-");
            info!(
                method = %req.method,
                path = %req.path,
                request_id = %request_id,
                "Request received"
            );

            let response = next.run(req).await;

            info!(
                method = %req.method,
                path = %req.path,
                status = response.status,
                request_id = %request_id,
                duration_ms = %start.elapsed().as_millis(),
                "Response sent"
            );
            response
        })
    }

    fn name(&self) -> &'static str {
        "LoggingMiddleware"
    }
}

/// CORS middleware - adds Cross-Origin Resource Sharing headers
#[derive(Clone)]
pub struct CorsMiddleware {
    allow_origin: String,
    allow_methods: String,
    allow_headers: String,
}

impl Default for CorsMiddleware {
    fn default() -> Self {
        Self {
            allow_origin: "*".to_string(),
            allow_methods: "GET, POST, PUT, PATCH, DELETE".to_string(),
            allow_headers: "Content-Type, Authorization".to_string(),
        }
    }
}

impl CorsMiddleware {
    /// Create a new CORS middleware with default settings
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set allowed origin
    #[must_use]
    pub fn allow_origin(mut self, origin: impl Into<String>) -> Self {
        self.allow_origin = origin.into();
        self
    }

    /// Set allowed methods
    #[must_use]
    pub fn allow_methods(mut self, methods: impl Into<String>) -> Self {
        self.allow_methods = methods.into();
        self
    }

    /// Set allowed headers
    #[must_use]
    pub fn allow_headers(mut self, headers: impl Into<String>) -> Self {
        self.allow_headers = headers.into();
        self
    }
}

impl Middleware for CorsMiddleware {
    fn handle<'a>(&'a self, req: &'a Request, next: Next<'a>) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let mut res = next.run(req).await;
            res.set_header("Access-Control-Allow-Origin", &self.allow_origin);
            res.set_header("Access-Control-Allow-Methods", &self.allow_methods);
            res.set_header("Access-Control-Allow-Headers", &self.allow_headers);
            res
        })
    }

    fn name(&self) -> &'static str {
        "CorsMiddleware"
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Shared log of which middleware ran, in order
    pub type Trace = Arc<Mutex<Vec<String>>>;

    /// Records `name` before and after continuing
    pub struct Recorder {
        pub name: &'static str,
        pub trace: Trace,
    }

    impl Middleware for Recorder {
        fn handle<'a>(&'a self, req: &'a Request, next: Next<'a>) -> BoxFuture<'a, Response> {
            Box::pin(async move {
                self.trace.lock().unwrap().push(format!("{}:in", self.name));
                let res = next.run(req).await;
                self.trace.lock().unwrap().push(format!("{}:out", self.name));
                res
            })
        }
    }

    /// Never continues; answers 401 itself
    pub struct Gate {
        pub trace: Trace,
    }

    impl Middleware for Gate {
        fn handle<'a>(&'a self, _req: &'a Request, _next: Next<'a>) -> BoxFuture<'a, Response> {
            Box::pin(async move {
                self.trace.lock().unwrap().push("gate".to_string());
                Response::text("denied").with_status(401)
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{Gate, Recorder, Trace};
    use super::*;
    use crate::route::handler;
    use std::collections::HashMap;

    fn recording_handler(trace: Trace) -> Handler {
        handler(move |_req, args| {
            let trace = trace.clone();
            async move {
                trace.lock().unwrap().push("handler".to_string());
                Response::text(args.join("/"))
            }
        })
    }

    fn request() -> Request {
        Request::new("GET", "/", HashMap::new(), None)
    }

    #[test]
    fn test_middleware_chain_empty() {
        let chain = MiddlewareChain::new();
        assert!(chain.is_empty());
        assert_eq!(chain.len(), 0);
    }

    #[test]
    fn test_middleware_chain_add() {
        let mut chain = MiddlewareChain::new();
        chain.add(LoggingMiddleware::new());
        chain.add(CorsMiddleware::new());

        assert!(!chain.is_empty());
        assert_eq!(chain.len(), 2);
    }

    #[tokio::test]
    async fn test_global_before_route_in_onion_order() {
        let trace = Trace::default();
        let mut chain = MiddlewareChain::new();
        chain.add(Recorder {
            name: "g1",
            trace: trace.clone(),
        });
        chain.add(Recorder {
            name: "g2",
            trace: trace.clone(),
        });
        let route_mw: Vec<Arc<dyn Middleware>> = vec![Arc::new(Recorder {
            name: "r1",
            trace: trace.clone(),
        })];

        let endpoint = recording_handler(trace.clone());
        let res = chain.run(&route_mw, &request(), &endpoint).await;

        assert_eq!(res.status, 200);
        assert_eq!(
            *trace.lock().unwrap(),
            vec!["g1:in", "g2:in", "r1:in", "handler", "r1:out", "g2:out", "g1:out"]
        );
    }

    #[tokio::test]
    async fn test_short_circuit_skips_rest() {
        let trace = Trace::default();
        let mut chain = MiddlewareChain::new();
        chain.add(Recorder {
            name: "outer",
            trace: trace.clone(),
        });
        chain.add(Gate {
            trace: trace.clone(),
        });
        let route_mw: Vec<Arc<dyn Middleware>> = vec![Arc::new(Recorder {
            name: "inner",
            trace: trace.clone(),
        })];

        let endpoint = recording_handler(trace.clone());
        let res = chain.run(&route_mw, &request(), &endpoint).await;

        assert_eq!(res.status, 401);
        assert_eq!(res.body_str(), Some("denied"));
        assert_eq!(*trace.lock().unwrap(), vec!["outer:in", "gate", "outer:out"]);
    }

    #[tokio::test]
    async fn test_cors_headers_added_after_handler() {
        let mut chain = MiddlewareChain::new();
        chain.add(CorsMiddleware::new().allow_origin("https://example.com"));

        let endpoint = recording_handler(Trace::default());
        let res = chain.run(&[], &request(), &endpoint).await;
        assert_eq!(
            res.header("Access-Control-Allow-Origin"),
            Some("https://example.com")
        );
    }

    #[tokio::test]
    async fn test_logging_middleware_passes_through() {
        let mut chain = MiddlewareChain::new();
        chain.add(LoggingMiddleware::new());
        let endpoint = recording_handler(Trace::default());
        let res = chain.run(&[], &request(), &endpoint).await;
        assert_eq!(res.status, 200);
        assert_eq!(LoggingMiddleware::new().name(), "LoggingMiddleware");
    }
}
