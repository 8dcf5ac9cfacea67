//! # Dispatcher
//!
//! Top-level request handling. Each request goes through, in order:
//!
//! 1. static files (a file under the static root always wins over routes)
//! 2. method check (anything outside GET/POST/PUT/PATCH/DELETE is a 405)
//! 3. CSRF check, for POST only (403 on mismatch, before routing)
//! 4. route lookup (a miss goes to the not-found handler, 404)
//! 5. global then route middleware, ending in the handler or redirect
//!
//! 404/405/403 are ordinary responses, not errors. Every response carries
//! the request's `x-request-id`.

use crate::csrf::{self, CsrfStore, SessionCsrfStore, CSRF_FIELD};
use crate::error::{Error, Result};
use crate::middleware::{Middleware, MiddlewareChain};
use crate::request::Request;
use crate::response::Response;
use crate::route::{handler, Handler, RouteTarget};
use crate::router::{Lookup, Method, RouteMatch, Router};
use crate::static_files::StaticFiles;
use crate::view::ViewRenderer;
use http_body_util::Full;
use hyper::body::Bytes;
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Header carrying the request id
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Dispatcher settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Directory served ahead of routing, if any
    pub static_root: Option<PathBuf>,
    /// Max request body size in bytes, for [`Dispatcher::handle_hyper`]
    pub max_body_size: usize,
    /// View rendered for unmatched paths
    pub not_found_view: String,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            static_root: None,
            max_body_size: 1024 * 1024,
            not_found_view: "404".to_string(),
        }
    }
}

impl DispatcherConfig {
    /// Serve files from `root` before routing
    #[must_use]
    pub fn with_static_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.static_root = Some(root.into());
        self
    }

    /// Set max request body size
    #[must_use]
    pub const fn with_max_body_size(mut self, bytes: usize) -> Self {
        self.max_body_size = bytes;
        self
    }

    /// Set the not-found view name
    #[must_use]
    pub fn with_not_found_view(mut self, view: impl Into<String>) -> Self {
        self.not_found_view = view.into();
        self
    }
}

/// Routes requests to handlers
///
/// Build it once at startup; routes and middleware cannot change while it
/// serves.
pub struct Dispatcher {
    router: Router,
    middleware: MiddlewareChain,
    static_files: Option<StaticFiles>,
    csrf: Arc<dyn CsrfStore>,
    views: Option<Arc<dyn ViewRenderer>>,
    not_found: Option<Handler>,
    config: DispatcherConfig,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("middleware", &self.middleware.len())
            .field("static_files", &self.static_files)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Dispatcher over `router` with default settings and an empty session
    /// CSRF store
    #[must_use]
    pub fn new(router: Router) -> Self {
        Self {
            router,
            middleware: MiddlewareChain::new(),
            static_files: None,
            csrf: Arc::new(SessionCsrfStore::new()),
            views: None,
            not_found: None,
            config: DispatcherConfig::default(),
        }
    }

    /// Apply `config`, resolving the static root if one is set
    ///
    /// # Errors
    ///
    /// `Error::Io` if the static root does not exist.
    pub fn with_config(mut self, config: DispatcherConfig) -> Result<Self> {
        self.static_files = config
            .static_root
            .as_ref()
            .map(StaticFiles::new)
            .transpose()?;
        self.config = config;
        Ok(self)
    }

    /// Append a global middleware
    #[must_use]
    pub fn with_middleware<M: Middleware + 'static>(mut self, middleware: M) -> Self {
        self.middleware.add(middleware);
        self
    }

    /// Use `store` as the session token source for CSRF checks
    #[must_use]
    pub fn with_csrf_store(mut self, store: Arc<dyn CsrfStore>) -> Self {
        self.csrf = store;
        self
    }

    /// Use `renderer` for the not-found view
    #[must_use]
    pub fn with_views(mut self, renderer: Arc<dyn ViewRenderer>) -> Self {
        self.views = Some(renderer);
        self
    }

    /// Replace the not-found handler. Its response is always sent as 404.
    #[must_use]
    pub fn with_not_found(mut self, handler: Handler) -> Self {
        self.not_found = Some(handler);
        self
    }

    /// The route table
    #[must_use]
    pub const fn router(&self) -> &Router {
        &self.router
    }

    /// Current settings
    #[must_use]
    pub const fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Session CSRF store, for issuing tokens into views
    #[must_use]
    pub fn csrf_store(&self) -> &dyn CsrfStore {
        self.csrf.as_ref()
    }

    /// Handle one request
    pub async fn dispatch(&self, mut req: Request) -> Response {
        let request_id = match req.header(REQUEST_ID_HEADER) {
            Some(id) => id.to_string(),
            None => {
                let id = generate_request_id();
                req.set_header(REQUEST_ID_HEADER, &id);
                id
            }
        };

        let mut response = self.route(req).await;
        response.set_header(REQUEST_ID_HEADER, &request_id);
        response
    }

    /// Handle a hyper request; bodies over `max_body_size` get a 413
    pub async fn handle_hyper<B>(&self, req: hyper::Request<B>) -> hyper::Response<Full<Bytes>>
    where
        B: hyper::body::Body<Data = Bytes>,
        B::Error: std::fmt::Display,
    {
        match Request::from_hyper(req, self.config.max_body_size).await {
            Ok(req) => self.dispatch(req).await.into_hyper(),
            Err(err) => {
                warn!(error = %err, "Rejected request body");
                Response::from_error(&err).into_hyper()
            }
        }
    }

    async fn route(&self, mut req: Request) -> Response {
        if let Some(files) = &self.static_files {
            if let Some(response) = files.serve(&req.path).await {
                return response;
            }
        }

        let method = match req.method.parse::<Method>() {
            Ok(method) => method,
            Err(err) => {
                debug!(method = %req.method, path = %req.path, "Method not allowed");
                return Response::from_error(&err);
            }
        };

        if method == Method::Post && !csrf::verify(self.csrf.as_ref(), req.form_field(CSRF_FIELD)) {
            warn!(path = %req.path, "CSRF token rejected");
            return Response::from_error(&Error::CsrfInvalid);
        }

        let RouteMatch { route, params } = match self.router.lookup(&req.method, &req.path) {
            Lookup::Found(found) => found,
            Lookup::NotFound => return self.not_found(req).await,
            Lookup::MethodNotAllowed => {
                return Response::from_error(&Error::MethodNotAllowed {
                    method: req.method.clone(),
                })
            }
        };
        debug!(method = %method, pattern = %route.pattern, "Route matched");

        let endpoint = match &route.target {
            RouteTarget::Handler(handler) => handler.clone(),
            RouteTarget::Redirect(target) => redirect_to(target),
        };
        req.set_params(params);
        self.middleware.run(&route.middleware, &req, &endpoint).await
    }

    async fn not_found(&self, req: Request) -> Response {
        debug!(method = %req.method, path = %req.path, "No route matched");

        if let Some(handler) = &self.not_found {
            return handler(req, Vec::new()).await.with_status(404);
        }

        if let Some(views) = &self.views {
            let mut data = Map::new();
            data.insert("path".to_string(), Value::String(req.path.clone()));
            match Response::view(views.as_ref(), &self.config.not_found_view, &data) {
                Ok(response) => return response.with_status(404),
                Err(err) => {
                    error!(view = %self.config.not_found_view, error = %err, "Not-found view failed");
                }
            }
        }

        Response::from_error(&Error::RouteNotFound { path: req.path })
    }
}

/// Endpoint answering with a redirect to `/<identifier>`
fn redirect_to(identifier: &str) -> Handler {
    let location = format!("/{}", identifier.trim_start_matches('/'));
    handler(move |_req, _args| {
        let location = location.clone();
        async move { Response::redirect(&location) }
    })
}

static REQUEST_COUNTER: AtomicUsize = AtomicUsize::new(1);

fn generate_request_id() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let counter = REQUEST_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{:x}-{:x}", now.as_nanos(), counter)
}
