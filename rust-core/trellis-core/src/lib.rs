//! # Trellis Core
//!
//! A small web toolkit: an ordered route matcher with continuation-style
//! middleware, a dispatcher that handles static files, CSRF and the
//! 404/405/403 outcomes, and a guarded SQL builder running on one shared
//! SQLite connection.
//!
//! ## Modules
//!
//! - `path` - route patterns and path matching
//! - `route` / `router` - route metadata and per-method route tables
//! - `middleware` - middleware chain plus logging and CORS middleware
//! - `dispatcher` - top-level request handling
//! - `request` / `response` - HTTP request and response models
//! - `csrf` - session CSRF tokens
//! - `view` - template collaborator seam
//! - `static_files` - static asset serving with root containment
//! - `json` - JSON parsing with simd-json
//! - `ident` - SQL identifier allow-listing and quoting
//! - `value` - typed bound values
//! - `query` - SELECT / INSERT / UPDATE / DELETE builders
//! - `database` - statement execution and transactions
//! - `error` - error types and handling
//!
//! ## Example
//!
//! ```ignore
//! let mut router = Router::new();
//! router.get("/users/{id}", handler(|_req, args| async move {
//!     Response::text(format!("user {}", args[0]))
//! }));
//!
//! let app = Dispatcher::new(router).with_middleware(LoggingMiddleware::new());
//! let response = app.dispatch(Request::new("GET", "/users/7", HashMap::new(), None)).await;
//! ```

pub mod csrf;
pub mod database;
pub mod dispatcher;
pub mod error;
pub mod ident;
pub mod json;
pub mod middleware;
pub mod path;
pub mod query;
pub mod request;
pub mod response;
pub mod route;
pub mod router;
pub mod static_files;
pub mod value;
pub mod view;

pub use csrf::{CsrfStore, SessionCsrfStore};
pub use database::{Database, DatabaseConfig, DbRow, DbValue, ExecutionMode, Transaction};
pub use dispatcher::{Dispatcher, DispatcherConfig};
pub use error::{Error, Result};
pub use ident::{quote_column_list, quote_identifier, quote_order_list, OrderSpec};
pub use json::{parse_json, to_json};
pub use middleware::{CorsMiddleware, LoggingMiddleware, Middleware, MiddlewareChain, Next};
pub use path::{PathParams, RoutePattern, Segment};
pub use query::{select, BoundQuery, JoinKind, JoinSpec, SelectQuery};
pub use request::Request;
pub use response::Response;
pub use route::{handler, Handler, Route, RouteTarget};
pub use router::{Lookup, Method, Router};
pub use static_files::StaticFiles;
pub use value::{SqlValue, TypeTag};
pub use view::ViewRenderer;

use tracing_subscriber::EnvFilter;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Install a JSON `tracing` subscriber.
///
/// Honors `RUST_LOG` and adds `trellis=info` on top. Does nothing if a
/// global subscriber is already set.
pub fn init_tracing() {
    let mut filter = EnvFilter::from_default_env();
    if let Ok(directive) = "trellis=info".parse() {
        filter = filter.add_directive(directive);
    }
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .try_init();
}
