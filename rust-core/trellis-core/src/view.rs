//! # Views
//!
//! Seam for the template collaborator. Rendering itself lives outside this
//! crate; handlers and the not-found fallback only need a view name and a
//! name to value mapping.

use crate::error::Result;
use serde_json::{Map, Value};

/// Renders a named view with the given data into text
pub trait ViewRenderer: Send + Sync {
    /// Render `view` with `data`
    ///
    /// # Errors
    ///
    /// Implementations return `Error::View` when the view cannot be rendered.
    fn render(&self, view: &str, data: &Map<String, Value>) -> Result<String>;
}
