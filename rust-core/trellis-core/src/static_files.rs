//! # Static Files
//!
//! Serves files from a configured root ahead of routing. A request path is
//! joined to the root and canonicalized; the result must still lie inside the
//! canonical root and be a regular file, otherwise the request falls through
//! to the router.

use crate::error::Result;
use crate::response::Response;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A static asset root
#[derive(Debug, Clone)]
pub struct StaticFiles {
    root: PathBuf,
}

impl StaticFiles {
    /// Use `root` as the asset directory
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the root does not exist or cannot be resolved.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            root: std::fs::canonicalize(root)?,
        })
    }

    /// Canonical asset root
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a request path to a file inside the root
    pub async fn resolve(&self, request_path: &str) -> Option<PathBuf> {
        let relative = request_path.trim_start_matches('/');
        if relative.is_empty() {
            return None;
        }

        let candidate = tokio::fs::canonicalize(self.root.join(relative)).await.ok()?;
        if !candidate.starts_with(&self.root) {
            debug!(path = request_path, "Static path escapes root");
            return None;
        }

        let meta = tokio::fs::metadata(&candidate).await.ok()?;
        meta.is_file().then_some(candidate)
    }

    /// Serve `request_path` if it resolves to a file, `None` otherwise
    pub async fn serve(&self, request_path: &str) -> Option<Response> {
        let file = self.resolve(request_path).await?;
        let contents = tokio::fs::read(&file).await.ok()?;
        let mime = mime_type(&file, &contents);
        debug!(path = request_path, mime, "Serving static file");
        Some(Response::bytes(contents, mime))
    }
}

/// MIME type for a file, sniffing the contents before trusting the extension
#[must_use]
pub fn mime_type(path: &Path, contents: &[u8]) -> &'static str {
    sniff(contents).unwrap_or_else(|| mime_from_extension(path))
}

fn sniff(contents: &[u8]) -> Option<&'static str> {
    const SIGNATURES: &[(&[u8], &str)] = &[
        (b"\x89PNG\r\n\x1a\n", "image/png"),
        (b"\xff\xd8\xff", "image/jpeg"),
        (b"GIF87a", "image/gif"),
        (b"GIF89a", "image/gif"),
        (b"%PDF-", "application/pdf"),
    ];

    if let Some((_, mime)) = SIGNATURES.iter().find(|(sig, _)| contents.starts_with(sig)) {
        return Some(*mime);
    }

    let head = &contents[..contents.len().min(256)];
    let head = String::from_utf8_lossy(head).trim_start().to_ascii_lowercase();
    if head.starts_with("<svg") {
        Some("image/svg+xml")
    } else if head.starts_with("<!doctype html") || head.starts_with("<html") {
        Some("text/html")
    } else {
        None
    }
}

fn mime_from_extension(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    match ext.as_deref() {
        Some("css") => "text/css",
        Some("js") => "application/javascript",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        Some("html" | "htm") => "text/html",
        _ => "application/octet-stream",
    }
}
