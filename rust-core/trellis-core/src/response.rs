//! # HTTP Response
//!
//! Response value produced by handlers, middleware and the dispatcher.

use crate::error::{Error, Result};
use crate::json::to_json;
use crate::view::ViewRenderer;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::StatusCode;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Content type used for JSON bodies
pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// HTTP response
#[derive(Debug, Clone)]
pub struct Response {
    /// HTTP status code
    pub status: u16,
    /// Response body
    pub body: Bytes,
    /// Content type
    pub content_type: String,
    /// Response headers (other than `Content-Type`), keyed by lowercase name
    pub headers: HashMap<String, String>,
}

impl Default for Response {
    fn default() -> Self {
        Self {
            status: 200,
            body: Bytes::new(),
            content_type: "text/plain; charset=utf-8".to_string(),
            headers: HashMap::new(),
        }
    }
}

impl Response {
    /// Create a raw response with an explicit content type
    #[must_use]
    pub fn bytes(body: impl Into<Bytes>, content_type: &str) -> Self {
        Self {
            body: body.into(),
            content_type: content_type.to_string(),
            ..Self::default()
        }
    }

    /// Create a text response
    #[must_use]
    pub fn text(body: impl Into<String>) -> Self {
        let body: String = body.into();
        Self::bytes(body, "text/plain; charset=utf-8")
    }

    /// Create an HTML response
    #[must_use]
    pub fn html(body: impl Into<String>) -> Self {
        let body: String = body.into();
        Self::bytes(body, "text/html; charset=utf-8")
    }

    /// Create a JSON response with the given status
    ///
    /// # Errors
    ///
    /// Returns `Error::Json` if the value cannot be serialized
    pub fn json<T: Serialize>(status: u16, value: &T) -> Result<Self> {
        Ok(Self::bytes(to_json(value)?, JSON_CONTENT_TYPE).with_status(status))
    }

    /// Render a view through the view collaborator into an HTML response
    ///
    /// # Errors
    ///
    /// Propagates the renderer's error
    pub fn view(
        renderer: &dyn ViewRenderer,
        view: &str,
        data: &Map<String, Value>,
    ) -> Result<Self> {
        renderer.render(view, data).map(Self::html)
    }

    /// Create a `302 Found` redirect
    #[must_use]
    pub fn redirect(location: &str) -> Self {
        Self::default()
            .with_status(302)
            .with_header("Location", location)
    }

    /// Minimal JSON body for an error, with the error's status
    #[must_use]
    pub fn from_error(err: &Error) -> Self {
        let body = serde_json::json!({ "error": err.to_string() }).to_string();
        Self::bytes(body, JSON_CONTENT_TYPE).with_status(err.status_code())
    }

    /// Set status code
    #[must_use]
    pub const fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    /// Set header
    #[must_use]
    pub fn with_header(mut self, key: &str, value: &str) -> Self {
        self.set_header(key, value);
        self
    }

    /// Set or override a header. Names are case-insensitive, so
    /// `X-Request-Id` and `x-request-id` are the same header.
    pub fn set_header(&mut self, key: &str, value: &str) {
        if key.eq_ignore_ascii_case("content-type") {
            self.content_type = value.to_string();
        } else {
            self.headers.insert(key.to_ascii_lowercase(), value.to_string());
        }
    }

    /// Look up a header (case-insensitive)
    #[must_use]
    pub fn header(&self, key: &str) -> Option<&str> {
        if key.eq_ignore_ascii_case("content-type") {
            return Some(&self.content_type);
        }
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Body as UTF-8 text, if it is text
    #[must_use]
    pub fn body_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }

    /// Convert to hyper Response
    #[must_use]
    pub fn into_hyper(self) -> hyper::Response<Full<Bytes>> {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut builder = hyper::Response::builder()
            .status(status)
            .header("Content-Type", &self.content_type);
        for (k, v) in &self.headers {
            builder = builder.header(k.as_str(), v.as_str());
        }

        builder.body(Full::new(self.body)).unwrap_or_else(|_| {
            let mut fallback = hyper::Response::new(Full::new(Bytes::from("Internal Server Error")));
            *fallback.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            fallback
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_response() {
        let resp = Response::json(201, &serde_json::json!({"name": "Ünïcode"})).unwrap();
        assert_eq!(resp.status, 201);
        assert_eq!(resp.content_type, JSON_CONTENT_TYPE);
        assert_eq!(resp.body_str(), Some(r#"{"name":"Ünïcode"}"#));
    }

    #[test]
    fn test_with_status() {
        let resp = Response::text("Not Found").with_status(404);
        assert_eq!(resp.status, 404);
    }

    #[test]
    fn test_redirect() {
        let resp = Response::redirect("/login");
        assert_eq!(resp.status, 302);
        assert_eq!(resp.header("location"), Some("/login"));
    }

    #[test]
    fn test_content_type_header_goes_to_field() {
        let resp = Response::text("x").with_header("Content-Type", "text/css");
        assert_eq!(resp.content_type, "text/css");
        assert!(resp.headers.is_empty());
    }

    #[test]
    fn test_from_error() {
        let resp = Response::from_error(&Error::MethodNotAllowed {
            method: "TRACE".to_string(),
        });
        assert_eq!(resp.status, 405);
        assert!(resp.body_str().unwrap().contains("TRACE"));
    }

    #[test]
    fn test_into_hyper() {
        let resp = Response::html("<p>hi</p>").with_header("X-Test", "1");
        let hyper_resp = resp.into_hyper();
        assert_eq!(hyper_resp.status(), StatusCode::OK);
        assert_eq!(hyper_resp.headers()["content-type"], "text/html; charset=utf-8");
        assert_eq!(hyper_resp.headers()["x-test"], "1");
    }

    #[test]
    fn test_header_names_are_case_insensitive() {
        let resp = Response::text("x")
            .with_header("X-Request-Id", "handler")
            .with_header("x-request-id", "dispatcher");
        assert_eq!(resp.headers.len(), 1);
        assert_eq!(resp.header("X-REQUEST-ID"), Some("dispatcher"));

        let hyper_resp = resp.into_hyper();
        let values: Vec<_> = hyper_resp.headers().get_all("x-request-id").iter().collect();
        assert_eq!(values, vec!["dispatcher"]);
    }
}
