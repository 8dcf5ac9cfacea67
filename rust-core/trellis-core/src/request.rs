//! # HTTP Request
//!
//! Pre-parsed request handed to the dispatcher: method token, path, query,
//! headers, body, form fields and (after routing) the matched path
//! parameters.

use crate::error::{Error, Result};
use crate::json::parse_json_bytes;
use crate::path::PathParams;
use http_body_util::BodyExt;
use hyper::body::Bytes;
use hyper::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use std::collections::HashMap;

const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

/// HTTP request as seen by routes, middleware and handlers
///
/// The method token is kept verbatim, so a method the router does not know
/// about still reaches the dispatcher and can be answered with 405.
#[derive(Debug, Clone)]
pub struct Request {
    /// HTTP method token (e.g. `GET`)
    pub method: String,
    /// Request path (without query string)
    pub path: String,
    query_string: Option<String>,
    query_params: HashMap<String, String>,
    headers: HeaderMap,
    body: Option<Bytes>,
    form: HashMap<String, String>,
    params: PathParams,
}

impl Request {
    /// Build a request from already-parsed parts.
    ///
    /// `path` may carry a query string (`/search?q=x`); it is split off and
    /// decoded. Headers that are not valid HTTP header names or values are
    /// skipped.
    pub fn new(
        method: impl Into<String>,
        path: impl Into<String>,
        headers_map: HashMap<String, String>,
        body: Option<Bytes>,
    ) -> Self {
        let path = path.into();
        let (path, query_string) = match path.split_once('?') {
            Some((p, q)) => (p.to_string(), Some(q.to_string())),
            None => (path, None),
        };

        let mut headers = HeaderMap::new();
        for (k, v) in headers_map {
            if let (Ok(n), Ok(v)) = (
                HeaderName::from_bytes(k.as_bytes()),
                HeaderValue::from_str(&v),
            ) {
                headers.insert(n, v);
            }
        }

        Self::from_parts(method.into(), path, query_string, headers, body)
    }

    fn from_parts(
        method: String,
        path: String,
        query_string: Option<String>,
        headers: HeaderMap,
        body: Option<Bytes>,
    ) -> Self {
        let query_params = parse_query_string(query_string.as_deref());
        let form = parse_form(&headers, body.as_deref());

        Self {
            method,
            path,
            query_string,
            query_params,
            headers,
            body,
            form,
            params: PathParams::default(),
        }
    }

    /// Create from a hyper request, collecting the body up to `max_body_size`
    ///
    /// # Errors
    ///
    /// Returns `Error::PayloadTooLarge` when the declared or actual body
    /// length exceeds the limit, `Error::BadRequest` when the body cannot be
    /// read.
    pub async fn from_hyper<B>(req: hyper::Request<B>, max_body_size: usize) -> Result<Self>
    where
        B: hyper::body::Body<Data = Bytes>,
        B::Error: std::fmt::Display,
    {
        let (parts, body) = req.into_parts();

        let declared = parts
            .headers
            .get(CONTENT_LENGTH)
            .and_then(|len| len.to_str().ok())
            .and_then(|len| len.parse::<usize>().ok());
        if let Some(actual) = declared.filter(|len| *len > max_body_size) {
            return Err(Error::PayloadTooLarge {
                limit: max_body_size,
                actual,
            });
        }

        let bytes = body
            .collect()
            .await
            .map_err(|e| Error::BadRequest {
                reason: e.to_string(),
            })?
            .to_bytes();
        if bytes.len() > max_body_size {
            return Err(Error::PayloadTooLarge {
                limit: max_body_size,
                actual: bytes.len(),
            });
        }

        let body = (!bytes.is_empty()).then_some(bytes);
        Ok(Self::from_parts(
            parts.method.as_str().to_string(),
            parts.uri.path().to_string(),
            parts.uri.query().map(String::from),
            parts.headers,
            body,
        ))
    }

    /// Get a header value by name (case-insensitive)
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Set or override a header
    pub fn set_header(&mut self, name: &str, value: &str) {
        if let (Ok(n), Ok(v)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.insert(n, v);
        }
    }

    /// Get query parameters as a `HashMap`
    #[must_use]
    pub fn query_map(&self) -> &HashMap<String, String> {
        &self.query_params
    }

    /// Get raw query string
    #[must_use]
    pub fn query_string(&self) -> Option<&str> {
        self.query_string.as_deref()
    }

    /// A decoded urlencoded form field from the body
    #[must_use]
    pub fn form_field(&self, name: &str) -> Option<&str> {
        self.form.get(name).map(String::as_str)
    }

    /// Get the request body as bytes
    #[must_use]
    pub fn body_bytes(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    /// Get the request body as string (UTF-8)
    #[must_use]
    pub fn body_str(&self) -> Option<&str> {
        self.body_bytes().and_then(|b| std::str::from_utf8(b).ok())
    }

    /// Parse the body as JSON
    ///
    /// # Errors
    ///
    /// Returns `Error::BadRequest` when there is no body or it does not parse.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        let mut bytes = self
            .body
            .as_ref()
            .map(|b| b.to_vec())
            .ok_or_else(|| Error::BadRequest {
                reason: "empty body".to_string(),
            })?;
        parse_json_bytes(&mut bytes)
    }

    /// Path parameters captured by the matched route
    #[must_use]
    pub fn params(&self) -> &PathParams {
        &self.params
    }

    pub(crate) fn set_params(&mut self, params: PathParams) {
        self.params = params;
    }
}

/// Decode the body as a urlencoded form when the content type allows it.
///
/// A body without a content type is also tried, since plain HTML forms are
/// the common producer.
fn parse_form(headers: &HeaderMap, body: Option<&[u8]>) -> HashMap<String, String> {
    let is_form = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map_or(true, |ct| ct.starts_with(FORM_URLENCODED));

    match body.and_then(|b| std::str::from_utf8(b).ok()) {
        Some(text) if is_form => parse_query_string(Some(text)),
        _ => HashMap::new(),
    }
}

/// Parse query string into `HashMap`
///
/// Handles URL decoding and duplicate keys (last value wins).
fn parse_query_string(query: Option<&str>) -> HashMap<String, String> {
    query
        .map(|q| {
            q.split('&')
                .filter(|pair| !pair.is_empty())
                .map(|pair| {
                    let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
                    (url_decode(key), url_decode(value))
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Percent-decoding with `+` as space; invalid escapes are kept as-is
fn url_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'+' => out.push(b' '),
            b'%' => {
                let decoded = bytes
                    .get(i + 1..i + 3)
                    .and_then(|hex| std::str::from_utf8(hex).ok())
                    .and_then(|hex| u8::from_str_radix(hex, 16).ok());
                if let Some(byte) = decoded {
                    out.push(byte);
                    i += 2;
                } else {
                    out.push(b'%');
                }
            }
            b => out.push(b),
        }
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
