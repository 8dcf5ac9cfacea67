//! # CSRF Tokens
//!
//! The session side of CSRF protection: one token per session, generated on
//! demand and compared against the `csrf` form field of POST submissions.

use rand::RngCore;
use std::fmt::Write as _;
use std::sync::RwLock;

/// Form field that carries the submitted token
pub const CSRF_FIELD: &str = "csrf";

/// Storage for the session's CSRF token
pub trait CsrfStore: Send + Sync {
    /// Current session token, if one was issued
    fn token(&self) -> Option<String>;

    /// Replace the session token
    fn set_token(&self, token: String);
}

/// Process-wide session holding a single token
#[derive(Debug, Default)]
pub struct SessionCsrfStore {
    token: RwLock<Option<String>>,
}

impl SessionCsrfStore {
    /// Create an empty session
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session that already holds `token`
    #[must_use]
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(Some(token.into())),
        }
    }
}

impl CsrfStore for SessionCsrfStore {
    fn token(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    fn set_token(&self, token: String) {
        *self
            .token
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(token);
    }
}

/// 32 random bytes, hex encoded
#[must_use]
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().fold(String::with_capacity(64), |mut out, b| {
        let _ = write!(out, "{b:02x}");
        out
    })
}

/// Return the session token, issuing one first if the session has none
pub fn ensure_token(store: &dyn CsrfStore) -> String {
    if let Some(token) = store.token() {
        return token;
    }
    let token = generate_token();
    store.set_token(token.clone());
    token
}

/// Check a submitted token against the session token.
///
/// A session without a token never verifies, and neither does a missing
/// submission.
pub fn verify(store: &dyn CsrfStore, submitted: Option<&str>) -> bool {
    match (store.token(), submitted) {
        (Some(expected), Some(given)) => constant_time_eq(expected.as_bytes(), given.as_bytes()),
        _ => false,
    }
}

/// Equality whose running time does not depend on where the inputs differ
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_token_shape() {
        let token = generate_token();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(token, generate_token());
    }

    #[test]
    fn test_ensure_token_is_stable() {
        let store = SessionCsrfStore::new();
        let first = ensure_token(&store);
        let second = ensure_token(&store);
        assert_eq!(first, second);
    }

    #[test]
    fn test_verify() {
        let store = SessionCsrfStore::with_token("abc123");
        assert!(verify(&store, Some("abc123")));
        assert!(!verify(&store, Some("abc124")));
        assert!(!verify(&store, Some("abc12")));
        assert!(!verify(&store, None));
    }

    #[test]
    fn test_empty_session_never_verifies() {
        let store = SessionCsrfStore::new();
        assert!(!verify(&store, None));
        assert!(!verify(&store, Some("")));
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"", b""));
        assert!(constant_time_eq(b"same", b"same"));
        assert!(!constant_time_eq(b"same", b"sane"));
    }
}
