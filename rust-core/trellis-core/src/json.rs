//! # JSON Serialization Module
//!
//! Request bodies are parsed with simd-json; responses are written with
//! serde_json, which leaves non-ASCII text unescaped.

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Parse JSON string to a typed value using simd-json
///
/// # Errors
///
/// Returns `Error::BadRequest` if parsing fails
pub fn parse_json<T: DeserializeOwned>(json_str: &str) -> Result<T> {
    let mut bytes = json_str.as_bytes().to_vec();
    parse_json_bytes(&mut bytes)
}

/// Parse JSON bytes in place using simd-json
///
/// # Errors
///
/// Returns `Error::BadRequest` if parsing fails
pub fn parse_json_bytes<T: DeserializeOwned>(bytes: &mut [u8]) -> Result<T> {
    simd_json::from_slice(bytes).map_err(|e| Error::BadRequest {
        reason: format!("JSON parse error: {e}"),
    })
}

/// Serialize a value to a JSON string
///
/// # Errors
///
/// Returns `Error::Json` if the value cannot be serialized
pub fn to_json<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct TestData {
        name: String,
        age: i32,
    }

    #[test]
    fn test_parse_json_object() {
        let json = r#"{"name": "John", "age": 30}"#;
        let data: TestData = parse_json(json).unwrap();
        assert_eq!(data.name, "John");
        assert_eq!(data.age, 30);
    }

    #[test]
    fn test_invalid_json() {
        let result: Result<TestData> = parse_json("not valid json");
        assert!(matches!(result, Err(Error::BadRequest { .. })));
    }

    #[test]
    fn test_to_json_keeps_unicode() {
        let data = TestData {
            name: "Zoë 東京".to_string(),
            age: 40,
        };
        let json = to_json(&data).unwrap();
        assert!(json.contains("Zoë 東京"));
        assert!(!json.contains("\\u"));
    }
}
