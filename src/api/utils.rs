//! API utility functions
//!
//! Pure, stateless helper functions for HTTP request processing.
//! These functions are extracted from services.rs to enable unit testing
//! and reusability across different handlers.

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

use crate::api::error::ApiError;

/// Parses and validates Content-Type header for application/json
///
/// Accepts:
/// - `application/json`
/// - `application/json; charset=utf-8`
///
/// Rejects:
/// - `application/jsonp`
/// - `application/json-patch+json`
/// - `text/json`
/// - Malformed media types
pub fn parse_content_type(content_type: &str) -> Result<mime::Mime, ApiError> {
    let media_type: mime::Mime = content_type
        .parse()
        .map_err(|_| ApiError::UnsupportedContentType(content_type.to_string()))?;

    if media_type.type_() != mime::APPLICATION || media_type.subtype() != mime::JSON {
        return Err(ApiError::UnsupportedContentType(format!(
            "{}/{}",
            media_type.type_(),
            media_type.subtype()
        )));
    }

    Ok(media_type)
}

/// Validates that body size does not exceed the maximum allowed size
pub fn validate_body_size(data: &[u8], max_size: usize) -> Result<(), ApiError> {
    if data.len() > max_size {
        return Err(ApiError::PayloadTooLarge(data.len()));
    }
    Ok(())
}

fn sensitive_key_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new("(?i)token|key|auth|password|secret").unwrap())
}

/// Recursively replaces the values of any object key matching
/// `token|key|auth|password|secret` (case-insensitive) with `"[REDACTED]"`,
/// so request `data` payloads are safe to log (spec §6/§9).
pub fn redact_sensitive_values(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut redacted = serde_json::Map::with_capacity(map.len());
            for (key, inner) in map {
                if sensitive_key_pattern().is_match(key) {
                    redacted.insert(key.clone(), Value::String("[REDACTED]".to_string()));
                } else {
                    redacted.insert(key.clone(), redact_sensitive_values(inner));
                }
            }
            Value::Object(redacted)
        }
        Value::Array(items) => Value::Array(items.iter().map(redact_sensitive_values).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_content_type_valid() {
        assert!(parse_content_type("application/json").is_ok());
        assert!(parse_content_type("application/json; charset=utf-8").is_ok());
        assert!(parse_content_type("application/json; charset=UTF-8").is_ok());
    }

    #[test]
    fn test_parse_content_type_invalid() {
        assert!(parse_content_type("application/jsonp").is_err());
        assert!(parse_content_type("application/json-patch+json").is_err());
        assert!(parse_content_type("text/json").is_err());
        assert!(parse_content_type("text/plain").is_err());
        assert!(parse_content_type("invalid").is_err());
        assert!(parse_content_type("").is_err());
    }

    #[test]
    fn test_validate_body_size_ok() {
        let data = vec![0u8; 1000];
        assert!(validate_body_size(&data, 1000).is_ok());
        assert!(validate_body_size(&data, 2000).is_ok());
        assert!(validate_body_size(&[], 100).is_ok());
    }

    #[test]
    fn test_validate_body_size_too_large() {
        let data = vec![0u8; 1000];
        let result = validate_body_size(&data, 999);
        assert!(result.is_err());
        match result {
            Err(ApiError::PayloadTooLarge(size)) => assert_eq!(size, 1000),
            _ => panic!("Expected PayloadTooLarge error"),
        }
    }

    #[test]
    fn test_redact_sensitive_values() {
        let input = json!({
            "githubToken": "ghp_abc123",
            "nested": { "apiKey": "xyz", "password": "hunter2" },
            "safe": "visible",
            "list": [{ "authHeader": "bearer-thing" }],
        });

        let redacted = redact_sensitive_values(&input);
        assert_eq!(redacted["githubToken"], "[REDACTED]");
        assert_eq!(redacted["nested"]["apiKey"], "[REDACTED]");
        assert_eq!(redacted["nested"]["password"], "[REDACTED]");
        assert_eq!(redacted["safe"], "visible");
        assert_eq!(redacted["list"][0]["authHeader"], "[REDACTED]");
    }
}
