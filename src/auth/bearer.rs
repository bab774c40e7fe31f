//! Authorization header parsing.

use axum::http::{HeaderMap, header};

/// Scheme prefix of the Authorization header value.
pub const BEARER_PREFIX: &str = "Bearer ";

/// Extract the bearer token from the Authorization header.
/// Returns `None` for a missing header, another scheme, or an empty token.
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix(BEARER_PREFIX)?.trim();
    if token.is_empty() { None } else { Some(token) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn test_bearer_token() {
        let headers = headers("Bearer abc123");
        assert_eq!(extract_bearer_token(&headers), Some("abc123"));
    }

    #[test]
    fn test_no_header() {
        assert_eq!(extract_bearer_token(&HeaderMap::new()), None);
    }

    #[test]
    fn test_other_scheme() {
        let headers = headers("Basic YWxpY2U6c2VjcmV0");
        assert_eq!(extract_bearer_token(&headers), None);
    }

    #[test]
    fn test_empty_token() {
        let headers = headers("Bearer   ");
        assert_eq!(extract_bearer_token(&headers), None);
    }
}
