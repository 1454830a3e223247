//! CORS configuration for the management API.
//!
//! The default policy admits only localhost origins, which covers the usual
//! deployment where an operator dashboard runs next to the server. Explicit
//! origins can be allowed through `REASONKIT_HOOKS_CORS_ORIGINS`; intake
//! routes are provider-to-server traffic and carry no CORS semantics either
//! way.
//!
//! # Security Policy
//!
//! - **Allowed Origins**: `localhost`, `127.0.0.1`, and `[::1]` on any port,
//!   or the configured allow-list
//! - **Allowed Methods**: GET, POST, PATCH, DELETE, OPTIONS (preflight)
//! - **Allowed Headers**: Content-Type, x-owner-id
//! - **Max Age**: 3600 seconds (1 hour) for preflight caching

use std::time::Duration;

use http::header::{HeaderName, HeaderValue};
use http::Method;
use tower_http::cors::{AllowOrigin, CorsLayer};
use url::Url;

/// The owner header must survive preflight for the management API to work
pub const OWNER_HEADER_NAME: HeaderName = HeaderName::from_static("x-owner-id");

/// Headers the management API accepts cross-origin
pub const ALLOWED_HEADERS: [HeaderName; 2] = [http::header::CONTENT_TYPE, OWNER_HEADER_NAME];

/// Methods the management API serves
pub const ALLOWED_METHODS: [Method; 5] = [
    Method::GET,
    Method::POST,
    Method::PATCH,
    Method::DELETE,
    Method::OPTIONS,
];

/// Default max age for preflight cache (1 hour)
pub const DEFAULT_MAX_AGE_SECS: u64 = 3600;

/// Strict CORS layer allowing only localhost origins.
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(|origin, _| {
            is_localhost_origin(origin)
        }))
        .allow_methods(ALLOWED_METHODS)
        .allow_headers(ALLOWED_HEADERS)
        .max_age(Duration::from_secs(DEFAULT_MAX_AGE_SECS))
}

/// CORS layer for an explicit origin allow-list.
///
/// An empty list falls back to the localhost-only policy rather than
/// allowing nothing, so an unset config variable keeps local dashboards
/// working.
pub fn cors_layer_with_origins(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return cors_layer();
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(ALLOWED_METHODS)
        .allow_headers(ALLOWED_HEADERS)
        .max_age(Duration::from_secs(DEFAULT_MAX_AGE_SECS))
}

/// Checks if the given origin is a localhost origin.
///
/// Valid: `http(s)://localhost`, `http(s)://127.0.0.1`, `http(s)://[::1]`,
/// each with any non-zero port. Everything else is rejected, including
/// subdomain lookalikes (`localhost.evil.com`), other private IP ranges, and
/// non-HTTP schemes.
pub fn is_localhost_origin(origin: &HeaderValue) -> bool {
    let Ok(origin) = origin.to_str() else {
        return false;
    };
    // Url::parse lowercases scheme and host, so case games do not slip by
    let Ok(parsed) = Url::parse(origin) else {
        return false;
    };
    if !matches!(parsed.scheme(), "http" | "https") {
        return false;
    }
    if parsed.port() == Some(0) {
        return false;
    }
    matches!(
        parsed.host_str(),
        Some("localhost") | Some("127.0.0.1") | Some("[::1]")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin(s: &str) -> HeaderValue {
        HeaderValue::from_str(s).unwrap()
    }

    #[test]
    fn test_localhost_origins_allowed() {
        for s in [
            "http://localhost",
            "https://localhost",
            "http://localhost:3000",
            "http://localhost:65535",
            "HTTP://LOCALHOST:3000",
            "http://127.0.0.1",
            "https://127.0.0.1:8080",
            "http://[::1]",
            "http://[::1]:3000",
        ] {
            assert!(is_localhost_origin(&origin(s)), "{s} should be allowed");
        }
    }

    #[test]
    fn test_external_origins_blocked() {
        for s in [
            "http://example.com",
            "https://malicious.org",
            "http://evil.com:3000",
            "http://192.168.1.1",
            "http://10.0.0.1:8080",
            "http://172.16.0.1",
        ] {
            assert!(!is_localhost_origin(&origin(s)), "{s} should be blocked");
        }
    }

    #[test]
    fn test_subdomain_lookalikes_blocked() {
        for s in [
            "http://localhost.evil.com",
            "http://localhostevil.com",
            "http://sub.localhost.com",
            "http://my-localhost.com",
        ] {
            assert!(!is_localhost_origin(&origin(s)), "{s} should be blocked");
        }
    }

    #[test]
    fn test_invalid_formats_blocked() {
        for s in [
            "",
            "localhost:3000",
            "ftp://localhost",
            "file://localhost",
            "http://localhost:notaport",
            "http://localhost:0",
        ] {
            assert!(!is_localhost_origin(&origin(s)), "{s} should be blocked");
        }
    }

    #[test]
    fn test_cors_layer_creation() {
        let layer = cors_layer();
        let _ = format!("{:?}", layer);
    }

    #[test]
    fn test_cors_layer_with_origins_creation() {
        let layer = cors_layer_with_origins(&["https://ops.example.com".to_string()]);
        let _ = format!("{:?}", layer);

        // Empty list keeps the localhost default rather than locking out
        let fallback = cors_layer_with_origins(&[]);
        let _ = format!("{:?}", fallback);
    }
}
