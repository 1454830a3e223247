//! Inbound request parsing: bodies and request metadata

use std::collections::HashMap;

use http::header::{HeaderMap, CONTENT_TYPE, USER_AGENT};

use crate::model::ParsedBody;

/// Parse a classic webhook body by its declared content type.
///
/// Lenient by design: the classic protocol predates strict payloads, so a
/// JSON content type with an unparsable body falls back to the raw string
/// (which the provider uses to carry a bare resource id). Only the nextgen
/// path rejects malformed JSON.
pub fn parse_body(content_type: Option<&str>, raw: &[u8]) -> ParsedBody {
    let text = || String::from_utf8_lossy(raw).into_owned();

    match content_type {
        Some(ct) if ct.contains("application/json") => match serde_json::from_slice(raw) {
            Ok(value) => ParsedBody::Json(value),
            Err(_) => ParsedBody::Raw(text()),
        },
        Some(ct) if ct.contains("application/x-www-form-urlencoded") => {
            let map: HashMap<String, String> = url::form_urlencoded::parse(raw)
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect();
            ParsedBody::Form(map)
        }
        _ => ParsedBody::Raw(text()),
    }
}

/// Request metadata captured into every log record
#[derive(Debug, Clone)]
pub struct RequestMeta {
    /// All request headers, names lowercased by the HTTP stack
    pub headers: HashMap<String, String>,

    /// Declared content type, if any
    pub content_type: Option<String>,

    /// Best-effort client IP from proxy headers
    pub client_ip: Option<String>,

    /// User-Agent value
    pub user_agent: Option<String>,
}

impl RequestMeta {
    /// Capture metadata from the inbound header map. Duplicate header names
    /// keep the last value seen.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut map = HashMap::new();
        for (name, value) in headers {
            if let Ok(value) = value.to_str() {
                map.insert(name.as_str().to_string(), value.to_string());
            }
        }

        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let user_agent = headers
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        Self {
            headers: map,
            content_type,
            client_ip: client_ip_from_headers(headers),
            user_agent,
        }
    }

    /// Copy the captured metadata onto a log record
    pub fn apply(&self, log: &mut crate::model::WebhookLog) {
        log.headers = self.headers.clone();
        log.client_ip = self.client_ip.clone();
        log.user_agent = self.user_agent.clone();
    }
}

/// Derive the client IP: first hop of `x-forwarded-for`, falling back to
/// `x-real-ip`
fn client_ip_from_headers(headers: &HeaderMap) -> Option<String> {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        let first = forwarded.split(',').next()?.trim();
        if !first.is_empty() {
            return Some(first.to_string());
        }
    }
    headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
}
