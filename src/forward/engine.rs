//! Single-attempt webhook delivery with manual redirect handling

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use http::header;
use tokio::sync::Semaphore;
use tracing::debug;
use url::Url;

use crate::error::ForwardError;
use crate::model::ForwardingResult;

/// Maximum chars of a downstream error body kept in the result
const MAX_ERROR_BODY_CHARS: usize = 200;

/// Everything one delivery attempt needs, resolved by the caller
#[derive(Debug, Clone)]
pub struct ForwardRequest {
    /// Target URL
    pub url: String,

    /// Exact body string as originally received
    pub body: String,

    /// Content type to send, mirrored from the inbound request
    pub content_type: String,

    /// Endpoint-configured extra headers
    pub headers: HashMap<String, String>,

    /// Overall time budget in milliseconds, covering both redirect hops
    pub timeout_ms: u64,
}

/// Terminal downstream response: status plus failure detail for non-2xx
struct Delivered {
    status: u16,
    error: Option<String>,
}

/// Resolve a `Location` header against the URL that produced it
fn resolve_location(base: &str, location: &str) -> Result<String, ForwardError> {
    let base = Url::parse(base)
        .map_err(|e| ForwardError::Transport(format!("Invalid forward URL: {}", e)))?;
    base.join(location)
        .map(|u| u.to_string())
        .map_err(|e| ForwardError::Transport(format!("Invalid redirect location: {}", e)))
}

/// Outbound delivery engine.
///
/// One POST per attempt, exact body bytes, no automatic redirects: an HTTP
/// client following a 3xx on its own re-issues the request as GET, which
/// silently drops the payload. Instead a single redirect hop is re-POSTed
/// manually with the same body and headers, and the second response is the
/// reported outcome.
///
/// [`forward`](Forwarder::forward) never returns an error: every failure
/// mode (timeout, transport, non-2xx) is folded into the
/// [`ForwardingResult`] so callers have exactly one shape to persist.
#[derive(Debug, Clone)]
pub struct Forwarder {
    client: reqwest::Client,
    limiter: Arc<Semaphore>,
}

impl Forwarder {
    /// Create an engine allowing at most `max_concurrent` in-flight
    /// background deliveries
    pub fn new(max_concurrent: usize) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(crate::USER_AGENT)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .expect("Failed to create HTTP client");
        Self {
            client,
            limiter: Arc::new(Semaphore::new(max_concurrent)),
        }
    }

    /// Concurrency limiter shared by the background dispatch path
    pub fn limiter(&self) -> Arc<Semaphore> {
        Arc::clone(&self.limiter)
    }

    /// Deliver one webhook body. Always returns a result; timing is
    /// measured end to end from the first byte sent, across the redirect
    /// hop if one happens.
    pub async fn forward(&self, request: &ForwardRequest) -> ForwardingResult {
        let started = Instant::now();
        let budget = Duration::from_millis(request.timeout_ms);

        let outcome = tokio::time::timeout(budget, self.execute(request)).await;
        let time_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(Ok(Delivered { status, error: None })) => ForwardingResult::ok(status, time_ms),
            Ok(Ok(Delivered {
                status,
                error: Some(detail),
            })) => ForwardingResult::failed(detail, Some(status), time_ms),
            Ok(Err(err)) => ForwardingResult::failed(err.to_string(), None, time_ms),
            Err(_) => ForwardingResult::failed(
                ForwardError::Timeout(request.timeout_ms).to_string(),
                None,
                time_ms,
            ),
        }
    }

    /// Run the POST (and at most one redirect re-POST) without any timeout;
    /// the caller's `tokio::time::timeout` bounds the whole thing, so the
    /// second hop automatically gets only the remaining budget.
    async fn execute(&self, request: &ForwardRequest) -> Result<Delivered, ForwardError> {
        let first = self.post_once(&request.url, request).await?;

        if first.status().is_redirection() {
            let location = first
                .headers()
                .get(header::LOCATION)
                .and_then(|v| v.to_str().ok())
                .map(String::from);
            if let Some(location) = location {
                let next_url = resolve_location(&request.url, &location)?;
                debug!(from = %request.url, to = %next_url, "Re-POSTing to redirect target");
                let second = self.post_once(&next_url, request).await?;
                return Self::conclude(second, true).await;
            }
            // 3xx without Location falls through as a terminal failure
        }

        Self::conclude(first, false).await
    }

    async fn post_once(
        &self,
        url: &str,
        request: &ForwardRequest,
    ) -> Result<reqwest::Response, ForwardError> {
        let mut builder = self
            .client
            .post(url)
            .header(header::CONTENT_TYPE, &request.content_type)
            .body(request.body.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        builder
            .send()
            .await
            .map_err(|e| ForwardError::Transport(e.to_string()))
    }

    async fn conclude(
        response: reqwest::Response,
        redirected: bool,
    ) -> Result<Delivered, ForwardError> {
        let status = response.status();
        if status.is_success() {
            return Ok(Delivered {
                status: status.as_u16(),
                error: None,
            });
        }

        let body: String = response
            .text()
            .await
            .unwrap_or_default()
            .chars()
            .take(MAX_ERROR_BODY_CHARS)
            .collect();
        let error = if redirected {
            format!("HTTP {} (after redirect): {}", status.as_u16(), body)
        } else {
            format!("HTTP {}: {}", status.as_u16(), body)
        };
        Ok(Delivered {
            status: status.as_u16(),
            error: Some(error),
        })
    }
}
