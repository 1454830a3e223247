//! Shared application state
//!
//! One [`AppState`] is built at startup and handed to every handler behind
//! an `Arc`. It wires the store, the secret cipher, the provider fetcher,
//! and the forwarding engine together, and carries the counters the status
//! endpoint reports.
//!
//! # Thread Safety
//!
//! - `store`: internally locked, shared with detached forwarding tasks
//! - `cipher`, `fetcher`, `forwarder`, `config`: immutable after creation
//! - counters: `AtomicU64` for lock-free increments
//! - `latency_histogram`: RwLock-wrapped for efficient reads

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::config::AppConfig;
use crate::crypto::SecretCipher;
use crate::error::Result;
use crate::forward::Forwarder;
use crate::handlers::LatencyHistogram;
use crate::resource::{HttpResourceFetcher, ResourceFetcher};
use crate::store::Store;

/// Shared state behind every route
pub struct AppState {
    /// Server start time for uptime calculation
    start_time: Instant,

    /// Endpoint, credential, and log storage
    store: Arc<Store>,

    /// Cipher for credentials and shared secrets
    cipher: SecretCipher,

    /// Provider resource fetcher for classic deliveries
    fetcher: Arc<dyn ResourceFetcher>,

    /// Outbound delivery engine
    forwarder: Forwarder,

    /// Startup configuration
    config: AppConfig,

    /// Inbound deliveries logged (all statuses)
    webhooks_received: AtomicU64,

    /// Background forwards currently in flight
    forwards_in_flight: AtomicU64,

    /// Replays executed
    replays_executed: AtomicU64,

    /// Intake handler latency for percentile reporting
    latency_histogram: LatencyHistogram,
}

impl AppState {
    /// Build the full state from startup configuration.
    ///
    /// The provider fetcher defaults to the real HTTP client against
    /// `config.provider_api_base`; tests swap it via
    /// [`with_fetcher`](Self::with_fetcher).
    pub fn new(config: AppConfig) -> Result<Self> {
        let cipher = SecretCipher::new(&config.encryption_key)?;
        let fetcher = Arc::new(HttpResourceFetcher::new(config.provider_api_base.clone()));
        let forwarder = Forwarder::new(config.max_concurrent_forwards);
        Ok(Self {
            start_time: Instant::now(),
            store: Arc::new(Store::new()),
            cipher,
            fetcher,
            forwarder,
            config,
            webhooks_received: AtomicU64::new(0),
            forwards_in_flight: AtomicU64::new(0),
            replays_executed: AtomicU64::new(0),
            latency_histogram: LatencyHistogram::new(),
        })
    }

    /// Replace the provider fetcher (used by tests to avoid live calls)
    pub fn with_fetcher(mut self, fetcher: Arc<dyn ResourceFetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    /// Get the store
    #[inline]
    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Get the secret cipher
    #[inline]
    pub fn cipher(&self) -> &SecretCipher {
        &self.cipher
    }

    /// Get the provider fetcher
    #[inline]
    pub fn fetcher(&self) -> &Arc<dyn ResourceFetcher> {
        &self.fetcher
    }

    /// Get the forwarding engine
    #[inline]
    pub fn forwarder(&self) -> &Forwarder {
        &self.forwarder
    }

    /// Get the startup configuration
    #[inline]
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Get the server uptime in seconds
    #[inline]
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Get the total number of inbound deliveries logged
    #[inline]
    pub fn webhooks_received(&self) -> u64 {
        self.webhooks_received.load(Ordering::Relaxed)
    }

    /// Count one inbound delivery and return the new total
    #[inline]
    pub fn increment_webhooks_received(&self) -> u64 {
        self.webhooks_received.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Get the number of background forwards currently in flight
    #[inline]
    pub fn forwards_in_flight(&self) -> u64 {
        self.forwards_in_flight.load(Ordering::Relaxed)
    }

    /// Track a background forward starting
    #[inline]
    pub fn increment_forwards_in_flight(&self) -> u64 {
        self.forwards_in_flight.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Track a background forward finishing.
    ///
    /// Uses saturating subtraction to prevent underflow.
    #[inline]
    pub fn decrement_forwards_in_flight(&self) -> u64 {
        // Use compare-exchange loop to prevent underflow
        loop {
            let current = self.forwards_in_flight.load(Ordering::Relaxed);
            if current == 0 {
                return 0;
            }
            match self.forwards_in_flight.compare_exchange_weak(
                current,
                current - 1,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return current - 1,
                Err(_) => continue,
            }
        }
    }

    /// Get the total number of replays executed
    #[inline]
    pub fn replays_executed(&self) -> u64 {
        self.replays_executed.load(Ordering::Relaxed)
    }

    /// Count one replay
    #[inline]
    pub fn increment_replays_executed(&self) -> u64 {
        self.replays_executed.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Record an intake handler latency in microseconds
    #[inline]
    pub fn record_latency_us(&self, latency_us: u64) {
        self.latency_histogram.record(latency_us);
    }

    /// Get the latency histogram
    #[inline]
    pub fn latency_histogram(&self) -> &LatencyHistogram {
        &self.latency_histogram
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("uptime_seconds", &self.uptime_seconds())
            .field("webhooks_received", &self.webhooks_received())
            .field("forwards_in_flight", &self.forwards_in_flight())
            .field("replays_executed", &self.replays_executed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_state() -> AppState {
        AppState::new(AppConfig::test_config()).unwrap()
    }

    #[test]
    fn test_counters() {
        let state = test_state();

        assert_eq!(state.webhooks_received(), 0);
        assert_eq!(state.increment_webhooks_received(), 1);
        assert_eq!(state.increment_webhooks_received(), 2);

        state.increment_forwards_in_flight();
        state.increment_forwards_in_flight();
        assert_eq!(state.forwards_in_flight(), 2);
        state.decrement_forwards_in_flight();
        assert_eq!(state.forwards_in_flight(), 1);

        // Decrementing past zero saturates instead of wrapping
        state.decrement_forwards_in_flight();
        assert_eq!(state.decrement_forwards_in_flight(), 0);
        assert_eq!(state.forwards_in_flight(), 0);

        assert_eq!(state.increment_replays_executed(), 1);
    }

    #[test]
    fn test_latency_recording() {
        let state = test_state();
        state.record_latency_us(1_500);
        state.record_latency_us(2_500);
        assert_eq!(state.latency_histogram().count(), 2);
    }

    #[test]
    fn test_debug_does_not_leak_secrets() {
        let state = test_state();
        let rendered = format!("{:?}", state);
        assert!(!rendered.contains("test-master-key"));
    }
}
