//! Metrics Collection for ReasonKit Hooks Observability
//!
//! This module provides production-ready metrics collection with:
//! - Atomic counters for intake, forwarding, and replay activity
//! - Memory-efficient histograms for duration percentiles
//! - Prometheus-compatible text format export via the /metrics endpoint
//!
//! # Example
//!
//! ```rust,no_run
//! use reasonkit_hooks::metrics::global_metrics;
//! use std::time::Duration;
//!
//! // Record a processed delivery
//! global_metrics().record_webhook("classic", "success", Duration::from_millis(42));
//!
//! // Get Prometheus output
//! let output = global_metrics().to_prometheus_format();
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{OnceLock, RwLock};
use std::time::{Duration, Instant};

/// Maximum number of duration samples to keep per histogram
/// This provides a good balance between memory usage and accuracy
const MAX_HISTOGRAM_SAMPLES: usize = 1000;

/// Metrics collection for ReasonKit Hooks observability
///
/// Thread-safe metrics collector using atomics and RwLocks for
/// high-performance concurrent access.
#[derive(Debug)]
pub struct Metrics {
    // === Counters ===
    /// Total number of webhook deliveries logged (all statuses)
    pub webhooks_total: AtomicU64,
    /// Total number of forward attempts
    pub forwards_total: AtomicU64,
    /// Forward attempts that did not end in 2xx
    pub forwards_failed_total: AtomicU64,
    /// Total number of replays executed
    pub replays_total: AtomicU64,

    // === Gauges ===
    /// Background forwards currently in flight
    pub forwards_in_flight: AtomicU32,

    // === Histograms (memory-efficient ring buffers) ===
    /// Intake handler durations for percentile calculation
    intake_durations: RwLock<RingBuffer<Duration>>,
    /// Forward attempt durations for percentile calculation
    forward_durations: RwLock<RingBuffer<Duration>>,

    // === Labeled counters (for detailed breakdowns) ===
    /// Deliveries broken down by endpoint kind and terminal status
    webhooks_by_kind_status: RwLock<HashMap<(String, String), u64>>,
    /// Replays broken down by resolved target
    replays_by_target: RwLock<HashMap<String, u64>>,

    // === Timing ===
    /// When metrics collection started
    start_time: RwLock<Option<Instant>>,
}

/// Memory-efficient ring buffer for histogram samples
#[derive(Debug)]
struct RingBuffer<T> {
    data: Vec<T>,
    capacity: usize,
    /// Position of next write (wraps around)
    write_pos: usize,
    /// Total samples received (may exceed capacity)
    total_samples: u64,
}

impl<T: Clone + Ord> RingBuffer<T> {
    fn new(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            capacity,
            write_pos: 0,
            total_samples: 0,
        }
    }

    fn push(&mut self, value: T) {
        if self.data.len() < self.capacity {
            self.data.push(value);
        } else {
            self.data[self.write_pos] = value;
        }
        self.write_pos = (self.write_pos + 1) % self.capacity;
        self.total_samples += 1;
    }

    fn len(&self) -> usize {
        self.data.len()
    }

    fn total_samples(&self) -> u64 {
        self.total_samples
    }

    /// Get a sorted copy of all samples (for percentile calculation)
    fn sorted_samples(&self) -> Vec<T> {
        let mut sorted = self.data.clone();
        sorted.sort();
        sorted
    }

    /// Calculate percentile (0.0 to 1.0)
    fn percentile(&self, p: f64) -> Option<T> {
        if self.data.is_empty() {
            return None;
        }
        let sorted = self.sorted_samples();
        let idx = ((sorted.len() as f64 - 1.0) * p).round() as usize;
        sorted.get(idx).cloned()
    }
}

impl Metrics {
    /// Create a new Metrics instance
    ///
    /// Cannot use `const fn` due to RwLock containing non-const operations
    pub fn new() -> Self {
        Self {
            webhooks_total: AtomicU64::new(0),
            forwards_total: AtomicU64::new(0),
            forwards_failed_total: AtomicU64::new(0),
            replays_total: AtomicU64::new(0),
            forwards_in_flight: AtomicU32::new(0),
            intake_durations: RwLock::new(RingBuffer::new(MAX_HISTOGRAM_SAMPLES)),
            forward_durations: RwLock::new(RingBuffer::new(MAX_HISTOGRAM_SAMPLES)),
            webhooks_by_kind_status: RwLock::new(HashMap::new()),
            replays_by_target: RwLock::new(HashMap::new()),
            start_time: RwLock::new(None),
        }
    }

    /// Record one logged delivery with its handler duration
    pub fn record_webhook(&self, kind: &str, status: &str, duration: Duration) {
        self.webhooks_total.fetch_add(1, Ordering::Relaxed);

        // Update intake histogram
        if let Ok(mut durations) = self.intake_durations.write() {
            durations.push(duration);
        }

        // Update kind/status breakdown
        if let Ok(mut breakdown) = self.webhooks_by_kind_status.write() {
            *breakdown
                .entry((kind.to_string(), status.to_string()))
                .or_insert(0) += 1;
        }
    }

    /// Record one forward attempt outcome
    pub fn record_forward(&self, success: bool, time_ms: u64) {
        self.forwards_total.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.forwards_failed_total.fetch_add(1, Ordering::Relaxed);
        }

        if let Ok(mut durations) = self.forward_durations.write() {
            durations.push(Duration::from_millis(time_ms));
        }
    }

    /// Record one replay with its resolved target type
    pub fn record_replay(&self, target: &str) {
        self.replays_total.fetch_add(1, Ordering::Relaxed);

        if let Ok(mut breakdown) = self.replays_by_target.write() {
            *breakdown.entry(target.to_string()).or_insert(0) += 1;
        }
    }

    /// Increment in-flight forwards
    pub fn inc_forwards_in_flight(&self) {
        self.forwards_in_flight.fetch_add(1, Ordering::Relaxed);
    }

    /// Decrement in-flight forwards
    pub fn dec_forwards_in_flight(&self) {
        self.forwards_in_flight.fetch_sub(1, Ordering::Relaxed);
    }

    /// Convert metrics to Prometheus text format
    pub fn to_prometheus_format(&self) -> String {
        let mut output = String::new();

        // Counters
        output.push_str(&format!(
            "reasonkit_hooks_webhooks_total {}\n",
            self.webhooks_total.load(Ordering::Relaxed)
        ));
        output.push_str(&format!(
            "reasonkit_hooks_forwards_total {}\n",
            self.forwards_total.load(Ordering::Relaxed)
        ));
        output.push_str(&format!(
            "reasonkit_hooks_forwards_failed_total {}\n",
            self.forwards_failed_total.load(Ordering::Relaxed)
        ));
        output.push_str(&format!(
            "reasonkit_hooks_replays_total {}\n",
            self.replays_total.load(Ordering::Relaxed)
        ));

        // Gauges
        output.push_str(&format!(
            "reasonkit_hooks_forwards_in_flight {}\n",
            self.forwards_in_flight.load(Ordering::Relaxed)
        ));

        // Uptime, once init() ran
        if let Ok(start_time) = self.start_time.read() {
            if let Some(started) = *start_time {
                output.push_str(&format!(
                    "reasonkit_hooks_uptime_seconds {}\n",
                    started.elapsed().as_secs()
                ));
            }
        }

        // Labeled breakdowns (sorted for stable output)
        if let Ok(breakdown) = self.webhooks_by_kind_status.read() {
            let mut entries: Vec<_> = breakdown.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            for ((kind, status), count) in entries {
                output.push_str(&format!(
                    "reasonkit_hooks_webhooks_by_kind_status{{kind=\"{}\",status=\"{}\"}} {}\n",
                    kind, status, count
                ));
            }
        }
        if let Ok(breakdown) = self.replays_by_target.read() {
            let mut entries: Vec<_> = breakdown.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            for (target, count) in entries {
                output.push_str(&format!(
                    "reasonkit_hooks_replays_by_target{{target=\"{}\"}} {}\n",
                    target, count
                ));
            }
        }

        // Histogram metrics (simple percentile calculation)
        if let Ok(durations) = self.intake_durations.read() {
            Self::push_percentiles(&mut output, "reasonkit_hooks_intake_duration", &durations);
        }
        if let Ok(durations) = self.forward_durations.read() {
            Self::push_percentiles(&mut output, "reasonkit_hooks_forward_duration", &durations);
        }

        output
    }

    fn push_percentiles(output: &mut String, prefix: &str, durations: &RingBuffer<Duration>) {
        if durations.len() == 0 {
            return;
        }
        // All-time count, not the window size: the ring keeps only the most
        // recent samples but the counter keeps growing
        output.push_str(&format!(
            "{}_samples_total {}\n",
            prefix,
            durations.total_samples()
        ));
        for (label, p) in [("p50", 0.5), ("p95", 0.95), ("p99", 0.99)] {
            if let Some(value) = durations.percentile(p) {
                output.push_str(&format!("{}_{}_ms {}\n", prefix, label, value.as_millis()));
            }
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Global metrics instance for the server
///
/// Use this for recording metrics throughout the codebase:
/// ```rust,ignore
/// use reasonkit_hooks::metrics::global_metrics;
/// global_metrics().record_forward(true, 120);
/// ```
pub static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Get or initialize the global metrics instance
pub fn global_metrics() -> &'static Metrics {
    METRICS.get_or_init(Metrics::new)
}

/// Initialize global metrics (call once at startup)
pub fn init() {
    let _ = METRICS.get_or_init(Metrics::new);

    // Initialize start time
    if let Ok(mut start_time) = global_metrics().start_time.write() {
        *start_time = Some(Instant::now());
    }
}
