//! Request statistics.
//!
//! Counters are plain atomics; the latency window is a bounded ring so memory
//! stays constant for the lifetime of the client. Derived rates are computed
//! on [`StatsCollector::snapshot`], never stored.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

/// Default number of latency samples kept in the rolling window.
pub const DEFAULT_WINDOW: usize = 100;

/// Thread-safe atomic counter.
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.value.store(0, Ordering::Relaxed);
    }
}

/// Point-in-time view of the collector plus cache sizes.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchStats {
    pub requests: u64,
    pub cache_hits: u64,
    pub token_refreshes: u64,
    pub errors: u64,
    /// Mean of the rolling window, in milliseconds.
    pub avg_response_time: f64,
    /// Percentage of requests served from the dedup pool.
    pub cache_hit_rate: f64,
    /// Percentage of requests that failed.
    pub error_rate: f64,
    pub pool_size: usize,
    pub token_cache_size: usize,
}

/// Process-wide request statistics.
#[derive(Debug)]
pub struct StatsCollector {
    requests: Counter,
    cache_hits: Counter,
    token_refreshes: Counter,
    errors: Counter,
    window: Mutex<VecDeque<f64>>,
    capacity: usize,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self::with_window(DEFAULT_WINDOW)
    }

    pub fn with_window(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            requests: Counter::new(),
            cache_hits: Counter::new(),
            token_refreshes: Counter::new(),
            errors: Counter::new(),
            window: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Record one finished request.
    pub fn record(&self, duration: Duration, cache_hit: bool) {
        self.requests.inc();
        if cache_hit {
            self.cache_hits.inc();
        }

        let mut window = self.window.lock().unwrap_or_else(|e| e.into_inner());
        if window.len() == self.capacity {
            window.pop_front();
        }
        window.push_back(duration.as_secs_f64() * 1000.0);
    }

    pub fn record_error(&self) {
        self.errors.inc();
    }

    pub fn record_token_refresh(&self) {
        self.token_refreshes.inc();
    }

    pub fn snapshot(&self) -> FetchStats {
        let requests = self.requests.get();
        let cache_hits = self.cache_hits.get();
        let errors = self.errors.get();

        let avg_response_time = {
            let window = self.window.lock().unwrap_or_else(|e| e.into_inner());
            if window.is_empty() {
                0.0
            } else {
                window.iter().sum::<f64>() / window.len() as f64
            }
        };
        let rate = |n: u64| {
            if requests > 0 {
                n as f64 / requests as f64 * 100.0
            } else {
                0.0
            }
        };

        FetchStats {
            requests,
            cache_hits,
            token_refreshes: self.token_refreshes.get(),
            errors,
            avg_response_time,
            cache_hit_rate: rate(cache_hits),
            error_rate: rate(errors),
            pool_size: 0,
            token_cache_size: 0,
        }
    }

    pub fn reset(&self) {
        self.requests.reset();
        self.cache_hits.reset();
        self.token_refreshes.reset();
        self.errors.reset();
        self.window
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    pub fn window_len(&self) -> usize {
        self.window.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl Default for StatsCollector {
    fn default() -> Self {
        Self::new()
    }
}
