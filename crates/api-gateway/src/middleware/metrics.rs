//! Gateway counters.
//!
//! Plain atomics, readable as JSON and, with the `metrics` feature, in the
//! Prometheus text format.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// A relaxed atomic counter. Also used as a gauge through [`Counter::dec`].
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn inc(&self) {
        self.add(1);
    }

    pub fn add(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn dec(&self) {
        // Saturates so an unmatched close cannot wrap the gauge.
        let _ = self
            .0
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| v.checked_sub(1));
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Counters shared by the dispatcher, the rate limiter and the push side.
#[derive(Debug, Default)]
pub struct GatewayMetrics {
    pub dispatched: Counter,
    pub dispatch_ok: Counter,
    pub dispatch_failed: Counter,
    pub writes: Counter,
    pub panics: Counter,

    pub throttled: Counter,

    pub events_pushed: Counter,
    pub events_suppressed: Counter,

    pub push_sessions: Counter,
    pub api_sessions: Counter,
    pub frames_sent: Counter,

    // Sum and count only, no histogram.
    dispatch_millis: Counter,
    timed_dispatches: Counter,
}

impl GatewayMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account for one finished dispatch.
    pub fn record_dispatch(&self, ok: bool, write: bool, elapsed_ms: u64) {
        self.dispatched.inc();
        match ok {
            true => self.dispatch_ok.inc(),
            false => self.dispatch_failed.inc(),
        }
        if write {
            self.writes.inc();
        }
        self.dispatch_millis.add(elapsed_ms);
        self.timed_dispatches.inc();
    }

    pub fn record_panic(&self) {
        self.panics.inc();
    }

    pub fn record_rate_limit_rejection(&self) {
        self.throttled.inc();
    }

    pub fn record_event_pushed(&self) {
        self.events_pushed.inc();
    }

    pub fn record_event_suppressed(&self) {
        self.events_suppressed.inc();
    }

    pub fn record_push_session_open(&self) {
        self.push_sessions.inc();
    }

    pub fn record_push_session_close(&self) {
        self.push_sessions.dec();
    }

    pub fn record_api_session_open(&self) {
        self.api_sessions.inc();
    }

    pub fn record_api_session_close(&self) {
        self.api_sessions.dec();
    }

    pub fn record_ws_message(&self) {
        self.frames_sent.inc();
    }

    /// Mean dispatch time in milliseconds, `0.0` before the first dispatch.
    pub fn mean_dispatch_ms(&self) -> f64 {
        match self.timed_dispatches.get() {
            0 => 0.0,
            n => self.dispatch_millis.get() as f64 / n as f64,
        }
    }

    #[cfg(feature = "metrics")]
    pub fn to_prometheus(&self) -> String {
        use std::fmt::Write;

        let series: [(&str, &str, &Counter, &str); 11] = [
            ("requests_total", "Dispatched requests", &self.dispatched, "counter"),
            ("requests_success_total", "Requests without errors", &self.dispatch_ok, "counter"),
            ("requests_error_total", "Requests with errors", &self.dispatch_failed, "counter"),
            ("write_requests_total", "Create, update, delete and patch requests", &self.writes, "counter"),
            ("panics_recovered_total", "Panics caught at the dispatch boundary", &self.panics, "counter"),
            ("rate_limit_rejected_total", "Rate limited requests", &self.throttled, "counter"),
            ("events_pushed_total", "Events published to subscribers", &self.events_pushed, "counter"),
            ("events_suppressed_total", "Events dropped by filters", &self.events_suppressed, "counter"),
            ("push_sessions", "Active push sessions", &self.push_sessions, "gauge"),
            ("api_sessions", "Active WebSocket API sessions", &self.api_sessions, "gauge"),
            ("websocket_messages_sent_total", "Frames sent to WebSocket clients", &self.frames_sent, "counter"),
        ];

        let mut out = String::new();
        for (name, help, counter, kind) in series {
            let _ = writeln!(out, "# HELP api_gateway_{name} {help}");
            let _ = writeln!(out, "# TYPE api_gateway_{name} {kind}");
            let _ = writeln!(out, "api_gateway_{name} {}", counter.get());
        }
        let _ = writeln!(out, "# HELP api_gateway_dispatch_mean_ms Mean dispatch time");
        let _ = writeln!(out, "# TYPE api_gateway_dispatch_mean_ms gauge");
        let _ = writeln!(out, "api_gateway_dispatch_mean_ms {:.2}", self.mean_dispatch_ms());
        out
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "requests": {
                "total": self.dispatched.get(),
                "success": self.dispatch_ok.get(),
                "error": self.dispatch_failed.get(),
                "writes": self.writes.get(),
                "panics": self.panics.get(),
            },
            "rate_limiting": { "rejected": self.throttled.get() },
            "push": {
                "pushed": self.events_pushed.get(),
                "suppressed": self.events_suppressed.get(),
            },
            "websocket": {
                "push_sessions": self.push_sessions.get(),
                "api_sessions": self.api_sessions.get(),
                "messages_sent": self.frames_sent.get(),
            },
            "latency": { "mean_ms": self.mean_dispatch_ms() },
        })
    }
}

/// Measures one dispatch and records it on [`DispatchTimer::finish`].
pub struct DispatchTimer {
    started: Instant,
    metrics: Arc<GatewayMetrics>,
    write: bool,
}

impl DispatchTimer {
    pub fn start(metrics: Arc<GatewayMetrics>, write: bool) -> Self {
        Self {
            started: Instant::now(),
            metrics,
            write,
        }
    }

    pub fn finish(self, ok: bool) {
        let elapsed = u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.metrics.record_dispatch(ok, self.write, elapsed);
    }
}
