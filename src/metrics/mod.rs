//! Prometheus instrumentation for the session engine.
//!
//! Collectors are process-wide. Embedders either call [`render_metrics`] to
//! scrape the built-in registry or attach the collectors to their own
//! registry with [`register_custom_metrics`].


use std::sync::Once;

use lazy_static::lazy_static;
use prometheus::exponential_buckets;
use prometheus::Encoder;
use prometheus::HistogramOpts;
use prometheus::HistogramVec;
use prometheus::IntCounter;
use prometheus::IntCounterVec;
use prometheus::IntGauge;
use prometheus::Opts;
use prometheus::Registry;
use prometheus::TextEncoder;
use tracing::error;

lazy_static! {
    pub static ref RECONNECTS: IntCounter =
        IntCounter::new("reconnects_total", "Connection attempts after a lost connection")
            .expect("metric can not be created");

    pub static ref PINGS_SENT: IntCounter =
        IntCounter::new("pings_sent_total", "Heartbeats sent to the ensemble")
            .expect("metric can not be created");

    pub static ref SESSION_EXPIRATIONS: IntCounter =
        IntCounter::new("session_expirations_total", "Sessions declared expired")
            .expect("metric can not be created");

    pub static ref REQUESTS_SENT: IntCounterVec = IntCounterVec::new(
        Opts::new("requests_sent_total", "Requests written to the ensemble"),
        &["op"]
    )
    .expect("metric can not be created");

    pub static ref REQUEST_ERRORS: IntCounterVec = IntCounterVec::new(
        Opts::new("request_errors_total", "Operations completed with a non-OK status"),
        &["code"]
    )
    .expect("metric can not be created");

    pub static ref WATCH_EVENTS: IntCounterVec = IntCounterVec::new(
        Opts::new("watch_events_total", "Watch events delivered to watchers"),
        &["event_type"]
    )
    .expect("metric can not be created");

    pub static ref IN_FLIGHT_REQUESTS: IntGauge =
        IntGauge::new("in_flight_requests", "Requests sent and awaiting a reply")
            .expect("metric can not be created");

    pub static ref REQUEST_LATENCY_MS: HistogramVec = HistogramVec::new(
        HistogramOpts::new("request_latency_ms", "Send-to-reply latency in ms")
            .buckets(exponential_buckets(1.0, 2.0, 14).expect("valid buckets")),
        &["op"]
    )
    .expect("metric can not be created");

    pub static ref REGISTRY: Registry = Registry::new();
}

static REGISTER_DEFAULT: Once = Once::new();

/// Attach every engine collector to `registry`.
pub fn register_custom_metrics(registry: &Registry) {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(RECONNECTS.clone()),
        Box::new(PINGS_SENT.clone()),
        Box::new(SESSION_EXPIRATIONS.clone()),
        Box::new(REQUESTS_SENT.clone()),
        Box::new(REQUEST_ERRORS.clone()),
        Box::new(WATCH_EVENTS.clone()),
        Box::new(IN_FLIGHT_REQUESTS.clone()),
        Box::new(REQUEST_LATENCY_MS.clone()),
    ];
    for collector in collectors {
        if let Err(e) = registry.register(collector) {
            error!("collector can not be registered: {:?}", e);
        }
    }
}

/// Text exposition of the built-in registry.
pub fn render_metrics() -> String {
    REGISTER_DEFAULT.call_once(|| register_custom_metrics(&REGISTRY));

    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        error!("could not encode custom metrics: {}", e);
    }
    String::from_utf8(buffer).unwrap_or_else(|e| {
        error!("custom metrics could not be from_utf8'd: {}", e);
        String::default()
    })
}
