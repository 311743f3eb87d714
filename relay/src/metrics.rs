use lazy_static::lazy_static;
use prometheus::{Counter, Encoder, Gauge, Histogram, HistogramOpts, Opts, Registry, TextEncoder};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref MESSAGES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "relay_messages_total",
        "Total messages received from MQTT"
    ))
    .unwrap();
    pub static ref VALID_MESSAGES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "relay_valid_messages_total",
        "Total valid readings after validation"
    ))
    .unwrap();
    pub static ref INVALID_MESSAGES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "relay_invalid_messages_total",
        "Total invalid messages rejected"
    ))
    .unwrap();
    pub static ref DB_FAILURES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "relay_db_failures_total",
        "Total database append failures"
    ))
    .unwrap();
    pub static ref DELIVERY_FAILURES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "relay_delivery_failures_total",
        "Total per-viewer send failures during fan-out"
    ))
    .unwrap();
    pub static ref RAW_RELAYED_TOTAL: Counter = Counter::with_opts(Opts::new(
        "relay_raw_relayed_total",
        "Total raw sensor payloads relayed from the live channel"
    ))
    .unwrap();
    pub static ref CONNECTED_VIEWERS: Gauge = Gauge::with_opts(Opts::new(
        "relay_connected_viewers",
        "Viewer connections currently registered with the broadcast hub"
    ))
    .unwrap();
    pub static ref INGEST_LATENCY_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "relay_ingest_latency_seconds",
            "Time from transport receipt to fan-out completion"
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0
        ])
    )
    .unwrap();
}

pub fn init_metrics() {
    REGISTRY.register(Box::new(MESSAGES_TOTAL.clone())).unwrap();
    REGISTRY
        .register(Box::new(VALID_MESSAGES_TOTAL.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(INVALID_MESSAGES_TOTAL.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(DB_FAILURES_TOTAL.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(DELIVERY_FAILURES_TOTAL.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(RAW_RELAYED_TOTAL.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(CONNECTED_VIEWERS.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(INGEST_LATENCY_SECONDS.clone()))
        .unwrap();
}

pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}
