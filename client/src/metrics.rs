use crate::errors::{Error, Result};
use lazy_static::lazy_static;
use prometheus::{Counter, Encoder, Histogram, HistogramOpts, Opts, Registry, TextEncoder};
use std::sync::OnceLock;

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref REQUESTS_TOTAL: Counter = Counter::with_opts(Opts::new(
        "gateway_client_requests_total",
        "Total requests sent to the gateway API"
    ))
    .expect("valid counter opts");
    pub static ref TRANSPORT_FAILURES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "gateway_client_transport_failures_total",
        "Total requests that obtained no response"
    ))
    .expect("valid counter opts");
    pub static ref HTTP_FAILURES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "gateway_client_http_failures_total",
        "Total responses with a non-success status"
    ))
    .expect("valid counter opts");
    pub static ref REQUEST_LATENCY_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "gateway_client_request_latency_seconds",
            "Time from sending a request to receiving its response"
        )
        .buckets(vec![
            0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0
        ])
    )
    .expect("valid histogram opts");
}

static REGISTERED: OnceLock<std::result::Result<(), String>> = OnceLock::new();

/// Registers the client metrics with [`REGISTRY`]. Safe to call repeatedly;
/// registration runs once and every call reports its outcome.
pub fn init_metrics() -> Result<()> {
    registration_outcome(&REGISTERED, register_all)
}

fn registration_outcome(
    cell: &OnceLock<std::result::Result<(), String>>,
    register: impl FnOnce() -> Result<()>,
) -> Result<()> {
    cell.get_or_init(|| register().map_err(|e| e.to_string()))
        .clone()
        .map_err(|msg| Error::Metrics(prometheus::Error::Msg(msg)))
}

fn register_all() -> Result<()> {
    REGISTRY.register(Box::new(REQUESTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(TRANSPORT_FAILURES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(HTTP_FAILURES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(REQUEST_LATENCY_SECONDS.clone()))?;
    Ok(())
}

pub fn gather_metrics() -> Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))?)
}
