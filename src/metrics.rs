// ===============================
// src/metrics.rs
// ===============================
use std::convert::Infallible;
use std::net::SocketAddr;

use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Response, Server, StatusCode};
use once_cell::sync::Lazy;
use prometheus::{
    core::Collector, Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge,
    IntGaugeVec, Opts, Registry, TextEncoder,
};
use tracing::{error, info};

// Single custom registry (we register everything here)
pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

// -------- Reads (polling) --------
pub static POLLS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("polls_total", "settled fetches per resource (labels: resource, outcome)"),
        &["resource", "outcome"],
    )
    .unwrap()
});

pub static FETCH_RETRIES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("fetch_retries_total", "retried read attempts"),
        &["resource"],
    )
    .unwrap()
});

// Latency of one settled fetch including retries (milliseconds)
pub static FETCH_LATENCY: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new("fetch_latency_ms", "settled fetch latency (ms)").buckets(vec![
            5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0,
        ]),
        &["resource"],
    )
    .unwrap()
});

// -------- Writes --------
pub static ORDERS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("orders_total", "submitted orders (labels: side, outcome)"),
        &["side", "outcome"],
    )
    .unwrap()
});

pub static STATUS_UPDATES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("status_updates_total", "status change requests (label: outcome)"),
        &["outcome"],
    )
    .unwrap()
});

pub static PENDING_EDITS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("pending_status_edits", "rows waiting for a poll to confirm a status edit")
        .unwrap()
});

// Recorder channel penuh -> event tidak tertulis
pub static RECORDS_DROPPED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("records_dropped_total", "events not written because the recorder queue was full")
        .unwrap()
});

// ---- Config visibility ----
pub static CONFIG_API: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(Opts::new("config_api_url", "configured API base (label: url)"), &["url"])
        .unwrap()
});

fn collectors() -> Vec<Box<dyn Collector>> {
    vec![
        Box::new(POLLS.clone()),
        Box::new(FETCH_RETRIES.clone()),
        Box::new(FETCH_LATENCY.clone()),
        Box::new(ORDERS.clone()),
        Box::new(STATUS_UPDATES.clone()),
        Box::new(PENDING_EDITS.clone()),
        Box::new(RECORDS_DROPPED.clone()),
        Box::new(CONFIG_API.clone()),
    ]
}

pub fn init() {
    // Register all metrics to the custom registry
    for c in collectors() {
        if let Err(e) = REGISTRY.register(c) {
            error!(?e, "metric registration failed");
        }
    }
}

// Encode all metrics in Prometheus text format
fn encode_metrics() -> Vec<u8> {
    let encoder = TextEncoder::new();
    let families = REGISTRY.gather();
    let mut buf = Vec::new();
    if encoder.encode(&families, &mut buf).is_err() || buf.is_empty() {
        buf.extend_from_slice(b"# no metrics\n");
    }
    buf
}

async fn handle(req: Request<Body>) -> Result<Response<Body>, Infallible> {
    let rsp = match req.uri().path() {
        "/" | "/metrics" => Response::builder()
            .header("Content-Type", "text/plain; version=0.0.4; charset=utf-8")
            .body(Body::from(encode_metrics())),
        _ => Response::builder().status(StatusCode::NOT_FOUND).body(Body::empty()),
    };
    Ok(rsp.unwrap_or_else(|_| Response::new(Body::empty())))
}

/// Serve GET / and /metrics until the task is dropped.
pub async fn serve_metrics(port: u16) {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let make = make_service_fn(|_conn| async { Ok::<_, Infallible>(service_fn(handle)) });
    let server = match Server::try_bind(&addr) {
        Ok(b) => b.serve(make),
        Err(e) => {
            error!(?e, %addr, "metrics bind failed");
            return;
        }
    };
    info!(%addr, "metrics listening on / and /metrics");
    if let Err(e) = server.await {
        error!(?e, "metrics server stopped");
    }
}
