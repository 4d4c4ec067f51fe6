// ===============================
// src/main.rs
// ===============================
/*
 cd /home/kukuhtw/rust/trade_dashboard

 # arahkan ke trading service lain
 API_URL=http://10.0.0.5:3000 cargo run --release

 # metrics + rekaman event
 METRICS_PORT=9898 RECORD_FILE=data/events.jsonl cargo run --release
 curl -s localhost:9898/metrics | egrep '^(polls_total|orders_total|pending_status_edits)'

*/
/*
=============================================================================
Project : trade_dashboard — live quotes & transaction ledger terminal in Rust
Module  : main.rs
Version : 0.5.0
Author  : Kukuh Tripamungkas Wicaksono (Kukuh TW)
Email   : kukuhtw@gmail.com
WhatsApp: https://wa.me/628129893706
LinkedIn: https://id.linkedin.com/in/kukuhtw
License : MIT (see LICENSE)

Summary : Polls a trading REST service for stock quotes (1s) and the
          transaction ledger (15s), renders both as terminal tables, submits
          confirmed buy/sell orders and status changes, exposes Prometheus
          metrics, and records JSONL events.

(c) 2025 Kukuh TW. All rights reserved where applicable.
=============================================================================
*/
mod api;        // REST client (stocks / transactions)
mod app;        // view state machine, tanpa I/O
mod config;
mod dashboard;  // terminal + event loop
mod domain;
mod format;
mod metrics;
mod poll;
mod query;      // cache + dedup + retry
mod recorder;
mod ui;

use std::fs::OpenOptions;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::api::{HttpTradingApi, TradingApi};
use crate::domain::Record;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    // ---- Load config ----
    let settings = config::load()?;

    // ---- Logging ----
    // Terminal dipakai UI, jadi log ditulis ke file
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&settings.log_file)?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(Mutex::new(log_file))
        .with_ansi(false)
        .init();

    info!(
        api_url = %settings.api_url,
        stocks_every_ms = settings.stocks_every.as_millis() as u64,
        transactions_every_ms = settings.transactions_every.as_millis() as u64,
        stale_ms = settings.stale_time.as_millis() as u64,
        retries = settings.fetch_retries,
        record_file = ?settings.record_file,
        metrics_port = ?settings.metrics_port,
        "startup config"
    );

    // ---- Metrics ----
    metrics::init();
    metrics::CONFIG_API
        .with_label_values(&[settings.api_url.as_str()])
        .set(1);
    if let Some(port) = settings.metrics_port {
        tokio::spawn(metrics::serve_metrics(port));
    }

    // ---- Recorder (optional) ----
    let (rec_tx, rec_task) = match settings.record_file.clone() {
        Some(path) => {
            let (tx, rx) = mpsc::channel::<Record>(8192);
            (Some(tx), Some(tokio::spawn(recorder::run(rx, path))))
        }
        None => (None, None),
    };

    // ---- Dashboard ----
    let api: Arc<dyn TradingApi> = Arc::new(HttpTradingApi::new(&settings.api_url));
    let outcome = dashboard::run(api, &settings, rec_tx).await;

    // sender recorder sudah di-drop -> recorder flush lalu selesai
    if let Some(task) = rec_task {
        if let Err(e) = task.await {
            error!(?e, "recorder task failed");
        }
    }

    if let Err(e) = &outcome {
        error!(?e, "dashboard stopped with error");
    }
    info!("bye");
    outcome.map_err(Into::into)
}
