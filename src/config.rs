// ===============================
// src/config.rs
// ===============================
/*
=============================================================================
Project : trade_dashboard — live quotes & transaction ledger terminal in Rust
Module  : config.rs
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
use std::env;
use std::time::Duration;

use clap::Parser;
use dotenvy::dotenv;
use thiserror::Error;
use url::Url;

pub const DEFAULT_API_URL: &str = "http://localhost:3000";
pub const DEFAULT_LOG_FILE: &str = "trade_dashboard.log";

/// Flag CLI; kalau diisi, menimpa nilai dari ENV / .env
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "trade_dashboard", version, about = "Live quotes & transactions dashboard")]
pub struct Cli {
    /// REST base URL (overrides API_URL)
    #[arg(long)]
    pub api_url: Option<String>,

    /// JSONL event file (overrides RECORD_FILE)
    #[arg(long)]
    pub record_file: Option<String>,

    /// Prometheus port (overrides METRICS_PORT)
    #[arg(long)]
    pub metrics_port: Option<u16>,

    /// tracing output file (overrides LOG_FILE)
    #[arg(long)]
    pub log_file: Option<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid API url {url:?}: {reason}")]
    BadApiUrl { url: String, reason: String },
}

#[derive(Clone, Debug)]
pub struct Settings {
    pub api_url: Url,

    // polling & cache
    pub stocks_every: Duration,
    pub transactions_every: Duration,
    pub stale_time: Duration,
    pub fetch_retries: u32,

    // files/metrics
    pub record_file: Option<String>,
    pub metrics_port: Option<u16>,
    pub log_file: String,
}

pub fn load() -> Result<Settings, ConfigError> {
    // Pastikan .env dibaca (agar API_URL, RECORD_FILE, dll ter-load)
    let _ = dotenv();
    let cli = Cli::parse();
    resolve(|key| env::var(key).ok(), &cli)
}

/// Merge environment lookups with CLI overrides.
pub fn resolve<F>(get: F, cli: &Cli) -> Result<Settings, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let ms = |key: &str, default: u64| -> Duration {
        let v = get(key).and_then(|s| s.trim().parse::<u64>().ok()).unwrap_or(default);
        Duration::from_millis(v.max(1))
    };

    let raw_url = cli
        .api_url
        .clone()
        .or_else(|| get("API_URL"))
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_API_URL.to_string());
    let api_url = parse_api_url(&raw_url)?;

    let fetch_retries = get("FETCH_RETRIES")
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(2);

    let record_file = cli
        .record_file
        .clone()
        .or_else(|| get("RECORD_FILE"))
        .filter(|s| !s.is_empty());
    let metrics_port = cli
        .metrics_port
        .or_else(|| get("METRICS_PORT").and_then(|s| s.trim().parse().ok()));
    let log_file = cli
        .log_file
        .clone()
        .or_else(|| get("LOG_FILE"))
        .unwrap_or_else(|| DEFAULT_LOG_FILE.to_string());

    Ok(Settings {
        api_url,
        stocks_every: ms("STOCKS_POLL_MS", 1_000),
        transactions_every: ms("TRANSACTIONS_POLL_MS", 15_000),
        stale_time: ms("STALE_MS", 1_000),
        fetch_retries,
        record_file,
        metrics_port,
        log_file,
    })
}

fn parse_api_url(raw: &str) -> Result<Url, ConfigError> {
    let bad = |reason: String| ConfigError::BadApiUrl { url: raw.to_string(), reason };
    let url = Url::parse(raw.trim()).map_err(|e| bad(e.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(bad(format!("unsupported scheme {other}"))),
    }
}
