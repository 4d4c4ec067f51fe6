// ===============================
// src/query.rs
// ===============================
//
// Read-through cache per resource (stocks / transactions):
// - stale_time : hasil fetch dianggap fresh selama window ini; `fetch()`
//                melayani dari cache tanpa network call.
// - dedup      : paling banyak 1 request in-flight per resource; caller lain
//                menumpang future yang sama (Shared).
// - retry      : read yang gagal dicoba ulang `retries` kali, backoff
//                eksponensial 1s,2s,4s.. (maks 30s) + jitter.
// - seq        : nomor monoton per fetch; hasil lama tidak menimpa hasil baru.
//

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt, Shared};
use rand::Rng;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use crate::api::ApiError;
use crate::metrics::{FETCH_LATENCY, FETCH_RETRIES, POLLS};

#[derive(Clone, Debug)]
pub struct QueryOptions {
    pub stale_time: Duration,
    pub retries: u32,
    pub retry_base: Duration,
    pub retry_max: Duration,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            stale_time: Duration::from_secs(1),
            retries: 2,
            retry_base: Duration::from_secs(1),
            retry_max: Duration::from_secs(30),
        }
    }
}

/// One successful fetch result.
#[derive(Debug)]
pub struct Fetched<T> {
    pub seq: u64,
    pub at: Instant,
    pub data: Arc<T>,
}

impl<T> Clone for Fetched<T> {
    fn clone(&self) -> Self {
        Self { seq: self.seq, at: self.at, data: self.data.clone() }
    }
}

/// Outcome of one fetch as seen by the view layer.
#[derive(Debug, Clone)]
pub struct Settled<T> {
    pub seq: u64,
    pub result: Result<Arc<T>, ApiError>,
}

pub type Fetcher<T> = Arc<dyn Fn() -> BoxFuture<'static, Result<T, ApiError>> + Send + Sync>;

type InFlight<T> = Shared<BoxFuture<'static, Result<Arc<T>, ApiError>>>;

struct Inner<T> {
    last: Option<Fetched<T>>,
    inflight: Option<(u64, InFlight<T>)>,
    next_seq: u64,
}

pub struct Query<T> {
    key: &'static str,
    fetcher: Fetcher<T>,
    opts: QueryOptions,
    inner: Mutex<Inner<T>>,
}

impl<T: Send + Sync + 'static> Query<T> {
    pub fn new(key: &'static str, fetcher: Fetcher<T>, opts: QueryOptions) -> Self {
        Self {
            key,
            fetcher,
            opts,
            inner: Mutex::new(Inner { last: None, inflight: None, next_seq: 1 }),
        }
    }

    pub fn key(&self) -> &'static str {
        self.key
    }

    /// Serve from cache while fresh, otherwise join or start a network fetch.
    pub async fn fetch(&self) -> Settled<T> {
        {
            let inner = self.lock();
            if let Some(last) = &inner.last {
                if last.at.elapsed() < self.opts.stale_time {
                    debug!(query = self.key, seq = last.seq, "served from cache");
                    return Settled { seq: last.seq, result: Ok(last.data.clone()) };
                }
            }
        }
        self.refetch().await
    }

    /// Ignore stale-time; still collapses onto an in-flight request.
    pub async fn refetch(&self) -> Settled<T> {
        let (seq, fut) = {
            let mut inner = self.lock();
            let joined = inner.inflight.clone();
            let out = match joined {
                Some((seq, fut)) => {
                    debug!(query = self.key, seq, "joined in-flight fetch");
                    (seq, fut)
                }
                None => {
                    let seq = inner.next_seq;
                    inner.next_seq += 1;
                    let fut = self.start().shared();
                    inner.inflight = Some((seq, fut.clone()));
                    (seq, fut)
                }
            };
            out
        };

        let result = fut.await;

        let mut inner = self.lock();
        if matches!(&inner.inflight, Some((s, _)) if *s == seq) {
            inner.inflight = None;
        }
        if let Ok(data) = &result {
            let newer = inner.last.as_ref().map_or(true, |l| l.seq < seq);
            if newer {
                inner.last = Some(Fetched { seq, at: Instant::now(), data: data.clone() });
            }
        }
        Settled { seq, result }
    }

    fn start(&self) -> BoxFuture<'static, Result<Arc<T>, ApiError>> {
        let fetcher = self.fetcher.clone();
        let opts = self.opts.clone();
        let key = self.key;
        async move {
            let started = Instant::now();
            let mut attempt: u32 = 0;
            let out = loop {
                match (fetcher)().await {
                    Ok(v) => break Ok(Arc::new(v)),
                    Err(e) if attempt < opts.retries => {
                        let delay = backoff(&opts, attempt);
                        attempt += 1;
                        FETCH_RETRIES.with_label_values(&[key]).inc();
                        warn!(query = key, attempt, ?delay, error = %e, "fetch failed, retrying");
                        sleep(delay).await;
                    }
                    Err(e) => break Err(e),
                }
            };
            let outcome = if out.is_ok() { "ok" } else { "error" };
            POLLS.with_label_values(&[key, outcome]).inc();
            FETCH_LATENCY
                .with_label_values(&[key])
                .observe(started.elapsed().as_secs_f64() * 1000.0);
            out
        }
        .boxed()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner<T>> {
        // lock tidak pernah ditahan melewati .await, poisoning diabaikan
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// min(base * 2^attempt, max) plus up to 250ms jitter.
fn backoff(opts: &QueryOptions, attempt: u32) -> Duration {
    let factor = 1u32 << attempt.min(16);
    let base = opts.retry_base.saturating_mul(factor).min(opts.retry_max);
    if base.is_zero() {
        return base;
    }
    let jitter = rand::thread_rng().gen_range(0..=250);
    base + Duration::from_millis(jitter)
}
