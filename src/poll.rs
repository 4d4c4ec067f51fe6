// ===============================
// src/poll.rs
// ===============================
//
// Scheduled re-fetch per resource. Each Poller owns its timer task and is
// started/stopped together with the dashboard; nothing keeps polling after
// stop() (or drop).
//
// Tick pertama langsung jalan (initial load). Tick berikutnya mengikuti
// wall-clock interval; selama fetch sebelumnya belum selesai tick dilewati,
// jadi per poller paling banyak satu waiter dan satu event per seq.
//

use std::sync::Arc;
use std::time::Duration;

use tokio::{
    select,
    sync::{mpsc, watch},
    task::{JoinHandle, JoinSet},
    time::{interval, MissedTickBehavior},
};
use tracing::{debug, info};

use crate::app::AppEvent;
use crate::domain::{Stock, Transaction};
use crate::query::{Query, Settled};

pub struct Poller {
    name: &'static str,
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Poller {
    pub fn start<T>(
        query: Arc<Query<T>>,
        every: Duration,
        tx: mpsc::Sender<AppEvent>,
        wrap: fn(Settled<T>) -> AppEvent,
    ) -> Self
    where
        T: Send + Sync + 'static,
    {
        let name = query.key();
        let (shutdown, mut stop_rx) = watch::channel(false);
        info!(poller = name, every_ms = every.as_millis() as u64, "poller started");

        let handle = tokio::spawn(async move {
            let mut tick = interval(every);
            tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut fetches = JoinSet::new();

            loop {
                select! {
                    _ = stop_rx.changed() => break,
                    _ = tick.tick() => {
                        // masih ada fetch berjalan: tick ini di-coalesce, bukan diantrikan
                        if !fetches.is_empty() {
                            debug!(poller = name, "fetch still running, tick skipped");
                            continue;
                        }
                        let q = query.clone();
                        let tx = tx.clone();
                        fetches.spawn(async move {
                            let settled = q.refetch().await;
                            // receiver hilang = dashboard sudah selesai
                            if tx.send(wrap(settled)).await.is_err() {
                                debug!(poller = q.key(), "event channel closed");
                            }
                        });
                    }
                    Some(_) = fetches.join_next(), if !fetches.is_empty() => {}
                }
            }
            fetches.abort_all();
            debug!(poller = name, "poller loop exited");
        });

        Self { name, shutdown, handle }
    }

    /// Stop the timer and any fetch it still has running.
    pub async fn stop(&mut self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = (&mut self.handle).await {
            if !e.is_cancelled() {
                tracing::warn!(poller = self.name, ?e, "poller task failed");
            }
        }
        info!(poller = self.name, "poller stopped");
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// The two pollers the dashboard runs while it is mounted.
pub struct Pollers {
    pub stocks: Poller,
    pub transactions: Poller,
}

impl Pollers {
    pub fn start(
        stocks: Arc<Query<Vec<Stock>>>,
        stocks_every: Duration,
        transactions: Arc<Query<Vec<Transaction>>>,
        transactions_every: Duration,
        tx: mpsc::Sender<AppEvent>,
    ) -> Self {
        Self {
            stocks: Poller::start(stocks, stocks_every, tx.clone(), AppEvent::Stocks),
            transactions: Poller::start(
                transactions,
                transactions_every,
                tx,
                AppEvent::Transactions,
            ),
        }
    }

    pub async fn stop(&mut self) {
        self.stocks.stop().await;
        self.transactions.stop().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{Fetcher, QueryOptions};
    use futures_util::FutureExt;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::sleep;

    fn stock_query(calls: Arc<AtomicU32>) -> Arc<Query<Vec<Stock>>> {
        let fetcher: Fetcher<Vec<Stock>> = Arc::new(move || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(vec![Stock::default()]) }.boxed()
        });
        Arc::new(Query::new("stocks", fetcher, QueryOptions::default()))
    }

    #[tokio::test(start_paused = true)]
    async fn polls_on_interval_until_stopped() {
        let calls = Arc::new(AtomicU32::new(0));
        let (tx, mut rx) = mpsc::channel(64);
        let mut poller = Poller::start(
            stock_query(calls.clone()),
            Duration::from_secs(1),
            tx,
            AppEvent::Stocks,
        );

        // tick di t=0, 1, 2
        sleep(Duration::from_millis(2_500)).await;
        poller.stop().await;
        let seen = calls.load(Ordering::SeqCst);
        assert_eq!(seen, 3);

        let mut seqs = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            match ev {
                AppEvent::Stocks(s) => seqs.push(s.seq),
                other => panic!("unexpected event {other:?}"),
            }
        }
        assert_eq!(seqs, vec![1, 2, 3]);

        sleep(Duration::from_secs(5)).await;
        assert_eq!(calls.load(Ordering::SeqCst), seen);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_fetch_is_not_duplicated_by_later_ticks() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let fetcher: Fetcher<Vec<Stock>> = Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async {
                sleep(Duration::from_millis(3_500)).await;
                Ok(Vec::new())
            }
            .boxed()
        });
        let query = Arc::new(Query::new("stocks", fetcher, QueryOptions::default()));
        let (tx, mut rx) = mpsc::channel(64);
        let mut poller = Poller::start(query, Duration::from_secs(1), tx, AppEvent::Stocks);

        let drain = |rx: &mut mpsc::Receiver<AppEvent>| {
            let mut seqs = Vec::new();
            while let Ok(AppEvent::Stocks(s)) = rx.try_recv() {
                seqs.push(s.seq);
            }
            seqs
        };

        // tick 1,2,3 jatuh selama fetch pertama (t=0..3.5) masih jalan
        sleep(Duration::from_millis(3_200)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(drain(&mut rx).is_empty());

        sleep(Duration::from_millis(500)).await;
        assert_eq!(drain(&mut rx), vec![1]);

        // tick t=4 memulai fetch baru, selesai t=7.5
        sleep(Duration::from_millis(3_900)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(drain(&mut rx), vec![2]);
        poller.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn hung_fetch_does_not_pile_up_waiters() {
        let fetcher: Fetcher<Vec<Stock>> = Arc::new(|| {
            async {
                sleep(Duration::from_secs(600)).await;
                Ok(Vec::new())
            }
            .boxed()
        });
        let query = Arc::new(Query::new("stocks", fetcher, QueryOptions::default()));
        let (tx, mut rx) = mpsc::channel(1024);
        let mut poller = Poller::start(query, Duration::from_secs(1), tx, AppEvent::Stocks);

        sleep(Duration::from_millis(600_500)).await;
        let mut seqs = Vec::new();
        while let Ok(AppEvent::Stocks(s)) = rx.try_recv() {
            seqs.push(s.seq);
        }
        assert_eq!(seqs, vec![1]);
        poller.stop().await;
    }
}
