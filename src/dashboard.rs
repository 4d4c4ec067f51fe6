// ===============================
// src/dashboard.rs
// ===============================
//
// Event loop dashboard (satu task memegang App):
//   pollers  --AppEvent-->  loop  --Command-->  spawned REST call --AppEvent--> loop
//   keyboard --KeyEvent-->  loop
//
// Pollers hidup selama dashboard ter-mount: start sebelum loop, stop setelah
// loop keluar (termasuk saat error terminal).
//

use std::io::{self, Stdout};
use std::sync::Arc;

use chrono::Utc;
use crossterm::{
    event::{Event, EventStream},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use futures_util::{FutureExt, StreamExt};
use ratatui::{backend::CrosstermBackend, Terminal};
use tokio::{
    select,
    sync::mpsc::{self, error::TrySendError},
    time::{interval, Duration, MissedTickBehavior},
};
use tracing::{debug, error, info, warn};

use crate::api::TradingApi;
use crate::app::{App, AppEvent, Command};
use crate::config::Settings;
use crate::domain::{Record, Stock, Transaction};
use crate::metrics::RECORDS_DROPPED;
use crate::poll::Pollers;
use crate::query::{Fetcher, Query, QueryOptions};
use crate::ui;

type Term = Terminal<CrosstermBackend<Stdout>>;

const UI_TICK: Duration = Duration::from_millis(100);

/// Read caches shared by pollers and manual refresh.
#[derive(Clone)]
pub struct Queries {
    pub stocks: Arc<Query<Vec<Stock>>>,
    pub transactions: Arc<Query<Vec<Transaction>>>,
}

impl Queries {
    pub fn new(api: &Arc<dyn TradingApi>, opts: QueryOptions) -> Self {
        let a = api.clone();
        let stocks: Fetcher<Vec<Stock>> = Arc::new(move || {
            let a = a.clone();
            async move { a.list_stocks().await }.boxed()
        });
        let a = api.clone();
        let transactions: Fetcher<Vec<Transaction>> = Arc::new(move || {
            let a = a.clone();
            async move { a.list_transactions().await }.boxed()
        });
        Self {
            stocks: Arc::new(Query::new("stocks", stocks, opts.clone())),
            transactions: Arc::new(Query::new("transactions", transactions, opts)),
        }
    }
}

/// Executes view commands off the loop; results come back as AppEvents.
#[derive(Clone)]
pub struct Dispatcher {
    api: Arc<dyn TradingApi>,
    queries: Queries,
    events: mpsc::Sender<AppEvent>,
}

impl Dispatcher {
    pub fn new(api: Arc<dyn TradingApi>, queries: Queries, events: mpsc::Sender<AppEvent>) -> Self {
        Self { api, queries, events }
    }

    pub fn dispatch(&self, cmd: Command) {
        let api = self.api.clone();
        let events = self.events.clone();
        match cmd {
            Command::CreateTransaction(request) => {
                tokio::spawn(async move {
                    let result = api.create_transaction(&request).await;
                    send(&events, AppEvent::OrderPlaced { request, result }).await;
                });
            }
            Command::UpdateStatus { id, status } => {
                tokio::spawn(async move {
                    let result = api.update_transaction_status(id, status).await;
                    send(&events, AppEvent::StatusApplied { id, status, result }).await;
                });
            }
            Command::Refresh => {
                let q = self.queries.clone();
                tokio::spawn(async move {
                    let (s, t) = tokio::join!(q.stocks.fetch(), q.transactions.fetch());
                    send(&events, AppEvent::Stocks(s)).await;
                    send(&events, AppEvent::Transactions(t)).await;
                });
            }
        }
    }
}

async fn send(events: &mpsc::Sender<AppEvent>, ev: AppEvent) {
    if events.send(ev).await.is_err() {
        debug!("dashboard gone, dropping event");
    }
}

/// JSONL line for an event, if it is worth recording.
/// Hand one event to the recorder without blocking the UI loop.
/// Returns false when the record was not queued.
fn forward_record(rec: &mpsc::Sender<Record>, ev: &AppEvent) -> bool {
    match rec.try_send(to_record(ev)) {
        Ok(()) => true,
        Err(TrySendError::Full(r)) => {
            RECORDS_DROPPED.inc();
            warn!(record = ?r, "recorder queue full, event dropped");
            false
        }
        Err(TrySendError::Closed(_)) => {
            RECORDS_DROPPED.inc();
            warn!("recorder stopped, event dropped");
            false
        }
    }
}

pub fn to_record(ev: &AppEvent) -> Record {
    let ts = Utc::now();
    match ev {
        AppEvent::Stocks(s) => Record::Poll {
            ts,
            resource: "stocks".into(),
            seq: s.seq,
            rows: s.result.as_ref().map(|v| v.len()).unwrap_or(0),
            error: s.result.as_ref().err().map(|e| e.to_string()),
        },
        AppEvent::Transactions(s) => Record::Poll {
            ts,
            resource: "transactions".into(),
            seq: s.seq,
            rows: s.result.as_ref().map(|v| v.len()).unwrap_or(0),
            error: s.result.as_ref().err().map(|e| e.to_string()),
        },
        AppEvent::OrderPlaced { request, result } => Record::Order {
            ts,
            request: request.clone(),
            transaction_id: result.as_ref().ok().map(|t| t.transaction_id),
            error: result.as_ref().err().map(|e| e.to_string()),
        },
        AppEvent::StatusApplied { id, status, result } => Record::StatusChange {
            ts,
            transaction_id: *id,
            status: *status,
            error: result.as_ref().err().map(|e| e.to_string()),
        },
    }
}

pub async fn run(
    api: Arc<dyn TradingApi>,
    settings: &Settings,
    recorder: Option<mpsc::Sender<Record>>,
) -> io::Result<()> {
    let mut terminal = setup_terminal()?;
    let result = event_loop(&mut terminal, api, settings, recorder).await;
    if let Err(e) = restore_terminal(&mut terminal) {
        error!(?e, "failed to restore terminal");
    }
    result
}

async fn event_loop(
    terminal: &mut Term,
    api: Arc<dyn TradingApi>,
    settings: &Settings,
    recorder: Option<mpsc::Sender<Record>>,
) -> io::Result<()> {
    let opts = QueryOptions {
        stale_time: settings.stale_time,
        retries: settings.fetch_retries,
        ..QueryOptions::default()
    };
    let queries = Queries::new(&api, opts);
    let (ev_tx, mut ev_rx) = mpsc::channel::<AppEvent>(1024);
    let dispatcher = Dispatcher::new(api, queries.clone(), ev_tx.clone());

    let mut pollers = Pollers::start(
        queries.stocks.clone(),
        settings.stocks_every,
        queries.transactions.clone(),
        settings.transactions_every,
        ev_tx,
    );

    let mut app = App::new();
    let mut keys = EventStream::new();
    let mut tick = interval(UI_TICK);
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let outcome = loop {
        if let Err(e) = terminal.draw(|f| ui::draw(f, &mut app)) {
            break Err(e);
        }

        select! {
            Some(ev) = ev_rx.recv() => {
                if let Some(rec) = &recorder {
                    forward_record(rec, &ev);
                }
                app.apply(ev);
            }
            maybe_key = keys.next() => match maybe_key {
                Some(Ok(Event::Key(key))) => {
                    if let Some(cmd) = app.handle_key(key) {
                        debug!(?cmd, "dispatch");
                        dispatcher.dispatch(cmd);
                    }
                }
                // resize dll: cukup redraw
                Some(Ok(_)) => {}
                Some(Err(e)) => break Err(e),
                None => break Ok(()),
            },
            _ = tick.tick() => app.on_tick(),
        }

        if app.should_quit {
            info!("quit requested");
            break Ok(());
        }
    };

    pollers.stop().await;
    outcome
}

fn setup_terminal() -> io::Result<Term> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    Terminal::new(CrosstermBackend::new(stdout))
}

fn restore_terminal(terminal: &mut Term) -> io::Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiError;
    use crate::app::tests::{acme, tx};
    use crate::app::Screen;
    use crate::domain::{TransactionRequest, TransactionStatus};
    use async_trait::async_trait;
    use crossterm::event::{KeyCode, KeyEvent};
    use std::sync::Mutex;

    #[derive(Default)]
    struct MockApi {
        calls: Mutex<Vec<String>>,
        fail_reads: bool,
        next_id: Mutex<i64>,
    }

    impl MockApi {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TradingApi for MockApi {
        async fn list_stocks(&self) -> Result<Vec<Stock>, ApiError> {
            self.calls.lock().unwrap().push("list_stocks".into());
            if self.fail_reads {
                return Err(ApiError::Network("connection refused".into()));
            }
            Ok(vec![acme()])
        }

        async fn list_transactions(&self) -> Result<Vec<Transaction>, ApiError> {
            self.calls.lock().unwrap().push("list_transactions".into());
            if self.fail_reads {
                return Err(ApiError::Network("connection refused".into()));
            }
            Ok(vec![tx(7, TransactionStatus::Pending)])
        }

        async fn create_transaction(&self, req: &TransactionRequest) -> Result<Transaction, ApiError> {
            self.calls.lock().unwrap().push(format!(
                "create {} {} {} {}",
                req.symbol,
                req.kind.code(),
                req.quantity,
                req.notes
            ));
            let mut id = self.next_id.lock().unwrap();
            *id += 1;
            let mut t = tx(100 + *id, TransactionStatus::Pending);
            t.symbol = req.symbol.clone();
            Ok(t)
        }

        async fn update_transaction_status(
            &self,
            id: i64,
            status: TransactionStatus,
        ) -> Result<Option<Transaction>, ApiError> {
            self.calls.lock().unwrap().push(format!("update {id} {}", status.code()));
            Ok(None)
        }
    }

    fn setup(api: Arc<MockApi>) -> (Dispatcher, Queries, mpsc::Receiver<AppEvent>) {
        let dyn_api: Arc<dyn TradingApi> = api;
        let queries = Queries::new(&dyn_api, QueryOptions::default());
        let (tx, rx) = mpsc::channel(16);
        (Dispatcher::new(dyn_api, queries.clone(), tx), queries, rx)
    }

    #[tokio::test]
    async fn confirmed_buy_creates_exactly_one_transaction() {
        let api = Arc::new(MockApi::default());
        let (dispatcher, _, mut rx) = setup(api.clone());

        let mut app = App::new();
        app.apply(AppEvent::Stocks(crate::query::Settled { seq: 1, result: Ok(Arc::new(vec![acme()])) }));
        app.apply(AppEvent::Transactions(crate::query::Settled { seq: 1, result: Ok(Arc::new(vec![])) }));

        app.handle_key(KeyEvent::from(KeyCode::Char('b')));
        for code in [KeyCode::Enter, KeyCode::Char('y'), KeyCode::Enter] {
            if let Some(cmd) = app.handle_key(KeyEvent::from(code)) {
                dispatcher.dispatch(cmd);
            }
        }

        let ev = rx.recv().await.unwrap();
        let rec = to_record(&ev);
        app.apply(ev);
        assert_eq!(api.calls(), vec!["create ACME 1 100 Automated transaction".to_string()]);
        assert!(matches!(rec, Record::Order { transaction_id: Some(101), error: None, .. }));
        assert_eq!(app.alert.as_ref().map(|a| a.text.as_str()), Some(crate::app::MSG_ORDER_OK));
    }

    #[tokio::test]
    async fn status_change_reaches_api_and_waits_for_poll() {
        let api = Arc::new(MockApi::default());
        let (dispatcher, queries, mut rx) = setup(api.clone());

        let mut app = App::new();
        dispatcher.dispatch(Command::Refresh);
        app.apply(rx.recv().await.unwrap());
        app.apply(rx.recv().await.unwrap());
        assert_eq!(app.screen(), Screen::Dashboard);

        let cmd = app.change_status(7, TransactionStatus::Cancelled).unwrap();
        dispatcher.dispatch(cmd);
        app.apply(rx.recv().await.unwrap());
        assert!(app.is_updating(7));
        assert!(api.calls().contains(&"update 7 3".to_string()));

        app.apply(AppEvent::Transactions(queries.transactions.refetch().await));
        assert!(!app.is_updating(7));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_reads_render_error_page() {
        let api = Arc::new(MockApi { fail_reads: true, ..MockApi::default() });
        let (dispatcher, _, mut rx) = setup(api.clone());

        let mut app = App::new();
        dispatcher.dispatch(Command::Refresh);
        app.apply(rx.recv().await.unwrap());
        app.apply(rx.recv().await.unwrap());

        // 1 percobaan + 2 retry per resource
        let reads = api.calls();
        assert_eq!(reads.iter().filter(|c| *c == "list_stocks").count(), 3);
        assert_eq!(reads.iter().filter(|c| *c == "list_transactions").count(), 3);
        match app.screen() {
            Screen::Error(msg) => assert!(msg.contains("connection refused")),
            other => panic!("expected error screen, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn full_recorder_queue_is_counted_not_silent() {
        let (rec, mut rec_rx) = mpsc::channel::<Record>(1);
        let ev = AppEvent::StatusApplied { id: 7, status: TransactionStatus::Completed, result: Ok(None) };
        let before = RECORDS_DROPPED.get();

        assert!(forward_record(&rec, &ev));
        assert!(!forward_record(&rec, &ev));
        assert!(RECORDS_DROPPED.get() >= before + 1);

        match rec_rx.recv().await.unwrap() {
            Record::StatusChange { transaction_id, status, error, .. } => {
                assert_eq!(transaction_id, 7);
                assert_eq!(status, TransactionStatus::Completed);
                assert!(error.is_none());
            }
            other => panic!("unexpected record {other:?}"),
        }

        drop(rec_rx);
        assert!(!forward_record(&rec, &ev));
    }
}
