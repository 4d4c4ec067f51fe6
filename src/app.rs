// ===============================
// src/app.rs
// ===============================
//
// State dashboard (single owner, hanya dimutasi dari event loop):
// - snapshot stocks & transactions terakhir + error per resource
// - set "status edit in-flight" per TransactionID
// - modal konfirmasi order (candidate stock + side)
// - status picker, cursor tabel, alert
//
// Tidak ada I/O di sini. Aksi yang butuh network dikembalikan sebagai
// `Command`; hasilnya masuk lagi sebagai `AppEvent`.
//
// Row status control:
//   Idle --(pilih status berbeda)--> PendingEdit --(poll transactions memuat id)--> Idle
// Selesainya PUT (sukses atau gagal) TIDAK mengembalikan row ke Idle.
//

use std::sync::Arc;
use std::time::Duration;

use ahash::AHashSet;
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::widgets::TableState;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::api::ApiError;
use crate::domain::{Stock, Transaction, TransactionRequest, TransactionStatus, TransactionType};
use crate::metrics::{ORDERS, PENDING_EDITS, STATUS_UPDATES};
use crate::query::Settled;

pub const ORDER_QUANTITY: i64 = 100;
pub const ORDER_NOTES: &str = "Automated transaction";
pub const ALERT_TTL: Duration = Duration::from_secs(5);

pub const MSG_ORDER_OK: &str = "Waiting for transaction to be processed...";
pub const MSG_ORDER_FAILED: &str = "Failed to create transaction. Please try again.";
pub const MSG_STATUS_FAILED: &str = "Failed to update status. Please try again.";

#[derive(Debug)]
pub enum AppEvent {
    Stocks(Settled<Vec<Stock>>),
    Transactions(Settled<Vec<Transaction>>),
    OrderPlaced {
        request: TransactionRequest,
        result: Result<Transaction, ApiError>,
    },
    StatusApplied {
        id: i64,
        status: TransactionStatus,
        result: Result<Option<Transaction>, ApiError>,
    },
}

/// Side effects requested by the view; executed by the dashboard loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    CreateTransaction(TransactionRequest),
    UpdateStatus { id: i64, status: TransactionStatus },
    Refresh,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Screen {
    Loading,
    Error(String),
    Dashboard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pane {
    Stocks,
    Transactions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Applied {
    Fresh,
    Repeat,
    Stale,
}

/// Latest settled state of one polled resource.
#[derive(Debug)]
pub struct Resource<T> {
    data: Option<Arc<T>>,
    error: Option<String>,
    seq: u64,
}

impl<T> Default for Resource<T> {
    fn default() -> Self {
        Self { data: None, error: None, seq: 0 }
    }
}

impl<T> Resource<T> {
    pub fn data(&self) -> Option<&T> {
        self.data.as_deref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Nothing settled yet, neither data nor error.
    pub fn is_loading(&self) -> bool {
        self.data.is_none() && self.error.is_none()
    }

    // respons dengan seq lebih tua dari yang sudah tampil dibuang
    fn apply(&mut self, settled: Settled<T>) -> Applied {
        if settled.seq < self.seq {
            return Applied::Stale;
        }
        let applied = if settled.seq == self.seq { Applied::Repeat } else { Applied::Fresh };
        self.seq = settled.seq;
        match settled.result {
            Ok(data) => {
                self.data = Some(data);
                self.error = None;
            }
            Err(e) => self.error = Some(e.to_string()),
        }
        applied
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingOrder {
    pub stock: Stock,
    pub kind: TransactionType,
}

impl PendingOrder {
    pub fn prompt(&self) -> String {
        format!(
            "Are you sure you want to {} {} shares of {}?",
            self.kind.verb(),
            ORDER_QUANTITY,
            self.stock.symbol
        )
    }

    fn request(&self) -> TransactionRequest {
        TransactionRequest {
            symbol: self.stock.symbol.clone(),
            kind: self.kind,
            quantity: ORDER_QUANTITY,
            notes: ORDER_NOTES.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusPicker {
    pub id: i64,
    pub choice: TransactionStatus,
}

#[derive(Debug, Clone)]
pub struct Alert {
    pub text: String,
    pub since: Instant,
}

pub struct App {
    pub stocks: Resource<Vec<Stock>>,
    pub transactions: Resource<Vec<Transaction>>,
    updating: AHashSet<i64>,
    pub modal: Option<PendingOrder>,
    pub picker: Option<StatusPicker>,
    pub alert: Option<Alert>,
    pub focus: Pane,
    pub stock_table: TableState,
    pub tx_table: TableState,
    pub spinner: usize,
    pub should_quit: bool,
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

impl App {
    pub fn new() -> Self {
        Self {
            stocks: Resource::default(),
            transactions: Resource::default(),
            updating: AHashSet::new(),
            modal: None,
            picker: None,
            alert: None,
            focus: Pane::Stocks,
            stock_table: TableState::default(),
            tx_table: TableState::default(),
            spinner: 0,
            should_quit: false,
        }
    }

    // ---- Screen selection ----
    pub fn screen(&self) -> Screen {
        if self.stocks.is_loading() || self.transactions.is_loading() {
            return Screen::Loading;
        }
        match self.stocks.error().or(self.transactions.error()) {
            Some(msg) => Screen::Error(format!("Error loading stocks: {msg}")),
            None => Screen::Dashboard,
        }
    }

    pub fn stock_rows(&self) -> &[Stock] {
        self.stocks.data().map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn transaction_rows(&self) -> &[Transaction] {
        self.transactions.data().map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_updating(&self, id: i64) -> bool {
        self.updating.contains(&id)
    }

    pub fn updating_count(&self) -> usize {
        self.updating.len()
    }

    // ---- Events from pollers & spawned requests ----
    pub fn apply(&mut self, ev: AppEvent) {
        match ev {
            AppEvent::Stocks(settled) => {
                if self.stocks.apply(settled) == Applied::Stale {
                    debug!("dropped out-of-order stocks response");
                }
                let len = self.stock_rows().len();
                clamp(&mut self.stock_table, len);
            }
            AppEvent::Transactions(settled) => {
                let fresh_ids: Option<AHashSet<i64>> = match &settled.result {
                    Ok(rows) => Some(rows.iter().map(|t| t.transaction_id).collect()),
                    Err(_) => None,
                };
                match self.transactions.apply(settled) {
                    Applied::Fresh => {
                        if let Some(ids) = fresh_ids {
                            self.reconcile(&ids);
                        }
                    }
                    Applied::Repeat => {}
                    Applied::Stale => debug!("dropped out-of-order transactions response"),
                }
                let len = self.transaction_rows().len();
                clamp(&mut self.tx_table, len);
                if let Some(p) = self.picker {
                    if !self.transaction_rows().iter().any(|t| t.transaction_id == p.id) {
                        self.picker = None;
                    }
                }
            }
            AppEvent::OrderPlaced { request, result } => match result {
                Ok(tx) => {
                    info!(id = tx.transaction_id, symbol = %tx.symbol, status = ?tx.status, "order accepted");
                    ORDERS.with_label_values(&[request.kind.verb(), "ok"]).inc();
                    self.show_alert(MSG_ORDER_OK);
                }
                Err(e) => {
                    error!(symbol = %request.symbol, side = request.kind.verb(), error = %e, "failed to create transaction");
                    ORDERS.with_label_values(&[request.kind.verb(), "error"]).inc();
                    self.show_alert(MSG_ORDER_FAILED);
                }
            },
            AppEvent::StatusApplied { id, status, result } => match result {
                Ok(_) => {
                    debug!(id, status = ?status, "status update acknowledged");
                    STATUS_UPDATES.with_label_values(&["ok"]).inc();
                }
                Err(e) => {
                    // marker tetap; baru dilepas saat poll berikutnya memuat id
                    warn!(id, status = ?status, error = %e, "failed to update transaction status");
                    STATUS_UPDATES.with_label_values(&["error"]).inc();
                    self.show_alert(MSG_STATUS_FAILED);
                }
            },
        }
    }

    /// Clear in-flight markers for every id the server snapshot now contains.
    fn reconcile(&mut self, ids: &AHashSet<i64>) {
        let before = self.updating.len();
        self.updating.retain(|id| !ids.contains(id));
        if self.updating.len() != before {
            debug!(cleared = before - self.updating.len(), "status edits reconciled");
        }
        PENDING_EDITS.set(self.updating.len() as i64);
    }

    // ---- Order confirmation ----
    pub fn request_order(&mut self, stock: Stock, kind: TransactionType) {
        self.modal = Some(PendingOrder { stock, kind });
    }

    pub fn confirm_order(&mut self) -> Option<Command> {
        let pending = self.modal.take()?;
        info!(symbol = %pending.stock.symbol, side = pending.kind.verb(), qty = ORDER_QUANTITY, "order confirmed");
        Some(Command::CreateTransaction(pending.request()))
    }

    pub fn cancel_order(&mut self) {
        if let Some(p) = self.modal.take() {
            debug!(symbol = %p.stock.symbol, "order cancelled");
        }
    }

    // ---- Status edits ----
    pub fn change_status(&mut self, id: i64, status: TransactionStatus) -> Option<Command> {
        if self.updating.contains(&id) {
            return None;
        }
        let current = self
            .transaction_rows()
            .iter()
            .find(|t| t.transaction_id == id)
            .map(|t| t.status);
        if current == Some(status) {
            return None;
        }
        self.updating.insert(id);
        PENDING_EDITS.set(self.updating.len() as i64);
        info!(id, status = ?status, "status change requested");
        Some(Command::UpdateStatus { id, status })
    }

    // ---- Alerts & ticks ----
    pub fn show_alert(&mut self, text: &str) {
        self.alert = Some(Alert { text: text.to_string(), since: Instant::now() });
    }

    pub fn on_tick(&mut self) {
        self.spinner = self.spinner.wrapping_add(1);
        if matches!(&self.alert, Some(a) if a.since.elapsed() >= ALERT_TTL) {
            self.alert = None;
        }
    }

    // ---- Keyboard ----
    pub fn handle_key(&mut self, key: KeyEvent) -> Option<Command> {
        if key.kind != KeyEventKind::Press {
            return None;
        }
        self.alert = None;

        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            self.should_quit = true;
            return None;
        }

        if self.screen() != Screen::Dashboard {
            return match key.code {
                KeyCode::Char('q') | KeyCode::Esc => {
                    self.should_quit = true;
                    None
                }
                KeyCode::Char('r') => Some(Command::Refresh),
                _ => None,
            };
        }

        if self.modal.is_some() {
            return match key.code {
                KeyCode::Char('y') | KeyCode::Enter => self.confirm_order(),
                KeyCode::Char('n') | KeyCode::Esc => {
                    self.cancel_order();
                    None
                }
                _ => None,
            };
        }

        if let Some(mut picker) = self.picker {
            return match key.code {
                KeyCode::Left | KeyCode::Up | KeyCode::Char('h') | KeyCode::Char('k') => {
                    picker.choice = picker.choice.prev();
                    self.picker = Some(picker);
                    None
                }
                KeyCode::Right | KeyCode::Down | KeyCode::Char('l') | KeyCode::Char('j') => {
                    picker.choice = picker.choice.next();
                    self.picker = Some(picker);
                    None
                }
                KeyCode::Enter => {
                    self.picker = None;
                    self.change_status(picker.id, picker.choice)
                }
                KeyCode::Char(c @ '1'..='4') => {
                    self.picker = None;
                    let status = digit_status(c)?;
                    self.change_status(picker.id, status)
                }
                KeyCode::Esc => {
                    self.picker = None;
                    None
                }
                _ => None,
            };
        }

        match key.code {
            KeyCode::Char('q') => {
                self.should_quit = true;
                None
            }
            KeyCode::Tab | KeyCode::BackTab => {
                self.focus = match self.focus {
                    Pane::Stocks => Pane::Transactions,
                    Pane::Transactions => Pane::Stocks,
                };
                None
            }
            KeyCode::Up | KeyCode::Char('k') => {
                self.move_cursor(-1);
                None
            }
            KeyCode::Down | KeyCode::Char('j') => {
                self.move_cursor(1);
                None
            }
            KeyCode::Char('r') => Some(Command::Refresh),
            KeyCode::Char('b') if self.focus == Pane::Stocks => {
                self.open_order(TransactionType::Buy);
                None
            }
            KeyCode::Char('s') if self.focus == Pane::Stocks => {
                self.open_order(TransactionType::Sell);
                None
            }
            KeyCode::Enter if self.focus == Pane::Transactions => {
                if let Some(tx) = self.selected_transaction() {
                    let (id, status) = (tx.transaction_id, tx.status);
                    if !self.is_updating(id) {
                        self.picker = Some(StatusPicker { id, choice: status });
                    }
                }
                None
            }
            KeyCode::Char(c @ '1'..='4') if self.focus == Pane::Transactions => {
                let id = self.selected_transaction()?.transaction_id;
                let status = digit_status(c)?;
                self.change_status(id, status)
            }
            _ => None,
        }
    }

    pub fn selected_stock(&self) -> Option<&Stock> {
        self.stock_rows().get(self.stock_table.selected()?)
    }

    pub fn selected_transaction(&self) -> Option<&Transaction> {
        self.transaction_rows().get(self.tx_table.selected()?)
    }

    fn open_order(&mut self, kind: TransactionType) {
        if let Some(stock) = self.selected_stock().cloned() {
            self.request_order(stock, kind);
        }
    }

    fn move_cursor(&mut self, delta: isize) {
        let (len, state) = match self.focus {
            Pane::Stocks => (self.stock_rows().len(), &mut self.stock_table),
            Pane::Transactions => (self.transaction_rows().len(), &mut self.tx_table),
        };
        if len == 0 {
            state.select(None);
            return;
        }
        let cur = state.selected().unwrap_or(0) as isize;
        let next = (cur + delta).clamp(0, len as isize - 1);
        state.select(Some(next as usize));
    }
}

fn digit_status(c: char) -> Option<TransactionStatus> {
    let code = c.to_digit(10)?;
    TransactionStatus::try_from(u8::try_from(code).ok()?).ok()
}

// cursor selalu valid setelah data berubah
fn clamp(state: &mut TableState, len: usize) {
    match (state.selected(), len) {
        (_, 0) => state.select(None),
        (None, _) => state.select(Some(0)),
        (Some(i), n) if i >= n => state.select(Some(n - 1)),
        _ => {}
    }
}
