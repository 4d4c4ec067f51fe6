// ===============================
// src/ui.rs
// ===============================
//
// Render satu frame dari state App:
// - Loading  : spinner full-screen (salah satu resource belum settle)
// - Error    : pesan error full-screen, tabel tidak dirender
// - Dashboard: tabel Stock Market + Recent Transactions (scroll masing-masing),
//              modal konfirmasi, status bar (alert / bantuan tombol)
//

use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, Wrap},
    Frame,
};

use crate::app::{App, Pane, Screen, StatusPicker};
use crate::domain::{Stock, Transaction};
use crate::format::{format_price, format_status, format_type, format_volume};

const SPINNER: [&str; 4] = ["|", "/", "-", "\\"];

const STOCK_HEADERS: [&str; 6] = ["Symbol", "Bid Price", "Bid Volume", "Ask Price", "Ask Volume", "Actions"];
const TX_HEADERS: [&str; 6] = ["Symbol", "Type", "Status", "Quantity", "Price", "Total Amount"];

pub fn draw(f: &mut Frame, app: &mut App) {
    let area = f.size();
    match app.screen() {
        Screen::Loading => draw_loading(f, area, app.spinner),
        Screen::Error(msg) => draw_error(f, area, &msg),
        Screen::Dashboard => draw_dashboard(f, area, app),
    }
}

/// Symbol, bid price, bid volume, ask price, ask volume.
pub fn stock_cells(s: &Stock) -> [String; 5] {
    [
        s.symbol.clone(),
        format_price(s.bid_price),
        format_volume(s.bid_volume),
        format_price(s.ask_price),
        format_volume(s.ask_volume),
    ]
}

/// Symbol, type, status, quantity, price, total amount.
pub fn transaction_cells(t: &Transaction) -> [String; 6] {
    [
        t.symbol.clone(),
        format_type(t.kind.code()).to_string(),
        format_status(t.status).to_string(),
        format_volume(t.quantity),
        format_price(t.price),
        format_price(t.total_amount),
    ]
}

fn draw_loading(f: &mut Frame, area: Rect, spinner: usize) {
    let frame = SPINNER[spinner % SPINNER.len()];
    let p = Paragraph::new(format!("{frame} Loading..."))
        .style(Style::default().fg(Color::Blue))
        .alignment(Alignment::Center);
    f.render_widget(p, middle_line(area));
}

fn draw_error(f: &mut Frame, area: Rect, msg: &str) {
    let p = Paragraph::new(msg.to_string())
        .style(Style::default().fg(Color::Red))
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true });
    f.render_widget(p, middle_line(area));
}

fn draw_dashboard(f: &mut Frame, area: Rect, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage(50),
            Constraint::Min(4),
            Constraint::Length(1),
        ])
        .split(area);

    draw_stocks(f, chunks[0], app);
    draw_transactions(f, chunks[1], app);
    draw_status_bar(f, chunks[2], app);

    if let Some(order) = &app.modal {
        let prompt = order.prompt();
        let rect = centered(area, 60, 7);
        let body = vec![
            Line::from(prompt),
            Line::from(""),
            Line::from(vec![
                Span::styled("[y] Confirm", Style::default().fg(Color::Blue).add_modifier(Modifier::BOLD)),
                Span::raw("   "),
                Span::raw("[n] Cancel"),
            ]),
        ];
        let p = Paragraph::new(body)
            .wrap(Wrap { trim: true })
            .block(Block::default().borders(Borders::ALL).title("Confirm Transaction"));
        f.render_widget(Clear, rect);
        f.render_widget(p, rect);
    }
}

fn pane_block(title: &str, focused: bool) -> Block<'_> {
    let style = if focused {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default()
    };
    Block::default().borders(Borders::ALL).border_style(style).title(title)
}

fn header(cols: &[&'static str]) -> Row<'static> {
    Row::new(cols.iter().map(|c| Cell::from(*c)))
        .style(Style::default().fg(Color::Gray).add_modifier(Modifier::BOLD))
}

fn draw_stocks(f: &mut Frame, area: Rect, app: &mut App) {
    let rows: Vec<Row> = app
        .stock_rows()
        .iter()
        .map(|s| {
            let [sym, bid, bid_vol, ask, ask_vol] = stock_cells(s);
            Row::new(vec![
                Cell::from(sym).style(Style::default().fg(Color::Blue)),
                Cell::from(bid),
                Cell::from(bid_vol).style(Style::default().fg(Color::DarkGray)),
                Cell::from(ask),
                Cell::from(ask_vol).style(Style::default().fg(Color::DarkGray)),
                Cell::from(Line::from(vec![
                    Span::styled("[b]uy", Style::default().fg(Color::Green)),
                    Span::raw(" "),
                    Span::styled("[s]ell", Style::default().fg(Color::Red)),
                ])),
            ])
        })
        .collect();

    let widths = [
        Constraint::Length(10),
        Constraint::Length(12),
        Constraint::Length(12),
        Constraint::Length(12),
        Constraint::Length(12),
        Constraint::Min(13),
    ];
    let table = Table::new(rows, widths)
        .header(header(&STOCK_HEADERS))
        .block(pane_block("Stock Market", app.focus == Pane::Stocks))
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED))
        .highlight_symbol("> ");
    f.render_stateful_widget(table, area, &mut app.stock_table);
}

fn status_cell(t: &Transaction, updating: bool, picker: Option<StatusPicker>) -> Cell<'static> {
    match picker {
        Some(p) if p.id == t.transaction_id => Cell::from(format!("< {} >", p.choice.label()))
            .style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)),
        _ if updating => Cell::from(format!("{} …", format_status(t.status)))
            .style(Style::default().fg(Color::DarkGray).add_modifier(Modifier::DIM)),
        _ => Cell::from(format!("{} v", format_status(t.status))),
    }
}

fn draw_transactions(f: &mut Frame, area: Rect, app: &mut App) {
    let picker = app.picker;
    let rows: Vec<Row> = app
        .transaction_rows()
        .iter()
        .map(|t| {
            let [sym, kind, _, qty, px, total] = transaction_cells(t);
            Row::new(vec![
                Cell::from(sym).style(Style::default().fg(Color::Blue)),
                Cell::from(kind),
                status_cell(t, app.is_updating(t.transaction_id), picker),
                Cell::from(qty),
                Cell::from(px),
                Cell::from(total),
            ])
        })
        .collect();

    let widths = [
        Constraint::Length(10),
        Constraint::Length(6),
        Constraint::Length(15),
        Constraint::Length(10),
        Constraint::Length(12),
        Constraint::Min(14),
    ];
    let table = Table::new(rows, widths)
        .header(header(&TX_HEADERS))
        .block(pane_block("Recent Transactions", app.focus == Pane::Transactions))
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED))
        .highlight_symbol("> ");
    f.render_stateful_widget(table, area, &mut app.tx_table);
}

fn draw_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let line = match &app.alert {
        Some(alert) => Line::from(Span::styled(
            alert.text.clone(),
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        )),
        None => {
            let keys = match (app.picker.is_some(), app.focus) {
                (true, _) => "<-/-> choose  Enter apply  1-4 pick  Esc close",
                (false, Pane::Stocks) => "Tab switch  up/down move  b buy  s sell  r refresh  q quit",
                (false, Pane::Transactions) => {
                    "Tab switch  up/down move  Enter status  1-4 set status  r refresh  q quit"
                }
            };
            let mut spans = vec![Span::styled(keys, Style::default().fg(Color::DarkGray))];
            let pending = app.updating_count();
            if pending > 0 {
                spans.push(Span::raw("  "));
                spans.push(Span::styled(
                    format!("{pending} status edit(s) waiting for refresh"),
                    Style::default().fg(Color::Yellow),
                ));
            }
            Line::from(spans)
        }
    };
    f.render_widget(Paragraph::new(line), area);
}

fn middle_line(area: Rect) -> Rect {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage(45),
            Constraint::Length(3),
            Constraint::Min(0),
        ])
        .split(area);
    rows[1]
}

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let w = width.min(area.width);
    let h = height.min(area.height);
    Rect {
        x: area.x + (area.width - w) / 2,
        y: area.y + (area.height - h) / 2,
        width: w,
        height: h,
    }
}
