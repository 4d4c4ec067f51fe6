// ===============================
// src/format.rs
// ===============================
//
// Formatter kolom tabel:
// - format_price  : 2 desimal ("12.50")
// - format_volume : grouping ribuan gaya en-US ("1,234,567")
// - format_type   : kode wire 1 -> "Buy", selain itu "Sell"
//

use rust_decimal::{Decimal, RoundingStrategy};

use crate::domain::{TransactionStatus, TransactionType};

pub fn format_price(price: Decimal) -> String {
    let mut px = price.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    px.rescale(2);
    px.to_string()
}

pub fn format_volume(volume: i64) -> String {
    let digits = volume.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if volume < 0 {
        out.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

pub fn format_type(code: u8) -> &'static str {
    TransactionType::try_from(code)
        .map(TransactionType::label)
        .unwrap_or("Sell")
}

pub fn format_status(status: TransactionStatus) -> &'static str {
    status.label()
}
