// ===============================
// src/domain.rs
// ===============================
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Wire code tidak dikenal untuk enum numerik
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} code {code}")]
pub struct UnknownCode {
    pub kind: &'static str,
    pub code: u8,
}

/// Buy=1 / Sell=2 on the wire. Do not renumber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum TransactionType {
    Buy = 1,
    Sell = 2,
}

impl TransactionType {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn label(self) -> &'static str {
        match self {
            TransactionType::Buy => "Buy",
            TransactionType::Sell => "Sell",
        }
    }

    /// Verb used in the confirmation prompt ("buy 100 shares of ...").
    pub fn verb(self) -> &'static str {
        match self {
            TransactionType::Buy => "buy",
            TransactionType::Sell => "sell",
        }
    }
}

impl TryFrom<u8> for TransactionType {
    type Error = UnknownCode;
    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(TransactionType::Buy),
            2 => Ok(TransactionType::Sell),
            _ => Err(UnknownCode { kind: "transaction type", code }),
        }
    }
}

impl From<TransactionType> for u8 {
    fn from(t: TransactionType) -> u8 {
        t.code()
    }
}

/// Pending=1 / Completed=2 / Cancelled=3 / Failed=4 on the wire.
/// Status is advisory on the client side; the service is authoritative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum TransactionStatus {
    Pending = 1,
    Completed = 2,
    Cancelled = 3,
    Failed = 4,
}

impl TransactionStatus {
    /// Urutan opsi di status picker
    pub const ALL: [TransactionStatus; 4] = [
        TransactionStatus::Pending,
        TransactionStatus::Completed,
        TransactionStatus::Cancelled,
        TransactionStatus::Failed,
    ];

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn label(self) -> &'static str {
        match self {
            TransactionStatus::Pending => "Pending",
            TransactionStatus::Completed => "Completed",
            TransactionStatus::Cancelled => "Cancelled",
            TransactionStatus::Failed => "Failed",
        }
    }

    /// Next option in picker order, wrapping around.
    pub fn next(self) -> Self {
        match self {
            TransactionStatus::Pending => TransactionStatus::Completed,
            TransactionStatus::Completed => TransactionStatus::Cancelled,
            TransactionStatus::Cancelled => TransactionStatus::Failed,
            TransactionStatus::Failed => TransactionStatus::Pending,
        }
    }

    pub fn prev(self) -> Self {
        match self {
            TransactionStatus::Pending => TransactionStatus::Failed,
            TransactionStatus::Completed => TransactionStatus::Pending,
            TransactionStatus::Cancelled => TransactionStatus::Completed,
            TransactionStatus::Failed => TransactionStatus::Cancelled,
        }
    }
}

impl TryFrom<u8> for TransactionStatus {
    type Error = UnknownCode;
    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(TransactionStatus::Pending),
            2 => Ok(TransactionStatus::Completed),
            3 => Ok(TransactionStatus::Cancelled),
            4 => Ok(TransactionStatus::Failed),
            _ => Err(UnknownCode { kind: "transaction status", code }),
        }
    }
}

impl From<TransactionStatus> for u8 {
    fn from(s: TransactionStatus) -> u8 {
        s.code()
    }
}

/// Quote snapshot, owned by the service and re-fetched wholesale each poll.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Stock {
    #[serde(rename = "StockID")]
    pub stock_id: i64,
    pub symbol: String,
    pub bid_price: Decimal,
    pub bid_volume: i64,
    pub ask_price: Decimal,
    pub ask_volume: i64,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Transaction {
    #[serde(rename = "TransactionID")]
    pub transaction_id: i64,
    pub symbol: String,
    #[serde(rename = "Type")]
    pub kind: TransactionType,
    pub status: TransactionStatus,
    pub quantity: i64,
    pub price: Decimal,
    pub total_amount: Decimal,
    pub order_time: DateTime<Utc>,
    #[serde(default)]
    pub execution_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: Option<String>,
    // snapshot saat record dibuat, bukan quote live
    #[serde(default)]
    pub stock: Stock,
}

/// POST /transactions body. Identity, status, price and timestamps are
/// assigned by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRequest {
    pub symbol: String,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub quantity: i64,
    pub notes: String,
}

/// PUT /transactions/{id}/status body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: TransactionStatus,
}

// ---- Recorder events (JSONL) ----
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Record {
    Poll {
        ts: DateTime<Utc>,
        resource: String,
        seq: u64,
        rows: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Order {
        ts: DateTime<Utc>,
        request: TransactionRequest,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        transaction_id: Option<i64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    StatusChange {
        ts: DateTime<Utc>,
        transaction_id: i64,
        status: TransactionStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}
