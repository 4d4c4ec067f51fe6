// ===============================
// src/api.rs
// ===============================
//
// REST client untuk trading service:
//   GET  /stocks                   -> [Stock]
//   GET  /transactions             -> [Transaction]
//   POST /transactions             -> Transaction
//   PUT  /transactions/{id}/status -> Transaction (atau body kosong)
//
// Tidak ada retry di sini; retry hanya untuk read, ada di query.rs.
//

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::domain::{StatusUpdateRequest, Stock, Transaction, TransactionRequest, TransactionStatus};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(String),
    #[error("rejected request: {0}")]
    Validation(String),
    #[error("transaction {0} not found")]
    NotFound(i64),
}

#[async_trait]
pub trait TradingApi: Send + Sync {
    async fn list_stocks(&self) -> Result<Vec<Stock>, ApiError>;

    async fn list_transactions(&self) -> Result<Vec<Transaction>, ApiError>;

    async fn create_transaction(&self, req: &TransactionRequest) -> Result<Transaction, ApiError>;

    /// `Ok(None)` when the service acknowledges without echoing the record.
    async fn update_transaction_status(
        &self,
        id: i64,
        status: TransactionStatus,
    ) -> Result<Option<Transaction>, ApiError>;
}

pub struct HttpTradingApi {
    http: reqwest::Client,
    base: String,
}

impl HttpTradingApi {
    pub fn new(base: &Url) -> Self {
        Self {
            http: reqwest::Client::new(),
            base: base.as_str().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }
}

fn transport(e: reqwest::Error) -> ApiError {
    ApiError::Network(e.to_string())
}

/// Service replies `{"error": "..."}` on failure; fall back to raw body or reason.
async fn error_message(rsp: reqwest::Response) -> (StatusCode, String) {
    let code = rsp.status();
    let body = rsp.text().await.unwrap_or_default();
    let msg = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
        .or_else(|| Some(body.trim().to_string()).filter(|s| !s.is_empty()))
        .unwrap_or_else(|| code.canonical_reason().unwrap_or("unknown").to_string());
    (code, msg)
}

async fn decode<T: DeserializeOwned>(rsp: reqwest::Response) -> Result<T, ApiError> {
    let bytes = rsp.bytes().await.map_err(transport)?;
    serde_json::from_slice(&bytes).map_err(|e| ApiError::Network(format!("bad response body: {e}")))
}

#[async_trait]
impl TradingApi for HttpTradingApi {
    async fn list_stocks(&self) -> Result<Vec<Stock>, ApiError> {
        let rsp = self.http.get(self.url("/stocks")).send().await.map_err(transport)?;
        if !rsp.status().is_success() {
            let (code, msg) = error_message(rsp).await;
            return Err(ApiError::Network(format!("HTTP {}: {msg}", code.as_u16())));
        }
        decode(rsp).await
    }

    async fn list_transactions(&self) -> Result<Vec<Transaction>, ApiError> {
        let rsp = self.http.get(self.url("/transactions")).send().await.map_err(transport)?;
        if !rsp.status().is_success() {
            let (code, msg) = error_message(rsp).await;
            return Err(ApiError::Network(format!("HTTP {}: {msg}", code.as_u16())));
        }
        decode(rsp).await
    }

    async fn create_transaction(&self, req: &TransactionRequest) -> Result<Transaction, ApiError> {
        if req.symbol.trim().is_empty() {
            return Err(ApiError::Validation("symbol is required".into()));
        }
        if req.quantity <= 0 {
            return Err(ApiError::Validation(format!(
                "quantity must be positive, got {}",
                req.quantity
            )));
        }

        let rsp = self
            .http
            .post(self.url("/transactions"))
            .json(req)
            .send()
            .await
            .map_err(transport)?;
        match rsp.status() {
            s if s.is_success() => decode(rsp).await,
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                let (_, msg) = error_message(rsp).await;
                Err(ApiError::Validation(msg))
            }
            _ => {
                let (code, msg) = error_message(rsp).await;
                Err(ApiError::Network(format!("HTTP {}: {msg}", code.as_u16())))
            }
        }
    }

    async fn update_transaction_status(
        &self,
        id: i64,
        status: TransactionStatus,
    ) -> Result<Option<Transaction>, ApiError> {
        let rsp = self
            .http
            .put(self.url(&format!("/transactions/{id}/status")))
            .json(&StatusUpdateRequest { status })
            .send()
            .await
            .map_err(transport)?;
        match rsp.status() {
            s if s.is_success() => {
                let bytes = rsp.bytes().await.map_err(transport)?;
                match serde_json::from_slice::<Transaction>(&bytes) {
                    Ok(tx) => Ok(Some(tx)),
                    Err(e) => {
                        // contoh: body "OK" tanpa record
                        debug!(id, ?e, "status update acknowledged without transaction body");
                        Ok(None)
                    }
                }
            }
            StatusCode::NOT_FOUND => Err(ApiError::NotFound(id)),
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                let (_, msg) = error_message(rsp).await;
                Err(ApiError::Validation(msg))
            }
            _ => {
                let (code, msg) = error_message(rsp).await;
                Err(ApiError::Network(format!("HTTP {}: {msg}", code.as_u16())))
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::TransactionType;
    use hyper::service::{make_service_fn, service_fn};
    use hyper::{Body, Request, Response, Server};
    use std::convert::Infallible;
    use std::net::SocketAddr;
    use std::sync::{Arc, Mutex};

    pub(crate) type Seen = Arc<Mutex<Vec<(String, String, String)>>>;

    /// Tiny in-process REST backend; `respond(method, path, body) -> (status, body)`.
    pub(crate) async fn fake_backend<F>(respond: F) -> (Url, Seen)
    where
        F: Fn(&str, &str, &str) -> (u16, String) + Send + Sync + 'static,
    {
        let seen: Seen = Arc::default();
        let respond = Arc::new(respond);
        let seen_svc = seen.clone();
        let make = make_service_fn(move |_conn| {
            let seen = seen_svc.clone();
            let respond = respond.clone();
            async move {
                Ok::<_, Infallible>(service_fn(move |req: Request<Body>| {
                    let seen = seen.clone();
                    let respond = respond.clone();
                    async move {
                        let method = req.method().to_string();
                        let path = req.uri().path().to_string();
                        let raw = hyper::body::to_bytes(req.into_body()).await.unwrap_or_default();
                        let body = String::from_utf8_lossy(&raw).to_string();
                        let (code, out) = respond(&method, &path, &body);
                        seen.lock().unwrap().push((method, path, body));
                        Ok::<_, Infallible>(
                            Response::builder()
                                .status(code)
                                .header("content-type", "application/json")
                                .body(Body::from(out))
                                .unwrap(),
                        )
                    }
                }))
            }
        });
        let addr: SocketAddr = ([127, 0, 0, 1], 0).into();
        let server = Server::bind(&addr).serve(make);
        let local = server.local_addr();
        tokio::spawn(server);
        (Url::parse(&format!("http://{local}")).unwrap(), seen)
    }

    pub(crate) fn stock_json(id: i64, symbol: &str) -> String {
        format!(
            r#"{{"StockID":{id},"Symbol":"{symbol}","BidPrice":10.1,"BidVolume":500,"AskPrice":10.3,"AskVolume":400,"LastUpdated":"2024-05-01T02:29:59Z"}}"#
        )
    }

    pub(crate) fn tx_json(id: i64, symbol: &str, status: u8) -> String {
        format!(
            r#"{{"TransactionID":{id},"Symbol":"{symbol}","Type":1,"Status":{status},"Quantity":100,"Price":10.3,"TotalAmount":1030,"OrderTime":"2024-05-01T02:30:00Z","ExecutionTime":null,"Notes":"Automated transaction","Stock":{}}}"#,
            stock_json(1, symbol)
        )
    }

    fn order(quantity: i64) -> TransactionRequest {
        TransactionRequest {
            symbol: "ACME".into(),
            kind: TransactionType::Buy,
            quantity,
            notes: "Automated transaction".into(),
        }
    }

    #[tokio::test]
    async fn lists_stocks_and_transactions() {
        let (base, seen) = fake_backend(|_, path, _| match path {
            "/stocks" => (200, format!("[{},{}]", stock_json(1, "ACME"), stock_json(2, "INIT"))),
            "/transactions" => (200, format!("[{}]", tx_json(9, "ACME", 1))),
            _ => (404, String::new()),
        })
        .await;
        let api = HttpTradingApi::new(&base);

        let stocks = api.list_stocks().await.unwrap();
        assert_eq!(stocks.len(), 2);
        assert_eq!(stocks[1].symbol, "INIT");

        let txs = api.list_transactions().await.unwrap();
        assert_eq!(txs[0].transaction_id, 9);

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].0, "GET");
        assert_eq!(seen[0].1, "/stocks");
        assert_eq!(seen[1].1, "/transactions");
    }

    #[tokio::test]
    async fn create_posts_wire_payload_and_returns_pending() {
        let next_id = std::sync::atomic::AtomicI64::new(42);
        let (base, seen) = fake_backend(move |method, path, _| match (method, path) {
            ("POST", "/transactions") => {
                let id = next_id.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                (201, tx_json(id, "ACME", 1))
            }
            _ => (404, String::new()),
        })
        .await;
        let api = HttpTradingApi::new(&base);

        let tx = api.create_transaction(&order(100)).await.unwrap();
        assert_eq!(tx.transaction_id, 42);
        assert_eq!(tx.status, TransactionStatus::Pending);

        // id dari service, tiap create dapat id baru
        let again = api.create_transaction(&order(100)).await.unwrap();
        assert_eq!(again.status, TransactionStatus::Pending);
        assert_ne!(again.transaction_id, tx.transaction_id);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        let body: serde_json::Value = serde_json::from_str(&seen[0].2).unwrap();
        assert_eq!(
            body,
            serde_json::json!({"symbol": "ACME", "type": 1, "quantity": 100, "notes": "Automated transaction"})
        );
        assert_eq!(seen[1].2, seen[0].2);
    }

    #[tokio::test]
    async fn non_positive_quantity_never_reaches_the_wire() {
        let (base, seen) = fake_backend(|_, _, _| (201, tx_json(1, "ACME", 1))).await;
        let api = HttpTradingApi::new(&base);

        let err = api.create_transaction(&order(0)).await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn create_maps_bad_request_to_validation() {
        let (base, _) =
            fake_backend(|_, _, _| (400, r#"{"error":"Invalid request body"}"#.to_string())).await;
        let api = HttpTradingApi::new(&base);
        let err = api.create_transaction(&order(100)).await.unwrap_err();
        assert_eq!(err, ApiError::Validation("Invalid request body".into()));
    }

    #[tokio::test]
    async fn update_status_puts_code_and_tolerates_empty_ack() {
        let (base, seen) = fake_backend(|method, path, _| match (method, path) {
            ("PUT", "/transactions/7/status") => (200, "OK".to_string()),
            ("PUT", "/transactions/8/status") => (200, tx_json(8, "ACME", 2)),
            _ => (404, String::new()),
        })
        .await;
        let api = HttpTradingApi::new(&base);

        let ack = api.update_transaction_status(7, TransactionStatus::Completed).await.unwrap();
        assert!(ack.is_none());
        let echoed = api.update_transaction_status(8, TransactionStatus::Completed).await.unwrap();
        assert_eq!(echoed.map(|t| t.status), Some(TransactionStatus::Completed));

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].2, r#"{"status":2}"#);
    }

    #[tokio::test]
    async fn update_unknown_id_is_not_found() {
        let (base, _) = fake_backend(|_, _, _| (404, String::new())).await;
        let api = HttpTradingApi::new(&base);
        let err = api.update_transaction_status(77, TransactionStatus::Failed).await.unwrap_err();
        assert_eq!(err, ApiError::NotFound(77));
    }

    #[tokio::test]
    async fn server_errors_carry_service_message() {
        let (base, _) =
            fake_backend(|_, _, _| (500, r#"{"error":"Failed to fetch stocks"}"#.to_string())).await;
        let api = HttpTradingApi::new(&base);
        let err = api.list_stocks().await.unwrap_err();
        assert_eq!(err, ApiError::Network("HTTP 500: Failed to fetch stocks".into()));
        assert!(err.to_string().contains("Failed to fetch stocks"));
    }

    #[tokio::test]
    async fn refused_connection_is_network_error() {
        let port = {
            let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap().port()
        };
        let base = Url::parse(&format!("http://127.0.0.1:{port}")).unwrap();
        let api = HttpTradingApi::new(&base);
        assert!(matches!(api.list_transactions().await, Err(ApiError::Network(_))));
    }
}
