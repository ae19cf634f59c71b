//! Coinbase Advanced Trade wallet (§4.7).
//!
//! Two bugs in the original are deliberately not reproduced: order ids
//! were generated from wall-clock seconds (`generate_order_uuid`), which
//! collides under any order rate above 1/s (§9 Open Question 5) — this
//! uses `uuid::Uuid::new_v4()` instead; and the older `wallet.h` variant
//! read `doc["string"]` instead of `doc["success"]` when checking order
//! creation (§9 Open Question 3) — fixed here to read `success`.

use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};

use crate::errors::WalletError;
use crate::http::RequestBatch;
use crate::instrument::InstrumentPair;
use crate::json::{get_f64_str, get_str};
use crate::signing::{client_order_id, hmac_sha256_hex, now_seconds, rfc3339_in};

use super::{Order, OrderStatus, Side, Wallet};

const REST_BASE_URL: &str = "https://api.coinbase.com";
const GTD_WINDOW_SECS: i64 = 10;

#[derive(Clone, Copy, Eq, PartialEq, Debug)]
enum CancelOutcome {
    Ok,
    UnknownOrder,
    Failed,
}

pub struct CoinbaseWallet {
    product_id: String,
    api_key: String,
    api_secret: String,
    accounts_cache: Mutex<Option<Vec<Value>>>,
}

impl CoinbaseWallet {
    pub fn new(pair: InstrumentPair, api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            product_id: pair.to_coinbase(),
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            accounts_cache: Mutex::new(None),
        }
    }

    /// `timestamp || METHOD || path || body`, matching
    /// `wallet<coinbase_api>::sign_payload`.
    fn sign(&self, timestamp: i64, method: &str, path: &str, body: &str) -> String {
        let plaintext = format!("{timestamp}{method}{path}{body}");
        hmac_sha256_hex(&self.api_secret, &plaintext)
    }

    fn auth_headers(&self, batch: &mut RequestBatch, index: usize, method: &str, path: &str, body: &str) {
        let timestamp = now_seconds();
        let signature = self.sign(timestamp, method, path, body);
        let spec = batch.get_request_mut(index);
        spec.add_header("CB-ACCESS-KEY", self.api_key.clone());
        spec.add_header("CB-ACCESS-SIGN", signature);
        spec.add_header("CB-ACCESS-TIMESTAMP", timestamp.to_string());
    }

    async fn create_limit_order(&self, side: Side, price: f64, quantity: f64) -> Result<Order, WalletError> {
        let path = "/api/v3/brokerage/orders";
        let end_time = rfc3339_in(GTD_WINDOW_SECS);
        let client_order_id = client_order_id();

        let payload = json!({
            "client_order_id": client_order_id,
            "product_id": self.product_id,
            "side": if side == Side::Buy { "BUY" } else { "SELL" },
            "order_configuration": {
                "limit_limit_gtd": {
                    "base_size": quantity.to_string(),
                    "limit_price": price.to_string(),
                    "end_time": end_time,
                    "post_only": false,
                }
            }
        });
        let body = payload.to_string();

        let mut batch = RequestBatch::new();
        batch
            .add_request(format!("{REST_BASE_URL}{path}"), Method::POST)
            .set_body(body.clone())
            .add_header("Content-Type", "application/json");
        self.auth_headers(&mut batch, 0, "POST", path, &body);

        if batch.fetch_all().await > 0 {
            return Err(WalletError::UnexpectedData(batch.get_error_msg(0).to_string()));
        }

        let doc: Value = serde_json::from_str(batch.get_response(0))?;
        Self::parse_create_limit_order_response(&doc, side, &client_order_id)
    }

    /// Reads `doc["success"]`, not the `doc["string"]` typo the older
    /// `wallet.h` variant shipped (§9 Open Question 3).
    fn parse_create_limit_order_response(doc: &Value, side: Side, client_order_id: &str) -> Result<Order, WalletError> {
        let success = doc.get("success").and_then(Value::as_bool).unwrap_or(false);
        if !success {
            let reason = get_str(doc, &["error_response", "message"]).unwrap_or("order rejected");
            return Err(WalletError::Business(reason.to_string()));
        }

        let order_id = get_str(doc, &["success_response", "order_id"])
            .map(str::to_string)
            .unwrap_or_else(|| client_order_id.to_string());

        Ok(Order { order_id, side, status: OrderStatus::Open })
    }

    fn classify_cancel_result(result: &Value) -> CancelOutcome {
        if result.get("success").and_then(Value::as_bool).unwrap_or(false) {
            return CancelOutcome::Ok;
        }
        if get_str(result, &["failure_reason"]) == Some("UNKNOWN_CANCEL_ORDER") {
            return CancelOutcome::UnknownOrder;
        }
        CancelOutcome::Failed
    }

    async fn accounts(&self, refetch: bool) -> Result<Vec<Value>, WalletError> {
        if !refetch {
            if let Some(cached) = self.accounts_cache.lock().expect("accounts cache poisoned").clone() {
                return Ok(cached);
            }
        }

        let path = "/api/v3/brokerage/accounts";
        let mut batch = RequestBatch::new();
        batch.add_request(format!("{REST_BASE_URL}{path}"), Method::GET);
        self.auth_headers(&mut batch, 0, "GET", path, "");

        if batch.fetch_all().await > 0 {
            return Err(WalletError::UnexpectedData(batch.get_error_msg(0).to_string()));
        }

        let doc: Value = serde_json::from_str(batch.get_response(0))?;
        let accounts = doc
            .get("accounts")
            .and_then(Value::as_array)
            .cloned()
            .ok_or_else(|| WalletError::UnexpectedData("accounts response missing accounts array".into()))?;

        *self.accounts_cache.lock().expect("accounts cache poisoned") = Some(accounts.clone());
        Ok(accounts)
    }

    pub async fn get_fiat_account_balance(&self, currency: &str, refetch: bool) -> Result<f64, WalletError> {
        let accounts = self.accounts(refetch).await?;
        accounts
            .iter()
            .find(|a| get_str(a, &["currency"]) == Some(currency))
            .and_then(|a| get_f64_str(a, &["available_balance", "value"]))
            .ok_or_else(|| WalletError::UnexpectedData(format!("no account for currency {currency}")))
    }
}

#[async_trait]
impl Wallet for CoinbaseWallet {
    async fn create_limit_buy_order(&self, price: f64, quantity: f64) -> Result<Order, WalletError> {
        self.create_limit_order(Side::Buy, price, quantity).await
    }

    async fn create_limit_sell_order(&self, price: f64, quantity: f64) -> Result<Order, WalletError> {
        self.create_limit_order(Side::Sell, price, quantity).await
    }

    async fn get_order(&self, order_id: &str) -> Result<Order, WalletError> {
        let path = format!("/api/v3/brokerage/orders/historical/{order_id}");
        let mut batch = RequestBatch::new();
        batch.add_request(format!("{REST_BASE_URL}{path}"), Method::GET);
        self.auth_headers(&mut batch, 0, "GET", &path, "");

        if batch.fetch_all().await > 0 {
            return Err(WalletError::UnexpectedData(batch.get_error_msg(0).to_string()));
        }

        let doc: Value = serde_json::from_str(batch.get_response(0))?;
        let side = match get_str(&doc, &["order", "side"]) {
            Some("SELL") => Side::Sell,
            _ => Side::Buy,
        };
        let status = match get_str(&doc, &["order", "status"]) {
            Some("FILLED") => OrderStatus::Filled,
            Some("OPEN") | Some("PENDING") => OrderStatus::Open,
            Some("CANCELLED") | Some("EXPIRED") => OrderStatus::Cancelled,
            Some("FAILED") => OrderStatus::Failed,
            _ => OrderStatus::Unknown,
        };

        Ok(Order { order_id: order_id.to_string(), side, status })
    }

    /// State machine (§4.7, §8 S5): `OK` on success, retry up to
    /// `attempts` on `UNKNOWN_CANCEL_ORDER`, no retry on any other
    /// failure reason.
    async fn cancel_limit_order(&self, order_id: &str, attempts: u32) -> Result<bool, WalletError> {
        let path = "/api/v3/brokerage/orders/batch_cancel";

        for attempt in 0..attempts {
            let body = json!({ "order_ids": [order_id] }).to_string();

            let mut batch = RequestBatch::new();
            batch
                .add_request(format!("{REST_BASE_URL}{path}"), Method::POST)
                .set_body(body.clone())
                .add_header("Content-Type", "application/json");
            self.auth_headers(&mut batch, 0, "POST", path, &body);

            if batch.fetch_all().await > 0 {
                tracing::warn!("WARN cancel attempt {} transport error for {order_id}: {}", attempt + 1, batch.get_error_msg(0));
                continue;
            }

            let doc: Value = serde_json::from_str(batch.get_response(0))?;
            let result = doc
                .get("results")
                .and_then(Value::as_array)
                .and_then(|r| r.first())
                .cloned()
                .unwrap_or(Value::Null);

            match Self::classify_cancel_result(&result) {
                CancelOutcome::Ok => return Ok(true),
                CancelOutcome::UnknownOrder => {
                    tracing::warn!("WARN cancel attempt {} UNKNOWN_CANCEL_ORDER for {order_id}, retrying", attempt + 1);
                    continue;
                }
                CancelOutcome::Failed => {
                    let reason = get_str(&result, &["failure_reason"]).unwrap_or("unknown failure").to_string();
                    return Err(WalletError::Business(reason));
                }
            }
        }

        Ok(false)
    }

    async fn get_asset_account_balance(&self, asset: &str) -> Result<f64, WalletError> {
        self.get_fiat_account_balance(asset, false).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s6_parse_uses_success_field_not_string_typo() {
        let doc = json!({"success": true, "success_response": {"order_id": "abc-123"}});
        let order = CoinbaseWallet::parse_create_limit_order_response(&doc, Side::Buy, "fallback").unwrap();
        assert_eq!(order.order_id, "abc-123");
    }

    #[test]
    fn failed_order_surfaces_error_message() {
        let doc = json!({"success": false, "error_response": {"message": "insufficient_fund"}});
        let err = CoinbaseWallet::parse_create_limit_order_response(&doc, Side::Buy, "fallback").unwrap_err();
        assert!(matches!(err, WalletError::Business(msg) if msg == "insufficient_fund"));
    }

    #[test]
    fn s5_classifies_cancel_outcomes() {
        assert_eq!(CoinbaseWallet::classify_cancel_result(&json!({"success": true})), CancelOutcome::Ok);
        assert_eq!(
            CoinbaseWallet::classify_cancel_result(&json!({"success": false, "failure_reason": "UNKNOWN_CANCEL_ORDER"})),
            CancelOutcome::UnknownOrder
        );
        assert_eq!(
            CoinbaseWallet::classify_cancel_result(&json!({"success": false, "failure_reason": "ORDER_IMMEDIATELY_FILLED"})),
            CancelOutcome::Failed
        );
    }

    /// Mock exchange returns `UNKNOWN_CANCEL_ORDER` twice then succeeds:
    /// `attempts=3` must reach the success response, `attempts=2` must not.
    #[test]
    fn s5_attempts_bound_decides_cancel_success() {
        let responses = [
            json!({"success": false, "failure_reason": "UNKNOWN_CANCEL_ORDER"}),
            json!({"success": false, "failure_reason": "UNKNOWN_CANCEL_ORDER"}),
            json!({"success": true}),
        ];

        let run = |attempts: u32| -> bool {
            for result in responses.iter().take(attempts as usize) {
                match CoinbaseWallet::classify_cancel_result(result) {
                    CancelOutcome::Ok => return true,
                    CancelOutcome::UnknownOrder => continue,
                    CancelOutcome::Failed => return false,
                }
            }
            false
        };

        assert!(run(3));
        assert!(!run(2));
    }
}
