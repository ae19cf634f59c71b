//! Binance.US wallet (§4.7): fallible construction fetching `exchangeInfo`
//! symbol filters, HMAC-signed order lifecycle.
//!
//! Fixes two bugs present in `wallet<binance_api>`: order rounding used a
//! hardcoded 4 decimal places instead of the symbol's actual `stepSize`/
//! `tickSize` (§9 Open Question 6), and `cancel_limit_order` omitted the
//! required `symbol` query parameter (§9 Open Question 7).

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;

use crate::errors::WalletError;
use crate::http::RequestBatch;
use crate::instrument::InstrumentPair;
use crate::json::{get_f64_str, get_str};
use crate::signing::{hmac_sha256_hex, now_millis};

use super::{Order, OrderStatus, Side, Wallet};

const REST_BASE_URL: &str = "https://api.binance.us";

/// `LOT_SIZE`/`PRICE_FILTER`/`MIN_NOTIONAL` pulled from `/api/v3/exchangeInfo`.
/// Construction fails if any is missing — rounding to the wrong precision
/// silently produces a rejected (or worse, accepted-but-wrong) order.
#[derive(Debug, Clone)]
struct SymbolFilters {
    step_size: f64,
    tick_size: f64,
    min_notional: f64,
}

pub struct BinanceWallet {
    pair: InstrumentPair,
    symbol: String,
    api_key: String,
    api_secret: String,
    filters: SymbolFilters,
}

impl BinanceWallet {
    /// Fetches `exchangeInfo` for `pair`'s symbol and extracts its filters.
    /// Returns `Err` rather than constructing a wallet that would round
    /// orders incorrectly.
    pub async fn connect(pair: InstrumentPair, api_key: impl Into<String>, api_secret: impl Into<String>) -> Result<Self, WalletError> {
        let symbol = pair.to_binance();

        let mut batch = RequestBatch::new();
        batch
            .add_request(format!("{REST_BASE_URL}/api/v3/exchangeInfo"), Method::GET)
            .add_url_param("symbol", symbol.clone());

        if batch.fetch_all().await > 0 {
            return Err(WalletError::UnexpectedData(batch.get_error_msg(0).to_string()));
        }

        let doc: Value = serde_json::from_str(batch.get_response(0))?;
        let filters = Self::extract_filters(&doc, &symbol)?;

        Ok(Self {
            pair,
            symbol,
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            filters,
        })
    }

    fn extract_filters(doc: &Value, symbol: &str) -> Result<SymbolFilters, WalletError> {
        let symbol_entry = doc
            .get("symbols")
            .and_then(Value::as_array)
            .and_then(|symbols| symbols.iter().find(|s| s.get("symbol").and_then(Value::as_str) == Some(symbol)))
            .ok_or_else(|| WalletError::FilterMissing(format!("no exchangeInfo entry for {symbol}")))?;

        let filter_list = symbol_entry
            .get("filters")
            .and_then(Value::as_array)
            .ok_or_else(|| WalletError::FilterMissing("filters array missing".into()))?;

        let find = |filter_type: &str| filter_list.iter().find(|f| f.get("filterType").and_then(Value::as_str) == Some(filter_type));

        let lot_size = find("LOT_SIZE").ok_or_else(|| WalletError::FilterMissing("LOT_SIZE".into()))?;
        let price_filter = find("PRICE_FILTER").ok_or_else(|| WalletError::FilterMissing("PRICE_FILTER".into()))?;
        let min_notional = find("MIN_NOTIONAL").ok_or_else(|| WalletError::FilterMissing("MIN_NOTIONAL".into()))?;

        Ok(SymbolFilters {
            step_size: get_f64_str(lot_size, &["stepSize"]).ok_or_else(|| WalletError::FilterMissing("LOT_SIZE.stepSize".into()))?,
            tick_size: get_f64_str(price_filter, &["tickSize"]).ok_or_else(|| WalletError::FilterMissing("PRICE_FILTER.tickSize".into()))?,
            min_notional: get_f64_str(min_notional, &["minNotional"]).ok_or_else(|| WalletError::FilterMissing("MIN_NOTIONAL.minNotional".into()))?,
        })
    }

    /// Rounds `value` down to the nearest multiple of `step`, replacing
    /// the original's hardcoded `round(value * 10000.0) / 10000.0`.
    fn round_to_step(value: f64, step: f64) -> f64 {
        if step <= 0.0 {
            return value;
        }
        (value / step).floor() * step
    }

    fn query_string_for_new_order(&self, side: Side, price: f64, quantity: f64, timestamp: i64) -> String {
        let rounded_price = Self::round_to_step(price, self.filters.tick_size);
        let rounded_qty = Self::round_to_step(quantity, self.filters.step_size);

        format!(
            "symbol={}&side={}&type=LIMIT&timeInForce=GTC&quantity={rounded_qty}&price={rounded_price}&timestamp={timestamp}",
            self.symbol,
            if side == Side::Buy { "BUY" } else { "SELL" },
        )
    }

    fn sign(&self, query_string: &str) -> String {
        hmac_sha256_hex(&self.api_secret, query_string)
    }

    async fn create_limit_order(&self, side: Side, price: f64, quantity: f64) -> Result<Order, WalletError> {
        let notional = price * quantity;
        if notional < self.filters.min_notional {
            return Err(WalletError::Business(format!(
                "order notional {notional} below MIN_NOTIONAL {}",
                self.filters.min_notional
            )));
        }

        let timestamp = now_millis();
        let query_string = self.query_string_for_new_order(side, price, quantity, timestamp);
        let signature = self.sign(&query_string);

        let mut batch = RequestBatch::new();
        batch
            .add_request(format!("{REST_BASE_URL}/api/v3/order"), Method::POST)
            .set_body(format!("{query_string}&signature={signature}"))
            .add_header("X-MBX-APIKEY", self.api_key.clone())
            .add_header("Content-Type", "application/x-www-form-urlencoded");

        if batch.fetch_all().await > 0 {
            return Err(WalletError::UnexpectedData(batch.get_error_msg(0).to_string()));
        }

        let doc: Value = serde_json::from_str(batch.get_response(0))?;
        Self::parse_order(&doc, side)
    }

    fn parse_order(doc: &Value, side: Side) -> Result<Order, WalletError> {
        let order_id = get_str(doc, &["orderId"])
            .map(str::to_string)
            .or_else(|| doc.get("orderId").and_then(Value::as_i64).map(|v| v.to_string()))
            .ok_or_else(|| WalletError::UnexpectedData(format!("response missing orderId: {doc}")))?;

        let status = match get_str(doc, &["status"]) {
            Some("FILLED") => OrderStatus::Filled,
            Some("NEW") | Some("PARTIALLY_FILLED") => OrderStatus::Open,
            Some("CANCELED") | Some("EXPIRED") => OrderStatus::Cancelled,
            Some("REJECTED") => OrderStatus::Failed,
            _ => OrderStatus::Unknown,
        };

        Ok(Order { order_id, side, status })
    }
}

#[async_trait]
impl Wallet for BinanceWallet {
    async fn create_limit_buy_order(&self, price: f64, quantity: f64) -> Result<Order, WalletError> {
        self.create_limit_order(Side::Buy, price, quantity).await
    }

    async fn create_limit_sell_order(&self, price: f64, quantity: f64) -> Result<Order, WalletError> {
        self.create_limit_order(Side::Sell, price, quantity).await
    }

    async fn get_order(&self, order_id: &str) -> Result<Order, WalletError> {
        let timestamp = now_millis();
        let query_string = format!("symbol={}&orderId={order_id}&timestamp={timestamp}", self.symbol);
        let signature = self.sign(&query_string);

        let mut batch = RequestBatch::new();
        batch
            .add_request(format!("{REST_BASE_URL}/api/v3/order"), Method::GET)
            .add_url_param("symbol", self.symbol.clone())
            .add_url_param("orderId", order_id)
            .add_url_param("timestamp", timestamp.to_string())
            .add_url_param("signature", signature)
            .add_header("X-MBX-APIKEY", self.api_key.clone());

        if batch.fetch_all().await > 0 {
            return Err(WalletError::UnexpectedData(batch.get_error_msg(0).to_string()));
        }

        let doc: Value = serde_json::from_str(batch.get_response(0))?;
        let side = match get_str(&doc, &["side"]) {
            Some("SELL") => Side::Sell,
            _ => Side::Buy,
        };
        Self::parse_order(&doc, side)
    }

    /// Retries up to `attempts` times on transport failure — the
    /// original's missing `symbol` query param made every cancel a
    /// guaranteed 400; it is included here.
    async fn cancel_limit_order(&self, order_id: &str, attempts: u32) -> Result<bool, WalletError> {
        for attempt in 0..attempts {
            let timestamp = now_millis();
            let query_string = format!("symbol={}&orderId={order_id}&timestamp={timestamp}", self.symbol);
            let signature = self.sign(&query_string);

            let mut batch = RequestBatch::new();
            batch
                .add_request(format!("{REST_BASE_URL}/api/v3/order"), Method::DELETE)
                .add_url_param("symbol", self.symbol.clone())
                .add_url_param("orderId", order_id)
                .add_url_param("timestamp", timestamp.to_string())
                .add_url_param("signature", signature)
                .add_header("X-MBX-APIKEY", self.api_key.clone());

            if batch.fetch_all().await == 0 {
                return Ok(true);
            }
            tracing::warn!("WARN cancel attempt {} failed for order {order_id}: {}", attempt + 1, batch.get_error_msg(0));
        }
        Ok(false)
    }

    async fn get_asset_account_balance(&self, asset: &str) -> Result<f64, WalletError> {
        let timestamp = now_millis();
        let query_string = format!("timestamp={timestamp}");
        let signature = self.sign(&query_string);

        let mut batch = RequestBatch::new();
        batch
            .add_request(format!("{REST_BASE_URL}/api/v3/account"), Method::GET)
            .add_url_param("timestamp", timestamp.to_string())
            .add_url_param("signature", signature)
            .add_header("X-MBX-APIKEY", self.api_key.clone());

        if batch.fetch_all().await > 0 {
            return Err(WalletError::UnexpectedData(batch.get_error_msg(0).to_string()));
        }

        let doc: Value = serde_json::from_str(batch.get_response(0))?;
        let balances = doc
            .get("balances")
            .and_then(Value::as_array)
            .ok_or_else(|| WalletError::UnexpectedData("account response missing balances".into()))?;

        balances
            .iter()
            .find(|b| get_str(b, &["asset"]) == Some(asset))
            .and_then(|b| get_f64_str(b, &["free"]))
            .ok_or_else(|| WalletError::UnexpectedData(format!("no balance entry for {asset}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_down_to_step_size() {
        assert_eq!(BinanceWallet::round_to_step(1.23456, 0.001), 1.234);
        assert_eq!(BinanceWallet::round_to_step(1.0, 0.1), 1.0);
    }

    #[test]
    fn s6_query_string_uses_symbol_filters_not_hardcoded_precision() {
        let wallet = BinanceWallet {
            pair: InstrumentPair::new("btc", "usdt"),
            symbol: "BTCUSDT".into(),
            api_key: "key".into(),
            api_secret: "secret".into(),
            filters: SymbolFilters { step_size: 0.00001, tick_size: 0.01, min_notional: 10.0 },
        };

        let qs = wallet.query_string_for_new_order(Side::Buy, 50000.126, 0.123456, 1_700_000_000_000);
        assert!(qs.contains("price=50000.12"));
        assert!(qs.contains("quantity=0.12345"));
        assert!(qs.contains("symbol=BTCUSDT"));
        let _ = wallet.pair;
    }

    #[test]
    fn extracts_filters_from_exchange_info() {
        let doc = serde_json::json!({
            "symbols": [{
                "symbol": "BTCUSDT",
                "filters": [
                    {"filterType": "LOT_SIZE", "stepSize": "0.00001"},
                    {"filterType": "PRICE_FILTER", "tickSize": "0.01"},
                    {"filterType": "MIN_NOTIONAL", "minNotional": "10.0"},
                ],
            }],
        });

        let filters = BinanceWallet::extract_filters(&doc, "BTCUSDT").unwrap();
        assert_eq!(filters.step_size, 0.00001);
        assert_eq!(filters.tick_size, 0.01);
        assert_eq!(filters.min_notional, 10.0);
    }

    #[test]
    fn missing_filter_is_an_error_not_a_default() {
        let doc = serde_json::json!({"symbols": [{"symbol": "BTCUSDT", "filters": []}]});
        assert!(BinanceWallet::extract_filters(&doc, "BTCUSDT").is_err());
    }
}
