//! Authenticated REST wallet/order-lifecycle clients (§4.7).

pub mod binance;
pub mod coinbase;

use async_trait::async_trait;

use crate::errors::WalletError;

#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum Side {
    Buy,
    Sell,
}

#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum OrderStatus {
    Open,
    Filled,
    Cancelled,
    Failed,
    Unknown,
}

#[derive(Clone, Debug)]
pub struct Order {
    pub order_id: String,
    pub side: Side,
    pub status: OrderStatus,
}

/// Every venue wallet implements the same order-lifecycle surface, even
/// though the wire formats (and the bugs each original implementation
/// carried) differ completely underneath.
#[async_trait]
pub trait Wallet: Send + Sync {
    async fn create_limit_buy_order(&self, price: f64, quantity: f64) -> Result<Order, WalletError>;
    async fn create_limit_sell_order(&self, price: f64, quantity: f64) -> Result<Order, WalletError>;
    async fn get_order(&self, order_id: &str) -> Result<Order, WalletError>;
    /// Retries up to `attempts` times on a retryable cancel failure;
    /// returns whether the order ended up cancelled.
    async fn cancel_limit_order(&self, order_id: &str, attempts: u32) -> Result<bool, WalletError>;
    async fn get_asset_account_balance(&self, asset: &str) -> Result<f64, WalletError>;
}
