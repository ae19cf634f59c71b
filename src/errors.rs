use thiserror::Error;

/// Errors from the websocket/REST market-feed pipeline. Kept separate from
/// `WalletError` because feed errors are protocol-level (malformed
/// payloads, dropped connections) while wallet errors are business-level
/// (exchange rejected an order).
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("unexpected data from exchange: {0}")]
    UnexpectedData(String),

    #[error("bootstrap failed after exhausting retries for {0}")]
    BootstrapFailed(String),
}

/// Errors from the authenticated REST order-lifecycle client. A
/// `FilterMissing` is fatal at construction time (§4.7): Binance wallets
/// cannot be built without `exchangeInfo` filters.
#[derive(Debug, Error)]
pub enum WalletError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("unexpected response from exchange: {0}")]
    UnexpectedData(String),

    #[error("exchange rejected the request: {0}")]
    Business(String),

    #[error("required symbol filter missing: {0}")]
    FilterMissing(String),
}

#[derive(Debug, Error)]
pub enum WsError {
    #[error("connect failed: {0}")]
    Connect(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("failed to send opening message: {0}")]
    OpeningMessage(String),

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("request build failed: {0}")]
    Build(String),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}
