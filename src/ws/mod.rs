//! Single-connection, TLS-mandatory websocket client (§4.3).
//!
//! `connect()` runs the I/O loop until the socket closes, flushing queued
//! opening messages on open and invoking the message callback on every
//! inbound text frame. `close()` is thread-safe and may be called from any
//! thread, including the one running `connect()`'s loop (as in the
//! original, which posts the close onto the owning `asio::io_context`) —
//! here a `tokio::sync::Notify` plays that role.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::Notify;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::{frame::coding::CloseCode, CloseFrame};
use tokio_tungstenite::tungstenite::Message;

use crate::errors::WsError;

/// Thread-safe handle used to request a normal close from any thread.
#[derive(Clone)]
pub struct WsCloser {
    notify: Arc<Notify>,
}

impl WsCloser {
    pub fn close(&self) {
        self.notify.notify_one();
    }
}

pub struct WsClient {
    uri: String,
    headers: Vec<(String, String)>,
    opening_messages: Vec<Value>,
    on_message: Box<dyn FnMut(Value) -> bool + Send>,
    notify: Arc<Notify>,
}

impl WsClient {
    pub fn new(uri: impl Into<String>, on_message: impl FnMut(Value) -> bool + Send + 'static) -> Self {
        Self {
            uri: uri.into(),
            headers: Vec::new(),
            opening_messages: Vec::new(),
            on_message: Box::new(on_message),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Queues a message to send after the socket opens, in insertion order.
    pub fn add_opening_message_json(&mut self, json: Value) {
        self.opening_messages.push(json);
    }

    pub fn add_header(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.headers.push((key.into(), value.into()));
    }

    /// A cloneable handle that can signal a close from any thread.
    pub fn closer(&self) -> WsCloser {
        WsCloser { notify: self.notify.clone() }
    }

    /// Runs the I/O loop until the socket closes (normally or on error).
    /// Opening messages are flushed in insertion order immediately after
    /// connecting; a send failure aborts the connection (fail-fast).
    pub async fn connect(&mut self) -> Result<(), WsError> {
        use tokio_tungstenite::tungstenite::http::Request;

        let mut builder = Request::builder().uri(self.uri.as_str());
        for (key, value) in &self.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }
        let request = builder
            .body(())
            .map_err(|e| WsError::OpeningMessage(e.to_string()))?;

        let (stream, _response) = connect_async(request).await?;
        let (mut write, mut read) = stream.split();

        for msg in &self.opening_messages {
            let text = serde_json::to_string(msg)?;
            write
                .send(Message::Text(text.into()))
                .await
                .map_err(|e| WsError::OpeningMessage(e.to_string()))?;
        }

        loop {
            tokio::select! {
                frame = read.next() => {
                    let Some(frame) = frame else { break };
                    let frame = frame?;
                    let Message::Text(text) = frame else { continue };

                    let parsed: Value = match serde_json::from_str(&text) {
                        Ok(v) => v,
                        Err(e) => {
                            tracing::warn!("WARN failed to parse inbound frame: {e}");
                            continue;
                        }
                    };

                    if !(self.on_message)(parsed) {
                        let _ = write.send(Message::Close(Some(CloseFrame {
                            code: CloseCode::Normal,
                            reason: "OK".into(),
                        }))).await;
                        break;
                    }
                }
                _ = self.notify.notified() => {
                    let _ = write.send(Message::Close(Some(CloseFrame {
                        code: CloseCode::Normal,
                        reason: "OK".into(),
                    }))).await;
                    break;
                }
            }
        }

        Ok(())
    }
}
