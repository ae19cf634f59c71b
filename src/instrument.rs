//! Canonical fixed-width instrument identity and per-venue rendering.

use std::fmt;

use serde::{Serialize, Serializer};

/// A fixed 8-byte upper-case ASCII instrument code. Shorter codes are
/// zero-padded; longer codes are truncated. Equality and hashing are
/// byte-wise over the padded buffer.
#[derive(Clone, Copy, Eq, PartialEq, Hash)]
pub struct Instrument {
    buf: [u8; Self::BUF_BYTES],
}

impl Instrument {
    pub const BUF_BYTES: usize = 8;

    pub fn new(code: &str) -> Self {
        let mut buf = [0u8; Self::BUF_BYTES];
        for (slot, byte) in buf.iter_mut().zip(code.as_bytes().iter()) {
            *slot = byte.to_ascii_uppercase();
        }
        Self { buf }
    }

    /// Upper-case rendering with trailing zero padding stripped.
    pub fn name(&self) -> String {
        let end = self.buf.iter().position(|&b| b == 0).unwrap_or(Self::BUF_BYTES);
        String::from_utf8_lossy(&self.buf[..end]).into_owned()
    }

    pub fn name_lower(&self) -> String {
        self.name().to_ascii_lowercase()
    }
}

impl fmt::Debug for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Instrument({})", self.name())
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// An ordered (base, quote) pair. Venue renderings live here so that
/// adding a venue is one new function, never a change to `Instrument`.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
pub struct InstrumentPair {
    pub base: Instrument,
    pub quote: Instrument,
}

impl InstrumentPair {
    pub fn new(base: &str, quote: &str) -> Self {
        Self {
            base: Instrument::new(base),
            quote: Instrument::new(quote),
        }
    }

    /// Parses a Binance-style concatenated symbol (e.g. "BTCUSDT") into a
    /// pair, given the expected quote asset. Binance doesn't delimit base
    /// from quote in its symbol strings, so the caller must know the quote.
    pub fn from_binance_symbol(symbol: &str, quote: &str) -> Option<Self> {
        let symbol = symbol.to_ascii_uppercase();
        let quote = quote.to_ascii_uppercase();
        symbol
            .strip_suffix(quote.as_str())
            .map(|base| Self::new(base, &quote))
    }

    pub fn to_coinbase(&self) -> String {
        format!("{}-{}", self.base.name(), self.quote.name())
    }

    pub fn to_binance(&self) -> String {
        format!("{}{}", self.base.name(), self.quote.name())
    }

    pub fn to_binance_lower(&self) -> String {
        self.to_binance().to_ascii_lowercase()
    }
}

impl fmt::Display for InstrumentPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

impl Serialize for InstrumentPair {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}
