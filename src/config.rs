use std::env;

use crate::instrument::InstrumentPair;

#[derive(Debug, Clone)]
pub struct Config {
    pub pairs: Vec<InstrumentPair>,
    pub api_port: u16,
    pub binance_api_key: String,
    pub binance_api_secret: String,
    pub coinbase_api_key: String,
    pub coinbase_api_secret: String,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        // default to BTC-USD and ETH-USD if PAIRS is not set
        let pairs = env::var("PAIRS")
            .unwrap_or_else(|_| "BTC-USD,ETH-USD".to_string())
            .split(',')
            .filter_map(|raw| {
                let (base, quote) = raw.trim().split_once('-')?;
                Some(InstrumentPair::new(base, quote))
            })
            .collect();

        let api_port = env::var("API_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .expect("API_PORT must be a valid port number (1-65535)");

        Self {
            pairs,
            api_port,
            binance_api_key: env::var("BINANCE_API_KEY").unwrap_or_default(),
            binance_api_secret: env::var("BINANCE_API_SECRET").unwrap_or_default(),
            coinbase_api_key: env::var("COINBASE_API_KEY").unwrap_or_default(),
            coinbase_api_secret: env::var("COINBASE_API_SECRET").unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hyphenated_pairs() {
        let pairs: Vec<InstrumentPair> = "BTC-USD,ETH-USD"
            .split(',')
            .filter_map(|raw| {
                let (base, quote) = raw.trim().split_once('-')?;
                Some(InstrumentPair::new(base, quote))
            })
            .collect();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].to_coinbase(), "BTC-USD");
        assert_eq!(pairs[1].to_binance(), "ETHUSD");
    }
}
