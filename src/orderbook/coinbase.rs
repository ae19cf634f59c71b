//! Coinbase level2 parsing (§4.4). Snapshot and update events share the
//! exact same wire shape — an array of `{side, price_level, new_quantity}`
//! objects — so the snapshot is processed as a sequence of updates; no
//! separate REST bootstrap call is needed (the `snapshot`-typed event on
//! `l2_data` already is the full book).

use serde_json::Value;

use super::Side;

#[derive(Clone, Copy, Debug)]
pub struct LevelUpdate {
    pub side: Side,
    pub price: f64,
    pub quantity: f64,
}

/// Parses the `updates` array carried by both `snapshot` and `update`
/// events on the `l2_data` channel. Entries with an unrecognized `side`
/// or malformed numeric fields are skipped.
pub fn parse_updates(updates: &Value) -> Vec<LevelUpdate> {
    let Some(array) = updates.as_array() else {
        return Vec::new();
    };

    array.iter().filter_map(parse_one).collect()
}

fn parse_one(entry: &Value) -> Option<LevelUpdate> {
    let side = match entry.get("side")?.as_str()? {
        "bid" => Side::Bid,
        "offer" => Side::Ask,
        _ => return None,
    };

    let price = entry.get("price_level")?.as_str()?.parse::<f64>().ok()?;
    let quantity = entry.get("new_quantity")?.as_str()?.parse::<f64>().ok()?;

    Some(LevelUpdate { side, price, quantity })
}

/// Splits a flat `LevelUpdate` list into per-side `(price, qty)` batches,
/// ready for `OrderBook::apply_batch`.
pub fn partition_by_side(updates: Vec<LevelUpdate>) -> (Vec<(f64, f64)>, Vec<(f64, f64)>) {
    let mut bids = Vec::new();
    let mut asks = Vec::new();
    for u in updates {
        match u.side {
            Side::Bid => bids.push((u.price, u.quantity)),
            Side::Ask => asks.push((u.price, u.quantity)),
        }
    }
    (bids, asks)
}
