//! Safe path-lookup and builder helpers over `serde_json::Value`, standing
//! in for the original's rapidjson `get_json_member`/`DocumentCreator`.

use serde_json::Value;

/// Looks up a nested string member, e.g. `get_str(doc, &["available_balance", "currency"])`.
/// Returns `None` (never panics) if any path segment is missing or not a string.
pub fn get_str<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    let mut cur = value;
    for key in path {
        cur = cur.get(key)?;
    }
    cur.as_str()
}

/// Parses a nested string member as `f64`, skipping malformed values with
/// `None` rather than panicking (§4.4: "malformed values are skipped with
/// a warning" — the warning is logged by the caller, which has context).
pub fn get_f64_str(value: &Value, path: &[&str]) -> Option<f64> {
    get_str(value, path)?.parse::<f64>().ok()
}

/// Upserts a member into a JSON object, replacing any existing value —
/// the analogue of the original's `add_or_overwrite_member`.
pub fn upsert(object: &mut Value, key: &str, val: Value) {
    if let Value::Object(map) = object {
        map.insert(key.to_string(), val);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn get_str_walks_nested_path() {
        let doc = json!({"available_balance": {"currency": "USD", "value": "12.50"}});
        assert_eq!(get_str(&doc, &["available_balance", "currency"]), Some("USD"));
        assert_eq!(get_f64_str(&doc, &["available_balance", "value"]), Some(12.5));
    }

    #[test]
    fn get_str_missing_path_is_none() {
        let doc = json!({"a": 1});
        assert_eq!(get_str(&doc, &["b"]), None);
        assert_eq!(get_str(&doc, &["a", "b"]), None);
    }

    #[test]
    fn upsert_replaces_existing() {
        let mut doc = json!({"x": 1});
        upsert(&mut doc, "x", json!(2));
        assert_eq!(doc["x"], json!(2));
    }
}
