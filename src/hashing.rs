// =============================================================================
// Canonical hashing — stable SHA-256 digests of structured values
// =============================================================================
//
// Canonicalization rules:
//   - Map keys are serialized in lexicographic order.
//   - Absent fields are omitted entirely; an explicit null serializes as
//     `null`. Callers control absence via `skip_serializing_if`.
//   - Numbers use their minimal representation (serde_json's shortest
//     round-trip formatting).
//   - Strings are UTF-8 with JSON escaping.
//
// Two equivalent payloads therefore hash identically regardless of field
// insertion order.
// =============================================================================

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Render a JSON value in canonical form.
pub fn canonical_string(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        // serde_json::to_string on a bare &str cannot fail.
        Value::String(s) => out.push_str(&serde_json::to_string(s).unwrap_or_default()),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(key.as_str()).unwrap_or_default());
                out.push(':');
                write_canonical(&map[key.as_str()], out);
            }
            out.push('}');
        }
    }
}

/// Canonical SHA-256 hex digest of a JSON value.
pub fn hash_value(value: &Value) -> String {
    hash_message(&canonical_string(value))
}

/// Canonical SHA-256 hex digest of any serializable value.
pub fn hash_serializable<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    Ok(hash_value(&serde_json::to_value(value)?))
}

/// SHA-256 hex digest of a raw UTF-8 message.
pub fn hash_message(message: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(message.as_bytes());
    hex::encode(hasher.finalize())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn object_keys_are_sorted() {
        let a = json!({"b": 1, "a": 2});
        let b = json!({"a": 2, "b": 1});
        assert_eq!(canonical_string(&a), r#"{"a":2,"b":1}"#);
        assert_eq!(hash_value(&a), hash_value(&b));
    }

    #[test]
    fn nested_structures_canonicalize_recursively() {
        let v = json!({"outer": {"z": [1, 2, {"y": true, "x": null}], "a": "s"}});
        assert_eq!(
            canonical_string(&v),
            r#"{"outer":{"a":"s","z":[1,2,{"x":null,"y":true}]}}"#
        );
    }

    #[test]
    fn numbers_use_minimal_representation() {
        assert_eq!(canonical_string(&json!(100)), "100");
        assert_eq!(canonical_string(&json!(0.08)), "0.08");
        assert_eq!(canonical_string(&json!(-1.5)), "-1.5");
    }

    #[test]
    fn digest_is_deterministic_across_calls() {
        let v = json!({"symbol": "SOL", "priceUsd": 147.25, "side": "buy"});
        assert_eq!(hash_value(&v), hash_value(&v.clone()));
    }

    #[test]
    fn known_sha256_vector() {
        // sha256("") and sha256("abc") reference vectors.
        assert_eq!(
            hash_message(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(
            hash_message("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn different_payloads_hash_differently() {
        let a = json!({"quantity": 1.0});
        let b = json!({"quantity": 1.5});
        assert_ne!(hash_value(&a), hash_value(&b));
    }

    #[test]
    fn hash_serializable_matches_value_hash() {
        #[derive(serde::Serialize)]
        struct Req<'a> {
            symbol: &'a str,
            notional_usd: f64,
        }
        let req = Req {
            symbol: "BTC",
            notional_usd: 100.0,
        };
        let via_value = hash_value(&json!({"symbol": "BTC", "notional_usd": 100.0}));
        assert_eq!(hash_serializable(&req).unwrap(), via_value);
    }
}
