use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Key aliases checked (case-insensitively) when extracting identity fields
/// from a raw lead payload.
const EMAIL_ALIASES: &[&str] = &["email"];
const PHONE_ALIASES: &[&str] = &["phone", "mobile", "tel"];
const SOURCE_ALIASES: &[&str] = &["source", "origin", "channel"];

/// Derives the deduplication fingerprint for a raw lead payload.
///
/// The fingerprint is `sha256(email + phone)` over the normalized identity
/// fields, hex encoded. Key matching is case-insensitive over the alias sets
/// above; missing or null values normalize to the empty string, strings are
/// trimmed, and non-string values are stringified. Unrelated fields never
/// affect the result.
///
/// Returns `None` when the payload carries neither an email nor a phone.
/// Hashing two empty strings would make every identity-less payload collide
/// on one key, so such requests opt out of deduplication entirely.
pub fn derive_fingerprint(payload: &Map<String, Value>) -> Option<String> {
    let email = extract_normalized(payload, EMAIL_ALIASES);
    let phone = extract_normalized(payload, PHONE_ALIASES);

    if email.is_empty() && phone.is_empty() {
        return None;
    }

    let mut hasher = Sha256::new();
    hasher.update(email.as_bytes());
    hasher.update(phone.as_bytes());
    Some(hex::encode(hasher.finalize()))
}

/// Extracts the source label used on audit entries.
///
/// Falls back to `"unknown"` when the payload carries no usable source field.
pub fn extract_source(payload: &Map<String, Value>) -> String {
    for alias in SOURCE_ALIASES {
        for (key, value) in payload {
            if !key.eq_ignore_ascii_case(alias) {
                continue;
            }
            match value {
                Value::String(s) if !s.trim().is_empty() => return s.trim().to_string(),
                Value::String(_) | Value::Null => {}
                other => return other.to_string(),
            }
        }
    }
    "unknown".to_string()
}

/// First non-null value whose key matches one of `aliases`, normalized to a
/// string. Aliases are checked in order so `email` wins over a later alias.
fn extract_normalized(payload: &Map<String, Value>, aliases: &[&str]) -> String {
    for alias in aliases {
        for (key, value) in payload {
            if key.eq_ignore_ascii_case(alias) && !value.is_null() {
                return normalize_value(value);
            }
        }
    }
    String::new()
}

fn normalize_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: Value) -> Map<String, Value> {
        value.as_object().expect("test payload must be an object").clone()
    }

    #[test]
    fn test_fingerprint_is_hex_sha256() {
        let fp = derive_fingerprint(&payload(json!({"email": "a@x.com"}))).unwrap();
        assert_eq!(fp.len(), 64);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_identity_less_payload_has_no_fingerprint() {
        assert_eq!(derive_fingerprint(&payload(json!({"budget": 100}))), None);
        assert_eq!(derive_fingerprint(&payload(json!({}))), None);
        // Null identity fields count as absent.
        assert_eq!(
            derive_fingerprint(&payload(json!({"email": null, "phone": null}))),
            None
        );
    }

    #[test]
    fn test_source_extraction_fallback() {
        assert_eq!(extract_source(&payload(json!({"source": "webhook"}))), "webhook");
        assert_eq!(extract_source(&payload(json!({"Channel": "ads"}))), "ads");
        assert_eq!(extract_source(&payload(json!({"name": "x"}))), "unknown");
        assert_eq!(extract_source(&payload(json!({"source": ""}))), "unknown");
    }
}
