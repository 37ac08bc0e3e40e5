//! Cache key composition
//!
//! Keys are built from an ordered list of parts joined by a fixed
//! delimiter. Composition is deterministic and order-sensitive, so
//! callers must pass parts in a stable order.

/// Delimiter between key parts
const KEY_DELIMITER: &str = ":";

/// One component of a cache key
#[derive(Debug, Clone)]
pub enum KeyPart {
    /// Used verbatim
    Str(String),
    /// Serialized with serde_json
    Json(serde_json::Value),
}

impl From<&str> for KeyPart {
    fn from(s: &str) -> Self {
        KeyPart::Str(s.to_string())
    }
}

impl From<String> for KeyPart {
    fn from(s: String) -> Self {
        KeyPart::Str(s)
    }
}

impl From<serde_json::Value> for KeyPart {
    fn from(v: serde_json::Value) -> Self {
        KeyPart::Json(v)
    }
}

/// Compose a cache key from ordered parts
pub fn compose_key(parts: &[KeyPart]) -> String {
    parts
        .iter()
        .map(|part| match part {
            KeyPart::Str(s) => s.clone(),
            KeyPart::Json(v) => v.to_string(),
        })
        .collect::<Vec<_>>()
        .join(KEY_DELIMITER)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_compose_key_strings() {
        let key = compose_key(&["tenant".into(), "alice.quillhost.com".into()]);
        assert_eq!(key, "tenant:alice.quillhost.com");
    }

    #[test]
    fn test_compose_key_is_order_sensitive() {
        let a = compose_key(&["a".into(), "b".into()]);
        let b = compose_key(&["b".into(), "a".into()]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_compose_key_json_parts() {
        let key = compose_key(&[
            "feed".into(),
            KeyPart::Json(json!({"handle": "alice", "page": 2})),
        ]);
        assert_eq!(key, r#"feed:{"handle":"alice","page":2}"#);
    }

    #[test]
    fn test_compose_key_single_part() {
        assert_eq!(compose_key(&["solo".into()]), "solo");
    }
}
