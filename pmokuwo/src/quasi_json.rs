//! Lecture des réponses « presque JSON » de Kuwo
//!
//! Certains services renvoient des objets avec des guillemets simples
//! (`{'TOTAL':'12'}`). Le corps est d'abord lu tel quel ; en cas d'échec,
//! les guillemets simples sont remplacés par des doubles et le parsing est
//! tenté une seconde fois. Un second échec est une erreur de parsing.

use crate::error::Result;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Parse un corps JSON en tolérant les guillemets simples
pub fn loads_quasi<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    match serde_json::from_slice(body) {
        Ok(value) => Ok(value),
        Err(strict) => {
            let text = String::from_utf8_lossy(body);
            if !text.contains('\'') {
                return Err(strict.into());
            }
            Ok(serde_json::from_str(&text.replace('\'', "\""))?)
        }
    }
}

/// Lit un compteur qui peut être un nombre ou une chaîne (`"TOTAL": "120"`)
pub fn as_count(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_strict_json_is_untouched() {
        let v: Value = loads_quasi(br#"{"name": "l'amour"}"#).unwrap();
        assert_eq!(v, json!({"name": "l'amour"}));
    }

    #[test]
    fn test_single_quotes_are_normalized() {
        let v: Value = loads_quasi(b"{'TOTAL':'12','abslist':[{'SONGNAME':'a'}]}").unwrap();
        assert_eq!(v["TOTAL"], json!("12"));
        assert_eq!(v["abslist"][0]["SONGNAME"], json!("a"));
    }

    #[test]
    fn test_unrecoverable_body_is_parse_error() {
        let err = loads_quasi::<Value>(b"{'a': 'it's'}").unwrap_err();
        assert!(err.is_parse());
        assert!(loads_quasi::<Value>(b"<html>").unwrap_err().is_parse());
    }

    #[test]
    fn test_as_count() {
        assert_eq!(as_count(&json!("120")), Some(120));
        assert_eq!(as_count(&json!(7)), Some(7));
        assert_eq!(as_count(&json!(null)), None);
    }
}
