//! Latest-headcount document store.
//!
//! Holds the most recent `{headcount, zoneId}[]` document published by a pass and
//! serves it back, whole or for a single zone. In memory only.

use crate::core::types::ZoneHeadcount;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HeadcountError {
    #[error("invalid headcount document: {0}")]
    InvalidDocument(#[from] serde_json::Error),
}

#[derive(Debug, Default)]
pub struct HeadcountStore {
    latest: Option<Value>,
}

impl HeadcountStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a JSON document and echo it back as stored
    pub fn put(&mut self, json: &str) -> Result<String, HeadcountError> {
        let document: Value = serde_json::from_str(json)?;
        let echoed = serde_json::to_string(&document)?;
        self.latest = Some(document);
        Ok(echoed)
    }

    pub fn put_counts(&mut self, counts: &[ZoneHeadcount]) -> Result<String, HeadcountError> {
        let document = serde_json::to_value(counts)?;
        let echoed = serde_json::to_string(&document)?;
        self.latest = Some(document);
        Ok(echoed)
    }

    /// The latest document, `[]` before anything was stored
    pub fn get(&self) -> Result<String, HeadcountError> {
        match &self.latest {
            Some(document) => Ok(serde_json::to_string(document)?),
            None => Ok("[]".to_string()),
        }
    }

    /// Headcount of one zone in the latest document, 0 when absent. The last entry wins
    /// when a zone appears more than once.
    pub fn get_zone(&self, zone_id: u32) -> u64 {
        let Some(Value::Array(entries)) = &self.latest else {
            return 0;
        };
        entries
            .iter()
            .rev()
            .find(|entry| entry.get("zoneId").and_then(Value::as_u64) == Some(u64::from(zone_id)))
            .and_then(|entry| entry.get("headcount"))
            .and_then(Value::as_u64)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_store() {
        let store = HeadcountStore::new();
        assert_eq!(store.get().unwrap(), "[]");
        assert_eq!(store.get_zone(1), 0);
    }

    #[test]
    fn test_put_echoes_and_get_returns_latest() {
        let mut store = HeadcountStore::new();
        let echoed = store
            .put(r#"[ {"headcount": 4, "zoneId": 1}, {"headcount": 2, "zoneId": 9} ]"#)
            .unwrap();
        assert_eq!(echoed, r#"[{"headcount":4,"zoneId":1},{"headcount":2,"zoneId":9}]"#);
        assert_eq!(store.get().unwrap(), echoed);

        store.put(r#"[{"headcount": 7, "zoneId": 1}]"#).unwrap();
        assert_eq!(store.get_zone(1), 7);
        assert_eq!(store.get_zone(9), 0);
    }

    #[test]
    fn test_put_counts_uses_wire_names() {
        let mut store = HeadcountStore::new();
        let echoed = store
            .put_counts(&[ZoneHeadcount { headcount: 3, zone_id: 5 }])
            .unwrap();
        assert_eq!(echoed, r#"[{"headcount":3,"zoneId":5}]"#);
        assert_eq!(store.get_zone(5), 3);
    }

    #[test]
    fn test_duplicate_zone_uses_last_entry() {
        let mut store = HeadcountStore::new();
        store
            .put(r#"[{"headcount": 1, "zoneId": 3}, {"headcount": 6, "zoneId": 4}, {"headcount": 8, "zoneId": 3}]"#)
            .unwrap();
        assert_eq!(store.get_zone(3), 8);
        assert_eq!(store.get_zone(4), 6);
    }

    #[test]
    fn test_invalid_document_rejected() {
        let mut store = HeadcountStore::new();
        store.put(r#"[{"headcount": 1, "zoneId": 2}]"#).unwrap();
        assert!(store.put("{ nope").is_err());
        assert_eq!(store.get_zone(2), 1);
    }
}
