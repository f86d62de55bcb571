//! History pagination cursor
//!
//! Token format: `"<created_at_millis>|<record_id>"` — the `(createdAt,
//! recordId)` of the oldest record returned so far. Opaque to callers; the
//! composite order `(created_at desc, record_id desc)` is total because the
//! record id is unique and monotonically assigned.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ProtoError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryCursor {
    pub created_at_ms: i64,
    pub record_id: i64,
}

impl HistoryCursor {
    pub fn new(created_at: DateTime<Utc>, record_id: i64) -> Self {
        Self { created_at_ms: created_at.timestamp_millis(), record_id }
    }

    pub fn encode(&self) -> String {
        format!("{}|{}", self.created_at_ms, self.record_id)
    }

    /// Strict parse — malformed cursors are rejected, never truncated.
    pub fn parse(raw: &str) -> Result<Self, ProtoError> {
        let (ts, id) = raw.split_once('|').ok_or(ProtoError::InvalidCursor)?;
        let created_at_ms: i64 = ts.parse().map_err(|_| ProtoError::InvalidCursor)?;
        let record_id: i64 = id.parse().map_err(|_| ProtoError::InvalidCursor)?;
        if created_at_ms < 0 || record_id < 0 {
            return Err(ProtoError::InvalidCursor);
        }
        Ok(Self { created_at_ms, record_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_parse_round_trip() {
        let cursor = HistoryCursor { created_at_ms: 1_700_000_000_123, record_id: 42 };
        assert_eq!(HistoryCursor::parse(&cursor.encode()).unwrap(), cursor);
    }

    #[test]
    fn malformed_cursors_rejected() {
        for raw in ["", "123", "|", "abc|1", "1|abc", "-5|1", "1|-5", "1|2|3"] {
            assert!(HistoryCursor::parse(raw).is_err(), "accepted {raw:?}");
        }
    }
}
