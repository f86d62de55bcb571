//! Relay message log: ciphertext submission and cursor-paginated history.
//!
//! The relay stores opaque envelopes only; validation is transport-level
//! (canonical base64, size ceiling, replay guard) and never touches
//! message content. History pages walk backwards in time over the total
//! order `(created_at_ms desc, id desc)`, which is stable because ids are
//! unique and monotonically assigned.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool};
use tracing::debug;

use ng_proto::{b64, HistoryCursor, MessageRecord};

use crate::{
    config::RelayConfig,
    error::RelayError,
    replay::{ReplayGuard, ReplayStore},
};

#[derive(Debug, Clone, Serialize)]
pub struct HistoryPage {
    pub messages: Vec<MessageRecord>,
    /// Token for the page of older messages, `None` on the last page.
    #[serde(rename = "nextCursor")]
    pub next_cursor: Option<String>,
    #[serde(rename = "hasMore")]
    pub has_more: bool,
}

pub struct MessageLog<S> {
    pool: SqlitePool,
    guard: ReplayGuard<S>,
    config: RelayConfig,
}

impl<S: ReplayStore> MessageLog<S> {
    /// Open (or create) the log database and run pending migrations.
    /// Journal mode is set at connection time, not inside a migration,
    /// because sqlx wraps migrations in transactions and SQLite refuses
    /// `journal_mode` changes there.
    pub async fn open(
        db_path: &Path,
        replay_store: S,
        config: RelayConfig,
    ) -> Result<Self, RelayError> {
        let opts = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);
        let pool = SqlitePool::connect_with(opts).await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| RelayError::Migration(e.to_string()))?;

        Ok(Self { pool, guard: ReplayGuard::new(replay_store), config })
    }

    /// Accept one ciphertext for a chat. Validation order: shape, size,
    /// replay — the guard only ever sees payloads that would otherwise be
    /// stored.
    pub async fn submit(
        &self,
        chat_id: &str,
        sender_id: &str,
        payload: &str,
    ) -> Result<MessageRecord, RelayError> {
        if !b64::is_canonical(payload) {
            return Err(RelayError::InvalidPayload);
        }
        if payload.len() > self.config.max_ciphertext_len {
            return Err(RelayError::CiphertextTooLarge { limit: self.config.max_ciphertext_len });
        }
        if !self.guard.check(chat_id, payload, self.config.replay_ttl).await {
            debug!(chat = chat_id, "duplicate ciphertext rejected");
            return Err(RelayError::Duplicate);
        }

        let now = Utc::now();
        let created_at_ms = now.timestamp_millis();
        let result = sqlx::query(
            "INSERT INTO messages (chat_id, sender_id, encrypted_payload, created_at_ms) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(chat_id)
        .bind(sender_id)
        .bind(payload)
        .bind(created_at_ms)
        .execute(&self.pool)
        .await?;

        Ok(MessageRecord {
            id: result.last_insert_rowid(),
            chat_id: chat_id.to_string(),
            sender_id: sender_id.to_string(),
            encrypted_payload: payload.to_string(),
            created_at: DateTime::<Utc>::from_timestamp_millis(created_at_ms).unwrap_or(now),
        })
    }

    /// One page of chat history, oldest-first. `cursor` is the opaque token
    /// from a previous page; records at or past it are excluded by the
    /// composite filter. A malformed cursor is an error, never silently
    /// ignored.
    pub async fn history(
        &self,
        chat_id: &str,
        limit: Option<u32>,
        cursor: Option<&str>,
    ) -> Result<HistoryPage, RelayError> {
        let limit = match limit {
            None => self.config.default_page_limit,
            Some(l) if (1..=self.config.max_page_limit).contains(&l) => l,
            Some(_) => return Err(RelayError::InvalidLimit { max: self.config.max_page_limit }),
        };
        let cursor = cursor.map(HistoryCursor::parse).transpose()?;

        // One extra row decides has_more without a COUNT round trip.
        let fetch = i64::from(limit) + 1;
        let rows: Vec<(i64, String, String, String, i64)> = match cursor {
            Some(c) => {
                sqlx::query_as(
                    "SELECT id, chat_id, sender_id, encrypted_payload, created_at_ms \
                     FROM messages \
                     WHERE chat_id = ? \
                       AND (created_at_ms < ? OR (created_at_ms = ? AND id < ?)) \
                     ORDER BY created_at_ms DESC, id DESC LIMIT ?",
                )
                .bind(chat_id)
                .bind(c.created_at_ms)
                .bind(c.created_at_ms)
                .bind(c.record_id)
                .bind(fetch)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(
                    "SELECT id, chat_id, sender_id, encrypted_payload, created_at_ms \
                     FROM messages WHERE chat_id = ? \
                     ORDER BY created_at_ms DESC, id DESC LIMIT ?",
                )
                .bind(chat_id)
                .bind(fetch)
                .fetch_all(&self.pool)
                .await?
            }
        };

        let has_more = rows.len() as i64 > i64::from(limit);
        let mut messages: Vec<MessageRecord> = rows
            .into_iter()
            .take(limit as usize)
            .map(|(id, chat_id, sender_id, encrypted_payload, created_at_ms)| MessageRecord {
                id,
                chat_id,
                sender_id,
                encrypted_payload,
                created_at: DateTime::<Utc>::from_timestamp_millis(created_at_ms)
                    .unwrap_or_default(),
            })
            .collect();
        messages.reverse();

        // Continuation points at the oldest record returned.
        let next_cursor = if has_more {
            messages
                .first()
                .map(|oldest| HistoryCursor::new(oldest.created_at, oldest.id).encode())
        } else {
            None
        };

        Ok(HistoryPage { messages, next_cursor, has_more })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replay::MemoryReplayStore;
    use base64::{engine::general_purpose::STANDARD, Engine};
    use std::path::PathBuf;
    use std::time::Duration;
    use uuid::Uuid;

    struct TempDb(PathBuf);

    impl Drop for TempDb {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.0);
            let _ = std::fs::remove_file(self.0.with_extension("db-wal"));
            let _ = std::fs::remove_file(self.0.with_extension("db-shm"));
        }
    }

    async fn open_log(config: RelayConfig) -> (MessageLog<MemoryReplayStore>, TempDb) {
        let path = PathBuf::from(format!("/tmp/ng-relay-test-{}.db", Uuid::new_v4()));
        let log = MessageLog::open(&path, MemoryReplayStore::new(), config)
            .await
            .expect("open log");
        (log, TempDb(path))
    }

    fn payload(tag: &str) -> String {
        STANDARD.encode(format!("ciphertext::{tag}"))
    }

    /// Insert with an explicit timestamp, bypassing submit, to control
    /// ordering in pagination tests.
    async fn insert_at(log: &MessageLog<MemoryReplayStore>, chat: &str, tag: &str, ms: i64) {
        sqlx::query(
            "INSERT INTO messages (chat_id, sender_id, encrypted_payload, created_at_ms) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(chat)
        .bind("sender")
        .bind(payload(tag))
        .bind(ms)
        .execute(&log.pool)
        .await
        .expect("insert row");
    }

    #[tokio::test]
    async fn submit_rejects_non_canonical_payloads() {
        let (log, _db) = open_log(RelayConfig::default()).await;
        for bad in ["", "not base64!!", "AAA", "AA==extra"] {
            assert!(
                matches!(log.submit("chat", "alice", bad).await, Err(RelayError::InvalidPayload)),
                "accepted {bad:?}"
            );
        }
    }

    #[tokio::test]
    async fn ciphertext_length_boundary() {
        let config = RelayConfig { max_ciphertext_len: 64, ..RelayConfig::default() };
        let (log, _db) = open_log(config).await;

        // A canonical base64 string of exactly the configured maximum.
        let at_limit = STANDARD.encode([0u8; 48]);
        assert_eq!(at_limit.len(), 64);
        log.submit("chat", "alice", &at_limit).await.expect("at limit accepted");

        let over = STANDARD.encode([1u8; 51]);
        assert_eq!(over.len(), 68);
        assert!(matches!(
            log.submit("chat", "alice", &over).await,
            Err(RelayError::CiphertextTooLarge { limit: 64 })
        ));
    }

    #[tokio::test]
    async fn duplicate_within_ttl_rejected_then_expires() {
        let config = RelayConfig { replay_ttl: Duration::from_millis(30), ..Default::default() };
        let (log, _db) = open_log(config).await;
        let body = payload("dup");

        log.submit("chat", "alice", &body).await.expect("first accepted");
        assert!(matches!(
            log.submit("chat", "alice", &body).await,
            Err(RelayError::Duplicate)
        ));

        tokio::time::sleep(Duration::from_millis(60)).await;
        log.submit("chat", "alice", &body).await.expect("accepted after ttl");
    }

    #[tokio::test]
    async fn history_limit_validation() {
        let (log, _db) = open_log(RelayConfig::default()).await;
        assert!(matches!(
            log.history("chat", Some(0), None).await,
            Err(RelayError::InvalidLimit { max: 200 })
        ));
        assert!(matches!(
            log.history("chat", Some(201), None).await,
            Err(RelayError::InvalidLimit { max: 200 })
        ));
        assert!(log.history("chat", Some(200), None).await.is_ok());
    }

    #[tokio::test]
    async fn malformed_cursor_is_an_error() {
        let (log, _db) = open_log(RelayConfig::default()).await;
        assert!(matches!(
            log.history("chat", None, Some("not|a|cursor")).await,
            Err(RelayError::Proto(_))
        ));
    }

    #[tokio::test]
    async fn paginates_200_records_in_4_pages() {
        let (log, _db) = open_log(RelayConfig::default()).await;
        let base = 1_700_000_000_000i64;
        // Two records per millisecond: shared timestamps force the id
        // tiebreaker on every page boundary candidate.
        for i in 0..200i64 {
            insert_at(&log, "chat", &format!("m{i}"), base + i / 2).await;
        }
        insert_at(&log, "other-chat", "x", base).await;

        let mut all = Vec::new();
        let mut cursor: Option<String> = None;
        let mut pages = 0;
        loop {
            let page = log
                .history("chat", Some(50), cursor.as_deref())
                .await
                .expect("page fetch");
            assert_eq!(page.messages.len(), 50);
            pages += 1;
            assert_eq!(page.has_more, page.next_cursor.is_some());
            all.splice(0..0, page.messages);
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        assert_eq!(pages, 4);
        assert_eq!(all.len(), 200);

        // Strictly ascending composite order, no duplicates, one chat only.
        for pair in all.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            assert!(
                a.created_at < b.created_at || (a.created_at == b.created_at && a.id < b.id),
                "order violated between {} and {}",
                a.id,
                b.id
            );
        }
        assert!(all.iter().all(|m| m.chat_id == "chat"));
    }

    #[tokio::test]
    async fn short_history_has_no_cursor() {
        let (log, _db) = open_log(RelayConfig::default()).await;
        for i in 0..3i64 {
            insert_at(&log, "chat", &format!("m{i}"), 1_700_000_000_000 + i).await;
        }
        let page = log.history("chat", None, None).await.expect("page");
        assert_eq!(page.messages.len(), 3);
        assert!(!page.has_more);
        assert!(page.next_cursor.is_none());
    }
}
