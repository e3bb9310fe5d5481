/// Memory item persistence
///
/// Every write goes through a status check first, so the only reachable
/// lifecycles are:
///
/// ```text
/// pending -> confirmed -> deleted
/// pending -> rejected  -> deleted
/// pending -> deleted
/// ```
///
/// Confirmed rows drop their source quote and never expire. Every other row
/// carries an expiry and is removed by housekeeping once it passes.
use anyhow::{Context, Result};
use kiosk_sdk::errors::EngineError;
use kiosk_sdk::types::{MemoryCandidate, MemoryKind, MemoryStatus};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::config::StoreConfig;

const HOUR_MS: i64 = 60 * 60 * 1000;

const SELECT_COLUMNS: &str = "SELECT id, personal_name, kind, value, source_quote, status, \
     created_at_ms, updated_at_ms, expires_at_ms FROM memory_items";

/// How long unconfirmed rows are kept
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub pending_ttl_ms: i64,
    pub rejected_ttl_ms: i64,
    pub deleted_ttl_ms: i64,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            pending_ttl_ms: 24 * HOUR_MS,
            rejected_ttl_ms: 24 * HOUR_MS,
            deleted_ttl_ms: 24 * HOUR_MS,
        }
    }
}

impl From<&StoreConfig> for RetentionPolicy {
    fn from(config: &StoreConfig) -> Self {
        Self {
            pending_ttl_ms: config.pending_ttl_ms(),
            rejected_ttl_ms: config.rejected_ttl_ms(),
            deleted_ttl_ms: config.deleted_ttl_ms(),
        }
    }
}

/// Memory item record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemoryItem {
    pub id: String,
    pub personal_name: String,
    pub kind: MemoryKind,
    pub value: String,
    pub source_quote: Option<String>,
    pub status: MemoryStatus,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
    pub expires_at_ms: Option<i64>,
}

impl MemoryItem {
    fn from_row(row: &SqliteRow) -> Result<Self> {
        let kind: String = row.get("kind");
        let status: String = row.get("status");
        Ok(Self {
            id: row.get("id"),
            personal_name: row.get("personal_name"),
            kind: kind.parse().map_err(anyhow::Error::msg)?,
            value: row.get("value"),
            source_quote: row.get("source_quote"),
            status: status.parse().map_err(anyhow::Error::msg)?,
            created_at_ms: row.get("created_at_ms"),
            updated_at_ms: row.get("updated_at_ms"),
            expires_at_ms: row.get("expires_at_ms"),
        })
    }
}

/// Memory repository for database operations
#[derive(Clone)]
pub struct MemoryRepository {
    pool: SqlitePool,
    retention: RetentionPolicy,
}

impl MemoryRepository {
    pub fn new(pool: SqlitePool, retention: RetentionPolicy) -> Self {
        Self { pool, retention }
    }

    /// Store a candidate awaiting staff confirmation
    pub async fn insert_pending(
        &self,
        personal_name: &str,
        candidate: &MemoryCandidate,
        now_ms: i64,
    ) -> Result<MemoryItem> {
        let item = MemoryItem {
            id: uuid::Uuid::new_v4().to_string(),
            personal_name: personal_name.to_string(),
            kind: candidate.kind,
            value: candidate.value.clone(),
            source_quote: candidate.source_quote.clone(),
            status: MemoryStatus::Pending,
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
            expires_at_ms: Some(now_ms + self.retention.pending_ttl_ms),
        };

        sqlx::query(
            "INSERT INTO memory_items (id, personal_name, kind, value, source_quote, status, \
             created_at_ms, updated_at_ms, expires_at_ms) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&item.id)
        .bind(&item.personal_name)
        .bind(item.kind.as_str())
        .bind(&item.value)
        .bind(&item.source_quote)
        .bind(item.status.as_str())
        .bind(item.created_at_ms)
        .bind(item.updated_at_ms)
        .bind(item.expires_at_ms)
        .execute(&self.pool)
        .await
        .context("Failed to insert pending memory")?;

        Ok(item)
    }

    /// pending -> confirmed: the quote is dropped and the item no longer expires
    pub async fn confirm(&self, id: &str, now_ms: i64) -> Result<MemoryItem> {
        self.move_to(id, &[MemoryStatus::Pending], MemoryStatus::Confirmed, None, now_ms)
            .await
            .context("Failed to confirm memory")
    }

    /// pending -> rejected
    pub async fn reject(&self, id: &str, now_ms: i64) -> Result<MemoryItem> {
        let expires_at_ms = now_ms.saturating_add(self.retention.rejected_ttl_ms);
        self.move_to(
            id,
            &[MemoryStatus::Pending],
            MemoryStatus::Rejected,
            Some(expires_at_ms),
            now_ms,
        )
        .await
        .context("Failed to reject memory")
    }

    /// Any live item -> deleted; the row lingers until its expiry
    pub async fn soft_delete(&self, id: &str, now_ms: i64) -> Result<MemoryItem> {
        let expires_at_ms = now_ms.saturating_add(self.retention.deleted_ttl_ms);
        self.move_to(
            id,
            &[
                MemoryStatus::Pending,
                MemoryStatus::Confirmed,
                MemoryStatus::Rejected,
            ],
            MemoryStatus::Deleted,
            Some(expires_at_ms),
            now_ms,
        )
        .await
        .context("Failed to delete memory")
    }

    pub async fn get(&self, id: &str) -> Result<Option<MemoryItem>> {
        let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch memory")?;

        row.as_ref().map(MemoryItem::from_row).transpose()
    }

    /// List items, oldest first, optionally filtered by name and status
    pub async fn list(
        &self,
        personal_name: Option<&str>,
        status: Option<MemoryStatus>,
    ) -> Result<Vec<MemoryItem>> {
        let rows = sqlx::query(&format!(
            "{} WHERE (?1 IS NULL OR personal_name = ?1) AND (?2 IS NULL OR status = ?2) \
             ORDER BY created_at_ms, id",
            SELECT_COLUMNS
        ))
        .bind(personal_name)
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await
        .context("Failed to list memories")?;

        rows.iter().map(MemoryItem::from_row).collect()
    }

    /// Physically remove every row whose expiry has passed
    pub async fn delete_expired(&self, now_ms: i64) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM memory_items WHERE expires_at_ms IS NOT NULL AND expires_at_ms <= ?",
        )
        .bind(now_ms)
        .execute(&self.pool)
        .await
        .context("Failed to delete expired memories")?;

        Ok(result.rows_affected())
    }

    async fn fetch(&self, id: &str) -> Result<MemoryItem> {
        self.get(id)
            .await?
            .ok_or_else(|| EngineError::MemoryNotFound(id.to_string()).into())
    }

    /// Change the status of `id` only if it is currently in `from`.
    ///
    /// The guard lives in the UPDATE itself so a concurrent writer cannot
    /// slip between the check and the write. Every move clears the quote.
    async fn move_to(
        &self,
        id: &str,
        from: &[MemoryStatus],
        to: MemoryStatus,
        expires_at_ms: Option<i64>,
        now_ms: i64,
    ) -> Result<MemoryItem> {
        let placeholders = vec!["?"; from.len()].join(", ");
        let sql = format!(
            "UPDATE memory_items SET status = ?, source_quote = NULL, expires_at_ms = ?, \
             updated_at_ms = ? WHERE id = ? AND status IN ({})",
            placeholders
        );

        let mut query = sqlx::query(&sql)
            .bind(to.as_str())
            .bind(expires_at_ms)
            .bind(now_ms)
            .bind(id);
        for status in from {
            query = query.bind(status.as_str());
        }
        let result = query.execute(&self.pool).await?;

        if result.rows_affected() == 0 {
            let current = self.fetch(id).await?;
            return Err(EngineError::InvalidMemoryTransition {
                id: id.to_string(),
                from: current.status.to_string(),
                to: to.to_string(),
            }
            .into());
        }

        self.fetch(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use tempfile::TempDir;

    fn candidate() -> MemoryCandidate {
        MemoryCandidate {
            kind: MemoryKind::Food,
            value: "カレー".to_string(),
            source_quote: Some("カレーが好き".to_string()),
        }
    }

    async fn setup() -> (TempDir, Database, MemoryRepository) {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(&temp_dir.path().join("kiosk.db")).await.unwrap();
        let repo = db.memories(RetentionPolicy::default());
        (temp_dir, db, repo)
    }

    #[tokio::test]
    async fn test_insert_pending_sets_expiry() {
        let (_dir, _db, repo) = setup().await;

        let item = repo.insert_pending("ゆうた", &candidate(), 1_000).await.unwrap();
        assert_eq!(item.status, MemoryStatus::Pending);
        assert_eq!(item.expires_at_ms, Some(1_000 + 24 * HOUR_MS));

        let stored = repo.get(&item.id).await.unwrap().unwrap();
        assert_eq!(stored, item);
    }

    #[tokio::test]
    async fn test_confirm_clears_quote_and_expiry() {
        let (_dir, _db, repo) = setup().await;

        let item = repo.insert_pending("ゆうた", &candidate(), 1_000).await.unwrap();
        let confirmed = repo.confirm(&item.id, 2_000).await.unwrap();

        assert_eq!(confirmed.status, MemoryStatus::Confirmed);
        assert_eq!(confirmed.source_quote, None);
        assert_eq!(confirmed.expires_at_ms, None);
        assert_eq!(confirmed.updated_at_ms, 2_000);
    }

    #[tokio::test]
    async fn test_confirm_twice_is_invalid() {
        let (_dir, _db, repo) = setup().await;

        let item = repo.insert_pending("ゆうた", &candidate(), 1_000).await.unwrap();
        repo.confirm(&item.id, 2_000).await.unwrap();

        let err = repo.confirm(&item.id, 3_000).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EngineError>(),
            Some(EngineError::InvalidMemoryTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_competing_reviews_only_one_wins() {
        let (_dir, _db, repo) = setup().await;
        let console = repo.clone();

        let item = repo.insert_pending("ゆうた", &candidate(), 1_000).await.unwrap();
        let (confirmed, rejected) =
            tokio::join!(repo.confirm(&item.id, 2_000), console.reject(&item.id, 2_000));
        assert_ne!(confirmed.is_ok(), rejected.is_ok());

        let loser = confirmed.err().or(rejected.err()).unwrap();
        assert!(matches!(
            loser.downcast_ref::<EngineError>(),
            Some(EngineError::InvalidMemoryTransition { .. })
        ));

        let stored = repo.get(&item.id).await.unwrap().unwrap();
        assert_ne!(stored.status, MemoryStatus::Pending);
        assert_eq!(stored.source_quote, None);
    }

    #[tokio::test]
    async fn test_unknown_id_is_not_found() {
        let (_dir, _db, repo) = setup().await;

        let err = repo.reject("missing", 1_000).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EngineError>(),
            Some(EngineError::MemoryNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_soft_delete_confirmed_item_expires_again() {
        let (_dir, _db, repo) = setup().await;

        let item = repo.insert_pending("ゆうた", &candidate(), 1_000).await.unwrap();
        repo.confirm(&item.id, 2_000).await.unwrap();
        let deleted = repo.soft_delete(&item.id, 3_000).await.unwrap();

        assert_eq!(deleted.status, MemoryStatus::Deleted);
        assert_eq!(deleted.expires_at_ms, Some(3_000 + 24 * HOUR_MS));
        assert!(repo.soft_delete(&item.id, 4_000).await.is_err());
    }

    #[tokio::test]
    async fn test_list_filters() {
        let (_dir, _db, repo) = setup().await;

        let a = repo.insert_pending("ゆうた", &candidate(), 1_000).await.unwrap();
        let b = repo.insert_pending("さくら", &candidate(), 2_000).await.unwrap();
        repo.reject(&b.id, 3_000).await.unwrap();

        assert_eq!(repo.list(None, None).await.unwrap().len(), 2);

        let yuta = repo.list(Some("ゆうた"), None).await.unwrap();
        assert_eq!(yuta.len(), 1);
        assert_eq!(yuta[0].id, a.id);

        let rejected = repo.list(None, Some(MemoryStatus::Rejected)).await.unwrap();
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].id, b.id);

        assert!(repo
            .list(Some("ゆうた"), Some(MemoryStatus::Rejected))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_delete_expired_keeps_confirmed() {
        let (_dir, _db, repo) = setup().await;

        let kept = repo.insert_pending("ゆうた", &candidate(), 0).await.unwrap();
        repo.confirm(&kept.id, 10).await.unwrap();
        let expired = repo.insert_pending("ゆうた", &candidate(), 0).await.unwrap();

        let deleted = repo.delete_expired(24 * HOUR_MS).await.unwrap();
        assert_eq!(deleted, 1);
        assert!(repo.get(&expired.id).await.unwrap().is_none());
        assert!(repo.get(&kept.id).await.unwrap().is_some());
    }
}
