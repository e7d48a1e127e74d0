//! The relational source table (`insta_content` in the original system) and
//! its append-only errors table. Only the cursor/mark operations named in
//! §3/§4.5/§4.7 are consumed — the rest of the table's schema is not this
//! crate's concern.

use async_trait::async_trait;
use sqlx::PgPool;

#[derive(Debug, Clone)]
pub struct SourceRow {
    pub id: i64,
    pub platform: String,
    pub code: String,
}

#[async_trait]
pub trait SourceTable: Send + Sync {
    /// `SELECT id, platform, code FROM insta_content WHERE id > cursor_id
    /// AND NOT is_extracted ORDER BY id LIMIT limit`.
    async fn next_batch(&self, cursor_id: i64, limit: i64) -> anyhow::Result<Vec<SourceRow>>;

    /// No-op when already true, per the idempotency contract in §7.
    async fn mark_extracted(&self, ids: &[i64]) -> anyhow::Result<()>;

    async fn mark_embedded(&self, ids: &[i64]) -> anyhow::Result<()>;

    /// Looks up the row id for a code, used by C7 to translate verified
    /// codes back into `mark_embedded` targets.
    async fn id_for_code(&self, code: &str) -> anyhow::Result<Option<i64>>;

    /// Append-only error record, written at the moment an item fails (§7's
    /// propagation policy: not aggregated on exit).
    async fn record_error(&self, code: &str, error_text: &str) -> anyhow::Result<()>;
}

pub struct PgSourceTable {
    pool: PgPool,
}

impl PgSourceTable {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl SourceTable for PgSourceTable {
    async fn next_batch(&self, cursor_id: i64, limit: i64) -> anyhow::Result<Vec<SourceRow>> {
        let rows = sqlx::query_as::<_, (i64, String, String)>(
            "SELECT id, platform, code FROM insta_content \
             WHERE id > $1 AND (is_extracted IS NULL OR is_extracted = false) \
             ORDER BY id ASC LIMIT $2",
        )
        .bind(cursor_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, platform, code)| SourceRow { id, platform, code })
            .collect())
    }

    async fn mark_extracted(&self, ids: &[i64]) -> anyhow::Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        sqlx::query("UPDATE insta_content SET is_extracted = true WHERE id = ANY($1)")
            .bind(ids)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_embedded(&self, ids: &[i64]) -> anyhow::Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        sqlx::query("UPDATE insta_content SET is_embedded = true WHERE id = ANY($1)")
            .bind(ids)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn id_for_code(&self, code: &str) -> anyhow::Result<Option<i64>> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM insta_content WHERE code = $1")
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(id,)| id))
    }

    async fn record_error(&self, code: &str, error_text: &str) -> anyhow::Result<()> {
        sqlx::query("INSERT INTO extraction_errors (code, error_text) VALUES ($1, $2)")
            .bind(code)
            .bind(error_text)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
