use kennelflow_shared::Segment;
use sqlx::PgPool;
use uuid::Uuid;

use super::StoreResult;

#[derive(Clone)]
pub struct SegmentStore {
    pool: PgPool,
}

impl SegmentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, segment_id: Uuid) -> StoreResult<Option<Segment>> {
        let segment = sqlx::query_as::<_, Segment>("SELECT * FROM segments WHERE id = $1")
            .bind(segment_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(segment)
    }

    /// Insert a membership row. Returns false when the record was already
    /// a member; the count is only adjusted on an actual insert.
    pub async fn add_member(
        &self,
        segment_id: Uuid,
        record_type: &str,
        record_id: Uuid,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO segment_members (segment_id, record_type, record_id)
            VALUES ($1, $2, $3)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(segment_id)
        .bind(record_type)
        .bind(record_id)
        .execute(&self.pool)
        .await?;

        let inserted = result.rows_affected() > 0;
        if inserted {
            sqlx::query("UPDATE segments SET member_count = member_count + 1 WHERE id = $1")
                .bind(segment_id)
                .execute(&self.pool)
                .await?;
        }

        Ok(inserted)
    }

    /// Delete a membership row. Returns false when no membership existed.
    pub async fn remove_member(
        &self,
        segment_id: Uuid,
        record_type: &str,
        record_id: Uuid,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM segment_members
            WHERE segment_id = $1 AND record_type = $2 AND record_id = $3
            "#,
        )
        .bind(segment_id)
        .bind(record_type)
        .bind(record_id)
        .execute(&self.pool)
        .await?;

        let removed = result.rows_affected() > 0;
        if removed {
            sqlx::query(
                "UPDATE segments SET member_count = GREATEST(member_count - 1, 0) WHERE id = $1",
            )
            .bind(segment_id)
            .execute(&self.pool)
            .await?;
        }

        Ok(removed)
    }
}
