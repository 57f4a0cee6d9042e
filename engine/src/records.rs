// Typed record repositories
//
// The engine treats business records as opaque field mappings, but every
// record type resolves through an exhaustive match to a concrete table and
// a whitelist of workflow-updatable columns. Record kinds without a
// whitelist can be read (for interpolation and enrollment) but not
// written by update_field.

use kennelflow_shared::RecordKind;
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum RecordError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Record type '{0}' is not mapped to a writable storage model")]
    UnmappedType(String),
    #[error("Unknown field '{field}' for record type '{kind}'")]
    UnknownField { kind: String, field: String },
}

pub type RecordResult<T> = Result<T, RecordError>;

/// Column value classes the dynamic update statement can assign to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnType {
    Text,
    Integer,
    Boolean,
    Date,
}

struct Repository {
    table: &'static str,
    /// Columns a workflow's update_field action may touch. Empty means the
    /// record kind is read-only for workflows.
    updatable: &'static [(&'static str, ColumnType)],
}

fn repository(kind: RecordKind) -> Repository {
    match kind {
        RecordKind::Pet => Repository {
            table: "pets",
            updatable: &[
                ("name", ColumnType::Text),
                ("species", ColumnType::Text),
                ("breed", ColumnType::Text),
                ("status", ColumnType::Text),
                ("notes", ColumnType::Text),
                ("boarding_count", ColumnType::Integer),
                ("special_needs", ColumnType::Boolean),
                ("vaccination_expires_at", ColumnType::Date),
            ],
        },
        RecordKind::Booking => Repository {
            table: "bookings",
            updatable: &[
                ("status", ColumnType::Text),
                ("notes", ColumnType::Text),
                ("kennel_number", ColumnType::Integer),
                ("reminder_count", ColumnType::Integer),
                ("confirmed", ColumnType::Boolean),
            ],
        },
        RecordKind::Owner => Repository {
            table: "owners",
            updatable: &[
                ("status", ColumnType::Text),
                ("notes", ColumnType::Text),
                ("phone", ColumnType::Text),
                ("email", ColumnType::Text),
                ("loyalty_points", ColumnType::Integer),
                ("vip", ColumnType::Boolean),
                ("sms_consent", ColumnType::Boolean),
                ("email_consent", ColumnType::Boolean),
            ],
        },
        RecordKind::Staff => Repository {
            table: "staff",
            updatable: &[],
        },
        RecordKind::Invoice => Repository {
            table: "invoices",
            updatable: &[],
        },
        RecordKind::Payment => Repository {
            table: "payments",
            updatable: &[],
        },
        RecordKind::Task => Repository {
            table: "boarding_tasks",
            updatable: &[],
        },
    }
}

#[derive(Clone)]
pub struct RecordStore {
    pool: PgPool,
}

impl RecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Fetch a record as an opaque JSON object with the `_type`
    /// discriminator injected.
    pub async fn get(
        &self,
        kind: RecordKind,
        tenant_id: Uuid,
        record_id: Uuid,
    ) -> RecordResult<Option<JsonValue>> {
        let repo = repository(kind);

        let query = format!(
            "SELECT to_jsonb(t) FROM {} t WHERE id = $1 AND tenant_id = $2",
            repo.table
        );
        let row: Option<JsonValue> = sqlx::query_scalar(&query)
            .bind(record_id)
            .bind(tenant_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|mut record| {
            if let Some(map) = record.as_object_mut() {
                map.insert("_type".to_string(), JsonValue::String(kind.as_str().to_string()));
            }
            record
        }))
    }

    /// Persist a single field. The column must appear in the kind's
    /// whitelist; the new value is assigned through an explicit cast so
    /// JSON scalars land in typed columns.
    pub async fn update_field(
        &self,
        kind: RecordKind,
        tenant_id: Uuid,
        record_id: Uuid,
        field: &str,
        value: &JsonValue,
    ) -> RecordResult<()> {
        let repo = repository(kind);

        if repo.updatable.is_empty() {
            return Err(RecordError::UnmappedType(kind.as_str().to_string()));
        }

        let column_type = repo
            .updatable
            .iter()
            .find(|(name, _)| *name == field)
            .map(|(_, ty)| *ty)
            .ok_or_else(|| RecordError::UnknownField {
                kind: kind.as_str().to_string(),
                field: field.to_string(),
            })?;

        match scalar_text(value) {
            None => {
                let query = format!(
                    "UPDATE {} SET {} = NULL, updated_at = NOW() WHERE id = $1 AND tenant_id = $2",
                    repo.table, field
                );
                sqlx::query(&query)
                    .bind(record_id)
                    .bind(tenant_id)
                    .execute(&self.pool)
                    .await?;
            }
            Some(text) => {
                let cast = match column_type {
                    ColumnType::Text => "",
                    // Route through numeric so fractional results of
                    // increment/decrement still assign to integer columns.
                    ColumnType::Integer => "::numeric::integer",
                    ColumnType::Boolean => "::boolean",
                    ColumnType::Date => "::date",
                };
                let query = format!(
                    "UPDATE {} SET {} = $3{}, updated_at = NOW() WHERE id = $1 AND tenant_id = $2",
                    repo.table, field, cast
                );
                sqlx::query(&query)
                    .bind(record_id)
                    .bind(tenant_id)
                    .bind(text)
                    .execute(&self.pool)
                    .await?;
            }
        }

        Ok(())
    }
}

/// Render a JSON scalar as the text fed to the cast expression. `None`
/// means SQL NULL.
fn scalar_text(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::Null => None,
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_every_kind_has_a_repository() {
        for kind in [
            RecordKind::Pet,
            RecordKind::Booking,
            RecordKind::Owner,
            RecordKind::Staff,
            RecordKind::Invoice,
            RecordKind::Payment,
            RecordKind::Task,
        ] {
            assert!(!repository(kind).table.is_empty());
        }
    }

    #[test]
    fn test_workflow_operable_kinds_have_whitelists() {
        assert!(!repository(RecordKind::Pet).updatable.is_empty());
        assert!(!repository(RecordKind::Booking).updatable.is_empty());
        assert!(!repository(RecordKind::Owner).updatable.is_empty());
        assert!(repository(RecordKind::Invoice).updatable.is_empty());
    }

    #[test]
    fn test_scalar_text_rendering() {
        assert_eq!(scalar_text(&json!(null)), None);
        assert_eq!(scalar_text(&json!("open")), Some("open".to_string()));
        assert_eq!(scalar_text(&json!(5)), Some("5".to_string()));
        assert_eq!(scalar_text(&json!(true)), Some("true".to_string()));
    }
}
