//! Append-only audit journal.
//!
//! Every successful mutation leaves one row per changed field, written in the
//! same transaction as the mutation itself so the journal can never drift
//! from the data. Creates and archives summarize as a single `ALL` row.
//! Nothing in the service deletes or rewrites journal rows.

use serde::Serialize;
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Row};
use tracing::{Instrument, info_span};
use ulid::Ulid;
use utoipa::ToSchema;

use crate::error::{Error, Result};
use crate::store::ISO_UTC;
use crate::store::repository::ChangedField;

/// Marker field for whole-entity actions (create, archive).
pub const FIELD_ALL: &str = "ALL";

#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct AuditEntry {
    pub audit_id: String,
    pub occurred_at: String,
    pub actor: String,
    pub entity_kind: String,
    pub entity_id: String,
    pub action: String,
    pub field: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

const INSERT_ROW: &str = "INSERT INTO audit_log \
    (audit_id, actor, entity_kind, entity_id, action, field, old_value, new_value) \
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)";

async fn insert_row(
    conn: &mut PgConnection,
    actor: &str,
    entity_kind: &str,
    entity_id: &str,
    action: &str,
    field: &str,
    old_value: Option<&str>,
    new_value: Option<&str>,
) -> Result<()> {
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = INSERT_ROW
    );

    sqlx::query(INSERT_ROW)
        .bind(Ulid::new().to_string())
        .bind(actor)
        .bind(entity_kind)
        .bind(entity_id)
        .bind(action)
        .bind(field)
        .bind(old_value)
        .bind(new_value)
        .execute(conn)
        .instrument(span)
        .await
        .map_err(|err| Error::from_sqlx(err, "append audit row"))?;
    Ok(())
}

/// Record a whole-entity action as a single `ALL` row.
pub async fn record_all(
    conn: &mut PgConnection,
    actor: &str,
    entity_kind: &str,
    entity_id: &str,
    action: &str,
) -> Result<()> {
    insert_row(conn, actor, entity_kind, entity_id, action, FIELD_ALL, None, None).await
}

/// Record one row per changed field.
pub async fn record_changes(
    conn: &mut PgConnection,
    actor: &str,
    entity_kind: &str,
    entity_id: &str,
    action: &str,
    changes: &[ChangedField],
) -> Result<()> {
    for change in changes {
        insert_row(
            conn,
            actor,
            entity_kind,
            entity_id,
            action,
            &change.field,
            change.old.as_deref(),
            change.new.as_deref(),
        )
        .await?;
    }
    Ok(())
}

fn entry_from_row(row: &PgRow) -> Result<AuditEntry> {
    Ok(AuditEntry {
        audit_id: row
            .try_get("audit_id")
            .map_err(|err| Error::from_sqlx(err, "read audit row"))?,
        occurred_at: row
            .try_get("occurred_at")
            .map_err(|err| Error::from_sqlx(err, "read audit row"))?,
        actor: row
            .try_get("actor")
            .map_err(|err| Error::from_sqlx(err, "read audit row"))?,
        entity_kind: row
            .try_get("entity_kind")
            .map_err(|err| Error::from_sqlx(err, "read audit row"))?,
        entity_id: row
            .try_get("entity_id")
            .map_err(|err| Error::from_sqlx(err, "read audit row"))?,
        action: row
            .try_get("action")
            .map_err(|err| Error::from_sqlx(err, "read audit row"))?,
        field: row
            .try_get("field")
            .map_err(|err| Error::from_sqlx(err, "read audit row"))?,
        old_value: row
            .try_get("old_value")
            .map_err(|err| Error::from_sqlx(err, "read audit row"))?,
        new_value: row
            .try_get("new_value")
            .map_err(|err| Error::from_sqlx(err, "read audit row"))?,
    })
}

/// Newest-first page of the journal, optionally filtered by entity kind
/// and/or entity id.
pub async fn list(
    pool: &PgPool,
    entity_kind: Option<&str>,
    entity_id: Option<&str>,
    limit: i64,
    offset: i64,
) -> Result<Vec<AuditEntry>> {
    let query = format!(
        "SELECT audit_id, to_char(occurred_at AT TIME ZONE 'UTC', '{ISO_UTC}') AS occurred_at, \
         actor, entity_kind, entity_id, action, field, old_value, new_value \
         FROM audit_log \
         WHERE ($1::TEXT IS NULL OR entity_kind = $1) \
         AND ($2::TEXT IS NULL OR entity_id = $2) \
         ORDER BY occurred_at DESC, audit_id DESC LIMIT $3 OFFSET $4"
    );

    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = %query
    );

    let rows = sqlx::query(&query)
        .bind(entity_kind)
        .bind(entity_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .instrument(span)
        .await
        .map_err(|err| Error::from_sqlx(err, "list audit rows"))?;

    rows.iter().map(entry_from_row).collect()
}

/// Fetch a single journal row by id.
pub async fn get(pool: &PgPool, audit_id: &str) -> Result<Option<AuditEntry>> {
    let query = format!(
        "SELECT audit_id, to_char(occurred_at AT TIME ZONE 'UTC', '{ISO_UTC}') AS occurred_at, \
         actor, entity_kind, entity_id, action, field, old_value, new_value \
         FROM audit_log WHERE audit_id = $1"
    );

    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = %query
    );

    let row = sqlx::query(&query)
        .bind(audit_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .map_err(|err| Error::from_sqlx(err, "fetch audit row"))?;

    row.as_ref().map(entry_from_row).transpose()
}
