//! Generic entity repository.
//!
//! One table per registered kind, all with the same shape: the public id, a
//! JSONB payload validated against the kind descriptor, the owning business
//! unit, lifecycle status and provenance columns. Handlers never write SQL;
//! they go through these functions with a descriptor in hand.
//!
//! Table and field names interpolated into statements come exclusively from
//! the static registry, never from request input.

use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Row};
use tracing::{Instrument, info_span};
use ulid::Ulid;

use crate::authz::ListScope;
use crate::error::{Error, Result};
use crate::schema::{self, FieldKind, KindDescriptor};
use crate::store::ISO_UTC;

/// Lifecycle of an entity row. Archived rows stay in place for audit history
/// but are invisible to reads and refuse further mutation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntityStatus {
    Active,
    Archived,
}

impl EntityStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Archived => "archived",
        }
    }

    fn parse(value: &str) -> Self {
        if value == "archived" {
            Self::Archived
        } else {
            Self::Active
        }
    }
}

/// A stored entity of any registered kind.
#[derive(Clone, Debug)]
pub struct Entity {
    pub id: String,
    pub kind: &'static str,
    pub owner_bu_id: Option<String>,
    pub payload: serde_json::Map<String, serde_json::Value>,
    pub status: EntityStatus,
    pub created_at: String,
    pub created_by: String,
    pub updated_at: String,
    pub updated_by: String,
}

impl Entity {
    /// Render the API document: payload fields plus the id under the kind's
    /// id field and the audit columns.
    #[must_use]
    pub fn document(&self, descriptor: &KindDescriptor) -> serde_json::Value {
        let mut doc = self.payload.clone();
        doc.insert(
            descriptor.id_field.to_string(),
            serde_json::Value::String(self.id.clone()),
        );
        doc.insert(
            "entity_status".to_string(),
            serde_json::Value::String(self.status.as_str().to_string()),
        );
        doc.insert(
            "created_at".to_string(),
            serde_json::Value::String(self.created_at.clone()),
        );
        doc.insert(
            "created_by".to_string(),
            serde_json::Value::String(self.created_by.clone()),
        );
        doc.insert(
            "updated_at".to_string(),
            serde_json::Value::String(self.updated_at.clone()),
        );
        doc.insert(
            "updated_by".to_string(),
            serde_json::Value::String(self.updated_by.clone()),
        );
        serde_json::Value::Object(doc)
    }
}

/// One field-level difference recorded by an update.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChangedField {
    pub field: String,
    pub old: Option<String>,
    pub new: Option<String>,
}

fn field_type_ok(kind: FieldKind, value: &serde_json::Value) -> bool {
    match kind {
        FieldKind::Text => value.is_string() || value.is_null(),
        FieldKind::Number => value.is_number() || value.is_null(),
    }
}

fn type_name(kind: FieldKind) -> &'static str {
    match kind {
        FieldKind::Text => "a string",
        FieldKind::Number => "a number",
    }
}

fn check_known_fields(
    descriptor: &KindDescriptor,
    payload: &serde_json::Map<String, serde_json::Value>,
) -> Result<()> {
    for (name, value) in payload {
        let Some(field) = descriptor.field(name) else {
            return Err(Error::bad_request(format!("unknown field: {name}")));
        };
        if !field_type_ok(field.kind, value) {
            return Err(Error::bad_request(format!(
                "field {name} must be {}",
                type_name(field.kind)
            )));
        }
    }
    Ok(())
}

fn is_blank(value: Option<&serde_json::Value>) -> bool {
    match value {
        None | Some(serde_json::Value::Null) => true,
        Some(serde_json::Value::String(s)) => s.trim().is_empty(),
        Some(_) => false,
    }
}

/// Validate a full create payload: only registered fields, correct JSON
/// types, and every required field present and non-blank.
pub fn validate_create(
    descriptor: &KindDescriptor,
    payload: &serde_json::Map<String, serde_json::Value>,
) -> Result<()> {
    check_known_fields(descriptor, payload)?;
    for field in descriptor.fields {
        if field.required && is_blank(payload.get(field.name)) {
            return Err(Error::bad_request(format!(
                "missing required field: {}",
                field.name
            )));
        }
    }
    Ok(())
}

/// Validate an update patch. The id field is immutable and required fields
/// may not be blanked out; fields absent from the patch are left alone.
pub fn validate_patch(
    descriptor: &KindDescriptor,
    patch: &serde_json::Map<String, serde_json::Value>,
) -> Result<()> {
    check_known_fields(descriptor, patch)?;
    if patch.contains_key(descriptor.id_field) {
        return Err(Error::bad_request(format!(
            "field {} is immutable",
            descriptor.id_field
        )));
    }
    for field in descriptor.fields {
        if field.required && patch.contains_key(field.name) && is_blank(patch.get(field.name)) {
            return Err(Error::bad_request(format!(
                "required field {} cannot be cleared",
                field.name
            )));
        }
    }
    Ok(())
}

/// Merge a patch into a payload. Explicit nulls clear the field.
#[must_use]
pub fn apply_patch(
    payload: &serde_json::Map<String, serde_json::Value>,
    patch: &serde_json::Map<String, serde_json::Value>,
) -> serde_json::Map<String, serde_json::Value> {
    let mut merged = payload.clone();
    for (name, value) in patch {
        if value.is_null() {
            merged.remove(name);
        } else {
            merged.insert(name.clone(), value.clone());
        }
    }
    merged
}

fn value_text(value: Option<&serde_json::Value>) -> Option<String> {
    match value {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => Some(s.clone()),
        Some(other) => Some(other.to_string()),
    }
}

/// Field-level differences a patch introduces against the current payload.
/// Fields whose value is unchanged produce nothing.
#[must_use]
pub fn diff_changes(
    payload: &serde_json::Map<String, serde_json::Value>,
    patch: &serde_json::Map<String, serde_json::Value>,
) -> Vec<ChangedField> {
    let mut changes = Vec::new();
    for (name, value) in patch {
        let old = value_text(payload.get(name));
        let new = value_text(Some(value));
        if old != new {
            changes.push(ChangedField {
                field: name.clone(),
                old,
                new,
            });
        }
    }
    changes
}

fn select_columns() -> String {
    format!(
        "id, payload, owner_bu_id, entity_status, \
         to_char(created_at AT TIME ZONE 'UTC', '{ISO_UTC}') AS created_at, created_by, \
         to_char(updated_at AT TIME ZONE 'UTC', '{ISO_UTC}') AS updated_at, updated_by"
    )
}

fn entity_from_row(descriptor: &KindDescriptor, row: &PgRow) -> Result<Entity> {
    let payload: serde_json::Value = row
        .try_get("payload")
        .map_err(|err| Error::from_sqlx(err, "read entity row"))?;
    let payload = match payload {
        serde_json::Value::Object(map) => map,
        _ => {
            return Err(Error::internal(anyhow::anyhow!(
                "non-object payload in {}",
                descriptor.table
            )));
        }
    };
    let status_raw: String = row
        .try_get("entity_status")
        .map_err(|err| Error::from_sqlx(err, "read entity row"))?;

    Ok(Entity {
        id: row
            .try_get("id")
            .map_err(|err| Error::from_sqlx(err, "read entity row"))?,
        kind: descriptor.kind,
        owner_bu_id: row
            .try_get("owner_bu_id")
            .map_err(|err| Error::from_sqlx(err, "read entity row"))?,
        payload,
        status: EntityStatus::parse(&status_raw),
        created_at: row
            .try_get("created_at")
            .map_err(|err| Error::from_sqlx(err, "read entity row"))?,
        created_by: row
            .try_get("created_by")
            .map_err(|err| Error::from_sqlx(err, "read entity row"))?,
        updated_at: row
            .try_get("updated_at")
            .map_err(|err| Error::from_sqlx(err, "read entity row"))?,
        updated_by: row
            .try_get("updated_by")
            .map_err(|err| Error::from_sqlx(err, "read entity row"))?,
    })
}

/// Point read. Archived rows are reported as absent.
pub async fn get(pool: &PgPool, descriptor: &KindDescriptor, id: &str) -> Result<Option<Entity>> {
    let query = format!(
        "SELECT {columns} FROM {table} WHERE id = $1 AND entity_status = 'active'",
        columns = select_columns(),
        table = descriptor.table
    );

    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = %query
    );

    let row = sqlx::query(&query)
        .bind(id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .map_err(|err| Error::from_sqlx(err, "fetch entity"))?;

    row.as_ref().map(|r| entity_from_row(descriptor, r)).transpose()
}

/// Collection read filtered to the actor's visible scope, ordered by id.
pub async fn list(
    pool: &PgPool,
    descriptor: &KindDescriptor,
    scope: &ListScope,
    limit: i64,
    offset: i64,
) -> Result<Vec<Entity>> {
    let columns = select_columns();
    let table = descriptor.table;

    let (query, scope_bind) = match scope {
        ListScope::All => (
            format!(
                "SELECT {columns} FROM {table} WHERE entity_status = 'active' \
                 ORDER BY id LIMIT $1 OFFSET $2"
            ),
            None,
        ),
        ListScope::BusinessUnit(bu) => (
            format!(
                "SELECT {columns} FROM {table} WHERE entity_status = 'active' \
                 AND owner_bu_id = $1 ORDER BY id LIMIT $2 OFFSET $3"
            ),
            Some(bu.clone()),
        ),
        ListScope::Actor {
            username,
            owner_field,
        } => {
            let filter = match owner_field {
                Some(field) => {
                    format!("(created_by = $1 OR payload->>'{field}' = $1)")
                }
                None => "created_by = $1".to_string(),
            };
            (
                format!(
                    "SELECT {columns} FROM {table} WHERE entity_status = 'active' \
                     AND {filter} ORDER BY id LIMIT $2 OFFSET $3"
                ),
                Some(username.clone()),
            )
        }
    };

    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = %query
    );

    let mut stmt = sqlx::query(&query);
    if let Some(bind) = &scope_bind {
        stmt = stmt.bind(bind);
    }
    let rows = stmt
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .instrument(span)
        .await
        .map_err(|err| Error::from_sqlx(err, "list entities"))?;

    rows.iter()
        .map(|row| entity_from_row(descriptor, row))
        .collect()
}

/// Lock and fetch a row inside a transaction, archived rows included.
pub async fn fetch_for_update(
    conn: &mut PgConnection,
    descriptor: &KindDescriptor,
    id: &str,
) -> Result<Option<Entity>> {
    let query = format!(
        "SELECT {columns} FROM {table} WHERE id = $1 FOR UPDATE",
        columns = select_columns(),
        table = descriptor.table
    );

    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = %query
    );

    let row = sqlx::query(&query)
        .bind(id)
        .fetch_optional(conn)
        .instrument(span)
        .await
        .map_err(|err| Error::from_sqlx(err, "lock entity"))?;

    row.as_ref().map(|r| entity_from_row(descriptor, r)).transpose()
}

/// Every parent reference present in the payload must resolve to a live row.
async fn check_parents(
    conn: &mut PgConnection,
    descriptor: &KindDescriptor,
    payload: &serde_json::Map<String, serde_json::Value>,
    changed_only: Option<&serde_json::Map<String, serde_json::Value>>,
) -> Result<()> {
    for parent in descriptor.parents {
        if let Some(changed) = changed_only {
            if !changed.contains_key(parent.field) {
                continue;
            }
        }
        let Some(reference) = payload.get(parent.field).and_then(|v| v.as_str()) else {
            continue;
        };
        let parent_descriptor = schema::registry()
            .iter()
            .find(|candidate| candidate.kind == parent.kind)
            .ok_or_else(|| {
                Error::internal(anyhow::anyhow!("unregistered parent kind {}", parent.kind))
            })?;

        let query = format!(
            "SELECT entity_status FROM {table} WHERE id = $1",
            table = parent_descriptor.table
        );

        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = %query
        );

        let status: Option<String> = sqlx::query_scalar(&query)
            .bind(reference)
            .fetch_optional(&mut *conn)
            .instrument(span)
            .await
            .map_err(|err| Error::from_sqlx(err, "check parent reference"))?;

        match status.as_deref() {
            Some("active") => {}
            Some(_) => {
                return Err(Error::conflict(format!(
                    "{}: referenced {} is archived",
                    parent.field, parent.kind
                )));
            }
            None => {
                return Err(Error::conflict(format!(
                    "{}: referenced {} does not exist",
                    parent.field, parent.kind
                )));
            }
        }
    }
    Ok(())
}

/// Owning business unit for a row. A kind whose owner field is its own id
/// (business units) is its own scope; the payload no longer carries the id
/// column, so it is taken from the row id directly.
fn owner_bu(
    descriptor: &KindDescriptor,
    id: &str,
    payload: &serde_json::Map<String, serde_json::Value>,
) -> Option<String> {
    match descriptor.owner_bu_field {
        Some(field) if field == descriptor.id_field => Some(id.to_string()),
        Some(field) => payload
            .get(field)
            .and_then(|value| value.as_str())
            .map(str::to_string),
        None => None,
    }
}

/// Insert a new entity. The public id comes from the payload when supplied
/// (duplicates surface as `Conflict`) and is generated otherwise.
pub async fn create(
    conn: &mut PgConnection,
    descriptor: &KindDescriptor,
    mut payload: serde_json::Map<String, serde_json::Value>,
    actor_username: &str,
) -> Result<Entity> {
    validate_create(descriptor, &payload)?;
    check_parents(&mut *conn, descriptor, &payload, None).await?;

    let id = match payload.get(descriptor.id_field).and_then(|v| v.as_str()) {
        Some(given) if !given.trim().is_empty() => given.to_string(),
        _ => Ulid::new().to_string(),
    };
    // The id lives in its own column; keep the payload free of it.
    payload.remove(descriptor.id_field);

    let owner_bu_id = owner_bu(descriptor, &id, &payload);

    let query = format!(
        "INSERT INTO {table} (id, payload, owner_bu_id, entity_status, created_by, updated_by) \
         VALUES ($1, $2, $3, 'active', $4, $4) \
         RETURNING to_char(created_at AT TIME ZONE 'UTC', '{ISO_UTC}') AS created_at, \
                   to_char(updated_at AT TIME ZONE 'UTC', '{ISO_UTC}') AS updated_at",
        table = descriptor.table
    );

    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = %query
    );

    let row = sqlx::query(&query)
        .bind(&id)
        .bind(serde_json::Value::Object(payload.clone()))
        .bind(&owner_bu_id)
        .bind(actor_username)
        .fetch_one(conn)
        .instrument(span)
        .await
        .map_err(|err| Error::from_sqlx(err, "insert entity"))?;

    let created_at: String = row
        .try_get("created_at")
        .map_err(|err| Error::from_sqlx(err, "insert entity"))?;
    let updated_at: String = row
        .try_get("updated_at")
        .map_err(|err| Error::from_sqlx(err, "insert entity"))?;

    Ok(Entity {
        id,
        kind: descriptor.kind,
        owner_bu_id,
        payload,
        status: EntityStatus::Active,
        created_at,
        created_by: actor_username.to_string(),
        updated_at,
        updated_by: actor_username.to_string(),
    })
}

/// Apply a validated patch to a locked entity. Returns the updated entity and
/// the field-level changes for the audit journal.
///
/// # Errors
/// `Conflict` when the entity is archived.
pub async fn update(
    conn: &mut PgConnection,
    descriptor: &KindDescriptor,
    current: &Entity,
    patch: serde_json::Map<String, serde_json::Value>,
    actor_username: &str,
) -> Result<(Entity, Vec<ChangedField>)> {
    validate_patch(descriptor, &patch)?;
    if current.status == EntityStatus::Archived {
        return Err(Error::conflict("cannot modify an archived entity"));
    }

    let merged = apply_patch(&current.payload, &patch);
    let changes = diff_changes(&current.payload, &patch);
    check_parents(&mut *conn, descriptor, &merged, Some(&patch)).await?;
    let owner_bu_id = owner_bu(descriptor, &current.id, &merged);

    let query = format!(
        "UPDATE {table} SET payload = $1, owner_bu_id = $2, updated_at = NOW(), updated_by = $3 \
         WHERE id = $4 \
         RETURNING to_char(updated_at AT TIME ZONE 'UTC', '{ISO_UTC}') AS updated_at",
        table = descriptor.table
    );

    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = %query
    );

    let row = sqlx::query(&query)
        .bind(serde_json::Value::Object(merged.clone()))
        .bind(&owner_bu_id)
        .bind(actor_username)
        .bind(&current.id)
        .fetch_one(conn)
        .instrument(span)
        .await
        .map_err(|err| Error::from_sqlx(err, "update entity"))?;

    let updated_at: String = row
        .try_get("updated_at")
        .map_err(|err| Error::from_sqlx(err, "update entity"))?;

    Ok((
        Entity {
            id: current.id.clone(),
            kind: descriptor.kind,
            owner_bu_id,
            payload: merged,
            status: EntityStatus::Active,
            created_at: current.created_at.clone(),
            created_by: current.created_by.clone(),
            updated_at,
            updated_by: actor_username.to_string(),
        },
        changes,
    ))
}

/// Mark a locked entity archived. Archiving an archived entity is a no-op
/// that leaves the row, its timestamps included, untouched.
pub async fn archive(
    conn: &mut PgConnection,
    descriptor: &KindDescriptor,
    current: &Entity,
    actor_username: &str,
) -> Result<Entity> {
    if current.status == EntityStatus::Archived {
        return Ok(current.clone());
    }

    let query = format!(
        "UPDATE {table} SET entity_status = 'archived', updated_at = NOW(), updated_by = $1 \
         WHERE id = $2 \
         RETURNING to_char(updated_at AT TIME ZONE 'UTC', '{ISO_UTC}') AS updated_at",
        table = descriptor.table
    );

    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = %query
    );

    let row = sqlx::query(&query)
        .bind(actor_username)
        .bind(&current.id)
        .fetch_one(conn)
        .instrument(span)
        .await
        .map_err(|err| Error::from_sqlx(err, "archive entity"))?;

    let updated_at: String = row
        .try_get("updated_at")
        .map_err(|err| Error::from_sqlx(err, "archive entity"))?;

    Ok(Entity {
        status: EntityStatus::Archived,
        updated_at,
        updated_by: actor_username.to_string(),
        ..current.clone()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::lookup;
    use serde_json::json;

    fn object(value: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
        value.as_object().cloned().expect("object")
    }

    #[test]
    fn create_rejects_unknown_field() {
        let descriptor = lookup("Projects").expect("registered");
        let payload = object(json!({"project_name": "X", "business_unit_id": "BU1", "color": "red"}));
        let err = validate_create(descriptor, &payload).expect_err("unknown field");
        assert!(err.detail().contains("color"));
    }

    #[test]
    fn create_rejects_wrong_type() {
        let descriptor = lookup("Tasks").expect("registered");
        let payload = object(json!({
            "task_name": "T",
            "project_id": "P1",
            "planned_hours": "eight"
        }));
        let err = validate_create(descriptor, &payload).expect_err("wrong type");
        assert!(err.detail().contains("planned_hours"));
    }

    #[test]
    fn create_rejects_missing_required_field() {
        let descriptor = lookup("Projects").expect("registered");
        let payload = object(json!({"business_unit_id": "BU1"}));
        let err = validate_create(descriptor, &payload).expect_err("missing");
        assert!(err.detail().contains("project_name"));
    }

    #[test]
    fn create_rejects_blank_required_field() {
        let descriptor = lookup("Projects").expect("registered");
        let payload = object(json!({"project_name": "   ", "business_unit_id": "BU1"}));
        assert!(validate_create(descriptor, &payload).is_err());
    }

    #[test]
    fn patch_rejects_id_field() {
        let descriptor = lookup("Projects").expect("registered");
        let patch = object(json!({"project_id": "P2"}));
        let err = validate_patch(descriptor, &patch).expect_err("immutable");
        assert!(err.detail().contains("immutable"));
    }

    #[test]
    fn patch_rejects_clearing_required_field() {
        let descriptor = lookup("Projects").expect("registered");
        let patch = object(json!({"project_name": null}));
        assert!(validate_patch(descriptor, &patch).is_err());
    }

    #[test]
    fn patch_allows_partial_payload() {
        let descriptor = lookup("Projects").expect("registered");
        let patch = object(json!({"client_name": "ACME"}));
        assert!(validate_patch(descriptor, &patch).is_ok());
    }

    #[test]
    fn apply_patch_merges_and_clears() {
        let payload = object(json!({"a": "1", "b": "2"}));
        let patch = object(json!({"b": null, "c": "3"}));
        let merged = apply_patch(&payload, &patch);
        assert_eq!(merged.get("a").and_then(|v| v.as_str()), Some("1"));
        assert!(!merged.contains_key("b"));
        assert_eq!(merged.get("c").and_then(|v| v.as_str()), Some("3"));
    }

    #[test]
    fn diff_skips_unchanged_fields() {
        let payload = object(json!({"client_name": "ACME", "description": "old"}));
        let patch = object(json!({"client_name": "ACME", "description": "new"}));
        let changes = diff_changes(&payload, &patch);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].field, "description");
        assert_eq!(changes[0].old.as_deref(), Some("old"));
        assert_eq!(changes[0].new.as_deref(), Some("new"));
    }

    #[test]
    fn diff_records_set_and_cleared_fields() {
        let payload = object(json!({"description": "old"}));
        let patch = object(json!({"description": null, "client_name": "ACME"}));
        let mut changes = diff_changes(&payload, &patch);
        changes.sort_by(|a, b| a.field.cmp(&b.field));
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].field, "client_name");
        assert_eq!(changes[0].old, None);
        assert_eq!(changes[1].field, "description");
        assert_eq!(changes[1].new, None);
    }

    #[test]
    fn document_carries_id_and_audit_columns() {
        let descriptor = lookup("Projects").expect("registered");
        let entity = Entity {
            id: "P1".to_string(),
            kind: "Project",
            owner_bu_id: Some("BU1".to_string()),
            payload: object(json!({"project_name": "X", "business_unit_id": "BU1"})),
            status: EntityStatus::Active,
            created_at: "2026-01-01T00:00:00Z".to_string(),
            created_by: "alice".to_string(),
            updated_at: "2026-01-02T00:00:00Z".to_string(),
            updated_by: "bob".to_string(),
        };
        let doc = entity.document(descriptor);
        assert_eq!(doc["project_id"], "P1");
        assert_eq!(doc["project_name"], "X");
        assert_eq!(doc["entity_status"], "active");
        assert_eq!(doc["created_by"], "alice");
        assert_eq!(doc["updated_at"], "2026-01-02T00:00:00Z");
    }
}
