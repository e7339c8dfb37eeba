//! Persistence layer: schema bootstrap, the generic entity repository and the
//! append-only audit journal.

pub mod audit;
pub mod repository;

use sqlx::PgPool;
use tracing::{Instrument, debug, info_span};

use crate::error::{Error, Result};
use crate::schema;

/// Render ISO-8601 UTC with a trailing `Z`, the only timestamp format the
/// API emits.
pub(crate) const ISO_UTC: &str = "YYYY-MM-DD\"T\"HH24:MI:SS\"Z\"";

const CREATE_ACTORS: &str = "CREATE TABLE IF NOT EXISTS actors (\
    actor_id TEXT PRIMARY KEY, \
    username TEXT NOT NULL UNIQUE, \
    display_name TEXT NOT NULL, \
    email TEXT NOT NULL, \
    password_hash TEXT NOT NULL, \
    role TEXT NOT NULL, \
    business_unit_id TEXT, \
    status TEXT NOT NULL DEFAULT 'active', \
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(), \
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW())";

// Partial so an archived account does not hold its email hostage.
const CREATE_ACTORS_EMAIL_INDEX: &str = "CREATE UNIQUE INDEX IF NOT EXISTS \
    actors_active_email ON actors (email) WHERE status = 'active'";

const CREATE_AUDIT_LOG: &str = "CREATE TABLE IF NOT EXISTS audit_log (\
    audit_id TEXT PRIMARY KEY, \
    occurred_at TIMESTAMPTZ NOT NULL DEFAULT NOW(), \
    actor TEXT NOT NULL, \
    entity_kind TEXT NOT NULL, \
    entity_id TEXT NOT NULL, \
    action TEXT NOT NULL, \
    field TEXT NOT NULL, \
    old_value TEXT, \
    new_value TEXT)";

/// Create all tables that are missing. Every statement is idempotent, so the
/// bootstrap is safe to run on each start.
///
/// # Errors
/// `Internal` when any DDL statement fails.
pub async fn ensure_schema(pool: &PgPool) -> Result<()> {
    run_ddl(pool, CREATE_ACTORS).await?;
    run_ddl(pool, CREATE_ACTORS_EMAIL_INDEX).await?;
    run_ddl(pool, CREATE_AUDIT_LOG).await?;

    for descriptor in schema::registry() {
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {table} (\
             id TEXT PRIMARY KEY, \
             payload JSONB NOT NULL, \
             owner_bu_id TEXT, \
             entity_status TEXT NOT NULL DEFAULT 'active', \
             created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(), \
             created_by TEXT NOT NULL, \
             updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(), \
             updated_by TEXT NOT NULL)",
            table = descriptor.table
        );
        run_ddl(pool, &ddl).await?;
    }

    debug!("database schema is up to date");
    Ok(())
}

async fn run_ddl(pool: &PgPool, ddl: &str) -> Result<()> {
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "CREATE",
        db.statement = ddl
    );

    sqlx::query(ddl)
        .execute(pool)
        .instrument(span)
        .await
        .map_err(|err| Error::from_sqlx(err, "bootstrap schema"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn archived_actor_frees_its_email() {
        // Email uniqueness only applies to active rows; the table-level
        // constraint must not re-impose it.
        assert!(CREATE_ACTORS_EMAIL_INDEX.contains("WHERE status = 'active'"));
        assert!(!CREATE_ACTORS.contains("email TEXT NOT NULL UNIQUE"));
    }

    #[test]
    fn actor_rows_track_updates() {
        assert!(CREATE_ACTORS.contains("updated_at TIMESTAMPTZ"));
    }
}
