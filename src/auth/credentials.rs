//! Actor credential storage.
//!
//! Actors are the people who sign in: employees, managers and the
//! administrator. Lookups address the `actors` table only; entity rows keep
//! their own provenance columns and never join back here.

use sqlx::{PgConnection, PgPool, Row};
use tracing::{Instrument, info_span};
use ulid::Ulid;

use crate::authz::Role;
use crate::error::{Error, Result};

/// Lifecycle of an actor account. Archived actors keep their rows for audit
/// provenance but can no longer sign in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActorStatus {
    Active,
    Archived,
}

impl ActorStatus {
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

#[derive(Clone, Debug)]
pub struct Actor {
    pub actor_id: String,
    pub username: String,
    pub display_name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub business_unit_id: Option<String>,
    pub status: ActorStatus,
}

/// Input for account creation; the id and status are assigned by the store.
#[derive(Clone, Debug)]
pub struct NewActor {
    pub username: String,
    pub display_name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub business_unit_id: Option<String>,
}

fn actor_from_row(row: &sqlx::postgres::PgRow) -> Result<Actor> {
    let role_raw: String = row
        .try_get("role")
        .map_err(|err| Error::from_sqlx(err, "read actor row"))?;
    let role = Role::parse(&role_raw)
        .ok_or_else(|| Error::internal(anyhow::anyhow!("unknown role in actors table: {role_raw}")))?;
    let status_raw: String = row
        .try_get("status")
        .map_err(|err| Error::from_sqlx(err, "read actor row"))?;

    Ok(Actor {
        actor_id: row
            .try_get("actor_id")
            .map_err(|err| Error::from_sqlx(err, "read actor row"))?,
        username: row
            .try_get("username")
            .map_err(|err| Error::from_sqlx(err, "read actor row"))?,
        display_name: row
            .try_get("display_name")
            .map_err(|err| Error::from_sqlx(err, "read actor row"))?,
        email: row
            .try_get("email")
            .map_err(|err| Error::from_sqlx(err, "read actor row"))?,
        password_hash: row
            .try_get("password_hash")
            .map_err(|err| Error::from_sqlx(err, "read actor row"))?,
        role,
        business_unit_id: row
            .try_get("business_unit_id")
            .map_err(|err| Error::from_sqlx(err, "read actor row"))?,
        status: ActorStatus::parse(&status_raw),
    })
}

/// Find an active actor by username or email. Archived accounts are invisible
/// to the login path.
pub async fn find_by_login(pool: &PgPool, login: &str) -> Result<Option<Actor>> {
    let query = "SELECT actor_id, username, display_name, email, password_hash, role, \
                 business_unit_id, status \
                 FROM actors WHERE (username = $1 OR email = $1) AND status = 'active'";

    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );

    let row = sqlx::query(query)
        .bind(login)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .map_err(|err| Error::from_sqlx(err, "find actor by login"))?;

    row.as_ref().map(actor_from_row).transpose()
}

/// Find an actor by id regardless of status; callers decide whether an
/// archived account is acceptable.
pub async fn find_by_id(pool: &PgPool, actor_id: &str) -> Result<Option<Actor>> {
    let query = "SELECT actor_id, username, display_name, email, password_hash, role, \
                 business_unit_id, status \
                 FROM actors WHERE actor_id = $1";

    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );

    let row = sqlx::query(query)
        .bind(actor_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .map_err(|err| Error::from_sqlx(err, "find actor by id"))?;

    row.as_ref().map(actor_from_row).transpose()
}

/// Advisory lock key guarding registration; arbitrary but stable
/// ("consegna" as ASCII bytes).
const REGISTRATION_LOCK_KEY: i64 = 0x636f_6e73_6567_6e61;

const LOCK_REGISTRATION_SQL: &str = "SELECT pg_advisory_xact_lock($1)";

/// Serialize registrations within the calling transaction, so at most one
/// caller can observe an empty actors table and claim the bootstrap Admin
/// role. The lock releases with the transaction.
pub async fn lock_registration(conn: &mut PgConnection) -> Result<()> {
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = LOCK_REGISTRATION_SQL
    );

    sqlx::query(LOCK_REGISTRATION_SQL)
        .bind(REGISTRATION_LOCK_KEY)
        .execute(conn)
        .instrument(span)
        .await
        .map_err(|err| Error::from_sqlx(err, "lock registration"))?;
    Ok(())
}

/// Total number of actor rows, archived ones included. Zero means the
/// service is unclaimed and the first registration may take the Admin role.
pub async fn count_actors(conn: &mut PgConnection) -> Result<i64> {
    let query = "SELECT COUNT(*) FROM actors";

    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );

    sqlx::query_scalar(query)
        .fetch_one(conn)
        .instrument(span)
        .await
        .map_err(|err| Error::from_sqlx(err, "count actors"))
}

/// Insert a new active actor, assigning a ULID id. Duplicate username or
/// email surfaces as `Conflict` via the unique constraints.
pub async fn insert_actor(conn: &mut PgConnection, new_actor: &NewActor) -> Result<Actor> {
    let actor_id = Ulid::new().to_string();

    let query = "INSERT INTO actors \
                 (actor_id, username, display_name, email, password_hash, role, \
                  business_unit_id, status) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, 'active')";

    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );

    sqlx::query(query)
        .bind(&actor_id)
        .bind(&new_actor.username)
        .bind(&new_actor.display_name)
        .bind(&new_actor.email)
        .bind(&new_actor.password_hash)
        .bind(new_actor.role.as_str())
        .bind(&new_actor.business_unit_id)
        .execute(conn)
        .instrument(span)
        .await
        .map_err(|err| Error::from_sqlx(err, "insert actor"))?;

    Ok(Actor {
        actor_id,
        username: new_actor.username.clone(),
        display_name: new_actor.display_name.clone(),
        email: new_actor.email.clone(),
        password_hash: new_actor.password_hash.clone(),
        role: new_actor.role,
        business_unit_id: new_actor.business_unit_id.clone(),
        status: ActorStatus::Active,
    })
}
