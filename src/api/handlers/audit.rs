//! Read-only audit journal endpoints, Admin only.

use axum::extract::{Extension, Path, Query};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;
use sqlx::PgPool;
use std::sync::Arc;
use utoipa::IntoParams;

use crate::api::pipeline;
use crate::auth::AuthState;
use crate::authz::Role;
use crate::error::{Error, Result};
use crate::store::audit;

const DEFAULT_PAGE_SIZE: i64 = 100;
const MAX_PAGE_SIZE: i64 = 500;

#[derive(Debug, Deserialize, IntoParams)]
pub struct AuditListParams {
    /// Restrict to one entity kind (canonical name, e.g. `Task`).
    pub kind: Option<String>,
    /// Restrict to one entity id.
    pub entity_id: Option<String>,
    /// Page size, at least 1; values above 500 are clamped.
    pub limit: Option<i64>,
    /// Rows to skip.
    pub offset: Option<i64>,
}

async fn require_admin(
    headers: &HeaderMap,
    state: &AuthState,
    pool: &PgPool,
) -> Result<()> {
    let actor = pipeline::require_actor(headers, state, pool).await?;
    if actor.role != Role::Admin {
        return Err(Error::Forbidden("audit journal is Admin only"));
    }
    Ok(())
}

#[utoipa::path(
    get,
    path = "/api/Audit",
    params(AuditListParams),
    responses(
        (status = 200, description = "Newest-first audit rows", body = [audit::AuditEntry]),
        (status = 403, description = "Caller is not an Admin")
    ),
    tag = "audit"
)]
pub async fn list_audit(
    Query(params): Query<AuditListParams>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> Result<Response> {
    require_admin(&headers, &auth_state, &pool).await?;

    let limit = params.limit.unwrap_or(DEFAULT_PAGE_SIZE);
    if limit < 1 {
        return Err(Error::bad_request("limit must be at least 1"));
    }
    let limit = limit.min(MAX_PAGE_SIZE);
    let offset = params.offset.unwrap_or(0);
    if offset < 0 {
        return Err(Error::bad_request("offset must not be negative"));
    }

    let entries = audit::list(
        &pool,
        params.kind.as_deref(),
        params.entity_id.as_deref(),
        limit,
        offset,
    )
    .await?;
    Ok((StatusCode::OK, Json(entries)).into_response())
}

#[utoipa::path(
    get,
    path = "/api/Audit/{audit_id}",
    params(("audit_id" = String, Path, description = "Audit row id")),
    responses(
        (status = 200, description = "Single audit row", body = audit::AuditEntry),
        (status = 403, description = "Caller is not an Admin"),
        (status = 404, description = "No such audit row")
    ),
    tag = "audit"
)]
pub async fn get_audit(
    Path(audit_id): Path<String>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> Result<Response> {
    require_admin(&headers, &auth_state, &pool).await?;

    let entry = audit::get(&pool, &audit_id)
        .await?
        .ok_or(Error::NotFound("audit row not found"))?;
    Ok((StatusCode::OK, Json(entry)).into_response())
}
