//! Generic CRUD handlers for every registered entity kind.
//!
//! The kind arrives as a path segment and resolves against the schema
//! registry; an unknown kind is a plain 404 before any authentication work.
//! All mutations run through the shared pipeline so authorization and audit
//! behave identically for every kind.

use axum::body::Bytes;
use axum::extract::{Extension, Path, Query};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;
use sqlx::PgPool;
use std::sync::Arc;
use utoipa::IntoParams;

use crate::api::pipeline;
use crate::auth::AuthState;
use crate::authz;
use crate::error::{Error, Result};
use crate::schema::{self, KindDescriptor};
use crate::store::repository;

const DEFAULT_PAGE_SIZE: i64 = 100;
const MAX_PAGE_SIZE: i64 = 500;

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListParams {
    /// Page size, at least 1; values above 500 are clamped.
    pub limit: Option<i64>,
    /// Rows to skip.
    pub offset: Option<i64>,
}

impl ListParams {
    fn resolve(&self) -> Result<(i64, i64)> {
        let limit = self.limit.unwrap_or(DEFAULT_PAGE_SIZE);
        if limit < 1 {
            return Err(Error::bad_request("limit must be at least 1"));
        }
        let limit = limit.min(MAX_PAGE_SIZE);
        let offset = self.offset.unwrap_or(0);
        if offset < 0 {
            return Err(Error::bad_request("offset must not be negative"));
        }
        Ok((limit, offset))
    }
}

fn resolve_kind(kind: &str) -> Result<&'static KindDescriptor> {
    schema::lookup(kind).ok_or(Error::NotFound("unknown entity kind"))
}

fn decode_object(body: &Bytes) -> Result<serde_json::Map<String, serde_json::Value>> {
    let value: serde_json::Value = serde_json::from_slice(body)
        .map_err(|err| Error::bad_request(format!("invalid JSON body: {err}")))?;
    match value {
        serde_json::Value::Object(map) => Ok(map),
        _ => Err(Error::bad_request("request body must be a JSON object")),
    }
}

#[utoipa::path(
    post,
    path = "/api/{kind}",
    params(("kind" = String, Path, description = "Entity kind, e.g. Projects or Tasks")),
    request_body(content_type = "application/json"),
    responses(
        (status = 201, description = "Entity created"),
        (status = 400, description = "Payload failed schema validation"),
        (status = 403, description = "Role may not create this kind"),
        (status = 409, description = "Duplicate id or missing parent reference")
    ),
    tag = "entities"
)]
pub async fn create_entity(
    Path(kind): Path<String>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    body: Bytes,
) -> Result<Response> {
    let descriptor = resolve_kind(&kind)?;
    let actor = pipeline::require_actor(&headers, &auth_state, &pool).await?;
    let payload = decode_object(&body)?;

    let entity = pipeline::create_entity(&pool, descriptor, &actor, payload).await?;
    Ok((StatusCode::CREATED, Json(entity.document(descriptor))).into_response())
}

#[utoipa::path(
    get,
    path = "/api/{kind}",
    params(
        ("kind" = String, Path, description = "Entity kind"),
        ListParams
    ),
    responses(
        (status = 200, description = "Entities visible to the caller"),
        (status = 401, description = "Missing or invalid token")
    ),
    tag = "entities"
)]
pub async fn list_entities(
    Path(kind): Path<String>,
    Query(params): Query<ListParams>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> Result<Response> {
    let descriptor = resolve_kind(&kind)?;
    let actor = pipeline::require_actor(&headers, &auth_state, &pool).await?;
    let (limit, offset) = params.resolve()?;

    let scope = authz::list_scope(&actor, descriptor)?;
    let entities = repository::list(&pool, descriptor, &scope, limit, offset).await?;

    let items: Vec<serde_json::Value> = entities
        .iter()
        .map(|entity| entity.document(descriptor))
        .collect();
    Ok((StatusCode::OK, Json(items)).into_response())
}

#[utoipa::path(
    get,
    path = "/api/{kind}/{id}",
    params(
        ("kind" = String, Path, description = "Entity kind"),
        ("id" = String, Path, description = "Entity id")
    ),
    responses(
        (status = 200, description = "Entity document"),
        (status = 404, description = "Entity missing, archived, or not visible")
    ),
    tag = "entities"
)]
pub async fn get_entity(
    Path((kind, id)): Path<(String, String)>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> Result<Response> {
    let descriptor = resolve_kind(&kind)?;
    let actor = pipeline::require_actor(&headers, &auth_state, &pool).await?;

    let entity = repository::get(&pool, descriptor, &id)
        .await?
        .ok_or(Error::NotFound("entity not found"))?;
    // An entity outside the caller's scope reads as missing.
    if !authz::can_view(&actor, descriptor, &entity) {
        return Err(Error::NotFound("entity not found"));
    }

    Ok((StatusCode::OK, Json(entity.document(descriptor))).into_response())
}

#[utoipa::path(
    put,
    path = "/api/{kind}/{id}",
    params(
        ("kind" = String, Path, description = "Entity kind"),
        ("id" = String, Path, description = "Entity id")
    ),
    request_body(content_type = "application/json"),
    responses(
        (status = 200, description = "Entity updated"),
        (status = 400, description = "Patch failed schema validation"),
        (status = 403, description = "Ownership check failed"),
        (status = 404, description = "No such entity"),
        (status = 409, description = "Entity is archived or a parent reference is dead")
    ),
    tag = "entities"
)]
pub async fn update_entity(
    Path((kind, id)): Path<(String, String)>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    body: Bytes,
) -> Result<Response> {
    let descriptor = resolve_kind(&kind)?;
    let actor = pipeline::require_actor(&headers, &auth_state, &pool).await?;
    let patch = decode_object(&body)?;

    let entity = pipeline::update_entity(&pool, descriptor, &actor, &id, patch).await?;
    Ok((StatusCode::OK, Json(entity.document(descriptor))).into_response())
}

#[utoipa::path(
    patch,
    path = "/api/{kind}/{id}/archive",
    params(
        ("kind" = String, Path, description = "Entity kind"),
        ("id" = String, Path, description = "Entity id")
    ),
    responses(
        (status = 200, description = "Entity archived (idempotent)"),
        (status = 403, description = "Role or ownership check failed"),
        (status = 404, description = "No such entity")
    ),
    tag = "entities"
)]
pub async fn archive_entity(
    Path((kind, id)): Path<(String, String)>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> Result<Response> {
    let descriptor = resolve_kind(&kind)?;
    let actor = pipeline::require_actor(&headers, &auth_state, &pool).await?;

    let entity = pipeline::archive_entity(&pool, descriptor, &actor, &id).await?;
    Ok((StatusCode::OK, Json(entity.document(descriptor))).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_kind_is_not_found() {
        assert!(matches!(resolve_kind("Widgets"), Err(Error::NotFound(_))));
        assert!(resolve_kind("Projects").is_ok());
    }

    #[test]
    fn list_params_defaults() {
        let params = ListParams {
            limit: None,
            offset: None,
        };
        assert_eq!(params.resolve().expect("defaults"), (100, 0));
    }

    #[test]
    fn list_params_clamps_oversized_limit() {
        let too_big = ListParams {
            limit: Some(10_000),
            offset: Some(20),
        };
        assert_eq!(too_big.resolve().expect("clamped"), (500, 20));
    }

    #[test]
    fn list_params_rejects_out_of_range() {
        let zero = ListParams {
            limit: Some(0),
            offset: None,
        };
        assert!(zero.resolve().is_err());

        let negative = ListParams {
            limit: None,
            offset: Some(-1),
        };
        assert!(negative.resolve().is_err());
    }

    #[test]
    fn body_must_be_an_object() {
        let array = Bytes::from_static(b"[1, 2]");
        assert!(matches!(decode_object(&array), Err(Error::BadRequest(_))));

        let object = Bytes::from_static(b"{\"task_name\": \"T\"}");
        assert!(decode_object(&object).is_ok());
    }
}
