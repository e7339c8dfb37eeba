//! Shared request pipeline for the entity endpoints.
//!
//! Each write follows the same order: resolve the actor from the token,
//! authorize against the role matrix, apply the change and append the audit
//! rows inside one transaction, then commit. A failed audit append rolls the
//! mutation back with it.

use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use sqlx::PgPool;

use crate::auth::credentials::Actor;
use crate::auth::{AuthState, authenticator};
use crate::authz::{self, EntityAction};
use crate::error::{Error, Result};
use crate::schema::KindDescriptor;
use crate::store::audit;
use crate::store::repository::{self, Entity};

/// Cookie carrying the access token for browser clients.
pub const ACCESS_COOKIE_NAME: &str = "access_token";

/// Pull the access token from the `Authorization: Bearer` header or, failing
/// that, the access cookie.
#[must_use]
pub fn extract_access_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = extract_bearer_token(headers) {
        return Some(token);
    }
    let header = headers.get(axum::http::header::COOKIE)?;
    let value = header.to_str().ok()?;
    for pair in value.split(';') {
        let Some((key, val)) = pair.trim().split_once('=') else {
            continue;
        };
        if key.trim() == ACCESS_COOKIE_NAME {
            return Some(val.trim().to_string());
        }
    }
    None
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

/// Resolve the calling actor or fail with `Unauthorized`.
pub async fn require_actor(
    headers: &HeaderMap,
    state: &AuthState,
    pool: &PgPool,
) -> Result<Actor> {
    let token =
        extract_access_token(headers).ok_or(Error::Unauthorized("missing access token"))?;
    authenticator::resolve_actor(state, pool, &token).await
}

/// Authorize and apply a create, auditing it in the same transaction.
pub async fn create_entity(
    pool: &PgPool,
    descriptor: &KindDescriptor,
    actor: &Actor,
    payload: serde_json::Map<String, serde_json::Value>,
) -> Result<Entity> {
    authz::check_create(actor, descriptor, &payload)?;

    let mut tx = pool
        .begin()
        .await
        .map_err(|err| Error::from_sqlx(err, "begin transaction"))?;

    let entity = repository::create(&mut tx, descriptor, payload, &actor.username).await?;
    audit::record_all(
        &mut tx,
        &actor.username,
        descriptor.kind,
        &entity.id,
        EntityAction::Create.as_str(),
    )
    .await?;

    tx.commit()
        .await
        .map_err(|err| Error::from_sqlx(err, "commit transaction"))?;
    Ok(entity)
}

/// Authorize and apply an update, auditing each changed field.
pub async fn update_entity(
    pool: &PgPool,
    descriptor: &KindDescriptor,
    actor: &Actor,
    id: &str,
    patch: serde_json::Map<String, serde_json::Value>,
) -> Result<Entity> {
    let mut tx = pool
        .begin()
        .await
        .map_err(|err| Error::from_sqlx(err, "begin transaction"))?;

    let current = repository::fetch_for_update(&mut tx, descriptor, id)
        .await?
        .ok_or(Error::NotFound("entity not found"))?;
    authz::check_instance(actor, EntityAction::Update, descriptor, &current)?;

    let (entity, changes) =
        repository::update(&mut tx, descriptor, &current, patch, &actor.username).await?;
    if !changes.is_empty() {
        audit::record_changes(
            &mut tx,
            &actor.username,
            descriptor.kind,
            &entity.id,
            EntityAction::Update.as_str(),
            &changes,
        )
        .await?;
    }

    tx.commit()
        .await
        .map_err(|err| Error::from_sqlx(err, "commit transaction"))?;
    Ok(entity)
}

/// Authorize and apply an archive. Archiving twice is a quiet no-op with no
/// second audit row.
pub async fn archive_entity(
    pool: &PgPool,
    descriptor: &KindDescriptor,
    actor: &Actor,
    id: &str,
) -> Result<Entity> {
    let mut tx = pool
        .begin()
        .await
        .map_err(|err| Error::from_sqlx(err, "begin transaction"))?;

    let current = repository::fetch_for_update(&mut tx, descriptor, id)
        .await?
        .ok_or(Error::NotFound("entity not found"))?;
    authz::check_instance(actor, EntityAction::Archive, descriptor, &current)?;

    let was_active = current.status == repository::EntityStatus::Active;
    let entity = repository::archive(&mut tx, descriptor, &current, &actor.username).await?;
    if was_active {
        audit::record_all(
            &mut tx,
            &actor.username,
            descriptor.kind,
            &entity.id,
            EntityAction::Archive.as_str(),
        )
        .await?;
    }

    tx.commit()
        .await
        .map_err(|err| Error::from_sqlx(err, "commit transaction"))?;
    Ok(entity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with(name: axum::http::HeaderName, value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(name, HeaderValue::from_str(value).expect("header value"));
        headers
    }

    #[test]
    fn bearer_header_wins() {
        let mut headers = headers_with(AUTHORIZATION, "Bearer abc123");
        headers.insert(
            axum::http::header::COOKIE,
            HeaderValue::from_static("access_token=fromcookie"),
        );
        assert_eq!(extract_access_token(&headers).as_deref(), Some("abc123"));
    }

    #[test]
    fn cookie_is_fallback() {
        let headers = headers_with(
            axum::http::header::COOKIE,
            "other=1; access_token=tok; foo=2",
        );
        assert_eq!(extract_access_token(&headers).as_deref(), Some("tok"));
    }

    #[test]
    fn lowercase_bearer_prefix_is_accepted() {
        let headers = headers_with(AUTHORIZATION, "bearer tok");
        assert_eq!(extract_access_token(&headers).as_deref(), Some("tok"));
    }

    #[test]
    fn empty_bearer_is_missing() {
        let headers = headers_with(AUTHORIZATION, "Bearer ");
        assert!(extract_access_token(&headers).is_none());
    }

    #[test]
    fn no_credentials_is_missing() {
        assert!(extract_access_token(&HeaderMap::new()).is_none());
    }
}
