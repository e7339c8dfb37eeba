//! Authentication endpoints: registration, two-step login and logout.
//!
//! Request bodies arrive as JSON or as form-encoded pairs; the content type
//! decides which decoder runs. Tokens travel back both in the body and in an
//! `HttpOnly` cookie so browser clients need no token plumbing.

pub mod types;

use axum::body::Bytes;
use axum::extract::Extension;
use axum::http::header::{CONTENT_TYPE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use serde::de::DeserializeOwned;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::info;

use crate::api::handlers::{valid_email, valid_password, valid_username};
use crate::api::pipeline::{self, ACCESS_COOKIE_NAME};
use crate::auth::credentials::{self, NewActor};
use crate::auth::{AuthState, authenticator};
use crate::authz::Role;
use crate::error::{Error, Result};
use crate::schema;
use types::{
    ChallengeResponse, LoginRequest, OtpRequest, RegisterRequest, RegisterResponse, TokenResponse,
    VerifyOtpRequest,
};

/// Decode a JSON or form-encoded request body.
fn decode_body<T: DeserializeOwned>(headers: &HeaderMap, body: &Bytes) -> Result<T> {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("application/json");

    if content_type.starts_with("application/x-www-form-urlencoded") {
        serde_urlencoded::from_bytes(body)
            .map_err(|err| Error::bad_request(format!("invalid form body: {err}")))
    } else {
        serde_json::from_slice(body)
            .map_err(|err| Error::bad_request(format!("invalid JSON body: {err}")))
    }
}

fn access_cookie(state: &AuthState, token: &str) -> Result<HeaderValue> {
    let ttl_seconds = state.config().token_ttl_seconds();
    let mut cookie =
        format!("{ACCESS_COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={ttl_seconds}");
    if state.config().cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
        .map_err(|err| Error::internal(anyhow::anyhow!("invalid cookie value: {err}")))
}

fn clear_access_cookie(state: &AuthState) -> Result<HeaderValue> {
    let mut cookie = format!("{ACCESS_COOKIE_NAME}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    if state.config().cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
        .map_err(|err| Error::internal(anyhow::anyhow!("invalid cookie value: {err}")))
}

/// Roles with scope over other actors' data. Team-level roles may be
/// self-claimed at registration; these may not.
fn requires_admin_grant(role: Role) -> bool {
    role == Role::Admin || schema::bu_scoped(role)
}

fn token_response(state: &AuthState, issued: &authenticator::IssuedToken) -> TokenResponse {
    TokenResponse {
        token: issued.token.clone(),
        token_type: "Bearer".to_string(),
        expires_in: state.config().token_ttl_seconds(),
        actor_id: issued.actor.actor_id.clone(),
        username: issued.actor.username.clone(),
        role: issued.actor.role.as_str().to_string(),
    }
}

#[utoipa::path(
    post,
    path = "/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = RegisterResponse),
        (status = 400, description = "Invalid registration payload"),
        (status = 403, description = "Role not allowed for this caller"),
        (status = 409, description = "Username or email already taken")
    ),
    tag = "auth"
)]
pub async fn register(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    body: Bytes,
) -> Result<Response> {
    let request: RegisterRequest = decode_body(&headers, &body)?;

    if !valid_username(&request.username) {
        return Err(Error::bad_request("invalid username"));
    }
    if !valid_email(&request.email) {
        return Err(Error::bad_request("invalid email"));
    }
    if !valid_password(&request.password) {
        return Err(Error::bad_request("password is too short"));
    }
    let requested_role = request
        .role
        .as_deref()
        .map(|name| {
            Role::parse(name).ok_or_else(|| Error::bad_request(format!("unknown role: {name}")))
        })
        .transpose()?;

    let hasher = auth_state.hasher();
    let password = request.password.clone();
    let password_hash = tokio::task::spawn_blocking(move || hasher.hash(&password))
        .await
        .map_err(|err| Error::internal(anyhow::anyhow!("password hash task failed: {err}")))??;

    // Count and insert share one transaction behind an advisory lock, so two
    // racing registrations cannot both see an empty table and bootstrap.
    let mut tx = pool
        .begin()
        .await
        .map_err(|err| Error::from_sqlx(err, "begin registration"))?;
    credentials::lock_registration(&mut tx).await?;
    let first_account = credentials::count_actors(&mut tx).await? == 0;

    let role = match requested_role {
        Some(role) => role,
        // The very first account bootstraps the instance.
        None if first_account => Role::Admin,
        None => Role::TeamMember,
    };

    // After bootstrap, Admin and the BU-scoped manager roles are only handed
    // out by an authenticated Admin; anyone else would be able to claim
    // write scope over a whole business unit by registering for it.
    if requires_admin_grant(role) && !first_account {
        let caller = pipeline::require_actor(&headers, &auth_state, &pool).await?;
        if caller.role != Role::Admin {
            return Err(Error::Forbidden(
                "only an Admin may assign privileged roles",
            ));
        }
    }

    let display_name = request
        .display_name
        .unwrap_or_else(|| request.username.clone());
    let actor = credentials::insert_actor(
        &mut tx,
        &NewActor {
            username: request.username,
            display_name,
            email: request.email,
            password_hash,
            role,
            business_unit_id: request.business_unit_id,
        },
    )
    .await?;
    tx.commit()
        .await
        .map_err(|err| Error::from_sqlx(err, "commit registration"))?;

    info!("registered account {} ({})", actor.username, actor.role.as_str());

    let response = RegisterResponse {
        actor_id: actor.actor_id,
        username: actor.username,
        role: actor.role.as_str().to_string(),
    };
    Ok((StatusCode::CREATED, Json(response)).into_response())
}

#[utoipa::path(
    post,
    path = "/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "One-time code dispatched, or token issued in single-step mode"),
        (status = 401, description = "Invalid credentials")
    ),
    tag = "auth"
)]
pub async fn login(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    body: Bytes,
) -> Result<Response> {
    let request: LoginRequest = decode_body(&headers, &body)?;

    match authenticator::login(&auth_state, &pool, &request.username, &request.password).await? {
        authenticator::LoginOutcome::Challenged => {
            let response = ChallengeResponse {
                status: "challenge sent".to_string(),
            };
            Ok((StatusCode::OK, Json(response)).into_response())
        }
        authenticator::LoginOutcome::Token(issued) => {
            let cookie = access_cookie(&auth_state, &issued.token)?;
            let mut response_headers = HeaderMap::new();
            response_headers.insert(SET_COOKIE, cookie);
            let response = token_response(&auth_state, &issued);
            Ok((StatusCode::OK, response_headers, Json(response)).into_response())
        }
    }
}

#[utoipa::path(
    post,
    path = "/request-otp",
    request_body = OtpRequest,
    responses(
        (status = 202, description = "Accepted; a code is dispatched when the login resolves")
    ),
    tag = "auth"
)]
pub async fn request_otp(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    body: Bytes,
) -> Result<Response> {
    let request: OtpRequest = decode_body(&headers, &body)?;
    authenticator::request_otp(&auth_state, &pool, &request.username).await?;
    Ok(StatusCode::ACCEPTED.into_response())
}

#[utoipa::path(
    post,
    path = "/verify-otp",
    request_body = VerifyOtpRequest,
    responses(
        (status = 200, description = "Token issued", body = TokenResponse),
        (status = 401, description = "Invalid or expired code")
    ),
    tag = "auth"
)]
pub async fn verify_otp(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    body: Bytes,
) -> Result<Response> {
    let request: VerifyOtpRequest = decode_body(&headers, &body)?;
    let issued =
        authenticator::verify_otp(&auth_state, &pool, &request.username, &request.code).await?;

    let cookie = access_cookie(&auth_state, &issued.token)?;
    let mut response_headers = HeaderMap::new();
    response_headers.insert(SET_COOKIE, cookie);
    let response = token_response(&auth_state, &issued);
    Ok((StatusCode::OK, response_headers, Json(response)).into_response())
}

#[utoipa::path(
    post,
    path = "/logout",
    responses(
        (status = 204, description = "Access cookie cleared")
    ),
    tag = "auth"
)]
pub async fn logout(auth_state: Extension<Arc<AuthState>>) -> Result<Response> {
    // Tokens are stateless; logout clears the cookie and nothing else.
    let mut response_headers = HeaderMap::new();
    response_headers.insert(SET_COOKIE, clear_access_cookie(&auth_state)?);
    Ok((StatusCode::NO_CONTENT, response_headers).into_response())
}
