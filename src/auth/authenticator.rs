//! Login, OTP verification and token-based actor resolution.
//!
//! Every credential failure in this module collapses into the same
//! `Unauthorized(INVALID_CREDENTIALS)` so responses never reveal whether a
//! login exists, is archived, or has a different password.

use sqlx::PgPool;
use tracing::{debug, error};

use crate::auth::AuthState;
use crate::auth::credentials::{self, Actor, ActorStatus};
use crate::error::{Error, INVALID_CREDENTIALS, Result};

/// A freshly issued session token and the actor it belongs to.
pub struct IssuedToken {
    pub token: String,
    pub actor: Actor,
}

/// Result of a password check: either a pending OTP challenge or, when the
/// service runs single-step, a token right away.
pub enum LoginOutcome {
    Challenged,
    Token(IssuedToken),
}

/// Verify a password and either issue an OTP challenge or a token.
///
/// # Errors
/// `Unauthorized(INVALID_CREDENTIALS)` for any unknown login, archived
/// account, or password mismatch.
pub async fn login(
    state: &AuthState,
    pool: &PgPool,
    login: &str,
    password: &str,
) -> Result<LoginOutcome> {
    let Some(actor) = credentials::find_by_login(pool, login).await? else {
        debug!("login attempt for unknown account");
        return Err(Error::Unauthorized(INVALID_CREDENTIALS));
    };

    let hasher = state.hasher();
    let digest = actor.password_hash.clone();
    let candidate = password.to_string();
    let verified = tokio::task::spawn_blocking(move || hasher.verify(&candidate, &digest))
        .await
        .map_err(|err| Error::internal(anyhow::anyhow!("password verify task failed: {err}")))??;

    if !verified {
        debug!("password mismatch for {}", actor.username);
        return Err(Error::Unauthorized(INVALID_CREDENTIALS));
    }

    if !state.config().otp_required() {
        let token = state.codec().encode(&actor.actor_id)?;
        return Ok(LoginOutcome::Token(IssuedToken { token, actor }));
    }

    let code = state.otp().issue(&actor.username).await;
    state.channel().dispatch(&actor.username, &code);
    Ok(LoginOutcome::Challenged)
}

/// Re-issue an OTP challenge for an existing login.
///
/// Always returns `Ok` so the endpoint cannot be used to probe which
/// accounts exist; a code is only dispatched when the login resolves.
pub async fn request_otp(state: &AuthState, pool: &PgPool, login: &str) -> Result<()> {
    if let Some(actor) = credentials::find_by_login(pool, login).await? {
        let code = state.otp().issue(&actor.username).await;
        state.channel().dispatch(&actor.username, &code);
    } else {
        debug!("otp requested for unknown account");
    }
    Ok(())
}

/// Redeem an OTP challenge for a session token.
///
/// # Errors
/// `Unauthorized(INVALID_CREDENTIALS)` when the code is wrong, expired,
/// already used, or the account vanished between challenge and redemption.
pub async fn verify_otp(
    state: &AuthState,
    pool: &PgPool,
    login: &str,
    code: &str,
) -> Result<IssuedToken> {
    let Some(actor) = credentials::find_by_login(pool, login).await? else {
        return Err(Error::Unauthorized(INVALID_CREDENTIALS));
    };

    if !state.otp().consume(&actor.username, code).await {
        return Err(Error::Unauthorized(INVALID_CREDENTIALS));
    }

    let token = state.codec().encode(&actor.actor_id)?;
    Ok(IssuedToken { token, actor })
}

/// Resolve a bearer token to its actor, rejecting archived accounts.
///
/// # Errors
/// `Unauthorized` for bad tokens and for tokens whose actor no longer
/// resolves to an active account.
pub async fn resolve_actor(state: &AuthState, pool: &PgPool, token: &str) -> Result<Actor> {
    let actor_id = state.codec().decode(token)?;

    let Some(actor) = credentials::find_by_id(pool, &actor_id).await? else {
        error!("valid token for missing actor {actor_id}");
        return Err(Error::Unauthorized("invalid or expired token"));
    };

    if actor.status != ActorStatus::Active {
        return Err(Error::Unauthorized("invalid or expired token"));
    }

    Ok(actor)
}
