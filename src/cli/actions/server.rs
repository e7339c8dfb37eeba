use crate::api;
use crate::auth::otp::ConsoleOtpChannel;
use crate::auth::password::PasswordHasher;
use crate::auth::token::TokenCodec;
use crate::auth::{AuthConfig, AuthState};
use anyhow::{Context, Result};
use secrecy::SecretString;
use std::{sync::Arc, time::Duration};

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub request_timeout_seconds: u64,
    pub token_secret: SecretString,
    pub token_secondary_secrets: Vec<String>,
    pub token_ttl_seconds: i64,
    pub otp_ttl_seconds: u64,
    pub single_step_login: bool,
    pub cookie_secure: bool,
    pub hash_memory_kib: u32,
    pub hash_iterations: u32,
    pub hash_parallelism: u32,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the hasher parameters are invalid or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let hasher = PasswordHasher::new(
        args.hash_memory_kib,
        args.hash_iterations,
        args.hash_parallelism,
    )
    .context("Invalid Argon2 parameters")?;

    let codec = TokenCodec::new(
        &args.token_secret,
        &args.token_secondary_secrets,
        args.token_ttl_seconds,
    );

    let config = AuthConfig::new()
        .with_token_ttl_seconds(args.token_ttl_seconds)
        .with_otp_ttl_seconds(args.otp_ttl_seconds)
        .with_otp_required(!args.single_step_login)
        .with_cookie_secure(args.cookie_secure);

    let auth_state = Arc::new(AuthState::new(
        config,
        codec,
        Arc::new(hasher),
        Arc::new(ConsoleOtpChannel),
    ));

    api::new(
        args.port,
        args.dsn,
        auth_state,
        Duration::from_secs(args.request_timeout_seconds),
    )
    .await
}
