//! Command-line argument dispatch and server initialization.
//!
//! This module parses validated CLI arguments and maps them to the appropriate
//! action, such as starting the API server with its full configuration state.

use crate::cli::actions::{Action, server::Args};
use crate::cli::commands::{ARG_DSN, ARG_PORT, ARG_REQUEST_TIMEOUT_SECONDS, auth};
use anyhow::{Context, Result};
use secrecy::SecretString;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>(ARG_DSN)
        .cloned()
        .context("missing required argument: --dsn")?;
    let request_timeout_seconds = matches
        .get_one::<u64>(ARG_REQUEST_TIMEOUT_SECONDS)
        .copied()
        .unwrap_or(30);

    let auth_opts = auth::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        dsn,
        request_timeout_seconds,
        token_secret: SecretString::from(auth_opts.token_secret),
        token_secondary_secrets: auth_opts.token_secondary_secrets,
        token_ttl_seconds: auth_opts.token_ttl_seconds,
        otp_ttl_seconds: auth_opts.otp_ttl_seconds,
        single_step_login: auth_opts.single_step_login,
        cookie_secure: auth_opts.cookie_secure,
        hash_memory_kib: auth_opts.hash_memory_kib,
        hash_iterations: auth_opts.hash_iterations,
        hash_parallelism: auth_opts.hash_parallelism,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn token_secret_required() {
        temp_env::with_vars(
            [
                ("CONSEGNA_TOKEN_SECRET", None::<&str>),
                (
                    "CONSEGNA_DSN",
                    Some("postgres://user@localhost:5432/consegna"),
                ),
            ],
            || {
                let command = crate::cli::commands::new();
                let result = command.try_get_matches_from(vec!["consegna"]);
                assert!(result.is_err(), "token secret must be required");
            },
        );
    }

    #[test]
    fn handler_builds_server_args() {
        temp_env::with_vars([("CONSEGNA_SINGLE_STEP_LOGIN", None::<String>)], || {
            let command = crate::cli::commands::new();
            let matches = command.get_matches_from(vec![
                "consegna",
                "--dsn",
                "postgres://user@localhost:5432/consegna",
                "--token-secret",
                "signing-secret",
                "--token-ttl-seconds",
                "900",
                "--single-step-login",
            ]);

            let action = handler(&matches).expect("server action");
            let Action::Server(args) = action;
            assert_eq!(args.port, 8080);
            assert_eq!(args.dsn, "postgres://user@localhost:5432/consegna");
            assert_eq!(args.token_secret.expose_secret(), "signing-secret");
            assert_eq!(args.token_ttl_seconds, 900);
            assert!(args.single_step_login);
            assert!(!args.cookie_secure);
            assert_eq!(args.request_timeout_seconds, 30);
        });
    }
}
