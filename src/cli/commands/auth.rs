//! Token, OTP and password-hashing arguments.

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, Command};

use crate::auth::password;

pub const ARG_TOKEN_SECRET: &str = "token-secret";
pub const ARG_TOKEN_SECONDARY_SECRETS: &str = "token-secondary-secrets";
pub const ARG_TOKEN_TTL_SECONDS: &str = "token-ttl-seconds";
pub const ARG_OTP_TTL_SECONDS: &str = "otp-ttl-seconds";
pub const ARG_SINGLE_STEP_LOGIN: &str = "single-step-login";
pub const ARG_COOKIE_SECURE: &str = "cookie-secure";
pub const ARG_HASH_MEMORY_KIB: &str = "hash-memory-kib";
pub const ARG_HASH_ITERATIONS: &str = "hash-iterations";
pub const ARG_HASH_PARALLELISM: &str = "hash-parallelism";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_TOKEN_SECRET)
                .long(ARG_TOKEN_SECRET)
                .help("Secret used to sign session tokens")
                .env("CONSEGNA_TOKEN_SECRET")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_TOKEN_SECONDARY_SECRETS)
                .long(ARG_TOKEN_SECONDARY_SECRETS)
                .help("Previous signing secrets still accepted for verification (comma separated)")
                .env("CONSEGNA_TOKEN_SECONDARY_SECRETS")
                .hide_env_values(true)
                .value_delimiter(','),
        )
        .arg(
            Arg::new(ARG_TOKEN_TTL_SECONDS)
                .long(ARG_TOKEN_TTL_SECONDS)
                .help("Session token lifetime in seconds")
                .env("CONSEGNA_TOKEN_TTL_SECONDS")
                .default_value("3600")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_OTP_TTL_SECONDS)
                .long(ARG_OTP_TTL_SECONDS)
                .help("One-time code lifetime in seconds")
                .env("CONSEGNA_OTP_TTL_SECONDS")
                .default_value("300")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_SINGLE_STEP_LOGIN)
                .long(ARG_SINGLE_STEP_LOGIN)
                .help("Skip the one-time code step and issue tokens directly on login")
                .env("CONSEGNA_SINGLE_STEP_LOGIN")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new(ARG_COOKIE_SECURE)
                .long(ARG_COOKIE_SECURE)
                .help("Mark the access cookie Secure (HTTPS deployments)")
                .env("CONSEGNA_COOKIE_SECURE")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new(ARG_HASH_MEMORY_KIB)
                .long(ARG_HASH_MEMORY_KIB)
                .help("Argon2id memory cost in KiB")
                .env("CONSEGNA_HASH_MEMORY_KIB")
                .default_value("65536")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new(ARG_HASH_ITERATIONS)
                .long(ARG_HASH_ITERATIONS)
                .help("Argon2id iteration count")
                .env("CONSEGNA_HASH_ITERATIONS")
                .default_value("3")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new(ARG_HASH_PARALLELISM)
                .long(ARG_HASH_PARALLELISM)
                .help("Argon2id parallelism degree")
                .env("CONSEGNA_HASH_PARALLELISM")
                .default_value("1")
                .value_parser(clap::value_parser!(u32)),
        )
}

#[derive(Debug)]
pub struct Options {
    pub token_secret: String,
    pub token_secondary_secrets: Vec<String>,
    pub token_ttl_seconds: i64,
    pub otp_ttl_seconds: u64,
    pub single_step_login: bool,
    pub cookie_secure: bool,
    pub hash_memory_kib: u32,
    pub hash_iterations: u32,
    pub hash_parallelism: u32,
}

impl Options {
    /// Extract the auth options from parsed matches.
    ///
    /// # Errors
    /// Returns an error when a required argument is absent.
    pub fn parse(matches: &clap::ArgMatches) -> Result<Self> {
        Ok(Self {
            token_secret: matches
                .get_one::<String>(ARG_TOKEN_SECRET)
                .cloned()
                .context("missing required argument: --token-secret")?,
            token_secondary_secrets: matches
                .get_many::<String>(ARG_TOKEN_SECONDARY_SECRETS)
                .map(|values| values.cloned().collect())
                .unwrap_or_default(),
            token_ttl_seconds: matches
                .get_one::<i64>(ARG_TOKEN_TTL_SECONDS)
                .copied()
                .unwrap_or(3600),
            otp_ttl_seconds: matches
                .get_one::<u64>(ARG_OTP_TTL_SECONDS)
                .copied()
                .unwrap_or(300),
            single_step_login: matches.get_flag(ARG_SINGLE_STEP_LOGIN),
            cookie_secure: matches.get_flag(ARG_COOKIE_SECURE),
            hash_memory_kib: matches
                .get_one::<u32>(ARG_HASH_MEMORY_KIB)
                .copied()
                .unwrap_or(password::DEFAULT_MEMORY_KIB),
            hash_iterations: matches
                .get_one::<u32>(ARG_HASH_ITERATIONS)
                .copied()
                .unwrap_or(password::DEFAULT_ITERATIONS),
            hash_parallelism: matches
                .get_one::<u32>(ARG_HASH_PARALLELISM)
                .copied()
                .unwrap_or(password::DEFAULT_PARALLELISM),
        })
    }
}
