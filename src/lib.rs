//! # Consegna (Delivery Tracking Back Office)
//!
//! `consegna` is a back-office delivery tracking service. It exposes a uniform
//! CRUD surface over business units, projects, deliverables, tasks, issues and
//! related master data, with an access-control and audit core governing every
//! mutating request.
//!
//! ## Authentication
//!
//! Login is a two-step flow: password verification (Argon2id) followed by a
//! one-time 6-digit code delivered through a pluggable channel. Successful
//! verification issues a signed bearer token (`Authorization` header or
//! `access_token` cookie). The OTP step can be collapsed to single-step login
//! by configuration.
//!
//! ## Authorization & Audit
//!
//! Every actor carries one of eight fixed roles. A single role/ownership
//! matrix decides create/read/update/archive per entity kind; handlers never
//! inspect role strings themselves. Every accepted mutation appends audit
//! records in the same database transaction as the change, so an observable
//! state change always has a matching audit trail.
//!
//! ## Entity Model
//!
//! Entities are soft-deleted only: `Active -> Archived`, never back. Archived
//! entities are excluded from default listings and refuse further mutation.

pub mod api;
pub mod auth;
pub mod authz;
pub mod cli;
pub mod error;
pub mod schema;
pub mod store;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(
            GIT_COMMIT_HASH.len() >= 7,
            "GIT_COMMIT_HASH should be at least 7 characters long, got: {GIT_COMMIT_HASH}"
        );
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
