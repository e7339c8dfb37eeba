//! Typed error categories for the request path.
//!
//! The core only ever reports one of these categories; the HTTP adapter in
//! `api::error` is the single place where a category becomes a status code.
//! Persistence failures are classified once, at the repository boundary, via
//! [`Error::from_sqlx`].

use std::fmt;

/// SQLSTATE class for unique constraint violations.
const SQLSTATE_UNIQUE_VIOLATION: &str = "23505";
/// SQLSTATE class for foreign key violations.
const SQLSTATE_FOREIGN_KEY_VIOLATION: &str = "23503";

/// Single generic message for authentication failures. Never reveal which
/// side of the credential check failed.
pub const INVALID_CREDENTIALS: &str = "invalid credentials";

#[derive(Debug)]
pub enum Error {
    /// Schema or validation failure; the message names the offending field.
    BadRequest(String),
    /// Missing or invalid token/credentials.
    Unauthorized(&'static str),
    /// Authenticated but not allowed for this (role, action, kind).
    Forbidden(&'static str),
    /// Entity or route target does not exist.
    NotFound(&'static str),
    /// Uniqueness/FK violation or mutation of an archived entity.
    Conflict(String),
    /// Per-request deadline exceeded.
    Timeout(&'static str),
    /// Persistence or unexpected failure; details stay in the server log.
    Internal(anyhow::Error),
}

impl Error {
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    #[must_use]
    pub fn internal(err: impl Into<anyhow::Error>) -> Self {
        Self::Internal(err.into())
    }

    /// Classify a database error into a transport-level category.
    ///
    /// Constraint violations become `Conflict`, missing rows `NotFound`, and
    /// everything else `Internal` tagged with the failing operation.
    #[must_use]
    pub fn from_sqlx(err: sqlx::Error, operation: &'static str) -> Self {
        match &err {
            sqlx::Error::RowNotFound => Self::NotFound("entity not found"),
            sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
                Some(SQLSTATE_UNIQUE_VIOLATION) => {
                    Self::Conflict(format!("{operation}: already exists"))
                }
                Some(SQLSTATE_FOREIGN_KEY_VIOLATION) => {
                    Self::Conflict(format!("{operation}: referenced entity is missing"))
                }
                _ => Self::Internal(anyhow::Error::new(err).context(operation)),
            },
            _ => Self::Internal(anyhow::Error::new(err).context(operation)),
        }
    }

    /// Short, non-leaking message for the response body.
    #[must_use]
    pub fn detail(&self) -> String {
        match self {
            Self::BadRequest(message) | Self::Conflict(message) => message.clone(),
            Self::Unauthorized(message)
            | Self::Forbidden(message)
            | Self::NotFound(message)
            | Self::Timeout(message) => (*message).to_string(),
            Self::Internal(_) => "internal server error".to_string(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Internal(err) => write!(f, "internal: {err}"),
            other => write!(f, "{}", other.detail()),
        }
    }
}

impl std::error::Error for Error {}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::error::{DatabaseError, ErrorKind};
    use std::borrow::Cow;
    use std::error::Error as StdError;
    use std::fmt;

    #[derive(Debug)]
    struct TestDbError {
        code: Option<&'static str>,
    }

    impl fmt::Display for TestDbError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "test database error")
        }
    }

    impl StdError for TestDbError {}

    impl DatabaseError for TestDbError {
        fn message(&self) -> &'static str {
            "test database error"
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            self.code.map(Cow::Borrowed)
        }

        fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn StdError + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            ErrorKind::Other
        }
    }

    fn db_error(code: &'static str) -> sqlx::Error {
        sqlx::Error::Database(Box::new(TestDbError { code: Some(code) }))
    }

    #[test]
    fn unique_violation_maps_to_conflict() {
        let err = Error::from_sqlx(db_error("23505"), "insert entity");
        assert!(matches!(err, Error::Conflict(_)));
        assert!(err.detail().contains("insert entity"));
    }

    #[test]
    fn foreign_key_violation_maps_to_conflict() {
        let err = Error::from_sqlx(db_error("23503"), "insert entity");
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[test]
    fn row_not_found_maps_to_not_found() {
        let err = Error::from_sqlx(sqlx::Error::RowNotFound, "fetch entity");
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn operational_error_maps_to_internal() {
        let err = Error::from_sqlx(sqlx::Error::PoolClosed, "fetch entity");
        assert!(matches!(err, Error::Internal(_)));
    }

    #[test]
    fn internal_detail_does_not_leak() {
        let err = Error::internal(anyhow::anyhow!("connection refused at 10.0.0.5"));
        assert_eq!(err.detail(), "internal server error");
    }

    #[test]
    fn bad_request_detail_names_field() {
        let err = Error::bad_request("unknown field: priority");
        assert_eq!(err.detail(), "unknown field: priority");
    }
}
