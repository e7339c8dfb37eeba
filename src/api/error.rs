//! HTTP rendering of the core error categories.
//!
//! This is the only place a category maps to a status code. Internal details
//! go to the server log; the response body carries a short `detail` string.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::error;
use utoipa::ToSchema;

use crate::error::Error;

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    pub detail: String,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::BadRequest(_) => StatusCode::BAD_REQUEST,
            Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Error::Forbidden(_) => StatusCode::FORBIDDEN,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Conflict(_) => StatusCode::CONFLICT,
            Error::Timeout(_) => StatusCode::REQUEST_TIMEOUT,
            Error::Internal(err) => {
                error!("internal error: {err:#}");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = ErrorBody {
            detail: self.detail(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_category() {
        let cases = [
            (Error::bad_request("x"), StatusCode::BAD_REQUEST),
            (Error::Unauthorized("x"), StatusCode::UNAUTHORIZED),
            (Error::Forbidden("x"), StatusCode::FORBIDDEN),
            (Error::NotFound("x"), StatusCode::NOT_FOUND),
            (Error::conflict("x"), StatusCode::CONFLICT),
            (Error::Timeout("x"), StatusCode::REQUEST_TIMEOUT),
            (
                Error::internal(anyhow::anyhow!("boom")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }
}
