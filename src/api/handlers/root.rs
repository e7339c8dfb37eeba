use axum::http::StatusCode;
use axum::response::IntoResponse;

/// Undocumented liveness endpoint; returns the service banner.
pub async fn root() -> impl IntoResponse {
    (
        StatusCode::OK,
        concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")),
    )
}
