//! Request/response bodies for the authentication endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub username: String,
    /// Defaults to the username.
    #[serde(default)]
    pub display_name: Option<String>,
    pub email: String,
    pub password: String,
    /// Defaults to Admin for the first account, Team Member afterwards.
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub business_unit_id: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RegisterResponse {
    pub actor_id: String,
    pub username: String,
    pub role: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    /// Username or email.
    #[serde(alias = "login")]
    pub username: String,
    pub password: String,
}

/// Password accepted, one-time code dispatched out of band.
#[derive(Debug, Serialize, ToSchema)]
pub struct ChallengeResponse {
    pub status: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct OtpRequest {
    #[serde(alias = "login")]
    pub username: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct VerifyOtpRequest {
    #[serde(alias = "login")]
    pub username: String,
    pub code: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TokenResponse {
    pub token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub actor_id: String,
    pub username: String,
    pub role: String,
}
