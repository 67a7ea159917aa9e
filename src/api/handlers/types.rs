//! Request/response types for the HTTP surface.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(ToSchema, Deserialize, Debug)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub username: Option<String>,
    #[schema(value_type = String)]
    pub password: SecretString,
    #[serde(rename = "returnUrl")]
    pub return_url: Option<String>,
}

/// Returned for every completed authentication, whether it came from a
/// normal login or from recovery confirmation.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginResponse {
    pub session_token: String,
    #[serde(rename = "returnUrl", skip_serializing_if = "Option::is_none")]
    pub return_url: Option<String>,
}

#[derive(ToSchema, Deserialize, Debug)]
pub struct RecoveryConfirmRequest {
    pub token: String,
    pub email: String,
    #[schema(value_type = String)]
    pub new_password: SecretString,
    #[serde(rename = "returnUrl")]
    pub return_url: Option<String>,
}

#[derive(ToSchema, Deserialize, Debug)]
pub struct CreateAccountRequest {
    pub username: String,
    pub email: String,
    #[schema(value_type = String)]
    pub password: SecretString,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct AccountResponse {
    pub id: String,
    pub username: String,
    pub email: String,
}

#[derive(ToSchema, Deserialize, Debug)]
pub struct PasswordPolicyRequest {
    pub require_change: bool,
}
