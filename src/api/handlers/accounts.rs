//! Account administration endpoints.
//!
//! `PUT /v1/accounts/{id}/password-policy` is the administrative path into
//! the policy: it writes the `RequirePasswordChange` selection straight into
//! the account's attribute blob, and the reconciler picks the change up from
//! the store's event feed exactly as it would for any other writer.

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

use super::types::{AccountResponse, CreateAccountRequest, PasswordPolicyRequest};
use super::utils::{normalize_email, valid_email};
use crate::policy::attributes::{ATTRIBUTES_KEY, REQUIRE_PASSWORD_CHANGE, VALUE_NO, VALUE_YES};
use crate::policy::blob::encode_with_selection;
use crate::policy::PolicyContext;
use crate::store::accounts::{create_account, CreateOutcome};

#[utoipa::path(
    post,
    path = "/v1/accounts",
    request_body = CreateAccountRequest,
    responses(
        (status = 201, description = "Account created", body = AccountResponse),
        (status = 400, description = "Validation error", body = String),
        (status = 409, description = "Username or email already taken", body = String)
    ),
    tag = "accounts"
)]
pub async fn create(
    pool: Extension<PgPool>,
    payload: Option<Json<CreateAccountRequest>>,
) -> impl IntoResponse {
    let request: CreateAccountRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return (StatusCode::BAD_REQUEST, "Invalid email".to_string()).into_response();
    }
    let username = request.username.trim();
    if username.is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing username".to_string()).into_response();
    }

    match create_account(&pool, username, &email, &request.password).await {
        Ok(CreateOutcome::Created(account)) => (
            StatusCode::CREATED,
            Json(AccountResponse {
                id: account.id.to_string(),
                username: account.username,
                email: account.email,
            }),
        )
            .into_response(),
        Ok(CreateOutcome::Conflict) => (
            StatusCode::CONFLICT,
            "Username or email already taken".to_string(),
        )
            .into_response(),
        Err(err) => {
            error!("Failed to create account: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Account creation failed".to_string(),
            )
                .into_response()
        }
    }
}

#[utoipa::path(
    put,
    path = "/v1/accounts/{id}/password-policy",
    request_body = PasswordPolicyRequest,
    params(
        ("id" = String, Path, description = "Account identifier")
    ),
    responses(
        (status = 204, description = "Password policy updated"),
        (status = 400, description = "Validation error", body = String),
        (status = 404, description = "Account not found", body = String),
        (status = 500, description = "Update failed", body = String)
    ),
    tag = "accounts"
)]
pub async fn set_password_policy(
    ctx: Extension<Arc<PolicyContext>>,
    Path(id): Path<String>,
    payload: Option<Json<PasswordPolicyRequest>>,
) -> impl IntoResponse {
    let request: PasswordPolicyRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };
    let Ok(account_id) = Uuid::parse_str(id.trim()) else {
        return (StatusCode::BAD_REQUEST, "Invalid account id".to_string()).into_response();
    };

    let account = match ctx.accounts().find_by_id(account_id).await {
        Ok(Some(account)) => account,
        Ok(None) => {
            return (StatusCode::NOT_FOUND, "Account not found".to_string()).into_response()
        }
        Err(err) => {
            error!("Account lookup failed: {err}");
            return update_failed_response();
        }
    };

    let definition = match ctx.definitions().find_by_name(REQUIRE_PASSWORD_CHANGE).await {
        Ok(Some(definition)) => definition,
        Ok(None) => {
            error!("Password-change attribute definition is not provisioned");
            return update_failed_response();
        }
        Err(err) => {
            error!("Definition lookup failed: {err}");
            return update_failed_response();
        }
    };

    let value_name = if request.require_change {
        VALUE_YES
    } else {
        VALUE_NO
    };
    let Some(value) = definition.value_named(value_name) else {
        error!("Password-change attribute is missing its {value_name} value");
        return update_failed_response();
    };

    let blob = match ctx.store().get(account.id, ATTRIBUTES_KEY).await {
        Ok(blob) => blob,
        Err(err) => {
            error!("Attribute blob lookup failed: {err}");
            return update_failed_response();
        }
    };
    let updated = match encode_with_selection(blob.as_deref(), &definition, value) {
        Ok(updated) => updated,
        Err(err) => {
            error!("Failed to encode attribute blob: {err}");
            return update_failed_response();
        }
    };
    if let Err(err) = ctx
        .store()
        .set(account.id, ATTRIBUTES_KEY, Some(updated))
        .await
    {
        error!("Failed to store attribute blob: {err}");
        return update_failed_response();
    }

    // Credential synchronization is the reconciler's job, driven by the
    // change event this write just enqueued.
    StatusCode::NO_CONTENT.into_response()
}

fn update_failed_response() -> axum::response::Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "Password policy update failed".to_string(),
    )
        .into_response()
}
