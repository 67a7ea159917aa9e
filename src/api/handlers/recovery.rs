//! Password-recovery confirmation endpoint.
//!
//! The base action validates the recovery token and stores the new password
//! hash; the interceptor then rewrites the `RequirePasswordChange` flag to
//! `No` and signs the caller in, so a successful confirmation is
//! indistinguishable from a normal login.

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{error, warn};

use super::types::{LoginResponse, RecoveryConfirmRequest};
use super::utils::{normalize_email, recovery_token_expired, valid_email};
use crate::policy::attributes::{RECOVERY_TOKEN_DATE_KEY, RECOVERY_TOKEN_KEY};
use crate::policy::recovery::{
    intercept_recovery_confirm, RecoveryConfirmation, RecoveryDecision, RecoveryOutcome,
};
use crate::policy::PolicyContext;
use crate::store::accounts::set_password;

#[utoipa::path(
    post,
    path = "/v1/auth/password-recovery/confirm",
    request_body = RecoveryConfirmRequest,
    responses(
        (status = 200, description = "Password changed and caller authenticated", body = LoginResponse),
        (status = 400, description = "Invalid or expired recovery token", body = String),
        (status = 500, description = "Password recovery failed", body = String)
    ),
    tag = "auth"
)]
pub async fn password_recovery_confirm(
    pool: Extension<PgPool>,
    ctx: Extension<Arc<PolicyContext>>,
    payload: Option<Json<RecoveryConfirmRequest>>,
) -> impl IntoResponse {
    let request: RecoveryConfirmRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return (StatusCode::BAD_REQUEST, "Invalid email".to_string()).into_response();
    }
    let submitted_token = request.token.trim();
    if submitted_token.is_empty() {
        return invalid_token_response();
    }

    // Base action: resolve the account and validate its stored token. Every
    // failure gets the same generic answer to avoid account probing.
    let account = match ctx.accounts().find_by_email(&email).await {
        Ok(Some(account)) => account,
        Ok(None) => return invalid_token_response(),
        Err(err) => {
            error!("Account lookup failed: {err}");
            return recovery_failed_response();
        }
    };

    let stored_token = match ctx.store().get(account.id, RECOVERY_TOKEN_KEY).await {
        Ok(token) => token.filter(|token| !token.trim().is_empty()),
        Err(err) => {
            error!("Recovery token lookup failed: {err}");
            return recovery_failed_response();
        }
    };
    let Some(stored_token) = stored_token else {
        return invalid_token_response();
    };
    if stored_token != submitted_token {
        return invalid_token_response();
    }

    // An absent generated-at date marks a durable policy token; a present
    // one is an ordinary recovery token and must still be fresh.
    match ctx.store().get(account.id, RECOVERY_TOKEN_DATE_KEY).await {
        Ok(Some(generated_at)) => {
            if recovery_token_expired(&generated_at, ctx.config().recovery_token_ttl_seconds()) {
                warn!(account_id = %account.id, "expired recovery token presented");
                return invalid_token_response();
            }
        }
        Ok(None) => {}
        Err(err) => {
            error!("Recovery token date lookup failed: {err}");
            return recovery_failed_response();
        }
    }

    if let Err(err) = set_password(&pool, account.id, &request.new_password).await {
        error!("Failed to store new password: {err}");
        return recovery_failed_response();
    }

    let confirmation = RecoveryConfirmation {
        email,
        new_password: request.new_password,
        return_url: request.return_url,
    };

    match intercept_recovery_confirm(&ctx, &confirmation, RecoveryOutcome::PasswordChanged).await {
        Ok(RecoveryDecision::Authenticated {
            session_token,
            return_url,
        }) => (
            StatusCode::OK,
            Json(LoginResponse {
                session_token,
                return_url,
            }),
        )
            .into_response(),
        Ok(RecoveryDecision::PassThrough(_)) => {
            error!("Recovery interception passed through a changed password");
            recovery_failed_response()
        }
        Err(err) => {
            error!("Recovery interception failed: {err}");
            recovery_failed_response()
        }
    }
}

fn invalid_token_response() -> axum::response::Response {
    (
        StatusCode::BAD_REQUEST,
        "Invalid or expired recovery token".to_string(),
    )
        .into_response()
}

fn recovery_failed_response() -> axum::response::Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "Password recovery failed".to_string(),
    )
        .into_response()
}
