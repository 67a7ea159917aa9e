//! Login endpoint: the base action plus the password-change interceptor.

use axum::{
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Redirect},
    Json,
};
use std::sync::Arc;
use tracing::error;

use super::types::{LoginRequest, LoginResponse};
use super::utils::{normalize_email, valid_email};
use crate::policy::login::{intercept_login, LoginDecision, LoginSubmission};
use crate::policy::{AuthOutcome, PolicyContext};

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login success", body = LoginResponse),
        (status = 303, description = "Password change required; redirect into recovery confirmation"),
        (status = 400, description = "Validation error", body = String),
        (status = 401, description = "Invalid credentials", body = String),
        (status = 500, description = "Login failed", body = String)
    ),
    tag = "auth"
)]
pub async fn login(
    ctx: Extension<Arc<PolicyContext>>,
    payload: Option<Json<LoginRequest>>,
) -> impl IntoResponse {
    let request: LoginRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let submission = LoginSubmission {
        email: request.email.as_deref().map(normalize_email),
        username: request.username.clone(),
        return_url: request.return_url.clone(),
    };

    let Some(identifier) = submission.identifier(ctx.config().usernames_enabled()) else {
        return (StatusCode::BAD_REQUEST, "Missing identifier".to_string()).into_response();
    };
    if !ctx.config().usernames_enabled() && !valid_email(identifier) {
        return (StatusCode::BAD_REQUEST, "Invalid email".to_string()).into_response();
    }

    // Base action: resolve the account and authenticate. A miss gets the
    // same response as a bad password to avoid account probing.
    let account = if ctx.config().usernames_enabled() {
        ctx.accounts().find_by_username(identifier).await
    } else {
        ctx.accounts().find_by_email(identifier).await
    };
    let account = match account {
        Ok(Some(account)) => account,
        Ok(None) => {
            return (StatusCode::UNAUTHORIZED, "Invalid credentials".to_string()).into_response()
        }
        Err(err) => {
            error!("Account lookup failed: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Login failed".to_string(),
            )
                .into_response();
        }
    };

    let outcome = match ctx.authenticator().sign_in(&account, &request.password).await {
        Ok(outcome) => outcome,
        Err(err) => {
            error!("Authentication failed: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Login failed".to_string(),
            )
                .into_response();
        }
    };

    // The interceptor may replace the tentative result; keep the session
    // token around so an interceptor failure can still revoke it.
    let issued_session = outcome.session_token().map(ToString::to_string);

    match intercept_login(&ctx, &submission, outcome).await {
        Ok(LoginDecision::PassThrough(AuthOutcome::Granted { session_token })) => (
            StatusCode::OK,
            Json(LoginResponse {
                session_token,
                return_url: submission.return_url,
            }),
        )
            .into_response(),
        Ok(LoginDecision::PassThrough(AuthOutcome::Rejected)) => {
            (StatusCode::UNAUTHORIZED, "Invalid credentials".to_string()).into_response()
        }
        Ok(LoginDecision::RedirectToRecovery {
            token,
            email,
            return_url,
        }) => {
            let url = ctx
                .config()
                .recovery_confirm_url(&token, &email, return_url.as_deref());
            match url {
                Ok(url) => Redirect::to(&url).into_response(),
                Err(err) => {
                    error!("Failed to build recovery redirect: {err}");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Login failed".to_string(),
                    )
                        .into_response()
                }
            }
        }
        Err(err) => {
            // A flagged account must never slip through on an interceptor
            // failure; revoke the session and fail the login.
            error!("Login interception failed: {err}");
            if let Some(session_token) = issued_session {
                if let Err(err) = ctx.authenticator().sign_out(&session_token).await {
                    error!("Failed to revoke session after interception error: {err}");
                }
            }
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Login failed".to_string(),
            )
                .into_response()
        }
    }
}
