//! HTTP handlers.

pub mod accounts;
pub mod health;
pub mod login;
pub mod recovery;
pub mod types;

mod utils;

use axum::response::IntoResponse;

/// Root handler: service name and version only.
pub async fn root() -> impl IntoResponse {
    crate::APP_USER_AGENT
}
