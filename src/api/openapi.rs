//! OpenAPI document for the HTTP surface.

use utoipa::OpenApi;

use super::handlers::{accounts, health, login, recovery, types};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "rekey",
        description = "Forced password rotation for identity platforms"
    ),
    paths(
        health::health,
        login::login,
        recovery::password_recovery_confirm,
        accounts::create,
        accounts::set_password_policy,
    ),
    components(schemas(
        health::Health,
        types::LoginRequest,
        types::LoginResponse,
        types::RecoveryConfirmRequest,
        types::CreateAccountRequest,
        types::AccountResponse,
        types::PasswordPolicyRequest,
    )),
    tags(
        (name = "auth", description = "Login and recovery confirmation"),
        (name = "accounts", description = "Account administration"),
        (name = "health", description = "Service health")
    )
)]
pub struct ApiDoc;

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_all_routes() {
        let doc = openapi();
        let paths: Vec<&String> = doc.paths.paths.keys().collect();
        assert!(paths.iter().any(|path| *path == "/health"));
        assert!(paths.iter().any(|path| *path == "/v1/auth/login"));
        assert!(paths
            .iter()
            .any(|path| *path == "/v1/auth/password-recovery/confirm"));
        assert!(paths.iter().any(|path| *path == "/v1/accounts"));
        assert!(paths
            .iter()
            .any(|path| *path == "/v1/accounts/{id}/password-policy"));
    }
}
