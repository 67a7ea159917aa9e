//! Policy configuration.

use anyhow::{Context, Result};
use url::Url;

const DEFAULT_SESSION_TTL_SECONDS: i64 = 12 * 60 * 60;
const DEFAULT_RECOVERY_TOKEN_TTL_SECONDS: i64 = 7 * 24 * 60 * 60;
const RECOVERY_CONFIRM_PATH: &str = "password-recovery/confirm";

#[derive(Clone, Debug)]
pub struct PolicyConfig {
    frontend_base_url: String,
    usernames_enabled: bool,
    session_ttl_seconds: i64,
    recovery_token_ttl_seconds: i64,
}

impl PolicyConfig {
    #[must_use]
    pub fn new(frontend_base_url: String) -> Self {
        Self {
            frontend_base_url,
            usernames_enabled: false,
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            recovery_token_ttl_seconds: DEFAULT_RECOVERY_TOKEN_TTL_SECONDS,
        }
    }

    #[must_use]
    pub fn with_usernames_enabled(mut self, enabled: bool) -> Self {
        self.usernames_enabled = enabled;
        self
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: i64) -> Self {
        self.session_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_recovery_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.recovery_token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    /// When set, accounts log in with a username; otherwise with an email.
    #[must_use]
    pub fn usernames_enabled(&self) -> bool {
        self.usernames_enabled
    }

    #[must_use]
    pub fn session_ttl_seconds(&self) -> i64 {
        self.session_ttl_seconds
    }

    /// Lifetime of ordinary recovery tokens, the ones carrying a
    /// generated-at date. Durable policy tokens never expire.
    #[must_use]
    pub fn recovery_token_ttl_seconds(&self) -> i64 {
        self.recovery_token_ttl_seconds
    }

    /// Build the recovery-confirmation entry point URL with the redirect
    /// parameters `{token, email, returnUrl}`.
    ///
    /// # Errors
    /// Returns an error if the configured frontend base URL is not parseable.
    pub fn recovery_confirm_url(
        &self,
        token: &str,
        email: &str,
        return_url: Option<&str>,
    ) -> Result<String> {
        let base = format!("{}/", self.frontend_base_url.trim_end_matches('/'));
        let mut url = Url::parse(&base)
            .and_then(|url| url.join(RECOVERY_CONFIRM_PATH))
            .with_context(|| format!("invalid frontend base URL: {}", self.frontend_base_url))?;

        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("token", token);
            pairs.append_pair("email", email);
            if let Some(return_url) = return_url {
                pairs.append_pair("returnUrl", return_url);
            }
        }

        Ok(url.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_and_overrides() {
        let config = PolicyConfig::new("https://accounts.example.com".to_string());
        assert_eq!(config.frontend_base_url(), "https://accounts.example.com");
        assert!(!config.usernames_enabled());
        assert_eq!(config.session_ttl_seconds(), DEFAULT_SESSION_TTL_SECONDS);
        assert_eq!(
            config.recovery_token_ttl_seconds(),
            DEFAULT_RECOVERY_TOKEN_TTL_SECONDS
        );

        let config = config
            .with_usernames_enabled(true)
            .with_session_ttl_seconds(60)
            .with_recovery_token_ttl_seconds(120);
        assert!(config.usernames_enabled());
        assert_eq!(config.session_ttl_seconds(), 60);
        assert_eq!(config.recovery_token_ttl_seconds(), 120);
    }

    #[test]
    fn recovery_confirm_url_carries_parameters() -> Result<()> {
        let config = PolicyConfig::new("https://accounts.example.com/".to_string());
        let url = config.recovery_confirm_url("tok123", "alice@example.com", Some("/orders"))?;
        assert!(url.starts_with("https://accounts.example.com/password-recovery/confirm?"));
        assert!(url.contains("token=tok123"));
        assert!(url.contains("email=alice%40example.com"));
        assert!(url.contains("returnUrl=%2Forders"));
        Ok(())
    }

    #[test]
    fn recovery_confirm_url_without_return_url() -> Result<()> {
        let config = PolicyConfig::new("https://accounts.example.com".to_string());
        let url = config.recovery_confirm_url("tok123", "alice@example.com", None)?;
        assert!(!url.contains("returnUrl"));
        Ok(())
    }

    #[test]
    fn recovery_confirm_url_rejects_bad_base() {
        let config = PolicyConfig::new("not a url".to_string());
        assert!(config
            .recovery_confirm_url("tok", "a@example.com", None)
            .is_err());
    }
}
