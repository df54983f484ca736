//! Admin token gate for the force-recover CLI surface.
//!
//! Mirrors the teacher's `AdminGuard` Axum extractor: hash both sides to a
//! fixed-length digest, then compare in constant time so neither a length
//! nor an early byte mismatch leaks through timing. If `admin.token_env`
//! resolves to nothing (or an empty string), the gate is dev-mode and
//! every caller passes.

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

pub fn check_admin_token(config: &sa_domain::config::Config, provided: Option<&str>) -> anyhow::Result<()> {
    let expected = std::env::var(&config.admin.token_env).unwrap_or_default();
    if expected.is_empty() {
        return Ok(());
    }

    let provided_hash = Sha256::digest(provided.unwrap_or("").as_bytes());
    let expected_hash = Sha256::digest(expected.as_bytes());
    if !bool::from(provided_hash.ct_eq(&expected_hash)) {
        anyhow::bail!(
            "admin token required: set --admin-token or match ${}",
            config.admin.token_env
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_token_env(var: &str) -> sa_domain::config::Config {
        let mut config = sa_domain::config::Config::default();
        config.admin.token_env = var.to_string();
        config
    }

    #[test]
    fn dev_mode_allows_every_caller_when_unset() {
        let config = config_with_token_env("SA_TEST_ADMIN_TOKEN_UNSET");
        std::env::remove_var("SA_TEST_ADMIN_TOKEN_UNSET");
        assert!(check_admin_token(&config, None).is_ok());
    }

    #[test]
    fn matching_token_is_accepted() {
        let config = config_with_token_env("SA_TEST_ADMIN_TOKEN_MATCH");
        std::env::set_var("SA_TEST_ADMIN_TOKEN_MATCH", "secret");
        assert!(check_admin_token(&config, Some("secret")).is_ok());
        std::env::remove_var("SA_TEST_ADMIN_TOKEN_MATCH");
    }

    #[test]
    fn mismatched_token_is_rejected() {
        let config = config_with_token_env("SA_TEST_ADMIN_TOKEN_MISMATCH");
        std::env::set_var("SA_TEST_ADMIN_TOKEN_MISMATCH", "secret");
        assert!(check_admin_token(&config, Some("wrong")).is_err());
        std::env::remove_var("SA_TEST_ADMIN_TOKEN_MISMATCH");
    }

    #[test]
    fn missing_token_is_rejected_once_configured() {
        let config = config_with_token_env("SA_TEST_ADMIN_TOKEN_MISSING");
        std::env::set_var("SA_TEST_ADMIN_TOKEN_MISSING", "secret");
        assert!(check_admin_token(&config, None).is_err());
        std::env::remove_var("SA_TEST_ADMIN_TOKEN_MISSING");
    }
}
