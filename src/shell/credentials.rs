//! Application default credentials check
//!
//! A child tool picks up whatever ADC are on the machine. Before launching,
//! those must belong to the configured user or their service identity.

use crate::config::Config;
use crate::gcp::auth::CredentialProvider;
use crate::{Error, Result};
use std::sync::Arc;

pub enum CredentialCheck {
    /// Test environments only
    Skip,
    Verify {
        provider: Arc<dyn CredentialProvider>,
        user_email: Option<String>,
        service_account_email: Option<String>,
    },
}

impl CredentialCheck {
    pub fn from_config(config: &Config, provider: Arc<dyn CredentialProvider>) -> Self {
        if config.skip_credential_check {
            return CredentialCheck::Skip;
        }
        CredentialCheck::Verify {
            provider,
            user_email: config.user_email.clone(),
            service_account_email: config.service_account_email.clone(),
        }
    }

    pub async fn verify(&self) -> Result<()> {
        let CredentialCheck::Verify {
            provider,
            user_email,
            service_account_email,
        } = self
        else {
            tracing::debug!("Credential check skipped");
            return Ok(());
        };

        let expected: Vec<&str> = [user_email.as_deref(), service_account_email.as_deref()]
            .into_iter()
            .flatten()
            .collect();
        if expected.is_empty() {
            return Err(Error::CredentialMismatch {
                expected: "no user configured".to_string(),
                actual: "unchecked".to_string(),
            });
        }

        let principal = provider
            .current_principal()
            .await
            .map_err(|e| Error::CredentialMismatch {
                expected: expected.join(" or "),
                actual: format!("unknown ({e:#})"),
            })?;

        if !expected.iter().any(|e| e.eq_ignore_ascii_case(&principal)) {
            return Err(Error::CredentialMismatch {
                expected: expected.join(" or "),
                actual: principal,
            });
        }

        // Diagnostic only
        match (provider.backing_file(), provider.default_backing_file()) {
            (Some(file), Some(default)) if file == default => {
                tracing::info!("ADC backing file is in the default location")
            },
            (Some(file), _) => tracing::info!("ADC backing file: {:?}", file),
            (None, _) => tracing::info!("ADC set by metadata server"),
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::path::PathBuf;

    struct FixedPrincipal(&'static str);

    #[async_trait]
    impl CredentialProvider for FixedPrincipal {
        async fn current_principal(&self) -> anyhow::Result<String> {
            Ok(self.0.to_string())
        }

        fn backing_file(&self) -> Option<PathBuf> {
            None
        }

        fn default_backing_file(&self) -> Option<PathBuf> {
            None
        }
    }

    fn check(principal: &'static str) -> CredentialCheck {
        CredentialCheck::Verify {
            provider: Arc::new(FixedPrincipal(principal)),
            user_email: Some("ada@example.org".into()),
            service_account_email: Some("pet-123@proj.iam.gserviceaccount.com".into()),
        }
    }

    #[tokio::test]
    async fn test_user_or_service_identity_accepted() {
        assert!(check("Ada@example.org").verify().await.is_ok());
        assert!(check("pet-123@proj.iam.gserviceaccount.com")
            .verify()
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_mismatch_fails_fast() {
        let err = check("mallory@example.org").verify().await.unwrap_err();
        assert!(matches!(err, Error::CredentialMismatch { .. }));
    }

    #[tokio::test]
    async fn test_skip() {
        assert!(CredentialCheck::Skip.verify().await.is_ok());
    }
}
