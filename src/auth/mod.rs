// Auth module - providers, tokens, local credentials and the email verification flow
//
// Registers its entities against the host's user type. Hosts opt in with
// `Orbis::add_module(AuthModule::new(..))`.

mod entities;
mod local;
mod provider;
mod tokens;

pub use entities::{ProviderType, TokenType};
pub use local::{
    change_password, login, register, reset_password, RegisterInput, Registration,
    MIN_PASSWORD_LENGTH,
};
pub use provider::{AuthProvider, ProviderResponse, LOCAL_PROVIDER};
pub use tokens::{generate_token, request_reset_password, request_verify_email, verify_email};

use tracing::info;

use crate::error::{OrbisError, OrbisResult};
use crate::metadata::OrbisMetadata;
use crate::module::OrbisModule;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthOptions {
    /// Host entity that providers belong to. It should inherit `BaseUser`.
    pub user_type: String,
}

impl Default for AuthOptions {
    fn default() -> Self {
        Self {
            user_type: "User".to_string(),
        }
    }
}

pub struct AuthModule {
    options: AuthOptions,
    providers: Vec<Box<dyn AuthProvider>>,
}

impl AuthModule {
    pub fn new(options: AuthOptions) -> Self {
        Self {
            options,
            providers: Vec::new(),
        }
    }

    pub fn options(&self) -> &AuthOptions {
        &self.options
    }

    pub fn with_provider<P: AuthProvider + 'static>(mut self, provider: P) -> OrbisResult<Self> {
        let name = provider.name().to_string();
        if name == LOCAL_PROVIDER {
            return Err(OrbisError::Configuration(format!(
                "provider name '{}' is reserved",
                LOCAL_PROVIDER
            )));
        }
        if self.provider(&name).is_some() {
            return Err(OrbisError::Configuration(format!(
                "provider '{}' is already registered",
                name
            )));
        }
        info!(provider = %name, "registered auth provider");
        self.providers.push(Box::new(provider));
        Ok(self)
    }

    pub fn provider(&self, name: &str) -> Option<&dyn AuthProvider> {
        self.providers
            .iter()
            .find(|p| p.name() == name)
            .map(|p| p.as_ref())
    }
}

impl Default for AuthModule {
    fn default() -> Self {
        Self::new(AuthOptions::default())
    }
}

impl OrbisModule for AuthModule {
    fn name(&self) -> &str {
        "auth"
    }

    fn provided_names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name().to_string()).collect()
    }

    fn metadata(&self) -> OrbisResult<OrbisMetadata> {
        entities::declare(&self.options.user_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Google;

    #[async_trait]
    impl AuthProvider for Google {
        fn name(&self) -> &str {
            "google"
        }

        fn authorize(&self, redirect_uri: &str) -> String {
            format!("https://accounts.example.test/auth?redirect_uri={}", redirect_uri)
        }

        async fn authenticate(&self, _redirect_uri: &str, code: &str) -> OrbisResult<ProviderResponse> {
            Ok(ProviderResponse {
                provider_type: ProviderType::Google,
                identifier: code.to_string(),
                credentials: None,
                email: "ada@example.test".to_string(),
                name: "Ada".to_string(),
            })
        }
    }

    struct Local;

    #[async_trait]
    impl AuthProvider for Local {
        fn name(&self) -> &str {
            LOCAL_PROVIDER
        }

        fn authorize(&self, _redirect_uri: &str) -> String {
            String::new()
        }

        async fn authenticate(&self, _redirect_uri: &str, _code: &str) -> OrbisResult<ProviderResponse> {
            Err(OrbisError::BadRequest("unsupported".to_string()))
        }
    }

    #[tokio::test]
    async fn test_providers() {
        let module = AuthModule::default().with_provider(Google).unwrap();
        assert_eq!(module.provided_names(), vec!["google".to_string()]);

        let google = module.provider("google").unwrap();
        assert!(google.authorize("/cb").ends_with("redirect_uri=/cb"));
        let response = google.authenticate("/cb", "abc").await.unwrap();
        assert_eq!(response.provider_type, ProviderType::Google);
        assert!(module.provider("github").is_none());

        assert!(matches!(
            AuthModule::default().with_provider(Local),
            Err(OrbisError::Configuration(_))
        ));
        assert!(matches!(
            module.with_provider(Google),
            Err(OrbisError::Configuration(_))
        ));
    }

    #[test]
    fn test_metadata_uses_user_type() {
        let module = AuthModule::new(AuthOptions {
            user_type: "Member".to_string(),
        });
        let metadata = module.metadata().unwrap();
        assert!(metadata.has_entity("Provider"));
        assert_eq!(module.name(), "auth");
    }
}
