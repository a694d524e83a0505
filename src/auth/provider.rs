// External identity providers - the OAuth handshake surface the auth flows call into

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::ProviderType;
use crate::error::OrbisResult;

/// Name reserved for email and password sign-in.
pub const LOCAL_PROVIDER: &str = "local";

/// Identity returned by a provider after a successful handshake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderResponse {
    #[serde(rename = "type")]
    pub provider_type: ProviderType,
    pub identifier: String,
    pub credentials: Option<String>,
    pub email: String,
    pub name: String,
}

/// An OAuth provider such as Google. Token exchange is left to implementors.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    fn name(&self) -> &str;

    /// URL the client is sent to for consent.
    fn authorize(&self, redirect_uri: &str) -> String;

    async fn authenticate(&self, redirect_uri: &str, code: &str) -> OrbisResult<ProviderResponse>;
}
