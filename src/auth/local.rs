// Local sign-in - email and password credentials kept on a LOCAL provider

use argon2::password_hash::{rand_core::OsRng, SaltString};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use super::tokens::{consume, generate_token, local_provider, object, redeem};
use super::{AuthOptions, ProviderType, TokenType};
use crate::error::{OrbisError, OrbisResult};
use crate::metadata::Record;
use crate::mutations::{CreateOneArgs, UpdateOneArgs};
use crate::queries::{FindManyArgs, OperationOptions};
use crate::session::Session;

pub const MIN_PASSWORD_LENGTH: usize = 8;
const VERIFY_EMAIL_HOURS: i64 = 72;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterInput {
    pub email: String,
    pub password: String,
    pub password_repeat: String,
    /// Extra values stored on the new user.
    #[serde(default)]
    pub data: Map<String, Value>,
}

/// A new user with its local provider, and the token that verifies its email.
#[derive(Debug, Clone, PartialEq)]
pub struct Registration {
    pub user: Record,
    pub token: Record,
}

fn check_password(password: &str, repeat: &str, flow: &str) -> OrbisResult<()> {
    if password != repeat {
        return Err(OrbisError::BadRequest(format!("errors.{}.password.noMatch", flow)));
    }
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(OrbisError::BadRequest(format!("errors.{}.password.invalid", flow)));
    }
    Ok(())
}

async fn hash_password(password: &str) -> OrbisResult<String> {
    let password = password.to_string();
    tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| OrbisError::Internal(format!("Failed to hash password: {}", e)))
    })
    .await
    .map_err(|e| OrbisError::Internal(format!("password hashing task failed: {}", e)))?
}

async fn verify_password(password: &str, credentials: &str) -> OrbisResult<bool> {
    let password = password.to_string();
    let credentials = credentials.to_string();
    tokio::task::spawn_blocking(move || -> OrbisResult<bool> {
        let parsed = PasswordHash::new(&credentials)
            .map_err(|e| OrbisError::Internal(format!("Invalid password hash: {}", e)))?;
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    })
    .await
    .map_err(|e| OrbisError::Internal(format!("password check task failed: {}", e)))?
}

/// Create a user signed up with email and password, plus its email verification token.
pub async fn register(
    session: &Session<'_>,
    options: &AuthOptions,
    input: &RegisterInput,
) -> OrbisResult<Registration> {
    check_password(&input.password, &input.password_repeat, "register")?;
    let identifier = input.email.trim().to_lowercase();
    let credentials = hash_password(&input.password).await?;

    session
        .transaction(false, || async {
            if local_provider(session, &identifier).await?.is_some() {
                return Err(OrbisError::BadRequest("errors.register.email.exists".to_string()));
            }

            let mut data = input.data.clone();
            data.insert(
                "providers".to_string(),
                json!([{"create": {
                    "type": ProviderType::Local.as_str(),
                    "identifier": &identifier,
                    "credentials": &credentials,
                    "email": input.email.trim()
                }}]),
            );
            let mut args = CreateOneArgs::new(data);
            args.relations = vec!["providers".to_string()];
            let user = session
                .create_one(&options.user_type, &args, &OperationOptions::new())
                .await?
                .ok_or_else(|| OrbisError::Internal("registered user could not be read back".to_string()))?;

            let provider_id = user
                .get("providers")
                .and_then(|providers| providers.get(0))
                .and_then(|provider| provider.get("id"))
                .cloned()
                .ok_or_else(|| OrbisError::Internal("registered user has no provider".to_string()))?;
            let token = generate_token(session, &provider_id, TokenType::VerifyEmail, VERIFY_EMAIL_HOURS).await?;
            info!(provider = %provider_id, "registered local user");
            Ok(Registration { user, token })
        })
        .await
}

/// Check email and password against the local provider and return its user.
pub async fn login(session: &Session<'_>, email: &str, password: &str) -> OrbisResult<Record> {
    let provider = local_provider(session, email)
        .await?
        .ok_or_else(|| OrbisError::BadRequest("errors.login.email.invalid".to_string()))?;

    let credentials = provider.get("credentials").and_then(Value::as_str).unwrap_or_default();
    if credentials.is_empty() || !verify_password(password, credentials).await? {
        return Err(OrbisError::BadRequest("errors.login.password.invalid".to_string()));
    }
    if provider.get("isVerified") != Some(&Value::Bool(true)) {
        return Err(OrbisError::BadRequest("errors.login.email.unverified".to_string()));
    }

    let user = provider
        .get("user")
        .and_then(Value::as_object)
        .cloned()
        .ok_or_else(|| OrbisError::BadRequest("errors.login.user.invalid".to_string()))?;
    debug!(provider = ?provider.get("id"), "logged in");
    Ok(user)
}

/// Replace the local password of `user_id`.
pub async fn change_password(
    session: &Session<'_>,
    user_id: &Value,
    password: &str,
    password_repeat: &str,
) -> OrbisResult<()> {
    check_password(password, password_repeat, "changePassword")?;
    let credentials = hash_password(password).await?;

    session
        .transaction(false, || async {
            let filter = object(json!({
                "type": {"equals": ProviderType::Local.as_str()},
                "user": {"id": {"equals": user_id}}
            }));
            let provider = session
                .find_first("Provider", &FindManyArgs::new().filter(filter), &OperationOptions::new())
                .await?
                .ok_or_else(|| OrbisError::NotFound("errors.changePassword.noLocalProvider".to_string()))?;
            let provider_id = provider.get("id").cloned().unwrap_or(Value::Null);
            set_credentials(session, &provider_id, &credentials).await?;
            info!(provider = %provider_id, "password changed");
            Ok(())
        })
        .await
}

/// Set a new password from a reset token and consume the token.
pub async fn reset_password(
    session: &Session<'_>,
    token: &str,
    password: &str,
    password_repeat: &str,
) -> OrbisResult<()> {
    check_password(password, password_repeat, "resetPassword")?;
    let credentials = hash_password(password).await?;

    session
        .transaction(false, || async {
            let (record, provider_id) =
                redeem(session, TokenType::ResetPassword, token, "resetPassword").await?;
            set_credentials(session, &provider_id, &credentials).await?;
            consume(session, &record).await?;
            info!(provider = %provider_id, "password reset");
            Ok(())
        })
        .await
}

async fn set_credentials(session: &Session<'_>, provider_id: &Value, credentials: &str) -> OrbisResult<()> {
    session
        .update_one(
            "Provider",
            &UpdateOneArgs::new(
                object(json!({"id": provider_id})),
                object(json!({"credentials": credentials})),
            ),
            &OperationOptions::new(),
        )
        .await?;
    Ok(())
}
