// Token flows - single-use, expiring tokens attached to a provider

use chrono::{DateTime, Duration, Utc};
use rand::distr::Alphanumeric;
use rand::Rng;
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use super::{ProviderType, TokenType};
use crate::arguments::WhereArgument;
use crate::error::{OrbisError, OrbisResult};
use crate::metadata::Record;
use crate::mutations::{CreateOneArgs, UpdateOneArgs};
use crate::queries::{FindManyArgs, FindOneArgs, OperationOptions};
use crate::session::Session;

const TOKEN_LENGTH: usize = 32;
const VERIFY_EMAIL_HOURS: i64 = 72;
const RESET_PASSWORD_HOURS: i64 = 24;

pub(super) fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn random_token() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LENGTH)
        .map(char::from)
        .collect()
}

/// Replace the provider's tokens with a fresh one valid for `hours_valid` hours.
pub async fn generate_token(
    session: &Session<'_>,
    provider_id: &Value,
    token_type: TokenType,
    hours_valid: i64,
) -> OrbisResult<Record> {
    let options = OperationOptions::new();
    session
        .transaction(false, || async {
            let previous: WhereArgument = object(json!({"provider": {"id": {"equals": provider_id}}}));
            let removed = session
                .delete_many("Token", &FindManyArgs::new().filter(previous), &options)
                .await?;
            debug!(provider = %provider_id, removed = removed.values.len(), "cleared tokens");

            loop {
                let candidate = random_token();
                let existing = session
                    .find_one("Token", &FindOneArgs::new(object(json!({"token": &candidate}))), &options)
                    .await?;
                if existing.is_some() {
                    continue;
                }

                let expires_at = Utc::now() + Duration::hours(hours_valid);
                let data = object(json!({
                    "type": token_type.as_str(),
                    "token": candidate,
                    "expiresAt": expires_at.to_rfc3339(),
                    "provider": {"connect": {"id": provider_id}}
                }));
                return session
                    .create_one("Token", &CreateOneArgs::new(data), &options)
                    .await?
                    .ok_or_else(|| OrbisError::Internal("created token could not be read back".to_string()));
            }
        })
        .await
}

/// Local provider signed in with `email`, with its user loaded.
pub(super) async fn local_provider(session: &Session<'_>, email: &str) -> OrbisResult<Option<Record>> {
    let filter = object(json!({
        "type": {"equals": ProviderType::Local.as_str()},
        "identifier": {"equals": email.trim().to_lowercase()}
    }));
    let mut args = FindManyArgs::new().filter(filter);
    args.relations = vec!["user".to_string()];
    session.find_first("Provider", &args, &OperationOptions::new()).await
}

/// Issue an email verification token for an unverified local provider.
///
/// Delivery is up to the caller; the token is returned instead of mailed.
pub async fn request_verify_email(session: &Session<'_>, email: &str) -> OrbisResult<Record> {
    session
        .transaction(false, || async {
            let provider = local_provider(session, email)
                .await?
                .ok_or_else(|| OrbisError::NotFound("errors.requestVerifyEmail.email.notFound".to_string()))?;
            if provider.get("isVerified") == Some(&Value::Bool(true)) {
                return Err(OrbisError::BadRequest(
                    "errors.requestVerifyEmail.email.alreadyVerified".to_string(),
                ));
            }

            let id = provider.get("id").cloned().unwrap_or(Value::Null);
            generate_token(session, &id, TokenType::VerifyEmail, VERIFY_EMAIL_HOURS).await
        })
        .await
}

pub async fn request_reset_password(session: &Session<'_>, email: &str) -> OrbisResult<Record> {
    session
        .transaction(false, || async {
            let provider = local_provider(session, email).await?.ok_or_else(|| {
                OrbisError::NotFound("errors.requestResetPassword.email.notFound".to_string())
            })?;
            let id = provider.get("id").cloned().unwrap_or(Value::Null);
            generate_token(session, &id, TokenType::ResetPassword, RESET_PASSWORD_HOURS).await
        })
        .await
}

/// Look up an unexpired token of `token_type` and the id of its provider.
///
/// Error keys are namespaced by `flow`, e.g. `errors.verifyEmail.token.invalid`.
pub(super) async fn redeem(
    session: &Session<'_>,
    token_type: TokenType,
    token: &str,
    flow: &str,
) -> OrbisResult<(Record, Value)> {
    let filter = object(json!({
        "type": {"equals": token_type.as_str()},
        "token": {"equals": token}
    }));
    let mut args = FindManyArgs::new().filter(filter);
    args.relations = vec!["provider".to_string()];

    let record = session
        .find_first("Token", &args, &OperationOptions::new())
        .await?
        .ok_or_else(|| OrbisError::BadRequest(format!("errors.{}.token.invalid", flow)))?;
    if is_expired(&record)? {
        return Err(OrbisError::BadRequest(format!("errors.{}.token.expired", flow)));
    }

    let provider_id = record
        .get("provider")
        .and_then(|p| p.get("id"))
        .filter(|id| !id.is_null())
        .cloned()
        .ok_or_else(|| OrbisError::BadRequest(format!("errors.{}.provider.invalid", flow)))?;
    Ok((record, provider_id))
}

/// Delete a redeemed token.
pub(super) async fn consume(session: &Session<'_>, token: &Record) -> OrbisResult<()> {
    let id = token.get("id").cloned().unwrap_or(Value::Null);
    session
        .delete_one("Token", &FindOneArgs::new(object(json!({"id": id}))), &OperationOptions::new())
        .await?;
    Ok(())
}

/// Mark the token's provider verified and consume the token.
pub async fn verify_email(session: &Session<'_>, token: &str) -> OrbisResult<()> {
    session
        .transaction(false, || async {
            let (record, provider_id) = redeem(session, TokenType::VerifyEmail, token, "verifyEmail").await?;
            session
                .update_one(
                    "Provider",
                    &UpdateOneArgs::new(
                        object(json!({"id": &provider_id})),
                        object(json!({"isVerified": true})),
                    ),
                    &OperationOptions::new(),
                )
                .await?;
            consume(session, &record).await?;
            info!(provider = %provider_id, "email verified");
            Ok(())
        })
        .await
}

fn is_expired(token: &Record) -> OrbisResult<bool> {
    let expires_at = token
        .get("expiresAt")
        .and_then(Value::as_str)
        .ok_or_else(|| OrbisError::Internal("token has no expiry".to_string()))?;
    let expires_at = DateTime::parse_from_rfc3339(expires_at)
        .map_err(|e| OrbisError::Internal(format!("token expiry {} is invalid: {}", expires_at, e)))?;
    Ok(Utc::now() >= expires_at)
}
