// Auth declarations - provider and token entities linked to the host's user type

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::OrbisResult;
use crate::metadata::{ColumnType, FieldDefinition, FieldType, Generation, ObjectDefinition, OrbisMetadata};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProviderType {
    Local,
    Google,
}

impl ProviderType {
    pub const ALL: [ProviderType; 2] = [ProviderType::Local, ProviderType::Google];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderType::Local => "LOCAL",
            ProviderType::Google => "GOOGLE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenType {
    VerifyEmail,
    ResetPassword,
}

impl TokenType {
    pub const ALL: [TokenType; 2] = [TokenType::VerifyEmail, TokenType::ResetPassword];

    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::VerifyEmail => "VERIFY_EMAIL",
            TokenType::ResetPassword => "RESET_PASSWORD",
        }
    }
}

/// Registry of the auth module; `user_type` is the host entity that owns providers.
pub(crate) fn declare(user_type: &str) -> OrbisResult<OrbisMetadata> {
    let mut metadata = OrbisMetadata::new();
    metadata.register_enum("ProviderType", ProviderType::ALL.iter().map(|t| t.as_str()))?;
    metadata.register_enum("TokenType", TokenType::ALL.iter().map(|t| t.as_str()))?;

    metadata.register(
        ObjectDefinition::object("AccessToken")
            .field(FieldDefinition::new("accessToken", FieldType::String))
            .field(FieldDefinition::new("expiresIn", FieldType::Number)),
    )?;

    metadata.register(
        ObjectDefinition::base("BaseUser").field(
            FieldDefinition::lazy("providers", || FieldType::list(FieldType::object("Provider")))
                .one_to_many("user")
                .lazy_loaded(),
        ),
    )?;

    let user = user_type.to_string();
    metadata.register(
        ObjectDefinition::object("Provider")
            .entity()
            .field(
                FieldDefinition::new("id", FieldType::String)
                    .primary()
                    .generated(Generation::Uuid),
            )
            .field(FieldDefinition::new("type", FieldType::enumeration("ProviderType")).column())
            .field(
                FieldDefinition::new("identifier", FieldType::String)
                    .column()
                    .length(255)
                    .hidden(),
            )
            .field(
                FieldDefinition::new("credentials", FieldType::String)
                    .column()
                    .nullable(true)
                    .hidden(),
            )
            .field(FieldDefinition::new("email", FieldType::String).column().length(255))
            .field(
                FieldDefinition::new("isVerified", FieldType::Boolean)
                    .column()
                    .default_value(json!(false)),
            )
            .field(
                FieldDefinition::lazy("user", move || FieldType::object(&user))
                    .many_to_one("providers")
                    .lazy_loaded(),
            )
            .field(
                FieldDefinition::lazy("tokens", || FieldType::list(FieldType::object("Token")))
                    .one_to_many("provider")
                    .lazy_loaded()
                    .hidden(),
            ),
    )?;

    metadata.register(
        ObjectDefinition::object("Token")
            .entity()
            .field(
                FieldDefinition::new("id", FieldType::String)
                    .primary()
                    .generated(Generation::Uuid),
            )
            .field(FieldDefinition::new("type", FieldType::enumeration("TokenType")).column())
            .field(
                FieldDefinition::new("token", FieldType::String)
                    .column()
                    .length(32)
                    .unique(),
            )
            .field(
                FieldDefinition::new("expiresAt", FieldType::Date)
                    .column()
                    .column_type(ColumnType::DateTime),
            )
            .field(
                FieldDefinition::lazy("provider", || FieldType::object("Provider"))
                    .many_to_one("tokens")
                    .lazy_loaded(),
            ),
    )?;

    Ok(metadata)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{RelationKind, TypeKind};

    #[test]
    fn test_declarations() {
        let metadata = declare("Member").unwrap();
        assert!(metadata.has_entity("Provider"));
        assert!(metadata.has_entity("Token"));
        assert!(!metadata.has_type("BaseUser"));
        assert!(metadata.has_field("BaseUser", "providers"));
        assert_eq!(
            metadata.get_type("TokenType").unwrap().kind,
            TypeKind::Enum(vec!["VERIFY_EMAIL".into(), "RESET_PASSWORD".into()])
        );

        let user = metadata.get_field("Provider", "user").unwrap();
        assert_eq!(user.resolve_type(), &FieldType::object("Member"));
        assert_eq!(user.relation.as_ref().unwrap().kind, RelationKind::ManyToOne);
        assert!(!metadata.get_field("Provider", "credentials").unwrap().graphql);
        assert!(metadata.is_generated_field("Provider", "isVerified"));
    }

    #[test]
    fn test_enum_wire_names() {
        assert_eq!(serde_json::to_value(TokenType::VerifyEmail).unwrap(), json!("VERIFY_EMAIL"));
        assert_eq!(
            serde_json::from_value::<ProviderType>(json!("GOOGLE")).unwrap(),
            ProviderType::Google
        );
    }
}
