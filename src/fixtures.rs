// Shared registry used by unit tests

use serde_json::json;

use crate::metadata::{FieldDefinition, FieldType, Generation, ObjectDefinition, OrbisMetadata};

pub(crate) fn metadata() -> OrbisMetadata {
    let mut metadata = OrbisMetadata::new();
    metadata.register_builtins().unwrap();
    metadata.register_enum("ProviderType", ["LOCAL", "GOOGLE"]).unwrap();

    metadata
        .register(
            ObjectDefinition::object("Address")
                .field(FieldDefinition::new("city", FieldType::String).column())
                .field(
                    FieldDefinition::new("zip", FieldType::String)
                        .column()
                        .nullable(true),
                ),
        )
        .unwrap();

    metadata
        .register(
            ObjectDefinition::object("User")
                .entity()
                .field(
                    FieldDefinition::new("id", FieldType::String)
                        .primary()
                        .generated(Generation::Uuid),
                )
                .field(FieldDefinition::new("name", FieldType::String).column())
                .field(
                    FieldDefinition::new("age", FieldType::Number)
                        .column()
                        .nullable(true),
                )
                .field(
                    FieldDefinition::new("isActive", FieldType::Boolean)
                        .column()
                        .default_value(json!(true)),
                )
                .field(
                    FieldDefinition::new("address", FieldType::object("Address"))
                        .column()
                        .nullable(true),
                )
                .field(
                    FieldDefinition::new("tags", FieldType::list(FieldType::String))
                        .column()
                        .nullable(true),
                )
                .field(
                    FieldDefinition::lazy("providers", || FieldType::list(FieldType::object("Provider")))
                        .one_to_many("user")
                        .lazy_loaded(),
                )
                .field(
                    FieldDefinition::lazy("posts", || FieldType::list(FieldType::object("Post")))
                        .one_to_many("author")
                        .lazy_loaded(),
                )
                .field(
                    FieldDefinition::lazy("groups", || FieldType::list(FieldType::object("Group")))
                        .many_to_many(Some("members"))
                        .owner()
                        .lazy_loaded(),
                ),
        )
        .unwrap();

    metadata
        .register(
            ObjectDefinition::object("Provider")
                .entity()
                .field(
                    FieldDefinition::new("id", FieldType::String)
                        .primary()
                        .generated(Generation::Uuid),
                )
                .field(FieldDefinition::new("type", FieldType::enumeration("ProviderType")).column())
                .field(FieldDefinition::new("email", FieldType::String).column())
                .field(
                    FieldDefinition::lazy("user", || FieldType::object("User"))
                        .many_to_one("providers")
                        .lazy_loaded()
                        .nullable(true),
                )
                .field(FieldDefinition::new("owner", FieldType::object("User")).nullable(true)),
        )
        .unwrap();

    metadata
        .register(
            ObjectDefinition::object("Post")
                .entity()
                .field(
                    FieldDefinition::new("id", FieldType::Number)
                        .primary()
                        .generated(Generation::Increment),
                )
                .field(FieldDefinition::new("title", FieldType::String).column())
                .field(
                    FieldDefinition::new("score", FieldType::Number)
                        .float()
                        .column()
                        .default_value(json!(0)),
                )
                .field(
                    FieldDefinition::lazy("author", || FieldType::object("User"))
                        .many_to_one("posts")
                        .eager()
                        .nullable(true),
                ),
        )
        .unwrap();

    metadata
        .register(
            ObjectDefinition::object("Group")
                .entity()
                .field(FieldDefinition::new("id", FieldType::String).primary())
                .field(FieldDefinition::new("name", FieldType::String).column())
                .field(
                    FieldDefinition::lazy("members", || FieldType::list(FieldType::object("User")))
                        .many_to_many(Some("groups"))
                        .lazy_loaded(),
                ),
        )
        .unwrap();

    metadata
}
