// Shared setup for the integration tests: a file-backed SQLite host with its tables

#![allow(dead_code)]

use std::sync::Arc;

use serde_json::{json, Map, Value};
use tempfile::TempDir;

use orbis::auth::{AuthModule, AuthOptions};
use orbis::metadata::{FieldDefinition, FieldType, Generation, ObjectDefinition};
use orbis::{Orbis, OrbisOptions, SqliteStorage, WhereArgument};

const SCHEMA: &str = r#"
CREATE TABLE "User" (
    "id" TEXT PRIMARY KEY,
    "name" TEXT NOT NULL,
    "age" INTEGER,
    "isActive" BOOLEAN NOT NULL DEFAULT 1,
    "addressCity" TEXT,
    "addressZip" TEXT,
    "tags" TEXT
);
CREATE TABLE "Provider" (
    "id" TEXT PRIMARY KEY,
    "type" TEXT NOT NULL,
    "identifier" TEXT NOT NULL,
    "credentials" TEXT,
    "email" TEXT NOT NULL,
    "isVerified" BOOLEAN NOT NULL DEFAULT 0,
    "userId" TEXT REFERENCES "User"("id") ON DELETE CASCADE
);
CREATE TABLE "Token" (
    "id" TEXT PRIMARY KEY,
    "type" TEXT NOT NULL,
    "token" TEXT NOT NULL UNIQUE,
    "expiresAt" TEXT NOT NULL,
    "providerId" TEXT REFERENCES "Provider"("id") ON DELETE CASCADE
);
CREATE TABLE "Post" (
    "id" INTEGER PRIMARY KEY,
    "title" TEXT NOT NULL,
    "score" REAL NOT NULL DEFAULT 0,
    "published" BOOLEAN NOT NULL DEFAULT 0,
    "authorId" TEXT REFERENCES "User"("id")
);
CREATE TABLE "Group" (
    "id" TEXT PRIMARY KEY,
    "name" TEXT NOT NULL,
    "deletedAt" TEXT
);
CREATE TABLE "User_groups_Group" (
    "UserId" TEXT NOT NULL,
    "GroupId" TEXT NOT NULL,
    PRIMARY KEY ("UserId", "GroupId")
)
"#;

/// A host registry plus the directory holding its database file.
pub struct TestHost {
    pub orbis: Orbis,
    _dir: TempDir,
}

pub async fn host() -> TestHost {
    let dir = tempfile::tempdir().unwrap();
    let storage = SqliteStorage::open_file(&dir.path().join("orbis.db"))
        .await
        .unwrap();
    storage.execute_raw(SCHEMA).await.unwrap();

    let mut orbis = Orbis::new(Arc::new(storage), OrbisOptions::default()).unwrap();
    orbis
        .add_module(AuthModule::new(AuthOptions::default()))
        .unwrap();
    declare(&mut orbis);
    orbis.generate_schemas().unwrap();

    TestHost { orbis, _dir: dir }
}

fn declare(orbis: &mut Orbis) {
    orbis
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

    orbis
        .register(
            ObjectDefinition::object("User")
                .parent("BaseUser")
                .entity()
                .field(
                    FieldDefinition::new("id", FieldType::String)
                        .primary()
                        .generated(Generation::Uuid),
                )
                .field(FieldDefinition::new("name", FieldType::String).column())
                .field(FieldDefinition::new("handle", FieldType::String).resolve(|user| {
                    let name = user.get("name").and_then(Value::as_str).unwrap_or_default();
                    Ok(Value::String(format!("@{}", name.to_lowercase())))
                }))
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

    orbis
        .register(
            ObjectDefinition::object("Post")
                .entity()
                .scope(|viewer| match &viewer.user_id {
                    Some(user_id) if !viewer.has_role("admin") => vec![object(json!({
                        "OR": [
                            {"published": true},
                            {"author": {"id": {"equals": user_id}}}
                        ]
                    }))],
                    _ => Vec::new(),
                })
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
                    FieldDefinition::new("published", FieldType::Boolean)
                        .column()
                        .default_value(json!(false)),
                )
                .field(
                    FieldDefinition::lazy("author", || FieldType::object("User"))
                        .many_to_one("posts")
                        .eager()
                        .nullable(true),
                ),
        )
        .unwrap();

    orbis
        .register(
            ObjectDefinition::object("Group")
                .entity()
                .field(FieldDefinition::new("id", FieldType::String).primary())
                .field(FieldDefinition::new("name", FieldType::String).column())
                .field(
                    FieldDefinition::new("deletedAt", FieldType::Date)
                        .delete_date()
                        .nullable(true),
                )
                .field(
                    FieldDefinition::lazy("members", || FieldType::list(FieldType::object("User")))
                        .many_to_many(Some("groups"))
                        .lazy_loaded(),
                ),
        )
        .unwrap();
}

pub fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected an object, got {}", other),
    }
}

pub fn filter(value: Value) -> WhereArgument {
    object(value)
}
