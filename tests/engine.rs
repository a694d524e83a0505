mod common;

use std::sync::Arc;

use serde_json::{json, Value};

use common::{filter, host, object};
use orbis::arguments::OrderByRule;
use orbis::query::Statement;
use orbis::{
    CreateOneArgs, FindManyArgs, FindOneArgs, OperationOptions, OrbisError, Session, Storage,
    UpdateOneArgs, ViewerContext,
};

async fn create(session: &Session<'_>, type_name: &str, data: Value) -> orbis::Record {
    session
        .create_one(type_name, &CreateOneArgs::new(object(data)), &OperationOptions::new())
        .await
        .unwrap()
        .unwrap()
}

async fn count(session: &Session<'_>, type_name: &str) -> u64 {
    session
        .find_many(type_name, &FindManyArgs::new(), &OperationOptions::new())
        .await
        .unwrap()
        .info
        .count
}

#[tokio::test]
async fn test_create_applies_defaults_and_embedded_columns() {
    let host = host().await;
    let session = host.orbis.session();

    let user = create(
        &session,
        "User",
        json!({"name": "Ada", "address": {"city": "London"}, "tags": ["math"]}),
    )
    .await;

    assert!(user["id"].as_str().is_some_and(|id| !id.is_empty()));
    assert_eq!(user["name"], json!("Ada"));
    assert_eq!(user["handle"], json!("@ada"));
    assert_eq!(user["isActive"], json!(true));
    assert_eq!(user["address"], json!({"city": "London", "zip": null}));
    assert_eq!(user["tags"], json!(["math"]));
}

#[tokio::test]
async fn test_failed_nested_write_rolls_back_create() {
    let host = host().await;
    let session = host.orbis.session();

    let result = session
        .create_one(
            "Post",
            &CreateOneArgs::new(object(json!({
                "title": "Orphan",
                "author": {"connect": {"id": "missing"}}
            }))),
            &OperationOptions::new(),
        )
        .await;
    assert!(matches!(result, Err(OrbisError::NotFound(_))));

    let result = session
        .create_one(
            "User",
            &CreateOneArgs::new(object(json!({
                "name": "Grace",
                "groups": [{"connect": {"id": "missing"}}]
            }))),
            &OperationOptions::new(),
        )
        .await;
    assert!(result.is_err());
    assert_eq!(count(&session, "User").await, 0);
    assert_eq!(count(&session, "Post").await, 0);
}

#[tokio::test]
async fn test_page_keeps_total_count() {
    let host = host().await;
    let session = host.orbis.session();
    for title in ["c", "a", "b"] {
        create(&session, "Post", json!({"title": title})).await;
    }

    let mut args = FindManyArgs::new();
    args.order_by = vec![OrderByRule::path(["title", "desc"])];
    args.take = Some(1);
    let list = session
        .find_many("Post", &args, &OperationOptions::new())
        .await
        .unwrap();
    assert_eq!(list.info.count, 3);
    assert_eq!(list.values.len(), 1);
    assert_eq!(list.values[0]["title"], json!("c"));

    args.skip = Some(1);
    args.take = Some(5);
    let list = session
        .find_many("Post", &args, &OperationOptions::new())
        .await
        .unwrap();
    let titles: Vec<&Value> = list.values.iter().map(|p| &p["title"]).collect();
    assert_eq!(titles, vec![&json!("b"), &json!("a")]);
}

#[tokio::test]
async fn test_page_over_to_many_ordering_counts_entities() {
    let host = host().await;
    let session = host.orbis.session();
    create(
        &session,
        "User",
        json!({"name": "A", "posts": [{"create": {"title": "a1"}}, {"create": {"title": "a2"}}]}),
    )
    .await;
    create(&session, "User", json!({"name": "B", "posts": [{"create": {"title": "b1"}}]})).await;
    create(&session, "User", json!({"name": "C"})).await;

    let mut args = FindManyArgs::new();
    args.order_by = vec![OrderByRule::path(["posts", "title", "asc"])];
    args.skip = Some(1);
    args.take = Some(2);
    let list = session
        .find_many("User", &args, &OperationOptions::new())
        .await
        .unwrap();
    assert_eq!(list.info.count, 3);
    let names: Vec<&Value> = list.values.iter().map(|u| &u["name"]).collect();
    assert_eq!(names, vec![&json!("A"), &json!("B")]);

    args.order_by = vec![OrderByRule::path(["posts", "title", "desc"])];
    args.skip = None;
    let list = session
        .find_many("User", &args, &OperationOptions::new())
        .await
        .unwrap();
    let names: Vec<&Value> = list.values.iter().map(|u| &u["name"]).collect();
    assert_eq!(names, vec![&json!("B"), &json!("A")]);
}

#[tokio::test]
async fn test_nested_connect_and_eager_author() {
    let host = host().await;
    let session = host.orbis.session();
    let user = create(&session, "User", json!({"name": "Ada"})).await;

    let post = create(
        &session,
        "Post",
        json!({"title": "Notes", "author": {"connect": {"id": user["id"]}}}),
    )
    .await;
    assert_eq!(post["author"]["name"], json!("Ada"));
    assert_eq!(post["author"]["handle"], json!("@ada"));

    let mut args = FindOneArgs::new(object(json!({"id": user["id"]})));
    args.relations = vec!["posts".to_string()];
    let user = session
        .find_one("User", &args, &OperationOptions::new())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(user["posts"].as_array().map(Vec::len), Some(1));
    assert_eq!(user["posts"][0]["title"], json!("Notes"));
}

#[tokio::test]
async fn test_nested_create_from_the_one_side() {
    let host = host().await;
    let session = host.orbis.session();

    let user = create(
        &session,
        "User",
        json!({
            "name": "Ada",
            "posts": [{"create": {"title": "First"}}, {"create": {"title": "Second"}}]
        }),
    )
    .await;

    let list = session
        .find_many(
            "Post",
            &FindManyArgs::new().filter(filter(json!({"author": {"id": {"equals": user["id"]}}}))),
            &OperationOptions::new(),
        )
        .await
        .unwrap();
    assert_eq!(list.info.count, 2);
}

#[tokio::test]
async fn test_nested_connect_from_the_one_side() {
    let host = host().await;
    let session = host.orbis.session();
    let options = OperationOptions::new();
    let provider = create(
        &session,
        "Provider",
        json!({"type": "LOCAL", "identifier": "ada@example.test", "email": "ada@example.test"}),
    )
    .await;

    let mut args = CreateOneArgs::new(object(json!({
        "name": "Ada",
        "providers": [{"connect": {"id": provider["id"]}}]
    })));
    args.relations = vec!["providers".to_string()];
    let user = session.create_one("User", &args, &options).await.unwrap().unwrap();
    let providers = user["providers"].as_array().unwrap();
    assert_eq!(providers.len(), 1);
    assert_eq!(providers[0]["id"], provider["id"]);

    let mut args = FindOneArgs::new(object(json!({"id": provider["id"]})));
    args.relations = vec!["user".to_string()];
    let provider = session.find_one("Provider", &args, &options).await.unwrap().unwrap();
    assert_eq!(provider["user"]["id"], user["id"]);
}

#[tokio::test]
async fn test_find_one_miss() {
    let host = host().await;
    let session = host.orbis.session();
    let args = FindOneArgs::new(object(json!({"id": "missing"})));

    let found = session
        .find_one("User", &args, &OperationOptions::new())
        .await
        .unwrap();
    assert!(found.is_none());

    let result = session
        .find_one("User", &args, &OperationOptions::new().not_found_error())
        .await;
    assert!(matches!(result, Err(OrbisError::NotFound(_))));
}

#[tokio::test]
async fn test_many_to_many_connect_and_disconnect() {
    let host = host().await;
    let session = host.orbis.session();
    let options = OperationOptions::new();
    create(&session, "Group", json!({"id": "g1", "name": "Admins"})).await;
    create(&session, "Group", json!({"id": "g2", "name": "Editors"})).await;

    let user = create(
        &session,
        "User",
        json!({"name": "Ada", "groups": [{"connect": {"id": "g1"}}, {"connect": {"id": "g2"}}]}),
    )
    .await;

    let mut args = FindOneArgs::new(object(json!({"id": "g1"})));
    args.relations = vec!["members".to_string()];
    let group = session.find_one("Group", &args, &options).await.unwrap().unwrap();
    assert_eq!(group["members"][0]["name"], json!("Ada"));

    let mut update = UpdateOneArgs::new(
        object(json!({"id": user["id"]})),
        object(json!({"groups": [{"disconnect": {"id": "g1"}}]})),
    );
    update.relations = vec!["groups".to_string()];
    let user = session.update_one("User", &update, &options).await.unwrap().unwrap();
    let groups = user["groups"].as_array().unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0]["id"], json!("g2"));
}

#[tokio::test]
async fn test_filters_across_relations() {
    let host = host().await;
    let session = host.orbis.session();
    let ada = create(&session, "User", json!({"name": "Ada", "age": 36})).await;
    create(&session, "User", json!({"name": "Grace", "age": 45})).await;
    create(
        &session,
        "Post",
        json!({"title": "Engines", "author": {"connect": {"id": ada["id"]}}}),
    )
    .await;
    create(&session, "Post", json!({"title": "Anonymous"})).await;

    let list = session
        .find_many(
            "Post",
            &FindManyArgs::new().filter(filter(json!({"author": {"name": {"contains": "Ad"}}}))),
            &OperationOptions::new(),
        )
        .await
        .unwrap();
    assert_eq!(list.info.count, 1);
    assert_eq!(list.values[0]["title"], json!("Engines"));

    let list = session
        .find_many(
            "User",
            &FindManyArgs::new().filter(filter(json!({"OR": [{"age": {"gt": 40}}, {"name": "Ada"}]}))),
            &OperationOptions::new(),
        )
        .await
        .unwrap();
    assert_eq!(list.info.count, 2);

    let result = session
        .find_many(
            "User",
            &FindManyArgs::new().filter(filter(json!({"nickname": "x"}))),
            &OperationOptions::new(),
        )
        .await;
    assert!(matches!(result, Err(OrbisError::UnknownField(_))));
}

#[tokio::test]
async fn test_scope_limits_visible_posts() {
    let host = host().await;
    let session = host.orbis.session();
    let ada = create(&session, "User", json!({"name": "Ada"})).await;
    let grace = create(&session, "User", json!({"name": "Grace"})).await;
    create(
        &session,
        "Post",
        json!({"title": "Draft", "author": {"connect": {"id": ada["id"]}}}),
    )
    .await;
    create(
        &session,
        "Post",
        json!({"title": "Public", "published": true, "author": {"connect": {"id": ada["id"]}}}),
    )
    .await;

    let as_viewer = |id: &Value| {
        OperationOptions::new().with_context(Arc::new(ViewerContext::new(id.as_str().unwrap_or_default())))
    };

    let own = session
        .find_many("Post", &FindManyArgs::new(), &as_viewer(&ada["id"]))
        .await
        .unwrap();
    assert_eq!(own.info.count, 2);

    let other = session
        .find_many("Post", &FindManyArgs::new(), &as_viewer(&grace["id"]))
        .await
        .unwrap();
    assert_eq!(other.info.count, 1);
    assert_eq!(other.values[0]["title"], json!("Public"));

    let admin = OperationOptions::new()
        .with_context(Arc::new(ViewerContext::new("root").with_role("admin")));
    let all = session
        .find_many("Post", &FindManyArgs::new(), &admin)
        .await
        .unwrap();
    assert_eq!(all.info.count, 2);
}

#[tokio::test]
async fn test_update_validates_and_sets_values() {
    let host = host().await;
    let session = host.orbis.session();
    let options = OperationOptions::new();
    let user = create(&session, "User", json!({"name": "Ada"})).await;

    let updated = session
        .update_one(
            "User",
            &UpdateOneArgs::new(
                object(json!({"id": user["id"]})),
                object(json!({"age": 37, "address": {"city": "Paris", "zip": "75001"}})),
            ),
            &options,
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated["age"], json!(37));
    assert_eq!(updated["address"]["city"], json!("Paris"));
    assert_eq!(updated["name"], json!("Ada"));

    let result = session
        .update_one(
            "User",
            &UpdateOneArgs::new(object(json!({"id": user["id"]})), object(json!({"age": "old"}))),
            &options,
        )
        .await;
    assert!(matches!(result, Err(OrbisError::Validation(_))));

    let result = session
        .update_one(
            "User",
            &UpdateOneArgs::new(object(json!({"id": "missing"})), object(json!({"age": 1}))),
            &options,
        )
        .await;
    assert!(matches!(result, Err(OrbisError::NotFound(_))));
}

#[tokio::test]
async fn test_relation_only_update_is_validated() {
    let mut host = host().await;
    let user = create(&host.orbis.session(), "User", json!({"name": "Ada"})).await;

    let schema = host
        .orbis
        .metadata()
        .get_schema("User")
        .cloned()
        .unwrap()
        .update("name", |rule| rule.min_length(5));
    host.orbis.metadata_mut().add_schema("User", schema);

    let session = host.orbis.session();
    let result = session
        .update_one(
            "User",
            &UpdateOneArgs::new(
                object(json!({"id": user["id"]})),
                object(json!({"groups": [{"create": {"id": "g1", "name": "Ops"}}]})),
            ),
            &OperationOptions::new(),
        )
        .await;
    assert!(matches!(result, Err(OrbisError::Validation(_))));
    assert_eq!(count(&session, "Group").await, 0);
}

#[tokio::test]
async fn test_delete_one_and_many() {
    let host = host().await;
    let session = host.orbis.session();
    let options = OperationOptions::new();
    for title in ["a", "b", "c"] {
        create(&session, "Post", json!({"title": title})).await;
    }

    let first = session
        .find_first("Post", &FindManyArgs::new().filter(filter(json!({"title": "a"}))), &options)
        .await
        .unwrap()
        .unwrap();
    let deleted = session
        .delete_one("Post", &FindOneArgs::new(object(json!({"id": first["id"]}))), &options)
        .await
        .unwrap();
    assert_eq!(deleted["title"], json!("a"));
    assert_eq!(count(&session, "Post").await, 2);

    let removed = session
        .delete_many(
            "Post",
            &FindManyArgs::new().filter(filter(json!({"title": {"in": ["b", "c"]}}))),
            &options,
        )
        .await
        .unwrap();
    assert_eq!(removed.info.count, 2);
    assert_eq!(count(&session, "Post").await, 0);

    let result = session
        .delete_one("Post", &FindOneArgs::new(object(json!({"id": 999}))), &options)
        .await;
    assert!(matches!(result, Err(OrbisError::NotFound(_))));
}

#[tokio::test]
async fn test_delete_date_hides_rows_instead_of_removing_them() {
    let host = host().await;
    let session = host.orbis.session();
    let options = OperationOptions::new();
    create(&session, "Group", json!({"id": "g1", "name": "Admins"})).await;
    create(&session, "Group", json!({"id": "g2", "name": "Editors"})).await;
    let user = create(
        &session,
        "User",
        json!({"name": "Ada", "groups": [{"connect": {"id": "g1"}}, {"connect": {"id": "g2"}}]}),
    )
    .await;

    let deleted = session
        .delete_one("Group", &FindOneArgs::new(object(json!({"id": "g1"}))), &options)
        .await
        .unwrap();
    assert_eq!(deleted["name"], json!("Admins"));
    assert_eq!(count(&session, "Group").await, 1);

    let missing = session
        .find_one("Group", &FindOneArgs::new(object(json!({"id": "g1"}))), &options)
        .await
        .unwrap();
    assert!(missing.is_none());

    let mut args = FindOneArgs::new(object(json!({"id": user["id"]})));
    args.relations = vec!["groups".to_string()];
    let loaded = session.find_one("User", &args, &options).await.unwrap().unwrap();
    let groups = loaded["groups"].as_array().unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0]["id"], json!("g2"));

    let result = session
        .delete_one("Group", &FindOneArgs::new(object(json!({"id": "g1"}))), &options)
        .await;
    assert!(matches!(result, Err(OrbisError::NotFound(_))));

    let removed = session.delete_many("Group", &FindManyArgs::new(), &options).await.unwrap();
    assert_eq!(removed.info.count, 1);
    assert_eq!(count(&session, "Group").await, 0);

    let stamped = host
        .orbis
        .storage()
        .fetch_all(&Statement {
            sql: r#"SELECT "id" FROM "Group" WHERE "deletedAt" IS NOT NULL"#.to_string(),
            params: Vec::new(),
        })
        .await
        .unwrap();
    assert_eq!(stamped.len(), 2);
}

#[tokio::test]
async fn test_rejects_malformed_relation_writes() {
    let host = host().await;
    let session = host.orbis.session();

    let result = session
        .create_one(
            "Post",
            &CreateOneArgs::new(object(json!({
                "title": "x",
                "author": {"connect": {"id": "a"}, "create": {"name": "b"}}
            }))),
            &OperationOptions::new(),
        )
        .await;
    assert!(matches!(result, Err(OrbisError::InvalidRelationWrite(_))));

    let result = session
        .create_one(
            "User",
            &CreateOneArgs::new(object(json!({"name": "x", "posts": {"create": {"title": "y"}}}))),
            &OperationOptions::new(),
        )
        .await;
    assert!(matches!(result, Err(OrbisError::InvalidRelationWrite(_))));
}
