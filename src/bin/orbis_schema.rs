// Orbis Schema - prints the generated SDL for a sample host with the auth module

use std::sync::Arc;

use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

use orbis::{
    auth::{AuthModule, AuthOptions},
    metadata::{FieldDefinition, FieldType, Generation, ObjectDefinition},
    Orbis, OrbisConfig, OrbisOptions,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("orbis=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = OrbisConfig::from_env()?;
    let storage = config.connect().await?;
    let mut orbis = Orbis::new(Arc::new(storage), OrbisOptions::default())?;

    orbis.add_module(AuthModule::new(AuthOptions::default()))?;
    orbis.register(
        ObjectDefinition::object("User")
            .parent("BaseUser")
            .entity()
            .field(
                FieldDefinition::new("id", FieldType::String)
                    .primary()
                    .generated(Generation::Uuid),
            )
            .field(FieldDefinition::new("name", FieldType::String).column())
            .field(
                FieldDefinition::new("isActive", FieldType::Boolean)
                    .column()
                    .default_value(json!(true)),
            ),
    )?;
    orbis.generate_schemas()?;

    let schema = orbis.generate_schema()?;
    info!(
        types = schema.types.len(),
        queries = schema.queries.len(),
        mutations = schema.mutations.len(),
        "generated schema"
    );
    println!("{}", schema.to_sdl());
    Ok(())
}
