// Orbis - the host registry, its storage and the feature modules merged into it

use std::sync::Arc;
use tracing::info;

use crate::config::OrbisOptions;
use crate::error::OrbisResult;
use crate::metadata::{EntityDescriptor, ObjectDefinition, Operation, OrbisMetadata};
use crate::module::OrbisModule;
use crate::schema::{self, GeneratedSchema};
use crate::session::Session;
use crate::storage::Storage;
use crate::validation;

pub struct Orbis {
    options: OrbisOptions,
    metadata: OrbisMetadata,
    storage: Arc<dyn Storage>,
    modules: Vec<Box<dyn OrbisModule>>,
}

impl Orbis {
    pub fn new(storage: Arc<dyn Storage>, options: OrbisOptions) -> OrbisResult<Self> {
        let mut metadata = OrbisMetadata::new();
        metadata.register_builtins()?;
        Ok(Self {
            options,
            metadata,
            storage,
            modules: Vec::new(),
        })
    }

    pub fn options(&self) -> &OrbisOptions {
        &self.options
    }

    pub fn metadata(&self) -> &OrbisMetadata {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut OrbisMetadata {
        &mut self.metadata
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub fn register(&mut self, definition: ObjectDefinition) -> OrbisResult<()> {
        self.metadata.register(definition)
    }

    pub fn entity(&self, type_name: &str) -> OrbisResult<&EntityDescriptor> {
        self.metadata.get_entity(type_name)
    }

    /// Merge a module's registry into the host. Nothing changes if a name collides.
    pub fn add_module<M>(&mut self, module: M) -> OrbisResult<()>
    where
        M: OrbisModule + 'static,
    {
        self.metadata.merge(module.metadata()?)?;
        info!(module = %module.name(), "added module");
        self.modules.push(Box::new(module));
        Ok(())
    }

    pub fn has_module(&self, name: &str) -> bool {
        self.modules
            .iter()
            .any(|m| m.name() == name || m.provided_names().iter().any(|n| n == name))
    }

    pub fn module_names(&self) -> Vec<&str> {
        self.modules.iter().map(|m| m.name()).collect()
    }

    /// Build validation schemas for every object and interface registered so far.
    pub fn generate_schemas(&mut self) -> OrbisResult<()> {
        validation::generate_schemas(&mut self.metadata)
    }

    pub fn should_generate(&self, entity: &EntityDescriptor, operation: Operation) -> bool {
        self.options.should_generate(entity, operation)
    }

    /// External API description of everything registered so far.
    pub fn generate_schema(&self) -> OrbisResult<GeneratedSchema> {
        schema::generate_schema(&self.metadata, &self.options)
    }

    pub fn session(&self) -> Session<'_> {
        Session::new(self)
    }
}
