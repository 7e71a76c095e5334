//! Component registries.
//!
//! One typed registry per component kind plus a unifying facade that
//! dispatches on [`ComponentType`]. Registries are safe to share across
//! request handlers; they are constructed at server start and cleared at
//! shutdown.

pub mod component;
pub mod prompt;
pub mod resource;
mod store;
pub mod tool;

pub use component::{
    ComponentFactory, ComponentType, HandlerSource, PromptHandler, ResourceHandler, StaticFactory,
    ToolHandler,
};
pub use prompt::PromptRegistry;
pub use resource::ResourceRegistry;
pub use tool::ToolRegistry;

use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Result;

/// Per-kind entry counts, as reported in status and diagnostics snapshots.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RegistryCounts {
    pub tools: usize,
    pub resources: usize,
    pub prompts: usize,
}

impl RegistryCounts {
    pub fn total(&self) -> usize {
        self.tools + self.resources + self.prompts
    }
}

/// Unifying facade over the three typed registries.
pub struct Registry {
    pub tools: ToolRegistry,
    pub resources: ResourceRegistry,
    pub prompts: PromptRegistry,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            tools: ToolRegistry::new(),
            resources: ResourceRegistry::new(),
            prompts: PromptRegistry::new(),
        }
    }

    /// Build a registry whose deferred registrations resolve through the
    /// given factory.
    pub fn with_factory(factory: Arc<dyn ComponentFactory>) -> Self {
        Self {
            tools: ToolRegistry::with_factory(Some(factory.clone())),
            resources: ResourceRegistry::with_factory(Some(factory.clone())),
            prompts: PromptRegistry::with_factory(Some(factory)),
        }
    }

    /// Register a class identifier under the registry for `kind`.
    pub fn register_deferred(
        &self,
        kind: ComponentType,
        name: &str,
        class_ident: &str,
        metadata: HashMap<String, Value>,
    ) -> Result<()> {
        match kind {
            ComponentType::Tool => self.tools.register_deferred(name, class_ident, metadata),
            ComponentType::Resource => {
                self.resources.register_deferred(name, class_ident, metadata)
            }
            ComponentType::Prompt => self.prompts.register_deferred(name, class_ident, metadata),
        }
    }

    pub fn has(&self, kind: ComponentType, name: &str) -> bool {
        match kind {
            ComponentType::Tool => self.tools.has(name),
            ComponentType::Resource => self.resources.has(name),
            ComponentType::Prompt => self.prompts.has(name),
        }
    }

    pub fn unregister(&self, kind: ComponentType, name: &str) -> bool {
        match kind {
            ComponentType::Tool => self.tools.unregister(name),
            ComponentType::Resource => self.resources.unregister(name),
            ComponentType::Prompt => self.prompts.unregister(name),
        }
    }

    pub fn metadata(&self, kind: ComponentType, name: &str) -> Result<HashMap<String, Value>> {
        match kind {
            ComponentType::Tool => self.tools.metadata(name),
            ComponentType::Resource => self.resources.metadata(name),
            ComponentType::Prompt => self.prompts.metadata(name),
        }
    }

    /// Merged metadata for every entry of `kind`, keyed by name.
    pub fn get_all(&self, kind: ComponentType) -> HashMap<String, HashMap<String, Value>> {
        match kind {
            ComponentType::Tool => self.tools.get_all(),
            ComponentType::Resource => self.resources.get_all(),
            ComponentType::Prompt => self.prompts.get_all(),
        }
    }

    pub fn names(&self, kind: ComponentType) -> Vec<String> {
        match kind {
            ComponentType::Tool => self.tools.names(),
            ComponentType::Resource => self.resources.names(),
            ComponentType::Prompt => self.prompts.names(),
        }
    }

    pub fn count(&self, kind: ComponentType) -> usize {
        match kind {
            ComponentType::Tool => self.tools.count(),
            ComponentType::Resource => self.resources.count(),
            ComponentType::Prompt => self.prompts.count(),
        }
    }

    pub fn search(
        &self,
        kind: ComponentType,
        pattern: &str,
    ) -> Result<HashMap<String, HashMap<String, Value>>> {
        match kind {
            ComponentType::Tool => self.tools.search(pattern),
            ComponentType::Resource => self.resources.search(pattern),
            ComponentType::Prompt => self.prompts.search(pattern),
        }
    }

    pub fn filter(
        &self,
        kind: ComponentType,
        criteria: &HashMap<String, Value>,
    ) -> HashMap<String, HashMap<String, Value>> {
        match kind {
            ComponentType::Tool => self.tools.filter(criteria),
            ComponentType::Resource => self.resources.filter(criteria),
            ComponentType::Prompt => self.prompts.filter(criteria),
        }
    }

    pub fn counts(&self) -> RegistryCounts {
        RegistryCounts {
            tools: self.tools.count(),
            resources: self.resources.count(),
            prompts: self.prompts.count(),
        }
    }

    pub fn clear_all(&self) {
        self.tools.clear();
        self.resources.clear();
        self.prompts.clear();
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
