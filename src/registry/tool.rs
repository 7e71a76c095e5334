//! Tool registry: name → tool handler with execution and schema validation.

use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::protocol::types::{Tool, ToolResult};
use crate::registry::component::{ComponentFactory, ComponentType, HandlerSource, ToolHandler};
use crate::registry::store::Entries;

pub struct ToolRegistry {
    entries: Entries<dyn ToolHandler>,
    factory: Option<Arc<dyn ComponentFactory>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::with_factory(None)
    }

    pub fn with_factory(factory: Option<Arc<dyn ComponentFactory>>) -> Self {
        Self {
            entries: Entries::new(ComponentType::Tool),
            factory,
        }
    }

    /// Register a live tool instance under its definition name.
    pub fn register(
        &self,
        handler: Arc<dyn ToolHandler>,
        metadata: HashMap<String, Value>,
    ) -> Result<()> {
        let def = handler.definition();
        let mut seeded = HashMap::from([
            ("description".to_string(), json!(def.description)),
            ("schema".to_string(), def.input_schema.clone()),
        ]);
        seeded.extend(metadata);

        self.entries
            .insert(&def.name, HandlerSource::Instance(handler), seeded)
    }

    /// Register a class identifier to be built by the factory on first use.
    pub fn register_deferred(
        &self,
        name: &str,
        class_ident: &str,
        metadata: HashMap<String, Value>,
    ) -> Result<()> {
        check_factory_kind(self.factory.as_deref(), class_ident, ComponentType::Tool)?;
        self.entries
            .insert(name, HandlerSource::Deferred(class_ident.to_string()), metadata)
    }

    pub fn unregister(&self, name: &str) -> bool {
        self.entries.remove(name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.entries.has(name)
    }

    pub fn count(&self) -> usize {
        self.entries.count()
    }

    pub fn clear(&self) {
        self.entries.clear()
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.names()
    }

    /// Merged metadata for every registered tool, keyed by name.
    pub fn get_all(&self) -> HashMap<String, HashMap<String, Value>> {
        self.entries.get_all()
    }

    pub fn metadata(&self, name: &str) -> Result<HashMap<String, Value>> {
        self.entries.metadata(name)
    }

    pub fn filter(&self, criteria: &HashMap<String, Value>) -> HashMap<String, HashMap<String, Value>> {
        self.entries.filter(criteria)
    }

    pub fn search(&self, pattern: &str) -> Result<HashMap<String, HashMap<String, Value>>> {
        self.entries.search(pattern)
    }

    /// Resolve the handler for `name`, building a deferred registration
    /// through the factory at most once.
    pub fn get(&self, name: &str) -> Result<Arc<dyn ToolHandler>> {
        match self.entries.source(name)? {
            HandlerSource::Instance(handler) => Ok(handler),
            HandlerSource::Deferred(ident) => {
                let factory = self.factory.as_ref().ok_or_else(|| {
                    Error::registration("no component factory configured")
                })?;
                let handler = factory.build_tool(&ident).ok_or_else(|| {
                    Error::registration(format!(
                        "class '{}' does not resolve to an executable tool",
                        ident
                    ))
                })?;
                // Built outside any map guard; losing the race just means
                // another caller cached an equivalent instance first.
                self.entries.cache_instance(name, handler.clone());
                Ok(handler)
            }
        }
    }

    /// Wire definitions for every registered tool, deferred ones included.
    pub fn definitions(&self) -> Vec<Tool> {
        let mut names = self.entries.names();
        names.sort();

        names
            .into_iter()
            .filter_map(|name| match self.entries.source(&name).ok()? {
                HandlerSource::Instance(handler) => Some(handler.definition()),
                HandlerSource::Deferred(_) => {
                    let meta = self.entries.metadata(&name).ok()?;
                    Some(definition_from_metadata(&name, &meta))
                }
            })
            .collect()
    }

    /// Execute a tool by name.
    pub async fn execute(
        &self,
        name: &str,
        arguments: HashMap<String, Value>,
    ) -> Result<ToolResult> {
        let handler = self.get(name)?;
        handler.execute(arguments).await
    }

    /// Check `arguments` against the tool's input schema: every `required`
    /// field must be present, extra fields are allowed, and a tool with no
    /// schema accepts anything.
    pub fn validate_parameters(
        &self,
        name: &str,
        arguments: &HashMap<String, Value>,
    ) -> Result<bool> {
        let metadata = self.entries.metadata(name)?;
        let schema = metadata.get("schema").cloned().unwrap_or(Value::Null);

        let required = match schema.get("required").and_then(Value::as_array) {
            Some(required) => required,
            None => return Ok(true),
        };

        Ok(required
            .iter()
            .filter_map(Value::as_str)
            .all(|field| arguments.contains_key(field)))
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn definition_from_metadata(name: &str, meta: &HashMap<String, Value>) -> Tool {
    Tool {
        name: name.to_string(),
        description: meta
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        input_schema: match meta.get("schema") {
            Some(Value::Null) | None => json!({"type": "object"}),
            Some(schema) if schema == &json!({}) => json!({"type": "object"}),
            Some(schema) => schema.clone(),
        },
    }
}

/// Shared deferred-registration check: the identifier must be known to the
/// factory and build the kind this registry stores.
pub(crate) fn check_factory_kind(
    factory: Option<&dyn ComponentFactory>,
    class_ident: &str,
    expected: ComponentType,
) -> Result<()> {
    let factory =
        factory.ok_or_else(|| Error::registration("no component factory configured"))?;

    match factory.kind_of(class_ident) {
        Some(kind) if kind == expected => Ok(()),
        Some(kind) => Err(Error::registration(format!(
            "class '{}' is a {}, not a {}",
            class_ident, kind, expected
        ))),
        None => Err(Error::registration(format!(
            "unknown component class: {}",
            class_ident
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::component::{success_result, StaticFactory};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct EchoTool;

    #[async_trait]
    impl ToolHandler for EchoTool {
        fn definition(&self) -> Tool {
            Tool {
                name: "echo".to_string(),
                description: "Echo text back".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {"text": {"type": "string"}},
                    "required": ["text"]
                }),
            }
        }

        async fn execute(&self, args: HashMap<String, Value>) -> Result<ToolResult> {
            let text = args.get("text").and_then(Value::as_str).unwrap_or_default();
            Ok(success_result(text))
        }
    }

    struct SchemalessTool;

    #[async_trait]
    impl ToolHandler for SchemalessTool {
        fn definition(&self) -> Tool {
            Tool {
                name: "anything".to_string(),
                description: String::new(),
                input_schema: json!({"type": "object"}),
            }
        }

        async fn execute(&self, _args: HashMap<String, Value>) -> Result<ToolResult> {
            Ok(success_result("done"))
        }
    }

    #[test]
    fn test_register_seeds_metadata_from_definition() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool), HashMap::new()).unwrap();

        let meta = registry.metadata("echo").unwrap();
        assert_eq!(meta["description"], json!("Echo text back"));
        assert_eq!(meta["type"], json!("tool"));
        assert!(meta["schema"]["required"]
            .as_array()
            .unwrap()
            .contains(&json!("text")));
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool), HashMap::new()).unwrap();

        let err = registry
            .register(Arc::new(EchoTool), HashMap::new())
            .unwrap_err();
        assert!(matches!(err, Error::Registration(_)));
        assert_eq!(registry.count(), 1);
    }

    #[tokio::test]
    async fn test_execute() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool), HashMap::new()).unwrap();

        let mut args = HashMap::new();
        args.insert("text".to_string(), json!("hi"));
        let result = registry.execute("echo", args).await.unwrap();
        assert!(!result.is_error);

        let err = registry.execute("missing", HashMap::new()).await.unwrap_err();
        assert!(matches!(err, Error::Registration(_)));
    }

    #[test]
    fn test_validate_parameters() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool), HashMap::new()).unwrap();
        registry
            .register(Arc::new(SchemalessTool), HashMap::new())
            .unwrap();

        // Required field missing.
        assert!(!registry.validate_parameters("echo", &HashMap::new()).unwrap());

        // Required field present, extras allowed.
        let mut args = HashMap::new();
        args.insert("text".to_string(), json!("hi"));
        args.insert("extra".to_string(), json!(1));
        assert!(registry.validate_parameters("echo", &args).unwrap());

        // No required fields declared: anything goes.
        assert!(registry
            .validate_parameters("anything", &HashMap::new())
            .unwrap());

        assert!(registry.validate_parameters("missing", &HashMap::new()).is_err());
    }

    #[test]
    fn test_deferred_registration_requires_known_ident() {
        let factory = Arc::new(StaticFactory::new());
        factory.add_tool("App\\Tools\\EchoTool", || Arc::new(EchoTool));

        let registry = ToolRegistry::with_factory(Some(factory));
        registry
            .register_deferred("echo", "App\\Tools\\EchoTool", HashMap::new())
            .unwrap();

        let err = registry
            .register_deferred("ghost", "App\\Tools\\GhostTool", HashMap::new())
            .unwrap_err();
        assert!(matches!(err, Error::Registration(_)));

        // No factory configured at all.
        let bare = ToolRegistry::new();
        assert!(bare
            .register_deferred("echo", "App\\Tools\\EchoTool", HashMap::new())
            .is_err());
    }

    #[tokio::test]
    async fn test_deferred_resolution_builds_once() {
        static BUILDS: AtomicUsize = AtomicUsize::new(0);

        let factory = Arc::new(StaticFactory::new());
        factory.add_tool("App\\Tools\\EchoTool", || {
            BUILDS.fetch_add(1, Ordering::SeqCst);
            Arc::new(EchoTool)
        });

        let registry = ToolRegistry::with_factory(Some(factory));
        registry
            .register_deferred("echo", "App\\Tools\\EchoTool", HashMap::new())
            .unwrap();

        let mut args = HashMap::new();
        args.insert("text".to_string(), json!("a"));
        registry.execute("echo", args.clone()).await.unwrap();
        registry.execute("echo", args).await.unwrap();

        assert_eq!(BUILDS.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_get_all_lists_deferred_entries() {
        let factory = Arc::new(StaticFactory::new());
        factory.add_tool("App\\Tools\\EchoTool", || Arc::new(EchoTool));

        let registry = ToolRegistry::with_factory(Some(factory));
        registry.register(Arc::new(SchemalessTool), HashMap::new()).unwrap();

        let mut meta = HashMap::new();
        meta.insert("description".to_string(), json!("Lazy echo"));
        registry
            .register_deferred("echo", "App\\Tools\\EchoTool", meta)
            .unwrap();

        let all = registry.get_all();
        assert_eq!(all.len(), 2);
        assert_eq!(all["echo"]["description"], json!("Lazy echo"));
        assert_eq!(all["anything"]["type"], json!("tool"));
    }

    #[test]
    fn test_definitions_cover_deferred_entries() {
        let factory = Arc::new(StaticFactory::new());
        factory.add_tool("App\\Tools\\EchoTool", || Arc::new(EchoTool));

        let registry = ToolRegistry::with_factory(Some(factory));
        registry.register(Arc::new(SchemalessTool), HashMap::new()).unwrap();

        let mut meta = HashMap::new();
        meta.insert("description".to_string(), json!("Lazy echo"));
        registry
            .register_deferred("echo", "App\\Tools\\EchoTool", meta)
            .unwrap();

        let defs = registry.definitions();
        assert_eq!(defs.len(), 2);

        let echo = defs.iter().find(|d| d.name == "echo").unwrap();
        assert_eq!(echo.description, "Lazy echo");
        assert_eq!(echo.input_schema, json!({"type": "object"}));
    }
}
