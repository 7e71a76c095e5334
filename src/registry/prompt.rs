//! Prompt registry: named message templates rendered with client arguments.

use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::protocol::types::{Prompt, PromptArgument, PromptMessage};
use crate::registry::component::{ComponentFactory, ComponentType, HandlerSource, PromptHandler};
use crate::registry::store::Entries;
use crate::registry::tool::check_factory_kind;

pub struct PromptRegistry {
    entries: Entries<dyn PromptHandler>,
    factory: Option<Arc<dyn ComponentFactory>>,
}

impl PromptRegistry {
    pub fn new() -> Self {
        Self::with_factory(None)
    }

    pub fn with_factory(factory: Option<Arc<dyn ComponentFactory>>) -> Self {
        Self {
            entries: Entries::new(ComponentType::Prompt),
            factory,
        }
    }

    /// Register a live prompt instance under its definition name.
    pub fn register(
        &self,
        handler: Arc<dyn PromptHandler>,
        metadata: HashMap<String, Value>,
    ) -> Result<()> {
        let def = handler.definition();
        let mut seeded = HashMap::from([
            ("description".to_string(), json!(def.description)),
            ("arguments".to_string(), json!(def.arguments)),
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
        check_factory_kind(self.factory.as_deref(), class_ident, ComponentType::Prompt)?;
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

    /// Merged metadata for every registered prompt, keyed by name.
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
    pub fn get(&self, name: &str) -> Result<Arc<dyn PromptHandler>> {
        match self.entries.source(name)? {
            HandlerSource::Instance(handler) => Ok(handler),
            HandlerSource::Deferred(ident) => {
                let factory = self.factory.as_ref().ok_or_else(|| {
                    Error::registration("no component factory configured")
                })?;
                let handler = factory.build_prompt(&ident).ok_or_else(|| {
                    Error::registration(format!(
                        "class '{}' does not resolve to a renderable prompt",
                        ident
                    ))
                })?;
                self.entries.cache_instance(name, handler.clone());
                Ok(handler)
            }
        }
    }

    /// Wire definitions for every registered prompt, deferred ones included.
    pub fn definitions(&self) -> Vec<Prompt> {
        let mut names = self.entries.names();
        names.sort();

        names
            .into_iter()
            .filter_map(|name| match self.entries.source(&name).ok()? {
                HandlerSource::Instance(handler) => Some(handler.definition()),
                HandlerSource::Deferred(_) => {
                    let meta = self.entries.metadata(&name).ok()?;
                    let arguments = meta
                        .get("arguments")
                        .cloned()
                        .and_then(|v| serde_json::from_value::<Vec<PromptArgument>>(v).ok())
                        .unwrap_or_default();
                    Some(Prompt {
                        name: name.clone(),
                        description: meta
                            .get("description")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                        arguments,
                    })
                }
            })
            .collect()
    }

    /// Render a prompt. Missing required arguments are an `InvalidParams`
    /// error before the handler runs.
    pub async fn render(
        &self,
        name: &str,
        arguments: HashMap<String, String>,
    ) -> Result<Vec<PromptMessage>> {
        let handler = self.get(name)?;

        for arg in handler.definition().arguments {
            if arg.required && !arguments.contains_key(&arg.name) {
                return Err(Error::InvalidParams(format!(
                    "prompt '{}' requires argument '{}'",
                    name, arg.name
                )));
            }
        }

        handler.render(arguments).await
    }

    /// Description shown alongside a rendered prompt.
    pub fn description(&self, name: &str) -> Option<String> {
        self.entries
            .metadata(name)
            .ok()
            .and_then(|m| m.get("description").and_then(Value::as_str).map(String::from))
            .filter(|d| !d.is_empty())
    }
}

impl Default for PromptRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::component::text_content;
    use crate::protocol::types::Role;
    use async_trait::async_trait;

    struct GreetingPrompt;

    #[async_trait]
    impl PromptHandler for GreetingPrompt {
        fn definition(&self) -> Prompt {
            Prompt {
                name: "greeting".to_string(),
                description: "Greet someone by name".to_string(),
                arguments: vec![PromptArgument {
                    name: "who".to_string(),
                    description: Some("Name to greet".to_string()),
                    required: true,
                }],
            }
        }

        async fn render(&self, args: HashMap<String, String>) -> Result<Vec<PromptMessage>> {
            let who = args.get("who").cloned().unwrap_or_default();
            Ok(vec![PromptMessage {
                role: Role::User,
                content: text_content(format!("Hello, {}!", who)),
            }])
        }
    }

    #[tokio::test]
    async fn test_render() {
        let registry = PromptRegistry::new();
        registry.register(Arc::new(GreetingPrompt), HashMap::new()).unwrap();

        let mut args = HashMap::new();
        args.insert("who".to_string(), "world".to_string());

        let messages = registry.render("greeting", args).await.unwrap();
        assert_eq!(messages.len(), 1);
        match &messages[0].content {
            crate::protocol::types::ContentBlock::Text { text } => {
                assert_eq!(text, "Hello, world!");
            }
            other => panic!("expected text content, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_render_missing_required_argument() {
        let registry = PromptRegistry::new();
        registry.register(Arc::new(GreetingPrompt), HashMap::new()).unwrap();

        let err = registry.render("greeting", HashMap::new()).await.unwrap_err();
        assert!(matches!(err, Error::InvalidParams(_)));
        assert_eq!(err.jsonrpc_code(), -32602);
    }

    #[tokio::test]
    async fn test_render_unknown_prompt() {
        let registry = PromptRegistry::new();
        let err = registry.render("missing", HashMap::new()).await.unwrap_err();
        assert!(matches!(err, Error::Registration(_)));
    }

    #[test]
    fn test_definitions_and_description() {
        let registry = PromptRegistry::new();
        registry.register(Arc::new(GreetingPrompt), HashMap::new()).unwrap();

        let defs = registry.definitions();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].arguments.len(), 1);
        assert!(defs[0].arguments[0].required);

        assert_eq!(
            registry.description("greeting").as_deref(),
            Some("Greet someone by name")
        );
        assert!(registry.description("missing").is_none());
    }
}
