//! Component model: handler traits, handler sources, and the factory that
//! builds deferred components from class identifiers.

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Result;
use crate::protocol::types::{
    ContentBlock, Prompt, PromptMessage, Resource, ResourceContents, Tool, ToolResult,
};

/// The three addressable component kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentType {
    Tool,
    Resource,
    Prompt,
}

impl ComponentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tool => "tool",
            Self::Resource => "resource",
            Self::Prompt => "prompt",
        }
    }

    pub fn all() -> [ComponentType; 3] {
        [Self::Tool, Self::Resource, Self::Prompt]
    }
}

impl std::fmt::Display for ComponentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Handler for tool calls.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// The tool definition listed to clients.
    fn definition(&self) -> Tool;

    /// Execute the tool with the given arguments.
    async fn execute(&self, arguments: HashMap<String, Value>) -> Result<ToolResult>;
}

/// Handler for resource reads.
#[async_trait]
pub trait ResourceHandler: Send + Sync {
    /// The resource definition listed to clients. `uri` may be a template
    /// with `{placeholder}` segments.
    fn definition(&self) -> Resource;

    /// Read the resource. `params` carries template placeholders extracted
    /// from the requested URI plus any caller-supplied options.
    async fn read(&self, uri: &str, params: HashMap<String, Value>)
        -> Result<Vec<ResourceContents>>;
}

/// Handler for prompt rendering.
#[async_trait]
pub trait PromptHandler: Send + Sync {
    /// The prompt definition listed to clients.
    fn definition(&self) -> Prompt;

    /// Render the prompt into messages.
    async fn render(&self, arguments: HashMap<String, String>) -> Result<Vec<PromptMessage>>;
}

/// How a registered component is backed: a live instance, or a class
/// identifier built on first use through the [`ComponentFactory`].
pub enum HandlerSource<H: ?Sized> {
    Instance(Arc<H>),
    Deferred(String),
}

impl<H: ?Sized> Clone for HandlerSource<H> {
    fn clone(&self) -> Self {
        match self {
            Self::Instance(h) => Self::Instance(Arc::clone(h)),
            Self::Deferred(ident) => Self::Deferred(ident.clone()),
        }
    }
}

impl<H: ?Sized> std::fmt::Debug for HandlerSource<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Instance(_) => write!(f, "Instance(..)"),
            Self::Deferred(ident) => write!(f, "Deferred({ident})"),
        }
    }
}

impl<H: ?Sized> HandlerSource<H> {
    pub fn is_deferred(&self) -> bool {
        matches!(self, Self::Deferred(_))
    }
}

/// Builds components from class identifiers.
///
/// The registries consult this when a deferred registration is resolved, and
/// at registration time to confirm the identifier exists with the right kind.
pub trait ComponentFactory: Send + Sync {
    /// The component kind an identifier builds, if known.
    fn kind_of(&self, ident: &str) -> Option<ComponentType>;

    fn build_tool(&self, ident: &str) -> Option<Arc<dyn ToolHandler>>;
    fn build_resource(&self, ident: &str) -> Option<Arc<dyn ResourceHandler>>;
    fn build_prompt(&self, ident: &str) -> Option<Arc<dyn PromptHandler>>;
}

enum Constructor {
    Tool(Arc<dyn Fn() -> Arc<dyn ToolHandler> + Send + Sync>),
    Resource(Arc<dyn Fn() -> Arc<dyn ResourceHandler> + Send + Sync>),
    Prompt(Arc<dyn Fn() -> Arc<dyn PromptHandler> + Send + Sync>),
}

impl Constructor {
    fn kind(&self) -> ComponentType {
        match self {
            Self::Tool(_) => ComponentType::Tool,
            Self::Resource(_) => ComponentType::Resource,
            Self::Prompt(_) => ComponentType::Prompt,
        }
    }
}

/// A [`ComponentFactory`] over a fixed table of constructor closures.
///
/// Hosts seed it with the identifiers discovery will hand back, typically
/// fully-qualified class names.
#[derive(Default)]
pub struct StaticFactory {
    constructors: DashMap<String, Constructor>,
}

impl StaticFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_tool<F>(&self, ident: impl Into<String>, ctor: F)
    where
        F: Fn() -> Arc<dyn ToolHandler> + Send + Sync + 'static,
    {
        self.constructors
            .insert(ident.into(), Constructor::Tool(Arc::new(ctor)));
    }

    pub fn add_resource<F>(&self, ident: impl Into<String>, ctor: F)
    where
        F: Fn() -> Arc<dyn ResourceHandler> + Send + Sync + 'static,
    {
        self.constructors
            .insert(ident.into(), Constructor::Resource(Arc::new(ctor)));
    }

    pub fn add_prompt<F>(&self, ident: impl Into<String>, ctor: F)
    where
        F: Fn() -> Arc<dyn PromptHandler> + Send + Sync + 'static,
    {
        self.constructors
            .insert(ident.into(), Constructor::Prompt(Arc::new(ctor)));
    }

    pub fn len(&self) -> usize {
        self.constructors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constructors.is_empty()
    }
}

impl ComponentFactory for StaticFactory {
    fn kind_of(&self, ident: &str) -> Option<ComponentType> {
        self.constructors.get(ident).map(|c| c.kind())
    }

    fn build_tool(&self, ident: &str) -> Option<Arc<dyn ToolHandler>> {
        match self.constructors.get(ident)?.value() {
            Constructor::Tool(ctor) => Some(ctor()),
            _ => None,
        }
    }

    fn build_resource(&self, ident: &str) -> Option<Arc<dyn ResourceHandler>> {
        match self.constructors.get(ident)?.value() {
            Constructor::Resource(ctor) => Some(ctor()),
            _ => None,
        }
    }

    fn build_prompt(&self, ident: &str) -> Option<Arc<dyn PromptHandler>> {
        match self.constructors.get(ident)?.value() {
            Constructor::Prompt(ctor) => Some(ctor()),
            _ => None,
        }
    }
}

// ===== Result Helpers =====

/// Helper to create a text content block.
pub fn text_content(text: impl Into<String>) -> ContentBlock {
    ContentBlock::Text { text: text.into() }
}

/// Helper to create a successful tool result.
pub fn success_result(text: impl Into<String>) -> ToolResult {
    ToolResult {
        content: vec![text_content(text)],
        is_error: false,
    }
}

/// Helper to create an error tool result.
pub fn error_result(text: impl Into<String>) -> ToolResult {
    ToolResult {
        content: vec![text_content(text)],
        is_error: true,
    }
}

/// Helper to extract a required string argument.
pub fn get_string_arg(args: &HashMap<String, Value>, name: &str) -> Result<String> {
    args.get(name)
        .and_then(|v| v.as_str())
        .map(String::from)
        .ok_or_else(|| {
            crate::error::Error::InvalidParams(format!("Missing required argument: {}", name))
        })
}

/// Helper to extract an optional string argument.
pub fn get_optional_string_arg(args: &HashMap<String, Value>, name: &str) -> Option<String> {
    args.get(name).and_then(|v| v.as_str()).map(String::from)
}

/// Helper to extract a boolean argument with a default.
pub fn get_bool_arg(args: &HashMap<String, Value>, name: &str, default: bool) -> bool {
    args.get(name).and_then(|v| v.as_bool()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct NoopTool;

    #[async_trait]
    impl ToolHandler for NoopTool {
        fn definition(&self) -> Tool {
            Tool {
                name: "noop".to_string(),
                description: "Does nothing".to_string(),
                input_schema: json!({"type": "object"}),
            }
        }

        async fn execute(&self, _arguments: HashMap<String, Value>) -> Result<ToolResult> {
            Ok(success_result("ok"))
        }
    }

    #[test]
    fn test_component_type_display() {
        assert_eq!(ComponentType::Tool.to_string(), "tool");
        assert_eq!(ComponentType::Resource.to_string(), "resource");
        assert_eq!(ComponentType::Prompt.to_string(), "prompt");
        assert_eq!(ComponentType::all().len(), 3);
    }

    #[test]
    fn test_static_factory_kind_lookup() {
        let factory = StaticFactory::new();
        factory.add_tool("App\\Tools\\NoopTool", || Arc::new(NoopTool));

        assert_eq!(
            factory.kind_of("App\\Tools\\NoopTool"),
            Some(ComponentType::Tool)
        );
        assert_eq!(factory.kind_of("App\\Tools\\Unknown"), None);
    }

    #[test]
    fn test_static_factory_builds_matching_kind_only() {
        let factory = StaticFactory::new();
        factory.add_tool("App\\Tools\\NoopTool", || Arc::new(NoopTool));

        assert!(factory.build_tool("App\\Tools\\NoopTool").is_some());
        assert!(factory.build_resource("App\\Tools\\NoopTool").is_none());
        assert!(factory.build_prompt("App\\Tools\\NoopTool").is_none());
    }

    #[test]
    fn test_handler_source_clone_and_debug() {
        let deferred: HandlerSource<dyn ToolHandler> =
            HandlerSource::Deferred("App\\Tools\\NoopTool".to_string());
        assert!(deferred.is_deferred());
        assert!(format!("{:?}", deferred.clone()).contains("NoopTool"));

        let instance: HandlerSource<dyn ToolHandler> = HandlerSource::Instance(Arc::new(NoopTool));
        assert!(!instance.is_deferred());
    }

    #[test]
    fn test_get_string_arg() {
        let mut args = HashMap::new();
        args.insert("name".to_string(), json!("value"));

        assert_eq!(get_string_arg(&args, "name").unwrap(), "value");
        assert!(get_string_arg(&args, "missing").is_err());
    }

    #[test]
    fn test_optional_and_bool_args() {
        let mut args = HashMap::new();
        args.insert("name".to_string(), json!("value"));
        args.insert("flag".to_string(), json!(true));

        assert_eq!(
            get_optional_string_arg(&args, "name").as_deref(),
            Some("value")
        );
        assert_eq!(get_optional_string_arg(&args, "missing"), None);

        assert!(get_bool_arg(&args, "flag", false));
        assert!(get_bool_arg(&args, "missing", true));
        assert!(!get_bool_arg(&args, "missing", false));
    }

    #[test]
    fn test_result_helpers() {
        let ok = success_result("Success!");
        assert!(!ok.is_error);
        assert_eq!(ok.content.len(), 1);

        let err = error_result("Error!");
        assert!(err.is_error);
    }
}
