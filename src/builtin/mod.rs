//! Built-in components registered at startup unless disabled.

pub mod prompts;
pub mod resources;
pub mod tools;

pub use prompts::{builtin_prompts, TemplatePrompt};
pub use resources::FileResource;
pub use tools::{EchoTool, SystemInfoTool};

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::error::Result;
use crate::registry::Registry;

/// Register the built-in tool, resource, and prompt set.
pub fn register_builtins(registry: &Registry, workspace: &Path) -> Result<()> {
    registry.tools.register(Arc::new(EchoTool), HashMap::new())?;
    registry
        .tools
        .register(Arc::new(SystemInfoTool::new()), HashMap::new())?;

    registry
        .resources
        .register(Arc::new(FileResource::new(workspace)), HashMap::new())?;

    for prompt in builtin_prompts() {
        registry.prompts.register(prompt, HashMap::new())?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_builtins_populates_registry() {
        let registry = Registry::new();
        register_builtins(&registry, Path::new("/tmp")).unwrap();

        let counts = registry.counts();
        assert_eq!(counts.tools, 2);
        assert_eq!(counts.resources, 1);
        assert_eq!(counts.prompts, 2);

        assert!(registry.tools.has("echo"));
        assert!(registry.tools.has("system_info"));
        assert!(registry.resources.has("file"));
        assert!(registry.prompts.has("code_review"));
        assert!(registry.prompts.has("explain_code"));
    }
}
