//! Resource registry: URI-addressed readable data.
//!
//! Reads resolve the target by exact URI first, then by matching the
//! registered URI templates (`{placeholder}` segments).

use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::protocol::types::{Resource, ResourceContents};
use crate::registry::component::{
    ComponentFactory, ComponentType, HandlerSource, ResourceHandler,
};
use crate::registry::store::Entries;
use crate::registry::tool::check_factory_kind;

pub struct ResourceRegistry {
    entries: Entries<dyn ResourceHandler>,
    factory: Option<Arc<dyn ComponentFactory>>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::with_factory(None)
    }

    pub fn with_factory(factory: Option<Arc<dyn ComponentFactory>>) -> Self {
        Self {
            entries: Entries::new(ComponentType::Resource),
            factory,
        }
    }

    /// Register a live resource instance under its definition name.
    pub fn register(
        &self,
        handler: Arc<dyn ResourceHandler>,
        metadata: HashMap<String, Value>,
    ) -> Result<()> {
        let def = handler.definition();
        let mut seeded = HashMap::from([
            ("description".to_string(), json!(def.description.clone().unwrap_or_default())),
            ("uri".to_string(), json!(def.uri)),
            ("mime_type".to_string(), json!(def.mime_type)),
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
        check_factory_kind(self.factory.as_deref(), class_ident, ComponentType::Resource)?;
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

    /// Merged metadata for every registered resource, keyed by name.
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
    pub fn get(&self, name: &str) -> Result<Arc<dyn ResourceHandler>> {
        match self.entries.source(name)? {
            HandlerSource::Instance(handler) => Ok(handler),
            HandlerSource::Deferred(ident) => {
                let factory = self.factory.as_ref().ok_or_else(|| {
                    Error::registration("no component factory configured")
                })?;
                let handler = factory.build_resource(&ident).ok_or_else(|| {
                    Error::registration(format!(
                        "class '{}' does not resolve to a readable resource",
                        ident
                    ))
                })?;
                self.entries.cache_instance(name, handler.clone());
                Ok(handler)
            }
        }
    }

    /// Wire definitions for every registered resource, deferred ones included.
    pub fn definitions(&self) -> Vec<Resource> {
        let mut names = self.entries.names();
        names.sort();

        names
            .into_iter()
            .filter_map(|name| match self.entries.source(&name).ok()? {
                HandlerSource::Instance(handler) => Some(handler.definition()),
                HandlerSource::Deferred(_) => {
                    let meta = self.entries.metadata(&name).ok()?;
                    Some(Resource {
                        uri: meta.get("uri").and_then(Value::as_str).unwrap_or_default().to_string(),
                        name: name.clone(),
                        description: meta
                            .get("description")
                            .and_then(Value::as_str)
                            .filter(|d| !d.is_empty())
                            .map(String::from),
                        mime_type: meta
                            .get("mime_type")
                            .and_then(Value::as_str)
                            .map(String::from),
                    })
                }
            })
            .collect()
    }

    /// Read the resource matching `uri`.
    ///
    /// Exact URI matches win over template matches; template placeholders are
    /// handed to the handler alongside `options`.
    pub async fn read(
        &self,
        uri: &str,
        options: HashMap<String, Value>,
    ) -> Result<Vec<ResourceContents>> {
        let (name, extracted) = self.resolve_uri(uri)?;
        let handler = self.get(&name)?;

        let mut params = options;
        for (key, value) in extracted {
            params.insert(key, Value::String(value));
        }

        handler.read(uri, params).await
    }

    fn resolve_uri(&self, uri: &str) -> Result<(String, HashMap<String, String>)> {
        let mut names = self.entries.names();
        names.sort();

        let mut template_match: Option<(String, HashMap<String, String>)> = None;
        for name in names {
            let meta = match self.entries.metadata(&name) {
                Ok(meta) => meta,
                Err(_) => continue,
            };
            let template = match meta.get("uri").and_then(Value::as_str) {
                Some(template) => template,
                None => continue,
            };

            if template == uri {
                return Ok((name, HashMap::new()));
            }
            if template_match.is_none() {
                if let Some(extracted) = match_uri_template(template, uri) {
                    template_match = Some((name, extracted));
                }
            }
        }

        template_match
            .ok_or_else(|| Error::registration(format!("no resource matches uri '{}'", uri)))
    }
}

impl Default for ResourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Match a URI against a `{placeholder}` template, extracting placeholder
/// values. A trailing placeholder spans the rest of the URI; interior ones
/// stop at `/`.
pub fn match_uri_template(template: &str, uri: &str) -> Option<HashMap<String, String>> {
    if !template.contains('{') {
        return (template == uri).then(HashMap::new);
    }

    let mut pattern = String::from("^");
    let mut placeholders = Vec::new();
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        let (literal, after) = rest.split_at(start);
        pattern.push_str(&regex::escape(literal));

        let end = after.find('}')?;
        placeholders.push(after[1..end].to_string());
        rest = &after[end + 1..];

        if rest.is_empty() {
            pattern.push_str("(.+)");
        } else {
            pattern.push_str("([^/]+)");
        }
    }
    pattern.push_str(&regex::escape(rest));
    pattern.push('$');

    let re = regex::Regex::new(&pattern).ok()?;
    let caps = re.captures(uri)?;

    Some(
        placeholders
            .into_iter()
            .enumerate()
            .map(|(i, name)| (name, caps[i + 1].to_string()))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct FixedResource {
        uri: String,
        name: String,
    }

    #[async_trait]
    impl ResourceHandler for FixedResource {
        fn definition(&self) -> Resource {
            Resource {
                uri: self.uri.clone(),
                name: self.name.clone(),
                description: Some("test data".to_string()),
                mime_type: Some("text/plain".to_string()),
            }
        }

        async fn read(
            &self,
            uri: &str,
            params: HashMap<String, Value>,
        ) -> Result<Vec<ResourceContents>> {
            let suffix = params
                .get("path")
                .and_then(Value::as_str)
                .unwrap_or("static");
            Ok(vec![ResourceContents {
                uri: uri.to_string(),
                mime_type: Some("text/plain".to_string()),
                text: Some(format!("contents:{}", suffix)),
            }])
        }
    }

    #[test]
    fn test_match_uri_template() {
        // Exact, no placeholders.
        assert_eq!(
            match_uri_template("memo://status", "memo://status"),
            Some(HashMap::new())
        );
        assert_eq!(match_uri_template("memo://status", "memo://other"), None);

        // Trailing placeholder spans segments.
        let vars = match_uri_template("file://{path}", "file:///srv/data/a.txt").unwrap();
        assert_eq!(vars["path"], "/srv/data/a.txt");

        // Interior placeholder stops at '/'.
        let vars = match_uri_template("db://{table}/schema", "db://users/schema").unwrap();
        assert_eq!(vars["table"], "users");
        assert_eq!(match_uri_template("db://{table}/schema", "db://a/b/schema"), None);
    }

    #[test]
    fn test_register_and_list() {
        let registry = ResourceRegistry::new();
        registry
            .register(
                Arc::new(FixedResource {
                    uri: "memo://status".to_string(),
                    name: "status".to_string(),
                }),
                HashMap::new(),
            )
            .unwrap();

        let defs = registry.definitions();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].uri, "memo://status");

        let meta = registry.metadata("status").unwrap();
        assert_eq!(meta["uri"], json!("memo://status"));
    }

    #[tokio::test]
    async fn test_read_exact_uri() {
        let registry = ResourceRegistry::new();
        registry
            .register(
                Arc::new(FixedResource {
                    uri: "memo://status".to_string(),
                    name: "status".to_string(),
                }),
                HashMap::new(),
            )
            .unwrap();

        let contents = registry.read("memo://status", HashMap::new()).await.unwrap();
        assert_eq!(contents[0].text.as_deref(), Some("contents:static"));
    }

    #[tokio::test]
    async fn test_read_template_uri_extracts_params() {
        let registry = ResourceRegistry::new();
        registry
            .register(
                Arc::new(FixedResource {
                    uri: "file://{path}".to_string(),
                    name: "files".to_string(),
                }),
                HashMap::new(),
            )
            .unwrap();

        let contents = registry
            .read("file:///tmp/notes.txt", HashMap::new())
            .await
            .unwrap();
        assert_eq!(contents[0].text.as_deref(), Some("contents:/tmp/notes.txt"));
    }

    #[tokio::test]
    async fn test_read_unknown_uri_is_registration_error() {
        let registry = ResourceRegistry::new();
        let err = registry
            .read("memo://missing", HashMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Registration(_)));
    }

    #[tokio::test]
    async fn test_exact_match_beats_template() {
        let registry = ResourceRegistry::new();
        registry
            .register(
                Arc::new(FixedResource {
                    uri: "file://{path}".to_string(),
                    name: "a_files".to_string(),
                }),
                HashMap::new(),
            )
            .unwrap();
        registry
            .register(
                Arc::new(FixedResource {
                    uri: "file:///pinned".to_string(),
                    name: "pinned".to_string(),
                }),
                HashMap::new(),
            )
            .unwrap();

        // The exact entry wins even though the template also matches and
        // sorts first.
        let contents = registry.read("file:///pinned", HashMap::new()).await.unwrap();
        assert_eq!(contents[0].text.as_deref(), Some("contents:static"));
    }
}
