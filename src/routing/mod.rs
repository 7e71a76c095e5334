//! Routing pattern resolver.
//!
//! Turns component kinds and names into REST-like route names, URIs, and
//! descriptors a host HTTP router can mount. The resolver never touches a
//! router itself.

use std::collections::HashMap;

use dashmap::DashMap;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::Serialize;

// Query-string encoding keeps the characters RFC 3986 marks unreserved.
const QUERY_ENCODE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

const MAX_NAME_LEN: usize = 100;

/// Route template for one component kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoutePattern {
    pub prefix: String,
    pub pattern: String,
    pub methods: Vec<String>,
    pub name_pattern: String,
    pub controller_action: String,
}

/// One mountable route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteDescriptor {
    pub methods: Vec<String>,
    pub uri: String,
    pub name: String,
    pub action: String,
}

/// Resolves route patterns for built-in and custom component kinds.
pub struct RouteResolver {
    custom_patterns: DashMap<String, RoutePattern>,
    constraints: DashMap<String, String>,
    middleware: DashMap<String, Vec<String>>,
}

impl RouteResolver {
    pub fn new() -> Self {
        let resolver = Self {
            custom_patterns: DashMap::new(),
            constraints: DashMap::new(),
            middleware: DashMap::new(),
        };

        resolver.register_constraint("name", "[A-Za-z0-9._-]+");
        resolver.register_middleware("public", vec!["cors".to_string()]);
        resolver.register_middleware(
            "authenticated",
            vec!["cors".to_string(), "auth".to_string()],
        );
        resolver.register_middleware(
            "common",
            vec!["cors".to_string(), "throttle".to_string()],
        );
        resolver
    }

    /// The route pattern for `kind`, or `None` for unregistered kinds.
    pub fn pattern(&self, kind: &str) -> Option<RoutePattern> {
        builtin_pattern(kind).or_else(|| self.custom_patterns.get(kind).map(|p| p.clone()))
    }

    /// Register a pattern for a custom kind. Overrides any previous one.
    pub fn register_pattern(&self, kind: impl Into<String>, pattern: RoutePattern) {
        self.custom_patterns.insert(kind.into(), pattern);
    }

    /// Dotted route name for a component, such as `mcp.tools.system_info`.
    /// An action suffixes the name.
    pub fn route_name(&self, kind: &str, raw_name: &str, action: Option<&str>) -> String {
        let normalized = normalize_component_name(raw_name);
        let mut name = self
            .pattern(kind)
            .map(|p| p.name_pattern.replace("{name}", &normalized))
            .unwrap_or_else(|| format!("mcp.{}s.{}", kind, normalized));

        if let Some(action) = action {
            name.push('.');
            name.push_str(action);
        }
        name
    }

    /// URI for a component, such as `mcp/tools/system_info`. Parameters are
    /// appended as a query string, sorted by key.
    pub fn route_uri(
        &self,
        kind: &str,
        raw_name: &str,
        params: Option<&HashMap<String, String>>,
    ) -> String {
        let normalized = normalize_component_name(raw_name);
        let mut uri = self
            .pattern(kind)
            .map(|p| p.pattern.replace("{name}", &normalized))
            .unwrap_or_else(|| format!("mcp/{}s/{}", kind, normalized));

        if let Some(params) = params {
            if !params.is_empty() {
                let mut keys: Vec<&String> = params.keys().collect();
                keys.sort();
                let query: Vec<String> = keys
                    .into_iter()
                    .map(|k| {
                        format!(
                            "{}={}",
                            utf8_percent_encode(k, QUERY_ENCODE),
                            utf8_percent_encode(&params[k], QUERY_ENCODE)
                        )
                    })
                    .collect();
                uri.push('?');
                uri.push_str(&query.join("&"));
            }
        }
        uri
    }

    /// The four REST-like routes for one component: index, show, store, and
    /// execute.
    pub fn resource_routes(&self, kind: &str, raw_name: &str) -> Vec<RouteDescriptor> {
        let normalized = normalize_component_name(raw_name);
        let pattern = self.pattern(kind).unwrap_or_else(|| RoutePattern {
            prefix: format!("mcp/{}s", kind),
            pattern: format!("mcp/{}s/{{name}}", kind),
            methods: vec!["GET".to_string(), "POST".to_string()],
            name_pattern: format!("mcp.{}s.{{name}}", kind),
            controller_action: "handle".to_string(),
        });

        let item_uri = pattern.pattern.replace("{name}", &normalized);
        let base_name = pattern.name_pattern.replace("{name}", &normalized);
        let index_name = pattern.name_pattern.replace("{name}", "index");

        vec![
            RouteDescriptor {
                methods: vec!["GET".to_string()],
                uri: pattern.prefix.clone(),
                name: index_name,
                action: "index".to_string(),
            },
            RouteDescriptor {
                methods: vec!["GET".to_string()],
                uri: item_uri.clone(),
                name: format!("{}.show", base_name),
                action: "show".to_string(),
            },
            RouteDescriptor {
                methods: vec!["POST".to_string()],
                uri: pattern.prefix,
                name: format!("{}.store", base_name),
                action: "store".to_string(),
            },
            RouteDescriptor {
                methods: vec!["POST".to_string(), "PUT".to_string()],
                uri: item_uri,
                name: format!("{}.execute", base_name),
                action: "execute".to_string(),
            },
        ]
    }

    /// Regex constraint string for a route parameter, if registered.
    pub fn constraint(&self, param: &str) -> Option<String> {
        self.constraints.get(param).map(|c| c.clone())
    }

    pub fn register_constraint(&self, param: impl Into<String>, regex: impl Into<String>) {
        self.constraints.insert(param.into(), regex.into());
    }

    /// Middleware names behind an alias, if registered.
    pub fn middleware(&self, alias: &str) -> Option<Vec<String>> {
        self.middleware.get(alias).map(|m| m.clone())
    }

    pub fn register_middleware(&self, alias: impl Into<String>, middleware: Vec<String>) {
        self.middleware.insert(alias.into(), middleware);
    }
}

impl Default for RouteResolver {
    fn default() -> Self {
        Self::new()
    }
}

fn builtin_pattern(kind: &str) -> Option<RoutePattern> {
    match kind {
        "tool" => Some(RoutePattern {
            prefix: "mcp/tools".to_string(),
            pattern: "mcp/tools/{name}".to_string(),
            methods: vec!["POST".to_string()],
            name_pattern: "mcp.tools.{name}".to_string(),
            controller_action: "execute".to_string(),
        }),
        "resource" => Some(RoutePattern {
            prefix: "mcp/resources".to_string(),
            pattern: "mcp/resources/{name}".to_string(),
            methods: vec!["GET".to_string()],
            name_pattern: "mcp.resources.{name}".to_string(),
            controller_action: "read".to_string(),
        }),
        "prompt" => Some(RoutePattern {
            prefix: "mcp/prompts".to_string(),
            pattern: "mcp/prompts/{name}".to_string(),
            methods: vec!["GET".to_string(), "POST".to_string()],
            name_pattern: "mcp.prompts.{name}".to_string(),
            controller_action: "render".to_string(),
        }),
        _ => None,
    }
}

/// Fold a raw component name into `_`-joined lowercase segments.
///
/// camelCase boundaries and the separators `.`, `-`, and `_` all become a
/// single `_`. Repeated separators collapse.
pub fn normalize_component_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;
    let mut prev_sep = false;

    for c in name.chars() {
        if c == '.' || c == '-' || c == '_' {
            if !prev_sep && !out.is_empty() {
                out.push('_');
                prev_sep = true;
            }
            prev_lower = false;
            continue;
        }
        if c.is_uppercase() {
            if prev_lower {
                out.push('_');
            }
            for lower in c.to_lowercase() {
                out.push(lower);
            }
            prev_lower = false;
        } else {
            prev_lower = c.is_lowercase() || c.is_ascii_digit();
            out.push(c);
        }
        prev_sep = false;
    }

    out.trim_matches('_').to_string()
}

/// Turn a normalized name back into dotted display form.
///
/// Not a strict inverse: `-` separators normalize to `_` and come back as
/// `.`.
pub fn denormalize_component_name(name: &str) -> String {
    name.split('_')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(".")
}

/// Whether a name is acceptable for registration and routing.
pub fn validate_component_name(name: &str) -> bool {
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return false;
    }
    let edges_ok = !name.starts_with(['.', '-', '_']) && !name.ends_with(['.', '-', '_']);
    edges_ok
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_patterns() {
        let resolver = RouteResolver::new();

        let tool = resolver.pattern("tool").unwrap();
        assert_eq!(tool.prefix, "mcp/tools");
        assert_eq!(tool.pattern, "mcp/tools/{name}");
        assert_eq!(tool.methods, vec!["POST"]);
        assert_eq!(tool.controller_action, "execute");

        assert_eq!(resolver.pattern("resource").unwrap().methods, vec!["GET"]);
        assert_eq!(
            resolver.pattern("prompt").unwrap().methods,
            vec!["GET", "POST"]
        );
        assert!(resolver.pattern("widget").is_none());
    }

    #[test]
    fn test_custom_pattern_registration() {
        let resolver = RouteResolver::new();
        resolver.register_pattern(
            "widget",
            RoutePattern {
                prefix: "mcp/widgets".to_string(),
                pattern: "mcp/widgets/{name}".to_string(),
                methods: vec!["GET".to_string()],
                name_pattern: "mcp.widgets.{name}".to_string(),
                controller_action: "show".to_string(),
            },
        );

        assert!(resolver.pattern("widget").is_some());
        assert_eq!(
            resolver.route_name("widget", "fancyWidget", None),
            "mcp.widgets.fancy_widget"
        );
    }

    #[test]
    fn test_route_name() {
        let resolver = RouteResolver::new();
        assert_eq!(
            resolver.route_name("tool", "systemInfo", None),
            "mcp.tools.system_info"
        );
        assert_eq!(
            resolver.route_name("tool", "files.read", Some("execute")),
            "mcp.tools.files_read.execute"
        );
        // Unknown kinds fall back to the generic template.
        assert_eq!(
            resolver.route_name("gadget", "My-Thing", None),
            "mcp.gadgets.my_thing"
        );
    }

    #[test]
    fn test_route_uri_with_params() {
        let resolver = RouteResolver::new();
        assert_eq!(
            resolver.route_uri("resource", "userProfile", None),
            "mcp/resources/user_profile"
        );

        let mut params = HashMap::new();
        params.insert("page".to_string(), "2".to_string());
        params.insert("filter".to_string(), "a b".to_string());
        assert_eq!(
            resolver.route_uri("resource", "userProfile", Some(&params)),
            "mcp/resources/user_profile?filter=a%20b&page=2"
        );
    }

    #[test]
    fn test_resource_routes_shape() {
        let resolver = RouteResolver::new();
        let routes = resolver.resource_routes("tool", "echo");

        assert_eq!(routes.len(), 4);
        assert_eq!(routes[0].action, "index");
        assert_eq!(routes[0].uri, "mcp/tools");
        assert_eq!(routes[0].name, "mcp.tools.index");
        assert_eq!(routes[1].action, "show");
        assert_eq!(routes[1].uri, "mcp/tools/echo");
        assert_eq!(routes[1].name, "mcp.tools.echo.show");
        assert_eq!(routes[2].action, "store");
        assert_eq!(routes[2].methods, vec!["POST"]);
        assert_eq!(routes[3].action, "execute");
        assert_eq!(routes[3].methods, vec!["POST", "PUT"]);
        assert_eq!(routes[3].uri, "mcp/tools/echo");
    }

    #[test]
    fn test_normalize_component_name() {
        assert_eq!(normalize_component_name("systemInfo"), "system_info");
        assert_eq!(normalize_component_name("files.read"), "files_read");
        assert_eq!(normalize_component_name("My-Tool"), "my_tool");
        assert_eq!(normalize_component_name("a..b__c"), "a_b_c");
        assert_eq!(normalize_component_name(".edge."), "edge");
        assert_eq!(normalize_component_name("v2Tool"), "v2_tool");
    }

    #[test]
    fn test_denormalize_component_name() {
        assert_eq!(denormalize_component_name("system_info"), "system.info");
        assert_eq!(
            denormalize_component_name(&normalize_component_name("files.read")),
            "files.read"
        );
        // Dashes do not survive the round trip.
        assert_eq!(
            denormalize_component_name(&normalize_component_name("my-tool")),
            "my.tool"
        );
    }

    #[test]
    fn test_validate_component_name() {
        assert!(validate_component_name("echo"));
        assert!(validate_component_name("files.read-v2_beta"));

        assert!(!validate_component_name(""));
        assert!(!validate_component_name(&"x".repeat(101)));
        assert!(validate_component_name(&"x".repeat(100)));
        assert!(!validate_component_name(".leading"));
        assert!(!validate_component_name("trailing_"));
        assert!(!validate_component_name("has space"));
        assert!(!validate_component_name("has/slash"));
    }

    #[test]
    fn test_middleware_aliases() {
        let resolver = RouteResolver::new();
        assert_eq!(resolver.middleware("public").unwrap(), vec!["cors"]);
        assert_eq!(
            resolver.middleware("authenticated").unwrap(),
            vec!["cors", "auth"]
        );
        assert!(resolver.middleware("unknown").is_none());

        resolver.register_middleware("internal", vec!["wireguard".to_string()]);
        assert_eq!(resolver.middleware("internal").unwrap(), vec!["wireguard"]);
    }

    #[test]
    fn test_constraints() {
        let resolver = RouteResolver::new();
        assert_eq!(resolver.constraint("name").unwrap(), "[A-Za-z0-9._-]+");
        assert!(resolver.constraint("id").is_none());

        resolver.register_constraint("id", r"\d+");
        assert_eq!(resolver.constraint("id").unwrap(), r"\d+");
    }
}
