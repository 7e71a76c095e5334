//! Static source scanner.
//!
//! Parses class-style component sources just far enough to pull out the
//! declared namespace, the first top-level class declaration, its supertypes,
//! and doc-comment metadata. File content is never executed.

use regex::Regex;
use serde_json::Value;

use crate::registry::ComponentType;

/// The first concrete class found in a source file.
#[derive(Debug, Clone)]
pub struct ScannedClass {
    pub namespace: String,
    pub class_name: String,
    pub parent: Option<String>,
    pub interfaces: Vec<String>,
    pub doc: Option<String>,
    pub methods: Vec<String>,
    pub properties: Vec<String>,
}

impl ScannedClass {
    /// Fully-qualified class identifier.
    pub fn class_ident(&self) -> String {
        format!("{}\\{}", self.namespace, self.class_name)
    }
}

/// Metadata pulled from a doc comment.
#[derive(Debug, Clone, Default)]
pub struct DocInfo {
    pub name: Option<String>,
    pub description: String,
    pub schema: Option<Value>,
}

/// Scan a source file for its first top-level class declaration.
///
/// Returns `None` when there is no namespace or no class, or when the first
/// declaration is an interface, a trait, or an abstract class. A `None` is a
/// skip decision, not an error.
pub fn scan_source(source: &str) -> Option<ScannedClass> {
    let namespace_re = Regex::new(r"(?m)^\s*namespace\s+([A-Za-z_][A-Za-z0-9_\\]*)\s*;").ok()?;
    let declaration_re = Regex::new(
        r"(?m)^\s*((?:abstract|final)\s+)?(class|interface|trait)\s+([A-Za-z_][A-Za-z0-9_]*)(?:\s+extends\s+([A-Za-z_\\][A-Za-z0-9_\\]*))?(?:\s+implements\s+([A-Za-z0-9_\\,\s]+?))?\s*\{",
    )
    .ok()?;

    let namespace = namespace_re.captures(source)?.get(1)?.as_str().to_string();
    let decl = declaration_re.captures(source)?;

    let modifier = decl.get(1).map(|m| m.as_str().trim()).unwrap_or("");
    let keyword = decl.get(2)?.as_str();
    if keyword != "class" || modifier == "abstract" {
        return None;
    }

    let class_name = decl.get(3)?.as_str().to_string();
    let parent = decl.get(4).map(|m| m.as_str().to_string());
    let interfaces = decl
        .get(5)
        .map(|m| {
            m.as_str()
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default();

    let decl_start = decl.get(0).map(|m| m.start()).unwrap_or(0);
    let doc = doc_comment_before(source, decl_start);

    Some(ScannedClass {
        namespace,
        class_name,
        parent,
        interfaces,
        doc,
        methods: scan_public_methods(source),
        properties: scan_public_properties(source),
    })
}

/// The component kind a scanned class maps to, judged by its supertypes.
///
/// A class whose parent (or any implemented interface) has a base name
/// ending in `Tool`, `Resource`, or `Prompt` maps to that kind.
pub fn component_kind(class: &ScannedClass) -> Option<ComponentType> {
    let mut supertypes: Vec<&str> = Vec::new();
    if let Some(parent) = &class.parent {
        supertypes.push(parent);
    }
    supertypes.extend(class.interfaces.iter().map(String::as_str));

    for supertype in supertypes {
        let base = supertype.rsplit('\\').next().unwrap_or(supertype);
        if base.ends_with("Tool") {
            return Some(ComponentType::Tool);
        }
        if base.ends_with("Resource") {
            return Some(ComponentType::Resource);
        }
        if base.ends_with("Prompt") {
            return Some(ComponentType::Prompt);
        }
    }
    None
}

/// Parse `@name` / `@description` / `@schema` annotations and free text out
/// of a doc comment. Malformed pieces are skipped, never an error.
pub fn parse_doc(doc: &str) -> DocInfo {
    let mut info = DocInfo::default();
    let mut text_lines: Vec<&str> = Vec::new();

    for line in doc.lines() {
        let line = line.trim().trim_start_matches('*').trim();
        if line.is_empty() {
            continue;
        }

        if let Some(rest) = annotation(line, "@name") {
            if let Some(name) = rest.split_whitespace().next() {
                info.name = Some(name.to_string());
            }
        } else if let Some(rest) = annotation(line, "@description") {
            if !rest.is_empty() {
                info.description = rest.to_string();
            }
        } else if let Some(rest) = annotation(line, "@schema") {
            if let Ok(schema) = serde_json::from_str::<Value>(rest) {
                info.schema = Some(schema);
            }
        } else if !line.starts_with('@') {
            text_lines.push(line);
        }
    }

    if info.description.is_empty() {
        info.description = text_lines.join(" ");
    }
    info
}

/// Value of an `@tag` annotation line, requiring a word boundary after the tag.
fn annotation<'a>(line: &'a str, tag: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(tag)?;
    if rest.is_empty() || rest.starts_with(char::is_whitespace) {
        Some(rest.trim())
    } else {
        None
    }
}

/// Derive a registry name from a class name: strip the kind suffix, then
/// snake_case what remains. `EchoTool` becomes `echo`, `SystemInfoTool`
/// becomes `system_info`.
pub fn derive_component_name(class_name: &str, kind: ComponentType) -> String {
    let suffix = match kind {
        ComponentType::Tool => "Tool",
        ComponentType::Resource => "Resource",
        ComponentType::Prompt => "Prompt",
    };

    let stem = class_name.strip_suffix(suffix).filter(|s| !s.is_empty());
    to_snake_case(stem.unwrap_or(class_name))
}

fn to_snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;
    for c in name.chars() {
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
    }
    out
}

fn doc_comment_before(source: &str, decl_start: usize) -> Option<String> {
    let head = &source[..decl_start];
    let open = head.rfind("/**")?;
    let close_rel = head[open..].find("*/")?;
    let close = open + close_rel + 2;

    // Only whitespace may sit between the doc block and the declaration.
    if !head[close..].trim().is_empty() {
        return None;
    }

    Some(head[open + 3..close - 2].trim().to_string())
}

fn scan_public_methods(source: &str) -> Vec<String> {
    match Regex::new(r"(?m)^\s*public\s+(?:static\s+)?function\s+([A-Za-z_][A-Za-z0-9_]*)\s*\(") {
        Ok(re) => re.captures_iter(source).map(|c| c[1].to_string()).collect(),
        Err(_) => Vec::new(),
    }
}

fn scan_public_properties(source: &str) -> Vec<String> {
    match Regex::new(r"(?m)^\s*public\s+(?:readonly\s+)?(?:[?\w\\|]+\s+)?\$(\w+)") {
        Ok(re) => re.captures_iter(source).map(|c| c[1].to_string()).collect(),
        Err(_) => Vec::new(),
    }
}
