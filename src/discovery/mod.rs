//! Component discovery.
//!
//! Walks configured directories, statically scans candidate source files for
//! component classes, extracts metadata from their doc comments, and feeds
//! the registries. Scanned files are never executed.

pub mod scanner;
pub mod watcher;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use glob::Pattern;
use serde_json::{json, Value};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::registry::{ComponentFactory, ComponentType, Registry};
use scanner::{component_kind, derive_component_name, parse_doc, scan_source};

const MAX_DISCOVERY_DEPTH: usize = 20;

/// Options recognized by the discovery scan.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Recurse into subdirectories. Defaults to true.
    pub recursive: bool,
    /// Filename globs a candidate must match.
    pub file_patterns: Vec<String>,
    /// Filename globs that disqualify a candidate.
    pub exclude_patterns: Vec<String>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            recursive: true,
            file_patterns: vec!["*.*".to_string()],
            exclude_patterns: vec!["*Test.*".to_string()],
        }
    }
}

/// Candidate component produced by the static scan.
///
/// This is candidate data only. It becomes a registration entry once
/// [`Discovery::register_discovered`] pushes it through the registry checks.
#[derive(Debug, Clone)]
pub struct DiscoveredComponent {
    pub kind: ComponentType,
    pub class_ident: String,
    pub file_path: PathBuf,
    pub namespace: String,
    pub name: String,
    pub description: String,
    pub schema: Option<Value>,
    pub methods: Vec<String>,
    pub properties: Vec<String>,
}

impl DiscoveredComponent {
    /// Registration metadata for this candidate.
    pub fn metadata(&self) -> HashMap<String, Value> {
        let mut meta = HashMap::new();
        meta.insert("description".to_string(), json!(self.description));
        if let Some(schema) = &self.schema {
            meta.insert("schema".to_string(), schema.clone());
        }
        meta.insert("class".to_string(), json!(self.class_ident));
        meta.insert("namespace".to_string(), json!(self.namespace));
        meta.insert(
            "file_path".to_string(),
            json!(self.file_path.display().to_string()),
        );
        meta.insert("methods".to_string(), json!(self.methods));
        meta.insert("properties".to_string(), json!(self.properties));
        meta
    }
}

/// Everything a scan found, keyed by component name.
#[derive(Debug, Clone, Default)]
pub struct Discovered {
    pub tools: HashMap<String, DiscoveredComponent>,
    pub resources: HashMap<String, DiscoveredComponent>,
    pub prompts: HashMap<String, DiscoveredComponent>,
}

impl Discovered {
    pub fn total(&self) -> usize {
        self.tools.len() + self.resources.len() + self.prompts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// All candidates across the three kinds.
    pub fn all(&self) -> impl Iterator<Item = &DiscoveredComponent> {
        self.tools
            .values()
            .chain(self.resources.values())
            .chain(self.prompts.values())
    }

    fn bucket_mut(&mut self, kind: ComponentType) -> &mut HashMap<String, DiscoveredComponent> {
        match kind {
            ComponentType::Tool => &mut self.tools,
            ComponentType::Resource => &mut self.resources,
            ComponentType::Prompt => &mut self.prompts,
        }
    }
}

/// Outcome of pushing discovered candidates into the registries.
#[derive(Debug, Default)]
pub struct RegistrationSummary {
    pub registered: usize,
    /// Component name paired with the failure reason.
    pub failed: Vec<(String, String)>,
}

type FileFilter = Box<dyn Fn(&Path) -> bool + Send + Sync>;

/// Scans directories for component classes.
pub struct Discovery {
    config: DiscoveryConfig,
    factory: Option<Arc<dyn ComponentFactory>>,
    filters: Vec<FileFilter>,
}

impl Discovery {
    pub fn new() -> Self {
        Self::with_config(DiscoveryConfig::default())
    }

    pub fn with_config(config: DiscoveryConfig) -> Self {
        Self {
            config,
            factory: None,
            filters: Vec::new(),
        }
    }

    /// Attach the factory used to validate and register class identifiers.
    pub fn with_factory(mut self, factory: Arc<dyn ComponentFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Add a predicate every candidate file path must pass.
    pub fn add_filter<F>(&mut self, filter: F)
    where
        F: Fn(&Path) -> bool + Send + Sync + 'static,
    {
        self.filters.push(Box::new(filter));
    }

    /// Scan `paths` for component classes.
    ///
    /// Non-existent paths are skipped without error. Duplicate names within a
    /// kind keep the first occurrence in walk order.
    pub fn discover(&self, paths: &[PathBuf]) -> Discovered {
        let include = compile_patterns(&self.config.file_patterns);
        let exclude = compile_patterns(&self.config.exclude_patterns);

        let mut discovered = Discovered::default();
        for root in paths {
            if !root.exists() {
                debug!(path = %root.display(), "discovery path does not exist, skipping");
                continue;
            }

            let mut files = self.candidate_files(root, &include, &exclude);
            files.sort();

            for file in files {
                if let Some(component) = self.scan_file(&file) {
                    let bucket = discovered.bucket_mut(component.kind);
                    if bucket.contains_key(&component.name) {
                        warn!(
                            name = %component.name,
                            file = %file.display(),
                            "duplicate component name, keeping first occurrence"
                        );
                        continue;
                    }
                    debug!(
                        kind = %component.kind,
                        name = %component.name,
                        file = %file.display(),
                        "discovered component"
                    );
                    bucket.insert(component.name.clone(), component);
                }
            }
        }
        discovered
    }

    /// Whether `path` holds a concrete class of the given kind.
    pub fn is_valid_component(&self, path: &Path, kind: ComponentType) -> bool {
        self.scan_file(path).map(|c| c.kind == kind).unwrap_or(false)
    }

    /// Whether the factory can build `class_ident` as the given kind.
    pub fn is_valid_component_class(&self, class_ident: &str, kind: ComponentType) -> bool {
        self.factory
            .as_deref()
            .and_then(|f| f.kind_of(class_ident))
            .map(|k| k == kind)
            .unwrap_or(false)
    }

    /// Best-effort metadata extraction. Malformed sources yield an empty map.
    pub fn extract_metadata(&self, path: &Path) -> HashMap<String, Value> {
        self.scan_file(path).map(|c| c.metadata()).unwrap_or_default()
    }

    /// Push every discovered candidate into its registry.
    ///
    /// A failure for one component never stops the rest. Failures are logged
    /// and collected in the summary.
    pub fn register_discovered(
        &self,
        discovered: &Discovered,
        registry: &Registry,
    ) -> RegistrationSummary {
        let mut summary = RegistrationSummary::default();
        let buckets = [
            (ComponentType::Tool, &discovered.tools),
            (ComponentType::Resource, &discovered.resources),
            (ComponentType::Prompt, &discovered.prompts),
        ];

        for (kind, bucket) in buckets {
            let mut names: Vec<&String> = bucket.keys().collect();
            names.sort();

            for name in names {
                let component = &bucket[name];
                match registry.register_deferred(
                    kind,
                    name,
                    &component.class_ident,
                    component.metadata(),
                ) {
                    Ok(()) => {
                        debug!(kind = %kind, name = %name, "registered discovered component");
                        summary.registered += 1;
                    }
                    Err(err) => {
                        warn!(
                            kind = %kind,
                            name = %name,
                            error = %err,
                            "failed to register discovered component"
                        );
                        summary.failed.push((name.clone(), err.to_string()));
                    }
                }
            }
        }
        summary
    }

    /// Re-check that each candidate's class identifier still resolves to the
    /// right kind. Logs and returns the identifiers that no longer do.
    pub fn validate_discovered(&self, discovered: &Discovered) -> Vec<String> {
        let factory = match &self.factory {
            Some(factory) => Arc::clone(factory),
            None => {
                warn!("no component factory configured, all discovered classes are unresolvable");
                return discovered.all().map(|c| c.class_ident.clone()).collect();
            }
        };

        let mut invalid = Vec::new();
        for component in discovered.all() {
            match factory.kind_of(&component.class_ident) {
                Some(kind) if kind == component.kind => {}
                Some(kind) => {
                    warn!(
                        class = %component.class_ident,
                        expected = %component.kind,
                        actual = %kind,
                        "discovered class no longer satisfies its component kind"
                    );
                    invalid.push(component.class_ident.clone());
                }
                None => {
                    warn!(
                        class = %component.class_ident,
                        "discovered class no longer resolves"
                    );
                    invalid.push(component.class_ident.clone());
                }
            }
        }
        invalid
    }

    fn candidate_files(&self, root: &Path, include: &[Pattern], exclude: &[Pattern]) -> Vec<PathBuf> {
        if root.is_file() {
            if self.is_candidate(root, include, exclude) {
                return vec![root.to_path_buf()];
            }
            return Vec::new();
        }

        let max_depth = if self.config.recursive {
            MAX_DISCOVERY_DEPTH
        } else {
            1
        };

        WalkDir::new(root)
            .max_depth(max_depth)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| self.is_candidate(p, include, exclude))
            .collect()
    }

    fn is_candidate(&self, path: &Path, include: &[Pattern], exclude: &[Pattern]) -> bool {
        let file_name = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => name,
            None => return false,
        };

        if !include.iter().any(|p| p.matches(file_name)) {
            return false;
        }
        if exclude.iter().any(|p| p.matches(file_name)) {
            return false;
        }
        self.filters.iter().all(|f| f(path))
    }

    fn scan_file(&self, path: &Path) -> Option<DiscoveredComponent> {
        let source = std::fs::read_to_string(path).ok()?;
        let class = scan_source(&source)?;
        let kind = component_kind(&class)?;

        let doc = class.doc.as_deref().map(parse_doc).unwrap_or_default();
        let name = doc
            .name
            .unwrap_or_else(|| derive_component_name(&class.class_name, kind));

        Some(DiscoveredComponent {
            kind,
            class_ident: class.class_ident(),
            file_path: path.to_path_buf(),
            namespace: class.namespace,
            name,
            description: doc.description,
            schema: doc.schema,
            methods: class.methods,
            properties: class.properties,
        })
    }
}

impl Default for Discovery {
    fn default() -> Self {
        Self::new()
    }
}

fn compile_patterns(patterns: &[String]) -> Vec<Pattern> {
    patterns
        .iter()
        .filter_map(|p| Pattern::new(p).ok())
        .collect()
}
