//! Concurrent entry store shared by the typed registries.
//!
//! Registration is atomic with respect to lookup: readers never observe a
//! half-inserted entry, and a duplicate insert fails without mutating state.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::registry::component::{ComponentType, HandlerSource};

/// One registered component.
pub struct Entry<H: ?Sized> {
    pub source: HandlerSource<H>,
    pub metadata: HashMap<String, Value>,
    pub registered_at: DateTime<Utc>,
}

/// Name-keyed entry map for one component kind.
pub(crate) struct Entries<H: ?Sized> {
    kind: ComponentType,
    map: DashMap<String, Entry<H>>,
}

impl<H: ?Sized> Entries<H> {
    pub fn new(kind: ComponentType) -> Self {
        Self {
            kind,
            map: DashMap::new(),
        }
    }

    pub fn kind(&self) -> ComponentType {
        self.kind
    }

    /// Insert a new entry. Fails without mutating state when the name is
    /// invalid or already taken.
    pub fn insert(
        &self,
        name: &str,
        source: HandlerSource<H>,
        metadata: HashMap<String, Value>,
    ) -> Result<()> {
        validate_name(name)?;

        match self.map.entry(name.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(Error::registration(format!(
                "{} '{}' is already registered",
                self.kind, name
            ))),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Entry {
                    source,
                    metadata,
                    registered_at: Utc::now(),
                });
                Ok(())
            }
        }
    }

    pub fn remove(&self, name: &str) -> bool {
        self.map.remove(name).is_some()
    }

    pub fn has(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }

    pub fn source(&self, name: &str) -> Result<HandlerSource<H>> {
        self.map
            .get(name)
            .map(|e| e.source.clone())
            .ok_or_else(|| self.missing(name))
    }

    /// Swap a deferred source for the instance built from it. A no-op when
    /// the entry was unregistered or already resolved in the meantime.
    pub fn cache_instance(&self, name: &str, instance: Arc<H>) {
        if let Some(mut entry) = self.map.get_mut(name) {
            if entry.source.is_deferred() {
                entry.source = HandlerSource::Instance(instance);
            }
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.map.iter().map(|e| e.key().clone()).collect()
    }

    pub fn count(&self) -> usize {
        self.map.len()
    }

    pub fn clear(&self) {
        self.map.clear();
    }

    /// Every entry's merged metadata, keyed by name. Deferred entries are
    /// listed without being built.
    pub fn get_all(&self) -> HashMap<String, HashMap<String, Value>> {
        self.map
            .iter()
            .map(|e| (e.key().clone(), self.merged_metadata(e.key(), &e.metadata)))
            .collect()
    }

    /// Stored metadata merged over the defaults every entry carries.
    pub fn metadata(&self, name: &str) -> Result<HashMap<String, Value>> {
        let entry = self.map.get(name).ok_or_else(|| self.missing(name))?;
        Ok(self.merged_metadata(name, &entry.metadata))
    }

    pub fn registered_at(&self, name: &str) -> Result<DateTime<Utc>> {
        self.map
            .get(name)
            .map(|e| e.registered_at)
            .ok_or_else(|| self.missing(name))
    }

    /// Entries whose metadata matches every given key/value pair exactly.
    pub fn filter(&self, criteria: &HashMap<String, Value>) -> HashMap<String, HashMap<String, Value>> {
        self.map
            .iter()
            .filter(|e| {
                let merged = self.merged_metadata(e.key(), &e.metadata);
                criteria.iter().all(|(k, v)| merged.get(k) == Some(v))
            })
            .map(|e| (e.key().clone(), self.merged_metadata(e.key(), &e.metadata)))
            .collect()
    }

    /// Entries whose name matches a glob-style pattern (`*` wildcard).
    pub fn search(&self, pattern: &str) -> Result<HashMap<String, HashMap<String, Value>>> {
        let pattern = glob::Pattern::new(pattern)
            .map_err(|e| Error::InvalidParams(format!("invalid search pattern: {e}")))?;

        Ok(self
            .map
            .iter()
            .filter(|e| pattern.matches(e.key()))
            .map(|e| (e.key().clone(), self.merged_metadata(e.key(), &e.metadata)))
            .collect())
    }

    fn merged_metadata(
        &self,
        name: &str,
        stored: &HashMap<String, Value>,
    ) -> HashMap<String, Value> {
        let mut merged = HashMap::from([
            ("name".to_string(), json!(name)),
            ("type".to_string(), json!(self.kind.as_str())),
            ("description".to_string(), json!("")),
            ("schema".to_string(), json!({})),
        ]);
        for (k, v) in stored {
            merged.insert(k.clone(), v.clone());
        }
        merged
    }

    fn missing(&self, name: &str) -> Error {
        Error::registration(format!("{} '{}' is not registered", self.kind, name))
    }
}

/// Component names are non-empty and drawn from `[A-Za-z0-9_.-]`.
pub(crate) fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::registration("component name must not be empty"));
    }
    let valid = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
    if !valid {
        return Err(Error::registration(format!(
            "component name '{}' contains invalid characters",
            name
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    // str is enough to exercise the store; the handler traits are covered by
    // the typed registries.
    fn store() -> Entries<str> {
        Entries::new(ComponentType::Tool)
    }

    fn instance(text: &str) -> HandlerSource<str> {
        HandlerSource::Instance(Arc::from(text))
    }

    #[test]
    fn test_insert_and_lookup() {
        let entries = store();
        entries
            .insert("echo", instance("handler"), HashMap::new())
            .unwrap();

        assert!(entries.has("echo"));
        assert_eq!(entries.count(), 1);
        assert!(matches!(
            entries.source("echo").unwrap(),
            HandlerSource::Instance(_)
        ));
        assert!(entries.registered_at("echo").is_ok());
    }

    #[test]
    fn test_duplicate_insert_fails_without_mutation() {
        let entries = store();
        let mut meta = HashMap::new();
        meta.insert("description".to_string(), json!("first"));
        entries.insert("echo", instance("one"), meta).unwrap();

        let mut second = HashMap::new();
        second.insert("description".to_string(), json!("second"));
        let err = entries.insert("echo", instance("two"), second).unwrap_err();
        assert!(matches!(err, Error::Registration(_)));

        // The original entry's metadata is untouched.
        let meta = entries.metadata("echo").unwrap();
        assert_eq!(meta["description"], json!("first"));
    }

    #[test]
    fn test_invalid_names_rejected() {
        let entries = store();
        assert!(entries
            .insert("", instance("x"), HashMap::new())
            .is_err());
        assert!(entries
            .insert("has space", instance("x"), HashMap::new())
            .is_err());
        assert!(entries
            .insert("has/slash", instance("x"), HashMap::new())
            .is_err());
        assert!(entries
            .insert("ok_name.v1-b", instance("x"), HashMap::new())
            .is_ok());
    }

    #[test]
    fn test_remove() {
        let entries = store();
        entries.insert("echo", instance("x"), HashMap::new()).unwrap();

        assert!(entries.remove("echo"));
        assert!(!entries.remove("echo"));
        assert!(!entries.has("echo"));
    }

    #[test]
    fn test_metadata_defaults_and_merge() {
        let entries = store();
        let mut meta = HashMap::new();
        meta.insert("description".to_string(), json!("does things"));
        meta.insert("version".to_string(), json!("1.2"));
        entries.insert("worker", instance("x"), meta).unwrap();

        let merged = entries.metadata("worker").unwrap();
        assert_eq!(merged["name"], json!("worker"));
        assert_eq!(merged["type"], json!("tool"));
        assert_eq!(merged["description"], json!("does things"));
        assert_eq!(merged["version"], json!("1.2"));
        assert_eq!(merged["schema"], json!({}));

        assert!(entries.metadata("absent").is_err());
    }

    #[test]
    fn test_get_all_lists_instances_and_deferred() {
        let entries = store();
        let mut meta = HashMap::new();
        meta.insert("description".to_string(), json!("echoes"));
        entries.insert("echo", instance("a"), meta).unwrap();
        entries
            .insert("lazy", HandlerSource::Deferred("App\\Lazy".into()), HashMap::new())
            .unwrap();

        let all = entries.get_all();
        assert_eq!(all.len(), 2);
        assert_eq!(all["echo"]["description"], json!("echoes"));
        assert_eq!(all["echo"]["type"], json!("tool"));
        assert_eq!(all["lazy"]["name"], json!("lazy"));

        // The deferred entry is still deferred after listing.
        assert!(entries.source("lazy").unwrap().is_deferred());
    }

    #[test]
    fn test_filter_exact_match() {
        let entries = store();
        let mut a = HashMap::new();
        a.insert("group".to_string(), json!("files"));
        entries.insert("read", instance("x"), a).unwrap();

        let mut b = HashMap::new();
        b.insert("group".to_string(), json!("net"));
        entries.insert("fetch", instance("y"), b).unwrap();

        let mut criteria = HashMap::new();
        criteria.insert("group".to_string(), json!("files"));
        let matched = entries.filter(&criteria);

        assert_eq!(matched.len(), 1);
        assert!(matched.contains_key("read"));
    }

    #[test]
    fn test_search_glob() {
        let entries = store();
        entries.insert("file_read", instance("a"), HashMap::new()).unwrap();
        entries.insert("file_write", instance("b"), HashMap::new()).unwrap();
        entries.insert("echo", instance("c"), HashMap::new()).unwrap();

        let matched = entries.search("file_*").unwrap();
        assert_eq!(matched.len(), 2);
        assert!(matched.contains_key("file_read"));
        assert!(matched.contains_key("file_write"));

        assert!(entries.search("[bad").is_err());
    }

    #[test]
    fn test_cache_instance_swaps_deferred_only() {
        let entries = store();
        entries
            .insert("lazy", HandlerSource::Deferred("App\\Lazy".into()), HashMap::new())
            .unwrap();

        entries.cache_instance("lazy", Arc::from("built"));
        assert!(matches!(
            entries.source("lazy").unwrap(),
            HandlerSource::Instance(_)
        ));

        // A second cache attempt leaves the resolved instance alone.
        entries.cache_instance("lazy", Arc::from("other"));
        match entries.source("lazy").unwrap() {
            HandlerSource::Instance(v) => assert_eq!(&*v, "built"),
            _ => panic!("expected an instance"),
        }
    }

    #[test]
    fn test_clear() {
        let entries = store();
        entries.insert("a", instance("x"), HashMap::new()).unwrap();
        entries.insert("b", instance("y"), HashMap::new()).unwrap();

        entries.clear();
        assert_eq!(entries.count(), 0);
        assert!(entries.names().is_empty());
    }
}
