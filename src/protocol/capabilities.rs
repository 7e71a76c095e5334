//! Capability declaration and negotiation.
//!
//! Capabilities are a map of feature name to sub-options, e.g.
//! `{"tools": {"listChanged": true}, "logging": {}}`. The server declares a
//! set at construction; the negotiated set is computed once per `initialize`
//! and stays fixed until the next handshake.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// An ordered feature → sub-option map.
///
/// Ordered so that serialized capability sets are deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilitySet(pub BTreeMap<String, BTreeMap<String, Value>>);

impl CapabilitySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// The feature set this server ships with.
    pub fn server_defaults() -> Self {
        Self::new()
            .with_option("tools", "listChanged", false)
            .with_option("resources", "subscribe", false)
            .with_option("resources", "listChanged", false)
            .with_option("prompts", "listChanged", false)
            .with_feature("logging")
    }

    /// Declare a feature with no sub-options.
    pub fn with_feature(mut self, feature: &str) -> Self {
        self.0.entry(feature.to_string()).or_default();
        self
    }

    /// Declare a feature sub-option.
    pub fn with_option(mut self, feature: &str, option: &str, value: impl Into<Value>) -> Self {
        self.0
            .entry(feature.to_string())
            .or_default()
            .insert(option.to_string(), value.into());
        self
    }

    pub fn has(&self, feature: &str) -> bool {
        self.0.contains_key(feature)
    }

    pub fn option(&self, feature: &str, option: &str) -> Option<&Value> {
        self.0.get(feature).and_then(|opts| opts.get(option))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn features(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    /// Merge this (server-declared) set with a client-declared one.
    ///
    /// Every server-declared feature survives. A sub-option declared as a
    /// boolean on both sides is AND-ed; otherwise the server's value wins.
    /// Features or sub-options only the client declares are dropped, never
    /// an error.
    pub fn negotiate(&self, client: &CapabilitySet) -> CapabilitySet {
        let mut negotiated = BTreeMap::new();

        for (feature, server_opts) in &self.0 {
            let client_opts = client.0.get(feature);
            let mut opts = BTreeMap::new();

            for (option, server_value) in server_opts {
                let merged = match (
                    server_value.as_bool(),
                    client_opts.and_then(|c| c.get(option)).and_then(Value::as_bool),
                ) {
                    (Some(s), Some(c)) => Value::Bool(s && c),
                    _ => server_value.clone(),
                };
                opts.insert(option.clone(), merged);
            }

            negotiated.insert(feature.clone(), opts);
        }

        CapabilitySet(negotiated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_shape_is_transparent() {
        let caps = CapabilitySet::new()
            .with_option("tools", "listChanged", true)
            .with_feature("logging");

        let json = serde_json::to_value(&caps).unwrap();
        assert_eq!(
            json,
            json!({"logging": {}, "tools": {"listChanged": true}})
        );

        let parsed: CapabilitySet = serde_json::from_value(json).unwrap();
        assert!(parsed.has("logging"));
        assert_eq!(parsed.option("tools", "listChanged"), Some(&json!(true)));
    }

    #[test]
    fn test_negotiate_ands_shared_booleans() {
        let server = CapabilitySet::new().with_option("tools", "listChanged", true);
        let client = CapabilitySet::new()
            .with_option("tools", "listChanged", false)
            .with_option("resources", "subscribe", true);

        let negotiated = server.negotiate(&client);

        assert!(negotiated.has("tools"));
        assert_eq!(
            negotiated.option("tools", "listChanged"),
            Some(&json!(false))
        );
        // Client-only features are dropped, not an error.
        assert!(!negotiated.has("resources"));
    }

    #[test]
    fn test_negotiate_one_sided_keys() {
        let server = CapabilitySet::new()
            .with_option("tools", "listChanged", true)
            .with_feature("logging");
        let client = CapabilitySet::new();

        let negotiated = server.negotiate(&client);

        // Server value survives when the client says nothing.
        assert_eq!(negotiated.option("tools", "listChanged"), Some(&json!(true)));
        assert!(negotiated.has("logging"));
    }

    #[test]
    fn test_negotiate_non_boolean_options_keep_server_value() {
        let server = CapabilitySet::new().with_option("experimental", "mode", "full");
        let client = CapabilitySet::new().with_option("experimental", "mode", "partial");

        let negotiated = server.negotiate(&client);
        assert_eq!(negotiated.option("experimental", "mode"), Some(&json!("full")));
    }

    #[test]
    fn test_server_defaults_declare_core_features() {
        let caps = CapabilitySet::server_defaults();
        assert!(caps.has("tools"));
        assert!(caps.has("resources"));
        assert!(caps.has("prompts"));
        assert!(caps.has("logging"));
    }
}
