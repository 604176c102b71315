use std::collections::HashMap;
use std::fs;

use anyhow::Result;
use serde::Deserialize;

use crate::types::ScopeDescriptor;

#[derive(Debug, Clone, Deserialize)]
struct RegistryEntry {
    #[serde(rename = "Description")]
    description: String,
    #[serde(rename = "Weight")]
    weight: i64,
}

/// Static lookup table of known OAuth scopes: URI -> description + severity
/// weight. Scopes absent from the registry are dropped during normalization
/// and never reach storage or rendered mail.
///
/// Stored documents carry scope *descriptions* in their flat `scopes` field,
/// so the notifier needs the reverse description -> URI view when rendering
/// mail; both views are built once at load time.
#[derive(Debug, Clone)]
pub struct ScopeRegistry {
    by_uri: HashMap<String, RegistryEntry>,
    uri_by_description: HashMap<String, String>,
}

impl ScopeRegistry {
    pub fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let by_uri: HashMap<String, RegistryEntry> = serde_json::from_str(content)?;
        let uri_by_description = by_uri
            .iter()
            .map(|(uri, entry)| (entry.description.clone(), uri.clone()))
            .collect();
        Ok(ScopeRegistry {
            by_uri,
            uri_by_description,
        })
    }

    pub fn len(&self) -> usize {
        self.by_uri.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_uri.is_empty()
    }

    pub fn descriptor(&self, uri: &str) -> Option<ScopeDescriptor> {
        self.by_uri.get(uri).map(|entry| ScopeDescriptor {
            scope: uri.to_string(),
            description: entry.description.clone(),
            weight: entry.weight,
        })
    }

    /// Keep only registry-known scopes, preserving grant order.
    pub fn filter_granted(&self, granted: &[String]) -> Vec<ScopeDescriptor> {
        granted
            .iter()
            .filter_map(|uri| self.descriptor(uri))
            .collect()
    }

    /// Re-join stored scope descriptions back to full descriptors, used when
    /// rendering notification mail from a stored document.
    pub fn rejoin_descriptions(&self, descriptions: &[String]) -> Vec<ScopeDescriptor> {
        descriptions
            .iter()
            .filter_map(|description| {
                self.uri_by_description
                    .get(description)
                    .and_then(|uri| self.descriptor(uri))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ScopeRegistry {
        ScopeRegistry::from_json(
            r#"{
                "s1": {"Description": "d1", "Weight": 5},
                "s2": {"Description": "d2", "Weight": 8}
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn filter_keeps_known_scopes_with_description_and_weight() {
        let granted = vec!["s1".to_string()];
        let scopes = registry().filter_granted(&granted);
        assert_eq!(scopes.len(), 1);
        assert_eq!(scopes[0].scope, "s1");
        assert_eq!(scopes[0].description, "d1");
        assert_eq!(scopes[0].weight, 5);
    }

    #[test]
    fn filter_drops_unknown_scopes() {
        let granted = vec![
            "s2".to_string(),
            "https://unknown.example/scope".to_string(),
            "s1".to_string(),
        ];
        let scopes = registry().filter_granted(&granted);
        let uris: Vec<&str> = scopes.iter().map(|s| s.scope.as_str()).collect();
        assert_eq!(uris, vec!["s2", "s1"]);
    }

    #[test]
    fn rejoin_recovers_uri_and_weight_from_description() {
        let stored = vec!["d2".to_string(), "not-a-description".to_string()];
        let scopes = registry().rejoin_descriptions(&stored);
        assert_eq!(scopes.len(), 1);
        assert_eq!(scopes[0].scope, "s2");
        assert_eq!(scopes[0].weight, 8);
    }
}
