//! Global catalog of every generated operation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use toolsync_core::ServiceSlug;

/// One operation in the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    /// Owning service directory
    pub service_slug: ServiceSlug,
    /// Original operation name
    pub operation_name: String,
    /// Operation description
    pub description: Option<String>,
}

/// Catalog contents, grouped by service
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    services: BTreeMap<ServiceSlug, Vec<CatalogEntry>>,
}

impl Catalog {
    /// Empty catalog
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from a flat entry list
    #[must_use]
    pub fn from_entries(entries: Vec<CatalogEntry>) -> Self {
        let mut services: BTreeMap<ServiceSlug, Vec<CatalogEntry>> = BTreeMap::new();
        for entry in entries {
            services
                .entry(entry.service_slug.clone())
                .or_default()
                .push(entry);
        }
        Self { services }
    }

    /// Replace one service's entries. Other services are left untouched.
    pub fn replace_service(&mut self, slug: ServiceSlug, entries: Vec<CatalogEntry>) {
        self.services.insert(slug, entries);
    }

    /// Services present, sorted
    pub fn services(&self) -> impl Iterator<Item = &ServiceSlug> {
        self.services.keys()
    }

    /// Entries of one service
    #[must_use]
    pub fn service(&self, slug: &ServiceSlug) -> Option<&[CatalogEntry]> {
        self.services.get(slug).map(Vec::as_slice)
    }

    /// All entries, by service then listing order
    #[must_use]
    pub fn entries(&self) -> Vec<&CatalogEntry> {
        self.services.values().flatten().collect()
    }

    /// Whether the catalog is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Decode from the on-disk JSON array
    ///
    /// # Errors
    ///
    /// Returns error if `bytes` is not a valid catalog document
    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        let entries: Vec<CatalogEntry> = serde_json::from_slice(bytes)?;
        Ok(Self::from_entries(entries))
    }

    /// Encode as a pretty JSON array with a trailing newline
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let mut out = serde_json::to_string_pretty(&self.entries())?;
        out.push('\n');
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(slug: &str, op: &str) -> CatalogEntry {
        CatalogEntry {
            service_slug: ServiceSlug::from_name(slug),
            operation_name: op.to_string(),
            description: None,
        }
    }

    #[test]
    fn test_replace_keeps_other_services() {
        let mut catalog = Catalog::from_entries(vec![entry("b", "x"), entry("a", "y")]);
        catalog.replace_service(ServiceSlug::from_name("b"), vec![entry("b", "z")]);

        let names: Vec<_> = catalog
            .entries()
            .iter()
            .map(|e| e.operation_name.as_str())
            .collect();
        assert_eq!(names, vec!["y", "z"]);
    }

    #[test]
    fn test_json_shape() {
        let catalog = Catalog::from_entries(vec![entry("svc", "op")]);
        let json = catalog.to_json().unwrap();
        assert!(json.contains("\"serviceSlug\": \"svc\""));
        assert!(json.contains("\"operationName\": \"op\""));
        assert!(json.contains("\"description\": null"));
        assert_eq!(Catalog::from_json(json.as_bytes()).unwrap(), catalog);
    }
}
