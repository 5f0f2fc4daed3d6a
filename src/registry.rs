//! Name-based filter lookup.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::builtin;
use crate::dsl;
use crate::error::{FilterError, Result};
use crate::filter::GedcomFilter;

/// Filters by name. Registering a name twice replaces the earlier filter.
#[derive(Default, Clone)]
pub struct FilterRegistry {
    filters: BTreeMap<String, Arc<dyn GedcomFilter>>,
}

impl FilterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in filter.
    pub fn with_builtins() -> Self {
        let mut registry = FilterRegistry::new();
        for filter in builtin::builtin_filters() {
            registry.register(filter);
        }
        registry
    }

    pub fn register(&mut self, filter: Arc<dyn GedcomFilter>) -> Option<Arc<dyn GedcomFilter>> {
        self.filters.insert(filter.name().to_string(), filter)
    }

    /// Load a rule file and register the filter it defines. Returns the
    /// filter's name.
    pub fn load_rule_file(&mut self, path: &Path) -> Result<String> {
        let filter = dsl::load_rule_file(path)?;
        let name = filter.name.clone();
        info!(filter = %name, path = %path.display(), "loaded rule file");
        self.register(Arc::new(filter));
        Ok(name)
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn GedcomFilter>> {
        self.filters
            .get(name)
            .cloned()
            .ok_or_else(|| FilterError::UnknownFilter {
                name: name.to_string(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.filters.contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.filters.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

impl std::fmt::Debug for FilterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::RuleFileFilter;
    use crate::rules::RuleSet;
    use std::io::Write;

    #[test]
    fn test_builtins_registered() {
        let registry = FilterRegistry::with_builtins();
        assert!(registry.contains("AllRecords"));
        assert!(registry.contains("RemoveEmptyOrUnlinkedRecords"));
        assert_eq!(registry.get("RemoveChangeData").unwrap().name(), "RemoveChangeData");
        assert_eq!(registry.len(), builtin::builtin_filters().len());
    }

    #[test]
    fn test_unknown_name() {
        let registry = FilterRegistry::new();
        assert!(registry.is_empty());
        match registry.get("Nope") {
            Err(FilterError::UnknownFilter { name }) => assert_eq!(name, "Nope"),
            other => panic!("Expected UnknownFilter, got {:?}", other.map(|f| f.name().to_string())),
        }
    }

    #[test]
    fn test_register_replaces() {
        let mut registry = FilterRegistry::new();
        assert!(
            registry
                .register(Arc::new(RuleFileFilter::new("X", RuleSet::passthrough(&["*"]))))
                .is_none()
        );
        assert!(
            registry
                .register(Arc::new(RuleFileFilter::new("X", RuleSet::passthrough(&["INDI"]))))
                .is_some()
        );
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["X"]);
    }

    #[test]
    fn test_load_rule_file_registers() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"FILTER Custom\nAFTER RemoveChangeData\nRULE *\n")
            .unwrap();
        let mut registry = FilterRegistry::with_builtins();
        let name = registry.load_rule_file(file.path()).unwrap();
        assert_eq!(name, "Custom");
        assert_eq!(
            registry.get("Custom").unwrap().included_after(),
            vec!["RemoveChangeData"]
        );
    }
}
