//! Filter composition.
//!
//! A filter may name filters to run before and after itself. Composition
//! flattens a requested list depth first into the order the filters are
//! applied in: before-includes, the filter, after-includes.

use std::sync::Arc;

use tracing::debug;

use crate::error::{FilterError, Result};
use crate::filter::GedcomFilter;
use crate::registry::FilterRegistry;

/// Maximum nesting depth of includes.
pub const MAX_INCLUDE_DEPTH: usize = 10;

/// Resolve filter names and flatten their includes.
pub fn resolve_includes<S: AsRef<str>>(
    names: &[S],
    registry: &FilterRegistry,
) -> Result<Vec<Arc<dyn GedcomFilter>>> {
    let requested = names
        .iter()
        .map(|name| registry.get(name.as_ref()))
        .collect::<Result<Vec<_>>>()?;
    resolve_filters(requested, registry)
}

/// Flatten the includes of already resolved filters. Included filters are
/// looked up in `registry`.
pub fn resolve_filters(
    requested: Vec<Arc<dyn GedcomFilter>>,
    registry: &FilterRegistry,
) -> Result<Vec<Arc<dyn GedcomFilter>>> {
    let mut flattened = Vec::new();
    let mut stack = Vec::new();
    for filter in requested {
        expand(filter, registry, &mut stack, &mut flattened)?;
    }
    debug!(
        filters = ?flattened.iter().map(|f| f.name()).collect::<Vec<_>>(),
        "resolved filter chain"
    );
    Ok(flattened)
}

fn expand(
    filter: Arc<dyn GedcomFilter>,
    registry: &FilterRegistry,
    stack: &mut Vec<String>,
    flattened: &mut Vec<Arc<dyn GedcomFilter>>,
) -> Result<()> {
    let name = filter.name().to_string();
    if stack.len() >= MAX_INCLUDE_DEPTH {
        return Err(if stack.contains(&name) {
            FilterError::IncludeCycle {
                filter: name,
                max_depth: MAX_INCLUDE_DEPTH,
            }
        } else {
            FilterError::IncludeDepth {
                filter: name,
                max_depth: MAX_INCLUDE_DEPTH,
            }
        });
    }

    stack.push(name);
    for before in filter.included_before() {
        expand(registry.get(&before)?, registry, stack, flattened)?;
    }
    let after = filter.included_after();
    flattened.push(filter);
    for after in after {
        expand(registry.get(&after)?, registry, stack, flattened)?;
    }
    stack.pop();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::RuleFileFilter;
    use crate::rules::RuleSet;

    fn filter(name: &str, before: &[&str], after: &[&str]) -> Arc<dyn GedcomFilter> {
        let mut filter = RuleFileFilter::new(name, RuleSet::passthrough(&["*"]));
        filter.included_before = before.iter().map(|s| s.to_string()).collect();
        filter.included_after = after.iter().map(|s| s.to_string()).collect();
        Arc::new(filter)
    }

    fn names(filters: &[Arc<dyn GedcomFilter>]) -> Vec<&str> {
        filters.iter().map(|f| f.name()).collect()
    }

    /// Filters are not `Debug`, so `unwrap_err` is not available here.
    fn resolve_error(requested: &[&str], registry: &FilterRegistry) -> FilterError {
        match resolve_includes(requested, registry) {
            Ok(filters) => panic!("Expected an error, resolved {:?}", names(&filters)),
            Err(e) => e,
        }
    }

    #[test]
    fn test_before_self_after_order() {
        let mut registry = FilterRegistry::new();
        registry.register(filter("A", &["B"], &["C"]));
        registry.register(filter("B", &["D"], &[]));
        registry.register(filter("C", &[], &[]));
        registry.register(filter("D", &[], &[]));

        let resolved = resolve_includes(&["A", "C"], &registry).unwrap();
        assert_eq!(names(&resolved), vec!["D", "B", "A", "C", "C"]);
    }

    #[test]
    fn test_unknown_include() {
        let mut registry = FilterRegistry::new();
        registry.register(filter("A", &[], &["Missing"]));
        let err = resolve_error(&["A"], &registry);
        assert!(matches!(err, FilterError::UnknownFilter { ref name } if name == "Missing"));
        assert!(err.is_composition());
    }

    #[test]
    fn test_self_include_is_cycle() {
        let mut registry = FilterRegistry::new();
        registry.register(filter("Looped", &["Looped"], &[]));
        let err = resolve_error(&["Looped"], &registry);
        assert!(matches!(err, FilterError::IncludeCycle { ref filter, .. } if filter == "Looped"));
    }

    #[test]
    fn test_deep_chain_without_cycle() {
        let mut registry = FilterRegistry::new();
        for i in 0..12 {
            let next = format!("F{}", i + 1);
            registry.register(filter(&format!("F{i}"), &[], &[next.as_str()]));
        }
        registry.register(filter("F12", &[], &[]));

        // F3..F12 nest ten deep.
        assert_eq!(resolve_includes(&["F3"], &registry).unwrap().len(), 10);
        let err = resolve_error(&["F0"], &registry);
        assert!(matches!(err, FilterError::IncludeDepth { ref filter, .. } if filter == "F10"));
    }

    #[test]
    fn test_builtin_includes_resolve() {
        let registry = FilterRegistry::with_builtins();
        let resolved = resolve_includes(&["BirthMarriageDeath"], &registry).unwrap();
        assert_eq!(names(&resolved), vec!["BirthMarriageDeath", "RemoveEmptyRecords"]);
    }

    #[test]
    fn test_combined_runs_includes_first() {
        let registry = FilterRegistry::with_builtins();
        let resolved = resolve_includes(&["Combined"], &registry).unwrap();
        assert_eq!(
            names(&resolved),
            vec![
                "BirthMarriageDeath",
                "RemoveEmptyRecords",
                "RemoveEmptyRecords",
                "Combined"
            ]
        );
    }
}
