//! Trace types for the filter chain executor.
//!
//! These types capture what each filter of a chain did: how many records
//! went in and came out, and which rule pattern every tag-path resolved to.

use std::collections::{BTreeMap, BTreeSet};

/// Trace of one filter application.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FilterTrace {
    pub filter_name: String,
    /// Level-0 structures fed into the filter.
    pub input_count: usize,
    /// Non-empty structures the filter produced.
    pub output_count: usize,
    /// Every tag-path seen, with the pattern it resolved to. `None` means
    /// the structure was dropped (no match or blacklisted).
    pub matched_patterns: BTreeMap<String, Option<String>>,
}

impl FilterTrace {
    /// Tag-paths whose structures were kept.
    pub fn kept_tag_paths(&self) -> impl Iterator<Item = &str> {
        self.matched_patterns
            .iter()
            .filter(|(_, pattern)| pattern.is_some())
            .map(|(path, _)| path.as_str())
    }

    /// Tag-paths whose structures were dropped.
    pub fn dropped_tag_paths(&self) -> impl Iterator<Item = &str> {
        self.matched_patterns
            .iter()
            .filter(|(_, pattern)| pattern.is_none())
            .map(|(path, _)| path.as_str())
    }
}

/// Complete trace of a filter chain execution.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChainTrace {
    /// One trace per applied filter, in order. Skipped (`None`) entries of
    /// the chain leave no trace.
    pub filters: Vec<FilterTrace>,
    /// Whether any applied filter asked for schema tag analysis.
    pub uses_schema_tag_analysis: bool,
    /// Whether any applied filter asked for CONC wrapping without
    /// leading and trailing spaces.
    pub wrap_conc_without_spaces: bool,
}

impl ChainTrace {
    pub fn filter_names(&self) -> Vec<&str> {
        self.filters.iter().map(|t| t.filter_name.as_str()).collect()
    }

    /// Tag-paths kept by the last filter that saw them. This is the set
    /// of tags present in the final output.
    pub fn output_tag_paths(&self) -> BTreeSet<&str> {
        self.filters
            .last()
            .map(|t| t.kept_tag_paths().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trace() -> FilterTrace {
        FilterTrace {
            filter_name: "RemoveChangeData".to_string(),
            input_count: 2,
            output_count: 2,
            matched_patterns: BTreeMap::from([
                ("INDI".to_string(), Some("*".to_string())),
                ("INDI:CHAN".to_string(), None),
                ("INDI:NAME".to_string(), Some("*".to_string())),
            ]),
        }
    }

    #[test]
    fn test_filter_trace_partitions_tag_paths() {
        let t = trace();
        assert_eq!(t.kept_tag_paths().collect::<Vec<_>>(), vec!["INDI", "INDI:NAME"]);
        assert_eq!(t.dropped_tag_paths().collect::<Vec<_>>(), vec!["INDI:CHAN"]);
    }

    #[test]
    fn test_chain_trace_structure() {
        let chain = ChainTrace {
            filters: vec![trace()],
            uses_schema_tag_analysis: true,
            wrap_conc_without_spaces: false,
        };
        assert_eq!(chain.filter_names(), vec!["RemoveChangeData"]);
        assert!(chain.output_tag_paths().contains("INDI:NAME"));
        assert!(!chain.output_tag_paths().contains("INDI:CHAN"));
        assert!(ChainTrace::default().output_tag_paths().is_empty());
    }
}
