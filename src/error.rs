//! Error type shared by rule compilation, filter composition and filter
//! application.
//!
//! Every error is deterministic for a given rule set and input, so none of
//! them is retried. Rule-set problems surface before any record is touched.

use std::path::PathBuf;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, FilterError>;

#[derive(Debug, Error)]
pub enum FilterError {
    /// A pattern, regular expression or rule definition failed validation.
    #[error("filter {filter}: {message}")]
    RuleSyntax { filter: String, message: String },

    /// A rule can never fire because an earlier rule already matches every
    /// tag-path it would match.
    #[error(
        "filter {filter}: rule \"{pattern}\" is dominated by the earlier rule \"{dominated_by}\" \
         and will never be executed; remove it or change the rule order"
    )]
    Domination {
        filter: String,
        pattern: String,
        dominated_by: String,
    },

    /// Include expansion went deeper than the allowed nesting depth.
    #[error("maximum include depth of {max_depth} exceeded while including filter {filter}")]
    IncludeDepth { filter: String, max_depth: usize },

    /// Include expansion went too deep and the offending filter is already
    /// on the expansion stack.
    #[error(
        "maximum include depth of {max_depth} exceeded while including filter {filter}; \
         {filter} already includes itself, probably an include cycle"
    )]
    IncludeCycle { filter: String, max_depth: usize },

    /// A requested or included filter name is not registered.
    #[error("unknown filter: {name}")]
    UnknownFilter { name: String },

    /// A GEDCOM fragment could not be parsed into level, tag and value.
    #[error("the following GEDCOM structure could not be matched: {fragment}")]
    MalformedInput { fragment: String },

    /// A custom conversion hook failed.
    #[error("custom conversion of filter {filter} failed for rule \"{pattern}\": {message}")]
    Hook {
        filter: String,
        pattern: String,
        message: String,
    },

    /// Removing empty and unlinked records did not reach a fixed point.
    #[error("too many iterations ({iterations}) while removing empty and unlinked records")]
    TooManyIterations { iterations: usize },

    /// A rule file statement could not be parsed.
    #[error("line {line}: {message}")]
    RuleFile { line: usize, message: String },

    #[error("cannot read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl FilterError {
    pub(crate) fn rule_syntax(filter: &str, message: impl Into<String>) -> Self {
        FilterError::RuleSyntax {
            filter: filter.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn malformed(fragment: &str) -> Self {
        FilterError::MalformedInput {
            fragment: fragment.to_string(),
        }
    }

    /// Whether this error comes from include expansion.
    pub fn is_composition(&self) -> bool {
        matches!(
            self,
            FilterError::IncludeDepth { .. }
                | FilterError::IncludeCycle { .. }
                | FilterError::UnknownFilter { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domination_message_names_both_rules() {
        let err = FilterError::Domination {
            filter: "Example".to_string(),
            pattern: "INDI:BIRT:DATE".to_string(),
            dominated_by: "INDI:*".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("\"INDI:BIRT:DATE\""));
        assert!(msg.contains("\"INDI:*\""));
    }

    #[test]
    fn test_cycle_message_flags_cycle() {
        let err = FilterError::IncludeCycle {
            filter: "Looped".to_string(),
            max_depth: 10,
        };
        assert!(err.to_string().contains("include cycle"));
        assert!(err.is_composition());
    }

    #[test]
    fn test_malformed_input_reports_fragment() {
        let err = FilterError::malformed("x NAME broken");
        assert!(err.to_string().ends_with("x NAME broken"));
        assert!(!err.is_composition());
    }
}
