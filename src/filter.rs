//! The filter abstraction.
//!
//! A [`GedcomFilter`] supplies an ordered rule set, optional regex macros,
//! a few flags and the names of filters to run before and after it. A
//! filter that uses the custom-conversion sentinel must also hand out a
//! [`CustomConvert`] implementation; validation checks that up front.

use crate::error::Result;
use crate::params::FilterParams;
use crate::references::ReferenceGraph;
use crate::rules::{self, CompiledRuleSet, RegexMacros, RuleSet};

/// Custom conversion hook invoked for rules carrying [`rules::RuleOp::Custom`].
pub trait CustomConvert {
    /// Convert the text of a matched structure.
    ///
    /// `pattern` is the rule pattern that matched, `gedcom` the structure
    /// as filtered so far (own line plus children). Returning an empty
    /// string removes the structure.
    fn custom_convert(
        &self,
        pattern: &str,
        gedcom: &str,
        references: &mut ReferenceGraph,
        params: &FilterParams,
    ) -> Result<String>;
}

/// A named GEDCOM filter.
pub trait GedcomFilter: Send + Sync {
    fn name(&self) -> &str;

    /// The raw rule set. Parameters are available for filters whose rules
    /// depend on the host (e.g. the tree name).
    fn rules(&self, params: &FilterParams) -> RuleSet;

    fn macros(&self) -> RegexMacros {
        RegexMacros::new()
    }

    /// Build and prune the reference graph before applying the filter.
    fn uses_reference_analysis(&self) -> bool {
        false
    }

    fn uses_schema_tag_analysis(&self) -> bool {
        true
    }

    fn wrap_conc_without_spaces(&self) -> bool {
        false
    }

    /// Names of filters to run before this one.
    fn included_before(&self) -> Vec<String> {
        Vec::new()
    }

    /// Names of filters to run after this one.
    fn included_after(&self) -> Vec<String> {
        Vec::new()
    }

    fn custom_converter(&self) -> Option<&dyn CustomConvert> {
        None
    }
}

/// Validate a filter's rule set without compiling it.
pub fn validate(filter: &dyn GedcomFilter, params: &FilterParams) -> Result<()> {
    rules::validate(
        filter.name(),
        &filter.rules(params),
        &filter.macros(),
        filter.custom_converter().is_some(),
    )
}

/// Compile a filter's rule set with the parameters folded in.
pub fn compile(filter: &dyn GedcomFilter, params: &FilterParams) -> Result<CompiledRuleSet> {
    rules::compile_rule_set(
        filter.name(),
        &filter.rules(params),
        &filter.macros(),
        params,
        filter.custom_converter().is_some(),
    )
}

/// A filter defined entirely by data, as loaded from a rule file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleFileFilter {
    pub name: String,
    pub rules: RuleSet,
    pub macros: RegexMacros,
    pub uses_reference_analysis: bool,
    pub uses_schema_tag_analysis: bool,
    pub wrap_conc_without_spaces: bool,
    pub included_before: Vec<String>,
    pub included_after: Vec<String>,
}

impl RuleFileFilter {
    pub fn new(name: &str, rules: RuleSet) -> Self {
        RuleFileFilter {
            name: name.to_string(),
            rules,
            uses_schema_tag_analysis: true,
            ..Default::default()
        }
    }
}

impl GedcomFilter for RuleFileFilter {
    fn name(&self) -> &str {
        &self.name
    }

    fn rules(&self, _params: &FilterParams) -> RuleSet {
        self.rules.clone()
    }

    fn macros(&self) -> RegexMacros {
        self.macros.clone()
    }

    fn uses_reference_analysis(&self) -> bool {
        self.uses_reference_analysis
    }

    fn uses_schema_tag_analysis(&self) -> bool {
        self.uses_schema_tag_analysis
    }

    fn wrap_conc_without_spaces(&self) -> bool {
        self.wrap_conc_without_spaces
    }

    fn included_before(&self) -> Vec<String> {
        self.included_before.clone()
    }

    fn included_after(&self) -> Vec<String> {
        self.included_after.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FilterError;
    use crate::rules::RuleOp;

    struct Hooked;

    impl CustomConvert for Hooked {
        fn custom_convert(
            &self,
            _pattern: &str,
            gedcom: &str,
            _references: &mut ReferenceGraph,
            _params: &FilterParams,
        ) -> Result<String> {
            Ok(gedcom.to_lowercase())
        }
    }

    impl GedcomFilter for Hooked {
        fn name(&self) -> &str {
            "Hooked"
        }

        fn rules(&self, _params: &FilterParams) -> RuleSet {
            RuleSet::new().rule("*", vec![RuleOp::Custom])
        }

        fn custom_converter(&self) -> Option<&dyn CustomConvert> {
            Some(self)
        }
    }

    #[test]
    fn test_rule_file_filter_defaults() {
        let filter = RuleFileFilter::new("Plain", RuleSet::passthrough(&["*"]));
        assert_eq!(filter.name(), "Plain");
        assert!(!filter.uses_reference_analysis());
        assert!(filter.uses_schema_tag_analysis());
        assert!(filter.included_before().is_empty());
        assert!(validate(&filter, &FilterParams::new()).is_ok());
    }

    #[test]
    fn test_custom_sentinel_needs_converter() {
        let filter = RuleFileFilter::new("NoHook", RuleSet::new().rule("*", vec![RuleOp::Custom]));
        let err = validate(&filter, &FilterParams::new()).unwrap_err();
        assert!(matches!(err, FilterError::RuleSyntax { .. }));
        assert!(compile(&Hooked, &FilterParams::new()).is_ok());
    }
}
