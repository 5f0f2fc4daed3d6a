//! # gedcom-filter
//!
//! Rule-based filtering and rewriting of GEDCOM genealogy data.
//!
//! GEDCOM is line oriented; every line carries its nesting level, and a
//! record is a level-0 line with its indented subtree. This library filters
//! records structurally: each rule is keyed by a tag-path pattern such as
//! `INDI:BIRT:DATE` or `FAM:*`, and decides whether matching structures are
//! kept and how they are rewritten.
//!
//! ## Overview
//!
//! - **Patterns**: colon-separated tags, `*` for any tag, `!` for blacklist
//! - **Rules**: ordered, first match wins, each with regex replacements,
//!   macro references or a custom conversion hook
//! - **Validation**: rules hidden behind an earlier wildcard are rejected
//! - **Reference analysis**: empty and unreferenced records are detected
//!   through a reference graph and removed by the cleaning filters
//! - **Composition**: filters can include other filters before and after
//!
//! ## Example
//!
//! ```
//! use gedcom_filter::{FilterParams, FilterRegistry, apply_filter_chain, resolve_includes, split_top_level};
//!
//! let gedcom = "0 HEAD\n0 @I1@ INDI\n1 NAME John /Smith/\n1 CHAN\n2 DATE 1 JAN 2020\n0 TRLR\n";
//! let records: Vec<String> = split_top_level(gedcom).into_iter().map(String::from).collect();
//!
//! let registry = FilterRegistry::with_builtins();
//! let filters = resolve_includes(&["RemoveChangeData"], &registry).unwrap();
//! let chain: Vec<_> = filters.into_iter().map(Some).collect();
//!
//! let output = apply_filter_chain(records, &chain, &FilterParams::new()).unwrap();
//! assert_eq!(output.concat(), "0 HEAD\n0 @I1@ INDI\n1 NAME John /Smith/\n0 TRLR\n");
//! ```

pub mod builtin;
pub mod compose;
pub mod debug_trace;
pub mod dsl;
pub mod error;
pub mod executor;
pub mod filter;
pub mod gedcom;
pub mod params;
pub mod pattern;
pub mod references;
pub mod registry;
pub mod rules;

pub use compose::{MAX_INCLUDE_DEPTH, resolve_filters, resolve_includes};
pub use debug_trace::{ChainTrace, FilterTrace};
pub use dsl::{load_rule_file, parse_rule_file};
pub use error::{FilterError, Result};
pub use executor::{apply_filter, apply_filter_chain, apply_filter_chain_traced};
pub use filter::{CustomConvert, GedcomFilter, RuleFileFilter};
pub use gedcom::{GedcomLine, split_substructures, split_top_level};
pub use params::FilterParams;
pub use pattern::{PatternCache, TagPattern, first_match, match_single};
pub use references::{ReferenceGraph, ReferenceRecord};
pub use registry::FilterRegistry;
pub use rules::{
    CompiledRuleSet, FilterRule, RegexMacros, ReplacePair, RuleOp, RuleSet, add_delimiters,
    compile_rule_set, expand_macros, merge_rule_sets,
};
