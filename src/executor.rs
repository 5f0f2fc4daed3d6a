//! Filter chain executor.
//!
//! Applies filters one after the other. Each filter sees the complete
//! output of the previous one, re-split at level 0, so a rule that inserts
//! a new record (e.g. a source record before the trailer) feeds the next
//! filter like any other record.
//!
//! Within one filter every level-0 structure is walked depth first. A node
//! keeps its own line only if its tag-path resolves to a whitelist rule;
//! its children are visited either way. After the children, the matched
//! rule's operations run over the node's accumulated text, unless the
//! parent already matched the same rule.

use std::sync::Arc;

use tracing::{debug, info};

use crate::debug_trace::{ChainTrace, FilterTrace};
use crate::error::{FilterError, Result};
use crate::filter::{self, GedcomFilter};
use crate::gedcom::{self, GedcomLine};
use crate::params::FilterParams;
use crate::pattern::PatternCache;
use crate::references::ReferenceGraph;
use crate::rules::{CompiledOp, CompiledRule, CompiledRuleSet};

/// State of one filter application over all records.
struct FilterRun<'a> {
    filter: &'a dyn GedcomFilter,
    rules: &'a CompiledRuleSet,
    cache: PatternCache,
    references: ReferenceGraph,
    params: &'a FilterParams,
}

impl FilterRun<'_> {
    fn apply_node(
        &mut self,
        gedcom: &str,
        level: u32,
        tag_path: &str,
        parent_match: Option<usize>,
    ) -> Result<String> {
        let line = GedcomLine::parse_at(gedcom, level)?;
        let tag_path = if tag_path.is_empty() {
            line.tag
        } else {
            format!("{tag_path}:{}", line.tag)
        };

        let matched = self.cache.resolve(&tag_path, self.rules.patterns());

        let mut converted = String::new();
        if matched.is_some() {
            converted.push_str(gedcom::first_line(gedcom));
            converted.push('\n');
        }

        for substructure in gedcom::split_substructures(gedcom, level + 1) {
            converted.push_str(&self.apply_node(substructure, level + 1, &tag_path, matched)?);
        }

        // Operations of a rule run once, on the outermost node it matches
        if let Some(idx) = matched
            && matched != parent_match
        {
            let rule = self.rules.rule(idx);
            if !rule.ops.is_empty() {
                converted = run_operations(
                    rule,
                    converted,
                    self.filter,
                    &mut self.references,
                    self.params,
                )?;
            }
        }

        Ok(converted)
    }
}

/// Run a rule's operations in declared order.
fn run_operations(
    rule: &CompiledRule,
    mut text: String,
    filter: &dyn GedcomFilter,
    references: &mut ReferenceGraph,
    params: &FilterParams,
) -> Result<String> {
    let pattern = rule.pattern.as_str();
    for op in &rule.ops {
        text = match op {
            CompiledOp::Replace { regex, replacement } => {
                regex.replace_all(&text, replacement.as_str()).into_owned()
            }
            CompiledOp::Custom => {
                let hook = filter.custom_converter().ok_or_else(|| FilterError::Hook {
                    filter: filter.name().to_string(),
                    pattern: pattern.to_string(),
                    message: "no custom conversion available".to_string(),
                })?;
                hook.custom_convert(pattern, &text, references, params)?
            }
        };
    }
    Ok(text)
}

/// Apply one filter to a list of record blocks.
pub fn apply_filter(
    records: &[String],
    filter: &dyn GedcomFilter,
    params: &FilterParams,
) -> Result<(Vec<String>, FilterTrace)> {
    let rules = filter::compile(filter, params)?;
    apply_compiled(records, filter, &rules, params)
}

/// Compile every filter of a chain. Nothing is applied unless all of them
/// compile.
fn compile_chain<'a>(
    filters: &'a [Option<Arc<dyn GedcomFilter>>],
    params: &FilterParams,
) -> Result<Vec<(&'a dyn GedcomFilter, CompiledRuleSet)>> {
    filters
        .iter()
        .flatten()
        .map(|filter| Ok((filter.as_ref(), filter::compile(filter.as_ref(), params)?)))
        .collect()
}

fn apply_compiled(
    records: &[String],
    filter: &dyn GedcomFilter,
    rules: &CompiledRuleSet,
    params: &FilterParams,
) -> Result<(Vec<String>, FilterTrace)> {
    let references = if filter.uses_reference_analysis() {
        let mut graph = ReferenceGraph::build(records);
        let passes = graph.prune()?;
        debug!(filter = filter.name(), passes, "reference graph pruned");
        graph
    } else {
        ReferenceGraph::new()
    };

    let mut run = FilterRun {
        filter,
        rules,
        cache: PatternCache::new(),
        references,
        params,
    };

    let mut input_count = 0;
    let mut output = Vec::new();
    for block in records {
        for record in gedcom::split_top_level(block) {
            input_count += 1;
            let converted = run.apply_node(record, 0, "", None)?;
            if !converted.is_empty() {
                output.push(converted);
            }
        }
    }

    let matched_patterns = run
        .cache
        .entries()
        .map(|(path, idx)| {
            (
                path.to_string(),
                idx.map(|i| rules.rule(i).pattern.as_str().to_string()),
            )
        })
        .collect();

    info!(
        filter = filter.name(),
        input = input_count,
        output = output.len(),
        "filter applied"
    );

    let trace = FilterTrace {
        filter_name: filter.name().to_string(),
        input_count,
        output_count: output.len(),
        matched_patterns,
    };
    Ok((output, trace))
}

/// Apply a chain of filters. `None` entries pass records through unchanged.
///
/// Every filter is compiled and validated before the first one runs.
pub fn apply_filter_chain(
    records: Vec<String>,
    filters: &[Option<Arc<dyn GedcomFilter>>],
    params: &FilterParams,
) -> Result<Vec<String>> {
    let mut current = records;
    for (filter, rules) in compile_chain(filters, params)? {
        let (output, _) = apply_compiled(&current, filter, &rules, params)?;
        current = output;
    }
    Ok(current)
}

/// Apply a chain of filters and capture a trace of every applied filter.
pub fn apply_filter_chain_traced(
    records: Vec<String>,
    filters: &[Option<Arc<dyn GedcomFilter>>],
    params: &FilterParams,
) -> Result<(Vec<String>, ChainTrace)> {
    let mut current = records;
    let mut trace = ChainTrace::default();
    for (filter, rules) in compile_chain(filters, params)? {
        let (output, filter_trace) = apply_compiled(&current, filter, &rules, params)?;
        trace.uses_schema_tag_analysis |= filter.uses_schema_tag_analysis();
        trace.wrap_conc_without_spaces |= filter.wrap_conc_without_spaces();
        trace.filters.push(filter_trace);
        current = output;
    }
    Ok((current, trace))
}
