//! Filter rule sets and the rule-set compiler.
//!
//! A rule set is an ordered list of `pattern → operations` entries. Order
//! matters twice: pattern resolution is first-match-wins, and the
//! dominance check rejects rules hidden behind an earlier wildcard.
//!
//! Compiling a rule set runs, in order:
//!
//! 1. [`validate`]: pattern grammar, regex validity, blacklist rules
//!    without operations, dominance, macro and hook availability
//! 2. [`expand_macros`]: macro sentinels become the macro's pairs
//! 3. parameter interpolation of `%KEY%` placeholders
//! 4. [`add_delimiters`]: regex searches get wrapped, `$N` becomes `${N}`
//! 5. regex construction

use std::collections::BTreeMap;

use regex::Regex;

use crate::error::{FilterError, Result};
use crate::params::FilterParams;
use crate::pattern::{TagPattern, WILDCARD, match_single};

/// A regular-expression search and its replacement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplacePair {
    pub search: String,
    pub replace: String,
}

impl ReplacePair {
    pub fn new(search: &str, replace: &str) -> Self {
        ReplacePair {
            search: search.to_string(),
            replace: replace.to_string(),
        }
    }
}

/// One operation of a rule, applied in declared order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleOp {
    /// Regex substitution over the matched structure.
    Replace(ReplacePair),
    /// Invoke the filter's custom conversion hook.
    Custom,
    /// Expand the named regex macro in place.
    Macro(String),
}

impl RuleOp {
    pub fn replace(search: &str, replace: &str) -> Self {
        RuleOp::Replace(ReplacePair::new(search, replace))
    }

    pub fn macro_ref(name: &str) -> Self {
        RuleOp::Macro(name.to_string())
    }
}

/// Named lists of replace pairs, referenced from rules by [`RuleOp::Macro`].
pub type RegexMacros = BTreeMap<String, Vec<ReplacePair>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterRule {
    pub pattern: String,
    pub ops: Vec<RuleOp>,
}

/// Ordered pattern → operations mapping. Patterns are unique.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSet {
    rules: Vec<FilterRule>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a rule, builder style.
    pub fn rule(mut self, pattern: &str, ops: Vec<RuleOp>) -> Self {
        self.insert(pattern, ops);
        self
    }

    /// Rule set whose rules all pass structures through unchanged.
    pub fn passthrough(patterns: &[&str]) -> Self {
        patterns
            .iter()
            .fold(RuleSet::new(), |set, pattern| set.rule(pattern, vec![]))
    }

    /// Insert a rule. An existing pattern has its operations replaced and
    /// keeps its position.
    pub fn insert(&mut self, pattern: &str, ops: Vec<RuleOp>) {
        match self.rules.iter_mut().find(|r| r.pattern == pattern) {
            Some(rule) => rule.ops = ops,
            None => self.rules.push(FilterRule {
                pattern: pattern.to_string(),
                ops,
            }),
        }
    }

    pub fn get(&self, pattern: &str) -> Option<&FilterRule> {
        self.rules.iter().find(|r| r.pattern == pattern)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FilterRule> {
        self.rules.iter()
    }

    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|r| r.pattern.as_str())
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn uses_custom_hook(&self) -> bool {
        self.rules
            .iter()
            .any(|r| r.ops.iter().any(|op| matches!(op, RuleOp::Custom)))
    }

    fn map_ops(&self, mut f: impl FnMut(&RuleOp, &mut Vec<RuleOp>) -> Result<()>) -> Result<Self> {
        let mut rules = Vec::with_capacity(self.rules.len());
        for rule in &self.rules {
            let mut ops = Vec::with_capacity(rule.ops.len());
            for op in &rule.ops {
                f(op, &mut ops)?;
            }
            rules.push(FilterRule {
                pattern: rule.pattern.clone(),
                ops,
            });
        }
        Ok(RuleSet { rules })
    }
}

/// Replace every macro reference with the macro's replace pairs.
pub fn expand_macros(rules: &RuleSet, macros: &RegexMacros) -> Result<RuleSet> {
    rules.map_ops(|op, out| {
        match op {
            RuleOp::Macro(name) => {
                let pairs = macros
                    .get(name)
                    .ok_or_else(|| unknown_macro("rule set", name))?;
                out.extend(pairs.iter().cloned().map(RuleOp::Replace));
            }
            other => out.push(other.clone()),
        }
        Ok(())
    })
}

/// Wrap every regex search in a non-capturing group and normalize the
/// group references of its replacement. Sentinels are left untouched.
pub fn add_delimiters(rules: &RuleSet) -> RuleSet {
    let delimited = rules.map_ops(|op, out| {
        out.push(match op {
            RuleOp::Replace(pair) => RuleOp::Replace(ReplacePair {
                search: format!("(?:{})", pair.search),
                replace: normalize_group_refs(&pair.replace),
            }),
            other => other.clone(),
        });
        Ok(())
    });
    delimited.unwrap_or_else(|_| rules.clone())
}

/// Union of two rule sets. Patterns of `a` come first; a pattern present in
/// both with different operations gets `b`'s operations appended.
pub fn merge_rule_sets(a: &RuleSet, b: &RuleSet) -> RuleSet {
    let mut merged = a.clone();
    for rule in &b.rules {
        match merged.rules.iter_mut().find(|r| r.pattern == rule.pattern) {
            None => merged.rules.push(rule.clone()),
            Some(existing) if existing.ops != rule.ops => {
                existing.ops.extend(rule.ops.iter().cloned());
            }
            Some(_) => {}
        }
    }
    merged
}

/// Rewrite `$N` references as `${N}` so a following letter or digit is not
/// read as part of a group name. A `$` that starts no reference is escaped.
fn normalize_group_refs(replace: &str) -> String {
    let mut out = String::with_capacity(replace.len());
    let mut chars = replace.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some('$') => {
                chars.next();
                out.push_str("$$");
            }
            Some('{') => {
                out.push('$');
                for inner in chars.by_ref() {
                    out.push(inner);
                    if inner == '}' {
                        break;
                    }
                }
            }
            Some(d) if d.is_ascii_digit() => {
                out.push_str("${");
                while let Some(d) = chars.peek().copied().filter(char::is_ascii_digit) {
                    out.push(d);
                    chars.next();
                }
                out.push('}');
            }
            _ => out.push_str("$$"),
        }
    }
    out
}

/// Check that every group the replacement refers to exists in `regex`.
fn check_group_refs(regex: &Regex, replace: &str) -> std::result::Result<(), String> {
    let normalized = normalize_group_refs(replace);
    let mut rest = normalized.as_str();
    while let Some(pos) = rest.find('$') {
        rest = &rest[pos + 1..];
        if let Some(after) = rest.strip_prefix('$') {
            rest = after;
            continue;
        }
        let Some(body) = rest.strip_prefix('{') else {
            continue;
        };
        let Some(end) = body.find('}') else {
            return Err(format!("unterminated group reference in '{replace}'"));
        };
        let group = &body[..end];
        let known = match group.parse::<usize>() {
            Ok(n) => n < regex.captures_len(),
            Err(_) => regex.capture_names().flatten().any(|name| name == group),
        };
        if !known {
            return Err(format!(
                "replacement '{replace}' refers to group {group}, which the search does not define"
            ));
        }
        rest = &body[end + 1..];
    }
    Ok(())
}

fn unknown_macro(filter: &str, name: &str) -> FilterError {
    FilterError::rule_syntax(
        filter,
        format!("uses the regular expression macro {name}, which is not defined"),
    )
}

fn validate_pair(filter: &str, pair: &ReplacePair) -> Result<()> {
    let regex = Regex::new(&pair.search).map_err(|e| {
        FilterError::rule_syntax(
            filter,
            format!("invalid regular expression: {}. {e}", pair.search),
        )
    })?;
    check_group_refs(&regex, &pair.replace)
        .map_err(|message| FilterError::rule_syntax(filter, message))
}

/// Find an earlier pattern that matches every tag-path `pattern` matches.
///
/// An earlier pattern `E` dominates `P` if `P`, padded with `:*` up to
/// `E`'s length when `P` is shorter and ends in `*`, matches as a tag-path
/// against `E`. A lone `*` is never reported as dominated.
pub fn find_dominating<'a>(pattern: &TagPattern, earlier: &'a [TagPattern]) -> Option<&'a TagPattern> {
    let body = pattern.body();
    earlier.iter().find(|candidate| {
        let mut extended = body.to_string();
        if pattern.token_count() < candidate.token_count() && body.ends_with(WILDCARD) {
            for _ in pattern.token_count()..candidate.token_count() {
                extended.push_str(":*");
            }
        }
        extended != WILDCARD && match_single(&extended, candidate.body())
    })
}

/// Validate a raw rule set before compiling it.
///
/// `custom_hook` says whether the owning filter implements a custom
/// conversion hook.
pub fn validate(
    filter: &str,
    rules: &RuleSet,
    macros: &RegexMacros,
    custom_hook: bool,
) -> Result<()> {
    if rules.is_empty() {
        return Err(FilterError::rule_syntax(
            filter,
            "does not contain any filter rules",
        ));
    }

    for (name, pairs) in macros {
        for pair in pairs {
            validate_pair(filter, pair).map_err(|e| {
                FilterError::rule_syntax(filter, format!("macro {name}: {e}"))
            })?;
        }
    }

    let patterns: Vec<TagPattern> = rules.patterns().map(TagPattern::new).collect();

    for (idx, rule) in rules.iter().enumerate() {
        let pattern = &patterns[idx];

        if !pattern.is_well_formed() {
            return Err(FilterError::rule_syntax(
                filter,
                format!("invalid tag definition: {}", rule.pattern),
            ));
        }

        for op in &rule.ops {
            match op {
                RuleOp::Replace(pair) => validate_pair(filter, pair)?,
                RuleOp::Custom if !custom_hook => {
                    return Err(FilterError::rule_syntax(
                        filter,
                        format!(
                            "rule {} requests a custom conversion, but the filter does not implement one",
                            rule.pattern
                        ),
                    ));
                }
                RuleOp::Custom => {}
                RuleOp::Macro(name) if !macros.contains_key(name) => {
                    return Err(unknown_macro(filter, name));
                }
                RuleOp::Macro(_) => {}
            }
        }

        if pattern.is_blacklist() && !rule.ops.is_empty() {
            return Err(FilterError::rule_syntax(
                filter,
                format!(
                    "black list rule {} has operations, which will never be executed \
                     because the black list rule deletes the matched structure",
                    rule.pattern
                ),
            ));
        }

        if let Some(dominating) = find_dominating(pattern, &patterns[..idx]) {
            return Err(FilterError::Domination {
                filter: filter.to_string(),
                pattern: rule.pattern.clone(),
                dominated_by: dominating.as_str().to_string(),
            });
        }
    }

    Ok(())
}

/// An operation ready to run.
#[derive(Debug, Clone)]
pub enum CompiledOp {
    Replace { regex: Regex, replacement: String },
    Custom,
}

#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub pattern: TagPattern,
    pub ops: Vec<CompiledOp>,
}

/// A validated rule set with macros expanded and regexes built.
#[derive(Debug, Clone)]
pub struct CompiledRuleSet {
    rules: Vec<CompiledRule>,
    patterns: Vec<TagPattern>,
}

impl CompiledRuleSet {
    pub fn rules(&self) -> &[CompiledRule] {
        &self.rules
    }

    pub fn rule(&self, idx: usize) -> &CompiledRule {
        &self.rules[idx]
    }

    /// Patterns in declared order, for first-match resolution.
    pub fn patterns(&self) -> &[TagPattern] {
        &self.patterns
    }
}

/// Validate and compile a raw rule set.
pub fn compile_rule_set(
    filter: &str,
    raw: &RuleSet,
    macros: &RegexMacros,
    params: &FilterParams,
    custom_hook: bool,
) -> Result<CompiledRuleSet> {
    validate(filter, raw, macros, custom_hook)?;

    let expanded = expand_macros(raw, macros)?;
    let interpolated = expanded.map_ops(|op, out| {
        out.push(match op {
            RuleOp::Replace(pair) => RuleOp::Replace(ReplacePair {
                search: pair.search.clone(),
                replace: params.interpolate(&pair.replace),
            }),
            other => other.clone(),
        });
        Ok(())
    })?;
    let delimited = add_delimiters(&interpolated);

    let mut rules = Vec::with_capacity(delimited.len());
    for rule in delimited.iter() {
        let mut ops = Vec::with_capacity(rule.ops.len());
        for op in &rule.ops {
            match op {
                RuleOp::Replace(pair) => {
                    let regex = Regex::new(&pair.search).map_err(|e| {
                        FilterError::rule_syntax(
                            filter,
                            format!("invalid regular expression: {}. {e}", pair.search),
                        )
                    })?;
                    ops.push(CompiledOp::Replace {
                        regex,
                        replacement: pair.replace.clone(),
                    });
                }
                RuleOp::Custom => ops.push(CompiledOp::Custom),
                RuleOp::Macro(name) => return Err(unknown_macro(filter, name)),
            }
        }
        rules.push(CompiledRule {
            pattern: TagPattern::new(&rule.pattern),
            ops,
        });
    }

    let patterns = rules.iter().map(|r| r.pattern.clone()).collect();
    Ok(CompiledRuleSet { rules, patterns })
}
