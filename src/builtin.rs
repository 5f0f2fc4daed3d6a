//! Built-in filters.
//!
//! Most built-ins are pure rule tables. The record cleaners
//! ([`EmptyRecordCleaner`], [`VoidReferenceRemover`]) additionally use the
//! reference graph through a custom conversion hook.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::trace;

use crate::error::Result;
use crate::filter::{CustomConvert, GedcomFilter};
use crate::gedcom::{GedcomLine, TAG_CHARS, XREF_CHARS};
use crate::params::FilterParams;
use crate::references::ReferenceGraph;
use crate::rules::{RegexMacros, ReplacePair, RuleOp, RuleSet};

static RECORD_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"^0 @({XREF_CHARS})@ ({TAG_CHARS})")).expect("record line regex")
});

/// Blacklist a tag wherever it occurs down to level 3, keep everything else.
fn remove_tag_everywhere(tag: &str) -> RuleSet {
    let mut rules = RuleSet::new();
    for depth in 0..4 {
        let path = format!("{}{tag}", "*:".repeat(depth));
        rules.insert(&format!("!{path}"), vec![]);
        rules.insert(&format!("!{path}:*"), vec![]);
    }
    rules.rule("*", vec![])
}

/// Exports every structure unchanged.
pub struct AllRecords;

impl GedcomFilter for AllRecords {
    fn name(&self) -> &str {
        "AllRecords"
    }

    fn rules(&self, _params: &FilterParams) -> RuleSet {
        RuleSet::passthrough(&["*"])
    }
}

/// Keeps only header, submitter and trailer.
pub struct NoRecords;

impl GedcomFilter for NoRecords {
    fn name(&self) -> &str {
        "NoRecords"
    }

    fn rules(&self, _params: &FilterParams) -> RuleSet {
        RuleSet::passthrough(&["HEAD", "HEAD:*", "SUBM", "SUBM:*", "TRLR"])
    }
}

pub struct RemoveChangeData;

impl GedcomFilter for RemoveChangeData {
    fn name(&self) -> &str {
        "RemoveChangeData"
    }

    fn rules(&self, _params: &FilterParams) -> RuleSet {
        RuleSet::passthrough(&["!*:CHAN", "!*:CHAN:*", "*"])
    }
}

pub struct RemoveAllNotes;

impl GedcomFilter for RemoveAllNotes {
    fn name(&self) -> &str {
        "RemoveAllNotes"
    }

    fn rules(&self, _params: &FilterParams) -> RuleSet {
        remove_tag_everywhere("NOTE")
    }
}

pub struct RemoveAllMediaObjects;

impl GedcomFilter for RemoveAllMediaObjects {
    fn name(&self) -> &str {
        "RemoveAllMediaObjects"
    }

    fn rules(&self, _params: &FilterParams) -> RuleSet {
        remove_tag_everywhere("OBJE")
    }
}

/// Removes sources and citations; the header's SOUR (the exporting
/// system) is kept.
pub struct RemoveAllSources;

impl GedcomFilter for RemoveAllSources {
    fn name(&self) -> &str {
        "RemoveAllSources"
    }

    fn rules(&self, _params: &FilterParams) -> RuleSet {
        let sources = remove_tag_everywhere("SOUR");
        let mut rules = RuleSet::passthrough(&["HEAD:SOUR", "HEAD:SOUR:*"]);
        for rule in sources.iter() {
            rules.insert(&rule.pattern, rule.ops.clone());
        }
        rules
    }
}

pub struct RemoveToDoData;

impl GedcomFilter for RemoveToDoData {
    fn name(&self) -> &str {
        "RemoveToDoData"
    }

    fn rules(&self, _params: &FilterParams) -> RuleSet {
        RuleSet::passthrough(&[
            "!FAM:_TODO",
            "!FAM:_TODO:*",
            "!INDI:_TODO",
            "!INDI:_TODO:*",
            "*",
        ])
    }
}

pub struct RemoveRestrictions;

impl GedcomFilter for RemoveRestrictions {
    fn name(&self) -> &str {
        "RemoveRestrictions"
    }

    fn rules(&self, _params: &FilterParams) -> RuleSet {
        RuleSet::passthrough(&["!*:RESN", "!*:*:RESN", "!*:*:*:RESN", "*"])
    }
}

/// Exports everything; CONC continuation lines are wrapped without leading
/// or trailing spaces.
pub struct AvoidLeadingSpacesForConc;

impl GedcomFilter for AvoidLeadingSpacesForConc {
    fn name(&self) -> &str {
        "AvoidLeadingSpacesForCONC"
    }

    fn rules(&self, _params: &FilterParams) -> RuleSet {
        RuleSet::passthrough(&["*"])
    }

    fn wrap_conc_without_spaces(&self) -> bool {
        true
    }
}

/// Removes the user names webtrees stores with to-do items and changes.
pub struct RemoveWebtreesUser;

impl GedcomFilter for RemoveWebtreesUser {
    fn name(&self) -> &str {
        "RemoveWebtreesUser"
    }

    fn rules(&self, _params: &FilterParams) -> RuleSet {
        RuleSet::passthrough(&["!*:_TODO:_WT_USER", "!*:CHAN:_WT_USER", "*"])
    }
}

/// Shortens every date to its year, e.g. `2 DATE ABT 12 MAR 1901` becomes
/// `2 DATE ABT 1901`. Header, change and place-name dates are kept.
pub struct ReduceDatesToYears;

impl GedcomFilter for ReduceDatesToYears {
    fn name(&self) -> &str {
        "ReduceDatesToYears"
    }

    fn rules(&self, _params: &FilterParams) -> RuleSet {
        let date_to_year = || vec![RuleOp::macro_ref("DateToYear")];
        RuleSet::passthrough(&[
            "HEAD:DATE",
            "HEAD:SOUR:DATA:DATE",
            "SOUR:DATA:EVEN:DATE",
            "SOUR:DATA:DATE",
            "*:CHAN:DATE",
            "_LOC:NAME:DATE",
        ])
        .rule("*:DATE", date_to_year())
        .rule("*:*:DATE", date_to_year())
        .rule("*:*:*:DATE", date_to_year())
        .rule("*:*:*:*:DATE", date_to_year())
        .rule("*", vec![])
    }

    fn macros(&self) -> RegexMacros {
        RegexMacros::from([(
            "DateToYear".to_string(),
            vec![ReplacePair::new(
                r"([\d]) DATE (INT )*(ABT |CAL |EST |AFT |BEF |BET )*(?:.*([\d]{4} AND ))*.*([\d]{4})( .*)*",
                "$1 DATE $2$3$4$5$6",
            )],
        )])
    }
}

/// Reduces individuals that carry nothing but SEX and up to two family
/// links to a bare `0 @X@ INDI` line.
pub struct ReduceMinimalIndividuals;

impl GedcomFilter for ReduceMinimalIndividuals {
    fn name(&self) -> &str {
        "ReduceMinimalIndividuals"
    }

    fn rules(&self, _params: &FilterParams) -> RuleSet {
        let family = format!(r"1 (FAMC|FAMS) @{XREF_CHARS}@\n");
        let reduced = |families: usize| {
            RuleOp::replace(
                &format!(
                    r"0 @({XREF_CHARS})@ INDI\n{}1 SEX [\w]\n$",
                    family.repeat(families)
                ),
                "0 @$1@ INDI\n",
            )
        };
        RuleSet::new()
            .rule("INDI", vec![reduced(0), reduced(1), reduced(2)])
            .rule("*", vec![])
    }
}

/// Drops empty records, optionally unreferenced records, and pointer lines
/// to empty records.
#[derive(Debug, Clone)]
pub struct EmptyRecordCleaner {
    name: String,
    pub remove_empty: bool,
    pub remove_unlinked: bool,
    pub remove_void_references: bool,
    pub reduce_minimal_individuals: bool,
}

impl EmptyRecordCleaner {
    pub fn empty_or_unlinked() -> Self {
        EmptyRecordCleaner {
            name: "RemoveEmptyOrUnlinkedRecords".to_string(),
            remove_empty: true,
            remove_unlinked: true,
            remove_void_references: true,
            reduce_minimal_individuals: false,
        }
    }

    pub fn empty_only() -> Self {
        EmptyRecordCleaner {
            name: "RemoveEmptyRecords".to_string(),
            remove_unlinked: false,
            ..Self::empty_or_unlinked()
        }
    }

    fn convert_record(&self, pattern: &str, gedcom: &str, xref: &str, references: &ReferenceGraph) -> String {
        let Some(record) = references.get(xref) else {
            return gedcom.to_string();
        };
        if (self.remove_empty && record.is_empty())
            || (pattern != "INDI" && self.remove_unlinked && !record.is_referenced())
        {
            trace!(xref, pattern, "dropping empty or unlinked record");
            return String::new();
        }
        if pattern == "INDI" && self.reduce_minimal_individuals && record.is_minimal_individual() {
            return format!("0 @{xref}@ INDI\n");
        }
        gedcom.to_string()
    }
}

impl CustomConvert for EmptyRecordCleaner {
    fn custom_convert(
        &self,
        pattern: &str,
        gedcom: &str,
        references: &mut ReferenceGraph,
        _params: &FilterParams,
    ) -> Result<String> {
        if let Some(caps) = RECORD_LINE.captures(gedcom) {
            return Ok(self.convert_record(pattern, gedcom, &caps[1], references));
        }
        if self.remove_void_references
            && let Ok(line) = GedcomLine::parse(gedcom)
            && let Some(xref) = line.pointer()
            && references.is_empty_record(xref)
        {
            trace!(xref, pattern, "dropping reference to empty record");
            return Ok(String::new());
        }
        Ok(gedcom.to_string())
    }
}

impl GedcomFilter for EmptyRecordCleaner {
    fn name(&self) -> &str {
        &self.name
    }

    fn rules(&self, _params: &FilterParams) -> RuleSet {
        let hooked = [
            "FAM:CHIL",
            "FAM:HUSB",
            "FAM:WIFE",
            "FAM:*:_ASSO",
            "INDI:ALIA",
            "INDI:ASSO",
            "INDI:*:_ASSO",
            "*:NOTE",
            "*:*:NOTE",
            "*:*:*:NOTE",
            "*:OBJE",
            "*:*:OBJE",
            "*:*:*:OBJE",
            "*:*:*:*:OBJE",
            "SOUR:REPO",
            "*:SOUR",
            "*:*:SOUR",
            "*:*:*:SOUR",
            "FAM",
            "INDI",
            "NOTE",
            "OBJE",
            "REPO",
            "SOUR",
            "_LOC",
        ];
        hooked
            .iter()
            .fold(RuleSet::passthrough(&["HEAD", "HEAD:*"]), |rules, pattern| {
                rules.rule(pattern, vec![RuleOp::Custom])
            })
            .rule("*", vec![])
    }

    fn uses_reference_analysis(&self) -> bool {
        true
    }

    fn custom_converter(&self) -> Option<&dyn CustomConvert> {
        Some(self)
    }
}

/// Drops pointer lines whose target record is never defined.
pub struct VoidReferenceRemover;

impl CustomConvert for VoidReferenceRemover {
    fn custom_convert(
        &self,
        pattern: &str,
        gedcom: &str,
        references: &mut ReferenceGraph,
        _params: &FilterParams,
    ) -> Result<String> {
        if let Ok(line) = GedcomLine::parse(gedcom)
            && let Some(xref) = line.pointer()
            && let Some(record) = references.get(xref)
            && !record.exists()
        {
            trace!(xref, pattern, "dropping void reference");
            return Ok(String::new());
        }
        Ok(gedcom.to_string())
    }
}

impl GedcomFilter for VoidReferenceRemover {
    fn name(&self) -> &str {
        "RemoveVoidReferences"
    }

    fn rules(&self, _params: &FilterParams) -> RuleSet {
        let hooked = [
            "*:NOTE",
            "*:*:NOTE",
            "*:*:*:NOTE",
            "*:OBJE",
            "*:*:OBJE",
            "*:*:*:OBJE",
            "*:*:*:*:OBJE",
            "*:SOUR",
            "*:*:SOUR",
            "*:*:*:SOUR",
            "HEAD:*",
            "FAM:*:_ASSO",
            "FAM:*",
            "INDI:*:_ASSO",
            "INDI:*",
            "SOUR:REPO",
        ];
        hooked
            .iter()
            .fold(RuleSet::new(), |rules, pattern| {
                rules.rule(pattern, vec![RuleOp::Custom])
            })
            .rule("*", vec![])
    }

    fn uses_reference_analysis(&self) -> bool {
        true
    }

    fn custom_converter(&self) -> Option<&dyn CustomConvert> {
        Some(self)
    }
}

/// Births, marriages and deaths only, with dates reduced to years and a
/// source citation linking every individual and family back to the tree.
///
/// Uses the `tree` and `base_url` parameters. Runs `RemoveEmptyRecords`
/// afterwards.
pub struct BirthMarriageDeath;

impl BirthMarriageDeath {
    const LINK: &'static str = "%BASE_URL%/tree/%TREE%";
}

impl GedcomFilter for BirthMarriageDeath {
    fn name(&self) -> &str {
        "BirthMarriageDeath"
    }

    fn rules(&self, _params: &FilterParams) -> RuleSet {
        let link = Self::LINK;
        let citation = |record: &str, page: &str| {
            RuleOp::replace(
                &format!(r"0 @([^@]+)@ {record}\n"),
                &format!("0 @$1@ {record}\n1 SOUR @S1@\n2 PAGE {link}/{page}/$1\n"),
            )
        };
        let mark = |level_line: &str| {
            RuleOp::replace(&format!(r"{level_line}\n$"), &format!("{level_line} Y\n"))
        };
        let keep = |rules: RuleSet, patterns: &[&str]| {
            patterns
                .iter()
                .fold(rules, |rules, pattern| rules.rule(pattern, vec![]))
        };

        let rules = keep(
            RuleSet::new(),
            &[
                "HEAD",
                "HEAD:SOUR",
                "HEAD:SUBM",
                "HEAD:GEDC",
                "HEAD:GEDC:VERS",
                "HEAD:GEDC:FORM",
                "HEAD:CHAR",
            ],
        )
        .rule(
            "INDI",
            vec![citation("INDI", "individual"), RuleOp::macro_ref("DateToYear")],
        );
        let rules = keep(rules, &["INDI:NAME", "INDI:NAME:TYPE", "INDI:SEX"])
            .rule("INDI:BIRT", vec![mark("1 BIRT")]);
        let rules = keep(rules, &["INDI:BIRT:DATE", "INDI:BIRT:PLAC"])
            .rule("INDI:CHR", vec![mark("1 CHR")]);
        let rules = keep(
            rules,
            &[
                "INDI:CHR:DATE",
                "INDI:CHR:PLAC",
                "INDI:BAPM",
                "INDI:BAPM:DATE",
                "INDI:BAPM:PLAC",
            ],
        )
        .rule("INDI:DEAT", vec![mark("1 DEAT")]);
        let rules = keep(
            rules,
            &[
                "INDI:DEAT:DATE",
                "INDI:DEAT:PLAC",
                "INDI:FAMC",
                "!INDI:FAMC:NOTE",
                "INDI:FAMC:*",
                "INDI:FAMS",
            ],
        )
        .rule(
            "FAM",
            vec![citation("FAM", "family"), RuleOp::macro_ref("DateToYear")],
        );
        let rules = keep(rules, &["FAM:HUSB", "FAM:WIFE", "FAM:CHIL"])
            .rule("FAM:MARR", vec![mark("1 MARR")]);
        keep(
            rules,
            &["FAM:MARR:DATE", "FAM:MARR:PLAC", "FAM:MARR:TYPE", "SUBM", "SUBM:NAME"],
        )
        .rule(
            "TRLR",
            vec![RuleOp::replace(
                r"0 TRLR\n",
                &format!("0 @S1@ SOUR\n1 TITL {link}/\n0 TRLR\n"),
            )],
        )
    }

    fn macros(&self) -> RegexMacros {
        RegexMacros::from([(
            "DateToYear".to_string(),
            vec![ReplacePair::new(
                r"2 DATE (INT )*(ABT |CAL |EST |AFT |BEF |BET )*(?:.*([\d]{4} AND ))*.*([\d]{4})( .*)*\n",
                "2 DATE $1$2$3$4$5\n",
            )],
        )])
    }

    fn included_after(&self) -> Vec<String> {
        vec!["RemoveEmptyRecords".to_string()]
    }
}

/// Runs `BirthMarriageDeath` and `RemoveEmptyRecords` before exporting the
/// result unchanged.
pub struct Combined;

impl GedcomFilter for Combined {
    fn name(&self) -> &str {
        "Combined"
    }

    fn rules(&self, _params: &FilterParams) -> RuleSet {
        RuleSet::passthrough(&["*"])
    }

    fn included_before(&self) -> Vec<String> {
        vec![
            "BirthMarriageDeath".to_string(),
            "RemoveEmptyRecords".to_string(),
        ]
    }
}

/// Every built-in filter, in registry order.
pub fn builtin_filters() -> Vec<Arc<dyn GedcomFilter>> {
    vec![
        Arc::new(AllRecords),
        Arc::new(NoRecords),
        Arc::new(RemoveChangeData),
        Arc::new(RemoveAllNotes),
        Arc::new(RemoveAllMediaObjects),
        Arc::new(RemoveAllSources),
        Arc::new(RemoveToDoData),
        Arc::new(RemoveRestrictions),
        Arc::new(RemoveWebtreesUser),
        Arc::new(AvoidLeadingSpacesForConc),
        Arc::new(ReduceDatesToYears),
        Arc::new(ReduceMinimalIndividuals),
        Arc::new(EmptyRecordCleaner::empty_or_unlinked()),
        Arc::new(EmptyRecordCleaner::empty_only()),
        Arc::new(VoidReferenceRemover),
        Arc::new(BirthMarriageDeath),
        Arc::new(Combined),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter;

    #[test]
    fn test_all_builtins_validate() {
        let params = FilterParams::new();
        for builtin in builtin_filters() {
            if let Err(e) = filter::compile(builtin.as_ref(), &params) {
                panic!("{} does not compile: {e}", builtin.name());
            }
        }
    }

    #[test]
    fn test_builtin_names_unique() {
        let mut names: Vec<String> = builtin_filters()
            .iter()
            .map(|f| f.name().to_string())
            .collect();
        let total = names.len();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), total);
    }

    #[test]
    fn test_remove_tag_everywhere_shape() {
        let rules = remove_tag_everywhere("NOTE");
        let patterns: Vec<&str> = rules.patterns().collect();
        assert_eq!(
            patterns,
            vec![
                "!NOTE",
                "!NOTE:*",
                "!*:NOTE",
                "!*:NOTE:*",
                "!*:*:NOTE",
                "!*:*:NOTE:*",
                "!*:*:*:NOTE",
                "!*:*:*:NOTE:*",
                "*",
            ]
        );
    }

    #[test]
    fn test_remove_all_sources_keeps_header_source() {
        let rules = RemoveAllSources.rules(&FilterParams::new());
        let patterns: Vec<&str> = rules.patterns().collect();
        assert_eq!(&patterns[..3], &["HEAD:SOUR", "HEAD:SOUR:*", "!SOUR"]);
        assert_eq!(patterns.last(), Some(&"*"));
    }

    #[test]
    fn test_empty_record_hook_drops_empty_record() {
        let mut graph = ReferenceGraph::build(&["0 @I1@ INDI\n1 OBJE @X1@", "0 @X1@ OBJE"]);
        graph.prune().unwrap();
        let cleaner = EmptyRecordCleaner::empty_or_unlinked();
        let params = FilterParams::new();
        let out = cleaner
            .custom_convert("OBJE", "0 @X1@ OBJE\n", &mut graph, &params)
            .unwrap();
        assert_eq!(out, "");
        let out = cleaner
            .custom_convert("*:OBJE", "1 OBJE @X1@\n", &mut graph, &params)
            .unwrap();
        assert_eq!(out, "");
        let out = cleaner
            .custom_convert("INDI", "0 @I1@ INDI\n", &mut graph, &params)
            .unwrap();
        assert_eq!(out, "0 @I1@ INDI\n");
    }

    #[test]
    fn test_empty_only_keeps_unlinked() {
        let mut graph = ReferenceGraph::build(&["0 @N1@ NOTE lonely"]);
        graph.prune().unwrap();
        let params = FilterParams::new();
        let text = "0 @N1@ NOTE lonely\n";
        let kept = EmptyRecordCleaner::empty_only()
            .custom_convert("NOTE", text, &mut graph, &params)
            .unwrap();
        assert_eq!(kept, text);
        let dropped = EmptyRecordCleaner::empty_or_unlinked()
            .custom_convert("NOTE", text, &mut graph, &params)
            .unwrap();
        assert_eq!(dropped, "");
    }

    #[test]
    fn test_minimal_individual_reduction() {
        let mut graph = ReferenceGraph::build(&["0 @I1@ INDI\n1 SEX M"]);
        let cleaner = EmptyRecordCleaner {
            reduce_minimal_individuals: true,
            ..EmptyRecordCleaner::empty_or_unlinked()
        };
        let out = cleaner
            .custom_convert("INDI", "0 @I1@ INDI\n1 SEX M\n", &mut graph, &FilterParams::new())
            .unwrap();
        assert_eq!(out, "0 @I1@ INDI\n");
    }

    #[test]
    fn test_void_reference_hook() {
        let mut graph = ReferenceGraph::build(&["0 @I1@ INDI\n1 FAMC @F9@\n1 FAMS @F1@", "0 @F1@ FAM"]);
        let params = FilterParams::new();
        let remover = VoidReferenceRemover;
        let void = remover
            .custom_convert("INDI:*", "1 FAMC @F9@\n", &mut graph, &params)
            .unwrap();
        assert_eq!(void, "");
        let kept = remover
            .custom_convert("INDI:*", "1 FAMS @F1@\n", &mut graph, &params)
            .unwrap();
        assert_eq!(kept, "1 FAMS @F1@\n");
        let plain = remover
            .custom_convert("INDI:*", "1 NAME A /B/\n", &mut graph, &params)
            .unwrap();
        assert_eq!(plain, "1 NAME A /B/\n");
    }
}
