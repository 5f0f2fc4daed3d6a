//! Record reference graph.
//!
//! Every level-0 structure becomes a node keyed by its xref (HEAD and TRLR
//! by their tag). Every `n TAG @XREF@` line inside a record links the
//! record to the referenced one, in both directions. Nodes for referenced
//! but never defined records are created on the fly with an unknown type,
//! which is filled in if the definition shows up later.
//!
//! [`ReferenceGraph::prune`] detaches records that are empty or no longer
//! referenced, cascading into whatever they referenced, until a fixed
//! point is reached. Custom hooks then read the result to decide which
//! records and pointer lines to drop.

use std::collections::{BTreeSet, HashMap};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::error::{FilterError, Result};
use crate::gedcom::{self, GedcomLine, TAG_CHARS, XREF_CHARS};

/// Record types that are never detached by pruning.
pub const KEPT_RECORD_TYPES: [&str; 3] = ["HEAD", "TRLR", "INDI"];

/// Tags an individual may carry and still count as minimal.
pub const MINIMAL_INDIVIDUAL_TAGS: [&str; 3] = ["SEX", "FAMC", "FAMS"];

/// Upper bound on pruning passes before giving up.
pub const MAX_PRUNE_ITERATIONS: usize = 100;

static REFERENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?m)^[0-9]+ {TAG_CHARS} @({XREF_CHARS})@")).expect("reference regex")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceRecord {
    xref: String,
    record_type: Option<String>,
    empty: bool,
    minimal_individual: bool,
    references: BTreeSet<usize>,
    referenced_by: BTreeSet<usize>,
}

impl ReferenceRecord {
    fn new(xref: &str, record_type: Option<&str>) -> Self {
        ReferenceRecord {
            xref: xref.to_string(),
            record_type: record_type.map(str::to_string),
            empty: false,
            minimal_individual: false,
            references: BTreeSet::new(),
            referenced_by: BTreeSet::new(),
        }
    }

    pub fn xref(&self) -> &str {
        &self.xref
    }

    /// Record type such as `INDI` or `NOTE`; `None` if the record was only
    /// seen as the target of a reference.
    pub fn record_type(&self) -> Option<&str> {
        self.record_type.as_deref()
    }

    /// Whether the record is defined in the data, i.e. its type is known.
    pub fn exists(&self) -> bool {
        self.record_type.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.empty
    }

    pub fn is_minimal_individual(&self) -> bool {
        self.minimal_individual
    }

    pub fn is_referenced(&self) -> bool {
        !self.referenced_by.is_empty()
    }

    pub fn is_referencing(&self) -> bool {
        !self.references.is_empty()
    }

    fn is_prunable(&self) -> bool {
        (self.empty || !self.is_referenced())
            && !self
                .record_type
                .as_deref()
                .is_some_and(|t| KEPT_RECORD_TYPES.contains(&t))
    }
}

/// Arena of records with symmetric index-set edges.
#[derive(Debug, Clone, Default)]
pub struct ReferenceGraph {
    records: Vec<ReferenceRecord>,
    index: HashMap<String, usize>,
}

impl ReferenceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the graph from record blocks. Each block is split at level 0
    /// again, so a block may hold several records.
    pub fn build<S: AsRef<str>>(records: &[S]) -> Self {
        let mut graph = ReferenceGraph::new();
        for block in records {
            for record in gedcom::split_top_level(block.as_ref()) {
                graph.add_record(record);
            }
        }
        debug!(records = graph.len(), "reference graph built");
        graph
    }

    /// Register one level-0 structure and the references it contains.
    /// Text that does not start with a level-0 line is ignored.
    pub fn add_record(&mut self, text: &str) {
        let Ok(line) = GedcomLine::parse_at(text, 0) else {
            return;
        };
        let key = line.xref.clone().unwrap_or_else(|| line.tag.clone());
        let idx = self.node(&key);

        let record = &mut self.records[idx];
        if record.record_type.is_none() {
            record.record_type = Some(line.tag.clone());
        }

        let has_substructure = text
            .split_once('\n')
            .is_some_and(|(_, rest)| !rest.trim().is_empty());
        let header_or_trailer = matches!(line.tag.as_str(), "HEAD" | "TRLR");
        if line.value.is_empty() && !has_substructure && !header_or_trailer {
            record.empty = true;
        }

        if line.tag == "INDI" {
            let minimal = gedcom::split_substructures(text, 1).into_iter().all(|sub| {
                GedcomLine::parse(sub)
                    .map(|child| MINIMAL_INDIVIDUAL_TAGS.contains(&child.tag.as_str()))
                    .unwrap_or(true)
            });
            if minimal {
                self.records[idx].minimal_individual = true;
            }
        }

        for caps in REFERENCE.captures_iter(text) {
            let target = self.node(&caps[1]);
            self.link(idx, target);
        }
    }

    fn node(&mut self, xref: &str) -> usize {
        if let Some(&idx) = self.index.get(xref) {
            return idx;
        }
        let idx = self.records.len();
        self.records.push(ReferenceRecord::new(xref, None));
        self.index.insert(xref.to_string(), idx);
        idx
    }

    fn link(&mut self, from: usize, to: usize) {
        self.records[from].references.insert(to);
        self.records[to].referenced_by.insert(from);
    }

    pub fn get(&self, xref: &str) -> Option<&ReferenceRecord> {
        self.index.get(xref).map(|&idx| &self.records[idx])
    }

    /// Whether a record with this xref is defined in the data.
    pub fn exists(&self, xref: &str) -> bool {
        self.get(xref).is_some_and(ReferenceRecord::exists)
    }

    pub fn is_empty_record(&self, xref: &str) -> bool {
        self.get(xref).is_some_and(ReferenceRecord::is_empty)
    }

    pub fn is_referenced(&self, xref: &str) -> bool {
        self.get(xref).is_some_and(ReferenceRecord::is_referenced)
    }

    pub fn is_minimal_individual(&self, xref: &str) -> bool {
        self.get(xref)
            .is_some_and(ReferenceRecord::is_minimal_individual)
    }

    /// Xrefs of the records `xref` points to.
    pub fn references_of(&self, xref: &str) -> Vec<&str> {
        self.neighbours(xref, |r| &r.references)
    }

    /// Xrefs of the records pointing to `xref`.
    pub fn referenced_by(&self, xref: &str) -> Vec<&str> {
        self.neighbours(xref, |r| &r.referenced_by)
    }

    fn neighbours(
        &self,
        xref: &str,
        edges: impl Fn(&ReferenceRecord) -> &BTreeSet<usize>,
    ) -> Vec<&str> {
        self.get(xref)
            .map(|r| {
                edges(r)
                    .iter()
                    .map(|&idx| self.records[idx].xref.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ReferenceRecord> {
        self.records.iter()
    }

    /// Detach empty and unreferenced records until nothing changes.
    ///
    /// Returns the number of passes made.
    pub fn prune(&mut self) -> Result<usize> {
        self.prune_with_limit(MAX_PRUNE_ITERATIONS)
    }

    pub fn prune_with_limit(&mut self, max_passes: usize) -> Result<usize> {
        let mut passes = 0;
        loop {
            passes += 1;
            let mut modified = false;
            for idx in 0..self.records.len() {
                modified |= self.detach(idx);
            }
            debug!(pass = passes, modified, "reference pruning pass");
            if !modified {
                return Ok(passes);
            }
            if passes >= max_passes {
                return Err(FilterError::TooManyIterations { iterations: passes });
            }
        }
    }

    /// Remove all edges of a prunable record, then continue with the
    /// records it used to reference.
    fn detach(&mut self, start: usize) -> bool {
        let mut modified = false;
        let mut pending = vec![start];
        while let Some(idx) = pending.pop() {
            if !self.records[idx].is_prunable() {
                continue;
            }
            for source in std::mem::take(&mut self.records[idx].referenced_by) {
                self.records[source].references.remove(&idx);
                modified = true;
            }
            for target in std::mem::take(&mut self.records[idx].references) {
                self.records[target].referenced_by.remove(&idx);
                modified = true;
                pending.push(target);
            }
        }
        modified
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(text: &str) -> ReferenceGraph {
        ReferenceGraph::build(&[text])
    }

    #[test]
    fn test_build_keys_and_types() {
        let g = graph("0 HEAD\n1 CHAR UTF-8\n0 @I1@ INDI\n1 NAME A\n0 TRLR");
        assert!(g.exists("HEAD"));
        assert!(g.exists("TRLR"));
        assert_eq!(g.get("I1").unwrap().record_type(), Some("INDI"));
        assert!(!g.is_empty_record("TRLR"));
        assert!(!g.is_empty_record("HEAD"));
        assert!(!graph("0 HEAD").is_empty_record("HEAD"));
    }

    #[test]
    fn test_build_links_both_ways() {
        let g = graph("0 @I1@ INDI\n1 FAMS @F1@\n0 @F1@ FAM\n1 HUSB @I1@");
        assert_eq!(g.references_of("I1"), vec!["F1"]);
        assert_eq!(g.referenced_by("I1"), vec!["F1"]);
        assert!(g.is_referenced("F1"));
    }

    #[test]
    fn test_undefined_target_has_unknown_type() {
        let g = graph("0 @I1@ INDI\n1 NOTE @N9@");
        let n9 = g.get("N9").unwrap();
        assert!(!n9.exists());
        assert_eq!(n9.record_type(), None);
        assert!(n9.is_referenced());
    }

    #[test]
    fn test_type_backfilled_on_later_definition() {
        let g = ReferenceGraph::build(&["0 @I1@ INDI\n1 NOTE @N1@", "0 @N1@ NOTE text"]);
        assert_eq!(g.get("N1").unwrap().record_type(), Some("NOTE"));
        assert!(!g.is_empty_record("N1"));
    }

    #[test]
    fn test_empty_record_detection() {
        let g = graph("0 @X1@ OBJE\n0 @N1@ NOTE\n1 CONT x\n0 @N2@ NOTE hello");
        assert!(g.is_empty_record("X1"));
        assert!(!g.is_empty_record("N1"));
        assert!(!g.is_empty_record("N2"));
    }

    #[test]
    fn test_minimal_individual() {
        let g = graph(
            "0 @I1@ INDI\n1 SEX M\n1 FAMC @F1@\n0 @I2@ INDI\n1 SEX F\n1 NAME Eve\n0 @I3@ INDI",
        );
        assert!(g.is_minimal_individual("I1"));
        assert!(!g.is_minimal_individual("I2"));
        assert!(g.is_minimal_individual("I3"));
        assert!(!g.is_minimal_individual("F1"));
    }

    #[test]
    fn test_prune_detaches_unreferenced_and_empty() {
        let mut g = graph(
            "0 HEAD\n0 @I1@ INDI\n1 OBJE @X1@\n1 NOTE @N1@\n0 @X1@ OBJE\n0 @N1@ NOTE text\n0 @S1@ SOUR\n1 TITL T\n0 TRLR",
        );
        g.prune().unwrap();
        // Empty media record loses its link.
        assert!(!g.is_referenced("X1"));
        assert_eq!(g.references_of("I1"), vec!["N1"]);
        // Unreferenced source stays unreferenced; note is kept.
        assert!(!g.is_referenced("S1"));
        assert!(g.is_referenced("N1"));
    }

    #[test]
    fn test_prune_cascades_through_chain() {
        // S1 is only referenced by the unreferenced note N1.
        let mut g = graph("0 @N1@ NOTE n\n1 SOUR @S1@\n0 @S1@ SOUR\n1 REPO @R1@\n0 @R1@ REPO\n1 NAME r");
        g.prune().unwrap();
        assert!(!g.is_referenced("S1"));
        assert!(!g.is_referenced("R1"));
        assert!(g.iter().all(|r| !r.is_referencing()));
    }

    #[test]
    fn test_prune_keeps_individuals() {
        let mut g = graph("0 @I1@ INDI\n1 FAMS @F1@\n0 @F1@ FAM\n1 HUSB @I1@");
        g.prune().unwrap();
        // I1 is kept as INDI, so F1 stays referenced; F1 in turn keeps I1 referenced.
        assert!(g.is_referenced("F1"));
        assert!(g.is_referenced("I1"));
    }

    #[test]
    fn test_prune_reaches_fixed_point() {
        let mut g = graph(
            "0 @I1@ INDI\n1 OBJE @X1@\n0 @X1@ OBJE\n1 NOTE @N1@\n0 @N1@ NOTE\n1 SOUR @S1@\n0 @S1@ SOUR",
        );
        g.prune().unwrap();
        let before: Vec<ReferenceRecord> = g.iter().cloned().collect();
        let passes = g.prune().unwrap();
        assert_eq!(passes, 1);
        let after: Vec<ReferenceRecord> = g.iter().cloned().collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_prune_iteration_limit() {
        let mut g = graph("0 @N1@ NOTE\n1 SOUR @S1@\n0 @S1@ SOUR\n1 TITL t");
        let err = g.prune_with_limit(1).unwrap_err();
        assert!(matches!(err, FilterError::TooManyIterations { iterations: 1 }));
    }

    #[test]
    fn test_unknown_xref_accessors() {
        let g = graph("0 HEAD");
        assert!(g.get("I404").is_none());
        assert!(!g.exists("I404"));
        assert!(!g.is_referenced("I404"));
        assert!(g.references_of("I404").is_empty());
    }
}
