//! GEDCOM line parsing and level-based splitting.
//!
//! GEDCOM text is line oriented; every line starts with its nesting level:
//!
//! ```text
//! 0 @I1@ INDI
//! 1 NAME John /Smith/
//! 1 BIRT
//! 2 DATE 1 JAN 1900
//! 0 TRLR
//! ```
//!
//! Records and substructures are kept as borrowed text blocks. Splitting
//! is pure partitioning: a block runs from a line at the split level up to
//! (not including) the newline before the next line at that level.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{FilterError, Result};

/// Characters allowed in a record identifier between the `@` signs.
pub const XREF_CHARS: &str = "[A-Za-z0-9:_.-]{1,20}";

/// Characters allowed in a tag. Custom tags start with `_`.
pub const TAG_CHARS: &str = "[_A-Za-z0-9]+";

static LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"^([0-9]+)(?: @({XREF_CHARS})@)? ({TAG_CHARS})\b ?(.*)"
    ))
    .expect("line regex")
});

static POINTER: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"^@({XREF_CHARS})@")).expect("pointer regex"));

/// One physical GEDCOM line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GedcomLine {
    pub level: u32,
    /// Record identifier of a level-0 definition line.
    pub xref: Option<String>,
    pub tag: String,
    pub value: String,
}

impl GedcomLine {
    /// Parse a single line. Anything after the first newline is ignored.
    pub fn parse(line: &str) -> Result<Self> {
        let line = first_line(line);
        let caps = LINE
            .captures(line)
            .ok_or_else(|| FilterError::malformed(line))?;
        let level = caps[1]
            .parse()
            .map_err(|_| FilterError::malformed(line))?;
        Ok(GedcomLine {
            level,
            xref: caps.get(2).map(|m| m.as_str().to_string()),
            tag: caps[3].to_string(),
            value: caps[4].to_string(),
        })
    }

    /// Parse the first line of `gedcom` and require it to be at `level`.
    pub fn parse_at(gedcom: &str, level: u32) -> Result<Self> {
        let line = Self::parse(gedcom)?;
        if line.level != level {
            return Err(FilterError::malformed(first_line(gedcom)));
        }
        Ok(line)
    }

    /// The record this line points to, if its value is an `@XREF@` pointer.
    pub fn pointer(&self) -> Option<&str> {
        POINTER
            .captures(&self.value)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
    }
}

/// The text of the first line, without its newline.
pub fn first_line(gedcom: &str) -> &str {
    gedcom.split('\n').next().unwrap_or("")
}

/// The level number a line starts with, if any.
pub fn line_level(line: &str) -> Option<u32> {
    let end = line
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(line.len());
    if end == 0 {
        return None;
    }
    line[..end].parse().ok()
}

/// Split before every line at exactly `level`. The first block holds
/// whatever precedes the first such line.
fn split_before_level(text: &str, level: u32) -> Vec<&str> {
    let mut blocks = Vec::new();
    let mut start = 0;
    for (idx, _) in text.match_indices('\n') {
        if line_level(&text[idx + 1..]) == Some(level) {
            blocks.push(&text[start..idx]);
            start = idx + 1;
        }
    }
    blocks.push(&text[start..]);
    blocks
}

/// Split GEDCOM text into level-0 structures (records, HEAD, TRLR).
///
/// Joining the result with `"\n"` gives back the input. Empty input yields
/// no blocks.
pub fn split_top_level(gedcom: &str) -> Vec<&str> {
    if gedcom.is_empty() {
        return Vec::new();
    }
    split_before_level(gedcom, 0)
}

/// Split a structure into its substructures at `level`.
///
/// The content above the first substructure belongs to the parent and is
/// not returned.
pub fn split_substructures(gedcom: &str, level: u32) -> Vec<&str> {
    let mut blocks = split_before_level(gedcom, level);
    blocks.remove(0);
    blocks
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "0 HEAD\n1 GEDC\n2 VERS 5.5.1\n0 @I1@ INDI\n1 NAME John /Smith/\n1 BIRT\n2 DATE 1 JAN 1900\n0 TRLR\n";

    #[test]
    fn test_parse_record_line() {
        let line = GedcomLine::parse("0 @I1@ INDI").unwrap();
        assert_eq!(line.level, 0);
        assert_eq!(line.xref.as_deref(), Some("I1"));
        assert_eq!(line.tag, "INDI");
        assert_eq!(line.value, "");
    }

    #[test]
    fn test_parse_value_and_custom_tag() {
        let line = GedcomLine::parse("2 _UID 1234 ABC\n3 CONC more").unwrap();
        assert_eq!(line.level, 2);
        assert_eq!(line.xref, None);
        assert_eq!(line.tag, "_UID");
        assert_eq!(line.value, "1234 ABC");
    }

    #[test]
    fn test_parse_pointer_value() {
        let line = GedcomLine::parse("1 FAMC @F12@").unwrap();
        assert_eq!(line.pointer(), Some("F12"));
        let line = GedcomLine::parse("1 NOTE see @F12@").unwrap();
        assert_eq!(line.pointer(), None);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let err = GedcomLine::parse("NAME without level").unwrap_err();
        assert!(matches!(err, FilterError::MalformedInput { .. }));
        assert!(GedcomLine::parse("").is_err());
    }

    #[test]
    fn test_parse_at_checks_level() {
        assert!(GedcomLine::parse_at("1 NAME X", 1).is_ok());
        assert!(GedcomLine::parse_at("2 NAME X", 1).is_err());
    }

    #[test]
    fn test_split_top_level() {
        let records = split_top_level(SAMPLE);
        assert_eq!(records.len(), 3);
        assert_eq!(records[0], "0 HEAD\n1 GEDC\n2 VERS 5.5.1");
        assert!(records[1].starts_with("0 @I1@ INDI"));
        assert_eq!(records[2], "0 TRLR\n");
    }

    #[test]
    fn test_split_top_level_round_trip() {
        for text in [SAMPLE, "0 HEAD", "0 HEAD\n\n0 TRLR", "junk\n0 TRLR"] {
            assert_eq!(split_top_level(text).join("\n"), text);
        }
    }

    #[test]
    fn test_split_empty_input() {
        assert!(split_top_level("").is_empty());
        assert!(split_substructures("", 1).is_empty());
    }

    #[test]
    fn test_split_substructures_discards_parent() {
        let record = "0 @I1@ INDI\n1 NAME John\n2 GIVN John\n1 SEX M\n";
        let subs = split_substructures(record, 1);
        assert_eq!(subs, vec!["1 NAME John\n2 GIVN John", "1 SEX M\n"]);
        let subs = split_substructures(subs[0], 2);
        assert_eq!(subs, vec!["2 GIVN John"]);
    }

    #[test]
    fn test_split_uses_exact_level() {
        let record = "0 @N1@ NOTE\n1 CONT a\n10 ODD b\n1 CONT c";
        let subs = split_substructures(record, 1);
        assert_eq!(subs, vec!["1 CONT a\n10 ODD b", "1 CONT c"]);
    }

    #[test]
    fn test_line_level() {
        assert_eq!(line_level("12 TAG"), Some(12));
        assert_eq!(line_level("0"), Some(0));
        assert_eq!(line_level("TAG"), None);
    }
}
