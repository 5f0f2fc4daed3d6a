//! Tag-path patterns and first-match resolution.
//!
//! A tag-path is the colon-joined list of tags from a record's level-0 tag
//! down to a node, e.g. `FAM:MARR:DATE`. Patterns use the same shape with
//! `*` standing for any single tag; a trailing `*` also stands for any
//! number of further tags. A leading `!` marks a blacklist entry.
//!
//! ```text
//! INDI:*:DATE   matches INDI:BIRT:DATE, not INDI:BIRT:DATE:TIME
//! INDI:*        matches INDI:NAME and INDI:BIRT:DATE, not INDI
//! *             matches everything
//! ```

use std::cmp::Ordering;
use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

pub const WILDCARD: &str = "*";
pub const BLACKLIST_PREFIX: char = '!';

static PATTERN_GRAMMAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^!?([_A-Z0-9]+|\*)(:([_A-Z0-9]+|\*))*$").expect("pattern grammar regex")
});

/// A rule pattern as written in a rule set.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TagPattern {
    raw: String,
    blacklist: bool,
}

impl TagPattern {
    pub fn new(raw: &str) -> Self {
        TagPattern {
            raw: raw.to_string(),
            blacklist: raw.starts_with(BLACKLIST_PREFIX),
        }
    }

    /// The pattern exactly as written, including any `!`.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The pattern without its blacklist marker.
    pub fn body(&self) -> &str {
        self.raw
            .strip_prefix(BLACKLIST_PREFIX)
            .unwrap_or(&self.raw)
    }

    pub fn is_blacklist(&self) -> bool {
        self.blacklist
    }

    pub fn token_count(&self) -> usize {
        tokenize(self.body()).len()
    }

    /// Whether the pattern consists only of tags and `*` joined by `:`.
    pub fn is_well_formed(&self) -> bool {
        PATTERN_GRAMMAR.is_match(&self.raw)
    }

    pub fn matches(&self, tag_path: &str) -> bool {
        match_single(tag_path, self.body())
    }
}

impl std::fmt::Display for TagPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Split a tag-path or pattern into its tags.
pub fn tokenize(path: &str) -> Vec<&str> {
    path.split(':').filter(|t| !t.is_empty()).collect()
}

/// Match a tag-path (e.g. `FAM:MARR:DATE`) against one pattern (e.g.
/// `FAM:*:DATE`).
///
/// If one side is shorter and ends in `*`, only its fixed prefix is
/// compared. Otherwise both sides need the same number of tags. A `*` in
/// the pattern matches any single tag.
pub fn match_single(tag_path: &str, pattern: &str) -> bool {
    let tags = tokenize(tag_path);
    let patterns = tokenize(pattern);

    if tags.is_empty() || patterns.is_empty() {
        return false;
    }

    let compared = match tags.len().cmp(&patterns.len()) {
        Ordering::Less => {
            if tags.last() != Some(&WILDCARD) {
                return false;
            }
            tags.len() - 1
        }
        Ordering::Greater => {
            if patterns.last() != Some(&WILDCARD) {
                return false;
            }
            patterns.len() - 1
        }
        Ordering::Equal => tags.len(),
    };

    tags.iter()
        .zip(&patterns)
        .take(compared)
        .all(|(tag, pattern)| *pattern == WILDCARD || tag == pattern)
}

/// Find the first pattern matching `tag_path`.
///
/// Returns the index of the winning pattern, or `None` if nothing matched
/// or the first match was a blacklist entry.
pub fn first_match(tag_path: &str, patterns: &[TagPattern]) -> Option<usize> {
    let (idx, pattern) = patterns
        .iter()
        .enumerate()
        .find(|(_, pattern)| pattern.matches(tag_path))?;
    if pattern.is_blacklist() {
        None
    } else {
        Some(idx)
    }
}

/// Memoized [`first_match`] results keyed by tag-path.
///
/// The same tag-paths recur in nearly every record, so one cache lives for
/// the duration of one filter application and is cleared before the next.
#[derive(Debug, Default)]
pub struct PatternCache {
    matched: HashMap<String, Option<usize>>,
}

impl PatternCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve(&mut self, tag_path: &str, patterns: &[TagPattern]) -> Option<usize> {
        if let Some(hit) = self.matched.get(tag_path) {
            return *hit;
        }
        let matched = first_match(tag_path, patterns);
        self.matched.insert(tag_path.to_string(), matched);
        matched
    }

    pub fn clear(&mut self) {
        self.matched.clear();
    }

    pub fn len(&self) -> usize {
        self.matched.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matched.is_empty()
    }

    /// All tag-paths seen so far with the index of their matched pattern.
    pub fn entries(&self) -> impl Iterator<Item = (&str, Option<usize>)> {
        self.matched.iter().map(|(path, idx)| (path.as_str(), *idx))
    }
}
