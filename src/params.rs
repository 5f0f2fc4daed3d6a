//! Parameter bag handed from the host to filters and hooks.
//!
//! Typical keys are `tree` and `base_url`. Replacement text in filter rules
//! can refer to a parameter as `%KEY%` with the key in upper case, e.g.
//! `%TREE%` or `%BASE_URL%`.

use std::collections::BTreeMap;

pub const TREE: &str = "tree";
pub const BASE_URL: &str = "base_url";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterParams {
    values: BTreeMap<String, String>,
}

impl FilterParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: &str, value: &str) {
        self.values.insert(key.to_string(), value.to_string());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn tree(&self) -> Option<&str> {
        self.get(TREE)
    }

    pub fn base_url(&self) -> Option<&str> {
        self.get(BASE_URL)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Parse a `key=value` assignment as given on the command line.
    pub fn parse_assignment(text: &str) -> Result<(String, String), String> {
        let (key, value) = text
            .split_once('=')
            .ok_or_else(|| format!("expected key=value, got '{text}'"))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(format!("empty parameter name in '{text}'"));
        }
        Ok((key.to_string(), value.to_string()))
    }

    /// Substitute `%KEY%` placeholders in regex replacement text.
    ///
    /// Values are inserted literally: a `$` in a value is escaped so it is
    /// not read as a group reference. Unknown placeholders are left as is.
    pub fn interpolate(&self, replacement: &str) -> String {
        let mut out = replacement.to_string();
        for (key, value) in &self.values {
            let placeholder = format!("%{}%", key.to_uppercase());
            if out.contains(&placeholder) {
                out = out.replace(&placeholder, &value.replace('$', "$$"));
            }
        }
        out
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FilterParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        FilterParams {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interpolate_known_keys() {
        let params = FilterParams::new()
            .with(TREE, "family")
            .with(BASE_URL, "https://example.org");
        assert_eq!(
            params.interpolate("%BASE_URL%/tree/%TREE%/individual/$1"),
            "https://example.org/tree/family/individual/$1"
        );
    }

    #[test]
    fn test_interpolate_escapes_dollar() {
        let params = FilterParams::new().with(TREE, "cost$1");
        assert_eq!(params.interpolate("%TREE%"), "cost$$1");
    }

    #[test]
    fn test_interpolate_leaves_unknown_placeholders() {
        let params = FilterParams::new();
        assert_eq!(params.interpolate("%TREE%"), "%TREE%");
    }

    #[test]
    fn test_parse_assignment() {
        assert_eq!(
            FilterParams::parse_assignment("tree=main=1").unwrap(),
            ("tree".to_string(), "main=1".to_string())
        );
        assert!(FilterParams::parse_assignment("tree").is_err());
        assert!(FilterParams::parse_assignment("=x").is_err());
    }

    #[test]
    fn test_from_iterator() {
        let params: FilterParams = [("tree", "t1")].into_iter().collect();
        assert_eq!(params.tree(), Some("t1"));
        assert_eq!(params.base_url(), None);
    }
}
