//! Rule file parser.
//!
//! A rule file defines one filter, one statement per line:
//!
//! ```text
//! # Reduce all dates to years, drop change data
//! FILTER ReduceDates
//! OPTION REFERENCES WRAP_CONC
//! AFTER RemoveEmptyRecords
//! MACRO DateToYear
//! | CHANGE /(\d) DATE .*(\d{4})/ /$1 DATE $2/
//! RULE INDI:*:DATE
//! | MACRO DateToYear
//! RULE !*:CHAN
//! RULE !*:CHAN:*
//! RULE *
//! ```
//!
//! Lines starting with `|` continue the preceding `RULE` or `MACRO`. The
//! first non-blank character after `CHANGE` delimits both strings, so
//! `CHANGE #a/b#c/d#` works as well. In replacement text `\n` and `\t`
//! stand for newline and tab; search text is passed to the regex engine
//! as written.

use std::fs;
use std::path::Path;

use crate::error::{self, FilterError};
use crate::filter::RuleFileFilter;
use crate::rules::{ReplacePair, RuleOp};

/// One parsed line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    Filter(String),
    Options(Vec<FilterOption>),
    Before(String),
    After(String),
    Macro(String),
    Rule(String),
    Change(ReplacePair),
    UseMacro(String),
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOption {
    References,
    NoSchema,
    WrapConc,
}

/// The block `|` lines attach to.
enum Block {
    None,
    Rule(String),
    Macro(String),
}

/// Parse rule file text into a filter definition.
pub fn parse_rule_file(text: &str) -> error::Result<RuleFileFilter> {
    let mut filter = RuleFileFilter::new("", Default::default());
    let mut named = false;
    let mut block = Block::None;
    let mut last_line = 0;

    for (line_num, line) in text.lines().enumerate() {
        let line_no = line_num + 1;
        last_line = line_no;
        let line = line.trim();

        // Skip empty lines and comments
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let err = |message: String| FilterError::RuleFile {
            line: line_no,
            message,
        };

        // Continuation lines: "| CHANGE ..."
        let (continuation, line) = match line.strip_prefix('|') {
            Some(stripped) => (true, stripped.trim()),
            None => (false, line),
        };
        if line.is_empty() {
            continue;
        }

        let statement = parse_statement(line, continuation).map_err(&err)?;
        match statement {
            Statement::Filter(name) => {
                if named {
                    return Err(err("FILTER may only be given once".to_string()));
                }
                filter.name = name;
                named = true;
                block = Block::None;
            }
            Statement::Options(options) => {
                for option in options {
                    match option {
                        FilterOption::References => filter.uses_reference_analysis = true,
                        FilterOption::NoSchema => filter.uses_schema_tag_analysis = false,
                        FilterOption::WrapConc => filter.wrap_conc_without_spaces = true,
                    }
                }
                block = Block::None;
            }
            Statement::Before(name) => {
                filter.included_before.push(name);
                block = Block::None;
            }
            Statement::After(name) => {
                filter.included_after.push(name);
                block = Block::None;
            }
            Statement::Macro(name) => {
                if filter.macros.contains_key(&name) {
                    return Err(err(format!("macro {name} is defined twice")));
                }
                filter.macros.insert(name.clone(), Vec::new());
                block = Block::Macro(name);
            }
            Statement::Rule(pattern) => {
                if filter.rules.get(&pattern).is_some() {
                    return Err(err(format!("rule {pattern} is defined twice")));
                }
                filter.rules.insert(&pattern, Vec::new());
                block = Block::Rule(pattern);
            }
            op => attach(&mut filter, &block, op).map_err(&err)?,
        }
    }

    if !named {
        return Err(FilterError::RuleFile {
            line: last_line.max(1),
            message: "missing FILTER statement".to_string(),
        });
    }
    Ok(filter)
}

/// Read and parse a rule file.
pub fn load_rule_file(path: &Path) -> error::Result<RuleFileFilter> {
    let text = fs::read_to_string(path).map_err(|source| FilterError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_rule_file(&text)
}

/// Add an operation to the open rule or macro.
fn attach(filter: &mut RuleFileFilter, block: &Block, op: Statement) -> Result<(), String> {
    match block {
        Block::None => Err("operation outside of a RULE or MACRO block".to_string()),
        Block::Macro(name) => {
            let Statement::Change(pair) = op else {
                return Err(format!("macro {name} may only contain CHANGE operations"));
            };
            filter
                .macros
                .get_mut(name)
                .ok_or_else(|| format!("macro {name} is not open"))?
                .push(pair);
            Ok(())
        }
        Block::Rule(pattern) => {
            let op = match op {
                Statement::Change(pair) => RuleOp::Replace(pair),
                Statement::UseMacro(name) => RuleOp::Macro(name),
                Statement::Custom => {
                    return Err(
                        "CUSTOM is not available in rule files, they have no conversion hook"
                            .to_string(),
                    );
                }
                _ => return Err("unexpected statement".to_string()),
            };
            let mut ops = filter
                .rules
                .get(pattern)
                .map(|rule| rule.ops.clone())
                .unwrap_or_default();
            ops.push(op);
            filter.rules.insert(pattern, ops);
            Ok(())
        }
    }
}

/// Parse a single statement.
fn parse_statement(line: &str, continuation: bool) -> Result<Statement, String> {
    let (keyword, rest) = match line.split_once(char::is_whitespace) {
        Some((keyword, rest)) => (keyword, rest.trim()),
        None => (line, ""),
    };
    let keyword = keyword.to_uppercase();

    if continuation {
        return match keyword.as_str() {
            "CHANGE" => parse_change(rest),
            "MACRO" => Ok(Statement::UseMacro(parse_name("MACRO", rest)?)),
            "CUSTOM" => Ok(Statement::Custom),
            _ => Err(format!("Unknown operation: {keyword}")),
        };
    }

    match keyword.as_str() {
        "FILTER" => Ok(Statement::Filter(parse_name("FILTER", rest)?)),
        "OPTION" => parse_options(rest),
        "BEFORE" => Ok(Statement::Before(parse_name("BEFORE", rest)?)),
        "AFTER" => Ok(Statement::After(parse_name("AFTER", rest)?)),
        "MACRO" => Ok(Statement::Macro(parse_name("MACRO", rest)?)),
        "RULE" => Ok(Statement::Rule(parse_name("RULE", rest)?)),
        "CHANGE" | "CUSTOM" => Err(format!("{keyword} must follow a RULE or MACRO line as '| {keyword}'")),
        _ => Err(format!("Unknown command: {keyword}")),
    }
}

/// A single word argument.
fn parse_name(keyword: &str, rest: &str) -> Result<String, String> {
    let mut words = rest.split_whitespace();
    let name = words
        .next()
        .ok_or_else(|| format!("{keyword} requires an argument"))?;
    if words.next().is_some() {
        return Err(format!("{keyword} takes a single argument"));
    }
    Ok(name.to_string())
}

/// Options are separated by blanks or `|`.
fn parse_options(rest: &str) -> Result<Statement, String> {
    let options = rest
        .split(|c: char| c.is_whitespace() || c == '|')
        .filter(|word| !word.is_empty())
        .map(|word| match word.to_uppercase().as_str() {
            "REFERENCES" => Ok(FilterOption::References),
            "NO_SCHEMA" => Ok(FilterOption::NoSchema),
            "WRAP_CONC" => Ok(FilterOption::WrapConc),
            other => Err(format!("Unknown option: {other}")),
        })
        .collect::<Result<Vec<_>, _>>()?;
    if options.is_empty() {
        return Err("OPTION requires at least one option".to_string());
    }
    Ok(Statement::Options(options))
}

/// Parse CHANGE operation.
/// Both strings use the same delimiter: CHANGE /old/ /new/ or CHANGE #old# #new#
fn parse_change(rest: &str) -> Result<Statement, String> {
    if rest.is_empty() {
        return Err("CHANGE requires two delimited strings".to_string());
    }

    let (search, after_first) = parse_delimited_string(rest, None)?;
    let delim = rest.chars().next().unwrap_or('/');
    let (replace, trailing) = parse_delimited_string(after_first, Some(delim))?;
    if !trailing.trim().is_empty() {
        return Err(format!("Unexpected text after CHANGE: {}", trailing.trim()));
    }

    Ok(Statement::Change(ReplacePair {
        search,
        replace: unescape(&replace),
    }))
}

/// Extract a delimited string.
///
/// The first non-blank character is the delimiter, and the string
/// continues until the next occurrence of that delimiter.
/// Returns (extracted_string, rest_of_input).
fn parse_delimited_string(s: &str, expected: Option<char>) -> Result<(String, &str), String> {
    let s = s.trim_start();
    let Some(delim) = s.chars().next() else {
        return Err("Expected delimited string".to_string());
    };
    if let Some(expected) = expected
        && delim != expected
    {
        return Err(format!(
            "Both CHANGE strings must use the delimiter '{expected}', found '{delim}'"
        ));
    }
    let after_delim = &s[delim.len_utf8()..];

    if let Some(end) = after_delim.find(delim) {
        let extracted = after_delim[..end].to_string();
        let rest = &after_delim[end + delim.len_utf8()..];
        Ok((extracted, rest))
    } else {
        Err(format!("Unclosed delimiter '{}'", delim))
    }
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}
