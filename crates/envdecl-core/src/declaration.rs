//! Declaration line parsing
//!
//! One line of a declaration file is one of:
//! - `NAME=VALUE` - assign
//! - `NAME:=VALUE` - prefix VALUE onto the current value
//! - `NAME=:VALUE` - suffix VALUE onto the current value
//! - `# comment` - full-line comment
//! - blank
//!
//! Anything after the first `#` on a line is a trailing comment. Lines with
//! no operator are ignored rather than rejected.

use serde::Serialize;
use std::fmt;

/// How a declaration combines with the variable's current value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    /// `NAME=VALUE`
    Assign,
    /// `NAME:=VALUE`
    Prefix,
    /// `NAME=:VALUE`
    Suffix,
}

/// Operators in detection order; first match wins
const DETECTION_ORDER: [Operator; 3] = [Operator::Prefix, Operator::Suffix, Operator::Assign];

impl Operator {
    /// The literal token that introduces this operator
    pub fn token(self) -> &'static str {
        match self {
            Operator::Assign => "=",
            Operator::Prefix => ":=",
            Operator::Suffix => "=:",
        }
    }

    /// Combine a resolved value with the variable's previous value
    ///
    /// An unset previous value counts as the empty string.
    pub fn compose(self, resolved: &str, previous: Option<&str>, separator: &str) -> String {
        let previous = previous.unwrap_or_default();
        match self {
            Operator::Assign => resolved.to_string(),
            Operator::Prefix => format!("{}{}{}", resolved, separator, previous),
            Operator::Suffix => format!("{}{}{}", previous, separator, resolved),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operator::Assign => "assign",
            Operator::Prefix => "prefix",
            Operator::Suffix => "suffix",
        };
        f.write_str(name)
    }
}

/// A declaration split out of one line, before resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub key: String,
    pub operator: Operator,
    /// Value text with surrounding whitespace trimmed, placeholders intact
    pub raw_value: String,
}

/// What a single line turned out to be
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    Blank,
    Comment,
    /// Non-comment text with no operator
    Unrecognized(String),
    Declaration(Declaration),
}

/// Classify one raw line
pub fn classify(line: &str) -> Line {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Line::Blank;
    }
    if trimmed.starts_with('#') {
        return Line::Comment;
    }

    let text = strip_trailing_comment(trimmed);

    for operator in DETECTION_ORDER {
        if let Some((key, value)) = text.split_once(operator.token()) {
            return Line::Declaration(Declaration {
                key: key.trim().to_string(),
                operator,
                raw_value: value.trim().to_string(),
            });
        }
    }

    Line::Unrecognized(text.to_string())
}

/// Parse one raw line, returning `None` for anything that is not a declaration
pub fn parse_line(line: &str) -> Option<Declaration> {
    match classify(line) {
        Line::Declaration(decl) => Some(decl),
        _ => None,
    }
}

/// Cut a line at its first `#` and drop the whitespace before it
fn strip_trailing_comment(line: &str) -> &str {
    match line.find('#') {
        Some(pos) => line[..pos].trim_end(),
        None => line,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn decl(key: &str, operator: Operator, raw_value: &str) -> Declaration {
        Declaration {
            key: key.into(),
            operator,
            raw_value: raw_value.into(),
        }
    }

    #[test]
    fn test_classify_blank_and_comment() {
        assert_eq!(classify(""), Line::Blank);
        assert_eq!(classify("   \t "), Line::Blank);
        assert_eq!(classify("# a comment"), Line::Comment);
        assert_eq!(classify("    # indented comment"), Line::Comment);
        assert_eq!(classify("#KEY=value"), Line::Comment);
    }

    #[test]
    fn test_parse_assign() {
        assert_eq!(
            parse_line("KEY=value"),
            Some(decl("KEY", Operator::Assign, "value"))
        );
    }

    #[test]
    fn test_parse_trims_around_split_only() {
        assert_eq!(
            parse_line("  KEY =  hello   world  "),
            Some(decl("KEY", Operator::Assign, "hello   world"))
        );
    }

    #[test]
    fn test_parse_prefix_and_suffix() {
        assert_eq!(
            parse_line("PATH:=/opt/bin"),
            Some(decl("PATH", Operator::Prefix, "/opt/bin"))
        );
        assert_eq!(
            parse_line("PATH=:/opt/bin"),
            Some(decl("PATH", Operator::Suffix, "/opt/bin"))
        );
    }

    #[test]
    fn test_parse_splits_on_first_occurrence() {
        assert_eq!(
            parse_line("URL=http://host/?a=b"),
            Some(decl("URL", Operator::Assign, "http://host/?a=b"))
        );
        assert_eq!(
            parse_line("LIST:=a:=b"),
            Some(decl("LIST", Operator::Prefix, "a:=b"))
        );
    }

    #[test]
    fn test_parse_prefix_wins_over_assign() {
        // `:=` is checked before `=`, wherever it sits in the line
        assert_eq!(
            parse_line("A=b:=c"),
            Some(decl("A=b", Operator::Prefix, "c"))
        );
    }

    #[test]
    fn test_parse_suffix_wins_over_assign() {
        assert_eq!(
            parse_line("A=x=:y"),
            Some(decl("A=x", Operator::Suffix, "y"))
        );
    }

    #[test]
    fn test_parse_strips_trailing_comment() {
        assert_eq!(
            parse_line("KEY=value # note"),
            Some(decl("KEY", Operator::Assign, "value"))
        );
        assert_eq!(
            parse_line("KEY=value\t\t#note"),
            Some(decl("KEY", Operator::Assign, "value"))
        );
    }

    #[test]
    fn test_parse_comment_hides_operator() {
        assert_eq!(
            classify("justtext # KEY=value"),
            Line::Unrecognized("justtext".into())
        );
    }

    #[test]
    fn test_parse_empty_value() {
        assert_eq!(parse_line("KEY="), Some(decl("KEY", Operator::Assign, "")));
        assert_eq!(
            parse_line("KEY=   # nothing"),
            Some(decl("KEY", Operator::Assign, ""))
        );
    }

    #[test]
    fn test_parse_keeps_placeholders_raw() {
        assert_eq!(
            parse_line("B=${A}_world"),
            Some(decl("B", Operator::Assign, "${A}_world"))
        );
    }

    #[test]
    fn test_unrecognized_line() {
        assert_eq!(classify("justtext"), Line::Unrecognized("justtext".into()));
        assert_eq!(parse_line("justtext"), None);
        assert_eq!(parse_line("KEY: value"), None);
    }

    #[test]
    fn test_compose() {
        assert_eq!(Operator::Assign.compose("A", Some("B"), ";"), "A");
        assert_eq!(Operator::Prefix.compose("A", Some("B"), ";"), "A;B");
        assert_eq!(Operator::Suffix.compose("A", Some("B"), ";"), "B;A");
    }

    #[test]
    fn test_compose_unset_previous_is_empty() {
        assert_eq!(Operator::Prefix.compose("A", None, ";"), "A;");
        assert_eq!(Operator::Suffix.compose("A", None, ":"), ":A");
    }

    #[test]
    fn test_operator_display_and_token() {
        assert_eq!(Operator::Prefix.to_string(), "prefix");
        assert_eq!(Operator::Suffix.token(), "=:");
    }
}
