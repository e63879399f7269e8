//! Lexical constants, comparison operators and generic function detection.

use std::ops::Range;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Reserved characters of the template language.
pub struct Syntax;

impl Syntax {
    /// Starts a function tag
    pub const OPEN: char = '$';
    /// Negation marker after `$`
    pub const NEGATION: char = '!';
    /// Silent marker after the optional negation
    pub const SILENT: char = '#';
    /// Opens an argument list
    pub const ARGS_OPEN: char = '[';
    /// Closes an argument list
    pub const ARGS_CLOSE: char = ']';
    /// Separates arguments
    pub const SEPARATOR: char = ';';
    /// Escapes the next character
    pub const ESCAPE: char = '\\';
}

/// Anything that looks like a function tag, registered or not.
static FUNCTION_SYNTAX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$[a-zA-Z_][a-zA-Z0-9_]*(?:\[[^\]]*\])?").expect("valid function syntax regex")
});

/// Whether `text` contains something shaped like `$name` or `$name[...]`.
pub fn contains_function_syntax(text: &str) -> bool {
    FUNCTION_SYNTAX.is_match(text)
}

/// Byte ranges of every function-shaped tag in `text`.
pub fn function_syntax_spans(text: &str) -> impl Iterator<Item = Range<usize>> + '_ {
    FUNCTION_SYNTAX.find_iter(text).map(|found| found.range())
}

/// Comparison operator of a condition field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<=`
    Le,
    /// `>=`
    Ge,
    /// `>`
    Gt,
    /// `<`
    Lt,
    /// No comparison token; the left side is tested against `"true"`
    Unknown,
}

const TWO_CHAR: [(&str, Operator); 4] = [
    ("==", Operator::Eq),
    ("!=", Operator::Ne),
    ("<=", Operator::Le),
    (">=", Operator::Ge),
];

const ONE_CHAR: [(char, Operator); 2] = [('>', Operator::Gt), ('<', Operator::Lt)];

impl Operator {
    /// Operator starting at the head of `input`, two-char tokens first.
    pub fn scan(input: &[char]) -> Option<Operator> {
        if let [first, second, ..] = input {
            for (token, op) in TWO_CHAR {
                let mut chars = token.chars();
                if chars.next() == Some(*first) && chars.next() == Some(*second) {
                    return Some(op);
                }
            }
        }
        let first = input.first()?;
        ONE_CHAR
            .iter()
            .find(|(token, _)| token == first)
            .map(|(_, op)| *op)
    }

    /// Source token.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "==",
            Operator::Ne => "!=",
            Operator::Le => "<=",
            Operator::Ge => ">=",
            Operator::Gt => ">",
            Operator::Lt => "<",
            Operator::Unknown => "",
        }
    }

    /// Length of the source token in characters.
    pub fn width(&self) -> usize {
        self.as_str().chars().count()
    }

    /// Evaluate against resolved operands.
    ///
    /// Equality compares text; ordering compares the operands as numbers, so
    /// non-numeric operands never order.
    pub fn evaluate(&self, lhs: &str, rhs: Option<&str>) -> bool {
        let rhs = rhs.unwrap_or_default();
        match self {
            Operator::Unknown => lhs == "true",
            Operator::Eq => lhs == rhs,
            Operator::Ne => lhs != rhs,
            Operator::Le => compare(lhs, rhs, |a, b| a <= b),
            Operator::Ge => compare(lhs, rhs, |a, b| a >= b),
            Operator::Gt => compare(lhs, rhs, |a, b| a > b),
            Operator::Lt => compare(lhs, rhs, |a, b| a < b),
        }
    }
}

fn compare(lhs: &str, rhs: &str, predicate: impl Fn(f64, f64) -> bool) -> bool {
    match (to_number(lhs), to_number(rhs)) {
        (Some(a), Some(b)) => predicate(a, b),
        _ => false,
    }
}

// Blank operands count as zero.
fn to_number(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Some(0.0);
    }
    trimmed.parse::<f64>().ok().filter(|n| !n.is_nan())
}
