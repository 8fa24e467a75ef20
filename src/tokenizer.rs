//! Token stream over a single expression.
//!
//! Tokens are spellings, not typed values; classification happens in the
//! parser. The tokenizer knows three things beyond splitting on operator
//! characters: quoted strings with backslash escapes, the two-character
//! operator lookahead, and the prefix rule that keeps `ns:fun` together when
//! `ns` names a registered tag library prefix.

use std::collections::HashSet;

use crate::error::CompileError;
use crate::operators::{is_operator_char, OPERATOR_TABLE};

pub struct Tokenizer<'a> {
    chars: Vec<char>,
    index: usize,
    prefixes: &'a HashSet<String>,
    source: &'a str,
}

impl<'a> Tokenizer<'a> {
    pub fn new(source: &'a str, prefixes: &'a HashSet<String>) -> Self {
        Tokenizer {
            chars: source.chars().collect(),
            index: 0,
            prefixes,
            source,
        }
    }

    /// Next token, `None` at end of input.
    pub fn next_token(&mut self) -> Result<Option<String>, CompileError> {
        while self.index < self.chars.len() && self.chars[self.index].is_whitespace() {
            self.index += 1;
        }
        if self.index >= self.chars.len() {
            return Ok(None);
        }
        let ch = self.chars[self.index];
        if ch == '"' || ch == '\'' {
            return self.read_string(ch).map(Some);
        }
        if is_operator_char(ch) {
            // Prefer a two-character operator when the table knows one.
            if self.index + 1 < self.chars.len() {
                let next = self.chars[self.index + 1];
                if is_operator_char(next) && !next.is_whitespace() {
                    let two: String = [ch, next].iter().collect();
                    if OPERATOR_TABLE.contains_key(two.as_str()) {
                        self.index += 2;
                        return Ok(Some(two));
                    }
                }
            }
            self.index += 1;
            return Ok(Some(ch.to_string()));
        }
        Ok(Some(self.read_run()))
    }

    /// Quoted literal, kept with its quotes so the parser can tell strings
    /// from identifiers. Backslash escapes the next character.
    fn read_string(&mut self, quote: char) -> Result<String, CompileError> {
        self.index += 1;
        let mut out = String::from(quote);
        while self.index < self.chars.len() {
            let ch = self.chars[self.index];
            self.index += 1;
            if ch == '\\' && self.index < self.chars.len() {
                out.push(self.chars[self.index]);
                self.index += 1;
                continue;
            }
            out.push(ch);
            if ch == quote {
                return Ok(out);
            }
        }
        Err(CompileError::lexical("unterminated string literal").with_source(self.source))
    }

    /// Identifier, number or dotted member run. A `.` splits the run unless
    /// it started with a digit (numeric literal) or is the leading character
    /// (member token). A `:` keeps the run together when the text so far is
    /// a registered tag library prefix.
    fn read_run(&mut self) -> String {
        let start = self.index;
        let numeric = self.chars[start].is_ascii_digit();
        let mut i = start;
        while i < self.chars.len() {
            let ch = self.chars[i];
            let splits = (is_operator_char(ch) || (ch == '.' && !numeric && i != start))
                && !(ch == ':' && self.is_prefix(start, i));
            if splits {
                break;
            }
            i += 1;
        }
        self.index = i;
        self.chars[start..i].iter().collect()
    }

    fn is_prefix(&self, start: usize, end: usize) -> bool {
        let candidate: String = self.chars[start..end].iter().collect();
        self.prefixes.contains(&candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(source: &str) -> Vec<String> {
        tokens_with(source, &HashSet::new())
    }

    fn tokens_with(source: &str, prefixes: &HashSet<String>) -> Vec<String> {
        let mut t = Tokenizer::new(source, prefixes);
        let mut out = Vec::new();
        while let Some(tok) = t.next_token().unwrap() {
            out.push(tok);
        }
        out
    }

    #[test]
    fn test_member_access_splits_on_dot() {
        assert_eq!(tokens("item.checked"), vec!["item", ".checked"]);
        assert_eq!(tokens("a.b.c"), vec!["a", ".b", ".c"]);
    }

    #[test]
    fn test_numeric_literal_keeps_its_dot() {
        assert_eq!(tokens("3.14 + x"), vec!["3.14", "+", "x"]);
        assert_eq!(tokens("10l"), vec!["10l"]);
    }

    #[test]
    fn test_two_char_operators_win_over_single() {
        assert_eq!(tokens("a <= b"), vec!["a", "<=", "b"]);
        assert_eq!(tokens("a<b"), vec!["a", "<", "b"]);
        assert_eq!(tokens("a&&b"), vec!["a", "&&", "b"]);
    }

    #[test]
    fn test_quoted_string_with_escape() {
        assert_eq!(tokens("'it\\'s'"), vec!["'it's'"]);
        assert_eq!(tokens("\"a b\""), vec!["\"a b\""]);
    }

    #[test]
    fn test_unterminated_string_is_fatal() {
        let prefixes = HashSet::new();
        let mut t = Tokenizer::new("'abc", &prefixes);
        assert!(t.next_token().is_err());
    }

    #[test]
    fn test_registered_prefix_keeps_colon_run() {
        let mut prefixes = HashSet::new();
        prefixes.insert("fn".to_string());
        assert_eq!(
            tokens_with("fn:length(x)", &prefixes),
            vec!["fn:length", "(", "x", ")"]
        );
        // Without the prefix, the colon is a plain operator.
        assert_eq!(tokens("fn:length"), vec!["fn", ":", "length"]);
    }

    #[test]
    fn test_word_operators_tokenize_as_runs() {
        assert_eq!(tokens("not redirect"), vec!["not", "redirect"]);
        assert_eq!(tokens("a eq b"), vec!["a", "eq", "b"]);
    }
}
