//! Character-level document scanner.
//!
//! The scanner is a five-state machine fed one character at a time. Literal
//! text accumulates in the context buffer, `<...>` elements are matched
//! against the tag builder registry (unknown ones replay as plain text),
//! `<!-- -->` comments vanish unless they carry a variable directive, and
//! `${...}` segments compile into write statements.

use std::collections::HashMap;

use lazy_static::lazy_static;
use regex::Regex;

use crate::context::BuildContext;
use crate::error::CompileError;
use crate::scope::{StorageClass, Variable};
use crate::types::{Expression, ValueType};

lazy_static! {
    /// `var <name> = <type> as <STORAGE>` inside a comment.
    static ref VAR_DIRECTIVE_RX: Regex =
        Regex::new(r"^var\s+(\w+)\s*=\s*(.+?)\s+as\s+([A-Z_]+)$").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Default,
    TagOpen,
    Comment,
    ExprStart,
    Expr,
}

pub struct Scanner {
    state: State,
    tmp: String,
    tmp_blank: bool,
    expr: String,
}

impl Default for Scanner {
    fn default() -> Self {
        Scanner::new()
    }
}

impl Scanner {
    pub fn new() -> Self {
        Scanner {
            state: State::Default,
            tmp: String::new(),
            tmp_blank: false,
            expr: String::new(),
        }
    }

    /// Feed one character.
    pub fn write(&mut self, ch: char, ctx: &mut BuildContext) -> Result<(), CompileError> {
        if ch == '\r' {
            return Ok(());
        }
        match self.state {
            State::Default => match ch {
                '<' => {
                    self.state = State::TagOpen;
                    self.tmp.clear();
                    self.tmp_blank = false;
                }
                '$' => self.state = State::ExprStart,
                _ => ctx.append_literal(ch),
            },
            State::TagOpen => match ch {
                '>' => self.finish_tag(ctx)?,
                '<' => {
                    // Premature open: what was collected is plain text.
                    let text = std::mem::take(&mut self.tmp);
                    self.state = State::Default;
                    ctx.append_literal_raw('<');
                    for c in text.chars() {
                        self.write(c, ctx)?;
                    }
                    self.write('<', ctx)?;
                }
                '-' if self.tmp == "!-" => {
                    self.tmp.push('-');
                    self.state = State::Comment;
                }
                _ => self.append_tmp(ch),
            },
            State::Comment => {
                if ch == '>' && self.tmp.len() >= 5 && self.tmp.ends_with("--") {
                    let body = self.tmp[3..self.tmp.len() - 2].trim().to_string();
                    self.tmp.clear();
                    self.state = State::Default;
                    self.process_comment(&body, ctx)?;
                } else {
                    self.append_tmp(ch);
                }
            }
            State::ExprStart => {
                if ch == '{' {
                    self.state = State::Expr;
                    self.expr.clear();
                } else {
                    self.state = State::Default;
                    ctx.append_literal('$');
                    self.write(ch, ctx)?;
                }
            }
            State::Expr => {
                if ch == '}' {
                    let text = std::mem::take(&mut self.expr);
                    self.state = State::Default;
                    let expr = ctx.build_el(&text)?;
                    ctx.flush_literal();
                    emit_expression(&expr, ctx);
                } else {
                    self.expr.push(ch);
                }
            }
        }
        Ok(())
    }

    /// End of document. Everything must have closed back to literal text;
    /// a lone pending `$` is demoted to literal.
    pub fn finish(&mut self, ctx: &mut BuildContext) -> Result<(), CompileError> {
        match self.state {
            State::Default => Ok(()),
            State::ExprStart => {
                ctx.append_literal('$');
                self.state = State::Default;
                Ok(())
            }
            State::TagOpen => Err(CompileError::lexical("unterminated tag")),
            State::Comment => Err(CompileError::lexical("unterminated comment")),
            State::Expr => Err(CompileError::lexical("unterminated expression")),
        }
    }

    /// Element text with collapsed whitespace, like the literal buffer.
    fn append_tmp(&mut self, ch: char) {
        if ch.is_whitespace() {
            if !self.tmp_blank {
                self.tmp.push(' ');
            }
            self.tmp_blank = true;
        } else {
            self.tmp.push(ch);
            self.tmp_blank = false;
        }
    }

    fn finish_tag(&mut self, ctx: &mut BuildContext) -> Result<(), CompileError> {
        let element = std::mem::take(&mut self.tmp).trim_end().to_string();
        self.state = State::Default;
        let standalone = element.ends_with('/');
        let path = tag_path(&element).to_string();
        if let Some(builder) = ctx.builder_for(&path) {
            ctx.flush_literal();
            let attrs = parse_attributes(&element);
            builder.build(&element, &attrs, ctx, standalone)?;
            // A static include queues its text for replay through this
            // scanner, nested includes included.
            if let Some(text) = ctx.take_pending_include() {
                for c in text.chars() {
                    self.write(c, ctx)?;
                }
            }
            return Ok(());
        }
        // Unknown element: replay as plain text, expressions still live.
        ctx.append_literal_raw('<');
        for c in element.chars() {
            self.write(c, ctx)?;
        }
        ctx.append_literal_raw('>');
        Ok(())
    }

    fn process_comment(&self, body: &str, ctx: &mut BuildContext) -> Result<(), CompileError> {
        let Some(caps) = VAR_DIRECTIVE_RX.captures(body) else {
            return Ok(());
        };
        let name = &caps[1];
        let ty = ValueType::parse(&caps[2]).map_err(|e| e.with_source(body))?;
        let (storage, eager) = StorageClass::parse(&caps[3]).map_err(|e| e.with_source(body))?;
        let mut var = Variable::new(name, ty, storage);
        if eager {
            var = var.eager();
        }
        ctx.declare(var)?;
        ctx.set_written(false);
        Ok(())
    }
}

/// How a compiled `${}` segment lands in the handler body: statements for
/// void, a guarded write for nullable results, a direct write otherwise.
fn emit_expression(expr: &Expression, ctx: &mut BuildContext) {
    if expr.ty == ValueType::Void {
        ctx.append_line(&format!("{};", expr.code));
        return;
    }
    if expr.nullable {
        ctx.append_line("try {");
        ctx.incr_tab();
        ctx.append_line(&write_statement(expr));
        ctx.decr_tab();
        ctx.append_line("} catch (e) {}");
        return;
    }
    ctx.append_line(&write_statement(expr));
}

fn write_statement(expr: &Expression) -> String {
    if expr.ty == ValueType::Str {
        format!("_w.write({});", expr.code)
    } else if expr.ty.is_scalar() {
        format!("_w.write(String({}));", expr.code)
    } else {
        format!("_w.write({}.toString());", expr.code)
    }
}

/// The registry key of an element: its text up to the first space past the
/// directive marker, trailing `/` dropped.
pub fn tag_path(element: &str) -> &str {
    let trimmed = element.trim_end_matches('/').trim_end();
    for (n, (i, ch)) in trimmed.char_indices().enumerate() {
        if n >= 3 && ch == ' ' {
            return &trimmed[..i];
        }
    }
    trimmed
}

/// Tolerant `key="value"` attribute scan over element text. Values may use
/// either quote; malformed trailing text is ignored.
pub fn parse_attributes(element: &str) -> HashMap<String, String> {
    let mut attrs = HashMap::new();
    let chars: Vec<char> = element.chars().collect();
    let mut i = 0;
    // Skip the path itself.
    while i < chars.len() && chars[i] != ' ' {
        i += 1;
    }
    while i < chars.len() {
        while i < chars.len() && !chars[i].is_alphanumeric() && chars[i] != '_' {
            i += 1;
        }
        let key_start = i;
        while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '-')
        {
            i += 1;
        }
        if key_start == i {
            break;
        }
        let key: String = chars[key_start..i].iter().collect();
        while i < chars.len() && chars[i] == ' ' {
            i += 1;
        }
        if i >= chars.len() || chars[i] != '=' {
            continue;
        }
        i += 1;
        while i < chars.len() && chars[i] == ' ' {
            i += 1;
        }
        if i >= chars.len() || (chars[i] != '"' && chars[i] != '\'') {
            continue;
        }
        let quote = chars[i];
        i += 1;
        let value_start = i;
        while i < chars.len() && chars[i] != quote {
            i += 1;
        }
        let value: String = chars[value_start..i].iter().collect();
        i += 1;
        attrs.insert(key, value);
    }
    attrs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_path_stops_at_first_space_past_marker() {
        assert_eq!(tag_path("%@ page contentType=\"text/html\""), "%@ page");
        assert_eq!(tag_path("%@include file=\"/a.html\""), "%@include");
        assert_eq!(tag_path("c:if test=\"${ok}\""), "c:if");
        assert_eq!(tag_path("/c:if"), "/c:if");
        assert_eq!(tag_path("t:include page=\"/x\" /"), "t:include");
    }

    #[test]
    fn test_tag_path_survives_multibyte_element_names() {
        assert_eq!(tag_path("aaé x='1'"), "aaé");
        assert_eq!(tag_path("é"), "é");
    }

    #[test]
    fn test_parse_attributes_both_quotes() {
        let attrs = parse_attributes("c:set var=\"x\" value='${1 + 2}'");
        assert_eq!(attrs["var"], "x");
        assert_eq!(attrs["value"], "${1 + 2}");
    }

    #[test]
    fn test_parse_attributes_ignores_malformed_tail() {
        let attrs = parse_attributes("c:if test=\"${ok}\" garbage");
        assert_eq!(attrs.len(), 1);
        assert_eq!(attrs["test"], "${ok}");
    }
}
