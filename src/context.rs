//! Per-document build state.
//!
//! A [`BuildContext`] owns everything one compilation accumulates: the
//! literal buffer with its whitespace collapsing, the fragment stack the
//! emitted bodies are written into, the variable registry, the expression
//! cache backing hoisted accessors, and the tag builder registry grown by
//! taglib directives. One context per document; contexts are never shared.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;

use crate::ast::escape_str;
use crate::compiler::{CompileEnv, ResourceLoader};
use crate::error::CompileError;
use crate::functions::FunctionSig;
use crate::parser;
use crate::scope::{ScopeStack, StorageClass, Variable};
use crate::tags::{self, TagBuilder, TagLibrary};
use crate::types::{getter_name, Expression, TypeModel, ValueType};

lazy_static! {
    static ref CLASS_NAME_RX: Regex = Regex::new(r"[\\/.\-]").unwrap();
}

const INDENT: &str = "    ";

/// One emitted body: the root service body or a deferred tag body rendered
/// as an invokable fragment class.
#[derive(Debug)]
pub struct Fragment {
    pub name: String,
    /// Variable the fragment instance is bound to, absent for the root.
    pub var: Option<String>,
    pub indent: usize,
    pub buf: String,
}

impl Fragment {
    // The root body sits inside service/try, fragments inside invoke.
    fn root() -> Self {
        Fragment {
            name: String::new(),
            var: None,
            indent: 3,
            buf: String::new(),
        }
    }
}

pub struct BuildContext {
    uri: String,
    class_name: String,
    model: Arc<dyn TypeModel>,
    registry: HashMap<String, Arc<dyn TagBuilder>>,
    libraries: HashMap<String, Arc<dyn TagLibrary>>,
    loader: Option<Arc<dyn ResourceLoader>>,
    pub(crate) functions: HashMap<String, FunctionSig>,
    pub(crate) prefixes: HashSet<String>,
    pub(crate) scopes: ScopeStack,
    members: String,
    fragments: Vec<Fragment>,
    fragment_stack: Vec<usize>,
    out: String,
    prec_blank: bool,
    written: bool,
    expr_cache: HashMap<String, Expression>,
    expr_count: usize,
    anon_count: usize,
    attributes: HashMap<String, String>,
    content_type: Option<String>,
    pending_include: Option<String>,
}

impl BuildContext {
    pub fn new(uri: &str, env: &CompileEnv) -> Self {
        let mut registry = HashMap::new();
        for builder in tags::builtin_builders() {
            registry.insert(builder.path().to_string(), builder);
        }
        let mut libraries = tags::builtin_libraries();
        for (k, v) in &env.libraries {
            libraries.insert(k.clone(), Arc::clone(v));
        }
        let mut ctx = BuildContext {
            uri: uri.to_string(),
            class_name: CLASS_NAME_RX.replace_all(uri, "_").into_owned(),
            model: Arc::clone(&env.type_model),
            registry,
            libraries,
            loader: env.loader.clone(),
            functions: HashMap::new(),
            prefixes: HashSet::new(),
            scopes: ScopeStack::new(),
            members: String::new(),
            fragments: vec![Fragment::root()],
            fragment_stack: vec![0],
            out: String::new(),
            prec_blank: false,
            written: false,
            expr_cache: HashMap::new(),
            expr_count: 0,
            anon_count: 0,
            attributes: HashMap::new(),
            content_type: None,
            pending_include: None,
        };
        ctx.bind_implicit(
            "request",
            "_c._r",
            ValueType::Object("Request".to_string()),
        );
        ctx.bind_implicit(
            "response",
            "_c._re",
            ValueType::Object("Response".to_string()),
        );
        ctx.bind_implicit(
            "param",
            "_c.params()",
            ValueType::Map(Box::new(ValueType::Str), Box::new(ValueType::Str)),
        );
        ctx
    }

    fn bind_implicit(&mut self, name: &str, code: &str, ty: ValueType) {
        self.scopes
            .insert(name, Expression::new(code, ty, false), false);
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn model(&self) -> &dyn TypeModel {
        &*self.model
    }

    pub fn loader(&self) -> Option<&Arc<dyn ResourceLoader>> {
        self.loader.as_ref()
    }

    /// Fresh generated-variable name, unique within the document.
    pub fn anonymous_name(&mut self) -> String {
        let name = format!("a{}", self.anon_count);
        self.anon_count += 1;
        name
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Variables
    // ═══════════════════════════════════════════════════════════════════════

    /// Register a variable and hand back the expression its name resolves
    /// to. Re-declaring a bound name returns the existing binding untouched.
    pub fn declare(&mut self, var: Variable) -> Result<Expression, CompileError> {
        if let Some(existing) = self.scopes.get(&var.name) {
            return Ok(existing.clone());
        }
        let expr = match var.storage {
            StorageClass::Local => {
                self.append_line(&format!("let {};", var.name));
                Expression::new(var.name.clone(), var.ty.clone(), !var.ty.is_scalar())
            }
            StorageClass::None => {
                Expression::new(var.name.clone(), var.ty.clone(), !var.ty.is_scalar())
            }
            StorageClass::Page => Expression::new(
                format!("_c.{}", var.name),
                var.ty.clone(),
                !var.ty.is_scalar(),
            ),
            _ => {
                let getter = getter_name("get", &var.name);
                self.append_member(&lazy_getter(&var.name, &getter, var.storage));
                Expression::new(format!("_c.{}()", getter), var.ty.clone(), true)
            }
        };
        if var.eager {
            let code = expr.code.clone();
            self.append_line(&format!("{};", code));
        }
        self.scopes
            .insert(&var.name, expr.clone(), var.storage.is_scoped());
        Ok(expr)
    }

    pub fn get_variable(&self, name: &str) -> Result<Expression, CompileError> {
        self.scopes
            .get(name)
            .cloned()
            .ok_or_else(|| CompileError::semantic(format!("variable '{}' does not exist", name)))
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Expressions
    // ═══════════════════════════════════════════════════════════════════════

    /// Compile attribute text that may be a plain literal, a single `${}`
    /// expression or literal text interleaved with expressions.
    pub fn build_expression(&mut self, text: &str) -> Result<Expression, CompileError> {
        if !text.contains("${") {
            return Ok(Expression::new(
                format!("\"{}\"", escape_str(text)),
                ValueType::Str,
                false,
            ));
        }
        if let Some(inner) = single_expression(text) {
            return self.build_el(inner);
        }
        let mut parts = Vec::new();
        let mut rest = text;
        while let Some(start) = rest.find("${") {
            let end = rest[start..].find('}').ok_or_else(|| {
                CompileError::lexical("unterminated expression").with_source(text)
            })? + start;
            if start > 0 {
                parts.push(format!("\"{}\"", escape_str(&rest[..start])));
            }
            parts.push(self.build_el(&rest[start + 2..end])?.code);
            rest = &rest[end + 1..];
        }
        if !rest.is_empty() {
            parts.push(format!("\"{}\"", escape_str(rest)));
        }
        Ok(Expression::new(
            format!("({})", parts.join(" + ")),
            ValueType::Str,
            false,
        ))
    }

    /// Compile one expression. Identical source text within a document
    /// compiles once and is cached. A nullable result that does not depend
    /// on handler-body locals is hoisted into a member accessor that
    /// swallows null dereferences and answers the type's default value.
    pub fn build_el(&mut self, text: &str) -> Result<Expression, CompileError> {
        let text = text.trim();
        if let Some(cached) = self.expr_cache.get(text) {
            return Ok(cached.clone());
        }
        let node = parser::parse_expression(text, self)
            .map_err(|e| e.with_source(text))?;
        let ty = node.ty();
        let expr = if node.nullable() && !node.must_be_local() && ty != ValueType::Void {
            let name = format!("expression{}", self.expr_count);
            self.expr_count += 1;
            let body = node.member_code();
            let default = ty.default_value();
            self.append_member(&format!(
                "    {}() {{\n        try {{\n            const v = {};\n            return v == null ? {} : v;\n        }} catch (e) {{\n            return {};\n        }}\n    }}\n",
                name, body, default, default
            ));
            Expression::new(format!("_c.{}()", name), ty, false)
        } else {
            Expression::new(node.code(), ty, node.nullable())
        };
        self.expr_cache.insert(text.to_string(), expr.clone());
        Ok(expr)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Literal buffer
    // ═══════════════════════════════════════════════════════════════════════

    /// Buffer one character of literal document text. Runs of whitespace
    /// collapse to a single space, carriage returns disappear, and blanks
    /// before the first written output are dropped entirely.
    pub fn append_literal(&mut self, ch: char) {
        if ch == '\r' {
            return;
        }
        if ch.is_whitespace() {
            if !self.prec_blank && self.written {
                self.out.push(' ');
            }
            self.prec_blank = true;
        } else {
            self.out.push(ch);
            self.prec_blank = false;
            self.written = true;
        }
    }

    /// Buffer a character verbatim, bypassing collapsing. Used when an
    /// unrecognized tag is replayed as plain text.
    pub fn append_literal_raw(&mut self, ch: char) {
        self.out.push(ch);
        self.prec_blank = false;
        self.written = true;
    }

    /// Turn the buffered literal text into a write statement.
    pub fn flush_literal(&mut self) {
        if self.out.is_empty() {
            return;
        }
        let text = std::mem::take(&mut self.out);
        self.append_line(&format!("_w.write(\"{}\");", escape_str(&text)));
    }

    /// Directive builders clear this so the whitespace that follows a
    /// directive does not become output.
    pub fn set_written(&mut self, written: bool) {
        self.written = written;
        if !written {
            self.prec_blank = false;
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Emitted bodies
    // ═══════════════════════════════════════════════════════════════════════

    fn active(&mut self) -> &mut Fragment {
        let idx = *self.fragment_stack.last().unwrap_or(&0);
        &mut self.fragments[idx]
    }

    /// One indented statement line in the active body.
    pub fn append_line(&mut self, line: &str) {
        let frag = self.active();
        for _ in 0..frag.indent {
            frag.buf.push_str(INDENT);
        }
        frag.buf.push_str(line);
        frag.buf.push('\n');
        self.written = true;
    }

    /// Indentation only, for a statement assembled across several builders.
    pub fn append_tab(&mut self) {
        let frag = self.active();
        for _ in 0..frag.indent {
            frag.buf.push_str(INDENT);
        }
    }

    /// Verbatim text in the active body.
    pub fn append_raw(&mut self, text: &str) {
        self.active().buf.push_str(text);
    }

    /// Add member source to the emitted context class.
    pub fn append_member(&mut self, text: &str) {
        self.members.push_str(text);
    }

    pub fn incr_tab(&mut self) {
        self.active().indent += 1;
        self.scopes.push();
    }

    pub fn decr_tab(&mut self) {
        let frag = self.active();
        if frag.indent > 0 {
            frag.indent -= 1;
        }
        self.scopes.pop();
    }

    /// Open a deferred body. Statements now land in the new fragment until
    /// [`pop_fragment`](Self::pop_fragment).
    pub fn push_fragment(&mut self, var: &str) -> String {
        let name = format!("f{}", var);
        self.fragments.push(Fragment {
            name: name.clone(),
            var: Some(var.to_string()),
            indent: 2,
            buf: String::new(),
        });
        let idx = self.fragments.len() - 1;
        self.fragment_stack.push(idx);
        name
    }

    /// Close the innermost deferred body, answering the variable it was
    /// opened for.
    pub fn pop_fragment(&mut self) -> Option<String> {
        if self.fragment_stack.len() <= 1 {
            return None;
        }
        let idx = self.fragment_stack.pop()?;
        self.fragments[idx].var.clone()
    }

    pub fn in_fragment(&self) -> bool {
        self.fragment_stack.len() > 1
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Tags and libraries
    // ═══════════════════════════════════════════════════════════════════════

    pub fn builder_for(&self, path: &str) -> Option<Arc<dyn TagBuilder>> {
        self.registry.get(path).cloned()
    }

    pub fn register_builder(&mut self, builder: Arc<dyn TagBuilder>) {
        self.registry.insert(builder.path().to_string(), builder);
    }

    /// Import a tag library under a prefix. Importing an unknown URI logs
    /// and degrades; re-importing a known prefix is a no-op.
    pub fn import_library(&mut self, uri: &str, prefix: &str) -> Result<(), CompileError> {
        if self.prefixes.contains(prefix) {
            return Ok(());
        }
        let Some(library) = self.libraries.get(uri).cloned() else {
            log::warn!("unknown tag library {}", uri);
            return Ok(());
        };
        self.prefixes.insert(prefix.to_string());
        for builder in library.instantiate(prefix) {
            self.register_builder(builder);
        }
        for function in library.functions(prefix) {
            self.functions.insert(function.token.clone(), function);
        }
        log::debug!("imported tag library {} as {}", uri, prefix);
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Side channels
    // ═══════════════════════════════════════════════════════════════════════

    pub fn set_attribute(&mut self, key: &str, value: &str) {
        self.attributes.insert(key.to_string(), value.to_string());
    }

    pub fn take_attribute(&mut self, key: &str) -> Option<String> {
        self.attributes.remove(key)
    }

    pub fn set_content_type(&mut self, value: &str) {
        self.content_type = Some(value.to_string());
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Queue static-include text for the scanner to replay through itself.
    pub fn queue_include(&mut self, text: String) {
        self.pending_include = Some(text);
    }

    pub(crate) fn take_pending_include(&mut self) -> Option<String> {
        self.pending_include.take()
    }

    pub(crate) fn members(&self) -> &str {
        &self.members
    }

    pub(crate) fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }
}

/// Member accessor reading a lazily bound variable on first use.
fn lazy_getter(name: &str, getter: &str, storage: StorageClass) -> String {
    let read = match storage {
        StorageClass::Request => format!("this._r.getAttribute(\"{}\")", name),
        StorageClass::Session => format!("this._r.getSession().getAttribute(\"{}\")", name),
        StorageClass::Application => {
            format!("this._r.getApplication().getAttribute(\"{}\")", name)
        }
        _ => format!("$rt.bean(this._r, \"{}\")", name),
    };
    // The session locale falls back to the negotiated request locale.
    if storage == StorageClass::Session && name == "locale" {
        return format!(
            "    {}() {{\n        if (this.{} == null) {{\n            this.{} = {};\n            if (this.{} == null) {{\n                this.{} = $rt.defaultLocale(this._r);\n            }}\n        }}\n        return this.{};\n    }}\n",
            getter, name, name, read, name, name, name
        );
    }
    format!(
        "    {}() {{\n        if (this.{} == null) {{\n            this.{} = {};\n        }}\n        return this.{};\n    }}\n",
        getter, name, name, read, name
    )
}

/// Whole-text `${...}` with no second expression start.
fn single_expression(text: &str) -> Option<&str> {
    let inner = text.strip_prefix("${")?.strip_suffix('}')?;
    if inner.contains("${") || inner.contains('}') {
        None
    } else {
        Some(inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::CompileEnv;
    use crate::types::StaticTypeModel;

    fn ctx() -> BuildContext {
        let env = CompileEnv::with_model(Arc::new(StaticTypeModel::new()));
        BuildContext::new("/index.html", &env)
    }

    #[test]
    fn test_class_name_replaces_separators() {
        let ctx = ctx();
        assert_eq!(ctx.class_name(), "_index_html");
    }

    #[test]
    fn test_literal_whitespace_collapses() {
        let mut ctx = ctx();
        for ch in "  <b>a  \t b</b>\r\n".chars() {
            ctx.append_literal(ch);
        }
        ctx.flush_literal();
        let body = &ctx.fragments()[0].buf;
        assert!(body.contains("_w.write(\"<b>a b</b> \");"), "body: {}", body);
    }

    #[test]
    fn test_declared_variable_is_idempotent() {
        let mut ctx = ctx();
        let var = Variable::new("user", ValueType::Object("User".to_string()), StorageClass::Request);
        let first = ctx.declare(var.clone()).unwrap();
        let second = ctx.declare(var).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.code, "_c.getUser()");
        assert!(first.nullable);
        // Only one accessor was emitted.
        assert_eq!(ctx.members().matches("getUser()").count(), 1);
    }

    #[test]
    fn test_scoped_variable_unbinds_on_decr_tab() {
        let mut ctx = ctx();
        ctx.incr_tab();
        ctx.declare(Variable::new("item", ValueType::Str, StorageClass::None))
            .unwrap();
        assert!(ctx.get_variable("item").is_ok());
        ctx.decr_tab();
        assert!(ctx.get_variable("item").is_err());
    }

    #[test]
    fn test_identical_expressions_compile_once() {
        let mut ctx = ctx();
        ctx.declare(Variable::new(
            "user",
            ValueType::Object("User".to_string()),
            StorageClass::Request,
        ))
        .unwrap();
        let first = ctx.build_el("user").unwrap();
        let second = ctx.build_el("user").unwrap();
        assert_eq!(first, second);
        assert_eq!(ctx.members().matches("expression0()").count(), 1);
    }

    #[test]
    fn test_nullable_expression_hoists_into_accessor() {
        let mut ctx = ctx();
        ctx.declare(Variable::new(
            "title",
            ValueType::Str,
            StorageClass::Request,
        ))
        .unwrap();
        let expr = ctx.build_el("title").unwrap();
        assert_eq!(expr.code, "_c.expression0()");
        assert!(!expr.nullable);
        assert!(ctx.members().contains("const v = this.getTitle();"));
        assert!(ctx.members().contains("return v == null ? \"\" : v;"));
    }

    #[test]
    fn test_composite_text_concatenates() {
        let mut ctx = ctx();
        ctx.declare(Variable::new("n", ValueType::Int, StorageClass::Local))
            .unwrap();
        let expr = ctx.build_expression("page ${n} of 10").unwrap();
        assert_eq!(expr.code, "(\"page \" + n + \" of 10\")");
        assert_eq!(expr.ty, ValueType::Str);
    }

    #[test]
    fn test_implicit_variables_are_bound() {
        let ctx = ctx();
        assert_eq!(ctx.get_variable("request").unwrap().code, "_c._r");
        assert_eq!(ctx.get_variable("param").unwrap().code, "_c.params()");
    }
}
