//! Scanner and whole-document tests: literal handling, comments, variable
//! directives, expression segments and the emitted handler skeleton.

use std::collections::HashMap;
use std::sync::Arc;

use crate::compiler::{CompileEnv, Compiler, ResourceLoader};
use crate::error::CompileErrorKind;
use crate::types::{MethodSig, StaticTypeModel, TypeDesc, ValueType};

fn model() -> StaticTypeModel {
    StaticTypeModel::new().with_type(
        TypeDesc::class("User")
            .method(MethodSig::new("getName", vec![], ValueType::Str))
            .method(MethodSig::new("getAge", vec![], ValueType::Int)),
    )
}

fn compiler() -> Compiler {
    let _ = env_logger::builder().is_test(true).try_init();
    Compiler::with_model(Arc::new(model()))
}

struct MapLoader(HashMap<String, String>);

impl ResourceLoader for MapLoader {
    fn load(&self, path: &str) -> Option<String> {
        self.0.get(path).cloned()
    }
}

#[test]
fn test_class_name_derives_from_uri() {
    let unit = compiler().compile("/pages/home.html", "<p>hi</p>").unwrap();
    assert_eq!(unit.class_name, "_pages_home_html");
    assert!(unit.source.contains("class _pages_home_html {"));
    assert!(unit.source.contains("class Ctx_pages_home_html {"));
}

#[test]
fn test_literal_text_collapses_whitespace() {
    let unit = compiler()
        .compile("/t.html", "<p>a   b\n\n   c</p>")
        .unwrap();
    assert!(unit.source.contains("_w.write(\"<p>a b c</p>\");"));
}

#[test]
fn test_unknown_element_passes_through() {
    let unit = compiler()
        .compile("/t.html", "<div class=\"big\">x</div>")
        .unwrap();
    assert!(unit.source.contains("_w.write(\"<div class=\\\"big\\\">x</div>\");"));
}

#[test]
fn test_comment_disappears_from_output() {
    let unit = compiler()
        .compile("/t.html", "a<!-- hidden -->b")
        .unwrap();
    assert!(unit.source.contains("_w.write(\"ab\");"));
    assert!(!unit.source.contains("hidden"));
}

#[test]
fn test_var_directive_declares_and_expression_hoists() {
    let source = "<!-- var user = User as REQUEST -->\n<p>${user.name}</p>";
    let unit = compiler().compile("/t.html", source).unwrap();
    assert!(unit.source.contains("getUser()"));
    assert!(unit.source.contains("this._r.getAttribute(\"user\")"));
    assert!(unit.source.contains("expression0()"));
    assert!(unit.source.contains("_w.write(_c.expression0());"));
}

#[test]
fn test_eager_variable_reads_at_declaration() {
    let source = "<!-- var user = User as REQUEST_EAGER -->done";
    let unit = compiler().compile("/t.html", source).unwrap();
    assert!(unit.source.contains("_c.getUser();"));
}

#[test]
fn test_bean_variable_reads_through_the_factory() {
    let source = "<!-- var user = User as BEAN -->${user.name}";
    let unit = compiler().compile("/t.html", source).unwrap();
    assert!(unit.source.contains("$rt.bean(this._r, \"user\")"));
}

#[test]
fn test_scalar_expression_writes_through_string() {
    let source = "<!-- var user = User as REQUEST -->${user.age}";
    let unit = compiler().compile("/t.html", source).unwrap();
    // A scalar result is never null, so no accessor is hoisted and the
    // number goes through String() directly.
    assert!(unit
        .source
        .contains("_w.write(String(_c.getUser().getAge()));"));
}

#[test]
fn test_dollar_without_brace_stays_literal() {
    let unit = compiler().compile("/t.html", "price: $5").unwrap();
    assert!(unit.source.contains("_w.write(\"price: $5\");"));
}

#[test]
fn test_premature_open_angle_is_literal() {
    let unit = compiler().compile("/t.html", "a < b <p>c</p>").unwrap();
    assert!(unit.source.contains("a < b <p>c</p>"));
}

#[test]
fn test_multibyte_unknown_element_passes_through() {
    let unit = compiler().compile("/t.html", "<aaé x='1'>ok").unwrap();
    assert!(unit.source.contains("_w.write(\"<aaé x='1'>ok\");"));
}

#[test]
fn test_expression_inside_unknown_element_still_compiles() {
    let source = "<!-- var user = User as REQUEST --><a href=\"${user.name}\">x</a>";
    let unit = compiler().compile("/t.html", source).unwrap();
    assert!(unit.source.contains("_w.write(\"<a href=\\\"\");"));
    assert!(unit.source.contains("_w.write(_c.expression0());"));
}

#[test]
fn test_page_directive_sets_content_type() {
    let source = "<%@ page contentType=\"text/html; charset=utf-8\">body";
    let unit = compiler().compile("/t.html", source).unwrap();
    assert!(unit
        .source
        .contains("response.setContentType(\"text/html; charset=utf-8\");"));
}

#[test]
fn test_static_include_splices_text() {
    let mut files = HashMap::new();
    files.insert("/shared/header.html".to_string(), "<b>head</b>".to_string());
    let env = CompileEnv::with_model(Arc::new(model())).loader(Arc::new(MapLoader(files)));
    let unit = Compiler::new(env)
        .compile(
            "/shared/index.html",
            "<%@include file=\"header.html\">tail",
        )
        .unwrap();
    assert!(unit.source.contains("<b>head</b>"));
    assert!(unit.source.contains("tail"));
}

#[test]
fn test_static_include_without_loader_fails() {
    let err = compiler()
        .compile("/t.html", "<%@include file=\"x.html\">")
        .unwrap_err();
    assert_eq!(err.kind, CompileErrorKind::Resource);
}

#[test]
fn test_unterminated_comment_fails_with_position() {
    let err = compiler()
        .compile("/t.html", "ok\n<!-- never closed")
        .unwrap_err();
    assert_eq!(err.kind, CompileErrorKind::Lexical);
    assert_eq!(err.line, Some(2));
}

#[test]
fn test_unterminated_expression_fails() {
    let err = compiler().compile("/t.html", "${1 + 2").unwrap_err();
    assert_eq!(err.kind, CompileErrorKind::Lexical);
}

#[test]
fn test_expression_error_carries_document_position() {
    let err = compiler().compile("/t.html", "line one\n${missing}").unwrap_err();
    assert_eq!(err.kind, CompileErrorKind::Semantic);
    assert_eq!(err.line, Some(2));
    assert_eq!(err.source_text.as_deref(), Some("missing"));
}

#[test]
fn test_service_skeleton_wraps_body() {
    let unit = compiler().compile("/t.html", "x").unwrap();
    assert!(unit.source.contains("service(request, response) {"));
    assert!(unit.source.contains("const _w = _c.out();"));
    assert!(unit.source.contains("_w.flush();"));
    assert!(unit.source.contains("_c.release();"));
    assert!(unit.source.contains("init(config)"));
    assert!(unit.source.contains("destroy()"));
}

#[test]
fn test_carriage_returns_never_reach_output() {
    let unit = compiler().compile("/t.html", "a\r\nb").unwrap();
    assert!(unit.source.contains("_w.write(\"a b\");"));
}
