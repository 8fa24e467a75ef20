//! Expression compiler tests: tokenizing, precedence, member resolution,
//! typing and the hoisted-accessor policy, exercised through a context.

use std::sync::Arc;

use crate::compiler::CompileEnv;
use crate::context::BuildContext;
use crate::error::CompileErrorKind;
use crate::scope::{StorageClass, Variable};
use crate::tags::LIB_FN;
use crate::types::{MethodSig, StaticTypeModel, TypeDesc, ValueType};

fn model() -> StaticTypeModel {
    StaticTypeModel::new()
        .with_type(
            TypeDesc::class("User")
                .method(MethodSig::new("getName", vec![], ValueType::Str))
                .method(MethodSig::new("getAge", vec![], ValueType::Int))
                .method(MethodSig::new("isChecked", vec![], ValueType::Bool))
                .method(MethodSig::new(
                    "setColor",
                    vec![ValueType::Enum("Color".to_string())],
                    ValueType::Void,
                ))
                .method(MethodSig::new(
                    "getTags",
                    vec![],
                    ValueType::List(Box::new(ValueType::Str)),
                )),
        )
        .with_type(TypeDesc::enumeration("Color", vec!["RED", "BLUE"]))
}

fn ctx() -> BuildContext {
    let _ = env_logger::builder().is_test(true).try_init();
    let env = CompileEnv::with_model(Arc::new(model()));
    BuildContext::new("/page/test.html", &env)
}

fn bind(ctx: &mut BuildContext, name: &str, ty: ValueType) {
    ctx.declare(Variable::new(name, ty, StorageClass::None)).unwrap();
}

#[test]
fn test_word_not_renders_negation() {
    let mut ctx = ctx();
    bind(&mut ctx, "redirect", ValueType::Str);
    let expr = ctx.build_el("not redirect").unwrap();
    assert_eq!(expr.code, "!(redirect)");
    assert_eq!(expr.ty, ValueType::Bool);
}

#[test]
fn test_property_resolves_through_boolean_accessor() {
    let mut ctx = ctx();
    bind(&mut ctx, "item", ValueType::Object("User".to_string()));
    let expr = ctx.build_el("item.checked").unwrap();
    assert_eq!(expr.code, "item.isChecked()");
    assert_eq!(expr.ty, ValueType::Bool);
    assert!(!expr.nullable);
}

#[test]
fn test_implicit_param_map_degrades_to_keyed_lookup() {
    let mut ctx = ctx();
    let expr = ctx.build_el("param.name").unwrap();
    assert_eq!(expr.code, "_c.params().get(\"name\")");
    assert_eq!(expr.ty, ValueType::Str);
    // Keyed lookups stay local, so no accessor hoisting happened.
    assert!(expr.nullable);
    assert!(ctx.members().is_empty());
}

#[test]
fn test_conditional_against_null() {
    let mut ctx = ctx();
    bind(&mut ctx, "redirect", ValueType::Str);
    let expr = ctx.build_el("redirect == null ? \"/\" : redirect").unwrap();
    assert_eq!(expr.code, "((redirect == null) ? \"/\" : redirect)");
    assert_eq!(expr.ty, ValueType::Str);
}

#[test]
fn test_multiplication_binds_tighter_than_addition() {
    let mut ctx = ctx();
    let expr = ctx.build_el("1 + 2 * 3").unwrap();
    assert_eq!(expr.code, "(1 + (2 * 3))");
    assert_eq!(expr.ty, ValueType::Int);
}

#[test]
fn test_parentheses_override_precedence() {
    let mut ctx = ctx();
    let expr = ctx.build_el("(1 + 2) * 3").unwrap();
    assert_eq!(expr.code, "((1 + 2) * 3)");
}

#[test]
fn test_arithmetic_widens_to_the_higher_operand() {
    let mut ctx = ctx();
    bind(&mut ctx, "n", ValueType::Int);
    assert_eq!(ctx.build_el("n + 2.5").unwrap().ty, ValueType::Double);
    assert_eq!(ctx.build_el("n + 10l").unwrap().ty, ValueType::Long);
    assert_eq!(ctx.build_el("n + 1").unwrap().ty, ValueType::Int);
}

#[test]
fn test_word_aliases_parse_like_symbols() {
    let mut ctx = ctx();
    bind(&mut ctx, "a", ValueType::Bool);
    bind(&mut ctx, "b", ValueType::Bool);
    bind(&mut ctx, "c", ValueType::Bool);
    let expr = ctx.build_el("a and b or c").unwrap();
    assert_eq!(expr.code, "((a && b) || c)");
    let expr = ctx.build_el("a eq b").unwrap();
    assert_eq!(expr.code, "(a == b)");
}

#[test]
fn test_indexed_access_types_as_element() {
    let mut ctx = ctx();
    bind(&mut ctx, "items", ValueType::List(Box::new(ValueType::Str)));
    let expr = ctx.build_el("items[0]").unwrap();
    assert_eq!(expr.code, "items[0]");
    assert_eq!(expr.ty, ValueType::Str);
}

#[test]
fn test_library_function_call_after_import() {
    let mut ctx = ctx();
    ctx.import_library(LIB_FN, "fn").unwrap();
    bind(&mut ctx, "items", ValueType::List(Box::new(ValueType::Str)));
    let expr = ctx.build_el("fn:length(items)").unwrap();
    assert_eq!(expr.code, "$rt.length(items)");
    assert_eq!(expr.ty, ValueType::Int);
}

#[test]
fn test_function_arity_mismatch_is_semantic() {
    let mut ctx = ctx();
    ctx.import_library(LIB_FN, "fn").unwrap();
    bind(&mut ctx, "s", ValueType::Str);
    let err = ctx.build_el("fn:substring(s, 1)").unwrap_err();
    assert_eq!(err.kind, CompileErrorKind::Semantic);
}

#[test]
fn test_enum_argument_promotes_string_constant() {
    let mut ctx = ctx();
    bind(&mut ctx, "user", ValueType::Object("User".to_string()));
    let expr = ctx.build_el("user.setColor('RED')").unwrap();
    assert_eq!(expr.code, "user.setColor(\"RED\")");
    assert_eq!(expr.ty, ValueType::Void);
    let err = ctx.build_el("user.setColor('GREEN')").unwrap_err();
    assert_eq!(err.kind, CompileErrorKind::Semantic);
}

#[test]
fn test_nullable_member_chain_hoists_into_accessor() {
    let mut ctx = ctx();
    ctx.declare(Variable::new(
        "user",
        ValueType::Object("User".to_string()),
        StorageClass::Request,
    ))
    .unwrap();
    let expr = ctx.build_el("user.name").unwrap();
    assert_eq!(expr.code, "_c.expression0()");
    assert!(!expr.nullable);
    assert!(ctx.members().contains("const v = this.getUser().getName();"));
    assert!(ctx.members().contains("return v == null ? \"\" : v;"));
}

#[test]
fn test_hoisted_body_keeps_string_literals_intact() {
    let mut ctx = ctx();
    ctx.declare(Variable::new(
        "title",
        ValueType::Str,
        StorageClass::Request,
    ))
    .unwrap();
    // Only the context accessor is rewritten for the member body; a
    // constant that happens to contain "_c." is untouched.
    let expr = ctx.build_el("title.split('_c.')").unwrap();
    assert_eq!(expr.code, "_c.expression0()");
    assert!(ctx
        .members()
        .contains("const v = this.getTitle().split(\"_c.\");"));
}

#[test]
fn test_identical_source_reuses_the_accessor() {
    let mut ctx = ctx();
    ctx.declare(Variable::new(
        "user",
        ValueType::Object("User".to_string()),
        StorageClass::Request,
    ))
    .unwrap();
    let first = ctx.build_el("user.name").unwrap();
    let second = ctx.build_el(" user.name ").unwrap();
    assert_eq!(first, second);
    assert_eq!(ctx.members().matches("expression0()").count(), 1);
}

#[test]
fn test_string_members_are_builtin() {
    let mut ctx = ctx();
    bind(&mut ctx, "s", ValueType::Str);
    let expr = ctx.build_el("s.length()").unwrap();
    assert_eq!(expr.code, "s.length()");
    assert_eq!(expr.ty, ValueType::Int);
    let expr = ctx.build_el("s.substring(1, 3)").unwrap();
    assert_eq!(expr.code, "s.substring(1, 3)");
}

#[test]
fn test_container_size_is_builtin() {
    let mut ctx = ctx();
    bind(&mut ctx, "items", ValueType::List(Box::new(ValueType::Str)));
    let expr = ctx.build_el("items.size()").unwrap();
    assert_eq!(expr.code, "items.size()");
    assert_eq!(expr.ty, ValueType::Int);
}

#[test]
fn test_unresolved_variable_is_semantic() {
    let mut ctx = ctx();
    let err = ctx.build_el("missing + 1").unwrap_err();
    assert_eq!(err.kind, CompileErrorKind::Semantic);
    assert_eq!(err.source_text.as_deref(), Some("missing + 1"));
}

#[test]
fn test_unresolved_member_is_semantic() {
    let mut ctx = ctx();
    bind(&mut ctx, "user", ValueType::Object("User".to_string()));
    let err = ctx.build_el("user.missing").unwrap_err();
    assert_eq!(err.kind, CompileErrorKind::Semantic);
}

#[test]
fn test_unbalanced_parenthesis_is_lexical() {
    let mut ctx = ctx();
    bind(&mut ctx, "n", ValueType::Int);
    let err = ctx.build_el("(n + 1").unwrap_err();
    assert_eq!(err.kind, CompileErrorKind::Lexical);
}

#[test]
fn test_dangling_conditional_is_semantic() {
    let mut ctx = ctx();
    bind(&mut ctx, "a", ValueType::Bool);
    let err = ctx.build_el("a ? 1").unwrap_err();
    assert_eq!(err.kind, CompileErrorKind::Semantic);
}

#[test]
fn test_method_call_chain() {
    let mut ctx = ctx();
    bind(&mut ctx, "user", ValueType::Object("User".to_string()));
    let expr = ctx.build_el("user.tags.size()").unwrap();
    assert_eq!(expr.code, "user.getTags().size()");
    assert_eq!(expr.ty, ValueType::Int);
}

#[test]
fn test_numeric_literal_suffixes() {
    let mut ctx = ctx();
    assert_eq!(ctx.build_el("10l").unwrap().ty, ValueType::Long);
    assert_eq!(ctx.build_el("1.5f").unwrap().ty, ValueType::Float);
    assert_eq!(ctx.build_el("3.14").unwrap().ty, ValueType::Double);
    assert_eq!(ctx.build_el("42").unwrap().ty, ValueType::Int);
}

#[test]
fn test_null_and_boolean_literals() {
    let mut ctx = ctx();
    bind(&mut ctx, "redirect", ValueType::Str);
    let expr = ctx.build_el("redirect != null").unwrap();
    assert_eq!(expr.code, "(redirect != null)");
    let expr = ctx.build_el("true").unwrap();
    assert_eq!(expr.ty, ValueType::Bool);
}
