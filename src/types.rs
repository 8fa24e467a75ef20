//! Reflective type model used by the expression compiler.
//!
//! Expression typing never touches the running program: every receiver type
//! is described up front through the [`TypeModel`] interface and queried by
//! name. The model is immutable for the lifetime of a compilation, which is
//! what makes concurrent compilations safe.

use std::collections::HashMap;
use std::fmt;

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};

use crate::error::CompileError;

// ═══════════════════════════════════════════════════════════════════════════
// Value types
// ═══════════════════════════════════════════════════════════════════════════

/// The type lattice the expression compiler reasons over. `Any` is the
/// universal top type; four numeric types are ordered by widening priority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ValueType {
    Void,
    Bool,
    Int,
    Long,
    Float,
    Double,
    Str,
    /// A named type resolvable through the [`TypeModel`].
    Object(String),
    /// A named enumeration with a closed set of constants.
    Enum(String),
    List(Box<ValueType>),
    Array(Box<ValueType>),
    Map(Box<ValueType>, Box<ValueType>),
    Any,
}

impl ValueType {
    /// Scalar types carry their value directly and can never be null.
    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            ValueType::Bool | ValueType::Int | ValueType::Long | ValueType::Float | ValueType::Double
        )
    }

    pub fn is_numeric(&self) -> bool {
        self.numeric_priority() > 0
    }

    /// Widening order of the numeric types. Non-numeric types rank 0.
    pub fn numeric_priority(&self) -> u8 {
        match self {
            ValueType::Int => 1,
            ValueType::Long => 2,
            ValueType::Float => 3,
            ValueType::Double => 4,
            _ => 0,
        }
    }

    /// The wider of two numeric operand types, `Int` when neither ranks.
    pub fn wider(a: &ValueType, b: &ValueType) -> ValueType {
        let pick = if a.numeric_priority() >= b.numeric_priority() { a } else { b };
        if pick.is_numeric() {
            pick.clone()
        } else {
            ValueType::Int
        }
    }

    /// Indexed and keyed containers expose an element type.
    pub fn element_type(&self) -> ValueType {
        match self {
            ValueType::List(e) | ValueType::Array(e) => (**e).clone(),
            ValueType::Map(_, v) => (**v).clone(),
            _ => ValueType::Any,
        }
    }

    pub fn is_map_like(&self) -> bool {
        matches!(self, ValueType::Map(_, _))
    }

    pub fn is_indexed(&self) -> bool {
        matches!(self, ValueType::List(_) | ValueType::Array(_))
    }

    /// Source text of the default value substituted when a hoisted accessor
    /// observes null.
    pub fn default_value(&self) -> &'static str {
        match self {
            ValueType::Str => "\"\"",
            ValueType::Bool => "false",
            ValueType::Int | ValueType::Long => "0",
            ValueType::Float | ValueType::Double => "0.0",
            _ => "null",
        }
    }

    /// Parse a declared type from directive text, e.g. `string`,
    /// `list<string>` or `map<string, int>`. Unknown simple names become
    /// model-resolvable object types.
    pub fn parse(text: &str) -> Result<ValueType, CompileError> {
        let text = text.trim();
        if let Some(inner) = generic_arg(text, "list") {
            return Ok(ValueType::List(Box::new(ValueType::parse(inner)?)));
        }
        if let Some(inner) = generic_arg(text, "array") {
            return Ok(ValueType::Array(Box::new(ValueType::parse(inner)?)));
        }
        if let Some(inner) = generic_arg(text, "map") {
            let (key, value) = split_pair(inner)?;
            return Ok(ValueType::Map(
                Box::new(ValueType::parse(key)?),
                Box::new(ValueType::parse(value)?),
            ));
        }
        if let Some(name) = text.strip_prefix("enum:") {
            return Ok(ValueType::Enum(name.trim().to_string()));
        }
        Ok(match text {
            "void" => ValueType::Void,
            "boolean" | "bool" => ValueType::Bool,
            "int" => ValueType::Int,
            "long" => ValueType::Long,
            "float" => ValueType::Float,
            "double" => ValueType::Double,
            "string" => ValueType::Str,
            "any" | "object" => ValueType::Any,
            "" => {
                return Err(CompileError::semantic("empty type name"));
            }
            other => ValueType::Object(other.to_string()),
        })
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Void => write!(f, "void"),
            ValueType::Bool => write!(f, "boolean"),
            ValueType::Int => write!(f, "int"),
            ValueType::Long => write!(f, "long"),
            ValueType::Float => write!(f, "float"),
            ValueType::Double => write!(f, "double"),
            ValueType::Str => write!(f, "string"),
            ValueType::Object(name) => write!(f, "{}", name),
            ValueType::Enum(name) => write!(f, "enum:{}", name),
            ValueType::List(e) => write!(f, "list<{}>", e),
            ValueType::Array(e) => write!(f, "array<{}>", e),
            ValueType::Map(k, v) => write!(f, "map<{}, {}>", k, v),
            ValueType::Any => write!(f, "any"),
        }
    }
}

fn generic_arg<'a>(text: &'a str, head: &str) -> Option<&'a str> {
    let rest = text.strip_prefix(head)?;
    let rest = rest.trim_start();
    let inner = rest.strip_prefix('<')?;
    inner.strip_suffix('>')
}

/// Split `k, v` at the top-level comma, honoring nested generics.
fn split_pair(inner: &str) -> Result<(&str, &str), CompileError> {
    let mut depth = 0usize;
    for (i, ch) in inner.char_indices() {
        match ch {
            '<' => depth += 1,
            '>' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => return Ok((&inner[..i], &inner[i + 1..])),
            _ => {}
        }
    }
    Err(CompileError::semantic(format!(
        "map type needs a key and a value: '{}'",
        inner
    )))
}

// ═══════════════════════════════════════════════════════════════════════════
// Typed expressions
// ═══════════════════════════════════════════════════════════════════════════

/// A piece of target source with the type knowledge the compiler kept about
/// it: what it evaluates to and whether evaluating it can observe null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expression {
    pub code: String,
    pub ty: ValueType,
    pub nullable: bool,
}

impl Expression {
    pub fn new(code: impl Into<String>, ty: ValueType, nullable: bool) -> Self {
        Expression {
            code: code.into(),
            ty,
            nullable,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Type descriptions
// ═══════════════════════════════════════════════════════════════════════════

/// A callable member of a described type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodSig {
    pub name: String,
    pub params: Vec<ValueType>,
    pub ret: ValueType,
    pub ret_nullable: bool,
}

impl MethodSig {
    pub fn new(name: impl Into<String>, params: Vec<ValueType>, ret: ValueType) -> Self {
        let ret_nullable = !ret.is_scalar() && ret != ValueType::Void;
        MethodSig {
            name: name.into(),
            params,
            ret,
            ret_nullable,
        }
    }

    pub fn non_null(mut self) -> Self {
        self.ret_nullable = false;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TypeKind {
    Class,
    /// An enumeration and its constant names.
    Enum(Vec<String>),
}

/// Everything the compiler may learn about a named type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDesc {
    pub name: String,
    pub kind: TypeKind,
    pub methods: Vec<MethodSig>,
}

impl TypeDesc {
    pub fn class(name: impl Into<String>) -> Self {
        TypeDesc {
            name: name.into(),
            kind: TypeKind::Class,
            methods: Vec::new(),
        }
    }

    pub fn enumeration(name: impl Into<String>, constants: Vec<&str>) -> Self {
        TypeDesc {
            name: name.into(),
            kind: TypeKind::Enum(constants.into_iter().map(String::from).collect()),
            methods: Vec::new(),
        }
    }

    pub fn method(mut self, sig: MethodSig) -> Self {
        self.methods.push(sig);
        self
    }

    /// A conventional getter: no parameter, named `getX`.
    pub fn getter(self, name: &str, ret: ValueType) -> Self {
        self.method(MethodSig::new(getter_name("get", name), vec![], ret))
    }

    pub fn has_constant(&self, constant: &str) -> bool {
        match &self.kind {
            TypeKind::Enum(constants) => constants.iter().any(|c| c == constant),
            TypeKind::Class => false,
        }
    }
}

/// Capitalize a property name into its accessor spelling.
pub fn getter_name(prefix: &str, property: &str) -> String {
    let mut chars = property.chars();
    match chars.next() {
        Some(first) => format!("{}{}{}", prefix, first.to_uppercase(), chars.as_str()),
        None => prefix.to_string(),
    }
}

/// Read-only registry of type descriptions, shared across compilations.
pub trait TypeModel: Send + Sync {
    fn describe(&self, name: &str) -> Option<&TypeDesc>;
}

/// A [`TypeModel`] backed by a plain map, filled before compilation starts.
#[derive(Debug, Default)]
pub struct StaticTypeModel {
    types: HashMap<String, TypeDesc>,
}

impl StaticTypeModel {
    pub fn new() -> Self {
        StaticTypeModel::default()
    }

    pub fn with_type(mut self, desc: TypeDesc) -> Self {
        self.types.insert(desc.name.clone(), desc);
        self
    }
}

impl TypeModel for StaticTypeModel {
    fn describe(&self, name: &str) -> Option<&TypeDesc> {
        self.types.get(name)
    }
}

lazy_static! {
    /// Types every compilation knows without the embedder describing them.
    static ref BUILTIN_TYPES: HashMap<String, TypeDesc> = {
        let mut m = HashMap::new();
        let status = TypeDesc::class("LoopStatus")
            .method(MethodSig::new("getIndex", vec![], ValueType::Int))
            .method(MethodSig::new("getCount", vec![], ValueType::Int))
            .method(MethodSig::new("isFirst", vec![], ValueType::Bool))
            .method(MethodSig::new("isLast", vec![], ValueType::Bool))
            .method(MethodSig::new("getBegin", vec![], ValueType::Int))
            .method(MethodSig::new("getEnd", vec![], ValueType::Int))
            .method(MethodSig::new("getStep", vec![], ValueType::Int))
            .method(MethodSig::new("getCurrent", vec![], ValueType::Any));
        m.insert(status.name.clone(), status);
        m
    };
}

/// Resolve a type description, looking at the embedder model first and the
/// compiler built-ins second.
pub fn resolve_desc<'a>(model: &'a dyn TypeModel, name: &str) -> Option<&'a TypeDesc> {
    model.describe(name).or_else(|| BUILTIN_TYPES.get(name))
}

/// Members available on the built-in string type.
pub fn string_member(name: &str, argc: usize) -> Option<MethodSig> {
    let sig = match (name, argc) {
        ("length", 0) => MethodSig::new("length", vec![], ValueType::Int),
        ("isEmpty", 0) => MethodSig::new("isEmpty", vec![], ValueType::Bool),
        ("trim", 0) => MethodSig::new("trim", vec![], ValueType::Str).non_null(),
        ("toUpperCase", 0) => MethodSig::new("toUpperCase", vec![], ValueType::Str).non_null(),
        ("toLowerCase", 0) => MethodSig::new("toLowerCase", vec![], ValueType::Str).non_null(),
        ("contains", 1) => MethodSig::new("contains", vec![ValueType::Str], ValueType::Bool),
        ("startsWith", 1) => MethodSig::new("startsWith", vec![ValueType::Str], ValueType::Bool),
        ("endsWith", 1) => MethodSig::new("endsWith", vec![ValueType::Str], ValueType::Bool),
        ("indexOf", 1) => MethodSig::new("indexOf", vec![ValueType::Str], ValueType::Int),
        ("substring", 2) => {
            MethodSig::new("substring", vec![ValueType::Int, ValueType::Int], ValueType::Str).non_null()
        }
        ("replace", 2) => {
            MethodSig::new("replace", vec![ValueType::Str, ValueType::Str], ValueType::Str).non_null()
        }
        ("split", 1) => MethodSig::new(
            "split",
            vec![ValueType::Str],
            ValueType::Array(Box::new(ValueType::Str)),
        ),
        _ => return None,
    };
    Some(sig)
}

/// Members available on containers regardless of the described model.
pub fn container_member(ty: &ValueType, name: &str, argc: usize) -> Option<MethodSig> {
    if !(ty.is_indexed() || ty.is_map_like()) {
        return None;
    }
    match (name, argc) {
        ("size", 0) => Some(MethodSig::new("size", vec![], ValueType::Int)),
        ("isEmpty", 0) => Some(MethodSig::new("isEmpty", vec![], ValueType::Bool)),
        ("contains", 1) if ty.is_indexed() => Some(MethodSig::new(
            "contains",
            vec![ty.element_type()],
            ValueType::Bool,
        )),
        ("containsKey", 1) => match ty {
            ValueType::Map(k, _) => Some(MethodSig::new(
                "containsKey",
                vec![(**k).clone()],
                ValueType::Bool,
            )),
            _ => None,
        },
        ("get", 1) => match ty {
            ValueType::Map(k, v) => {
                let mut sig = MethodSig::new("get", vec![(**k).clone()], (**v).clone());
                sig.ret_nullable = true;
                Some(sig)
            }
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_types() {
        assert_eq!(ValueType::parse("string").unwrap(), ValueType::Str);
        assert_eq!(ValueType::parse("int").unwrap(), ValueType::Int);
        assert_eq!(
            ValueType::parse("User").unwrap(),
            ValueType::Object("User".to_string())
        );
    }

    #[test]
    fn test_parse_nested_generics() {
        let ty = ValueType::parse("map<string, list<int>>").unwrap();
        assert_eq!(
            ty,
            ValueType::Map(
                Box::new(ValueType::Str),
                Box::new(ValueType::List(Box::new(ValueType::Int)))
            )
        );
    }

    #[test]
    fn test_numeric_widening() {
        assert_eq!(
            ValueType::wider(&ValueType::Int, &ValueType::Double),
            ValueType::Double
        );
        assert_eq!(
            ValueType::wider(&ValueType::Long, &ValueType::Int),
            ValueType::Long
        );
        assert_eq!(
            ValueType::wider(&ValueType::Str, &ValueType::Str),
            ValueType::Int
        );
    }

    #[test]
    fn test_default_values() {
        assert_eq!(ValueType::Str.default_value(), "\"\"");
        assert_eq!(ValueType::Bool.default_value(), "false");
        assert_eq!(ValueType::Double.default_value(), "0.0");
        assert_eq!(ValueType::Any.default_value(), "null");
    }

    #[test]
    fn test_builtin_loop_status_is_resolvable() {
        let model = StaticTypeModel::new();
        let desc = resolve_desc(&model, "LoopStatus").unwrap();
        assert!(desc.methods.iter().any(|m| m.name == "isFirst"));
    }

    #[test]
    fn test_getter_name_capitalizes() {
        assert_eq!(getter_name("get", "name"), "getName");
        assert_eq!(getter_name("is", "checked"), "isChecked");
    }
}
