//! Expression tree produced by the expression parser.
//!
//! Nodes are immutable once built: partially applied constructs (a ternary
//! without its else branch, a string constant narrowed to an enum constant)
//! are represented by building a new node, never by mutating an old one.
//! Every node answers four questions: its rendered code, its type, whether
//! evaluating it can observe null, and whether it must stay local to the
//! statement that uses it.

use serde::{Deserialize, Serialize};

use crate::operators::BinOp;
use crate::types::ValueType;

/// A literal that survived parsing with its exact spelling semantics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConstValue {
    Str(String),
    Int(i64),
    Long(i64),
    Float(f64),
    Double(f64),
    Bool(bool),
    Null,
    /// A string constant promoted to a named enum constant.
    EnumConst { type_name: String, constant: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprNode {
    Constant(ConstValue),
    /// A resolved variable reference. `local` marks names that live inside
    /// the handler body and therefore cannot be hoisted out of it.
    Value {
        code: String,
        ty: ValueType,
        nullable: bool,
        local: bool,
    },
    /// Bracket access on an indexed container.
    Index {
        object: Box<ExprNode>,
        index: Box<ExprNode>,
        ty: ValueType,
    },
    /// A resolved member or library function call. A library function has no
    /// target and renders through its qualified helper path.
    MethodCall {
        target: Option<Box<ExprNode>>,
        name: String,
        args: Vec<ExprNode>,
        ret: ValueType,
        ret_nullable: bool,
    },
    /// Fallback keyed lookup on a map-like receiver with no matching member.
    /// Always nullable and pinned local so it is re-read at every use.
    KeyedLookup {
        object: Box<ExprNode>,
        key: String,
        ty: ValueType,
    },
    /// Logical negation.
    Not { operand: Box<ExprNode> },
    Binary {
        op: BinOp,
        lhs: Box<ExprNode>,
        rhs: Box<ExprNode>,
        ty: ValueType,
    },
    /// `cond ? then : else`. Built in two steps: `?` produces the node with
    /// no else branch, `:` produces a new complete node.
    Ternary {
        cond: Box<ExprNode>,
        then_branch: Box<ExprNode>,
        else_branch: Option<Box<ExprNode>>,
    },
    /// Literal text interleaved with expression segments.
    Concat(Vec<ExprNode>),
}

impl ExprNode {
    pub fn ty(&self) -> ValueType {
        match self {
            ExprNode::Constant(c) => match c {
                ConstValue::Str(_) => ValueType::Str,
                ConstValue::Int(_) => ValueType::Int,
                ConstValue::Long(_) => ValueType::Long,
                ConstValue::Float(_) => ValueType::Float,
                ConstValue::Double(_) => ValueType::Double,
                ConstValue::Bool(_) => ValueType::Bool,
                ConstValue::Null => ValueType::Any,
                ConstValue::EnumConst { type_name, .. } => ValueType::Enum(type_name.clone()),
            },
            ExprNode::Value { ty, .. } => ty.clone(),
            ExprNode::Index { ty, .. } => ty.clone(),
            ExprNode::MethodCall { ret, .. } => ret.clone(),
            ExprNode::KeyedLookup { ty, .. } => ty.clone(),
            ExprNode::Not { .. } => ValueType::Bool,
            ExprNode::Binary { ty, .. } => ty.clone(),
            ExprNode::Ternary {
                then_branch,
                else_branch,
                ..
            } => {
                // The first branch decides unless it is the top type.
                let first = then_branch.ty();
                if first == ValueType::Any {
                    match else_branch {
                        Some(other) => other.ty(),
                        None => ValueType::Any,
                    }
                } else {
                    first
                }
            }
            ExprNode::Concat(_) => ValueType::Str,
        }
    }

    pub fn nullable(&self) -> bool {
        match self {
            ExprNode::Constant(c) => matches!(c, ConstValue::Null),
            ExprNode::Value { nullable, .. } => *nullable,
            ExprNode::Index { ty, .. } => !ty.is_scalar(),
            ExprNode::MethodCall { ret_nullable, .. } => *ret_nullable,
            ExprNode::KeyedLookup { .. } => true,
            ExprNode::Not { operand } => operand.nullable(),
            ExprNode::Binary { lhs, rhs, .. } => lhs.nullable() || rhs.nullable(),
            // Both branches must be null-safe for the whole to be.
            ExprNode::Ternary {
                then_branch,
                else_branch,
                ..
            } => {
                then_branch.nullable()
                    && else_branch.as_ref().map(|e| e.nullable()).unwrap_or(true)
            }
            ExprNode::Concat(_) => false,
        }
    }

    /// True when the rendered code references a name that only exists inside
    /// the handler body, which forbids hoisting into a member accessor.
    pub fn must_be_local(&self) -> bool {
        match self {
            ExprNode::Constant(_) => false,
            ExprNode::Value { local, .. } => *local,
            ExprNode::Index { object, index, .. } => object.must_be_local() || index.must_be_local(),
            ExprNode::MethodCall { target, args, .. } => {
                target.as_ref().map(|t| t.must_be_local()).unwrap_or(false)
                    || args.iter().any(|a| a.must_be_local())
            }
            ExprNode::KeyedLookup { .. } => true,
            ExprNode::Not { operand } => operand.must_be_local(),
            ExprNode::Binary { lhs, rhs, .. } => lhs.must_be_local() || rhs.must_be_local(),
            ExprNode::Ternary {
                cond,
                then_branch,
                else_branch,
            } => {
                cond.must_be_local()
                    || then_branch.must_be_local()
                    || else_branch.as_ref().map(|e| e.must_be_local()).unwrap_or(false)
            }
            ExprNode::Concat(parts) => parts.iter().any(|p| p.must_be_local()),
        }
    }

    pub fn is_null_constant(&self) -> bool {
        matches!(self, ExprNode::Constant(ConstValue::Null))
    }

    /// Render the node as target source for the handler body, where the
    /// context object is reachable as `_c`.
    pub fn code(&self) -> String {
        self.render("_c.")
    }

    /// Render for a context-class member body, where the context is `this`.
    /// Only variable accessors are rewritten; string constants keep their
    /// text.
    pub fn member_code(&self) -> String {
        self.render("this.")
    }

    fn render(&self, ctx: &str) -> String {
        match self {
            ExprNode::Constant(c) => match c {
                ConstValue::Str(s) => format!("\"{}\"", escape_str(s)),
                ConstValue::Int(v) | ConstValue::Long(v) => v.to_string(),
                ConstValue::Float(v) | ConstValue::Double(v) => {
                    let mut s = v.to_string();
                    if !s.contains('.') && !s.contains('e') && !s.contains("inf") && !s.contains("NaN")
                    {
                        s.push_str(".0");
                    }
                    s
                }
                ConstValue::Bool(v) => v.to_string(),
                ConstValue::Null => "null".to_string(),
                // Enum constants travel as their constant name.
                ConstValue::EnumConst { constant, .. } => format!("\"{}\"", escape_str(constant)),
            },
            ExprNode::Value { code, .. } => match code.strip_prefix("_c.") {
                Some(rest) => format!("{}{}", ctx, rest),
                None => code.clone(),
            },
            ExprNode::Index { object, index, .. } => {
                format!("{}[{}]", object.render(ctx), index.render(ctx))
            }
            ExprNode::MethodCall {
                target, name, args, ..
            } => {
                let rendered: Vec<String> = args.iter().map(|a| a.render(ctx)).collect();
                match target {
                    Some(t) => format!("{}.{}({})", t.render(ctx), name, rendered.join(", ")),
                    None => format!("{}({})", name, rendered.join(", ")),
                }
            }
            ExprNode::KeyedLookup { object, key, .. } => {
                format!("{}.get(\"{}\")", object.render(ctx), escape_str(key))
            }
            ExprNode::Not { operand } => format!("!({})", operand.render(ctx)),
            ExprNode::Binary { op, lhs, rhs, .. } => {
                op.render(&lhs.render(ctx), &rhs.render(ctx))
            }
            ExprNode::Ternary {
                cond,
                then_branch,
                else_branch,
            } => {
                let else_code = match else_branch {
                    Some(e) => e.render(ctx),
                    None => "null".to_string(),
                };
                format!(
                    "({} ? {} : {})",
                    cond.render(ctx),
                    then_branch.render(ctx),
                    else_code
                )
            }
            ExprNode::Concat(parts) => {
                let rendered: Vec<String> = parts.iter().map(|p| p.render(ctx)).collect();
                format!("({})", rendered.join(" + "))
            }
        }
    }
}

/// Escape a literal for a double-quoted target string.
pub fn escape_str(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => {}
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value(code: &str, ty: ValueType, nullable: bool) -> ExprNode {
        ExprNode::Value {
            code: code.to_string(),
            ty,
            nullable,
            local: true,
        }
    }

    #[test]
    fn test_not_renders_with_parentheses() {
        let node = ExprNode::Not {
            operand: Box::new(value("redirect", ValueType::Str, true)),
        };
        assert_eq!(node.code(), "!(redirect)");
        assert_eq!(node.ty(), ValueType::Bool);
    }

    #[test]
    fn test_partial_ternary_completes_into_a_new_node() {
        let partial = ExprNode::Ternary {
            cond: Box::new(value("ok", ValueType::Bool, false)),
            then_branch: Box::new(ExprNode::Constant(ConstValue::Str("/".to_string()))),
            else_branch: None,
        };
        let complete = match partial.clone() {
            ExprNode::Ternary {
                cond, then_branch, ..
            } => ExprNode::Ternary {
                cond,
                then_branch,
                else_branch: Some(Box::new(value("redirect", ValueType::Str, true))),
            },
            _ => unreachable!(),
        };
        assert_eq!(partial.code(), "(ok ? \"/\" : null)");
        assert_eq!(complete.code(), "(ok ? \"/\" : redirect)");
        // First branch decides the type.
        assert_eq!(complete.ty(), ValueType::Str);
        // Nullability of a ternary is the conjunction of its branches.
        assert!(!complete.nullable());
    }

    #[test]
    fn test_keyed_lookup_is_pinned_local_and_nullable() {
        let node = ExprNode::KeyedLookup {
            object: Box::new(value("_c.params()", ValueType::Map(
                Box::new(ValueType::Str),
                Box::new(ValueType::Str),
            ), false)),
            key: "name".to_string(),
            ty: ValueType::Str,
        };
        assert!(node.nullable());
        assert!(node.must_be_local());
        assert_eq!(node.code(), "_c.params().get(\"name\")");
    }

    #[test]
    fn test_string_constant_escaping() {
        let node = ExprNode::Constant(ConstValue::Str("a \"b\"\nc".to_string()));
        assert_eq!(node.code(), "\"a \\\"b\\\"\\nc\"");
    }
}
