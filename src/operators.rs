//! Operator table of the expression language.
//!
//! Operators are keyed by spelling in a process-wide table; word aliases
//! (`and`, `eq`, `not`, ...) share an entry with their symbolic form. Each
//! operator knows its precedence and how to build a typed node from the
//! operands popped during postfix reduction.

use std::collections::HashMap;

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};

use crate::ast::{ConstValue, ExprNode};
use crate::error::CompileError;
use crate::types::{resolve_desc, TypeModel, ValueType};

/// Binary operators, both arithmetic and logical/relational.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    Mult,
    Div,
    Mod,
    Plus,
    Minus,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

impl BinOp {
    pub fn precedence(&self) -> u8 {
        match self {
            BinOp::Mult | BinOp::Div | BinOp::Mod => 3,
            BinOp::Plus | BinOp::Minus => 4,
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => 6,
            BinOp::Eq | BinOp::Ne => 7,
            BinOp::And => 11,
            BinOp::Or => 12,
        }
    }

    pub fn is_arithmetic(&self) -> bool {
        matches!(
            self,
            BinOp::Mult | BinOp::Div | BinOp::Mod | BinOp::Plus | BinOp::Minus
        )
    }

    fn symbol(&self) -> &'static str {
        match self {
            BinOp::Mult => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::Plus => "+",
            BinOp::Minus => "-",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::And => "&&",
            BinOp::Or => "||",
        }
    }

    pub fn render(&self, lhs: &str, rhs: &str) -> String {
        format!("({} {} {})", lhs, self.symbol(), rhs)
    }

    /// Build the typed node for `lhs op rhs`. Arithmetic results widen to the
    /// higher-priority numeric operand type; everything else is boolean.
    /// Equality against an enum-typed operand narrows a string constant on
    /// the other side into an enum constant, producing a new node.
    pub fn build(
        &self,
        lhs: ExprNode,
        rhs: ExprNode,
        model: &dyn TypeModel,
    ) -> Result<ExprNode, CompileError> {
        let (lhs, rhs) = if matches!(self, BinOp::Eq | BinOp::Ne) {
            let rhs2 = narrow_to_enum(&lhs.ty(), rhs, model)?;
            let lhs2 = narrow_to_enum(&rhs2.ty(), lhs, model)?;
            (lhs2, rhs2)
        } else {
            (lhs, rhs)
        };
        let ty = if self.is_arithmetic() {
            ValueType::wider(&lhs.ty(), &rhs.ty())
        } else {
            ValueType::Bool
        };
        Ok(ExprNode::Binary {
            op: *self,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
            ty,
        })
    }
}

/// When `other` is an enum type, promote a string constant into one of its
/// constants. Unknown constant names are a compile failure.
fn narrow_to_enum(
    other: &ValueType,
    node: ExprNode,
    model: &dyn TypeModel,
) -> Result<ExprNode, CompileError> {
    let ValueType::Enum(type_name) = other else {
        return Ok(node);
    };
    let ExprNode::Constant(ConstValue::Str(text)) = &node else {
        return Ok(node);
    };
    match resolve_desc(model, type_name) {
        Some(desc) if desc.has_constant(text) => Ok(ExprNode::Constant(ConstValue::EnumConst {
            type_name: type_name.clone(),
            constant: text.clone(),
        })),
        Some(_) => Err(CompileError::semantic(format!(
            "'{}' is not a constant of {}",
            text, type_name
        ))),
        None => Err(CompileError::semantic(format!(
            "unknown enum type {}",
            type_name
        ))),
    }
}

/// A lexical operator token recognized by the tokenizer and driven through
/// the shunting-yard stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpToken {
    Bin(BinOp),
    Not,
    /// `?`, opening a conditional.
    Cond,
    /// `:`, completing a conditional.
    Tuple,
    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,
    Comma,
}

impl OpToken {
    /// Stack precedence. Group openers rank 0 so nothing pops across them.
    pub fn precedence(&self) -> u8 {
        match self {
            OpToken::Bin(op) => op.precedence(),
            OpToken::Not => 2,
            OpToken::Cond => 13,
            OpToken::Tuple => 14,
            _ => 0,
        }
    }
}

lazy_static! {
    /// Spelling table, including word aliases.
    pub static ref OPERATOR_TABLE: HashMap<&'static str, OpToken> = {
        let mut m = HashMap::new();
        m.insert("*", OpToken::Bin(BinOp::Mult));
        m.insert("/", OpToken::Bin(BinOp::Div));
        m.insert("%", OpToken::Bin(BinOp::Mod));
        m.insert("mod", OpToken::Bin(BinOp::Mod));
        m.insert("+", OpToken::Bin(BinOp::Plus));
        m.insert("-", OpToken::Bin(BinOp::Minus));
        m.insert("<", OpToken::Bin(BinOp::Lt));
        m.insert("lt", OpToken::Bin(BinOp::Lt));
        m.insert("<=", OpToken::Bin(BinOp::Le));
        m.insert("le", OpToken::Bin(BinOp::Le));
        m.insert(">", OpToken::Bin(BinOp::Gt));
        m.insert("gt", OpToken::Bin(BinOp::Gt));
        m.insert(">=", OpToken::Bin(BinOp::Ge));
        m.insert("ge", OpToken::Bin(BinOp::Ge));
        m.insert("==", OpToken::Bin(BinOp::Eq));
        m.insert("eq", OpToken::Bin(BinOp::Eq));
        m.insert("!=", OpToken::Bin(BinOp::Ne));
        m.insert("ne", OpToken::Bin(BinOp::Ne));
        m.insert("&&", OpToken::Bin(BinOp::And));
        m.insert("and", OpToken::Bin(BinOp::And));
        m.insert("||", OpToken::Bin(BinOp::Or));
        m.insert("or", OpToken::Bin(BinOp::Or));
        m.insert("!", OpToken::Not);
        m.insert("not", OpToken::Not);
        m.insert("?", OpToken::Cond);
        m.insert(":", OpToken::Tuple);
        m.insert("(", OpToken::LeftParen);
        m.insert(")", OpToken::RightParen);
        m.insert("[", OpToken::LeftBracket);
        m.insert("]", OpToken::RightBracket);
        m.insert(",", OpToken::Comma);
        m
    };
}

/// Characters that terminate an identifier run and may start an operator.
pub fn is_operator_char(ch: char) -> bool {
    matches!(
        ch,
        '!' | '%' | '&' | '(' | ')' | '*' | '+' | '-' | ',' | '/' | ':' | '<' | '=' | '>' | '?'
            | '[' | ']' | '^' | '|' | '~'
    ) || ch.is_whitespace()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StaticTypeModel;

    fn int_const(v: i64) -> ExprNode {
        ExprNode::Constant(ConstValue::Int(v))
    }

    #[test]
    fn test_word_aliases_share_entries() {
        assert_eq!(OPERATOR_TABLE["eq"], OPERATOR_TABLE["=="]);
        assert_eq!(OPERATOR_TABLE["and"], OPERATOR_TABLE["&&"]);
        assert_eq!(OPERATOR_TABLE["not"], OPERATOR_TABLE["!"]);
    }

    #[test]
    fn test_arithmetic_widens_to_double() {
        let model = StaticTypeModel::new();
        let node = BinOp::Plus
            .build(
                int_const(1),
                ExprNode::Constant(ConstValue::Double(2.5)),
                &model,
            )
            .unwrap();
        assert_eq!(node.ty(), ValueType::Double);
        assert_eq!(node.code(), "(1 + 2.5)");
    }

    #[test]
    fn test_comparison_is_boolean() {
        let model = StaticTypeModel::new();
        let node = BinOp::Lt.build(int_const(1), int_const(2), &model).unwrap();
        assert_eq!(node.ty(), ValueType::Bool);
    }

    #[test]
    fn test_equality_narrows_string_constant_to_enum() {
        use crate::types::TypeDesc;
        let model =
            StaticTypeModel::new().with_type(TypeDesc::enumeration("Color", vec!["RED", "BLUE"]));
        let lhs = ExprNode::Value {
            code: "c".to_string(),
            ty: ValueType::Enum("Color".to_string()),
            nullable: true,
            local: true,
        };
        let rhs = ExprNode::Constant(ConstValue::Str("RED".to_string()));
        let node = BinOp::Eq.build(lhs, rhs, &model).unwrap();
        match node {
            ExprNode::Binary { rhs, .. } => {
                assert_eq!(
                    *rhs,
                    ExprNode::Constant(ConstValue::EnumConst {
                        type_name: "Color".to_string(),
                        constant: "RED".to_string(),
                    })
                );
            }
            _ => panic!("expected binary node"),
        }
    }

    #[test]
    fn test_unknown_enum_constant_fails() {
        use crate::types::TypeDesc;
        let model =
            StaticTypeModel::new().with_type(TypeDesc::enumeration("Color", vec!["RED", "BLUE"]));
        let lhs = ExprNode::Value {
            code: "c".to_string(),
            ty: ValueType::Enum("Color".to_string()),
            nullable: true,
            local: true,
        };
        let rhs = ExprNode::Constant(ConstValue::Str("GREEN".to_string()));
        assert!(BinOp::Eq.build(lhs, rhs, &model).is_err());
    }
}
