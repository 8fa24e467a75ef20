//! Expression parser.
//!
//! A single-pass shunting-yard over the token stream: operands go to the
//! output list, operators wait on a stack ordered by precedence, and the
//! postfix result is reduced into one typed [`ExprNode`]. Method tokens are
//! stack operators with a mutable argument count: a trailing `)` or a comma
//! bumps the count of the call being collected, and a method token not
//! followed by `(` reduces immediately as a property access.

use crate::ast::{ConstValue, ExprNode};
use crate::context::BuildContext;
use crate::error::CompileError;
use crate::functions::FunctionSig;
use crate::operators::{OpToken, OPERATOR_TABLE};
use crate::tokenizer::Tokenizer;
use crate::types::{
    container_member, getter_name, resolve_desc, string_member, MethodSig, TypeModel, ValueType,
};

/// Parse one expression against the variables, functions and type model the
/// context knows about.
pub fn parse_expression(text: &str, ctx: &BuildContext) -> Result<ExprNode, CompileError> {
    let mut tokenizer = Tokenizer::new(text, &ctx.prefixes);
    let mut output: Vec<OutItem> = Vec::new();
    let mut stack: Vec<StackItem> = Vec::new();
    let mut prev = Prev::None;

    while let Some(token) = tokenizer.next_token()? {
        let item = classify(&token, ctx)?;
        // A method token not followed by its argument list is a property.
        if prev == Prev::Method && !matches!(item, Classified::Op(OpToken::LeftParen)) {
            if let Some(StackItem::Method(m)) = stack.pop() {
                output.push(OutItem::Method(m));
            }
        }
        prev = match item {
            Classified::Node(node) => {
                output.push(OutItem::Node(node));
                Prev::Other
            }
            Classified::Method(m) => {
                stack.push(StackItem::Method(m));
                Prev::Method
            }
            Classified::Op(op) => {
                handle_operator(op, &mut stack, &mut output, prev)?;
                if op == OpToken::LeftParen {
                    Prev::LeftParen
                } else {
                    Prev::Other
                }
            }
        };
    }
    while let Some(item) = stack.pop() {
        match item {
            StackItem::Method(m) => output.push(OutItem::Method(m)),
            StackItem::Op(OpToken::LeftParen) => {
                return Err(CompileError::lexical("missing right parenthesis"));
            }
            StackItem::Op(OpToken::LeftBracket) => {
                return Err(CompileError::lexical("missing right bracket"));
            }
            StackItem::Op(op) => output.push(OutItem::Op(op)),
        }
    }
    reduce(output, ctx)
}

enum Classified {
    Node(ExprNode),
    Method(MethodOp),
    Op(OpToken),
}

enum StackItem {
    Op(OpToken),
    Method(MethodOp),
}

enum OutItem {
    Node(ExprNode),
    Op(OpToken),
    Method(MethodOp),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Prev {
    None,
    Method,
    LeftParen,
    Other,
}

fn handle_operator(
    op: OpToken,
    stack: &mut Vec<StackItem>,
    output: &mut Vec<OutItem>,
    prev: Prev,
) -> Result<(), CompileError> {
    match op {
        OpToken::RightParen => {
            pop_until_left_paren(stack, output, true)?;
            // The call the parentheses belonged to, if any.
            if matches!(stack.last(), Some(StackItem::Method(_))) {
                if let Some(StackItem::Method(mut m)) = stack.pop() {
                    if prev != Prev::LeftParen {
                        m.incr();
                    }
                    output.push(OutItem::Method(m));
                }
            }
            Ok(())
        }
        OpToken::RightBracket => {
            loop {
                match stack.pop() {
                    Some(StackItem::Op(OpToken::LeftBracket)) => break,
                    Some(StackItem::Op(inner)) => output.push(OutItem::Op(inner)),
                    Some(StackItem::Method(m)) => output.push(OutItem::Method(m)),
                    None => {
                        return Err(CompileError::lexical("missing left bracket"));
                    }
                }
            }
            output.push(OutItem::Op(OpToken::LeftBracket));
            Ok(())
        }
        OpToken::Comma => {
            pop_until_left_paren(stack, output, false)?;
            // Below the open parenthesis sits the call collecting arguments.
            let below = stack.len().checked_sub(2);
            match below.map(|i| &mut stack[i]) {
                Some(StackItem::Method(m)) => {
                    m.incr();
                    Ok(())
                }
                _ => Err(CompileError::lexical("misplaced comma")),
            }
        }
        OpToken::LeftParen | OpToken::LeftBracket => {
            stack.push(StackItem::Op(op));
            Ok(())
        }
        _ => {
            while let Some(StackItem::Op(top)) = stack.last() {
                if top.precedence() > 0 && top.precedence() <= op.precedence() {
                    if let Some(StackItem::Op(popped)) = stack.pop() {
                        output.push(OutItem::Op(popped));
                    }
                } else {
                    break;
                }
            }
            stack.push(StackItem::Op(op));
            Ok(())
        }
    }
}

fn pop_until_left_paren(
    stack: &mut Vec<StackItem>,
    output: &mut Vec<OutItem>,
    consume: bool,
) -> Result<(), CompileError> {
    loop {
        match stack.last() {
            Some(StackItem::Op(OpToken::LeftParen)) => {
                if consume {
                    stack.pop();
                }
                return Ok(());
            }
            Some(_) => match stack.pop() {
                Some(StackItem::Op(inner)) => output.push(OutItem::Op(inner)),
                Some(StackItem::Method(m)) => output.push(OutItem::Method(m)),
                None => unreachable!(),
            },
            None => {
                return Err(CompileError::lexical("missing left parenthesis"));
            }
        }
    }
}

fn classify(token: &str, ctx: &BuildContext) -> Result<Classified, CompileError> {
    if let Some(op) = OPERATOR_TABLE.get(token) {
        return Ok(Classified::Op(*op));
    }
    if let Some(sig) = ctx.functions.get(token) {
        return Ok(Classified::Method(MethodOp::function(sig.clone())));
    }
    if let Some(name) = token.strip_prefix('.') {
        return Ok(Classified::Method(MethodOp::member(name)));
    }
    let first = token
        .chars()
        .next()
        .ok_or_else(|| CompileError::lexical("empty token"))?;
    if first == '"' || first == '\'' {
        let inner = &token[1..token.len() - 1];
        return Ok(Classified::Node(ExprNode::Constant(ConstValue::Str(
            inner.to_string(),
        ))));
    }
    if first.is_ascii_digit() {
        return parse_number(token).map(Classified::Node);
    }
    match token {
        "true" => return Ok(Classified::Node(ExprNode::Constant(ConstValue::Bool(true)))),
        "false" => {
            return Ok(Classified::Node(ExprNode::Constant(ConstValue::Bool(false))));
        }
        "null" => return Ok(Classified::Node(ExprNode::Constant(ConstValue::Null))),
        _ => {}
    }
    let expr = ctx.get_variable(token)?;
    let local = !expr.code.starts_with("_c.");
    Ok(Classified::Node(ExprNode::Value {
        code: expr.code,
        ty: expr.ty,
        nullable: expr.nullable,
        local,
    }))
}

/// Literal suffixes pick the numeric type: `l` long, `f` float, a decimal
/// point double, otherwise int.
fn parse_number(token: &str) -> Result<ExprNode, CompileError> {
    fn bad(token: &str) -> CompileError {
        CompileError::lexical(format!("invalid number '{}'", token))
    }
    if let Some(body) = token.strip_suffix(['l', 'L']) {
        return Ok(ExprNode::Constant(ConstValue::Long(
            body.parse().map_err(|_| bad(token))?,
        )));
    }
    if let Some(body) = token.strip_suffix(['f', 'F']) {
        return Ok(ExprNode::Constant(ConstValue::Float(
            body.parse().map_err(|_| bad(token))?,
        )));
    }
    if token.contains('.') {
        return Ok(ExprNode::Constant(ConstValue::Double(
            token.parse().map_err(|_| bad(token))?,
        )));
    }
    Ok(ExprNode::Constant(ConstValue::Int(
        token.parse().map_err(|_| bad(token))?,
    )))
}

fn reduce(output: Vec<OutItem>, ctx: &BuildContext) -> Result<ExprNode, CompileError> {
    let mut nodes: Vec<ExprNode> = Vec::new();
    for item in output {
        match item {
            OutItem::Node(node) => nodes.push(node),
            OutItem::Op(op) => {
                let node = build_operator(op, &mut nodes, ctx)?;
                nodes.push(node);
            }
            OutItem::Method(m) => {
                let argc = m.argc;
                let args = pop_args(&mut nodes, argc)?;
                nodes.push(m.build(args, ctx)?);
            }
        }
    }
    if nodes.len() != 1 {
        return Err(CompileError::lexical("cannot parse expression"));
    }
    let node = nodes
        .pop()
        .ok_or_else(|| CompileError::lexical("cannot parse expression"))?;
    if matches!(
        node,
        ExprNode::Ternary {
            else_branch: None,
            ..
        }
    ) {
        return Err(CompileError::semantic("conditional without ':'"));
    }
    Ok(node)
}

/// Pop `argc` operands; index 0 is the most recently pushed.
fn pop_args(nodes: &mut Vec<ExprNode>, argc: usize) -> Result<Vec<ExprNode>, CompileError> {
    if nodes.len() < argc {
        return Err(CompileError::lexical("cannot parse expression"));
    }
    let mut args = Vec::with_capacity(argc);
    for _ in 0..argc {
        if let Some(node) = nodes.pop() {
            args.push(node);
        }
    }
    Ok(args)
}

fn build_operator(
    op: OpToken,
    nodes: &mut Vec<ExprNode>,
    ctx: &BuildContext,
) -> Result<ExprNode, CompileError> {
    match op {
        OpToken::Not => {
            let mut args = pop_args(nodes, 1)?;
            let operand = args
                .pop()
                .ok_or_else(|| CompileError::lexical("cannot parse expression"))?;
            Ok(ExprNode::Not {
                operand: Box::new(operand),
            })
        }
        OpToken::Bin(bin) => {
            let mut args = pop_args(nodes, 2)?;
            let rhs = args.remove(0);
            let lhs = args.remove(0);
            bin.build(lhs, rhs, ctx.model())
        }
        OpToken::Cond => {
            let mut args = pop_args(nodes, 2)?;
            let then_branch = args.remove(0);
            let cond = args.remove(0);
            Ok(ExprNode::Ternary {
                cond: Box::new(cond),
                then_branch: Box::new(then_branch),
                else_branch: None,
            })
        }
        OpToken::Tuple => {
            let mut args = pop_args(nodes, 2)?;
            let else_branch = args.remove(0);
            match args.remove(0) {
                ExprNode::Ternary {
                    cond,
                    then_branch,
                    else_branch: None,
                } => Ok(ExprNode::Ternary {
                    cond,
                    then_branch,
                    else_branch: Some(Box::new(else_branch)),
                }),
                _ => Err(CompileError::semantic("misplaced ':'")),
            }
        }
        OpToken::LeftBracket => {
            let mut args = pop_args(nodes, 2)?;
            let index = args.remove(0);
            let object = args.remove(0);
            let ty = object.ty().element_type();
            Ok(ExprNode::Index {
                object: Box::new(object),
                index: Box::new(index),
                ty,
            })
        }
        _ => Err(CompileError::lexical("cannot parse expression")),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Method resolution
// ═══════════════════════════════════════════════════════════════════════════

/// A call being collected on the operator stack. The argument count includes
/// the receiver for member calls and only the declared arguments for library
/// functions.
struct MethodOp {
    name: String,
    argc: usize,
    function: Option<FunctionSig>,
}

impl MethodOp {
    fn member(name: &str) -> Self {
        MethodOp {
            name: name.to_string(),
            argc: 1,
            function: None,
        }
    }

    fn function(sig: FunctionSig) -> Self {
        MethodOp {
            name: sig.token.clone(),
            argc: 0,
            function: Some(sig),
        }
    }

    fn incr(&mut self) {
        self.argc += 1;
    }

    /// Reduce the collected call. `args` arrive most-recent-first.
    fn build(self, mut args: Vec<ExprNode>, ctx: &BuildContext) -> Result<ExprNode, CompileError> {
        if let Some(sig) = self.function {
            args.reverse();
            if args.len() != sig.params.len() {
                return Err(CompileError::semantic(format!(
                    "function {} expects {} arguments, got {}",
                    sig.token,
                    sig.params.len(),
                    args.len()
                )));
            }
            let coerced = check_params(&sig.params, args, ctx.model()).ok_or_else(|| {
                CompileError::semantic(format!("bad argument types for function {}", sig.token))
            })?;
            return Ok(ExprNode::MethodCall {
                target: None,
                name: sig.target,
                args: coerced,
                ret: sig.ret,
                ret_nullable: sig.ret_nullable,
            });
        }

        if self.argc == 0 || args.len() < self.argc {
            return Err(CompileError::lexical("cannot parse expression"));
        }
        let receiver = args.remove(self.argc - 1);
        args.reverse();
        let fargs = args;
        let ty = receiver.ty();

        if let Some((sig, coerced)) = find_member(&ty, &self.name, fargs.clone(), ctx.model()) {
            return Ok(ExprNode::MethodCall {
                target: Some(Box::new(receiver)),
                name: sig.name,
                args: coerced,
                ret: sig.ret,
                ret_nullable: sig.ret_nullable,
            });
        }
        // A map-like receiver degrades to a keyed lookup by member name.
        if fargs.is_empty() && ty.is_map_like() {
            let value_ty = ty.element_type();
            return Ok(ExprNode::KeyedLookup {
                object: Box::new(receiver),
                key: self.name,
                ty: value_ty,
            });
        }
        Err(CompileError::semantic(format!(
            "cannot resolve member '{}' on type {}",
            self.name, ty
        )))
    }
}

/// Resolve a member against the type model and the built-in string and
/// container members. Accessor spellings are tried in order: the exact
/// name, then `getX`, `isX` and `setX`.
fn find_member(
    ty: &ValueType,
    name: &str,
    args: Vec<ExprNode>,
    model: &dyn TypeModel,
) -> Option<(MethodSig, Vec<ExprNode>)> {
    if *ty == ValueType::Str {
        let sig = string_member(name, args.len())?;
        let coerced = check_params(&sig.params, args, model)?;
        return Some((sig, coerced));
    }
    if let Some(sig) = container_member(ty, name, args.len()) {
        if let Some(coerced) = check_params(&sig.params, args.clone(), model) {
            return Some((sig, coerced));
        }
    }
    let type_name = match ty {
        ValueType::Object(n) | ValueType::Enum(n) => n,
        _ => return None,
    };
    let desc = resolve_desc(model, type_name)?;
    let spellings = [
        name.to_string(),
        getter_name("get", name),
        getter_name("is", name),
        getter_name("set", name),
    ];
    for spelling in &spellings {
        for sig in desc
            .methods
            .iter()
            .filter(|m| &m.name == spelling && m.params.len() == args.len())
        {
            if let Some(coerced) = check_params(&sig.params, args.clone(), model) {
                return Some((sig.clone(), coerced));
            }
        }
    }
    None
}

/// Check argument assignability, producing the coerced argument list.
/// Numeric types are mutually assignable; a string constant narrows into a
/// known constant of an enum-typed parameter.
fn check_params(
    params: &[ValueType],
    args: Vec<ExprNode>,
    model: &dyn TypeModel,
) -> Option<Vec<ExprNode>> {
    let mut coerced = Vec::with_capacity(args.len());
    for (param, arg) in params.iter().zip(args.into_iter()) {
        let arg_ty = arg.ty();
        if arg.is_null_constant()
            || *param == arg_ty
            || *param == ValueType::Any
            || arg_ty == ValueType::Any
            || (param.is_numeric() && arg_ty.is_numeric())
        {
            coerced.push(arg);
            continue;
        }
        if let (ValueType::Enum(type_name), ExprNode::Constant(ConstValue::Str(text))) =
            (param, &arg)
        {
            match resolve_desc(model, type_name) {
                Some(desc) if desc.has_constant(text) => {
                    coerced.push(ExprNode::Constant(ConstValue::EnumConst {
                        type_name: type_name.clone(),
                        constant: text.clone(),
                    }));
                    continue;
                }
                _ => return None,
            }
        }
        return None;
    }
    Some(coerced)
}
