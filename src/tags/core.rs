//! Flow-control tag library: conditional blocks, iteration and assignment.

use std::collections::HashMap;
use std::sync::Arc;

use crate::context::BuildContext;
use crate::error::CompileError;
use crate::scope::{StorageClass, Variable};
use crate::types::{Expression, ValueType};

use super::{require, TagBuilder, TagLibrary};

pub struct CoreLibrary;

impl TagLibrary for CoreLibrary {
    fn instantiate(&self, prefix: &str) -> Vec<Arc<dyn TagBuilder>> {
        vec![
            Arc::new(IfTagBuilder {
                path: format!("{}:if", prefix),
            }),
            Arc::new(EndBlockTagBuilder {
                path: format!("/{}:if", prefix),
                blocks: 1,
            }),
            Arc::new(ForEachTagBuilder {
                path: format!("{}:forEach", prefix),
            }),
            Arc::new(EndBlockTagBuilder {
                path: format!("/{}:forEach", prefix),
                blocks: 2,
            }),
            Arc::new(SetTagBuilder {
                path: format!("{}:set", prefix),
            }),
        ]
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// if
// ═══════════════════════════════════════════════════════════════════════════

struct IfTagBuilder {
    path: String,
}

impl TagBuilder for IfTagBuilder {
    fn path(&self) -> &str {
        &self.path
    }

    fn build(
        &self,
        _raw: &str,
        attrs: &HashMap<String, String>,
        ctx: &mut BuildContext,
        _standalone: bool,
    ) -> Result<(), CompileError> {
        let test = ctx.build_expression(require(attrs, "test", &self.path)?)?;
        // A non-boolean test degrades to a presence check.
        let condition = if test.ty == ValueType::Bool {
            test.code
        } else {
            format!("{} != null", test.code)
        };
        match attrs.get("var") {
            Some(var_name) => {
                let var = ctx.declare(Variable::new(
                    var_name.clone(),
                    ValueType::Bool,
                    StorageClass::Local,
                ))?;
                ctx.append_line(&format!("{} = {};", var.code, condition));
                ctx.append_line(&format!("if ({}) {{", var.code));
            }
            None => ctx.append_line(&format!("if ({}) {{", condition)),
        }
        ctx.incr_tab();
        Ok(())
    }
}

/// Closes the block(s) its opening builder left open.
struct EndBlockTagBuilder {
    path: String,
    blocks: usize,
}

impl TagBuilder for EndBlockTagBuilder {
    fn path(&self) -> &str {
        &self.path
    }

    fn build(
        &self,
        _raw: &str,
        _attrs: &HashMap<String, String>,
        ctx: &mut BuildContext,
        _standalone: bool,
    ) -> Result<(), CompileError> {
        for _ in 0..self.blocks {
            ctx.decr_tab();
            ctx.append_line("}");
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// forEach
// ═══════════════════════════════════════════════════════════════════════════

struct ForEachTagBuilder {
    path: String,
}

impl TagBuilder for ForEachTagBuilder {
    fn path(&self) -> &str {
        &self.path
    }

    fn build(
        &self,
        _raw: &str,
        attrs: &HashMap<String, String>,
        ctx: &mut BuildContext,
        _standalone: bool,
    ) -> Result<(), CompileError> {
        let items = match attrs.get("items") {
            Some(text) => Some(ctx.build_expression(text)?),
            None => None,
        };
        let begin = int_attr(attrs, "begin", ctx)?;
        let end = int_attr(attrs, "end", ctx)?;
        let step = int_attr(attrs, "step", ctx)?;
        let status_name = attrs.get("varStatus").cloned();

        match items {
            Some(items) => {
                let var_name = require(attrs, "var", &self.path)?.to_string();
                self.build_items(ctx, items, &var_name, status_name, begin, end, step)
            }
            None => {
                let (Some(begin), Some(end)) = (begin, end) else {
                    return Err(CompileError::semantic(format!(
                        "{} needs either items or begin and end",
                        self.path
                    )));
                };
                self.build_range(ctx, attrs.get("var").cloned(), status_name, begin, end, step)
            }
        }
    }
}

impl ForEachTagBuilder {
    /// Collection form. Indexed containers loop by index honoring begin and
    /// end; any other iterable walks its elements and ignores the slicing
    /// attributes.
    #[allow(clippy::too_many_arguments)]
    fn build_items(
        &self,
        ctx: &mut BuildContext,
        items: Expression,
        var_name: &str,
        status_name: Option<String>,
        begin: Option<String>,
        end: Option<String>,
        step: Option<String>,
    ) -> Result<(), CompileError> {
        let item_ty = items.ty.element_type();
        ctx.append_line(&format!("if ({} != null) {{", items.code));
        ctx.incr_tab();

        let status = match &status_name {
            Some(name) => {
                let expr = ctx.declare(Variable::new(
                    name.clone(),
                    ValueType::Object("LoopStatus".to_string()),
                    StorageClass::Local,
                ))?;
                ctx.append_line(&format!("{} = new $rt.LoopStatus();", expr.code));
                ctx.append_line(&format!(
                    "{}.setCount($rt.length({}));",
                    expr.code, items.code
                ));
                if let Some(begin) = &begin {
                    ctx.append_line(&format!("{}.setBegin({});", expr.code, begin));
                }
                if let Some(end) = &end {
                    ctx.append_line(&format!("{}.setEnd({});", expr.code, end));
                }
                if let Some(step) = &step {
                    ctx.append_line(&format!("{}.setStep({});", expr.code, step));
                }
                Some(expr.code)
            }
            None => None,
        };

        if items.ty.is_indexed() {
            let list = ctx.anonymous_name();
            let ivar = ctx.anonymous_name();
            let evar = ctx.anonymous_name();
            ctx.append_line(&format!("const {} = {};", list, items.code));
            ctx.append_line(&format!(
                "for (let {} = {}, {} = {}; {} < {}; {}++) {{",
                ivar,
                begin.as_deref().unwrap_or("0"),
                evar,
                match &end {
                    Some(end) => format!("{} + 1", end),
                    None => format!("{}.length", list),
                },
                ivar,
                evar,
                ivar
            ));
            ctx.incr_tab();
            ctx.declare(Variable::new(var_name, item_ty, StorageClass::None))?;
            ctx.append_line(&format!("const {} = {}[{}];", var_name, list, ivar));
        } else {
            ctx.append_line(&format!("for (const {} of {}) {{", var_name, items.code));
            ctx.incr_tab();
            ctx.declare(Variable::new(var_name, item_ty, StorageClass::None))?;
        }

        if let Some(status) = status {
            ctx.append_line(&format!("{}.setCurrent({});", status, var_name));
            ctx.append_line(&format!("{}.setIndex({}.getIndex() + 1);", status, status));
            ctx.append_line(&format!("{}.setFirst({}.getIndex() == 1);", status, status));
            ctx.append_line(&format!(
                "{}.setLast({}.getIndex() == {}.getCount());",
                status, status, status
            ));
        }
        Ok(())
    }

    /// Range form: inclusive bounds, optional step.
    fn build_range(
        &self,
        ctx: &mut BuildContext,
        var_name: Option<String>,
        status_name: Option<String>,
        begin: String,
        end: String,
        step: Option<String>,
    ) -> Result<(), CompileError> {
        let status = match &status_name {
            Some(name) => {
                let expr = ctx.declare(Variable::new(
                    name.clone(),
                    ValueType::Object("LoopStatus".to_string()),
                    StorageClass::Local,
                ))?;
                ctx.append_line(&format!("{} = new $rt.LoopStatus();", expr.code));
                ctx.append_line(&format!("{}.setBegin({});", expr.code, begin));
                ctx.append_line(&format!("{}.setEnd({});", expr.code, end));
                if let Some(step) = &step {
                    ctx.append_line(&format!("{}.setStep({});", expr.code, step));
                }
                Some(expr.code)
            }
            None => None,
        };
        let ivar = ctx.anonymous_name();
        let evar = ctx.anonymous_name();
        let svar = ctx.anonymous_name();
        ctx.append_line(&format!(
            "for (let {} = {}, {} = {}, {} = {}; {} <= {}; {} += {}) {{",
            ivar,
            begin,
            evar,
            end,
            svar,
            step.as_deref().unwrap_or("1"),
            ivar,
            evar,
            ivar,
            svar
        ));
        ctx.incr_tab();
        ctx.append_line("{");
        ctx.incr_tab();
        if let Some(name) = &var_name {
            ctx.declare(Variable::new(name.clone(), ValueType::Int, StorageClass::None))?;
            ctx.append_line(&format!("const {} = {};", name, ivar));
        }
        if let Some(status) = status {
            ctx.append_line(&format!("{}.setIndex({});", status, ivar));
            ctx.append_line(&format!(
                "{}.setFirst({} == {}.getBegin());",
                status, ivar, status
            ));
            ctx.append_line(&format!(
                "{}.setLast({} + {} > {});",
                status, ivar, svar, evar
            ));
        }
        Ok(())
    }
}

/// Slicing attributes accept numbers or numeric strings; a string-typed
/// expression is parsed at handling time.
fn int_attr(
    attrs: &HashMap<String, String>,
    name: &str,
    ctx: &mut BuildContext,
) -> Result<Option<String>, CompileError> {
    let Some(text) = attrs.get(name) else {
        return Ok(None);
    };
    let expr = ctx.build_expression(text)?;
    if expr.ty == ValueType::Str {
        Ok(Some(format!("parseInt({})", expr.code)))
    } else {
        Ok(Some(expr.code))
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// set
// ═══════════════════════════════════════════════════════════════════════════

struct SetTagBuilder {
    path: String,
}

impl TagBuilder for SetTagBuilder {
    fn path(&self) -> &str {
        &self.path
    }

    fn build(
        &self,
        _raw: &str,
        attrs: &HashMap<String, String>,
        ctx: &mut BuildContext,
        _standalone: bool,
    ) -> Result<(), CompileError> {
        let var_name = require(attrs, "var", &self.path)?.to_string();
        let value = ctx.build_expression(require(attrs, "value", &self.path)?)?;
        let scope = attrs
            .get("scope")
            .map(|s| s.to_lowercase())
            .unwrap_or_else(|| "page".to_string());
        match scope.as_str() {
            "page" => {
                let expr = ctx.declare(Variable::new(
                    var_name.clone(),
                    value.ty.clone(),
                    StorageClass::Local,
                ))?;
                ctx.append_line(&format!("{} = {};", expr.code, value.code));
            }
            "request" => {
                ctx.append_line(&format!(
                    "_c._r.setAttribute(\"{}\", {});",
                    var_name, value.code
                ));
            }
            "session" => {
                ctx.append_line(&format!(
                    "_c._r.getSession().setAttribute(\"{}\", {});",
                    var_name, value.code
                ));
            }
            "application" => {
                ctx.append_line(&format!(
                    "_c._r.getApplication().setAttribute(\"{}\", {});",
                    var_name, value.code
                ));
            }
            other => {
                return Err(CompileError::semantic(format!(
                    "unknown scope '{}' in {}",
                    other, self.path
                )));
            }
        }
        Ok(())
    }
}
