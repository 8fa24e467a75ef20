//! Formatting tag library: message bundles and parameterized messages.

use std::collections::HashMap;
use std::sync::Arc;

use crate::context::BuildContext;
use crate::error::CompileError;
use crate::scope::{StorageClass, Variable};
use crate::types::{Expression, ValueType};

use super::{require, TagBuilder, TagLibrary};

/// Binding name used when `setBundle`/`message` name no explicit bundle.
pub const FMT_DEFAULT_VAR: &str = "fmtDefaultVar";

pub struct FmtLibrary;

impl TagLibrary for FmtLibrary {
    fn instantiate(&self, prefix: &str) -> Vec<Arc<dyn TagBuilder>> {
        vec![
            Arc::new(SetBundleTagBuilder {
                path: format!("{}:setBundle", prefix),
            }),
            Arc::new(MessageTagBuilder {
                path: format!("{}:message", prefix),
            }),
            Arc::new(EndMessageTagBuilder {
                path: format!("/{}:message", prefix),
            }),
            Arc::new(MessageParamTagBuilder {
                path: format!("{}:param", prefix),
            }),
        ]
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// setBundle
// ═══════════════════════════════════════════════════════════════════════════

struct SetBundleTagBuilder {
    path: String,
}

impl TagBuilder for SetBundleTagBuilder {
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
        let var_name = attrs
            .get("var")
            .map(String::as_str)
            .unwrap_or(FMT_DEFAULT_VAR)
            .to_string();
        if attrs.contains_key("scope") {
            log::info!("the attribute scope is not supported in {}", self.path);
        }
        let bundle = ctx.declare(Variable::new(
            var_name,
            ValueType::Object("Bundle".to_string()),
            StorageClass::Page,
        ))?;
        // The locale lives in the session, falling back to the request.
        let locale = ctx.declare(Variable::new(
            "locale",
            ValueType::Object("Locale".to_string()),
            StorageClass::Session,
        ))?;
        let basename = ctx.build_expression(require(attrs, "basename", &self.path)?)?;
        ctx.append_line(&format!(
            "{} = $rt.getBundle({}, {});",
            bundle.code, basename.code, locale.code
        ));
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// message
// ═══════════════════════════════════════════════════════════════════════════

struct MessageTagBuilder {
    path: String,
}

impl TagBuilder for MessageTagBuilder {
    fn path(&self) -> &str {
        &self.path
    }

    fn build(
        &self,
        _raw: &str,
        attrs: &HashMap<String, String>,
        ctx: &mut BuildContext,
        standalone: bool,
    ) -> Result<(), CompileError> {
        let key = ctx.build_expression(require(attrs, "key", &self.path)?)?;
        let bundle = match attrs.get("bundle") {
            Some(name) => ctx.get_variable(name)?,
            None => ctx.get_variable(FMT_DEFAULT_VAR).map_err(|_| {
                CompileError::semantic(format!(
                    "{} used before any setBundle and without a bundle attribute",
                    self.path
                ))
            })?,
        };
        if attrs.contains_key("scope") {
            log::info!("the attribute scope is not supported in {}", self.path);
        }

        // With a var attribute the message lands in a context field instead
        // of the response.
        let open = match attrs.get("var") {
            Some(var_name) => {
                let var = ctx.declare(Variable::new(
                    var_name.clone(),
                    ValueType::Str,
                    StorageClass::Page,
                ))?;
                format!("{} = (", var.code)
            }
            None => "_w.write(".to_string(),
        };

        if standalone {
            ctx.append_line(&format!(
                "{}{}.getString({}));",
                open,
                bundle.code,
                key_code(&key)
            ));
        } else {
            // Left open; param builders append arguments and the end
            // builder closes the statement.
            ctx.append_tab();
            ctx.append_raw(&format!(
                "{}$rt.format({}.getString({})",
                open,
                bundle.code,
                key_code(&key)
            ));
            ctx.set_written(false);
        }
        Ok(())
    }
}

struct EndMessageTagBuilder {
    path: String,
}

impl TagBuilder for EndMessageTagBuilder {
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
        ctx.append_raw("));\n");
        Ok(())
    }
}

struct MessageParamTagBuilder {
    path: String,
}

impl TagBuilder for MessageParamTagBuilder {
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
        let value = ctx.build_expression(require(attrs, "value", &self.path)?)?;
        ctx.append_raw(&format!(", {}", value.code));
        ctx.set_written(false);
        Ok(())
    }
}

/// The bundle key must be string-shaped by the time it is looked up.
fn key_code(key: &Expression) -> String {
    if key.ty == ValueType::Str {
        key.code.clone()
    } else {
        format!("String({})", key.code)
    }
}
