//! Descriptor-driven tags.
//!
//! Third-party tags are described, not coded: a [`TagDescriptor`] names the
//! implementing type, its settable attributes and whether the tag takes a
//! body. The generic builder instantiates the type, applies the attributes
//! through their setters and either runs the tag in place or defers its
//! body into a fragment that runs when the tag asks for it.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::context::BuildContext;
use crate::error::CompileError;
use crate::types::{resolve_desc, ValueType};

use super::{TagBuilder, TagLibrary};

/// One settable attribute of a described tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttrDescriptor {
    pub name: String,
    /// Setter invoked on the tag instance.
    pub setter: String,
}

/// Description of a tag the compiler knows nothing else about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagDescriptor {
    /// Tag name without prefix, e.g. `box`.
    pub name: String,
    /// Implementing type, resolvable in the type model.
    pub type_name: String,
    pub attributes: Vec<AttrDescriptor>,
    pub body: bool,
}

/// A library assembled from descriptors, typically read from an external
/// catalog by the embedder.
pub struct DescriptorLibrary {
    descriptors: Vec<TagDescriptor>,
}

impl DescriptorLibrary {
    pub fn new(descriptors: Vec<TagDescriptor>) -> Self {
        DescriptorLibrary { descriptors }
    }
}

impl TagLibrary for DescriptorLibrary {
    fn instantiate(&self, prefix: &str) -> Vec<Arc<dyn TagBuilder>> {
        let mut builders: Vec<Arc<dyn TagBuilder>> = Vec::new();
        for desc in &self.descriptors {
            let path = format!("{}:{}", prefix, desc.name);
            if desc.body {
                builders.push(Arc::new(GenericEndTagBuilder {
                    path: format!("/{}", path),
                }));
            }
            builders.push(Arc::new(GenericTagBuilder {
                path,
                desc: desc.clone(),
            }));
        }
        builders
    }
}

struct GenericTagBuilder {
    path: String,
    desc: TagDescriptor,
}

impl TagBuilder for GenericTagBuilder {
    fn path(&self) -> &str {
        &self.path
    }

    fn build(
        &self,
        raw: &str,
        attrs: &HashMap<String, String>,
        ctx: &mut BuildContext,
        standalone: bool,
    ) -> Result<(), CompileError> {
        // The implementing type must be described and expose the tag entry
        // point; otherwise the tag degrades to a warning.
        let usable = resolve_desc(ctx.model(), &self.desc.type_name)
            .map(|d| d.methods.iter().any(|m| m.name == "doTag"))
            .unwrap_or(false);
        if !usable {
            log::warn!("the tag {} is not supported yet", self.path);
            return Ok(());
        }
        let var = ctx.anonymous_name();
        ctx.append_line(&format!("const {} = new {}();", var, self.desc.type_name));
        self.apply_attributes(raw, attrs, ctx, &var)?;
        if self.desc.body && !standalone {
            ctx.append_line(&format!("{}.setContext(_c);", var));
            ctx.append_line(&format!("{}.setBody(new f{}(_c));", var, var));
            ctx.push_fragment(&var);
        } else {
            write_tag(ctx, &var);
        }
        Ok(())
    }
}

impl GenericTagBuilder {
    fn apply_attributes(
        &self,
        raw: &str,
        attrs: &HashMap<String, String>,
        ctx: &mut BuildContext,
        var: &str,
    ) -> Result<(), CompileError> {
        // Sorted so the generated source is stable across runs.
        let mut keys: Vec<&String> = attrs.keys().collect();
        keys.sort();
        for key in keys {
            let value = &attrs[key];
            match self.desc.attributes.iter().find(|a| &a.name == key) {
                Some(attr) => {
                    let expr = ctx.build_expression(value)?;
                    ctx.append_line(&format!("{}.{}({});", var, attr.setter, expr.code));
                }
                None => {
                    log::warn!("property {} does not exist in {} see {}", key, self.path, raw);
                }
            }
        }
        Ok(())
    }
}

struct GenericEndTagBuilder {
    path: String,
}

impl TagBuilder for GenericEndTagBuilder {
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
        let var = ctx.pop_fragment().ok_or_else(|| {
            CompileError::semantic(format!("{} without a matching opening tag", self.path))
        })?;
        write_tag(ctx, &var);
        Ok(())
    }
}

fn write_tag(ctx: &mut BuildContext, var: &str) {
    ctx.append_line(&format!("{}.setContext(_c);", var));
    ctx.append_line(&format!("{}.doTag();", var));
}

/// Marker signature embedders give a described tag type so the generic
/// builder accepts it.
pub fn tag_entry_point() -> crate::types::MethodSig {
    crate::types::MethodSig::new("doTag", vec![], ValueType::Void)
}
