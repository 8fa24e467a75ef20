//! Tag builder protocol and the built-in libraries.
//!
//! A tag builder owns one registry path and reacts to an element by writing
//! into the build context: statements, member accessors, variable bindings,
//! or nothing but side effects. Builders are shared immutably; all mutable
//! state lives in the context they are handed.

mod core;
mod fmt;
mod generic;
mod include;

use std::collections::HashMap;
use std::sync::Arc;

use crate::context::BuildContext;
use crate::error::CompileError;
use crate::functions::{library_functions, FunctionSig};

pub use self::core::CoreLibrary;
pub use self::fmt::{FmtLibrary, FMT_DEFAULT_VAR};
pub use self::generic::{tag_entry_point, AttrDescriptor, DescriptorLibrary, TagDescriptor};
pub use self::include::absolute_uri;

/// URI of the flow-control library (`if`, `forEach`, `set`).
pub const LIB_CORE: &str = "lib:core";
/// URI of the formatting library (`setBundle`, `message`, `param`).
pub const LIB_FMT: &str = "lib:fmt";
/// URI of the expression function library.
pub const LIB_FN: &str = "lib:fn";

/// Reaction to one recognized element.
pub trait TagBuilder: Send + Sync {
    /// Registry path, e.g. `c:if` or `%@ page`.
    fn path(&self) -> &str;

    /// Handle the element. `raw` is the collapsed element text, `attrs` its
    /// parsed attributes, `standalone` whether it self-closed.
    fn build(
        &self,
        raw: &str,
        attrs: &HashMap<String, String>,
        ctx: &mut BuildContext,
        standalone: bool,
    ) -> Result<(), CompileError>;
}

/// A named collection of builders importable under a document-chosen prefix.
pub trait TagLibrary: Send + Sync {
    fn instantiate(&self, prefix: &str) -> Vec<Arc<dyn TagBuilder>>;

    /// Expression functions the library contributes, if any.
    fn functions(&self, _prefix: &str) -> Vec<FunctionSig> {
        Vec::new()
    }
}

/// Builders every document gets without importing anything.
pub fn builtin_builders() -> Vec<Arc<dyn TagBuilder>> {
    vec![
        Arc::new(include::PageTagBuilder),
        Arc::new(include::TaglibTagBuilder),
        Arc::new(include::StaticIncludeTagBuilder),
        Arc::new(include::IncludeTagBuilder),
        Arc::new(include::EndIncludeTagBuilder),
        Arc::new(include::ParamTagBuilder),
    ]
}

/// Libraries resolvable by URI without embedder registration.
pub fn builtin_libraries() -> HashMap<String, Arc<dyn TagLibrary>> {
    let mut m: HashMap<String, Arc<dyn TagLibrary>> = HashMap::new();
    m.insert(LIB_CORE.to_string(), Arc::new(CoreLibrary));
    m.insert(LIB_FMT.to_string(), Arc::new(FmtLibrary));
    m.insert(LIB_FN.to_string(), Arc::new(FnLibrary));
    m
}

/// The function library contributes no element builders, only functions.
pub struct FnLibrary;

impl TagLibrary for FnLibrary {
    fn instantiate(&self, _prefix: &str) -> Vec<Arc<dyn TagBuilder>> {
        Vec::new()
    }

    fn functions(&self, prefix: &str) -> Vec<FunctionSig> {
        library_functions(prefix)
    }
}

/// Fetch a required attribute or fail naming the element.
pub(crate) fn require<'a>(
    attrs: &'a HashMap<String, String>,
    name: &str,
    path: &str,
) -> Result<&'a str, CompileError> {
    attrs
        .get(name)
        .map(String::as_str)
        .ok_or_else(|| CompileError::semantic(format!("{} needs a '{}' attribute", path, name)))
}
