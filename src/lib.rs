//! # pagec
//!
//! Compiles template documents into the source of a stateless
//! request-handler unit. A document mixes literal markup, `${...}`
//! expressions, directive elements and prefixed tags; one compilation pass
//! scans it character by character and emits a handler class whose
//! `service` body reproduces the document against a request and a response.
//!
//! ## Compilation Invariants
//!
//! 1. **Single pass**: the scanner never backtracks. Premature `<` and
//!    unknown elements replay through the machine as plain text.
//! 2. **Whitespace collapse**: consecutive literal whitespace becomes one
//!    space and carriage returns vanish, in literal text and element text
//!    alike.
//! 3. **Expression caching**: identical expression source within one
//!    document compiles exactly once; nullable results that do not depend
//!    on handler-body locals are hoisted into memoized context accessors
//!    that answer the type's default value instead of failing on null.
//! 4. **Flat scoping**: variable lookup hits a single map; closing a block
//!    only unbinds the names it declared, and only for `LOCAL`/`NONE`
//!    storage.
//! 5. **Immutable sharing**: the type model, tag libraries and resource
//!    loader are read-only once compilation starts, so one [`Compiler`]
//!    serves concurrent compilations.

mod ast;
mod compiler;
mod context;
mod emit;
mod error;
mod functions;
mod operators;
mod parser;
mod scanner;
mod scope;
mod tags;
mod tokenizer;
mod types;

#[cfg(test)]
mod el_tests;
#[cfg(test)]
mod scanner_tests;

pub use compiler::{CompileEnv, Compiler, ResourceLoader};
pub use context::BuildContext;
pub use emit::CompiledUnit;
pub use error::{CompileError, CompileErrorKind};
pub use functions::FunctionSig;
pub use scope::{StorageClass, Variable};
pub use tags::{
    absolute_uri, tag_entry_point, AttrDescriptor, CoreLibrary, DescriptorLibrary, FmtLibrary,
    TagBuilder, TagDescriptor, TagLibrary, FMT_DEFAULT_VAR, LIB_CORE, LIB_FMT, LIB_FN,
};
pub use types::{
    Expression, MethodSig, StaticTypeModel, TypeDesc, TypeKind, TypeModel, ValueType,
};
