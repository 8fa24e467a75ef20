//! Scoped variable registry.
//!
//! Bindings live in a single flat map so lookup never walks a chain; the
//! scope stack only remembers which names to drop when a block closes.
//! Variables bound to a storage class other than `Local`/`None` survive
//! scope exits, mirroring their lifetime in the handled request.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::CompileError;
use crate::types::{Expression, ValueType};

/// Where a declared variable lives at handling time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StorageClass {
    /// A plain local of the handler body.
    Local,
    /// A field of the handling context, addressed as `_c.<name>`.
    Page,
    /// Read lazily from the request attribute map.
    Request,
    /// Read lazily from the session attribute map.
    Session,
    /// Read lazily from the application attribute map.
    Application,
    /// Obtained from the application's managed-instance lookup.
    Bean,
    /// Registered under a name but substituted verbatim, no declaration.
    None,
}

impl StorageClass {
    /// Parse the storage token of a variable directive, accepting an
    /// `_EAGER` suffix that forces the first read at declaration.
    pub fn parse(token: &str) -> Result<(StorageClass, bool), CompileError> {
        let (base, eager) = match token.strip_suffix("_EAGER") {
            Some(base) => (base, true),
            None => (token, false),
        };
        let storage = match base {
            "LOCAL" => StorageClass::Local,
            "PAGE" => StorageClass::Page,
            "REQUEST" => StorageClass::Request,
            "SESSION" => StorageClass::Session,
            "APPLICATION" => StorageClass::Application,
            "BEAN" => StorageClass::Bean,
            "NONE" => StorageClass::None,
            other => {
                return Err(CompileError::semantic(format!(
                    "unknown storage class '{}'",
                    other
                )));
            }
        };
        Ok((storage, eager))
    }

    /// Lazily read storage classes hand out a context getter instead of a
    /// direct name.
    pub fn is_lazy(&self) -> bool {
        matches!(
            self,
            StorageClass::Request | StorageClass::Session | StorageClass::Application | StorageClass::Bean
        )
    }

    /// Whether the binding is dropped when its declaring scope closes.
    pub fn is_scoped(&self) -> bool {
        matches!(self, StorageClass::Local | StorageClass::None)
    }
}

/// A declared variable before it is turned into a binding expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub ty: ValueType,
    pub storage: StorageClass,
    pub eager: bool,
}

impl Variable {
    pub fn new(name: impl Into<String>, ty: ValueType, storage: StorageClass) -> Self {
        Variable {
            name: name.into(),
            ty,
            storage,
            eager: false,
        }
    }

    pub fn eager(mut self) -> Self {
        self.eager = true;
        self
    }
}

/// Flat binding map plus the per-block name lists used to undo it.
#[derive(Debug, Default)]
pub struct ScopeStack {
    bindings: HashMap<String, Expression>,
    frames: Vec<Vec<String>>,
}

impl ScopeStack {
    pub fn new() -> Self {
        ScopeStack {
            bindings: HashMap::new(),
            frames: vec![Vec::new()],
        }
    }

    pub fn get(&self, name: &str) -> Option<&Expression> {
        self.bindings.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    /// Bind a name. Scoped bindings are recorded in the current frame so
    /// they disappear when the frame pops; others persist.
    pub fn insert(&mut self, name: &str, expr: Expression, scoped: bool) {
        if scoped {
            if let Some(frame) = self.frames.last_mut() {
                frame.push(name.to_string());
            }
        }
        self.bindings.insert(name.to_string(), expr);
    }

    pub fn push(&mut self) {
        self.frames.push(Vec::new());
    }

    /// Close the current frame, unbinding the names it declared.
    pub fn pop(&mut self) {
        if let Some(frame) = self.frames.pop() {
            for name in frame {
                self.bindings.remove(&name);
            }
        }
        if self.frames.is_empty() {
            self.frames.push(Vec::new());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expr(code: &str) -> Expression {
        Expression::new(code, ValueType::Str, false)
    }

    #[test]
    fn test_scoped_binding_disappears_on_pop() {
        let mut scopes = ScopeStack::new();
        scopes.push();
        scopes.insert("item", expr("item"), true);
        assert!(scopes.contains("item"));
        scopes.pop();
        assert!(!scopes.contains("item"));
    }

    #[test]
    fn test_persistent_binding_survives_pop() {
        let mut scopes = ScopeStack::new();
        scopes.push();
        scopes.insert("user", expr("_c.getUser()"), false);
        scopes.pop();
        assert_eq!(scopes.get("user").unwrap().code, "_c.getUser()");
    }

    #[test]
    fn test_storage_parse_with_eager_suffix() {
        assert_eq!(
            StorageClass::parse("REQUEST_EAGER").unwrap(),
            (StorageClass::Request, true)
        );
        assert_eq!(
            StorageClass::parse("LOCAL").unwrap(),
            (StorageClass::Local, false)
        );
        assert!(StorageClass::parse("GLOBAL").is_err());
    }
}
