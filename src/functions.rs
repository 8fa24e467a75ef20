//! Built-in expression function library.
//!
//! Functions are registered under a `prefix:name` token when their library
//! is imported by a taglib directive, and render as calls into the `$rt`
//! helper namespace the emitted handler runs against.

use serde::{Deserialize, Serialize};

use crate::types::ValueType;

/// Signature of a library function callable from expressions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionSig {
    /// Registration token, e.g. `fn:length`.
    pub token: String,
    /// Qualified call target in the emitted source, e.g. `$rt.length`.
    pub target: String,
    pub params: Vec<ValueType>,
    pub ret: ValueType,
    pub ret_nullable: bool,
}

impl FunctionSig {
    fn new(prefix: &str, name: &str, params: Vec<ValueType>, ret: ValueType) -> Self {
        let ret_nullable = !ret.is_scalar() && ret != ValueType::Void;
        FunctionSig {
            token: format!("{}:{}", prefix, name),
            target: format!("$rt.{}", name),
            params,
            ret,
            ret_nullable,
        }
    }

    fn non_null(mut self) -> Self {
        self.ret_nullable = false;
        self
    }
}

/// The string/collection helper functions, instantiated under the prefix
/// the importing document chose.
pub fn library_functions(prefix: &str) -> Vec<FunctionSig> {
    use ValueType::{Any, Bool, Int, Str};
    let str2 = || vec![Str, Str];
    let array_str = || ValueType::Array(Box::new(Str));
    vec![
        FunctionSig::new(prefix, "toUpperCase", vec![Str], Str).non_null(),
        FunctionSig::new(prefix, "toLowerCase", vec![Str], Str).non_null(),
        FunctionSig::new(prefix, "indexOf", str2(), Int),
        FunctionSig::new(prefix, "contains", str2(), Bool),
        FunctionSig::new(prefix, "containsIgnoreCase", str2(), Bool),
        FunctionSig::new(prefix, "startsWith", str2(), Bool),
        FunctionSig::new(prefix, "endsWith", str2(), Bool),
        FunctionSig::new(prefix, "substring", vec![Str, Int, Int], Str).non_null(),
        FunctionSig::new(prefix, "substringAfter", str2(), Str).non_null(),
        FunctionSig::new(prefix, "substringBefore", str2(), Str).non_null(),
        FunctionSig::new(prefix, "trim", vec![Str], Str).non_null(),
        FunctionSig::new(prefix, "replace", vec![Str, Str, Str], Str).non_null(),
        FunctionSig::new(prefix, "split", str2(), array_str()),
        FunctionSig::new(prefix, "join", vec![array_str(), Str], Str).non_null(),
        FunctionSig::new(prefix, "length", vec![Any], Int),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_carry_the_chosen_prefix() {
        let fns = library_functions("f");
        assert!(fns.iter().any(|f| f.token == "f:length"));
        assert!(fns.iter().all(|f| f.target.starts_with("$rt.")));
    }

    #[test]
    fn test_length_accepts_anything() {
        let fns = library_functions("fn");
        let length = fns.iter().find(|f| f.token == "fn:length").unwrap();
        assert_eq!(length.params, vec![ValueType::Any]);
        assert_eq!(length.ret, ValueType::Int);
        assert!(!length.ret_nullable);
    }
}
