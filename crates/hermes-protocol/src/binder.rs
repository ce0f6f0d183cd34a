//! Invocation argument binding.
//!
//! The wire formats carry dynamically-typed values. An [`InvocationBinder`]
//! supplies the expected shapes for a given target so the codecs can check
//! arguments during parsing instead of deferring type errors to dispatch.

use serde_json::Value;

/// The expected shape of an argument or return value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterType {
    /// Any value is acceptable.
    Any,
    /// A boolean.
    Bool,
    /// An integer number.
    Integer,
    /// A floating-point number (integers are acceptable).
    Float,
    /// A string.
    String,
}

impl ParameterType {
    /// Whether `value` matches this parameter type.
    pub fn matches(self, value: &Value) -> bool {
        match self {
            Self::Any => true,
            Self::Bool => value.is_boolean(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Float => value.is_number(),
            Self::String => value.is_string(),
        }
    }
}

/// Maps invocation targets to the argument types they expect.
///
/// This is how the codecs produce typed values without any reflection on the
/// wire: the receiver knows its own handler signatures and exposes them here.
pub trait InvocationBinder: Send + Sync {
    /// Expected argument types for an invocation of `target`.
    ///
    /// `None` means the target is unknown to the binder; the codec then
    /// accepts the arguments as-is and leaves rejection to dispatch.
    fn parameter_types(&self, target: &str) -> Option<Vec<ParameterType>>;

    /// Expected result type for the completion of `invocation_id`.
    fn return_type(&self, invocation_id: &str) -> ParameterType;
}

/// A binder that accepts any payload.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullBinder;

impl InvocationBinder for NullBinder {
    fn parameter_types(&self, _target: &str) -> Option<Vec<ParameterType>> {
        None
    }

    fn return_type(&self, _invocation_id: &str) -> ParameterType {
        ParameterType::Any
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parameter_type_matching() {
        assert!(ParameterType::Any.matches(&json!({"k": 1})));
        assert!(ParameterType::Bool.matches(&json!(true)));
        assert!(!ParameterType::Bool.matches(&json!(1)));
        assert!(ParameterType::Integer.matches(&json!(7)));
        assert!(!ParameterType::Integer.matches(&json!(7.5)));
        assert!(ParameterType::Float.matches(&json!(7.5)));
        assert!(ParameterType::Float.matches(&json!(7)));
        assert!(ParameterType::String.matches(&json!("hi")));
        assert!(!ParameterType::String.matches(&json!(null)));
    }

    #[test]
    fn test_null_binder_accepts_everything() {
        let binder = NullBinder;
        assert_eq!(binder.parameter_types("anything"), None);
        assert_eq!(binder.return_type("1"), ParameterType::Any);
    }
}
