//! The runtime value model (§3.1). Conversions never panic: a missing or
//! illegal conversion yields [`Value::Null`].

use serde::Serialize;
use std::fmt::{self, Display, Formatter};

/// Stable id for a struct instance, shared across copies of a [`Value`].
pub type StructHandle = u64;
/// Stable id for a pointer value, shared across copies of a [`Value`].
pub type PointerId = u64;

/// A pointer to a named variable (or one of its elements, via `offset`).
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PointerValue {
    pub target_variable: String,
    pub offset: i32,
    pub pointer_id: PointerId,
}

/// A pointer to a user-defined function, usable as a callback value.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FunctionPointerValue {
    pub function_name: String,
    pub pointer_id: PointerId,
}

/// The tagged union of every value the interpreter can hold (§3.1).
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    I32(i32),
    U32(u32),
    F64(f64),
    Str(String),
    Arr1I32(Vec<i32>),
    Arr1F64(Vec<f64>),
    Arr1Str(Vec<String>),
    Arr2I32(Vec<Vec<i32>>),
    Arr2F64(Vec<Vec<f64>>),
    Struct(StructHandle),
    Pointer(PointerValue),
    FunctionPointer(FunctionPointerValue),
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl Value {
    /// Truthiness used by `if`/`while`/`&&`/`||`/ternary conditions.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::I32(n) => *n != 0,
            Value::U32(n) => *n != 0,
            Value::F64(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Arr1I32(v) => !v.is_empty(),
            Value::Arr1F64(v) => !v.is_empty(),
            Value::Arr1Str(v) => !v.is_empty(),
            Value::Arr2I32(v) => !v.is_empty(),
            Value::Arr2F64(v) => !v.is_empty(),
            Value::Struct(_) => true,
            Value::Pointer(_) => true,
            Value::FunctionPointer(_) => true,
        }
    }

    /// Best-effort conversion to `i32`. Non-numeric values convert to 0,
    /// matching the source language's permissive numeric coercions.
    pub fn to_i32(&self) -> i32 {
        match self {
            Value::Null => 0,
            Value::Bool(b) => *b as i32,
            Value::I32(n) => *n,
            Value::U32(n) => *n as i32,
            Value::F64(f) => *f as i32,
            Value::Str(s) => s.parse().unwrap_or(0),
            _ => 0,
        }
    }

    pub fn to_u32(&self) -> u32 {
        match self {
            Value::Null => 0,
            Value::Bool(b) => *b as u32,
            Value::I32(n) => *n as u32,
            Value::U32(n) => *n,
            Value::F64(f) => *f as u32,
            Value::Str(s) => s.parse().unwrap_or(0),
            _ => 0,
        }
    }

    pub fn to_f64(&self) -> f64 {
        match self {
            Value::Null => 0.0,
            Value::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::I32(n) => *n as f64,
            Value::U32(n) => *n as f64,
            Value::F64(f) => *f,
            Value::Str(s) => s.parse().unwrap_or(0.0),
            _ => 0.0,
        }
    }

    pub fn to_bool(&self) -> bool {
        self.is_truthy()
    }

    /// Whether this value carries a fractional/`F64` representation, used
    /// by arithmetic coercion rules (§4.4).
    pub fn is_float(&self) -> bool {
        matches!(self, Value::F64(_))
    }

    /// Whether this value is an unsigned-typed integer.
    pub fn is_unsigned(&self) -> bool {
        matches!(self, Value::U32(_))
    }

    /// The user-facing display form, used for string concatenation,
    /// `Serial.println`, and similar. Mirrors the "minimum precision that
    /// round-trips" rule of §4.6.
    pub fn display_string(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::I32(n) => n.to_string(),
            Value::U32(n) => n.to_string(),
            Value::F64(f) => format_f64_shortest(*f),
            Value::Str(s) => s.clone(),
            Value::Arr1I32(v) => format!("{:?}", v),
            Value::Arr1F64(v) => format!("{:?}", v),
            Value::Arr1Str(v) => format!("{:?}", v),
            Value::Arr2I32(v) => format!("{:?}", v),
            Value::Arr2F64(v) => format!("{:?}", v),
            Value::Struct(handle) => format!("struct#{}", handle),
            Value::Pointer(p) => format!("&{}", p.target_variable),
            Value::FunctionPointer(p) => format!("&{}", p.function_name),
        }
    }

    /// Render this value as `serde_json::Value`, per the `VAR_SET` payload
    /// shapes described in §6. Struct/pointer/function-pointer values
    /// become tagged objects; primitives and arrays become native JSON.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::json;
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => json!(b),
            Value::I32(n) => json!(n),
            Value::U32(n) => json!(n),
            Value::F64(f) => json_number_or_token(*f),
            Value::Str(s) => json!(s),
            Value::Arr1I32(v) => json!(v),
            Value::Arr1F64(v) => {
                serde_json::Value::Array(v.iter().map(|f| json_number_or_token(*f)).collect())
            }
            Value::Arr1Str(v) => json!(v),
            Value::Arr2I32(v) => json!(v),
            Value::Arr2F64(v) => serde_json::Value::Array(
                v.iter()
                    .map(|row| {
                        serde_json::Value::Array(
                            row.iter().map(|f| json_number_or_token(*f)).collect(),
                        )
                    })
                    .collect(),
            ),
            Value::Struct(handle) => json!({ "type": "struct_handle", "structId": handle }),
            Value::Pointer(p) => json!({
                "type": "offset_pointer",
                "targetVariable": p.target_variable,
                "offset": p.offset,
                "pointerId": p.pointer_id,
            }),
            Value::FunctionPointer(p) => json!({
                "type": "function_pointer",
                "functionName": p.function_name,
                "pointerId": p.pointer_id,
            }),
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_string())
    }
}

/// Format an `f64` using the shortest round-tripping representation,
/// per §4.6/§4.9. Rust's `f64::to_string` already produces the shortest
/// round-trip decimal; we only normalize integral values to carry a
/// decimal point so `3.0` never prints as the JSON integer `3`.
pub fn format_f64_shortest(f: f64) -> String {
    if f.is_nan() {
        return "NaN".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    let s = f.to_string();
    if s.contains('.') || s.contains('e') || s.contains('E') {
        s
    } else {
        format!("{}.0", s)
    }
}

/// `NaN`/`Infinity` are not valid JSON literals (§4.9); render them as
/// string tokens instead of a bare number so the document stays strict
/// JSON, and render finite values as JSON numbers.
fn json_number_or_token(f: f64) -> serde_json::Value {
    if f.is_finite() {
        serde_json::Number::from_f64(f)
            .map(serde_json::Value::Number)
            .unwrap_or_else(|| serde_json::Value::String(format_f64_shortest(f)))
    } else {
        serde_json::Value::String(format_f64_shortest(f))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::I32(0).is_truthy());
        assert!(Value::I32(1).is_truthy());
        assert!(!Value::Str(String::new()).is_truthy());
        assert!(Value::Str("x".into()).is_truthy());
    }

    #[test]
    fn test_float_display_round_trips() {
        assert_eq!(format_f64_shortest(3.0), "3.0");
        assert_eq!(format_f64_shortest(3.5), "3.5");
        assert_eq!(format_f64_shortest(10.0 / 3.0), (10.0_f64 / 3.0).to_string());
    }

    #[test]
    fn test_json_rejects_non_finite_numbers() {
        assert_eq!(json_number_or_token(f64::NAN), serde_json::Value::String("NaN".into()));
        assert_eq!(
            json_number_or_token(f64::INFINITY),
            serde_json::Value::String("Infinity".into())
        );
    }

    #[test]
    fn test_conversions_never_panic() {
        let v = Value::Struct(7);
        assert_eq!(v.to_i32(), 0);
        assert_eq!(v.to_f64(), 0.0);
        assert!(v.is_truthy());
    }
}
