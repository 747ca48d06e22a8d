//! Dynamic value view used by validators, plus the `ParamValue` trait that
//! connects concrete parameter types to it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A parameter value as seen by validators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Int(_) => ValueKind::Int,
            Value::Float(_) => ValueKind::Float,
            Value::Bool(_) => ValueKind::Bool,
            Value::Str(_) => ValueKind::Str,
        }
    }

    /// Numeric view of integers and floats.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Str(v) => write!(f, "\"{v}\""),
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

/// Coarse type of a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Int,
    Float,
    Bool,
    Str,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Int => "integer",
            ValueKind::Float => "float",
            ValueKind::Bool => "boolean",
            ValueKind::Str => "string",
        };
        f.write_str(name)
    }
}

/// Types that can be carried by a [`crate::parameter::Parameter`].
///
/// Provides the validator view of a value together with the default text
/// codec. Parameters may override the codec with their own decoder/encoder.
pub trait ParamValue: Clone + fmt::Debug + Send + Sync + 'static {
    /// Validator view of this value.
    fn to_value(&self) -> Value;

    /// Default conversion from instrument response text.
    fn decode_text(text: &str) -> Result<Self, String>;

    /// Default conversion to the text substituted into a set template.
    fn encode_text(&self) -> String;
}

macro_rules! impl_param_value_int {
    ($($ty:ty),*) => {
        $(
            impl ParamValue for $ty {
                fn to_value(&self) -> Value {
                    Value::Int(i64::from(*self))
                }

                fn decode_text(text: &str) -> Result<Self, String> {
                    let text = text.trim();
                    if let Ok(v) = text.parse::<$ty>() {
                        return Ok(v);
                    }
                    // Instruments often report integers in float notation ("9.000E+00").
                    let float = text
                        .parse::<f64>()
                        .map_err(|e| format!("not an integer: {e}"))?;
                    let not_representable =
                        || format!("{text} is not representable as {}", stringify!($ty));
                    // Integral floats below 2^64 in magnitude convert to i128 exactly.
                    if float.fract() != 0.0 || float.abs() >= 18_446_744_073_709_551_616.0 {
                        return Err(not_representable());
                    }
                    <$ty>::try_from(float as i128).map_err(|_| not_representable())
                }

                fn encode_text(&self) -> String {
                    self.to_string()
                }
            }
        )*
    };
}

impl_param_value_int!(i8, i16, i32, i64, u8, u16, u32);

impl ParamValue for f64 {
    fn to_value(&self) -> Value {
        Value::Float(*self)
    }

    fn decode_text(text: &str) -> Result<Self, String> {
        text.trim()
            .parse::<f64>()
            .map_err(|e| format!("not a number: {e}"))
    }

    fn encode_text(&self) -> String {
        self.to_string()
    }
}

impl ParamValue for f32 {
    fn to_value(&self) -> Value {
        Value::Float(f64::from(*self))
    }

    fn decode_text(text: &str) -> Result<Self, String> {
        text.trim()
            .parse::<f32>()
            .map_err(|e| format!("not a number: {e}"))
    }

    fn encode_text(&self) -> String {
        self.to_string()
    }
}

impl ParamValue for bool {
    fn to_value(&self) -> Value {
        Value::Bool(*self)
    }

    fn decode_text(text: &str) -> Result<Self, String> {
        match text.trim().to_ascii_uppercase().as_str() {
            "1" | "ON" | "TRUE" => Ok(true),
            "0" | "OFF" | "FALSE" => Ok(false),
            other => Err(format!("not a boolean: {other}")),
        }
    }

    // SCPI boolean form.
    fn encode_text(&self) -> String {
        let text = if *self { "1" } else { "0" };
        text.to_string()
    }
}

impl ParamValue for String {
    fn to_value(&self) -> Value {
        Value::Str(self.clone())
    }

    fn decode_text(text: &str) -> Result<Self, String> {
        Ok(text.to_string())
    }

    fn encode_text(&self) -> String {
        self.clone()
    }
}
