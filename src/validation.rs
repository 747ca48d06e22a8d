//! Validators for parameter values.
//!
//! A validator is a pure predicate over a [`Value`]: the same candidate always
//! yields the same verdict and nothing is mutated. Parameters hold validators
//! by reference (`Arc<dyn Validator>`), so supporting a new kind of instrument
//! constraint only needs a new `Validator` implementation.
//!
//! # Example
//!
//! ```
//! use daq_param::validation::{IntRange, Validator};
//! use daq_param::value::Value;
//!
//! let channels = IntRange::between(1, 9).unwrap();
//! assert!(channels.validate(&Value::Int(4)).is_ok());
//! assert!(channels.validate(&Value::Int(10)).is_err());
//! assert!(channels.validate(&Value::Float(4.5)).is_err());
//! ```

use regex::Regex;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::error::{ParamError, ParamResult};
use crate::value::{Value, ValueKind};

/// Reason a candidate value was rejected.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("{expected} value required but got {found}")]
    WrongType { expected: String, found: ValueKind },

    #[error("{value} is below the minimum {min}")]
    BelowMinimum { value: String, min: String },

    #[error("{value} is above the maximum {max}")]
    AboveMaximum { value: String, max: String },

    #[error("NaN is not an accepted number")]
    NotANumber,

    #[error("length {length} is shorter than {min}")]
    TooShort { length: usize, min: usize },

    #[error("length {length} is longer than {max}")]
    TooLong { length: usize, max: usize },

    #[error("{value} does not match pattern '{pattern}'")]
    PatternMismatch { value: String, pattern: String },

    #[error("{value} is not one of the allowed candidates")]
    NotACandidate { value: String },

    #[error("{value} is not accepted by any validator")]
    NoneAccepted { value: String },

    #[error("{0}")]
    Rejected(String),
}

/// Contract shared by every validator.
pub trait Validator: fmt::Display + fmt::Debug + Send + Sync {
    /// Accept the value or explain which rule it violates.
    fn validate(&self, value: &Value) -> Result<(), ValidationError>;
}

/// Returns `true` when `validator` accepts `value`.
pub fn validate_value(value: &Value, validator: &dyn Validator) -> bool {
    validator.validate(value).is_ok()
}

fn bound_text<T: fmt::Display>(bound: Option<T>, open: &str) -> String {
    bound.map_or_else(|| open.to_string(), |b| b.to_string())
}

// =============================================================================
// Numeric ranges
// =============================================================================

/// Integral values within an inclusive range. Either bound may be open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntRange {
    min: Option<i64>,
    max: Option<i64>,
}

impl IntRange {
    /// Range with optional bounds; fails when `min > max`.
    pub fn new(min: Option<i64>, max: Option<i64>) -> ParamResult<Self> {
        if let (Some(lo), Some(hi)) = (min, max) {
            if lo > hi {
                return Err(ParamError::Usage(format!(
                    "invalid integer range: {lo} > {hi}"
                )));
            }
        }
        Ok(Self { min, max })
    }

    pub fn between(min: i64, max: i64) -> ParamResult<Self> {
        Self::new(Some(min), Some(max))
    }

    pub fn at_least(min: i64) -> Self {
        Self {
            min: Some(min),
            max: None,
        }
    }

    pub fn at_most(max: i64) -> Self {
        Self {
            min: None,
            max: Some(max),
        }
    }

    pub fn unbounded() -> Self {
        Self {
            min: None,
            max: None,
        }
    }

    pub fn min(&self) -> Option<i64> {
        self.min
    }

    pub fn max(&self) -> Option<i64> {
        self.max
    }
}

impl Validator for IntRange {
    fn validate(&self, value: &Value) -> Result<(), ValidationError> {
        let Value::Int(v) = value else {
            return Err(ValidationError::WrongType {
                expected: ValueKind::Int.to_string(),
                found: value.kind(),
            });
        };
        if let Some(min) = self.min {
            if *v < min {
                return Err(ValidationError::BelowMinimum {
                    value: v.to_string(),
                    min: min.to_string(),
                });
            }
        }
        if let Some(max) = self.max {
            if *v > max {
                return Err(ValidationError::AboveMaximum {
                    value: v.to_string(),
                    max: max.to_string(),
                });
            }
        }
        Ok(())
    }
}

impl fmt::Display for IntRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "integer in [{}, {}]",
            bound_text(self.min, "-inf"),
            bound_text(self.max, "inf")
        )
    }
}

/// Any real number (integer or float) within an inclusive range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NumberRange {
    min: Option<f64>,
    max: Option<f64>,
}

impl NumberRange {
    /// Range with optional bounds; fails on NaN bounds or `min > max`.
    pub fn new(min: Option<f64>, max: Option<f64>) -> ParamResult<Self> {
        if min.is_some_and(f64::is_nan) || max.is_some_and(f64::is_nan) {
            return Err(ParamError::Usage("NaN range bound".to_string()));
        }
        if let (Some(lo), Some(hi)) = (min, max) {
            if lo > hi {
                return Err(ParamError::Usage(format!(
                    "invalid number range: {lo} > {hi}"
                )));
            }
        }
        Ok(Self { min, max })
    }

    pub fn between(min: f64, max: f64) -> ParamResult<Self> {
        Self::new(Some(min), Some(max))
    }

    pub fn unbounded() -> Self {
        Self {
            min: None,
            max: None,
        }
    }

    pub fn min(&self) -> Option<f64> {
        self.min
    }

    pub fn max(&self) -> Option<f64> {
        self.max
    }
}

impl Validator for NumberRange {
    fn validate(&self, value: &Value) -> Result<(), ValidationError> {
        let v = value.as_f64().ok_or_else(|| ValidationError::WrongType {
            expected: "numeric".to_string(),
            found: value.kind(),
        })?;
        if v.is_nan() {
            return Err(ValidationError::NotANumber);
        }
        if let Some(min) = self.min {
            if v < min {
                return Err(ValidationError::BelowMinimum {
                    value: v.to_string(),
                    min: min.to_string(),
                });
            }
        }
        if let Some(max) = self.max {
            if v > max {
                return Err(ValidationError::AboveMaximum {
                    value: v.to_string(),
                    max: max.to_string(),
                });
            }
        }
        Ok(())
    }
}

impl fmt::Display for NumberRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "number in [{}, {}]",
            bound_text(self.min, "-inf"),
            bound_text(self.max, "inf")
        )
    }
}

// =============================================================================
// Trivial validators
// =============================================================================

/// Accepts every value.
#[derive(Debug, Clone, Copy, Default)]
pub struct Anything;

impl Validator for Anything {
    fn validate(&self, _value: &Value) -> Result<(), ValidationError> {
        Ok(())
    }
}

impl fmt::Display for Anything {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("any value")
    }
}

/// Rejects every value with a fixed reason, e.g. to lock a parameter while
/// an instrument is in a mode where it must not be touched.
#[derive(Debug, Clone)]
pub struct Nothing {
    reason: String,
}

impl Nothing {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl Validator for Nothing {
    fn validate(&self, _value: &Value) -> Result<(), ValidationError> {
        Err(ValidationError::Rejected(self.reason.clone()))
    }
}

impl fmt::Display for Nothing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "no value ({})", self.reason)
    }
}

/// Accepts values of the listed kinds.
#[derive(Debug, Clone)]
pub struct TypeOf {
    kinds: Vec<ValueKind>,
}

impl TypeOf {
    pub fn new(kinds: impl IntoIterator<Item = ValueKind>) -> ParamResult<Self> {
        let mut kinds: Vec<ValueKind> = kinds.into_iter().collect();
        kinds.dedup();
        if kinds.is_empty() {
            return Err(ParamError::Usage("a type must be given".to_string()));
        }
        Ok(Self { kinds })
    }

    pub fn kinds(&self) -> &[ValueKind] {
        &self.kinds
    }

    fn expected(&self) -> String {
        self.kinds
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" or ")
    }
}

impl Validator for TypeOf {
    fn validate(&self, value: &Value) -> Result<(), ValidationError> {
        if self.kinds.contains(&value.kind()) {
            Ok(())
        } else {
            Err(ValidationError::WrongType {
                expected: self.expected(),
                found: value.kind(),
            })
        }
    }
}

impl fmt::Display for TypeOf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} value", self.expected())
    }
}

// =============================================================================
// String validators
// =============================================================================

/// Strings whose length (in characters) lies within `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StringLength {
    min: usize,
    max: Option<usize>,
}

impl StringLength {
    pub fn new(min: usize, max: Option<usize>) -> ParamResult<Self> {
        if let Some(max) = max {
            if max < min {
                return Err(ParamError::Usage(format!(
                    "max length {max} < min length {min}"
                )));
            }
        }
        Ok(Self { min, max })
    }
}

impl Validator for StringLength {
    fn validate(&self, value: &Value) -> Result<(), ValidationError> {
        let Value::Str(text) = value else {
            return Err(ValidationError::WrongType {
                expected: ValueKind::Str.to_string(),
                found: value.kind(),
            });
        };
        let length = text.chars().count();
        if length < self.min {
            return Err(ValidationError::TooShort {
                length,
                min: self.min,
            });
        }
        match self.max {
            Some(max) if length > max => Err(ValidationError::TooLong { length, max }),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for StringLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "string of length [{}, {}]", self.min, bound_text(self.max, "inf"))
    }
}

/// Strings matched in full by a regular expression.
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    regex: Regex,
}

impl Pattern {
    pub fn new(pattern: &str) -> ParamResult<Self> {
        if pattern.is_empty() {
            return Err(ParamError::Usage("empty pattern".to_string()));
        }
        // Anchor so that partial matches are rejected.
        let regex = Regex::new(&format!("^(?:{pattern})$"))
            .map_err(|e| ParamError::Usage(format!("invalid pattern '{pattern}': {e}")))?;
        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.source
    }
}

impl Validator for Pattern {
    fn validate(&self, value: &Value) -> Result<(), ValidationError> {
        let Value::Str(text) = value else {
            return Err(ValidationError::WrongType {
                expected: ValueKind::Str.to_string(),
                found: value.kind(),
            });
        };
        if self.regex.is_match(text) {
            Ok(())
        } else {
            Err(ValidationError::PatternMismatch {
                value: text.clone(),
                pattern: self.source.clone(),
            })
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "string matching '{}'", self.source)
    }
}

// =============================================================================
// Membership and composition
// =============================================================================

/// Value equal to one of the given candidates.
#[derive(Debug, Clone)]
pub struct Enumerated {
    candidates: Vec<Value>,
}

impl Enumerated {
    pub fn new<V: Into<Value>>(candidates: impl IntoIterator<Item = V>) -> ParamResult<Self> {
        let mut seen = HashSet::new();
        let candidates: Vec<Value> = candidates
            .into_iter()
            .map(Into::into)
            .filter(|c: &Value| seen.insert(c.to_string()))
            .collect();
        if candidates.is_empty() {
            return Err(ParamError::Usage("no candidates given".to_string()));
        }
        Ok(Self { candidates })
    }

    pub fn candidates(&self) -> &[Value] {
        &self.candidates
    }
}

impl Validator for Enumerated {
    fn validate(&self, value: &Value) -> Result<(), ValidationError> {
        if self.candidates.iter().any(|c| c == value) {
            Ok(())
        } else {
            Err(ValidationError::NotACandidate {
                value: value.to_string(),
            })
        }
    }
}

impl fmt::Display for Enumerated {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let list = self
            .candidates
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "one of ({list})")
    }
}

fn describe_children(children: &[Arc<dyn Validator>]) -> String {
    children
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Value must satisfy every child validator.
#[derive(Debug, Clone)]
pub struct AllOf {
    children: Vec<Arc<dyn Validator>>,
}

impl AllOf {
    pub fn new(children: Vec<Arc<dyn Validator>>) -> ParamResult<Self> {
        if children.is_empty() {
            return Err(ParamError::Usage("no sub validator".to_string()));
        }
        Ok(Self { children })
    }
}

impl Validator for AllOf {
    fn validate(&self, value: &Value) -> Result<(), ValidationError> {
        self.children.iter().try_for_each(|c| c.validate(value))
    }
}

impl fmt::Display for AllOf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "all of ({})", describe_children(&self.children))
    }
}

/// Value must satisfy at least one child validator.
#[derive(Debug, Clone)]
pub struct AnyOf {
    children: Vec<Arc<dyn Validator>>,
}

impl AnyOf {
    pub fn new(children: Vec<Arc<dyn Validator>>) -> ParamResult<Self> {
        if children.is_empty() {
            return Err(ParamError::Usage("no sub validator".to_string()));
        }
        Ok(Self { children })
    }
}

impl Validator for AnyOf {
    fn validate(&self, value: &Value) -> Result<(), ValidationError> {
        if self.children.iter().any(|c| c.validate(value).is_ok()) {
            Ok(())
        } else {
            Err(ValidationError::NoneAccepted {
                value: value.to_string(),
            })
        }
    }
}

impl fmt::Display for AnyOf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "any of ({})", describe_children(&self.children))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_range_boundaries() {
        let v = IntRange::between(-3, 7).unwrap();
        assert!(matches!(
            v.validate(&Value::Int(-4)),
            Err(ValidationError::BelowMinimum { .. })
        ));
        assert!(v.validate(&Value::Int(-3)).is_ok());
        assert!(v.validate(&Value::Int(7)).is_ok());
        assert!(matches!(
            v.validate(&Value::Int(8)),
            Err(ValidationError::AboveMaximum { .. })
        ));
        assert!(matches!(
            v.validate(&Value::Float(2.5)),
            Err(ValidationError::WrongType { .. })
        ));
    }

    #[test]
    fn test_int_range_open_bounds() {
        assert!(IntRange::at_least(0).validate(&Value::Int(i64::MAX)).is_ok());
        assert!(IntRange::at_least(0).validate(&Value::Int(-1)).is_err());
        assert!(IntRange::at_most(5).validate(&Value::Int(i64::MIN)).is_ok());
        assert!(IntRange::unbounded().validate(&Value::Int(42)).is_ok());
        assert!(IntRange::between(5, 1).is_err());
    }

    #[test]
    fn test_number_range_accepts_ints_and_fractions() {
        let v = NumberRange::between(0.0, 31.5).unwrap();
        assert!(v.validate(&Value::Float(0.37)).is_ok());
        assert!(v.validate(&Value::Int(31)).is_ok());
        assert!(v.validate(&Value::Float(31.6)).is_err());
        assert!(v.validate(&Value::Float(-0.1)).is_err());
        assert_eq!(
            v.validate(&Value::Float(f64::NAN)),
            Err(ValidationError::NotANumber)
        );
        assert!(v.validate(&Value::Bool(true)).is_err());
        assert!(NumberRange::between(1.0, f64::NAN).is_err());
    }

    #[test]
    fn test_string_validators() {
        let len = StringLength::new(2, Some(4)).unwrap();
        assert!(len.validate(&Value::from("abc")).is_ok());
        assert!(len.validate(&Value::from("a")).is_err());
        assert!(len.validate(&Value::from("abcde")).is_err());
        assert!(StringLength::new(3, Some(1)).is_err());

        let email = Pattern::new(r"\w+(\.\w+)*@\w+(\.\w+)+").unwrap();
        assert!(email.validate(&Value::from("prettyage.new@gmail.com")).is_ok());
        assert!(email.validate(&Value::from("x prettyage@gmail.com")).is_err());
        assert!(Pattern::new("(").is_err());
    }

    #[test]
    fn test_enumerated_and_composites() {
        let switch = Enumerated::new(["on", "off"]).unwrap();
        assert!(switch.validate(&Value::from("on")).is_ok());
        assert!(switch.validate(&Value::from("job")).is_err());

        let range: Arc<dyn Validator> = Arc::new(IntRange::between(0, 10).unwrap());
        let odd: Arc<dyn Validator> = Arc::new(Enumerated::new([1i64, 3, 5, 7, 9]).unwrap());
        let both = AllOf::new(vec![range.clone(), odd]).unwrap();
        assert!(both.validate(&Value::Int(3)).is_ok());
        assert!(both.validate(&Value::Int(4)).is_err());

        let locked: Arc<dyn Validator> = Arc::new(Nothing::new("locked"));
        let either = AnyOf::new(vec![locked, range]).unwrap();
        assert!(either.validate(&Value::Int(4)).is_ok());
        assert!(matches!(
            either.validate(&Value::Int(40)),
            Err(ValidationError::NoneAccepted { .. })
        ));
        assert!(AnyOf::new(vec![]).is_err());
    }

    #[test]
    fn test_descriptions() {
        assert_eq!(IntRange::at_least(0).to_string(), "integer in [0, inf]");
        assert_eq!(
            TypeOf::new([ValueKind::Int, ValueKind::Float]).unwrap().to_string(),
            "integer or float value"
        );
        assert!(!validate_value(&Value::Int(1), &Nothing::new("never")));
        assert!(validate_value(&Value::Int(1), &Anything));
    }
}
