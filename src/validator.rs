//! Value validation
//!
//! Checks one candidate value against one field descriptor. Checks run in a
//! fixed order and stop at the first failure:
//!
//! 1. emptiness (absent, `null` or `""`; booleans are never empty)
//! 2. empty optional values pass without further checks
//! 3. kind specific constraints
//!
//! Validation is a pure function of `(value, field)`.

use std::borrow::Cow;
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::field::{parse_integer_bound, Bounds, FieldDescriptor, FieldKind, FieldSpec};

/// Why a value was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Violation {
    Mandatory,
    TooShort,
    TooLong,
    InvalidEmail,
    TooLow,
    TooHigh,
    TooEarly,
    TooLate,
    NotAnInteger,
}

impl Violation {
    /// Short reason appended to the field name in messages
    pub fn reason(&self) -> &'static str {
        match self {
            Violation::Mandatory => "is mandatory",
            Violation::TooShort => "too short",
            Violation::TooLong => "too long",
            Violation::InvalidEmail => "invalid email",
            Violation::TooLow => "too low",
            Violation::TooHigh => "too high",
            Violation::TooEarly => "too early",
            Violation::TooLate => "too late",
            Violation::NotAnInteger => "must be an integer",
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.reason())
    }
}

/// A single field that failed validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub violation: Violation,
}

impl FieldError {
    pub fn new(field: impl Into<String>, violation: Violation) -> Self {
        Self {
            field: field.into(),
            violation,
        }
    }

    /// Human readable message, e.g. `"Primary_ID is mandatory"`
    pub fn message(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.field, self.violation)
    }
}

/// Every failing field of one validation run, in schema order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationErrors(Vec<FieldError>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, error: FieldError) {
        self.0.push(error);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FieldError> {
        self.0.iter()
    }

    /// Error reported for `field`, if any
    pub fn for_field(&self, field: &str) -> Option<&FieldError> {
        self.0.iter().find(|e| e.field == field)
    }

    pub fn messages(&self) -> Vec<String> {
        self.0.iter().map(FieldError::message).collect()
    }

    pub fn into_vec(self) -> Vec<FieldError> {
        self.0
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.messages().join("; "))
    }
}

impl<'a> IntoIterator for &'a ValidationErrors {
    type Item = &'a FieldError;
    type IntoIter = std::slice::Iter<'a, FieldError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Verdict for one value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    Valid,
    Invalid(FieldError),
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationResult::Valid)
    }

    pub fn error(&self) -> Option<&FieldError> {
        match self {
            ValidationResult::Valid => None,
            ValidationResult::Invalid(error) => Some(error),
        }
    }

    pub fn into_error(self) -> Option<FieldError> {
        match self {
            ValidationResult::Valid => None,
            ValidationResult::Invalid(error) => Some(error),
        }
    }
}

/// Absent, `null` and `""` are empty
pub fn is_empty_value(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(_) => false,
    }
}

/// Check `value` against `field`
pub fn validate(value: Option<&Value>, field: &FieldDescriptor) -> ValidationResult {
    let failure = if field.kind() != FieldKind::Boolean && is_empty_value(value) {
        field.is_mandatory().then_some(Violation::Mandatory)
    } else {
        value.and_then(|value| check_spec(value, field.spec()))
    };

    match failure {
        Some(violation) => ValidationResult::Invalid(FieldError::new(field.name(), violation)),
        None => ValidationResult::Valid,
    }
}

fn check_spec(value: &Value, spec: &FieldSpec) -> Option<Violation> {
    match spec {
        FieldSpec::String(bounds) => check_length(value, bounds),
        FieldSpec::Email(bounds) => check_length(value, bounds).or_else(|| check_email(value)),
        FieldSpec::Integer(bounds) => check_range(value, bounds),
        FieldSpec::Date(bounds) => check_dates(value, bounds),
        FieldSpec::Boolean => None,
    }
}

fn check_length(value: &Value, bounds: &Bounds<usize>) -> Option<Violation> {
    let length = as_text(value).chars().count();
    if bounds.min.is_some_and(|min| length < min) {
        return Some(Violation::TooShort);
    }
    if bounds.max.is_some_and(|max| length > max) {
        return Some(Violation::TooLong);
    }
    None
}

fn check_email(value: &Value) -> Option<Violation> {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    let email = EMAIL.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("static pattern"));

    (!email.is_match(&as_text(value))).then_some(Violation::InvalidEmail)
}

/// Unparsable numbers skip the range checks
///
/// Integral values compare exactly as `i64`; only fractional values go
/// through `f64`.
fn check_range(value: &Value, bounds: &Bounds<i64>) -> Option<Violation> {
    let (too_low, too_high) = match parse_integer_bound(value) {
        Some(number) => (
            bounds.min.is_some_and(|min| number < min),
            bounds.max.is_some_and(|max| number > max),
        ),
        None => {
            let number = as_number(value)?;
            (
                bounds.min.is_some_and(|min| number < min as f64),
                bounds.max.is_some_and(|max| number > max as f64),
            )
        }
    };
    if too_low {
        Some(Violation::TooLow)
    } else if too_high {
        Some(Violation::TooHigh)
    } else {
        None
    }
}

/// ISO dates order lexicographically
fn check_dates(value: &Value, bounds: &Bounds<String>) -> Option<Violation> {
    let text = as_text(value);
    if bounds.min.as_deref().is_some_and(|min| text.as_ref() < min) {
        return Some(Violation::TooEarly);
    }
    if bounds.max.as_deref().is_some_and(|max| text.as_ref() > max) {
        return Some(Violation::TooLate);
    }
    None
}

pub(crate) fn as_text(value: &Value) -> Cow<'_, str> {
    match value {
        Value::String(s) => Cow::Borrowed(s),
        other => Cow::Owned(other.to_string()),
    }
}

pub(crate) fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    }
}
