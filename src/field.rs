//! Field descriptors
//!
//! A field descriptor is one attribute of a user defined type: its kind,
//! kind-specific constraints and whether a value is mandatory.
//!
//! ## Wire format
//!
//! Descriptors travel as the `schema_definition.fields` entries of a type:
//!
//! ```json
//! { "name": "Serial_No", "type": "string", "mandatory": true,
//!   "validators": { "min": 3, "max": 12 } }
//! ```
//!
//! `min`/`max` are length bounds for `string`/`email` and value bounds for
//! `integer`; `minDate`/`maxDate` apply to `date`. Bounds that cannot be
//! parsed are dropped rather than rejected.

use std::fmt;
use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{EngineError, Result};

/// Date layout used for `date` values and bounds
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Kind of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    #[default]
    String,
    Integer,
    Boolean,
    Date,
    Email,
}

impl FieldKind {
    /// Wire name of this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Integer => "integer",
            FieldKind::Boolean => "boolean",
            FieldKind::Date => "date",
            FieldKind::Email => "email",
        }
    }

    /// Value a new, untouched input of this kind starts with
    pub fn default_value(&self) -> Option<Value> {
        default_value(*self)
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Default value for a kind: `false` for booleans, absent otherwise
pub fn default_value(kind: FieldKind) -> Option<Value> {
    match kind {
        FieldKind::Boolean => Some(Value::Bool(false)),
        FieldKind::String | FieldKind::Integer | FieldKind::Date | FieldKind::Email => None,
    }
}

/// First character of display-only column keys; field names may not start with it
pub const RESERVED_FIELD_PREFIX: char = '$';

/// Replace every whitespace run in `raw` with a single underscore
pub fn normalize_field_name(raw: &str) -> Result<String> {
    static WHITESPACE: OnceLock<Regex> = OnceLock::new();
    let whitespace = WHITESPACE.get_or_init(|| Regex::new(r"\s+").expect("static pattern"));

    let normalized = whitespace.replace_all(raw, "_").into_owned();
    if normalized.is_empty() || normalized.starts_with(RESERVED_FIELD_PREFIX) {
        return Err(EngineError::InvalidFieldName(raw.to_string()));
    }
    Ok(normalized)
}

/// Inclusive lower/upper bound pair; either side may be absent
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Bounds<T> {
    pub min: Option<T>,
    pub max: Option<T>,
}

impl<T> Bounds<T> {
    pub fn new(min: Option<T>, max: Option<T>) -> Self {
        Self { min, max }
    }

    pub fn none() -> Self {
        Self { min: None, max: None }
    }

    pub fn is_unbounded(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }
}

/// Kind together with the constraints that kind supports
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldSpec {
    /// Free text with optional length bounds (in characters)
    String(Bounds<usize>),
    /// Email address with optional length bounds
    Email(Bounds<usize>),
    /// Whole number with optional value bounds
    Integer(Bounds<i64>),
    /// ISO date (`YYYY-MM-DD`) with optional date bounds
    Date(Bounds<String>),
    /// Yes/no flag, never constrained
    Boolean,
}

impl FieldSpec {
    pub fn kind(&self) -> FieldKind {
        match self {
            FieldSpec::String(_) => FieldKind::String,
            FieldSpec::Email(_) => FieldKind::Email,
            FieldSpec::Integer(_) => FieldKind::Integer,
            FieldSpec::Date(_) => FieldKind::Date,
            FieldSpec::Boolean => FieldKind::Boolean,
        }
    }

    /// Spec of the given kind without any constraint
    pub fn unconstrained(kind: FieldKind) -> Self {
        match kind {
            FieldKind::String => FieldSpec::String(Bounds::none()),
            FieldKind::Email => FieldSpec::Email(Bounds::none()),
            FieldKind::Integer => FieldSpec::Integer(Bounds::none()),
            FieldKind::Date => FieldSpec::Date(Bounds::none()),
            FieldKind::Boolean => FieldSpec::Boolean,
        }
    }

    pub fn string(min_length: Option<usize>, max_length: Option<usize>) -> Self {
        FieldSpec::String(Bounds::new(min_length, max_length))
    }

    pub fn email(min_length: Option<usize>, max_length: Option<usize>) -> Self {
        FieldSpec::Email(Bounds::new(min_length, max_length))
    }

    pub fn integer(min_value: Option<i64>, max_value: Option<i64>) -> Self {
        FieldSpec::Integer(Bounds::new(min_value, max_value))
    }

    /// Date spec; bounds that are not valid ISO dates are dropped
    pub fn date(min_date: Option<&str>, max_date: Option<&str>) -> Self {
        FieldSpec::Date(Bounds::new(
            min_date.and_then(parse_date_str),
            max_date.and_then(parse_date_str),
        ))
    }

    /// Build a spec from the loosely typed wire `validators` object
    pub fn from_validators(kind: FieldKind, validators: &Validators) -> Self {
        let length = || {
            Bounds::new(
                validators.min.as_ref().and_then(parse_length_bound),
                validators.max.as_ref().and_then(parse_length_bound),
            )
        };
        match kind {
            FieldKind::String => FieldSpec::String(length()),
            FieldKind::Email => FieldSpec::Email(length()),
            FieldKind::Integer => FieldSpec::Integer(Bounds::new(
                validators.min.as_ref().and_then(parse_integer_bound),
                validators.max.as_ref().and_then(parse_integer_bound),
            )),
            FieldKind::Date => FieldSpec::Date(Bounds::new(
                validators.min_date.as_ref().and_then(parse_date_bound),
                validators.max_date.as_ref().and_then(parse_date_bound),
            )),
            FieldKind::Boolean => FieldSpec::Boolean,
        }
    }

    /// Render the constraints back into the wire `validators` object
    pub fn to_validators(&self) -> Validators {
        match self {
            FieldSpec::String(bounds) | FieldSpec::Email(bounds) => Validators {
                min: bounds.min.map(Value::from),
                max: bounds.max.map(Value::from),
                ..Validators::default()
            },
            FieldSpec::Integer(bounds) => Validators {
                min: bounds.min.map(Value::from),
                max: bounds.max.map(Value::from),
                ..Validators::default()
            },
            FieldSpec::Date(bounds) => Validators {
                min_date: bounds.min.clone().map(Value::String),
                max_date: bounds.max.clone().map(Value::String),
                ..Validators::default()
            },
            FieldSpec::Boolean => Validators::default(),
        }
    }
}

/// Parse an integer bound: JSON integers, integral floats or numeric strings
pub fn parse_integer_bound(raw: &Value) -> Option<i64> {
    match raw {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(integral)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(integral))
        }
        _ => None,
    }
}

/// Parse a length bound: a non-negative integer bound
pub fn parse_length_bound(raw: &Value) -> Option<usize> {
    parse_integer_bound(raw).and_then(|n| usize::try_from(n).ok())
}

/// Parse a date bound: a string holding an ISO date
pub fn parse_date_bound(raw: &Value) -> Option<String> {
    raw.as_str().and_then(parse_date_str)
}

fn parse_date_str(raw: &str) -> Option<String> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT)
        .ok()
        .map(|date| date.format(DATE_FORMAT).to_string())
}

fn integral(f: f64) -> Option<i64> {
    let in_range = (i64::MIN as f64..i64::MAX as f64).contains(&f);
    (f.fract() == 0.0 && in_range).then_some(f as i64)
}

/// Wire form of a field's constraints
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Validators {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<Value>,
    #[serde(rename = "minDate", default, skip_serializing_if = "Option::is_none")]
    pub min_date: Option<Value>,
    #[serde(rename = "maxDate", default, skip_serializing_if = "Option::is_none")]
    pub max_date: Option<Value>,
}

/// Wire form of a field descriptor (`schema_definition.fields[]`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: FieldKind,
    #[serde(default)]
    pub mandatory: bool,
    #[serde(default)]
    pub validators: Validators,
}

/// A single attribute of a type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "FieldDefinition", into = "FieldDefinition")]
pub struct FieldDescriptor {
    name: String,
    spec: FieldSpec,
    mandatory: bool,
    is_primary: bool,
}

impl FieldDescriptor {
    /// Create a descriptor, normalizing `name`
    pub fn new(name: &str, spec: FieldSpec, mandatory: bool) -> Result<Self> {
        Ok(Self {
            name: normalize_field_name(name)?,
            spec,
            mandatory,
            is_primary: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> FieldKind {
        self.spec.kind()
    }

    pub fn spec(&self) -> &FieldSpec {
        &self.spec
    }

    pub fn is_mandatory(&self) -> bool {
        self.mandatory
    }

    pub fn is_primary(&self) -> bool {
        self.is_primary
    }

    /// Default value for this field's kind
    pub fn default_value(&self) -> Option<Value> {
        default_value(self.kind())
    }

    /// Wire representation of this descriptor
    pub fn to_definition(&self) -> FieldDefinition {
        FieldDefinition {
            name: self.name.clone(),
            kind: self.kind(),
            mandatory: self.mandatory,
            validators: self.spec.to_validators(),
        }
    }

    pub(crate) fn mark_primary(&mut self) {
        self.is_primary = true;
        self.mandatory = true;
    }

    pub(crate) fn clear_primary(&mut self) {
        self.is_primary = false;
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = name;
    }

    pub(crate) fn set_spec(&mut self, spec: FieldSpec) {
        self.spec = spec;
    }

    /// Primary fields stay mandatory whatever is requested
    pub(crate) fn set_mandatory(&mut self, mandatory: bool) {
        self.mandatory = mandatory || self.is_primary;
    }
}

impl TryFrom<FieldDefinition> for FieldDescriptor {
    type Error = EngineError;

    fn try_from(definition: FieldDefinition) -> Result<Self> {
        let spec = FieldSpec::from_validators(definition.kind, &definition.validators);
        FieldDescriptor::new(&definition.name, spec, definition.mandatory)
    }
}

impl From<FieldDescriptor> for FieldDefinition {
    fn from(field: FieldDescriptor) -> Self {
        field.to_definition()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_field_name() {
        assert_eq!(normalize_field_name("Serial Number").unwrap(), "Serial_Number");
        assert_eq!(normalize_field_name("a \t b").unwrap(), "a_b");
        assert_eq!(normalize_field_name("plain").unwrap(), "plain");
        assert!(matches!(
            normalize_field_name("$id"),
            Err(EngineError::InvalidFieldName(_))
        ));
        assert_eq!(normalize_field_name("price $").unwrap(), "price_$");
        assert!(matches!(
            normalize_field_name(""),
            Err(EngineError::InvalidFieldName(_))
        ));
    }

    #[test]
    fn test_default_values() {
        assert_eq!(default_value(FieldKind::Boolean), Some(json!(false)));
        assert_eq!(default_value(FieldKind::String), None);
        assert_eq!(default_value(FieldKind::Integer), None);
        assert_eq!(default_value(FieldKind::Date), None);
        assert_eq!(default_value(FieldKind::Email), None);
    }

    #[test]
    fn test_integer_bounds_parse_as_integers() {
        assert_eq!(parse_integer_bound(&json!(10)), Some(10));
        assert_eq!(parse_integer_bound(&json!(10.0)), Some(10));
        assert_eq!(parse_integer_bound(&json!(" 7 ")), Some(7));
        assert_eq!(parse_integer_bound(&json!("3.0")), Some(3));
        assert_eq!(parse_integer_bound(&json!(2.5)), None);
        assert_eq!(parse_integer_bound(&json!("ten")), None);
        assert_eq!(parse_integer_bound(&json!(null)), None);
    }

    #[test]
    fn test_unparsable_constraints_become_absent() {
        let validators = Validators {
            min: Some(json!("abc")),
            max: Some(json!(-4)),
            ..Validators::default()
        };
        assert_eq!(
            FieldSpec::from_validators(FieldKind::String, &validators),
            FieldSpec::String(Bounds::none())
        );

        let validators = Validators {
            min_date: Some(json!("yesterday")),
            max_date: Some(json!("2024-12-31")),
            ..Validators::default()
        };
        assert_eq!(
            FieldSpec::from_validators(FieldKind::Date, &validators),
            FieldSpec::Date(Bounds::new(None, Some("2024-12-31".to_string())))
        );
    }

    #[test]
    fn test_definition_wire_shape() {
        let raw = json!({
            "name": "Unit Price",
            "type": "integer",
            "mandatory": false,
            "validators": { "min": "1", "max": 500 }
        });
        let field: FieldDescriptor = serde_json::from_value(raw).unwrap();
        assert_eq!(field.name(), "Unit_Price");
        assert_eq!(field.spec(), &FieldSpec::integer(Some(1), Some(500)));
        assert!(!field.is_primary());

        let back = serde_json::to_value(&field).unwrap();
        assert_eq!(
            back,
            json!({
                "name": "Unit_Price",
                "type": "integer",
                "mandatory": false,
                "validators": { "min": 1, "max": 500 }
            })
        );
    }

    #[test]
    fn test_definition_defaults() {
        let field: FieldDescriptor = serde_json::from_value(json!({ "name": "Notes" })).unwrap();
        assert_eq!(field.kind(), FieldKind::String);
        assert!(!field.is_mandatory());
        assert_eq!(
            serde_json::to_value(&field).unwrap()["validators"],
            json!({})
        );
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let result: std::result::Result<FieldDescriptor, _> =
            serde_json::from_value(json!({ "name": "x", "type": "decimal" }));
        assert!(result.is_err());
    }
}
