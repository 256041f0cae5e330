use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Number, Value};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use super::{FieldError, RequestPart, ValidationFailure};

static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid regex")
});

/// Outcome of a custom transform that did not produce a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformError {
    /// The input is unacceptable; reported as a field error (400)
    Invalid(String),
    /// The transform itself broke; aborts validation (500)
    Internal(String),
}

type TransformFn = dyn Fn(Value) -> Result<Value, TransformError> + Send + Sync;

#[derive(Clone)]
pub struct Transform(Arc<TransformFn>);

impl fmt::Debug for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Transform(..)")
    }
}

#[derive(Debug, Clone)]
pub enum FieldType {
    String,
    Integer,
    Number,
    Boolean,
    /// Normalized to the lowercase hyphenated form
    Uuid,
    /// Normalized to RFC 3339 in UTC
    DateTime,
    Enum(Vec<String>),
    Array(Box<Field>),
    Any,
}

#[derive(Debug, Clone)]
pub enum Constraint {
    MinLength(usize),
    MaxLength(usize),
    Min(f64),
    Max(f64),
    Pattern(Regex),
    Email,
}

/// Declarative rule for a single field.
///
/// Evaluation order: default, type coercion, constraints, transform.
/// Every failing constraint is reported, not just the first.
#[derive(Debug, Clone)]
pub struct Field {
    ty: FieldType,
    required: bool,
    default: Option<Value>,
    constraints: Vec<Constraint>,
    transform: Option<Transform>,
}

impl Field {
    fn of(ty: FieldType) -> Self {
        Self {
            ty,
            required: true,
            default: None,
            constraints: Vec::new(),
            transform: None,
        }
    }

    pub fn string() -> Self {
        Self::of(FieldType::String)
    }

    pub fn integer() -> Self {
        Self::of(FieldType::Integer)
    }

    pub fn number() -> Self {
        Self::of(FieldType::Number)
    }

    pub fn boolean() -> Self {
        Self::of(FieldType::Boolean)
    }

    pub fn uuid() -> Self {
        Self::of(FieldType::Uuid)
    }

    pub fn datetime() -> Self {
        Self::of(FieldType::DateTime)
    }

    pub fn enumeration(values: &[&str]) -> Self {
        Self::of(FieldType::Enum(values.iter().map(|v| v.to_string()).collect()))
    }

    pub fn array(items: Field) -> Self {
        Self::of(FieldType::Array(Box::new(items)))
    }

    pub fn any() -> Self {
        Self::of(FieldType::Any)
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Used when the field is absent or null; implies optional
    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self.required = false;
        self
    }

    pub fn min_length(mut self, len: usize) -> Self {
        self.constraints.push(Constraint::MinLength(len));
        self
    }

    pub fn max_length(mut self, len: usize) -> Self {
        self.constraints.push(Constraint::MaxLength(len));
        self
    }

    pub fn min(mut self, min: f64) -> Self {
        self.constraints.push(Constraint::Min(min));
        self
    }

    pub fn max(mut self, max: f64) -> Self {
        self.constraints.push(Constraint::Max(max));
        self
    }

    pub fn range(self, min: f64, max: f64) -> Self {
        self.min(min).max(max)
    }

    pub fn pattern(mut self, regex: Regex) -> Self {
        self.constraints.push(Constraint::Pattern(regex));
        self
    }

    pub fn email(mut self) -> Self {
        self.constraints.push(Constraint::Email);
        self
    }

    pub fn transform<F>(mut self, f: F) -> Self
    where
        F: Fn(Value) -> Result<Value, TransformError> + Send + Sync + 'static,
    {
        self.transform = Some(Transform(Arc::new(f)));
        self
    }

    /// Validate one value. Field errors are pushed onto `errors`; the
    /// return is `Ok(None)` for an absent optional field or a rejected one.
    pub(crate) fn check(
        &self,
        part: RequestPart,
        path: &str,
        value: Option<&Value>,
        errors: &mut Vec<FieldError>,
    ) -> Result<Option<Value>, ValidationFailure> {
        let value = match value.filter(|v| !v.is_null()) {
            Some(v) => v.clone(),
            None => match &self.default {
                Some(default) => default.clone(),
                None if self.required => {
                    errors.push(FieldError::new(part, path, "Required"));
                    return Ok(None);
                }
                None => return Ok(None),
            },
        };

        let coerced = match self.coerce(part, path, value, errors)? {
            Some(v) => v,
            None => return Ok(None),
        };

        let before = errors.len();
        for constraint in &self.constraints {
            if let Some(message) = check_constraint(constraint, &coerced) {
                errors.push(FieldError::new(part, path, message));
            }
        }
        if errors.len() > before {
            return Ok(None);
        }

        match &self.transform {
            None => Ok(Some(coerced)),
            Some(Transform(f)) => match f(coerced) {
                Ok(v) => Ok(Some(v)),
                Err(TransformError::Invalid(message)) => {
                    errors.push(FieldError::new(part, path, message));
                    Ok(None)
                }
                Err(TransformError::Internal(message)) => {
                    Err(ValidationFailure::Internal(format!("{}.{}: {}", part.as_str(), path, message)))
                }
            },
        }
    }

    fn coerce(
        &self,
        part: RequestPart,
        path: &str,
        value: Value,
        errors: &mut Vec<FieldError>,
    ) -> Result<Option<Value>, ValidationFailure> {
        let result = match &self.ty {
            FieldType::Any => Ok(value),
            FieldType::String => match value {
                Value::String(_) => Ok(value),
                _ => Err("Expected string".to_string()),
            },
            FieldType::Integer => coerce_integer(&value).ok_or_else(|| "Expected integer".to_string()),
            FieldType::Number => coerce_number(&value).ok_or_else(|| "Expected number".to_string()),
            FieldType::Boolean => coerce_boolean(&value).ok_or_else(|| "Expected boolean".to_string()),
            FieldType::Uuid => value
                .as_str()
                .and_then(|s| Uuid::parse_str(s.trim()).ok())
                .map(|id| Value::String(id.to_string()))
                .ok_or_else(|| "Invalid UUID".to_string()),
            FieldType::DateTime => coerce_datetime(&value)
                .map(|dt| Value::String(dt.to_rfc3339()))
                .ok_or_else(|| "Invalid date".to_string()),
            FieldType::Enum(allowed) => match value.as_str() {
                Some(s) if allowed.iter().any(|a| a == s) => Ok(value),
                _ => Err(format!("Expected one of: {}", allowed.join(", "))),
            },
            FieldType::Array(items) => {
                let elements = match value {
                    Value::Array(elements) => elements,
                    // Query strings carry lists as comma separated values
                    Value::String(s) if part != RequestPart::Body => s
                        .split(',')
                        .map(|item| Value::String(item.trim().to_string()))
                        .collect(),
                    _ => {
                        errors.push(FieldError::new(part, path, "Expected array"));
                        return Ok(None);
                    }
                };

                let before = errors.len();
                let mut out = Vec::with_capacity(elements.len());
                for (i, element) in elements.iter().enumerate() {
                    let item_path = format!("{}[{}]", path, i);
                    if let Some(v) = items.check(part, &item_path, Some(element), errors)? {
                        out.push(v);
                    }
                }
                if errors.len() > before {
                    return Ok(None);
                }
                Ok(Value::Array(out))
            }
        };

        match result {
            Ok(v) => Ok(Some(v)),
            Err(message) => {
                errors.push(FieldError::new(part, path, message));
                Ok(None)
            }
        }
    }
}

fn coerce_integer(value: &Value) -> Option<Value> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64).map(|f| f as i64))
            .map(Value::from),
        Value::String(s) => s.trim().parse::<i64>().ok().map(Value::from),
        _ => None,
    }
}

fn coerce_number(value: &Value) -> Option<Value> {
    match value {
        Value::Number(_) => Some(value.clone()),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number),
        _ => None,
    }
}

fn coerce_boolean(value: &Value) -> Option<Value> {
    match value {
        Value::Bool(_) => Some(value.clone()),
        Value::String(s) => match s.trim() {
            "true" | "1" => Some(Value::Bool(true)),
            "false" | "0" => Some(Value::Bool(false)),
            _ => None,
        },
        _ => None,
    }
}

fn coerce_datetime(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|naive| Utc.from_utc_datetime(&naive))
        }
        // Epoch milliseconds
        Value::Number(n) => n.as_i64().and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        _ => None,
    }
}

fn length_of(value: &Value) -> Option<usize> {
    match value {
        Value::String(s) => Some(s.chars().count()),
        Value::Array(a) => Some(a.len()),
        _ => None,
    }
}

fn check_constraint(constraint: &Constraint, value: &Value) -> Option<String> {
    match constraint {
        Constraint::MinLength(min) => match length_of(value) {
            Some(len) if len < *min => Some(format!("Must contain at least {} character(s)", min)),
            _ => None,
        },
        Constraint::MaxLength(max) => match length_of(value) {
            Some(len) if len > *max => Some(format!("Must contain at most {} character(s)", max)),
            _ => None,
        },
        Constraint::Min(min) => match value.as_f64() {
            Some(n) if n < *min => Some(format!("Must be at least {}", min)),
            _ => None,
        },
        Constraint::Max(max) => match value.as_f64() {
            Some(n) if n > *max => Some(format!("Must be at most {}", max)),
            _ => None,
        },
        Constraint::Pattern(regex) => match value.as_str() {
            Some(s) if !regex.is_match(s) => Some(format!("Must match pattern {}", regex.as_str())),
            _ => None,
        },
        Constraint::Email => match value.as_str() {
            Some(s) if !EMAIL_REGEX.is_match(s) => Some("Invalid email".to_string()),
            _ => None,
        },
    }
}

/// Ordered set of field rules for one request part.
///
/// Keys not declared here are dropped from the validated output.
#[derive(Debug, Clone, Default)]
pub struct ObjectSchema {
    fields: Vec<(String, Field)>,
}

impl ObjectSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: impl Into<String>, rule: Field) -> Self {
        self.fields.push((name.into(), rule));
        self
    }

    pub(crate) fn validate(
        &self,
        part: RequestPart,
        input: &Value,
        errors: &mut Vec<FieldError>,
    ) -> Result<Map<String, Value>, ValidationFailure> {
        let empty = Map::new();
        let object = match input {
            Value::Object(map) => map,
            Value::Null => &empty,
            _ => {
                errors.push(FieldError::new(part, "", "Expected object"));
                return Ok(Map::new());
            }
        };

        let mut out = Map::new();
        for (name, rule) in &self.fields {
            if let Some(value) = rule.check(part, name, object.get(name), errors)? {
                out.insert(name.clone(), value);
            }
        }
        Ok(out)
    }
}
