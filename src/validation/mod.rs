// Declarative request validation: every declared part of a request is
// checked against its schema and all field errors are reported together.
pub mod field;

pub use field::{Field, FieldType, ObjectSchema, TransformError};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::error::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestPart {
    Body,
    Params,
    Query,
    Headers,
}

impl RequestPart {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestPart::Body => "body",
            RequestPart::Params => "params",
            RequestPart::Query => "query",
            RequestPart::Headers => "headers",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldError {
    pub location: RequestPart,
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(location: RequestPart, field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            location,
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ValidationFailure {
    #[error("{} invalid field(s)", .0.len())]
    Invalid(Vec<FieldError>),

    #[error("validation aborted: {0}")]
    Internal(String),
}

/// Request parts as received, before validation. Header names are lowercase.
#[derive(Debug, Clone, Default)]
pub struct RawRequest {
    pub params: Map<String, Value>,
    pub query: Map<String, Value>,
    pub headers: Map<String, Value>,
    /// `Value::Null` for an empty body
    pub body: Value,
    /// Set when the body was present but not JSON
    pub body_error: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RequestSchema {
    pub body: Option<ObjectSchema>,
    pub params: Option<ObjectSchema>,
    pub query: Option<ObjectSchema>,
    pub headers: Option<ObjectSchema>,
}

impl RequestSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn body(mut self, schema: ObjectSchema) -> Self {
        self.body = Some(schema);
        self
    }

    pub fn params(mut self, schema: ObjectSchema) -> Self {
        self.params = Some(schema);
        self
    }

    pub fn query(mut self, schema: ObjectSchema) -> Self {
        self.query = Some(schema);
        self
    }

    pub fn headers(mut self, schema: ObjectSchema) -> Self {
        self.headers = Some(schema);
        self
    }

    /// Parts without a schema pass through untouched. Parts with one are
    /// replaced by their coerced, default-filled, stripped form.
    pub fn validate(&self, raw: RawRequest) -> Result<ValidatedRequest, ValidationFailure> {
        let mut errors = Vec::new();

        let params = match &self.params {
            Some(schema) => schema.validate(RequestPart::Params, &Value::Object(raw.params), &mut errors)?,
            None => raw.params,
        };
        let query = match &self.query {
            Some(schema) => schema.validate(RequestPart::Query, &Value::Object(raw.query), &mut errors)?,
            None => raw.query,
        };
        let headers = match &self.headers {
            Some(schema) => schema.validate(RequestPart::Headers, &Value::Object(raw.headers), &mut errors)?,
            None => raw.headers,
        };
        let body = match (&self.body, raw.body_error) {
            (Some(_), Some(reason)) => {
                errors.push(FieldError::new(RequestPart::Body, "", format!("Malformed JSON: {}", reason)));
                Value::Null
            }
            (Some(schema), None) => Value::Object(schema.validate(RequestPart::Body, &raw.body, &mut errors)?),
            (None, _) => raw.body,
        };

        if !errors.is_empty() {
            return Err(ValidationFailure::Invalid(errors));
        }

        Ok(ValidatedRequest { body, params, query, headers })
    }
}

/// Output of a successful validation, handed to handlers as an extension.
#[derive(Debug, Clone, Default)]
pub struct ValidatedRequest {
    pub body: Value,
    pub params: Map<String, Value>,
    pub query: Map<String, Value>,
    pub headers: Map<String, Value>,
}

impl ValidatedRequest {
    pub fn body_as<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_value(self.body.clone())
            .map_err(|e| ApiError::bad_request(format!("Invalid request body: {}", e)))
    }

    pub fn query_as<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_value(Value::Object(self.query.clone()))
            .map_err(|e| ApiError::bad_request(format!("Invalid query: {}", e)))
    }

    pub fn param_uuid(&self, name: &str) -> Result<Uuid, ApiError> {
        self.params
            .get(name)
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok())
            .ok_or_else(|| ApiError::bad_request(format!("Missing or invalid path parameter '{}'", name)))
    }
}
