//! Operation envelope
//!
//! Every plugin operation call and response travels in the same wrapper:
//!
//! ```text
//! Request:  { operation: string, options: <operation-specific object> }
//! Response: { success: true,  data: <operation-specific object> }
//!         | { success: false, error: { code, message, details? } }
//! ```

use crate::error::{Error, ErrorCode};
use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// Inbound operation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationRequest {
    pub operation: String,
    #[serde(default = "empty_options")]
    pub options: Value,
}

fn empty_options() -> Value {
    Value::Object(Map::new())
}

impl OperationRequest {
    pub fn new(operation: impl Into<String>, options: Value) -> Self {
        Self {
            operation: operation.into(),
            options,
        }
    }

    /// Decode the options into an operation-specific type
    pub fn options<T: DeserializeOwned>(&self) -> Result<T, Error> {
        serde_json::from_value(self.options.clone())
            .map_err(|e| Error::invalid_options(&self.operation, e))
    }
}

/// Error half of a failed envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Stable code. Our own codes are [`ErrorCode`] strings; plugin-domain
    /// failures keep whatever code the plugin reported.
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ErrorBody {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.as_str().to_string(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Uniform success/error result wrapper
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope<T> {
    Success(T),
    Failure(ErrorBody),
}

impl<T> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Envelope::Success(data)
    }

    pub fn fail(code: ErrorCode, message: impl Into<String>) -> Self {
        Envelope::Failure(ErrorBody::new(code, message))
    }

    /// Wrap an orchestration error under an operation-level code
    ///
    /// The envelope code names the failed operation category, the
    /// underlying error code goes into `details.cause`.
    pub fn from_error(code: ErrorCode, err: &Error) -> Self {
        Envelope::Failure(ErrorBody::new(code, err.to_string()).with_details(err.details()))
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Envelope::Success(_))
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            Envelope::Success(data) => Some(data),
            Envelope::Failure(_) => None,
        }
    }

    pub fn error(&self) -> Option<&ErrorBody> {
        match self {
            Envelope::Success(_) => None,
            Envelope::Failure(body) => Some(body),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Envelope<U> {
        match self {
            Envelope::Success(data) => Envelope::Success(f(data)),
            Envelope::Failure(body) => Envelope::Failure(body),
        }
    }

    pub fn into_result(self) -> std::result::Result<T, ErrorBody> {
        match self {
            Envelope::Success(data) => Ok(data),
            Envelope::Failure(body) => Err(body),
        }
    }
}

impl<T: Serialize> Envelope<T> {
    /// Erase the payload type for transport
    pub fn into_value(self) -> Envelope<Value> {
        match self {
            Envelope::Success(data) => match serde_json::to_value(data) {
                Ok(value) => Envelope::Success(value),
                Err(e) => Envelope::fail(ErrorCode::InternalError, e.to_string()),
            },
            Envelope::Failure(body) => Envelope::Failure(body),
        }
    }
}

impl<T: DeserializeOwned> Envelope<T> {
    /// Decode an envelope from a parsed JSON object
    ///
    /// Rejects objects whose success flag is not matched by the
    /// corresponding `data` / `error` field.
    pub fn from_value(value: Value) -> Result<Self, Error> {
        let Value::Object(mut object) = value else {
            return Err(Error::InvalidEnvelope("expected a JSON object".into()));
        };

        let success = match object.get("success") {
            Some(Value::Bool(flag)) => *flag,
            Some(_) => return Err(Error::InvalidEnvelope("`success` must be a boolean".into())),
            None => return Err(Error::InvalidEnvelope("missing `success` flag".into())),
        };

        if success {
            let data = object
                .remove("data")
                .ok_or_else(|| Error::InvalidEnvelope("success envelope without `data`".into()))?;
            let data = serde_json::from_value(data)
                .map_err(|e| Error::InvalidEnvelope(format!("unexpected `data` shape: {}", e)))?;
            Ok(Envelope::Success(data))
        } else {
            let error = object
                .remove("error")
                .ok_or_else(|| Error::InvalidEnvelope("failure envelope without `error`".into()))?;
            let body = serde_json::from_value(error)
                .map_err(|e| Error::InvalidEnvelope(format!("unexpected `error` shape: {}", e)))?;
            Ok(Envelope::Failure(body))
        }
    }
}

#[derive(Serialize)]
struct WireEnvelope<'a, T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<&'a T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a ErrorBody>,
}

impl<T: Serialize> Serialize for Envelope<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let wire = match self {
            Envelope::Success(data) => WireEnvelope {
                success: true,
                data: Some(data),
                error: None,
            },
            Envelope::Failure(body) => WireEnvelope {
                success: false,
                data: None,
                error: Some(body),
            },
        };
        wire.serialize(serializer)
    }
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for Envelope<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Envelope::from_value(value).map_err(D::Error::custom)
    }
}
