//! Request payloads and response bodies.
//!
//! # Design
//! Outgoing: structured payloads (objects, arrays) are JSON-encoded, text is
//! sent byte for byte, and "no payload" stays distinct from an empty string.
//! Incoming: bytes that parse as JSON become [`Body::Json`]; anything else is
//! kept as text. Parse failures never surface as errors.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::Error;

/// Body supplied by the caller for POST, PUT, PATCH and DELETE.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Payload {
    /// No request body at all.
    #[default]
    Empty,
    /// Sent unchanged.
    Text(String),
    /// Sent as its JSON text form.
    Json(Value),
}

impl Payload {
    /// Serialize any value into a JSON payload.
    pub fn json<T>(value: &T) -> Result<Self, Error>
    where
        T: Serialize + ?Sized,
    {
        Ok(Payload::Json(serde_json::to_value(value)?))
    }

    /// Wire form of the payload; `None` means "no body".
    pub(crate) fn into_body(self) -> Result<Option<String>, Error> {
        match self {
            Payload::Empty => Ok(None),
            Payload::Text(text) => Ok(Some(text)),
            Payload::Json(Value::Null) => Ok(None),
            Payload::Json(Value::String(text)) => Ok(Some(text)),
            Payload::Json(value) => Ok(Some(serde_json::to_string(&value)?)),
        }
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.to_string())
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Text(text)
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Payload::Json(value)
    }
}

impl From<()> for Payload {
    fn from(_: ()) -> Self {
        Payload::Empty
    }
}

impl<P: Into<Payload>> From<Option<P>> for Payload {
    fn from(payload: Option<P>) -> Self {
        payload.map(Into::into).unwrap_or_default()
    }
}

/// Response body after decoding.
///
/// Serializes as the bare JSON value, the text as a string, or `null`.
/// Deserializing reads strings back as [`Body::Text`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Body {
    /// The transport reported no body.
    Null,
    Json(Value),
    Text(String),
}

impl<'de> Deserialize<'de> for Body {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Value::deserialize(deserializer)? {
            Value::Null => Body::Null,
            Value::String(text) => Body::Text(text),
            value => Body::Json(value),
        })
    }
}

impl Body {
    /// Decode raw response bytes, falling back to text when they are not JSON.
    pub fn decode(bytes: Option<Vec<u8>>) -> Self {
        let Some(bytes) = bytes else {
            return Body::Null;
        };
        match serde_json::from_slice(&bytes) {
            Ok(value) => Body::Json(value),
            Err(_) => Body::Text(String::from_utf8_lossy(&bytes).into_owned()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Body::Null)
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Body::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Body::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Deserialize a JSON body into `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, Error> {
        match self {
            Body::Json(value) => Ok(T::deserialize(value)?),
            Body::Text(_) => Err(Error::Serialization("body is not JSON".to_string())),
            Body::Null => Err(Error::Serialization("response has no body".to_string())),
        }
    }
}
