//! Value Codec Module
//!
//! Integral values are stored as plain decimal text so counters and typed
//! writes share one format across backends. Everything else is stored as
//! JSON.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::Result;

/// A value as it is handed to a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Signed integer, stored as its decimal text
    Number(i64),
    /// Any other value, stored as JSON bytes
    Structured(Vec<u8>),
}

impl Payload {
    /// Picks the representation from the value's serialized shape.
    pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        let value = serde_json::to_value(value)?;
        if let Value::Number(n) = &value {
            if let Some(i) = n.as_i64() {
                return Ok(Payload::Number(i));
            }
        }
        Ok(Payload::Structured(serde_json::to_vec(&value)?))
    }

    /// Classifies bytes read back from a backend.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        match std::str::from_utf8(&bytes).ok().and_then(|s| s.parse().ok()) {
            Some(n) => Payload::Number(n),
            None => Payload::Structured(bytes),
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Payload::Number(n) => n.to_string().into_bytes(),
            Payload::Structured(bytes) => bytes,
        }
    }

    /// Decodes into the caller's type.
    ///
    /// # Errors
    /// `Serialization` when the stored value does not fit `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        match self {
            Payload::Number(n) => Ok(serde_json::from_value(Value::from(*n))?),
            Payload::Structured(bytes) => Ok(serde_json::from_slice(bytes)?),
        }
    }
}
