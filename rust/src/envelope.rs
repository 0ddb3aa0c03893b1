//! The uniform success/data/error wrapper every remote call returns.

use std::fmt;

use serde::de::{DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};

use crate::remote::RemoteError;

/// Message used when neither the envelope nor the transport says what went wrong.
pub const FALLBACK_ERROR: &str = "An unexpected error occurred";

pub type RemoteResult<T> = Result<Envelope<T>, RemoteError>;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Deserialize)]
struct RawEnvelope {
    success: bool,
    #[serde(default)]
    data: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<String>,
}

/// `data` is only decoded as `T` on success; a failure keeps its `error`
/// whatever shape the payload has.
impl<'de, T: DeserializeOwned> Deserialize<'de> for Envelope<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawEnvelope::deserialize(deserializer)?;
        let data = match raw.data {
            Some(value) if raw.success && !value.is_null() => {
                Some(serde_json::from_value(value).map_err(serde::de::Error::custom)?)
            }
            _ => None,
        };
        Ok(Self {
            success: raw.success,
            data,
            error: raw.error,
        })
    }
}

impl<T> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn ok_empty() -> Self {
        Self {
            success: true,
            data: None,
            error: None,
        }
    }

    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }

    /// Collapse into a `Result`. `error` is ignored on success and `data` on failure.
    pub fn into_result(self) -> Result<Option<T>, String> {
        if self.success {
            Ok(self.data)
        } else {
            Err(non_empty(self.error).unwrap_or_else(|| FALLBACK_ERROR.to_string()))
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Envelope<U> {
        Envelope {
            success: self.success,
            data: self.data.map(f),
            error: self.error,
        }
    }
}

/// Settle a remote call into its payload or a human-readable failure message.
///
/// Envelope failures and transport errors end up in the same `Err(String)`, so
/// callers never need to tell them apart.
pub fn settle<T, E: fmt::Display>(outcome: Result<Envelope<T>, E>) -> Result<Option<T>, String> {
    match outcome {
        Ok(envelope) => envelope.into_result(),
        Err(err) => {
            Err(non_empty(Some(err.to_string())).unwrap_or_else(|| FALLBACK_ERROR.to_string()))
        }
    }
}

fn non_empty(message: Option<String>) -> Option<String> {
    message.filter(|m| !m.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Silent;

    impl fmt::Display for Silent {
        fn fmt(&self, _f: &mut fmt::Formatter<'_>) -> fmt::Result {
            Ok(())
        }
    }

    #[test]
    fn success_ignores_stray_error_field() {
        let env: Envelope<u32> =
            serde_json::from_str(r#"{"success":true,"data":7,"error":"ignored"}"#).unwrap();
        assert_eq!(env.into_result(), Ok(Some(7)));
    }

    #[test]
    fn failure_ignores_data_and_prefers_envelope_error() {
        let env: Envelope<u32> =
            serde_json::from_str(r#"{"success":false,"data":7,"error":"row locked"}"#).unwrap();
        assert_eq!(env.into_result(), Err("row locked".to_string()));
    }

    #[test]
    fn failure_with_mismatched_data_keeps_server_message() {
        let body = r#"{"success":false,"data":{},"error":"row locked"}"#;
        let outcome = serde_json::from_str::<Envelope<Vec<u32>>>(body);
        assert_eq!(settle(outcome), Err("row locked".to_string()));
    }

    #[test]
    fn success_with_mismatched_data_is_a_decode_error() {
        let outcome = serde_json::from_str::<Envelope<Vec<u32>>>(r#"{"success":true,"data":{}}"#);
        assert!(outcome.is_err());
        let empty: Envelope<Vec<u32>> =
            serde_json::from_str(r#"{"success":true,"data":null}"#).unwrap();
        assert_eq!(empty.into_result(), Ok(None));
    }

    #[test]
    fn failure_without_message_uses_fallback() {
        let env: Envelope<u32> = serde_json::from_str(r#"{"success":false}"#).unwrap();
        assert_eq!(env.into_result(), Err(FALLBACK_ERROR.to_string()));
    }

    #[test]
    fn settle_uses_exception_message_then_fallback() {
        let boom: Result<Envelope<u32>, &str> = Err("connection reset");
        assert_eq!(settle(boom), Err("connection reset".to_string()));

        let silent: Result<Envelope<u32>, Silent> = Err(Silent);
        assert_eq!(settle(silent), Err(FALLBACK_ERROR.to_string()));
    }

    #[test]
    fn ok_envelope_serializes_without_error_key() {
        let json = serde_json::to_value(Envelope::ok(1u8)).unwrap();
        assert_eq!(json, serde_json::json!({"success": true, "data": 1}));
        let json = serde_json::to_value(Envelope::<u8>::fail("nope")).unwrap();
        assert_eq!(json, serde_json::json!({"success": false, "error": "nope"}));
    }
}
