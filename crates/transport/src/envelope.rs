//! Backend response envelope and user-facing error details
//!
//! Most backend endpoints wrap their payload as
//! `{"status":..,"message":..,"data":..,"errors":{..},"timestamp":..}`.
//! Authentication endpoints return bare objects, so every field except
//! `status` is optional.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::TransportError;
use crate::request::Response;

/// Generic envelope around backend payloads.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiResponse<T> {
    #[serde(default)]
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<HashMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

/// Error summary suitable for showing to a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiErrorDetails {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<HashMap<String, String>>,
}

const GENERIC_MESSAGE: &str = "An error occurred";
const TIMEOUT_MESSAGE: &str = "Request timeout - please try again";
const NETWORK_MESSAGE: &str = "Network error - please check your internet connection";

impl ApiErrorDetails {
    /// Details for a response the backend actually sent.
    ///
    /// Uses the envelope's `message` and field `errors` when the body parses
    /// as one, otherwise falls back to a generic message.
    pub fn from_response(response: &Response) -> Self {
        let status = Some(response.status.as_u16());
        match serde_json::from_slice::<ApiResponse<serde_json::Value>>(&response.body) {
            Ok(envelope) => Self {
                message: envelope
                    .message
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| GENERIC_MESSAGE.to_string()),
                status,
                errors: envelope.errors,
            },
            Err(_) => Self {
                message: GENERIC_MESSAGE.to_string(),
                status,
                errors: None,
            },
        }
    }

    /// Details for an exchange that never produced a response.
    pub fn from_transport_error(error: &TransportError) -> Self {
        let message = if error.is_timeout() {
            TIMEOUT_MESSAGE
        } else {
            NETWORK_MESSAGE
        };
        Self {
            message: message.to_string(),
            status: None,
            errors: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn envelope_with_data_deserializes() {
        let json = r#"{"status":200,"data":{"id":3,"title":"Ownership"},"timestamp":"2025-01-01T00:00:00"}"#;
        let env: ApiResponse<serde_json::Value> = serde_json::from_str(json).unwrap();
        assert_eq!(env.status, 200);
        assert_eq!(env.data.unwrap()["title"], "Ownership");
        assert!(env.message.is_none());
    }

    #[test]
    fn details_use_envelope_message_and_errors() {
        let body = r#"{"status":400,"message":"Validation failed","errors":{"email":"must be a well-formed email address"}}"#;
        let details = Response::new(StatusCode::BAD_REQUEST, body).error_details();
        assert_eq!(details.message, "Validation failed");
        assert_eq!(details.status, Some(400));
        assert_eq!(
            details.errors.unwrap()["email"],
            "must be a well-formed email address"
        );
    }

    #[test]
    fn details_fall_back_for_empty_body() {
        let details = Response::new(StatusCode::UNAUTHORIZED, "").error_details();
        assert_eq!(details.message, GENERIC_MESSAGE);
        assert_eq!(details.status, Some(401));
    }

    #[test]
    fn details_for_timeout_and_network() {
        let timeout = ApiErrorDetails::from_transport_error(&TransportError::Timeout("10s".into()));
        assert_eq!(timeout.message, TIMEOUT_MESSAGE);
        let network =
            ApiErrorDetails::from_transport_error(&TransportError::Connect("refused".into()));
        assert_eq!(network.message, NETWORK_MESSAGE);
        assert!(network.status.is_none());
    }
}
