//! Error taxonomy for controller interactions.
//!
//! Every failure the edge client can surface is an [`ApiError`]: an internal
//! [`ErrorKind`] plus whatever the controller told us (server code string,
//! HTTP status, message). Server code strings are mapped to kinds through a
//! fixed table; unknown codes degrade to [`ErrorKind::Unspecified`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Server code attached to synthesized authentication failures.
pub const CODE_UNAUTHORIZED: &str = "UNAUTHORIZED";

/// Server code attached to locally cancelled requests.
pub const CODE_CONTEXT_DISABLED: &str = "CONTEXT_DISABLED";

/// Server code attached to responses that could not be parsed.
pub const CODE_INVALID_CONTROLLER_RESPONSE: &str = "INVALID_CONTROLLER_RESPONSE";

/// Message used when an operation requires a session token and none is set.
pub const MSG_NO_API_SESSION: &str = "no api session token set for controller client";

/// Internal classification of a controller error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    NotFound,
    ControllerUnavailable,
    GatewayUnavailable,
    AuthFailed,
    InvalidPosture,
    MfaInvalidToken,
    MfaExists,
    MfaNotEnrolled,
    JwtInvalid,
    NotAuthorized,
    InvalidState,
    InvalidConfig,
    Disabled,
    Unspecified,
}

/// Map a server error-code string to an internal [`ErrorKind`].
///
/// The table is total over the codes the controller is known to emit;
/// anything else maps to [`ErrorKind::Unspecified`] with a warning.
pub fn code_to_kind(code: &str) -> ErrorKind {
    match code {
        "NOT_FOUND" => ErrorKind::NotFound,
        "CONTROLLER_UNAVAILABLE" => ErrorKind::ControllerUnavailable,
        "NO_ROUTABLE_INGRESS_NODES" => ErrorKind::GatewayUnavailable,
        "NO_EDGE_ROUTERS_AVAILABLE" => ErrorKind::GatewayUnavailable,
        "INVALID_AUTHENTICATION" => ErrorKind::AuthFailed,
        "REQUIRES_CERT_AUTH" => ErrorKind::AuthFailed,
        "UNAUTHORIZED" => ErrorKind::AuthFailed,
        "INVALID_AUTH" => ErrorKind::AuthFailed,
        "INVALID_POSTURE" => ErrorKind::InvalidPosture,
        "MFA_INVALID_TOKEN" => ErrorKind::MfaInvalidToken,
        "MFA_EXISTS" => ErrorKind::MfaExists,
        "MFA_NOT_ENROLLED" => ErrorKind::MfaNotEnrolled,
        "INVALID_ENROLLMENT_TOKEN" => ErrorKind::JwtInvalid,
        "COULD_NOT_VALIDATE" => ErrorKind::NotAuthorized,
        other => {
            tracing::warn!(code = %other, "unmapped controller error code");
            ErrorKind::Unspecified
        }
    }
}

/// An error surfaced by the edge client.
///
/// Carries the internal kind plus whatever context is available: the server
/// code string (when the controller reported one), the HTTP status of the
/// failing exchange, and a human-readable message.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind:?}: {message}")]
pub struct ApiError {
    pub kind: ErrorKind,
    pub code: Option<String>,
    pub http_status: Option<u16>,
    pub message: String,
}

impl ApiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: None,
            http_status: None,
            message: message.into(),
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_http_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }

    /// The synthetic error returned when a session-scoped operation is
    /// attempted without a session token. No network I/O takes place.
    pub fn no_api_session() -> Self {
        Self::new(ErrorKind::AuthFailed, MSG_NO_API_SESSION).with_code(CODE_UNAUTHORIZED)
    }

    /// The synthetic error delivered to every request aborted by
    /// `cancel_all`.
    pub fn disabled() -> Self {
        Self::new(ErrorKind::Disabled, "request cancelled").with_code(CODE_CONTEXT_DISABLED)
    }

    /// True when this error came from a local cancellation rather than the
    /// controller.
    pub fn is_disabled(&self) -> bool {
        self.kind == ErrorKind::Disabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mapping_is_total_over_declared_codes() {
        let table = [
            ("NOT_FOUND", ErrorKind::NotFound),
            ("CONTROLLER_UNAVAILABLE", ErrorKind::ControllerUnavailable),
            ("NO_ROUTABLE_INGRESS_NODES", ErrorKind::GatewayUnavailable),
            ("NO_EDGE_ROUTERS_AVAILABLE", ErrorKind::GatewayUnavailable),
            ("INVALID_AUTHENTICATION", ErrorKind::AuthFailed),
            ("REQUIRES_CERT_AUTH", ErrorKind::AuthFailed),
            ("UNAUTHORIZED", ErrorKind::AuthFailed),
            ("INVALID_AUTH", ErrorKind::AuthFailed),
            ("INVALID_POSTURE", ErrorKind::InvalidPosture),
            ("MFA_INVALID_TOKEN", ErrorKind::MfaInvalidToken),
            ("MFA_EXISTS", ErrorKind::MfaExists),
            ("MFA_NOT_ENROLLED", ErrorKind::MfaNotEnrolled),
            ("INVALID_ENROLLMENT_TOKEN", ErrorKind::JwtInvalid),
            ("COULD_NOT_VALIDATE", ErrorKind::NotAuthorized),
        ];
        for (code, kind) in table {
            assert_eq!(code_to_kind(code), kind, "code {code}");
        }
    }

    #[test]
    fn mapping_is_deterministic() {
        for code in ["NOT_FOUND", "UNAUTHORIZED", "COULD_NOT_VALIDATE"] {
            assert_eq!(code_to_kind(code), code_to_kind(code));
        }
    }

    #[test]
    fn unknown_code_maps_to_unspecified() {
        assert_eq!(code_to_kind("SOMETHING_NEW"), ErrorKind::Unspecified);
        assert_eq!(code_to_kind(""), ErrorKind::Unspecified);
    }

    #[test]
    fn no_api_session_error_shape() {
        let err = ApiError::no_api_session();
        assert_eq!(err.kind, ErrorKind::AuthFailed);
        assert_eq!(err.code.as_deref(), Some(CODE_UNAUTHORIZED));
        assert_eq!(err.http_status, None);
        assert_eq!(err.message, MSG_NO_API_SESSION);
    }

    #[test]
    fn disabled_error_shape() {
        let err = ApiError::disabled();
        assert!(err.is_disabled());
        assert_eq!(err.code.as_deref(), Some(CODE_CONTEXT_DISABLED));
    }
}
