//! The standard controller response envelope.
//!
//! Every controller response that is not explicitly plain text is a JSON
//! object of shape `{ meta: { pagination: … }, data: <opaque>, error: {
//! code, message } }`. The `data` member is kept opaque here and decoded by
//! the operation that issued the request.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{code_to_kind, ApiError, ErrorKind, CODE_INVALID_CONTROLLER_RESPONSE};

/// Pagination block of the response meta.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
    #[serde(rename = "totalCount", default)]
    pub total_count: u32,
}

/// Response meta; currently only carries pagination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
}

/// Error member of the envelope as the controller reports it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeError {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// The decoded envelope of one controller response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<EnvelopeError>,
}

impl Envelope {
    /// Parse an envelope from raw response bytes.
    pub fn parse(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// The pagination block, if the response carried one.
    pub fn pagination(&self) -> Option<Pagination> {
        self.meta.and_then(|m| m.pagination)
    }

    /// Convert the envelope's error member, if present, into an [`ApiError`]
    /// with the exchange's HTTP status attached.
    pub fn api_error(&self, http_status: u16) -> Option<ApiError> {
        self.error.as_ref().map(|e| {
            let kind = e
                .code
                .as_deref()
                .map(code_to_kind)
                .unwrap_or(ErrorKind::Unspecified);
            ApiError {
                kind,
                code: e.code.clone(),
                http_status: Some(http_status),
                message: e.message.clone().unwrap_or_default(),
            }
        })
    }

    /// Decode the `data` member as the operation's response type.
    pub fn decode_data<T: serde::de::DeserializeOwned>(&self) -> Result<T, ApiError> {
        let data = self.data.clone().ok_or_else(invalid_data)?;
        serde_json::from_value(data).map_err(|_| invalid_data())
    }

    /// Like [`Envelope::decode_data`], but treats an absent `data` member as
    /// the given default. Used by operations with no meaningful body.
    pub fn decode_data_or<T: serde::de::DeserializeOwned>(&self, default: T) -> Result<T, ApiError> {
        match &self.data {
            None | Some(Value::Null) => Ok(default),
            Some(data) => serde_json::from_value(data.clone()).map_err(|_| invalid_data()),
        }
    }
}

/// The synthetic error for a response body that is not a valid envelope.
pub fn unparsable_response(http_status: u16, status_text: &str) -> ApiError {
    ApiError::new(ErrorKind::Unspecified, status_text)
        .with_code(CODE_INVALID_CONTROLLER_RESPONSE)
        .with_http_status(http_status)
}

/// The synthetic error for a `data` member that does not decode as the
/// operation's response type.
fn invalid_data() -> ApiError {
    ApiError::new(ErrorKind::InvalidState, "unexpected response JSON")
        .with_code(CODE_INVALID_CONTROLLER_RESPONSE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_roundtrip_preserves_members() {
        let env = Envelope {
            meta: Some(Meta {
                pagination: Some(Pagination {
                    limit: 25,
                    offset: 50,
                    total_count: 57,
                }),
            }),
            data: Some(json!([{"id": "svc1"}, {"id": "svc2"}])),
            error: None,
        };
        let text = serde_json::to_string(&env).unwrap();
        let parsed = Envelope::parse(text.as_bytes()).unwrap();
        assert_eq!(parsed, env);

        let with_error = Envelope {
            meta: None,
            data: None,
            error: Some(EnvelopeError {
                code: Some("NOT_FOUND".into()),
                message: Some("no such thing".into()),
            }),
        };
        let text = serde_json::to_string(&with_error).unwrap();
        assert_eq!(Envelope::parse(text.as_bytes()).unwrap(), with_error);
    }

    #[test]
    fn pagination_uses_wire_names() {
        let env = Envelope::parse(
            br#"{"meta":{"pagination":{"limit":10,"offset":20,"totalCount":99}},"data":[]}"#,
        )
        .unwrap();
        let page = env.pagination().unwrap();
        assert_eq!(page.limit, 10);
        assert_eq!(page.offset, 20);
        assert_eq!(page.total_count, 99);
    }

    #[test]
    fn error_member_maps_to_api_error() {
        let env =
            Envelope::parse(br#"{"error":{"code":"INVALID_AUTH","message":"bad cert"}}"#).unwrap();
        let err = env.api_error(401).unwrap();
        assert_eq!(err.kind, ErrorKind::AuthFailed);
        assert_eq!(err.code.as_deref(), Some("INVALID_AUTH"));
        assert_eq!(err.http_status, Some(401));
        assert_eq!(err.message, "bad cert");
    }

    #[test]
    fn absent_error_member_is_success() {
        let env = Envelope::parse(br#"{"data":{}}"#).unwrap();
        assert!(env.api_error(200).is_none());
    }

    #[test]
    fn unparsable_response_is_synthesized() {
        let err = unparsable_response(502, "Bad Gateway");
        assert_eq!(err.kind, ErrorKind::Unspecified);
        assert_eq!(err.code.as_deref(), Some(CODE_INVALID_CONTROLLER_RESPONSE));
        assert_eq!(err.http_status, Some(502));
        assert_eq!(err.message, "Bad Gateway");
    }

    #[test]
    fn data_decode_failure_is_invalid_state() {
        let env = Envelope::parse(br#"{"data":{"unexpected":true}}"#).unwrap();
        let err = env.decode_data::<Vec<String>>().unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidState);
        assert_eq!(err.message, "unexpected response JSON");
    }
}
