//! API sessions and per-service network sessions.

use serde::{Deserialize, Serialize};

/// An authenticated API session with the controller.
///
/// The opaque `token` is sent as the `zt-session` header on every
/// session-scoped request. A session with outstanding [`AuthQuery`] items is
/// only partially authenticated (e.g. MFA still pending) and must not be
/// used to submit posture.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiSession {
    pub id: String,
    pub token: String,
    #[serde(rename = "expiresAt", default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
    #[serde(rename = "authQueries", default, skip_serializing_if = "Vec::is_empty")]
    pub auth_queries: Vec<AuthQuery>,
}

impl ApiSession {
    /// True when no secondary authentication is outstanding.
    pub fn is_fully_authenticated(&self) -> bool {
        self.auth_queries.is_empty()
    }
}

/// A secondary authentication demand attached to an API session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthQuery {
    #[serde(rename = "typeId", default)]
    pub type_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

/// Direction of a per-service session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionType {
    Dial,
    Bind,
}

/// A per-service session negotiated with the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetSession {
    pub id: String,
    pub token: String,
    #[serde(rename = "type")]
    pub session_type: SessionType,
    #[serde(rename = "serviceId", default, skip_serializing_if = "Option::is_none")]
    pub service_id: Option<String>,
    #[serde(rename = "edgeRouters", default, skip_serializing_if = "Vec::is_empty")]
    pub edge_routers: Vec<EdgeRouter>,
}

/// Body of `POST /sessions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSessionRequest {
    #[serde(rename = "serviceId")]
    pub service_id: String,
    #[serde(rename = "type")]
    pub session_type: SessionType,
}

/// An edge router the endpoint may reach a service through.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeRouter {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(rename = "supportedProtocols", default, skip_serializing_if = "std::collections::HashMap::is_empty")]
    pub supported_protocols: std::collections::HashMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_type_wire_names() {
        assert_eq!(serde_json::to_string(&SessionType::Dial).unwrap(), r#""Dial""#);
        assert_eq!(serde_json::to_string(&SessionType::Bind).unwrap(), r#""Bind""#);
    }

    #[test]
    fn api_session_partial_auth() {
        let s: ApiSession = serde_json::from_str(
            r#"{"id": "s1", "token": "T", "authQueries": [{"typeId": "MFA", "provider": "ziti"}]}"#,
        )
        .unwrap();
        assert!(!s.is_fully_authenticated());

        let s: ApiSession = serde_json::from_str(r#"{"id": "s1", "token": "T"}"#).unwrap();
        assert!(s.is_fully_authenticated());
    }

    #[test]
    fn create_session_request_shape() {
        let req = CreateSessionRequest {
            service_id: "svc9".into(),
            session_type: SessionType::Dial,
        };
        assert_eq!(
            serde_json::to_string(&req).unwrap(),
            r#"{"serviceId":"svc9","type":"Dial"}"#
        );
    }

    #[test]
    fn net_session_roundtrip() {
        let s = NetSession {
            id: "ns1".into(),
            token: "tok".into(),
            session_type: SessionType::Bind,
            service_id: Some("svc1".into()),
            edge_routers: vec![EdgeRouter {
                name: "er1".into(),
                hostname: Some("er1.example".into()),
                supported_protocols: [("tls".to_string(), "tls://er1.example:443".to_string())]
                    .into_iter()
                    .collect(),
            }],
        };
        let json = serde_json::to_string(&s).unwrap();
        let parsed: NetSession = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, s);
    }
}
