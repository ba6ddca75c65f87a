//! Services and the posture queries attached to them.
//!
//! The controller attaches posture policies to services; each policy carries
//! a set of posture queries the endpoint must keep answering. The edge
//! client walks these maps every posture tick to compute the probes it
//! needs to run.

use serde::{Deserialize, Serialize};

/// Timeout value meaning "this check never expires".
pub const NO_TIMEOUT: i64 = -1;

/// A service the identity is authorized to reach.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "encryptionRequired", default)]
    pub encryption_required: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub permissions: Vec<String>,
    #[serde(rename = "postureQueries", default, skip_serializing_if = "Vec::is_empty")]
    pub posture_queries: Vec<PostureQuerySet>,
}

impl Service {
    /// True when any posture query on this service carries a real timeout,
    /// i.e. the controller will expire the check unless it is re-proven.
    pub fn has_timed_query(&self) -> bool {
        self.posture_queries
            .iter()
            .flat_map(|set| &set.posture_queries)
            .any(|q| q.timeout != NO_TIMEOUT)
    }
}

/// One posture policy's queries as attached to a service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostureQuerySet {
    #[serde(rename = "policyId", default)]
    pub policy_id: String,
    #[serde(rename = "policyType", default, skip_serializing_if = "Option::is_none")]
    pub policy_type: Option<String>,
    #[serde(rename = "isPassing", default)]
    pub is_passing: bool,
    #[serde(rename = "postureQueries", default)]
    pub posture_queries: Vec<PostureQuery>,
}

/// The kind of fact a posture query demands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueryType {
    #[serde(rename = "OS")]
    Os,
    #[serde(rename = "MAC")]
    Mac,
    #[serde(rename = "DOMAIN")]
    Domain,
    #[serde(rename = "PROCESS")]
    Process,
    #[serde(rename = "PROCESS_MULTI")]
    ProcessMulti,
    #[serde(rename = "ENDPOINT_STATE")]
    EndpointState,
    /// Query types this client does not answer (e.g. MFA prompts).
    #[serde(other)]
    Other,
}

/// One posture query within a policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostureQuery {
    pub id: String,
    #[serde(rename = "queryType")]
    pub query_type: QueryType,
    #[serde(rename = "isPassing", default)]
    pub is_passing: bool,
    /// Seconds until the controller expires this check; [`NO_TIMEOUT`]
    /// means it never does.
    #[serde(default = "default_timeout")]
    pub timeout: i64,
    #[serde(rename = "timeoutRemaining", default, skip_serializing_if = "Option::is_none")]
    pub timeout_remaining: Option<i64>,
    /// Single watched process, for `PROCESS` queries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process: Option<ProcessCheck>,
    /// Watched processes, for `PROCESS_MULTI` queries.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub processes: Vec<ProcessCheck>,
}

fn default_timeout() -> i64 {
    NO_TIMEOUT
}

/// A process the controller wants watched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessCheck {
    pub path: String,
    #[serde(rename = "osType", default, skip_serializing_if = "Option::is_none")]
    pub os_type: Option<String>,
}

/// Response of `GET /current-api-session/service-updates`: an opaque
/// change stamp; a repeated value means the service catalog is unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceUpdate {
    #[serde(rename = "lastChangeAt", default)]
    pub last_change_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(query_type: QueryType, timeout: i64) -> PostureQuery {
        PostureQuery {
            id: "q1".into(),
            query_type,
            is_passing: false,
            timeout,
            timeout_remaining: None,
            process: None,
            processes: Vec::new(),
        }
    }

    #[test]
    fn query_type_wire_names() {
        assert_eq!(serde_json::to_string(&QueryType::Os).unwrap(), r#""OS""#);
        assert_eq!(
            serde_json::to_string(&QueryType::ProcessMulti).unwrap(),
            r#""PROCESS_MULTI""#
        );
        let parsed: QueryType = serde_json::from_str(r#""MFA""#).unwrap();
        assert_eq!(parsed, QueryType::Other);
    }

    #[test]
    fn missing_timeout_means_no_expiry() {
        let q: PostureQuery =
            serde_json::from_str(r#"{"id": "q1", "queryType": "OS"}"#).unwrap();
        assert_eq!(q.timeout, NO_TIMEOUT);
    }

    #[test]
    fn service_decodes_posture_queries() {
        let svc: Service = serde_json::from_str(
            r#"{
                "id": "svc1",
                "name": "payroll",
                "encryptionRequired": true,
                "postureQueries": [{
                    "policyId": "pol1",
                    "isPassing": false,
                    "postureQueries": [
                        {"id": "q1", "queryType": "PROCESS", "timeout": 600,
                         "process": {"path": "/usr/bin/agent", "osType": "Linux"}},
                        {"id": "q2", "queryType": "PROCESS_MULTI",
                         "processes": [{"path": "/usr/bin/agent"}, {"path": "/opt/av/scan"}]}
                    ]
                }]
            }"#,
        )
        .unwrap();
        let set = &svc.posture_queries[0];
        assert_eq!(set.policy_id, "pol1");
        assert_eq!(set.posture_queries[0].query_type, QueryType::Process);
        assert_eq!(
            set.posture_queries[0].process.as_ref().unwrap().path,
            "/usr/bin/agent"
        );
        assert_eq!(set.posture_queries[1].processes.len(), 2);
        assert!(svc.has_timed_query());
    }

    #[test]
    fn untimed_service_has_no_timed_query() {
        let svc = Service {
            posture_queries: vec![PostureQuerySet {
                posture_queries: vec![query(QueryType::Os, NO_TIMEOUT)],
                ..Default::default()
            }],
            ..Default::default()
        };
        assert!(!svc.has_timed_query());
    }
}
