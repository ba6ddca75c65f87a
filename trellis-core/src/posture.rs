//! Posture response payloads.
//!
//! One [`PostureSubmission`] is the JSON body proving a single posture
//! check; the bulk endpoint takes an array of them. The controller answers
//! with a [`PostureResponse`] whose service timers feed the service-refresh
//! machinery.

use serde::{Deserialize, Serialize};

/// One posture proof, tagged by check type on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "typeId")]
pub enum PostureSubmission {
    #[serde(rename = "OS")]
    Os {
        id: String,
        #[serde(rename = "type")]
        os_type: String,
        version: String,
        build: String,
    },
    #[serde(rename = "MAC")]
    Mac {
        id: String,
        #[serde(rename = "macAddresses")]
        mac_addresses: Vec<String>,
    },
    #[serde(rename = "DOMAIN")]
    Domain { id: String, domain: String },
    #[serde(rename = "PROCESS")]
    Process {
        id: String,
        path: String,
        #[serde(rename = "isRunning")]
        is_running: bool,
        hash: String,
        signers: Vec<String>,
    },
    #[serde(rename = "ENDPOINT_STATE")]
    EndpointState { id: String, woken: bool, unlocked: bool },
}

impl PostureSubmission {
    /// The query id this proof answers.
    pub fn id(&self) -> &str {
        match self {
            PostureSubmission::Os { id, .. }
            | PostureSubmission::Mac { id, .. }
            | PostureSubmission::Domain { id, .. }
            | PostureSubmission::Process { id, .. }
            | PostureSubmission::EndpointState { id, .. } => id,
        }
    }
}

/// Controller response to a posture submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostureResponse {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<ServiceTimer>,
}

/// Per-service check timer returned with a posture response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceTimer {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<i64>,
    #[serde(rename = "timeoutRemaining", default, skip_serializing_if = "Option::is_none")]
    pub timeout_remaining: Option<i64>,
}
