//! Controller version discovery.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Response of `GET /version`.
///
/// Besides the build identification, the controller advertises the path
/// prefixes of its API flavors; the edge client adopts the `edge` / `v1`
/// path as its request prefix when present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerVersion {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub revision: String,
    #[serde(rename = "buildDate", default)]
    pub build_date: String,
    #[serde(rename = "apiVersions", default, skip_serializing_if = "Option::is_none")]
    pub api_versions: Option<ApiVersions>,
}

/// API flavors advertised by the controller, keyed by version tag.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiVersions {
    #[serde(default)]
    pub edge: HashMap<String, ApiPath>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiPath {
    pub path: String,
}

impl ControllerVersion {
    /// The path prefix for edge API v1, if the controller advertised one.
    pub fn edge_v1_path(&self) -> Option<&str> {
        self.api_versions
            .as_ref()
            .and_then(|v| v.edge.get("v1"))
            .map(|p| p.path.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_decodes_edge_path() {
        let v: ControllerVersion = serde_json::from_str(
            r#"{
                "version": "v1.1.15",
                "revision": "7e8fe3a4f07e",
                "buildDate": "2025-05-04 18:09:50",
                "apiVersions": {"edge": {"v1": {"path": "/edge/client/v1"}}}
            }"#,
        )
        .unwrap();
        assert_eq!(v.version, "v1.1.15");
        assert_eq!(v.edge_v1_path(), Some("/edge/client/v1"));
    }

    #[test]
    fn version_without_api_versions() {
        let v: ControllerVersion =
            serde_json::from_str(r#"{"version": "v1.0.0", "revision": "", "buildDate": ""}"#)
                .unwrap();
        assert_eq!(v.edge_v1_path(), None);
    }
}
