//! Identity, login, enrollment, MFA and certificate-extension models.

use serde::{Deserialize, Serialize};

/// The identity behind the current API session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityDetail {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "typeId", default, skip_serializing_if = "Option::is_none")]
    pub type_id: Option<String>,
}

/// Body of `POST /authenticate?method=cert`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthRequest {
    #[serde(rename = "sdkInfo")]
    pub sdk_info: SdkInfo,
    #[serde(rename = "envInfo")]
    pub env_info: EnvInfo,
    #[serde(rename = "configTypes", default, skip_serializing_if = "Vec::is_empty")]
    pub config_types: Vec<String>,
}

/// Identification of this SDK, reported at login.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SdkInfo {
    #[serde(rename = "type")]
    pub sdk_type: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(rename = "appId", default, skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
    #[serde(rename = "appVersion", default, skip_serializing_if = "Option::is_none")]
    pub app_version: Option<String>,
}

/// Host environment facts reported at login.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvInfo {
    pub os: String,
    pub arch: String,
    #[serde(rename = "osRelease", default)]
    pub os_release: String,
    #[serde(rename = "osVersion", default)]
    pub os_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
}

/// Supported enrollment modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnrollmentMethod {
    /// One-time token.
    Ott,
    /// One-time token with a caller-supplied CA-signed certificate.
    OttCa,
    /// Pre-authorized client certificate.
    Ca,
}

impl EnrollmentMethod {
    /// The value used in the `method` query parameter.
    pub fn as_str(&self) -> &'static str {
        match self {
            EnrollmentMethod::Ott => "ott",
            EnrollmentMethod::OttCa => "ottca",
            EnrollmentMethod::Ca => "ca",
        }
    }
}

/// Optional JSON body of `POST /enroll` when no CSR is supplied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrollmentRequest {
    pub name: String,
}

/// Result of an enrollment exchange.
///
/// When the controller answers with `application/x-pem-file` the body is the
/// issued certificate and lands in `cert` verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrollmentResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert: Option<String>,
    #[serde(rename = "serverCert", default, skip_serializing_if = "Option::is_none")]
    pub server_cert: Option<String>,
}

/// Body of MFA operations that carry a one-time code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MfaCode {
    pub code: String,
}

/// State of the identity's MFA enrollment (`GET /current-identity/mfa`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MfaEnrollment {
    #[serde(rename = "isVerified", default)]
    pub is_verified: bool,
    #[serde(rename = "provisioningUrl", default, skip_serializing_if = "Option::is_none")]
    pub provisioning_url: Option<String>,
    #[serde(rename = "recoveryCodes", default, skip_serializing_if = "Vec::is_empty")]
    pub recovery_codes: Vec<String>,
}

/// Response of `GET /current-identity/mfa/recovery-codes`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MfaRecoveryCodes {
    #[serde(rename = "recoveryCodes", default)]
    pub recovery_codes: Vec<String>,
}

/// Body of `POST /current-identity/authenticators/{id}/extend`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtendCertRequest {
    #[serde(rename = "clientCertCsr")]
    pub client_cert_csr: String,
}

/// Response of the certificate-extension request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtendCertResponse {
    #[serde(rename = "clientCert", default)]
    pub client_cert: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca: Option<String>,
}

/// Body of `POST /current-identity/authenticators/{id}/extend-verify`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyExtendCertRequest {
    #[serde(rename = "clientCert")]
    pub client_cert: String,
}

/// Body of `POST /current-api-session/certificates`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateApiCertRequest {
    #[serde(rename = "clientCertCsr")]
    pub client_cert_csr: String,
}

/// Response of `POST /current-api-session/certificates`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateApiCertResponse {
    #[serde(default)]
    pub certificate: String,
    #[serde(rename = "cas", default, skip_serializing_if = "Option::is_none")]
    pub cas: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enrollment_method_names() {
        assert_eq!(EnrollmentMethod::Ott.as_str(), "ott");
        assert_eq!(EnrollmentMethod::OttCa.as_str(), "ottca");
        assert_eq!(EnrollmentMethod::Ca.as_str(), "ca");
    }

    #[test]
    fn auth_request_wire_shape() {
        let req = AuthRequest {
            sdk_info: SdkInfo {
                sdk_type: "trellis-edge-rs".into(),
                version: "0.3.1".into(),
                ..Default::default()
            },
            env_info: EnvInfo {
                os: "linux".into(),
                arch: "x86_64".into(),
                os_release: "6.8.0".into(),
                os_version: "#1 SMP".into(),
                hostname: Some("edge-1".into()),
            },
            config_types: vec!["intercept.v1".into()],
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["sdkInfo"]["type"], "trellis-edge-rs");
        assert_eq!(json["envInfo"]["osRelease"], "6.8.0");
        assert_eq!(json["configTypes"][0], "intercept.v1");
    }

    #[test]
    fn extend_cert_roundtrip() {
        let resp: ExtendCertResponse =
            serde_json::from_str(r#"{"clientCert": "-----BEGIN CERTIFICATE-----"}"#).unwrap();
        assert!(resp.client_cert.starts_with("-----BEGIN"));
        assert_eq!(resp.ca, None);
    }

    #[test]
    fn mfa_enrollment_defaults() {
        let e: MfaEnrollment = serde_json::from_str(r#"{}"#).unwrap();
        assert!(!e.is_verified);
        assert!(e.recovery_codes.is_empty());
    }
}
