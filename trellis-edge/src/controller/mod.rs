//! Controller client: typed operations against one logical controller.
//!
//! The client multiplexes any number of in-flight exchanges, injects the
//! API session token once a login succeeds, follows controller-supplied
//! rebinds, tracks the controller instance identity, and drains paged list
//! endpoints transparently.

pub mod transport;

use std::sync::Mutex;

use reqwest::Method;
use serde::de::DeserializeOwned;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use trellis_core::error::{ApiError, ErrorKind};
use trellis_core::identity::{
    AuthRequest, CreateApiCertRequest, CreateApiCertResponse, EnrollmentMethod,
    EnrollmentRequest, EnrollmentResponse, EnvInfo, ExtendCertRequest, ExtendCertResponse,
    IdentityDetail, MfaCode, MfaEnrollment, MfaRecoveryCodes, SdkInfo, VerifyExtendCertRequest,
};
use trellis_core::posture::{PostureResponse, PostureSubmission};
use trellis_core::service::{Service, ServiceUpdate};
use trellis_core::session::{ApiSession, CreateSessionRequest, EdgeRouter, NetSession, SessionType};
use trellis_core::version::ControllerVersion;

use crate::config::{ControllerConfig, RedirectObserver, CONNECT_TIMEOUT};
use transport::{Transport, TxBody, TxOutcome, TxRequest};

/// Header carrying an MFA one-time code on code-authenticated requests.
const HDR_MFA_CODE: &str = "mfa-validation-code";

/// Mutable controller-side state, all touched under one lock.
#[derive(Default)]
struct CtrlState {
    url: String,
    path_prefix: String,
    page_size: u32,
    version: Option<ControllerVersion>,
    api_session: Option<ApiSession>,
    instance_id: Option<String>,
}

/// Client for one logical controller.
///
/// All operations are async and resolve exactly once. Session-scoped
/// operations fail immediately with [`ErrorKind::AuthFailed`] when no login
/// has succeeded; no network I/O takes place in that case.
pub struct Controller {
    transport: Transport,
    cancel_tx: watch::Sender<u64>,
    state: Mutex<CtrlState>,
    redirect_cb: Mutex<Option<RedirectObserver>>,
}

impl Controller {
    /// Create a client for the controller at `config.url`.
    ///
    /// Fails with [`ErrorKind::InvalidConfig`] when the HTTP client cannot
    /// be constructed from the supplied configuration.
    pub fn new(config: ControllerConfig) -> Result<Self, ApiError> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .pool_max_idle_per_host(0);
        if let Some(tls) = config.tls {
            builder = builder.use_preconfigured_tls(tls);
        }
        let http = builder
            .build()
            .map_err(|e| ApiError::new(ErrorKind::InvalidConfig, e.to_string()))?;

        let (cancel_tx, cancel_rx) = watch::channel(0u64);
        debug!(url = %config.url, "controller client initialized");

        Ok(Self {
            transport: Transport::new(http, cancel_rx),
            cancel_tx,
            state: Mutex::new(CtrlState {
                url: config.url,
                page_size: config.page_size,
                ..CtrlState::default()
            }),
            redirect_cb: Mutex::new(None),
        })
    }

    /// The base URL requests currently target.
    pub fn url(&self) -> String {
        self.state.lock().unwrap().url.clone()
    }

    /// The current API session, if a login has succeeded.
    pub fn api_session(&self) -> Option<ApiSession> {
        self.state.lock().unwrap().api_session.clone()
    }

    /// The controller instance identity last observed on a response.
    pub fn instance_id(&self) -> Option<String> {
        self.state.lock().unwrap().instance_id.clone()
    }

    /// The cached controller version, if `version` has completed.
    pub fn cached_version(&self) -> Option<ControllerVersion> {
        self.state.lock().unwrap().version.clone()
    }

    pub fn set_page_size(&self, page_size: u32) {
        self.state.lock().unwrap().page_size = page_size.max(1);
    }

    /// Install an observer invoked whenever the controller rebinds the
    /// client to a new base URL.
    pub fn set_redirect_observer(&self, observer: RedirectObserver) {
        *self.redirect_cb.lock().unwrap() = Some(observer);
    }

    /// Abort every in-flight request. Each affected operation resolves with
    /// kind [`ErrorKind::Disabled`]. Requests issued afterwards proceed
    /// normally.
    pub fn cancel_all(&self) {
        self.cancel_tx.send_modify(|generation| *generation += 1);
    }

    /// Cancel all in-flight requests and drop cached identity state. The
    /// client must not be used afterwards.
    pub fn close(&self) {
        self.cancel_all();
        let mut state = self.state.lock().unwrap();
        state.version = None;
        state.api_session = None;
        state.instance_id = None;
        state.path_prefix.clear();
    }

    // ------------------------------------------------------------------
    // Pre-session operations
    // ------------------------------------------------------------------

    /// `GET /version`: fetch and cache the controller version, adopting the
    /// advertised edge/v1 path as the request prefix.
    pub async fn version(&self) -> Result<ControllerVersion, ApiError> {
        let tx = self.request(Method::GET, "/version");
        let version: ControllerVersion = self.complete(tx).await?;

        let mut state = self.state.lock().unwrap();
        match version.edge_v1_path() {
            Some(path) => state.path_prefix = path.to_string(),
            None => warn!("controller did not provide expected(v1) API version path"),
        }
        state.version = Some(version.clone());
        Ok(version)
    }

    /// `POST /authenticate?method=cert`: authenticate with the client
    /// certificate carried by the TLS configuration. A successful login
    /// stores the session token for all subsequent requests.
    pub async fn login(&self, config_types: &[String]) -> Result<ApiSession, ApiError> {
        let auth_req = AuthRequest {
            sdk_info: sdk_info(),
            env_info: host_env_info(),
            config_types: config_types.to_vec(),
        };
        let mut tx = self.request(Method::POST, "/authenticate?method=cert");
        tx.body = json_body(&auth_req)?;

        match self.complete::<ApiSession>(tx).await {
            Ok(session) => {
                debug!(session = %session.id, "authenticated successfully");
                self.state.lock().unwrap().api_session = Some(session.clone());
                Ok(session)
            }
            Err(err) => {
                warn!(code = ?err.code, message = %err.message, "login failed");
                self.state.lock().unwrap().api_session = None;
                Err(err)
            }
        }
    }

    /// `GET /current-api-session`: refresh the stored API session.
    pub async fn current_api_session(&self) -> Result<ApiSession, ApiError> {
        self.require_session()?;
        let tx = self.request(Method::GET, "/current-api-session");
        match self.complete::<ApiSession>(tx).await {
            Ok(session) => {
                self.state.lock().unwrap().api_session = Some(session.clone());
                Ok(session)
            }
            Err(err) => {
                self.state.lock().unwrap().api_session = None;
                Err(err)
            }
        }
    }

    /// `DELETE /current-api-session`: end the API session. The stored token
    /// is cleared whether or not the controller acknowledged.
    pub async fn logout(&self) -> Result<(), ApiError> {
        self.require_session()?;
        let tx = self.request(Method::DELETE, "/current-api-session");
        let result = self.complete_unit(tx).await;
        debug!("logged out");
        self.state.lock().unwrap().api_session = None;
        result
    }

    /// `POST /enroll?method=…`: enroll this endpoint. With a CSR the body is
    /// the CSR itself (`text/plain`); a PEM response body is returned
    /// verbatim as the issued certificate.
    pub async fn enroll(
        &self,
        method: EnrollmentMethod,
        token: Option<&str>,
        csr: Option<&str>,
        name: Option<&str>,
    ) -> Result<EnrollmentResponse, ApiError> {
        let mut path = format!("/enroll?method={}", method.as_str());
        if let Some(token) = token {
            path.push_str("&token=");
            path.push_str(token);
        }

        let mut tx = self.request(Method::POST, &path);
        if let Some(csr) = csr {
            tx.body = TxBody::Text(csr.to_string());
        } else if let Some(name) = name {
            tx.body = json_body(&EnrollmentRequest { name: name.to_string() })?;
        }

        let outcome = self.transport.execute(tx).await?;
        self.observe_instance_id(&outcome);
        let result = if outcome.pem_body && outcome.status < 300 {
            Ok(EnrollmentResponse {
                cert: Some(String::from_utf8_lossy(&outcome.bytes).into_owned()),
                server_cert: None,
            })
        } else {
            outcome.envelope().and_then(|env| env.decode_data())
        };
        self.apply_rebind(&outcome);
        result
    }

    /// `GET /.well-known/est/cacerts`: fetch the controller's CA bundle as
    /// raw PKCS#7 bytes.
    pub async fn well_known_certs(&self) -> Result<Vec<u8>, ApiError> {
        let mut tx = self.request(Method::GET, "/.well-known/est/cacerts");
        tx.plain_text = true;
        tx.extra_headers.push(("accept", "application/pkcs7-mime".to_string()));

        let outcome = self.transport.execute(tx).await?;
        self.observe_instance_id(&outcome);
        let result = if outcome.status < 300 {
            Ok(outcome.bytes.clone())
        } else {
            outcome.envelope().map(|_| Vec::new())
        };
        self.apply_rebind(&outcome);
        result
    }

    // ------------------------------------------------------------------
    // Session-scoped operations
    // ------------------------------------------------------------------

    /// `GET /current-identity`.
    pub async fn current_identity(&self) -> Result<IdentityDetail, ApiError> {
        self.require_session()?;
        let tx = self.request(Method::GET, "/current-identity");
        self.complete(tx).await
    }

    /// `GET /current-api-session/service-updates`.
    pub async fn services_update(&self) -> Result<ServiceUpdate, ApiError> {
        self.require_session()?;
        let tx = self.request(Method::GET, "/current-api-session/service-updates");
        self.complete(tx).await
    }

    /// `GET /services`, draining every page.
    pub async fn services(&self) -> Result<Vec<Service>, ApiError> {
        self.paged("/services").await
    }

    /// `GET /current-identity/edge-routers`, draining every page.
    pub async fn edge_routers(&self) -> Result<Vec<EdgeRouter>, ApiError> {
        self.paged("/current-identity/edge-routers").await
    }

    /// Look up a single service by name. Resolves to `None` when the
    /// controller knows no such service.
    pub async fn service(&self, name: &str) -> Result<Option<Service>, ApiError> {
        self.require_session()?;
        let filter = encode_query_value(&format!("name=\"{name}\""));
        let tx = self.request(Method::GET, &format!("/services?filter={filter}"));
        let mut services: Vec<Service> = self.complete(tx).await?;
        Ok(if services.is_empty() {
            None
        } else {
            Some(services.swap_remove(0))
        })
    }

    /// `GET /sessions/{id}`.
    pub async fn session(&self, session_id: &str) -> Result<NetSession, ApiError> {
        self.require_session()?;
        let tx = self.request(Method::GET, &format!("/sessions/{session_id}"));
        self.complete(tx).await
    }

    /// `POST /sessions`: negotiate a session for one service.
    pub async fn create_session(
        &self,
        service_id: &str,
        session_type: SessionType,
    ) -> Result<NetSession, ApiError> {
        self.require_session()?;
        let mut tx = self.request(Method::POST, "/sessions");
        tx.body = json_body(&CreateSessionRequest {
            service_id: service_id.to_string(),
            session_type,
        })?;
        self.complete(tx).await
    }

    /// `GET /sessions`, draining every page.
    pub async fn sessions(&self) -> Result<Vec<NetSession>, ApiError> {
        self.paged("/sessions").await
    }

    // ------------------------------------------------------------------
    // Posture submission
    // ------------------------------------------------------------------

    /// `POST /posture-response`: submit one posture proof.
    pub async fn submit_posture(
        &self,
        submission: &PostureSubmission,
    ) -> Result<PostureResponse, ApiError> {
        let body = serde_json::to_string(submission)
            .map_err(|e| ApiError::new(ErrorKind::InvalidState, e.to_string()))?;
        self.post_posture_body("/posture-response", body).await
    }

    /// `POST /posture-response-bulk`: submit an array of posture proofs. A
    /// 404 means this controller has no bulk endpoint; callers degrade to
    /// per-item submission.
    pub async fn submit_posture_bulk(
        &self,
        submissions: &[PostureSubmission],
    ) -> Result<PostureResponse, ApiError> {
        let body = serde_json::to_string(submissions)
            .map_err(|e| ApiError::new(ErrorKind::InvalidState, e.to_string()))?;
        self.post_posture_body("/posture-response-bulk", body).await
    }

    /// Posture submission from a pre-serialized body. The posture engine
    /// caches serialized bodies and routes them through here.
    pub(crate) async fn post_posture_body(
        &self,
        path: &str,
        body: String,
    ) -> Result<PostureResponse, ApiError> {
        self.require_session()?;
        let mut tx = self.request(Method::POST, path);
        tx.body = TxBody::Json(body);
        let env_default = PostureResponse::default();
        let outcome = self.transport.execute(tx).await?;
        self.observe_instance_id(&outcome);
        let result = outcome
            .envelope()
            .and_then(|env| env.decode_data_or(env_default));
        self.apply_rebind(&outcome);
        result
    }

    // ------------------------------------------------------------------
    // MFA
    // ------------------------------------------------------------------

    /// `POST /authenticate/mfa`: answer the MFA challenge on a partially
    /// authenticated session.
    pub async fn mfa_login(&self, code: &str) -> Result<(), ApiError> {
        self.require_session()?;
        let mut tx = self.request(Method::POST, "/authenticate/mfa");
        tx.body = json_body(&MfaCode { code: code.to_string() })?;
        self.complete_unit(tx).await
    }

    /// `POST /current-identity/mfa`: begin MFA enrollment.
    pub async fn mfa_begin_enrollment(&self) -> Result<(), ApiError> {
        self.require_session()?;
        let mut tx = self.request(Method::POST, "/current-identity/mfa");
        tx.body = TxBody::Json(String::new());
        self.complete_unit(tx).await
    }

    /// `GET /current-identity/mfa`: fetch the MFA enrollment state.
    pub async fn mfa_enrollment(&self) -> Result<MfaEnrollment, ApiError> {
        self.require_session()?;
        let tx = self.request(Method::GET, "/current-identity/mfa");
        self.complete(tx).await
    }

    /// `DELETE /current-identity/mfa`: remove MFA from the identity.
    pub async fn mfa_remove(&self, code: &str) -> Result<(), ApiError> {
        self.require_session()?;
        let mut tx = self.request(Method::DELETE, "/current-identity/mfa");
        tx.extra_headers.push((HDR_MFA_CODE, code.to_string()));
        self.complete_unit(tx).await
    }

    /// `POST /current-identity/mfa/verify`: complete MFA enrollment.
    pub async fn mfa_verify(&self, code: &str) -> Result<(), ApiError> {
        self.require_session()?;
        let mut tx = self.request(Method::POST, "/current-identity/mfa/verify");
        tx.body = json_body(&MfaCode { code: code.to_string() })?;
        self.complete_unit(tx).await
    }

    /// `GET /current-identity/mfa/recovery-codes`.
    pub async fn mfa_recovery_codes(&self, code: &str) -> Result<MfaRecoveryCodes, ApiError> {
        self.require_session()?;
        let mut tx = self.request(Method::GET, "/current-identity/mfa/recovery-codes");
        tx.extra_headers.push((HDR_MFA_CODE, code.to_string()));
        self.complete(tx).await
    }

    /// `POST /current-identity/mfa/recovery-codes`: regenerate codes.
    pub async fn mfa_new_recovery_codes(&self, code: &str) -> Result<(), ApiError> {
        self.require_session()?;
        let mut tx = self.request(Method::POST, "/current-identity/mfa/recovery-codes");
        tx.body = json_body(&MfaCode { code: code.to_string() })?;
        self.complete_unit(tx).await
    }

    // ------------------------------------------------------------------
    // Certificate lifecycle
    // ------------------------------------------------------------------

    /// `POST /current-identity/authenticators/{id}/extend`.
    pub async fn extend_cert_authenticator(
        &self,
        authenticator_id: &str,
        csr: &str,
    ) -> Result<ExtendCertResponse, ApiError> {
        self.require_session()?;
        let path = format!("/current-identity/authenticators/{authenticator_id}/extend");
        let mut tx = self.request(Method::POST, &path);
        tx.body = json_body(&ExtendCertRequest { client_cert_csr: csr.to_string() })?;
        self.complete(tx).await
    }

    /// `POST /current-identity/authenticators/{id}/extend-verify`.
    pub async fn verify_extend_cert_authenticator(
        &self,
        authenticator_id: &str,
        client_cert: &str,
    ) -> Result<(), ApiError> {
        self.require_session()?;
        let path = format!("/current-identity/authenticators/{authenticator_id}/extend-verify");
        let mut tx = self.request(Method::POST, &path);
        tx.body = json_body(&VerifyExtendCertRequest { client_cert: client_cert.to_string() })?;
        self.complete_unit(tx).await
    }

    /// `POST /current-api-session/certificates`.
    pub async fn create_api_certificate(
        &self,
        csr_pem: &str,
    ) -> Result<CreateApiCertResponse, ApiError> {
        self.require_session()?;
        let mut tx = self.request(Method::POST, "/current-api-session/certificates");
        tx.body = json_body(&CreateApiCertRequest { client_cert_csr: csr_pem.to_string() })?;
        self.complete(tx).await
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Reject session-scoped operations synchronously while no token is set.
    fn require_session(&self) -> Result<(), ApiError> {
        if self.state.lock().unwrap().api_session.is_none() {
            warn!("no API session");
            return Err(ApiError::no_api_session());
        }
        Ok(())
    }

    /// Build a transaction for `path`, resolving the base URL, the adopted
    /// path prefix and the session token at this moment.
    fn request(&self, method: Method, path: &str) -> TxRequest {
        let state = self.state.lock().unwrap();
        let url = format!("{}{}{}", state.url, state.path_prefix, path);
        let mut tx = TxRequest::new(method, url);
        tx.session_token = state.api_session.as_ref().map(|s| s.token.clone());
        tx
    }

    /// Execute, decode the envelope, decode `data`, then apply any rebind
    /// the response carried.
    async fn complete<T: DeserializeOwned>(&self, tx: TxRequest) -> Result<T, ApiError> {
        let outcome = self.transport.execute(tx).await?;
        self.observe_instance_id(&outcome);
        let result = outcome.envelope().and_then(|env| env.decode_data());
        self.apply_rebind(&outcome);
        result
    }

    /// Like [`Controller::complete`] for operations with no response body.
    async fn complete_unit(&self, tx: TxRequest) -> Result<(), ApiError> {
        let outcome = self.transport.execute(tx).await?;
        self.observe_instance_id(&outcome);
        let result = outcome.envelope().map(|_| ());
        self.apply_rebind(&outcome);
        result
    }

    /// Drain a paged list endpoint.
    ///
    /// Pages are fetched strictly sequentially with `limit`/`offset` query
    /// parameters. The declared total may grow mid-walk (the output grows
    /// with it) or shrink (the loop trusts the new value; accepted elements
    /// are kept). A rebind observed on any page is applied only after the
    /// final page, so one paged walk stays on one base URL.
    async fn paged<T: DeserializeOwned>(&self, base_path: &str) -> Result<Vec<T>, ApiError> {
        self.require_session()?;
        let limit = self.state.lock().unwrap().page_size;
        let separator = if base_path.contains('?') { '&' } else { '?' };

        let mut out: Vec<T> = Vec::new();
        let mut received: u32 = 0;
        let mut declared_total: u32 = 0;
        let mut pending_rebind: Option<TxOutcome> = None;

        debug!(path = %base_path, "starting paging request");
        loop {
            let path = format!("{base_path}{separator}limit={limit}&offset={received}");
            let tx = self.request(Method::GET, &path);

            let outcome = match self.transport.execute(tx).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    if let Some(last) = &pending_rebind {
                        self.apply_rebind(last);
                    }
                    return Err(err);
                }
            };
            self.observe_instance_id(&outcome);

            let page = outcome.envelope().and_then(|env| {
                let pagination = env.pagination().unwrap_or_default();
                env.decode_data::<Vec<T>>().map(|items| (pagination, items))
            });
            if outcome.new_address.is_some() {
                pending_rebind = Some(outcome);
            }

            let (pagination, items) = match page {
                Ok(page) => page,
                Err(err) => {
                    if let Some(last) = &pending_rebind {
                        self.apply_rebind(last);
                    }
                    return Err(err);
                }
            };

            if pagination.total_count > declared_total {
                declared_total = pagination.total_count;
                out.reserve((declared_total as usize).saturating_sub(out.len()));
            }
            received += items.len() as u32;
            out.extend(items);
            debug!(
                path = %base_path,
                received,
                total = pagination.total_count,
                "received page"
            );

            if pagination.total_count <= pagination.offset + pagination.limit {
                break;
            }
        }

        if let Some(last) = &pending_rebind {
            self.apply_rebind(last);
        }
        debug!(path = %base_path, received, "completed paging request");
        Ok(out)
    }

    /// Record the controller instance identity as soon as headers arrive. A
    /// change signals a controller restart; the posture engine picks it up
    /// on its next tick.
    fn observe_instance_id(&self, outcome: &TxOutcome) {
        let Some(instance_id) = &outcome.instance_id else {
            return;
        };
        let mut state = self.state.lock().unwrap();
        if state.instance_id.as_deref() != Some(instance_id) {
            if state.instance_id.is_some() {
                info!(instance = %instance_id, "controller instance changed");
            }
            state.instance_id = Some(instance_id.clone());
        }
    }

    /// Adopt a controller-supplied base URL after the current operation has
    /// delivered its result.
    fn apply_rebind(&self, outcome: &TxOutcome) {
        let Some(new_address) = &outcome.new_address else {
            return;
        };
        {
            let mut state = self.state.lock().unwrap();
            if state.url == *new_address {
                return;
            }
            info!(address = %new_address, "controller supplied new address");
            state.url = new_address.clone();
        }
        if let Some(observer) = self.redirect_cb.lock().unwrap().as_ref() {
            observer(new_address);
        }
    }
}

/// Identification this SDK reports at login.
fn sdk_info() -> SdkInfo {
    SdkInfo {
        sdk_type: "trellis-sdk-rs".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        revision: None,
        branch: None,
        app_id: None,
        app_version: None,
    }
}

/// Host facts reported at login.
fn host_env_info() -> EnvInfo {
    EnvInfo {
        os: sysinfo::System::name().unwrap_or_else(|| std::env::consts::OS.to_string()),
        arch: std::env::consts::ARCH.to_string(),
        os_release: sysinfo::System::kernel_version().unwrap_or_default(),
        os_version: sysinfo::System::os_version().unwrap_or_default(),
        hostname: hostname::get().ok().map(|h| h.to_string_lossy().into_owned()),
    }
}

fn json_body<T: serde::Serialize>(value: &T) -> Result<TxBody, ApiError> {
    serde_json::to_string(value)
        .map(TxBody::Json)
        .map_err(|e| ApiError::new(ErrorKind::InvalidState, e.to_string()))
}

/// Percent-encode a query parameter value. Only the characters that appear
/// in service-name filters need escaping.
fn encode_query_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for b in value.bytes() {
        match b {
            b'"' => out.push_str("%22"),
            b' ' => out.push_str("%20"),
            b'#' => out.push_str("%23"),
            b'&' => out.push_str("%26"),
            b'+' => out.push_str("%2B"),
            _ => out.push(b as char),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_values_are_encoded() {
        assert_eq!(
            encode_query_value("name=\"pay roll\""),
            "name=%22pay%20roll%22"
        );
    }

    #[test]
    fn session_scoped_op_rejects_without_token() {
        let ctrl = Controller::new(ControllerConfig::new("https://ctrl.invalid")).unwrap();
        let err = ctrl.require_session().unwrap_err();
        assert_eq!(err.kind, ErrorKind::AuthFailed);
        assert_eq!(err.message, trellis_core::error::MSG_NO_API_SESSION);
    }

    #[test]
    fn request_applies_prefix_and_token() {
        let ctrl = Controller::new(ControllerConfig::new("https://ctrl.example")).unwrap();
        {
            let mut state = ctrl.state.lock().unwrap();
            state.path_prefix = "/edge/client/v1".into();
            state.api_session = Some(ApiSession {
                id: "s1".into(),
                token: "T".into(),
                ..ApiSession::default()
            });
        }
        let tx = ctrl.request(Method::GET, "/services");
        assert_eq!(tx.url, "https://ctrl.example/edge/client/v1/services");
        assert_eq!(tx.session_token.as_deref(), Some("T"));
    }
}
