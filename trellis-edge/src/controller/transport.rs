//! One HTTP transaction: request out, headers and body in.
//!
//! The transaction layer knows nothing about operations. It issues a single
//! request, captures the controller-supplied headers (`ziti-ctrl-address`,
//! `ziti-instance-id`), collects the body, and hands back raw bytes plus
//! transport metadata. Envelope handling happens above it.

use std::time::Instant;

use reqwest::header::CONTENT_TYPE;
use reqwest::Method;
use tokio::sync::watch;
use tracing::{debug, trace, warn};

use trellis_core::envelope::{unparsable_response, Envelope};
use trellis_core::error::{ApiError, ErrorKind};

/// Response header carrying a replacement controller base URL.
pub const HDR_CTRL_ADDRESS: &str = "ziti-ctrl-address";

/// Response header carrying the controller instance identity.
pub const HDR_INSTANCE_ID: &str = "ziti-instance-id";

/// Request header carrying the API session token.
pub const HDR_SESSION_TOKEN: &str = "zt-session";

/// Content type marking an enrollment response that is the issued
/// certificate itself.
pub const PEM_CONTENT_TYPE: &str = "application/x-pem-file";

/// Body of an outgoing transaction.
#[derive(Debug, Clone)]
pub enum TxBody {
    None,
    /// JSON payload, sent with `Content-Type: application/json`.
    Json(String),
    /// Raw text payload (CSR enrollment), sent with `Content-Type: text/plain`.
    Text(String),
}

/// One outgoing request, fully resolved (absolute URL, headers decided).
#[derive(Debug)]
pub struct TxRequest {
    pub method: Method,
    pub url: String,
    pub body: TxBody,
    /// Skip envelope parsing; the response body is returned verbatim.
    pub plain_text: bool,
    pub session_token: Option<String>,
    pub extra_headers: Vec<(&'static str, String)>,
}

impl TxRequest {
    pub fn new(method: Method, url: String) -> Self {
        Self {
            method,
            url,
            body: TxBody::None,
            plain_text: false,
            session_token: None,
            extra_headers: Vec::new(),
        }
    }
}

/// What came back from one transaction.
#[derive(Debug)]
pub struct TxOutcome {
    pub status: u16,
    pub status_text: String,
    pub bytes: Vec<u8>,
    /// Replacement base URL, if the response carried one.
    pub new_address: Option<String>,
    /// Controller instance identity, if the response carried one.
    pub instance_id: Option<String>,
    /// True when the response declared `application/x-pem-file`.
    pub pem_body: bool,
}

impl TxOutcome {
    /// Parse the body as a response envelope and surface its error member.
    ///
    /// A body that is not a valid envelope is reported as a synthesized
    /// `INVALID_CONTROLLER_RESPONSE` error carrying the HTTP status text.
    pub fn envelope(&self) -> Result<Envelope, ApiError> {
        match Envelope::parse(&self.bytes) {
            Ok(env) => match env.api_error(self.status) {
                Some(err) => Err(err),
                None => Ok(env),
            },
            Err(e) => {
                warn!(status = self.status, error = %e, "failed to parse controller response");
                Err(unparsable_response(self.status, &self.status_text))
            }
        }
    }
}

/// Issues transactions against one controller endpoint.
///
/// Cancellation is cooperative: every in-flight transaction races against
/// the shared generation counter, and `cancel_all` on the controller bumps
/// it. A cancelled transaction resolves with kind `Disabled`.
pub struct Transport {
    http: reqwest::Client,
    cancel_rx: watch::Receiver<u64>,
}

impl Transport {
    pub fn new(http: reqwest::Client, cancel_rx: watch::Receiver<u64>) -> Self {
        Self { http, cancel_rx }
    }

    /// Execute one transaction to completion.
    pub async fn execute(&self, req: TxRequest) -> Result<TxOutcome, ApiError> {
        let mut cancel = self.cancel_rx.clone();
        cancel.borrow_and_update();

        let started = Instant::now();
        trace!(method = %req.method, url = %req.url, "starting request");

        let mut builder = self.http.request(req.method.clone(), &req.url);
        match &req.body {
            TxBody::None => {}
            TxBody::Json(body) => {
                builder = builder
                    .header(CONTENT_TYPE, "application/json")
                    .body(body.clone());
            }
            TxBody::Text(body) => {
                builder = builder.header(CONTENT_TYPE, "text/plain").body(body.clone());
            }
        }
        if let Some(token) = &req.session_token {
            builder = builder.header(HDR_SESSION_TOKEN, token);
        }
        for (name, value) in &req.extra_headers {
            builder = builder.header(*name, value);
        }

        let response = tokio::select! {
            _ = cancel.changed() => return Err(ApiError::disabled()),
            resp = builder.send() => resp.map_err(transport_error)?,
        };

        let status = response.status();
        let status_text = status
            .canonical_reason()
            .unwrap_or("unknown status")
            .to_string();
        let new_address = header_string(&response, HDR_CTRL_ADDRESS);
        let instance_id = header_string(&response, HDR_INSTANCE_ID);
        let pem_body = header_string(&response, CONTENT_TYPE.as_str())
            .map(|ct| ct.eq_ignore_ascii_case(PEM_CONTENT_TYPE))
            .unwrap_or(false);

        let bytes = tokio::select! {
            _ = cancel.changed() => return Err(ApiError::disabled()),
            body = response.bytes() => body.map_err(transport_error)?,
        };

        debug!(
            url = %req.url,
            status = status.as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "completed request"
        );

        Ok(TxOutcome {
            status: status.as_u16(),
            status_text,
            bytes: bytes.to_vec(),
            new_address,
            instance_id,
            pem_body,
        })
    }
}

fn header_string(response: &reqwest::Response, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Translate a transport failure to the controller-unavailable kind.
fn transport_error(err: reqwest::Error) -> ApiError {
    ApiError::new(ErrorKind::ControllerUnavailable, err.to_string())
        .with_code("CONTROLLER_UNAVAILABLE")
}
