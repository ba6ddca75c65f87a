//! # Trellis Core
//!
//! Wire models and shared domain types for the Trellis edge client: the
//! controller response envelope, the error taxonomy, and the JSON shapes of
//! everything the edge client exchanges with a controller.
//!
//! ## Design Principles
//!
//! This crate is intentionally **IO-free**:
//! - No network calls
//! - No filesystem operations
//! - No OS-specific APIs
//!
//! All types are plain Rust structs/enums with serde serialization. The
//! actual IO (HTTP transactions, posture probing, timers) lives in
//! `trellis-edge`.
//!
//! ## Stability
//!
//! The public API includes the serde serialization format of every exported
//! type (JSON field names, enum representations). The controller protocol is
//! camelCase on the wire; unknown fields are tolerated on input.
//!
//! ## Modules
//!
//! - [`error`] - Error taxonomy and server error-code mapping
//! - [`envelope`] - The standard controller response envelope
//! - [`version`] - Controller version and API path discovery
//! - [`session`] - API sessions and network sessions
//! - [`identity`] - Identity, login, enrollment, MFA, certificate extension
//! - [`service`] - Services and their posture queries
//! - [`posture`] - Posture response payloads

pub mod envelope;
pub mod error;
pub mod identity;
pub mod posture;
pub mod service;
pub mod session;
pub mod version;

pub use envelope::{Envelope, Meta, Pagination};
pub use error::{code_to_kind, ApiError, ErrorKind};
pub use identity::{AuthRequest, EnrollmentMethod, EnrollmentResponse, EnvInfo, IdentityDetail, SdkInfo};
pub use posture::{PostureResponse, PostureSubmission, ServiceTimer};
pub use service::{PostureQuery, PostureQuerySet, ProcessCheck, Service, ServiceUpdate};
pub use session::{ApiSession, NetSession, SessionType};
pub use version::ControllerVersion;
