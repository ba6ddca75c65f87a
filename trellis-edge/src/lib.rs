//! # Trellis Edge
//!
//! The Trellis edge client engine. Embedded as a library into host
//! applications, it keeps a long-lived conversation with one logical
//! controller and coordinates the loops that make a zero-trust overlay
//! work on an endpoint:
//!
//! - a [`Controller`] client with typed operations, transparent pagination,
//!   controller-driven rebinding, and session-token lifecycle;
//! - a posture engine ([`PostureChecks`]) that samples host facts,
//!   de-duplicates them per policy, and submits them in bulk or one at a
//!   time with fallback;
//! - the probes ([`posture::probes`]) that materialize individual posture
//!   proofs, each replaceable by the embedding application.
//!
//! The data-plane tunnel, the service cache, and the TLS provider are
//! external collaborators: the tunnel is out of scope entirely, the service
//! cache is reached through [`ServiceCatalog`], and TLS arrives as a
//! caller-built `rustls::ClientConfig`.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use trellis_edge::{Controller, ControllerConfig, PostureChecks, PostureConfig};
//! # use trellis_edge::ServiceCatalog;
//! # struct Catalog;
//! # impl ServiceCatalog for Catalog {
//! #     fn posture_services(&self) -> Vec<trellis_core::Service> { Vec::new() }
//! #     fn force_service_refresh(&self, _: &str) {}
//! #     fn refresh_services(&self) {}
//! # }
//!
//! # async fn run() -> Result<(), trellis_core::ApiError> {
//! let config = ControllerConfig::new("https://ctrl.example:1280");
//! let controller = Arc::new(Controller::new(config)?);
//! controller.version().await?;
//! controller.login(&[]).await?;
//!
//! let posture = PostureChecks::start(
//!     controller.clone(),
//!     Arc::new(Catalog),
//!     PostureConfig::new(Duration::from_secs(20)),
//! );
//! # drop(posture);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod controller;
pub mod posture;

pub use config::{ControllerConfig, PostureConfig, RedirectObserver, DEFAULT_PAGE_SIZE};
pub use controller::Controller;
pub use posture::probes::{DomainReply, MacReply, OsReply, ProbeOverrides, ProcessReply};
pub use posture::{PostureChecks, ServiceCatalog};

pub use trellis_core;
