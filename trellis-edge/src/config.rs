//! Client configuration.

use std::sync::Arc;
use std::time::Duration;

use crate::posture::probes::ProbeOverrides;

/// Default page size for paged controller operations.
pub const DEFAULT_PAGE_SIZE: u32 = 25;

/// Connect timeout applied to every controller exchange.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Observer invoked after the controller supplies a new base address.
pub type RedirectObserver = Arc<dyn Fn(&str) + Send + Sync>;

/// Configuration for a [`Controller`](crate::Controller).
#[derive(Clone)]
pub struct ControllerConfig {
    /// Base URL of the controller, e.g. `https://ctrl.example:1280`.
    pub url: String,
    /// TLS configuration, including any client certificate used for cert
    /// authentication. `None` uses the platform trust roots.
    pub tls: Option<rustls::ClientConfig>,
    /// Page size for paged operations.
    pub page_size: u32,
}

impl ControllerConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            tls: None,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_tls(mut self, tls: rustls::ClientConfig) -> Self {
        self.tls = Some(tls);
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }
}

impl std::fmt::Debug for ControllerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerConfig")
            .field("url", &self.url)
            .field("tls", &self.tls.is_some())
            .field("page_size", &self.page_size)
            .finish()
    }
}

/// Configuration for the posture engine.
#[derive(Clone, Default)]
pub struct PostureConfig {
    /// Tick period. The first tick fires almost immediately after start.
    pub interval: Duration,
    /// Optional replacements for the built-in probes.
    pub probes: ProbeOverrides,
}

impl PostureConfig {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            probes: ProbeOverrides::default(),
        }
    }

    pub fn with_probes(mut self, probes: ProbeOverrides) -> Self {
        self.probes = probes;
        self
    }
}

impl std::fmt::Debug for PostureConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostureConfig")
            .field("interval", &self.interval)
            .finish()
    }
}
