//! Per-origin routing of intercepted requests.

use http::Method;
use lazarus_core::AgentConfig;
use lazarus_net::{HostPattern, Request};

/// Why the agent declined to handle a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassthroughReason {
    /// Mutating requests are never served from or written to cache.
    NonGet,
    /// Live device state is never cached.
    DeviceHost,
}

/// Policy applied to an intercepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Network only; the agent does not respond.
    Passthrough(PassthroughReason),
    /// Cache-first against the CDN cache.
    Cdn,
    /// Cache-first against the app-shell cache, navigation fallback offline.
    AppShell,
}

/// Classifies requests into routes. Rules are checked in a fixed order:
/// method, device host, CDN host, then everything else.
#[derive(Debug, Clone)]
pub struct Router {
    device_hosts: Vec<HostPattern>,
    cdn_hosts: Vec<HostPattern>,
}

impl Router {
    pub fn from_config(config: &AgentConfig) -> Self {
        Self {
            device_hosts: config
                .device_hosts
                .iter()
                .map(|h| HostPattern::exact(h))
                .collect(),
            cdn_hosts: config
                .cdn_hosts
                .iter()
                .map(|h| HostPattern::contains(h))
                .collect(),
        }
    }

    pub fn route(&self, request: &Request) -> Route {
        if request.method != Method::GET {
            return Route::Passthrough(PassthroughReason::NonGet);
        }
        if self.device_hosts.iter().any(|p| p.matches(&request.url)) {
            return Route::Passthrough(PassthroughReason::DeviceHost);
        }
        if self.cdn_hosts.iter().any(|p| p.matches(&request.url)) {
            return Route::Cdn;
        }
        Route::AppShell
    }
}
