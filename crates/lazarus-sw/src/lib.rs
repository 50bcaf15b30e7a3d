//! # Lazarus Offline Agent
//!
//! Offline caching agent for the Lazarus web app. It sits between the page
//! and the network and keeps the application shell loadable without a
//! connection.
//!
//! ## Features
//!
//! - **Install**: precache the app shell, all-or-nothing
//! - **Activate**: delete caches left behind by previous versions
//! - **Fetch**: per-origin policy
//!     - non-GET and device requests go straight to the network
//!     - CDN resources are cache-first and never expire
//!     - everything else is cache-first with network fill, and offline
//!       navigations fall back to the cached root document
//! - **Storage**: in-memory or file-backed named caches
//! - **Lifecycle host**: installing / waiting / active workers and clients
//!
//! ## Architecture
//!
//! ```text
//! ServiceWorkerContainer
//!     └── ServiceWorker ── OfflineAgent
//!                             ├── Router (method, device host, CDN host)
//!                             ├── CacheStorage ("lazarus-v1", "lazarus-cdn-v1")
//!                             └── Fetcher (network)
//! ```

pub mod agent;
pub mod cache;
pub mod container;
mod error;
pub mod persist;
pub mod route;

pub use agent::{
    ActivateOutcome, FetchDecision, FetchResponse, InstallOutcome, OfflineAgent, ResponseSource,
};
pub use cache::{cache_key, Cache, CacheEntry, CacheStorage, MemoryCacheStorage};
pub use container::{
    Client, Clients, Registration, ServiceWorker, ServiceWorkerContainer, ServiceWorkerEvent,
    ServiceWorkerId, ServiceWorkerState,
};
pub use error::AgentError;
pub use persist::FileCacheStorage;
pub use route::{PassthroughReason, Route, Router};
