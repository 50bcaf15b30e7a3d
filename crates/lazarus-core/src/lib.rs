//! Lazarus Core Library
//!
//! This crate provides the agent configuration shared by the Lazarus crates.

pub mod config;

pub use config::{
    AgentConfig, CacheNames, APP_SHELL_CACHE, CDN_CACHE, CDN_HOSTS, DEVICE_HOSTS,
    NAVIGATION_FALLBACK, PRECACHE_URLS,
};
