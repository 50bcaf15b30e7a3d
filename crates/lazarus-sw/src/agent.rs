//! The offline cache agent: install, activate and fetch handlers.

use std::sync::Arc;

use futures::future::try_join_all;
use lazarus_core::AgentConfig;
use lazarus_net::{Fetcher, Request, Response};
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::cache::CacheStorage;
use crate::route::{PassthroughReason, Route, Router};
use crate::AgentError;

/// Result of a successful install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOutcome {
    /// Number of URLs stored in the app-shell cache.
    pub precached: usize,
    /// Activate immediately instead of waiting for controlled pages to close.
    pub skip_waiting: bool,
}

/// Result of a successful activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivateOutcome {
    /// Obsolete caches that were removed.
    pub deleted: Vec<String>,
    /// Take control of already-open pages.
    pub claim_clients: bool,
}

/// Where a response handed back by the agent came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Cache,
    Network,
    /// Cached navigation fallback served while offline.
    Fallback,
}

/// A response produced by the agent.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub response: Response,
    pub source: ResponseSource,
}

impl FetchResponse {
    fn new(response: Response, source: ResponseSource) -> Self {
        Self { response, source }
    }

    pub fn from_cache(&self) -> bool {
        matches!(self.source, ResponseSource::Cache | ResponseSource::Fallback)
    }
}

/// What the fetch handler did with a request.
#[derive(Debug, Clone)]
pub enum FetchDecision {
    /// The agent declined; the request goes to the network untouched.
    Passthrough(PassthroughReason),
    /// The agent responded.
    Respond(FetchResponse),
}

/// Offline cache agent.
///
/// Owns no state of its own beyond configuration: everything persistent
/// lives in the cache storage, and every handler is an awaited sequence of
/// storage and network calls that runs to completion or fails.
pub struct OfflineAgent {
    scope: Url,
    config: AgentConfig,
    router: Router,
    precache: Vec<Url>,
    fallback: Url,
    storage: Arc<dyn CacheStorage>,
    fetcher: Arc<dyn Fetcher>,
}

impl OfflineAgent {
    /// Create an agent for `scope`. Precache paths and the navigation
    /// fallback are resolved against the scope here.
    pub fn new(
        scope: Url,
        config: AgentConfig,
        storage: Arc<dyn CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Result<Self, AgentError> {
        config.validate()?;

        let precache = config
            .precache
            .iter()
            .map(|path| scope.join(path))
            .collect::<Result<Vec<_>, _>>()?;
        let fallback = scope.join(&config.navigation_fallback)?;
        let router = Router::from_config(&config);

        Ok(Self {
            scope,
            config,
            router,
            precache,
            fallback,
            storage,
            fetcher,
        })
    }

    pub fn scope(&self) -> &Url {
        &self.scope
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Version label: the app-shell cache name.
    pub fn version(&self) -> &str {
        &self.config.caches.app_shell
    }

    /// Absolute precache URLs, in configured order.
    pub fn precache_urls(&self) -> &[Url] {
        &self.precache
    }

    pub fn fallback_url(&self) -> &Url {
        &self.fallback
    }

    /// Install handler: precache the app shell.
    ///
    /// All-or-nothing: every URL is fetched before anything is stored, and a
    /// single failed or non-2xx fetch fails the whole install.
    pub async fn install(&self) -> Result<InstallOutcome, AgentError> {
        let cache = &self.config.caches.app_shell;
        info!(cache = %cache, urls = self.precache.len(), "Installing: precaching app shell");

        self.storage.open(cache).await?;
        self.add_all(cache, &self.precache).await?;

        info!(cache = %cache, "Install complete");
        Ok(InstallOutcome {
            precached: self.precache.len(),
            skip_waiting: self.config.skip_waiting,
        })
    }

    async fn add_all(&self, cache: &str, urls: &[Url]) -> Result<(), AgentError> {
        let fetches = urls.iter().map(|url| async move {
            let request = Request::get(url.clone());
            let response =
                self.fetcher
                    .fetch(&request)
                    .await
                    .map_err(|e| AgentError::Precache {
                        url: url.to_string(),
                        reason: e.to_string(),
                    })?;
            if !response.ok() {
                return Err(AgentError::Precache {
                    url: url.to_string(),
                    reason: format!("status {}", response.status),
                });
            }
            Ok::<_, AgentError>((url.clone(), response))
        });

        let responses = try_join_all(fetches).await?;
        self.storage.put_all(cache, &responses).await
    }

    /// Activate handler: delete every cache this version does not own.
    pub async fn activate(&self) -> Result<ActivateOutcome, AgentError> {
        let names = self.storage.keys().await?;
        let stale: Vec<String> = names
            .into_iter()
            .filter(|name| !self.config.caches.is_current(name))
            .collect();

        try_join_all(stale.iter().map(|name| self.storage.delete(name))).await?;

        info!(version = %self.version(), deleted = ?stale, "Activated");
        Ok(ActivateOutcome {
            deleted: stale,
            claim_clients: true,
        })
    }

    /// Fetch handler.
    pub async fn handle_fetch(&self, request: &Request) -> Result<FetchDecision, AgentError> {
        match self.router.route(request) {
            Route::Passthrough(reason) => {
                trace!(url = %request.url, method = %request.method, ?reason, "Passthrough");
                Ok(FetchDecision::Passthrough(reason))
            }
            Route::Cdn => self.cdn_cache_first(request).await.map(FetchDecision::Respond),
            Route::AppShell => self
                .app_shell_cache_first(request)
                .await
                .map(FetchDecision::Respond),
        }
    }

    /// CDN resources never expire. A failed store fails the request.
    async fn cdn_cache_first(&self, request: &Request) -> Result<FetchResponse, AgentError> {
        let cache = &self.config.caches.cdn;
        self.storage.open(cache).await?;

        if let Some(cached) = self.storage.match_request(cache, &request.url).await? {
            debug!(url = %request.url, "CDN cache hit");
            return Ok(FetchResponse::new(cached, ResponseSource::Cache));
        }

        debug!(url = %request.url, "CDN cache miss");
        let response = self.fetcher.fetch(request).await?;
        if response.ok() {
            self.storage.put(cache, &request.url, &response).await?;
        }
        Ok(FetchResponse::new(response, ResponseSource::Network))
    }

    /// Cache-first with opportunistic network fill; offline navigations get
    /// the cached fallback document.
    async fn app_shell_cache_first(&self, request: &Request) -> Result<FetchResponse, AgentError> {
        let cache = &self.config.caches.app_shell;

        if let Some(cached) = self.storage.match_request(cache, &request.url).await? {
            debug!(url = %request.url, "App-shell cache hit");
            return Ok(FetchResponse::new(cached, ResponseSource::Cache));
        }

        match self.fetcher.fetch(request).await {
            Ok(response) => {
                if response.ok() {
                    if let Err(e) = self.storage.put(cache, &request.url, &response).await {
                        warn!(url = %request.url, error = %e, "Discarding failed app-shell store");
                    }
                }
                Ok(FetchResponse::new(response, ResponseSource::Network))
            }
            Err(err) if request.is_navigation() => {
                debug!(url = %request.url, error = %err, "Offline navigation, trying fallback");
                match self.storage.match_request(cache, &self.fallback).await? {
                    Some(document) => Ok(FetchResponse::new(document, ResponseSource::Fallback)),
                    None => Err(AgentError::NoFallback {
                        url: self.fallback.to_string(),
                        source: err,
                    }),
                }
            }
            Err(err) => Err(err.into()),
        }
    }
}
