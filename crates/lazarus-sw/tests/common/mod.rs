//! Scripted network and instrumented storage shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use http::{HeaderMap, HeaderValue, StatusCode};
use lazarus_core::AgentConfig;
use lazarus_net::{Fetcher, NetError, Request, Response};
use lazarus_sw::{AgentError, CacheStorage, MemoryCacheStorage, OfflineAgent};
use url::Url;

pub const SCOPE: &str = "https://lazarus.local/app/";

pub const SHELL: &[(&str, &str)] = &[
    ("https://lazarus.local/app/", "<html>root</html>"),
    ("https://lazarus.local/app/index.html", "<html>index</html>"),
    ("https://lazarus.local/app/manifest.json", "{\"name\":\"Lazarus\"}"),
    ("https://lazarus.local/app/icons/icon-192.png", "png-192"),
    ("https://lazarus.local/app/icons/icon-512.png", "png-512"),
];

pub fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
}

pub fn get(s: &str) -> Request {
    Request::get(url(s))
}

pub fn post(s: &str) -> Request {
    Request::post(url(s), bytes::Bytes::from_static(b"{\"name\":\"camera.takePicture\"}"))
}

pub fn navigate(s: &str) -> Request {
    Request::navigate(url(s))
}

/// Network double: serves scripted responses, 404 for anything else, and
/// fails every request while offline.
#[derive(Default)]
pub struct ScriptedFetcher {
    responses: Mutex<HashMap<String, (u16, String)>>,
    offline: AtomicBool,
    calls: Mutex<Vec<String>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// A network that serves the whole app shell.
    pub fn with_shell() -> Self {
        let fetcher = Self::new();
        for (u, body) in SHELL {
            fetcher.serve(u, 200, body);
        }
        fetcher
    }

    pub fn serve(&self, url: &str, status: u16, body: &str) {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), (status, body.to_string()));
    }

    pub fn forget(&self, url: &str) {
        self.responses.lock().unwrap().remove(url);
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, NetError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("{} {}", request.method, request.url));

        if self.offline.load(Ordering::SeqCst) {
            return Err(NetError::RequestFailed("offline".to_string()));
        }

        let scripted = self
            .responses
            .lock()
            .unwrap()
            .get(request.url.as_str())
            .cloned();
        let (status, body) = scripted.unwrap_or((404, String::new()));

        let mut headers = HeaderMap::new();
        headers.insert("x-served-by", HeaderValue::from_static("scripted"));
        Ok(Response::new(
            request.url.clone(),
            StatusCode::from_u16(status).unwrap(),
            headers,
            body,
        ))
    }
}

/// Storage double: records every operation and can be told to fail writes
/// or deletes.
#[derive(Default)]
pub struct RecordingStorage {
    pub inner: MemoryCacheStorage,
    ops: Mutex<Vec<String>>,
    fail_puts: AtomicBool,
    fail_deletes: AtomicBool,
}

impl RecordingStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    pub fn ops(&self) -> Vec<String> {
        self.ops.lock().unwrap().clone()
    }

    pub fn clear_ops(&self) {
        self.ops.lock().unwrap().clear();
    }

    fn record(&self, op: String) {
        self.ops.lock().unwrap().push(op);
    }

    fn check_write(&self) -> Result<(), AgentError> {
        if self.fail_puts.load(Ordering::SeqCst) {
            Err(AgentError::cache("quota exceeded"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CacheStorage for RecordingStorage {
    async fn open(&self, name: &str) -> Result<(), AgentError> {
        self.record(format!("open {name}"));
        self.inner.open(name).await
    }

    async fn has(&self, name: &str) -> Result<bool, AgentError> {
        self.record(format!("has {name}"));
        self.inner.has(name).await
    }

    async fn delete(&self, name: &str) -> Result<bool, AgentError> {
        self.record(format!("delete {name}"));
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(AgentError::cache("storage is read-only"));
        }
        self.inner.delete(name).await
    }

    async fn keys(&self) -> Result<Vec<String>, AgentError> {
        self.record("keys".to_string());
        self.inner.keys().await
    }

    async fn match_request(&self, name: &str, url: &Url) -> Result<Option<Response>, AgentError> {
        self.record(format!("match {name} {url}"));
        self.inner.match_request(name, url).await
    }

    async fn put(&self, name: &str, url: &Url, response: &Response) -> Result<(), AgentError> {
        self.record(format!("put {name} {url}"));
        self.check_write()?;
        self.inner.put(name, url, response).await
    }

    async fn put_all(&self, name: &str, entries: &[(Url, Response)]) -> Result<(), AgentError> {
        self.record(format!("put_all {name} {}", entries.len()));
        self.check_write()?;
        self.inner.put_all(name, entries).await
    }

    async fn cached_urls(&self, name: &str) -> Result<Vec<String>, AgentError> {
        self.inner.cached_urls(name).await
    }
}

pub struct Harness {
    pub agent: OfflineAgent,
    pub storage: Arc<RecordingStorage>,
    pub network: Arc<ScriptedFetcher>,
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn harness_with(config: AgentConfig, network: ScriptedFetcher) -> Harness {
    init_tracing();
    let storage = Arc::new(RecordingStorage::new());
    let network = Arc::new(network);
    let agent = OfflineAgent::new(
        url(SCOPE),
        config,
        Arc::clone(&storage) as Arc<dyn CacheStorage>,
        Arc::clone(&network) as Arc<dyn Fetcher>,
    )
    .unwrap();
    Harness {
        agent,
        storage,
        network,
    }
}

pub fn harness() -> Harness {
    harness_with(AgentConfig::default(), ScriptedFetcher::with_shell())
}
