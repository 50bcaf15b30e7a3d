//! Lifecycle host for offline agents.
//!
//! ```text
//! ServiceWorkerContainer
//!     ├── Registration (scope)
//!     │       ├── installing (ServiceWorker)
//!     │       ├── waiting (ServiceWorker)
//!     │       └── active (ServiceWorker)
//!     └── Clients
//!             └── Client → controller
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use hashbrown::HashMap;
use lazarus_net::{Fetcher, Request};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};
use url::Url;

use crate::agent::{FetchDecision, FetchResponse, OfflineAgent, ResponseSource};
use crate::AgentError;

// ==================== Types ====================

/// Unique identifier for a service worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceWorkerId(u64);

impl ServiceWorkerId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Service worker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ServiceWorkerState {
    /// Registered, install not started.
    #[default]
    Parsed,
    /// Install handler running.
    Installing,
    /// Installed but waiting for activation.
    Installed,
    /// Activate handler running.
    Activating,
    /// Active and controlling pages.
    Activated,
    /// Replaced, or install failed.
    Redundant,
}

// ==================== Service Worker ====================

/// One installed version of the agent.
#[derive(Clone)]
pub struct ServiceWorker {
    pub id: ServiceWorkerId,
    pub state: ServiceWorkerState,
    pub state_changed_at: Instant,
    agent: Arc<OfflineAgent>,
}

impl ServiceWorker {
    fn new(agent: Arc<OfflineAgent>) -> Self {
        Self {
            id: ServiceWorkerId::new(),
            state: ServiceWorkerState::Parsed,
            state_changed_at: Instant::now(),
            agent,
        }
    }

    fn set_state(&mut self, state: ServiceWorkerState) {
        self.state = state;
        self.state_changed_at = Instant::now();
    }

    /// Version label of the agent this worker runs.
    pub fn version(&self) -> &str {
        self.agent.version()
    }

    pub fn is_active(&self) -> bool {
        self.state == ServiceWorkerState::Activated
    }

    pub fn agent(&self) -> &Arc<OfflineAgent> {
        &self.agent
    }
}

impl std::fmt::Debug for ServiceWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceWorker")
            .field("id", &self.id)
            .field("version", &self.version())
            .field("state", &self.state)
            .finish()
    }
}

// ==================== Registration ====================

/// The installing / waiting / active slots for one scope.
#[derive(Debug)]
pub struct Registration {
    pub scope: Url,
    pub installing: Option<ServiceWorker>,
    pub waiting: Option<ServiceWorker>,
    pub active: Option<ServiceWorker>,
}

impl Registration {
    pub fn new(scope: Url) -> Self {
        Self {
            scope,
            installing: None,
            waiting: None,
            active: None,
        }
    }

    /// Transition installing to waiting. Returns the previously waiting
    /// worker, now redundant.
    fn install_complete(&mut self) -> Option<ServiceWorker> {
        let mut worker = self.installing.take()?;
        worker.set_state(ServiceWorkerState::Installed);
        self.waiting.replace(worker).map(|mut replaced| {
            replaced.set_state(ServiceWorkerState::Redundant);
            replaced
        })
    }

    /// Drop the installing worker after a failed install.
    fn install_failed(&mut self) -> Option<ServiceWorker> {
        self.installing.take().map(|mut worker| {
            worker.set_state(ServiceWorkerState::Redundant);
            worker
        })
    }

    /// Promote the waiting worker. Returns the new active worker and the one
    /// it replaced.
    fn promote_waiting(&mut self) -> Option<(ServiceWorker, Option<ServiceWorker>)> {
        let mut worker = self.waiting.take()?;
        worker.set_state(ServiceWorkerState::Activating);

        let replaced = self.active.take().map(|mut old| {
            old.set_state(ServiceWorkerState::Redundant);
            old
        });

        self.active = Some(worker.clone());
        Some((worker, replaced))
    }
}

// ==================== Clients ====================

/// A page within the scope.
#[derive(Debug, Clone)]
pub struct Client {
    pub id: String,
    pub url: Url,
    /// Worker whose agent handles this page's subresource requests.
    pub controller: Option<ServiceWorkerId>,
}

/// Open pages.
#[derive(Debug, Default)]
pub struct Clients {
    clients: HashMap<String, Client>,
}

impl Clients {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&Client> {
        self.clients.get(id)
    }

    pub fn add(&mut self, client: Client) {
        self.clients.insert(client.id.clone(), client);
    }

    pub fn remove(&mut self, id: &str) -> Option<Client> {
        self.clients.remove(id)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Make `worker` the controller of every client. Returns the ids whose
    /// controller changed.
    pub fn claim(&mut self, worker: ServiceWorkerId) -> Vec<String> {
        let mut changed: Vec<String> = self
            .clients
            .values_mut()
            .filter(|c| c.controller != Some(worker))
            .map(|c| {
                c.controller = Some(worker);
                c.id.clone()
            })
            .collect();
        changed.sort_unstable();
        changed
    }
}

// ==================== Events ====================

/// Container events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceWorkerEvent {
    /// State changed.
    StateChange {
        worker_id: ServiceWorkerId,
        version: String,
        new_state: ServiceWorkerState,
    },
    /// A client got a new controller.
    ControllerChange {
        client_id: String,
        worker_id: ServiceWorkerId,
    },
}

// ==================== Service Worker Container ====================

/// Drives agents through install and activation and routes fetches to the
/// controlling agent.
///
/// Handlers run without the registration lock held, so fetches keep being
/// served by the current active worker while a new version installs.
pub struct ServiceWorkerContainer {
    registration: RwLock<Registration>,
    clients: RwLock<Clients>,
    /// Used for passthrough and uncontrolled requests.
    network: Arc<dyn Fetcher>,
    event_tx: mpsc::UnboundedSender<ServiceWorkerEvent>,
}

impl ServiceWorkerContainer {
    pub fn new(
        scope: Url,
        network: Arc<dyn Fetcher>,
    ) -> (Self, mpsc::UnboundedReceiver<ServiceWorkerEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        (
            Self {
                registration: RwLock::new(Registration::new(scope)),
                clients: RwLock::new(Clients::new()),
                network,
                event_tx,
            },
            event_rx,
        )
    }

    fn emit_state(&self, worker: &ServiceWorker) {
        let _ = self.event_tx.send(ServiceWorkerEvent::StateChange {
            worker_id: worker.id,
            version: worker.version().to_string(),
            new_state: worker.state,
        });
    }

    /// Register a new agent version: install it, then activate it when it
    /// asks to skip waiting or nothing is active yet.
    ///
    /// On install failure the new worker becomes redundant and the current
    /// active worker keeps serving.
    pub async fn register(&self, agent: OfflineAgent) -> Result<ServiceWorkerId, AgentError> {
        let mut worker = ServiceWorker::new(Arc::new(agent));
        worker.set_state(ServiceWorkerState::Installing);
        let id = worker.id;
        let agent = Arc::clone(&worker.agent);

        {
            let mut registration = self.registration.write().await;
            if agent.scope() != &registration.scope {
                return Err(AgentError::State(format!(
                    "agent scope {} does not match registration scope {}",
                    agent.scope(),
                    registration.scope
                )));
            }
            self.emit_state(&worker);
            if let Some(mut previous) = registration.installing.replace(worker) {
                previous.set_state(ServiceWorkerState::Redundant);
                self.emit_state(&previous);
            }
        }

        let outcome = match agent.install().await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(version = %agent.version(), error = %e, "Install failed");
                let mut registration = self.registration.write().await;
                if registration.installing.as_ref().map(|w| w.id) == Some(id) {
                    if let Some(failed) = registration.install_failed() {
                        self.emit_state(&failed);
                    }
                }
                return Err(e);
            }
        };

        let activate_now = {
            let mut registration = self.registration.write().await;
            if registration.installing.as_ref().map(|w| w.id) != Some(id) {
                return Err(AgentError::State(
                    "superseded by a newer registration during install".to_string(),
                ));
            }
            if let Some(replaced) = registration.install_complete() {
                self.emit_state(&replaced);
            }
            if let Some(ref waiting) = registration.waiting {
                self.emit_state(waiting);
            }
            outcome.skip_waiting || registration.active.is_none()
        };

        if activate_now {
            self.activate_waiting().await?;
        } else {
            info!(version = %agent.version(), "Installed, waiting for activation");
        }

        Ok(id)
    }

    /// Activate the waiting worker, if any. Returns whether one was activated.
    ///
    /// A failing activate handler is logged; the worker still becomes active.
    pub async fn activate_waiting(&self) -> Result<bool, AgentError> {
        let (worker, replaced) = {
            let mut registration = self.registration.write().await;
            match registration.promote_waiting() {
                Some(promoted) => promoted,
                None => return Ok(false),
            }
        };

        if let Some(ref old) = replaced {
            self.emit_state(old);
        }
        self.emit_state(&worker);

        let claim = match worker.agent.activate().await {
            Ok(outcome) => outcome.claim_clients,
            Err(e) => {
                warn!(version = %worker.version(), error = %e, "Activate handler failed");
                false
            }
        };

        {
            let mut registration = self.registration.write().await;
            if let Some(active) = registration.active.as_mut().filter(|w| w.id == worker.id) {
                active.set_state(ServiceWorkerState::Activated);
                self.emit_state(active);
            }
        }

        if claim {
            let changed = self.clients.write().await.claim(worker.id);
            debug!(version = %worker.version(), clients = changed.len(), "Claimed clients");
            for client_id in changed {
                let _ = self.event_tx.send(ServiceWorkerEvent::ControllerChange {
                    client_id,
                    worker_id: worker.id,
                });
            }
        }

        info!(version = %worker.version(), "Worker activated");
        Ok(true)
    }

    /// Open a page. Pages opened while a worker is active are controlled by it.
    pub async fn add_client(&self, url: Url) -> Client {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        let controller = self.registration.read().await.active.as_ref().map(|w| w.id);
        let client = Client {
            id: format!("client-{}", COUNTER.fetch_add(1, Ordering::Relaxed)),
            url,
            controller,
        };
        self.clients.write().await.add(client.clone());
        client
    }

    pub async fn remove_client(&self, id: &str) -> Option<Client> {
        self.clients.write().await.remove(id)
    }

    pub async fn client(&self, id: &str) -> Option<Client> {
        self.clients.read().await.get(id).cloned()
    }

    pub async fn active(&self) -> Option<ServiceWorker> {
        self.registration.read().await.active.clone()
    }

    pub async fn waiting(&self) -> Option<ServiceWorker> {
        self.registration.read().await.waiting.clone()
    }

    /// Agent that handles `request` for `client_id`: navigations go to the
    /// active worker, subresources to the client's controller.
    async fn controller_for(
        &self,
        client_id: Option<&str>,
        request: &Request,
    ) -> Option<Arc<OfflineAgent>> {
        let registration = self.registration.read().await;
        let active = registration.active.as_ref()?;

        if request.is_navigation() {
            return Some(Arc::clone(&active.agent));
        }

        let controller = self.clients.read().await.get(client_id?)?.controller?;
        (controller == active.id).then(|| Arc::clone(&active.agent))
    }

    /// Route an intercepted request through the controlling agent, falling
    /// back to the network for passthrough and uncontrolled requests.
    pub async fn dispatch_fetch(
        &self,
        client_id: Option<&str>,
        request: &Request,
    ) -> Result<FetchResponse, AgentError> {
        if let Some(agent) = self.controller_for(client_id, request).await {
            match agent.handle_fetch(request).await? {
                FetchDecision::Respond(response) => return Ok(response),
                FetchDecision::Passthrough(_) => {}
            }
        }

        let response = self.network.fetch(request).await?;
        Ok(FetchResponse {
            response,
            source: ResponseSource::Network,
        })
    }
}
