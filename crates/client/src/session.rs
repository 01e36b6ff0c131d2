//! Authenticated session.
//!
//! A [`Session`] is constructed on login and torn down on logout. It owns
//! the [`ConnectionManager`] for its push channel, the command API client,
//! and one [`ScreeningController`] per watched job posting. Nothing here
//! is global: two sessions never share a channel.
//!
//! A single store task drains the dispatcher's queue and applies each
//! update to the right controller in arrival order. When the channel
//! (re)opens, the same task re-fetches every watched posting's progress
//! snapshot before applying anything pushed afterwards.

use std::collections::HashMap;
use std::sync::Arc;

use hirewire_core::types::DbId;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::api::{HttpScreeningApi, ScreeningApi};
use crate::client::ChannelClient;
use crate::config::ClientConfig;
use crate::dispatcher::{Dispatcher, StoreUpdate};
use crate::error::ClientError;
use crate::events::{ClientEvent, EVENT_CHANNEL_CAPACITY};
use crate::manager::{ConnectionManager, ConnectionPhase, ConnectionStatus};
use crate::screening::{PipelineStages, ScreeningController};

/// What login produced.
#[derive(Debug, Clone)]
pub struct SessionCredentials {
    /// Credential for both the command API and the push channel.
    pub token: String,
    pub user_id: Option<DbId>,
}

type Watched = Arc<RwLock<HashMap<DbId, Arc<ScreeningController>>>>;

/// One logged-in actor.
pub struct Session {
    session_id: String,
    user_id: Option<DbId>,
    config: ClientConfig,
    channel: ChannelClient,
    manager: ConnectionManager,
    api: Arc<dyn ScreeningApi>,
    event_tx: broadcast::Sender<ClientEvent>,
    watched: Watched,
    cancel: CancellationToken,
    store_task: JoinHandle<()>,
}

impl Session {
    /// Build a session that talks to the backend over HTTP.
    ///
    /// Must be called from within a Tokio runtime. The channel is not
    /// opened until [`connect`](Self::connect).
    pub fn login(config: ClientConfig, credentials: SessionCredentials) -> Self {
        let api = Arc::new(HttpScreeningApi::new(
            config.api_url.clone(),
            credentials.token.clone(),
        ));
        Self::with_api(config, credentials, api)
    }

    /// Build a session over a custom command API.
    pub fn with_api(
        config: ClientConfig,
        credentials: SessionCredentials,
        api: Arc<dyn ScreeningApi>,
    ) -> Self {
        let session_id = uuid::Uuid::new_v4().to_string();
        let (store_tx, store_rx) = mpsc::unbounded_channel();
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let dispatcher = Dispatcher::new(store_tx, event_tx.clone());
        let manager = ConnectionManager::new(&config, dispatcher);
        let channel = ChannelClient::new(
            session_id.clone(),
            config.ws_url.clone(),
            credentials.token,
        );

        let watched: Watched = Arc::new(RwLock::new(HashMap::new()));
        let cancel = CancellationToken::new();
        let store_task = tokio::spawn(run_store(
            store_rx,
            Arc::clone(&watched),
            cancel.clone(),
        ));

        tracing::info!(%session_id, user_id = ?credentials.user_id, "Session started");

        Self {
            session_id,
            user_id: credentials.user_id,
            config,
            channel,
            manager,
            api,
            event_tx,
            watched,
            cancel,
            store_task,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn user_id(&self) -> Option<DbId> {
        self.user_id
    }

    /// Subscribe to user-facing events.
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.event_tx.subscribe()
    }

    /// Open the push channel. No-op if it is open or opening.
    pub async fn connect(&self) {
        self.manager.connect(self.channel.clone()).await;
    }

    pub async fn disconnect(&self) {
        self.manager.disconnect().await;
    }

    pub async fn is_connected(&self) -> bool {
        self.manager.is_connected().await
    }

    pub async fn connection_status(&self) -> ConnectionStatus {
        self.manager.status().await
    }

    /// Fails with [`ClientError::ConnectionLost`] once reconnection gave up.
    pub async fn check_channel(&self) -> Result<ConnectionStatus, ClientError> {
        let status = self.manager.status().await;
        if status.phase == ConnectionPhase::Failed {
            return Err(ClientError::ConnectionLost {
                attempts: status.failures,
            });
        }
        Ok(status)
    }

    /// Start following a job posting's screening run.
    ///
    /// Returns the existing controller if the posting is already watched.
    /// Progress and results are fetched once up front; failures are logged
    /// and leave the controller in its initial state.
    pub async fn watch(&self, job_posting_id: DbId, stages: PipelineStages) -> Arc<ScreeningController> {
        let controller = {
            let mut watched = self.watched.write().await;
            if let Some(existing) = watched.get(&job_posting_id) {
                return Arc::clone(existing);
            }
            let controller = ScreeningController::new(
                job_posting_id,
                stages,
                Arc::clone(&self.api),
                self.event_tx.clone(),
                &self.config,
            );
            watched.insert(job_posting_id, Arc::clone(&controller));
            controller
        };

        tracing::info!(session_id = %self.session_id, job_posting_id, "Watching job posting");
        if let Err(e) = controller.refresh_progress().await {
            tracing::warn!(job_posting_id, error = %e, "Initial progress fetch failed");
        }
        if let Err(e) = controller.refresh_results(&Default::default()).await {
            tracing::warn!(job_posting_id, error = %e, "Initial results fetch failed");
        }
        controller
    }

    pub async fn unwatch(&self, job_posting_id: DbId) {
        if self.watched.write().await.remove(&job_posting_id).is_some() {
            tracing::info!(session_id = %self.session_id, job_posting_id, "Stopped watching job posting");
        }
    }

    pub async fn controller(&self, job_posting_id: DbId) -> Result<Arc<ScreeningController>, ClientError> {
        self.watched
            .read()
            .await
            .get(&job_posting_id)
            .cloned()
            .ok_or(ClientError::NotWatching(job_posting_id))
    }

    /// Close the channel and stop the store task.
    pub async fn logout(self) {
        tracing::info!(session_id = %self.session_id, "Logging out");
        self.manager.disconnect().await;
        self.cancel.cancel();
        let _ = self.store_task.await;
        self.watched.write().await.clear();
    }
}

/// Drain dispatcher output into the watched controllers.
async fn run_store(
    mut store_rx: mpsc::UnboundedReceiver<StoreUpdate>,
    watched: Watched,
    cancel: CancellationToken,
) {
    loop {
        let update = tokio::select! {
            _ = cancel.cancelled() => break,
            update = store_rx.recv() => match update {
                Some(update) => update,
                None => break,
            },
        };

        match update {
            StoreUpdate::Screening {
                job_posting_id,
                signal,
            } => {
                if let Some(controller) = resolve(&watched, job_posting_id).await {
                    controller.apply_signal(&signal).await;
                }
            }
            StoreUpdate::CandidateScreened(data) => {
                if let Some(controller) = resolve(&watched, data.job_id).await {
                    controller.record_screened(&data).await;
                }
            }
            StoreUpdate::ChannelOpened { connection_id } => {
                let controllers: Vec<_> = watched.read().await.values().cloned().collect();
                tracing::debug!(%connection_id, count = controllers.len(), "Resyncing watched postings");
                for controller in controllers {
                    if let Err(e) = controller.refresh_progress().await {
                        tracing::warn!(
                            job_posting_id = controller.job_posting_id(),
                            error = %e,
                            "Progress resync failed",
                        );
                    }
                }
            }
        }
    }
    tracing::debug!("Store task exited");
}

/// Controller for a message's posting. Messages that name no posting go to
/// the only watched one; with several watched they cannot be placed.
async fn resolve(watched: &Watched, job_posting_id: Option<DbId>) -> Option<Arc<ScreeningController>> {
    let watched = watched.read().await;
    let found = match job_posting_id {
        Some(id) => watched.get(&id).cloned(),
        None if watched.len() == 1 => watched.values().next().cloned(),
        None => None,
    };
    if found.is_none() {
        tracing::debug!(?job_posting_id, watched = watched.len(), "No controller for update, dropping");
    }
    found
}
