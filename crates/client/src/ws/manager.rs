//! Occupancy synchronizer: keeps an [`OccupancyStore`] in step with the server.
//!
//! Every time the presence stream opens, the store is reseeded from a fresh
//! snapshot before any streamed event of that connection is applied. Events
//! are then merged incrementally until the stream drops.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use labpresence_shared::PresenceEvent;
use tokio::sync::watch;

use super::connection::{ConnectionState, Transport, TungsteniteTransport};
use super::session::{AfterOpen, SessionObserver, TransportSession};
use crate::api_client::ApiClient;
use crate::auth_session::AuthSession;
use crate::config::ClientConfig;
use crate::snapshot::{HttpSnapshotFetcher, SnapshotFetcher};
use crate::storage::KeyValueStore;
use crate::stores::OccupancyStore;

/// Run when the snapshot endpoint rejects the token, before the stream is closed.
pub type UnauthorizedHook = Box<dyn Fn() + Send + Sync>;

/// Feeds session callbacks into the store.
struct StoreObserver {
    store: Arc<OccupancyStore>,
    fetcher: Arc<dyn SnapshotFetcher>,
    /// Epoch of the open connection; 0 when there is none.
    live_epoch: AtomicU64,
    on_unauthorized: Option<UnauthorizedHook>,
}

impl StoreObserver {
    fn is_live(&self, epoch: u64) -> bool {
        epoch != 0 && self.live_epoch.load(Ordering::SeqCst) == epoch
    }
}

#[async_trait]
impl SessionObserver for StoreObserver {
    async fn on_open(&self, epoch: u64) -> AfterOpen {
        self.live_epoch.store(epoch, Ordering::SeqCst);
        self.store.set_connected(true);

        match self.fetcher.fetch().await {
            Ok(snapshot) if self.is_live(epoch) => {
                crate::log_info!(
                    "Occupancy snapshot: {} present (epoch {})",
                    snapshot.entries.len(),
                    epoch
                );
                self.store.apply_snapshot(snapshot);
            }
            Ok(_) => {
                crate::log_debug!("Discarding snapshot for closed epoch {}", epoch);
            }
            Err(e) if e.is_unauthorized() => {
                // Without a valid token the room can never be reseeded.
                crate::log_warn!("Token rejected (epoch {}); stopping presence stream", epoch);
                if let Some(hook) = &self.on_unauthorized {
                    hook();
                }
                return AfterOpen::Disconnect;
            }
            Err(e) => {
                // Keep what we had; the stream still delivers changes.
                crate::log_warn!("Occupancy snapshot failed (epoch {}): {}", epoch, e.message());
            }
        }
        AfterOpen::Stream
    }

    async fn on_message(&self, epoch: u64, frame: &str) {
        if !self.is_live(epoch) {
            crate::log_debug!("Ignoring frame from stale epoch {}", epoch);
            return;
        }
        match PresenceEvent::parse(frame) {
            Ok(event) => self.store.apply_event(event),
            Err(e) => crate::log_warn!("Dropping presence frame: {}", e),
        }
    }

    async fn on_close(&self, epoch: u64) {
        let _ = self
            .live_epoch
            .compare_exchange(epoch, 0, Ordering::SeqCst, Ordering::SeqCst);
        self.store.set_connected(false);
    }
}

/// Owns the store and the session that keeps it current.
///
/// Dropping the synchronizer closes the stream.
pub struct OccupancySync {
    store: Arc<OccupancyStore>,
    session: TransportSession,
}

impl OccupancySync {
    /// Wire a store to `transport` and `fetcher`. Does not connect yet.
    ///
    /// A `401` from the fetcher stops the stream; nothing else happens.
    pub fn new(
        config: &ClientConfig,
        transport: Arc<dyn Transport>,
        fetcher: Arc<dyn SnapshotFetcher>,
    ) -> Self {
        Self::build(config, transport, fetcher, None)
    }

    /// Like [`new`](Self::new), also running `hook` when the token is rejected.
    pub fn with_unauthorized_hook(
        config: &ClientConfig,
        transport: Arc<dyn Transport>,
        fetcher: Arc<dyn SnapshotFetcher>,
        hook: UnauthorizedHook,
    ) -> Self {
        Self::build(config, transport, fetcher, Some(hook))
    }

    /// Production wiring: WebSocket stream plus HTTP snapshots through `api`.
    ///
    /// A rejected token clears the session persisted in `sessions`.
    pub fn native(config: &ClientConfig, api: ApiClient, sessions: Arc<dyn KeyValueStore>) -> Self {
        Self::with_unauthorized_hook(
            config,
            Arc::new(TungsteniteTransport::new()),
            Arc::new(HttpSnapshotFetcher::new(api)),
            Box::new(move || AuthSession::forget(sessions.as_ref())),
        )
    }

    fn build(
        config: &ClientConfig,
        transport: Arc<dyn Transport>,
        fetcher: Arc<dyn SnapshotFetcher>,
        on_unauthorized: Option<UnauthorizedHook>,
    ) -> Self {
        let store = Arc::new(OccupancyStore::new());
        let observer = Arc::new(StoreObserver {
            store: Arc::clone(&store),
            fetcher,
            live_epoch: AtomicU64::new(0),
            on_unauthorized,
        });
        let session = TransportSession::spawn(
            config.stream_url(),
            transport,
            observer,
            config.reconnect.clone(),
        );
        Self { store, session }
    }

    pub fn connect(&self) {
        self.session.connect();
    }

    /// Stop streaming and cancel any pending reconnect. The presence set is kept.
    pub fn disconnect(&self) {
        self.session.disconnect();
    }

    pub fn store(&self) -> &Arc<OccupancyStore> {
        &self.store
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.session.state()
    }

    pub fn watch_connection(&self) -> watch::Receiver<ConnectionState> {
        self.session.watch_state()
    }
}
