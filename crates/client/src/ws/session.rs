//! Transport session: one owned presence-stream connection plus its reconnect timer.
//!
//! The session runs as a single tokio task. `connect()`/`disconnect()` only
//! enqueue commands; the task is the only place connection state changes, so
//! transitions are strictly sequenced.
//!
//! ```text
//!                 connect()                      open ok
//!  Disconnected ─────────────▶ Connecting ───────────────▶ Connected
//!      ▲  ▲                        │                           │
//!      │  └──── open failed ───────┤                           │
//!      │        (schedule retry)   │ disconnect()              │ peer close / error
//!      │                           ▼                           │ (schedule retry)
//!      └──────────────────── Disconnected ◀────────────────────┘
//! ```
//!
//! Each open attempt starts a new epoch. The connection of an epoch is owned by
//! the task and dropped when the epoch ends, so nothing from an old epoch can
//! reach the observer afterwards.

use std::sync::Arc;

use async_trait::async_trait;
use futures_channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures_util::StreamExt;
use tokio::sync::watch;
use tokio::time::Instant;

use super::connection::{Connection, ConnectionState, ReconnectConfig, Transport};

/// What the session does once [`SessionObserver::on_open`] returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfterOpen {
    /// Start reading frames.
    Stream,
    /// Close the connection as if `disconnect()` had been called. No reconnect follows.
    Disconnect,
}

/// Receives the session's lifecycle and raw frames. Knows nothing about transport.
#[async_trait]
pub trait SessionObserver: Send + Sync + 'static {
    /// Called once the connection of `epoch` is open.
    ///
    /// No frame of `epoch` is read until this returns.
    async fn on_open(&self, epoch: u64) -> AfterOpen;

    /// A text frame received during `epoch`.
    async fn on_message(&self, epoch: u64, frame: &str);

    /// The connection of `epoch` is gone, whatever the cause.
    async fn on_close(&self, epoch: u64);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionCommand {
    Connect,
    Disconnect,
}

/// Handle to a running session task.
///
/// Dropping the handle stops the task and closes any open connection.
pub struct TransportSession {
    endpoint: String,
    commands: UnboundedSender<SessionCommand>,
    state: watch::Receiver<ConnectionState>,
}

impl TransportSession {
    /// Start the session task for `endpoint`. It stays `Disconnected` until
    /// [`connect`](Self::connect) is called.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        endpoint: impl Into<String>,
        transport: Arc<dyn Transport>,
        observer: Arc<dyn SessionObserver>,
        reconnect: ReconnectConfig,
    ) -> Self {
        let endpoint = endpoint.into();
        let (commands, receiver) = unbounded();
        let (state_tx, state) = watch::channel(ConnectionState::Disconnected);

        let event_loop = SessionLoop {
            endpoint: endpoint.clone(),
            transport,
            observer,
            reconnect,
            state: state_tx,
            commands: receiver,
            epoch: 0,
            attempt: 0,
            retry_at: None,
        };
        tokio::spawn(event_loop.run());

        Self {
            endpoint,
            commands,
            state,
        }
    }

    /// Open the stream. No-op while connecting or connected.
    pub fn connect(&self) {
        self.send(SessionCommand::Connect);
    }

    /// Close the stream and cancel any pending reconnect. Idempotent.
    pub fn disconnect(&self) {
        self.send(SessionCommand::Disconnect);
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn send(&self, cmd: SessionCommand) {
        if self.commands.unbounded_send(cmd).is_err() {
            crate::log_warn!("Session for {} has stopped; dropping {:?}", self.endpoint, cmd);
        }
    }
}

/// How an epoch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EpochEnd {
    /// `disconnect()` was called.
    Planned,
    /// Open failed, the peer closed, or the stream broke.
    Unplanned,
    /// The handle was dropped.
    Shutdown,
}

enum Wake {
    Command(Option<SessionCommand>),
    RetryDue,
}

struct SessionLoop {
    endpoint: String,
    transport: Arc<dyn Transport>,
    observer: Arc<dyn SessionObserver>,
    reconnect: ReconnectConfig,
    state: watch::Sender<ConnectionState>,
    commands: UnboundedReceiver<SessionCommand>,
    epoch: u64,
    /// Consecutive unplanned closes since the last successful open.
    attempt: u32,
    /// The one pending reconnect, if any.
    retry_at: Option<Instant>,
}

impl SessionLoop {
    async fn run(mut self) {
        loop {
            let wake = match self.retry_at {
                Some(deadline) => tokio::select! {
                    cmd = self.commands.next() => Wake::Command(cmd),
                    _ = tokio::time::sleep_until(deadline) => Wake::RetryDue,
                },
                None => Wake::Command(self.commands.next().await),
            };

            match wake {
                Wake::Command(None) => {
                    crate::log_debug!("Session for {} dropped", self.endpoint);
                    return;
                }
                Wake::Command(Some(SessionCommand::Disconnect)) => {
                    if self.retry_at.take().is_some() {
                        crate::log_info!("Cancelled pending reconnect to {}", self.endpoint);
                    }
                    self.attempt = 0;
                }
                Wake::Command(Some(SessionCommand::Connect)) => {
                    self.retry_at = None;
                    if !self.run_epoch().await {
                        return;
                    }
                }
                Wake::RetryDue => {
                    self.retry_at = None;
                    if self.state.borrow().is_active() {
                        continue;
                    }
                    crate::log_info!(
                        "Reconnecting to {} (attempt {})",
                        self.endpoint,
                        self.attempt
                    );
                    if !self.run_epoch().await {
                        return;
                    }
                }
            }
        }
    }

    /// Run one epoch to completion. Returns `false` once the session must stop.
    async fn run_epoch(&mut self) -> bool {
        match self.drive_epoch().await {
            EpochEnd::Shutdown => false,
            EpochEnd::Planned => {
                self.attempt = 0;
                self.retry_at = None;
                true
            }
            EpochEnd::Unplanned => {
                let delay = self.reconnect.delay_for_attempt(self.attempt);
                self.attempt = self.attempt.saturating_add(1);
                self.retry_at = Some(Instant::now() + delay);
                crate::log_info!(
                    "Presence stream to {} lost; retrying in {:?}",
                    self.endpoint,
                    delay
                );
                true
            }
        }
    }

    async fn drive_epoch(&mut self) -> EpochEnd {
        self.epoch += 1;
        let epoch = self.epoch;
        self.set_state(ConnectionState::Connecting);
        crate::log_info!("Connecting to {} (epoch {})", self.endpoint, epoch);

        let transport = Arc::clone(&self.transport);
        let endpoint = self.endpoint.clone();
        let open = transport.open(&endpoint);
        tokio::pin!(open);

        let opened = loop {
            tokio::select! {
                result = &mut open => break result,
                cmd = self.commands.next() => match cmd {
                    Some(SessionCommand::Connect) => continue,
                    Some(SessionCommand::Disconnect) => {
                        crate::log_info!("Connect to {} abandoned (epoch {})", self.endpoint, epoch);
                        self.set_state(ConnectionState::Disconnected);
                        return EpochEnd::Planned;
                    }
                    None => {
                        self.set_state(ConnectionState::Disconnected);
                        return EpochEnd::Shutdown;
                    }
                },
            }
        };

        let mut conn = match opened {
            Ok(conn) => conn,
            Err(e) => {
                crate::log_error!("Presence stream error (epoch {}): {}", epoch, e);
                self.set_state(ConnectionState::Disconnected);
                return EpochEnd::Unplanned;
            }
        };

        self.attempt = 0;
        self.set_state(ConnectionState::Connected);
        crate::log_info!("Presence stream connected to {} (epoch {})", self.endpoint, epoch);

        let observer = Arc::clone(&self.observer);
        let end = self.stream_epoch(epoch, conn.as_mut(), observer.as_ref()).await;

        if end != EpochEnd::Unplanned {
            conn.close().await;
        }
        drop(conn);

        self.set_state(ConnectionState::Disconnected);
        observer.on_close(epoch).await;
        crate::log_info!("Presence stream to {} closed (epoch {}, {:?})", self.endpoint, epoch, end);
        end
    }

    /// Hand the open to the observer, then forward frames until the epoch ends.
    async fn stream_epoch(
        &mut self,
        epoch: u64,
        conn: &mut dyn Connection,
        observer: &dyn SessionObserver,
    ) -> EpochEnd {
        let on_open = observer.on_open(epoch);
        tokio::pin!(on_open);
        loop {
            tokio::select! {
                after = &mut on_open => match after {
                    AfterOpen::Stream => break,
                    AfterOpen::Disconnect => {
                        crate::log_info!("Observer ended epoch {} after open", epoch);
                        return EpochEnd::Planned;
                    }
                },
                cmd = self.commands.next() => match cmd {
                    Some(SessionCommand::Connect) => continue,
                    Some(SessionCommand::Disconnect) => return EpochEnd::Planned,
                    None => return EpochEnd::Shutdown,
                },
            }
        }

        loop {
            tokio::select! {
                frame = conn.next_frame() => match frame {
                    Some(Ok(text)) => observer.on_message(epoch, &text).await,
                    Some(Err(e)) => {
                        crate::log_error!("Presence stream error (epoch {}): {}", epoch, e);
                        return EpochEnd::Unplanned;
                    }
                    None => return EpochEnd::Unplanned,
                },
                cmd = self.commands.next() => match cmd {
                    Some(SessionCommand::Connect) => {}
                    Some(SessionCommand::Disconnect) => return EpochEnd::Planned,
                    None => return EpochEnd::Shutdown,
                },
            }
        }
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            crate::log_debug!("{:?} -> {:?} (epoch {})", previous, state, self.epoch);
        }
    }
}
