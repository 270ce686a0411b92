//! In-memory transport and snapshot source for deterministic tests.
//!
//! [`FakeTransport`] hands out scripted connections: each `accept_next()`
//! queues one connection for the next `open()` and returns the server side of
//! it. An `open()` with nothing queued is refused.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use labpresence_shared::{ApiError, OccupancySnapshot, WireEvent};
use tokio::sync::{mpsc, oneshot, watch};

use crate::snapshot::SnapshotFetcher;
use crate::ws::{Connection, Transport, TransportError};

enum FakeFrame {
    Text(String),
    Error(String),
}

/// Server side of one scripted connection.
pub struct FakeServer {
    frames: mpsc::UnboundedSender<FakeFrame>,
    closed: Arc<AtomicBool>,
}

impl FakeServer {
    /// Push a raw text frame.
    pub fn send_text(&self, frame: &str) {
        let _ = self.frames.send(FakeFrame::Text(frame.to_string()));
    }

    /// Push an encoded presence event.
    pub fn send_event(&self, event: &WireEvent) {
        match event.to_frame() {
            Ok(frame) => self.send_text(&frame),
            Err(e) => panic!("unencodable event {event:?}: {e}"),
        }
    }

    /// Break the stream with an error.
    pub fn fail(&self, reason: &str) {
        let _ = self.frames.send(FakeFrame::Error(reason.to_string()));
    }

    /// Close from the server side, after any frames already sent.
    pub fn hang_up(self) {
        drop(self.frames);
    }

    /// Whether the client closed this connection.
    pub fn closed_by_client(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

struct FakeConnection {
    frames: mpsc::UnboundedReceiver<FakeFrame>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl Connection for FakeConnection {
    async fn next_frame(&mut self) -> Option<Result<String, TransportError>> {
        match self.frames.recv().await? {
            FakeFrame::Text(text) => Some(Ok(text)),
            FakeFrame::Error(reason) => Some(Err(TransportError::Stream(reason))),
        }
    }

    async fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
        self.frames.close();
    }
}

/// Transport whose connections are scripted by the test.
pub struct FakeTransport {
    pending: Mutex<VecDeque<FakeConnection>>,
    opens: watch::Sender<usize>,
}

impl Default for FakeTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeTransport {
    pub fn new() -> Self {
        let (opens, _) = watch::channel(0);
        Self {
            pending: Mutex::new(VecDeque::new()),
            opens,
        }
    }

    /// Let the next `open()` succeed; returns the server side.
    pub fn accept_next(&self) -> FakeServer {
        let (tx, rx) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));
        let conn = FakeConnection {
            frames: rx,
            closed: closed.clone(),
        };
        if let Ok(mut pending) = self.pending.lock() {
            pending.push_back(conn);
        }
        FakeServer { frames: tx, closed }
    }

    /// Number of `open()` calls so far, successful or not.
    pub fn open_count(&self) -> usize {
        *self.opens.borrow()
    }

    pub async fn wait_for_opens(&self, count: usize) {
        let mut rx = self.opens.subscribe();
        let _ = rx.wait_for(|n| *n >= count).await;
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn open(&self, url: &str) -> Result<Box<dyn Connection>, TransportError> {
        self.opens.send_modify(|n| *n += 1);
        let next = self.pending.lock().ok().and_then(|mut p| p.pop_front());
        match next {
            Some(conn) => Ok(Box::new(conn)),
            None => Err(TransportError::Connect {
                url: url.to_string(),
                reason: "connection refused".to_string(),
            }),
        }
    }
}

struct ScriptedSnapshot {
    result: Result<OccupancySnapshot, ApiError>,
    release: Option<oneshot::Receiver<()>>,
}

/// Snapshot source answering from a script; unscripted fetches fail.
pub struct FakeFetcher {
    script: Mutex<VecDeque<ScriptedSnapshot>>,
    calls: watch::Sender<usize>,
}

impl Default for FakeFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeFetcher {
    pub fn new() -> Self {
        let (calls, _) = watch::channel(0);
        Self {
            script: Mutex::new(VecDeque::new()),
            calls,
        }
    }

    pub fn respond(&self, snapshot: OccupancySnapshot) {
        self.push(Ok(snapshot), None);
    }

    pub fn fail(&self, error: ApiError) {
        self.push(Err(error), None);
    }

    /// Answer only once the returned sender fires (or is dropped).
    pub fn respond_when_released(&self, snapshot: OccupancySnapshot) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.push(Ok(snapshot), Some(rx));
        tx
    }

    pub fn fetch_count(&self) -> usize {
        *self.calls.borrow()
    }

    pub async fn wait_for_fetches(&self, count: usize) {
        let mut rx = self.calls.subscribe();
        let _ = rx.wait_for(|n| *n >= count).await;
    }

    fn push(&self, result: Result<OccupancySnapshot, ApiError>, release: Option<oneshot::Receiver<()>>) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(ScriptedSnapshot { result, release });
        }
    }
}

#[async_trait]
impl SnapshotFetcher for FakeFetcher {
    async fn fetch(&self) -> Result<OccupancySnapshot, ApiError> {
        self.calls.send_modify(|n| *n += 1);
        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
        let Some(scripted) = next else {
            return Err(ApiError::Network("no snapshot scripted".to_string()));
        };
        if let Some(release) = scripted.release {
            let _ = release.await;
        }
        scripted.result
    }
}
