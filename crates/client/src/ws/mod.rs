//! Presence stream: transport, session lifecycle and store synchronization.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                 OccupancySync                │
//! │  (owns the store, reseeds it on every open)  │
//! └──────────────────────────────────────────────┘
//!          │ SessionObserver          │ SnapshotFetcher
//!          ▼                          ▼
//!   ┌──────────────────┐      ┌──────────────────┐
//!   │ TransportSession │      │  GET /attendance │
//!   │ (one task, epoch │      │      /active     │
//!   │  + backoff)      │      └──────────────────┘
//!   └──────────────────┘
//!          │ Transport
//!          ▼
//!   ┌──────────────────┐
//!   │ WebSocket stream │
//!   │    /api/v1/ws    │
//!   └──────────────────┘
//! ```
//!
//! Readers never see stream events directly: they subscribe to the
//! [`OccupancyStore`](crate::stores::OccupancyStore).
//!
//! ```rust,ignore
//! let sync = OccupancySync::native(&config, api, sessions);
//! sync.connect();
//! let mut view = sync.store().subscribe();
//! while view.changed().await.is_ok() {
//!     println!("{} present", view.borrow().len());
//! }
//! ```

mod connection;
mod manager;
mod session;

pub use connection::{
    Connection, ConnectionState, ReconnectConfig, Transport, TransportError, TungsteniteTransport,
    MIN_RECONNECT_DELAY,
};
pub use manager::OccupancySync;
pub use session::{AfterOpen, SessionObserver, TransportSession};
