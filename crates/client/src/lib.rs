//! Labpresence client - live lab occupancy over a REST API and a presence stream
//!
//! This crate keeps a local view of who is checked in to the lab: it seeds the
//! view from a snapshot, follows the presence stream, and survives dropped
//! connections by reconnecting with backoff and reseeding.

pub mod logging;

pub mod api_client;
pub mod attendance;
pub mod auth_session;
pub mod config;
pub mod snapshot;
pub mod storage;
pub mod stores;
pub mod ws;

#[cfg(test)]
mod testing;

pub use api_client::ApiClient;
pub use attendance::{AttendanceActions, AttendanceGateway, CheckInOutcome, CheckOutOutcome};
pub use auth_session::AuthSession;
pub use config::{ClientConfig, ConfigError};
pub use snapshot::{HttpSnapshotFetcher, SnapshotFetcher};
pub use storage::{FileStore, KeyValueStore, MemoryStore};
pub use stores::{Occupancy, OccupancyStore};
pub use ws::{ConnectionState, OccupancySync, ReconnectConfig};
