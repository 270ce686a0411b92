//! Presence stream protocol.
//!
//! The server pushes UTF-8 JSON text frames of the form
//! `{"type": "check_in" | "check_out", "payload": ...}`. A `check_in` payload is
//! a full [`CheckInLog`]; a `check_out` payload only needs the `user_id`.

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::models::{CheckInLog, PresenceEntry, UserId};

/// Path of the presence stream, relative to the API base URL.
pub const STREAM_PATH: &str = "/api/v1/ws";

/// Path of the occupancy snapshot endpoint.
pub const ACTIVE_USERS_PATH: &str = "/api/v1/attendance/active";

pub const CHECK_IN_PATH: &str = "/api/v1/attendance/checkin";
pub const CHECK_OUT_PATH: &str = "/api/v1/attendance/checkout";
pub const LOGIN_PATH: &str = "/api/v1/auth/login";
pub const ME_PATH: &str = "/api/v1/auth/me";

/// Payload of a `check_out` frame. Extra fields are ignored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckOutPayload {
    pub user_id: UserId,
}

/// A frame as it appears on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum WireEvent {
    CheckIn(CheckInLog),
    CheckOut(CheckOutPayload),
}

impl WireEvent {
    /// Encode as a text frame.
    pub fn to_frame(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::from)
    }
}

/// An incremental change to the set of present users.
#[derive(Debug, Clone, PartialEq)]
pub enum PresenceEvent {
    Arrived(PresenceEntry),
    Departed(UserId),
}

impl PresenceEvent {
    /// Parse a text frame from the presence stream.
    pub fn parse(frame: &str) -> Result<Self, ProtocolError> {
        let wire: WireEvent = serde_json::from_str(frame)?;
        Ok(wire.into())
    }

    /// The user this event is about.
    pub fn user_id(&self) -> UserId {
        match self {
            PresenceEvent::Arrived(entry) => entry.user_id,
            PresenceEvent::Departed(user_id) => *user_id,
        }
    }
}

impl From<WireEvent> for PresenceEvent {
    fn from(wire: WireEvent) -> Self {
        match wire {
            WireEvent::CheckIn(log) => PresenceEvent::Arrived(log.into()),
            WireEvent::CheckOut(payload) => PresenceEvent::Departed(payload.user_id),
        }
    }
}
