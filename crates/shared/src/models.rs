//! Shared data models for the lab attendance API and the presence stream.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// --- Identity ---

/// Server-assigned user identifier.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Server-assigned check-in session identifier.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct EntryId(pub u64);

/// User record as embedded in check-in logs and returned by `/auth/me`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserSummary {
    pub id: UserId,
    pub username: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default = "default_role")]
    pub role: String,
    #[serde(default = "default_true")]
    pub is_presence_public: bool,
}

fn default_role() -> String {
    "student".to_string()
}

fn default_true() -> bool {
    true
}

impl UserSummary {
    /// Name to show for this user, falling back to the login name.
    pub fn label(&self) -> &str {
        if self.display_name.trim().is_empty() {
            &self.username
        } else {
            &self.display_name
        }
    }
}

// --- Attendance ---

/// A check-in session as serialized by the attendance API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckInLog {
    pub id: EntryId,
    pub user_id: UserId,
    pub check_in_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_out_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<i64>,
    #[serde(default)]
    pub check_in_method: String,
    #[serde(default)]
    pub wifi_ssid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gps_latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gps_longitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserSummary>,
}

/// Body of `GET /api/v1/attendance/active`.
///
/// The server emits `null` instead of `[]` for an empty room.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ActiveUsersResponse {
    #[serde(default)]
    pub active_users: Option<Vec<CheckInLog>>,
}

/// Body of `POST /api/v1/attendance/checkin`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckInRequest {
    pub check_in_method: String,
    pub wifi_ssid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gps_latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gps_longitude: Option<f64>,
}

impl CheckInRequest {
    pub fn manual(method: impl Into<String>, wifi_ssid: impl Into<String>) -> Self {
        Self {
            check_in_method: method.into(),
            wifi_ssid: wifi_ssid.into(),
            gps_latitude: None,
            gps_longitude: None,
        }
    }

    pub fn with_location(mut self, latitude: f64, longitude: f64) -> Self {
        self.gps_latitude = Some(latitude);
        self.gps_longitude = Some(longitude);
        self
    }
}

/// Plain `{"message": "..."}` acknowledgement used by the attendance endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct MessageResponse {
    #[serde(default)]
    pub message: String,
}

// --- Auth ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserSummary,
    pub expires_at: DateTime<Utc>,
}

// --- Presence ---

/// One user's current occupancy record.
#[derive(Debug, Clone, PartialEq)]
pub struct PresenceEntry {
    pub id: EntryId,
    pub user_id: UserId,
    pub display_name: String,
    pub check_in_at: DateTime<Utc>,
    /// Set for optimistic local entries the server has not confirmed yet.
    pub provisional: bool,
}

impl PresenceEntry {
    /// Build an unconfirmed entry for a check-in performed by this client.
    ///
    /// The server assigns the real entry id; `EntryId(0)` is never issued.
    pub fn provisional(user_id: UserId, display_name: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            id: EntryId(0),
            user_id,
            display_name: display_name.into(),
            check_in_at: at,
            provisional: true,
        }
    }
}

impl From<CheckInLog> for PresenceEntry {
    fn from(log: CheckInLog) -> Self {
        let display_name = log
            .user
            .as_ref()
            .map(|u| u.label().to_string())
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| "Unknown".to_string());

        Self {
            id: log.id,
            user_id: log.user_id,
            display_name,
            check_in_at: log.check_in_at,
            provisional: false,
        }
    }
}

/// Complete listing of the users present at one point in time.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OccupancySnapshot {
    pub entries: Vec<PresenceEntry>,
}

impl OccupancySnapshot {
    pub fn new(entries: Vec<PresenceEntry>) -> Self {
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<ActiveUsersResponse> for OccupancySnapshot {
    fn from(resp: ActiveUsersResponse) -> Self {
        let entries = resp
            .active_users
            .unwrap_or_default()
            .into_iter()
            .map(PresenceEntry::from)
            .collect();
        Self { entries }
    }
}
