//! Check-in / check-out actions with optimistic occupancy updates.
//!
//! The signed-in user's "checked in" status is never stored on its own: it is
//! read from the occupancy store, so the button state and the list of present
//! users cannot disagree.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use labpresence_shared::{
    ApiError, CheckInRequest, MessageResponse, PresenceEntry, UserSummary, CHECK_IN_PATH,
    CHECK_OUT_PATH,
};

use crate::api_client::ApiClient;
use crate::stores::OccupancyStore;

/// The attendance endpoints.
#[async_trait]
pub trait AttendanceGateway: Send + Sync + 'static {
    async fn check_in(&self, request: &CheckInRequest) -> Result<MessageResponse, ApiError>;
    async fn check_out(&self) -> Result<MessageResponse, ApiError>;
}

#[async_trait]
impl AttendanceGateway for ApiClient {
    async fn check_in(&self, request: &CheckInRequest) -> Result<MessageResponse, ApiError> {
        self.post_json(CHECK_IN_PATH, request).await
    }

    async fn check_out(&self) -> Result<MessageResponse, ApiError> {
        self.post_empty(CHECK_OUT_PATH).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckInOutcome {
    CheckedIn,
    /// The server already had an open session for this user.
    AlreadyCheckedIn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutOutcome {
    CheckedOut,
    /// The server had no open session for this user.
    NotCheckedIn,
}

/// Attendance actions for the signed-in user.
pub struct AttendanceActions {
    gateway: Arc<dyn AttendanceGateway>,
    store: Arc<OccupancyStore>,
    user: UserSummary,
}

impl AttendanceActions {
    pub fn new(
        gateway: Arc<dyn AttendanceGateway>,
        store: Arc<OccupancyStore>,
        user: UserSummary,
    ) -> Self {
        Self {
            gateway,
            store,
            user,
        }
    }

    pub fn user(&self) -> &UserSummary {
        &self.user
    }

    /// Whether the occupancy view lists this user.
    pub fn is_checked_in(&self) -> bool {
        self.store.is_present(self.user.id)
    }

    /// Check in. `403` (outside allowed hours, wrong network) is returned as an error.
    pub async fn check_in(&self, request: &CheckInRequest) -> Result<CheckInOutcome, ApiError> {
        let outcome = match self.gateway.check_in(request).await {
            Ok(resp) => {
                crate::log_info!("Checked in as {}: {}", self.user.username, resp.message);
                CheckInOutcome::CheckedIn
            }
            Err(e) if e.status() == Some(409) => {
                crate::log_info!("{} was already checked in", self.user.username);
                CheckInOutcome::AlreadyCheckedIn
            }
            Err(e) => {
                crate::log_warn!("Check-in failed: {}", e.message());
                return Err(e);
            }
        };

        // Shown until the stream's own arrival event replaces it.
        self.store.record_local_check_in(PresenceEntry::provisional(
            self.user.id,
            self.user.label(),
            Utc::now(),
        ));
        Ok(outcome)
    }

    pub async fn check_out(&self) -> Result<CheckOutOutcome, ApiError> {
        let outcome = match self.gateway.check_out().await {
            Ok(resp) => {
                crate::log_info!("Checked out {}: {}", self.user.username, resp.message);
                CheckOutOutcome::CheckedOut
            }
            Err(e) if e.status() == Some(400) => {
                crate::log_info!("{} was not checked in", self.user.username);
                CheckOutOutcome::NotCheckedIn
            }
            Err(e) => {
                crate::log_warn!("Check-out failed: {}", e.message());
                return Err(e);
            }
        };

        self.store.record_local_check_out(self.user.id);
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use labpresence_shared::{EntryId, OccupancySnapshot, PresenceEvent, UserId};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Answers each call from a queue of results.
    #[derive(Default)]
    struct ScriptedGateway {
        check_ins: Mutex<VecDeque<Result<MessageResponse, ApiError>>>,
        check_outs: Mutex<VecDeque<Result<MessageResponse, ApiError>>>,
        requests: Mutex<Vec<CheckInRequest>>,
    }

    #[async_trait]
    impl AttendanceGateway for ScriptedGateway {
        async fn check_in(&self, request: &CheckInRequest) -> Result<MessageResponse, ApiError> {
            self.requests.lock().unwrap().push(request.clone());
            self.check_ins.lock().unwrap().pop_front().unwrap()
        }

        async fn check_out(&self) -> Result<MessageResponse, ApiError> {
            self.check_outs.lock().unwrap().pop_front().unwrap()
        }
    }

    fn ok(message: &str) -> Result<MessageResponse, ApiError> {
        Ok(MessageResponse {
            message: message.to_string(),
        })
    }

    fn http(status: u16, error: &str) -> Result<MessageResponse, ApiError> {
        Err(ApiError::Http {
            status,
            body: format!(r#"{{"error":"{error}"}}"#),
        })
    }

    fn user() -> UserSummary {
        UserSummary {
            id: UserId(4),
            username: "dana".to_string(),
            display_name: "Dana".to_string(),
            email: None,
            role: "student".to_string(),
            is_presence_public: true,
        }
    }

    fn setup() -> (Arc<ScriptedGateway>, Arc<OccupancyStore>, AttendanceActions) {
        let gateway = Arc::new(ScriptedGateway::default());
        let store = Arc::new(OccupancyStore::new());
        let actions = AttendanceActions::new(gateway.clone(), store.clone(), user());
        (gateway, store, actions)
    }

    fn request() -> CheckInRequest {
        CheckInRequest::manual("manual", "LAB-5G")
    }

    #[tokio::test]
    async fn check_in_shows_a_provisional_entry() {
        let (gateway, store, actions) = setup();
        gateway.check_ins.lock().unwrap().push_back(ok("checked in"));

        assert!(!actions.is_checked_in());
        let outcome = actions.check_in(&request()).await.unwrap();

        assert_eq!(outcome, CheckInOutcome::CheckedIn);
        assert!(actions.is_checked_in());
        let entry = store.entry_for(UserId(4)).unwrap();
        assert!(entry.provisional);
        assert_eq!(entry.display_name, "Dana");
        assert_eq!(gateway.requests.lock().unwrap()[0].wifi_ssid, "LAB-5G");
    }

    #[tokio::test]
    async fn server_arrival_confirms_the_local_entry() {
        let (gateway, store, actions) = setup();
        gateway.check_ins.lock().unwrap().push_back(ok("checked in"));
        actions.check_in(&request()).await.unwrap();

        store.apply_event(PresenceEvent::Arrived(PresenceEntry {
            id: EntryId(77),
            user_id: UserId(4),
            display_name: "Dana".to_string(),
            check_in_at: Utc.with_ymd_and_hms(2025, 4, 1, 9, 0, 0).unwrap(),
            provisional: false,
        }));

        let view = store.current();
        assert_eq!(view.len(), 1);
        assert_eq!(view.entries[0].id, EntryId(77));
        assert!(!view.entries[0].provisional);
    }

    #[tokio::test]
    async fn conflict_means_already_checked_in() {
        let (gateway, _store, actions) = setup();
        gateway
            .check_ins
            .lock()
            .unwrap()
            .push_back(http(409, "already checked in"));

        let outcome = actions.check_in(&request()).await.unwrap();
        assert_eq!(outcome, CheckInOutcome::AlreadyCheckedIn);
        assert!(actions.is_checked_in());
    }

    #[tokio::test]
    async fn restriction_is_an_error_and_changes_nothing() {
        let (gateway, store, actions) = setup();
        gateway
            .check_ins
            .lock()
            .unwrap()
            .push_back(http(403, "check-in is only allowed on the lab network"));

        let err = actions.check_in(&request()).await.unwrap_err();
        assert_eq!(err.status(), Some(403));
        assert_eq!(err.message(), "check-in is only allowed on the lab network");
        assert!(store.current().is_empty());
    }

    #[tokio::test]
    async fn check_out_removes_the_entry() {
        let (gateway, store, actions) = setup();
        store.apply_snapshot(OccupancySnapshot::new(vec![PresenceEntry::provisional(
            UserId(4),
            "Dana",
            Utc::now(),
        )]));
        gateway.check_outs.lock().unwrap().push_back(ok("checked out"));

        assert_eq!(actions.check_out().await.unwrap(), CheckOutOutcome::CheckedOut);
        assert!(!actions.is_checked_in());
    }

    #[tokio::test]
    async fn check_out_when_not_checked_in() {
        let (gateway, _store, actions) = setup();
        gateway
            .check_outs
            .lock()
            .unwrap()
            .push_back(http(400, "not checked in"));

        assert_eq!(actions.check_out().await.unwrap(), CheckOutOutcome::NotCheckedIn);
    }

    #[tokio::test]
    async fn network_failure_keeps_the_view() {
        let (gateway, store, actions) = setup();
        store.record_local_check_in(PresenceEntry::provisional(UserId(4), "Dana", Utc::now()));
        gateway
            .check_outs
            .lock()
            .unwrap()
            .push_back(Err(ApiError::Network("timed out".to_string())));

        assert!(actions.check_out().await.is_err());
        assert!(actions.is_checked_in());
    }
}
