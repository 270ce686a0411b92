//! Authentication session with on-disk persistence.

use chrono::{DateTime, Utc};
use labpresence_shared::{ApiError, LoginRequest, LoginResponse, UserSummary, LOGIN_PATH, ME_PATH};
use serde::{Deserialize, Serialize};

use crate::api_client::ApiClient;
use crate::storage::{self, KeyValueStore};
use crate::ws::OccupancySync;

const STORAGE_KEY: &str = "labpresence_session";

/// Stored session data
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AuthSession {
    pub token: String,
    pub user: UserSummary,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl From<LoginResponse> for AuthSession {
    fn from(resp: LoginResponse) -> Self {
        Self {
            token: resp.token,
            user: resp.user,
            expires_at: Some(resp.expires_at),
        }
    }
}

impl AuthSession {
    /// Exchange credentials for a token and persist the session.
    pub async fn login(
        api: &ApiClient,
        store: &dyn KeyValueStore,
        username: &str,
        password: &str,
    ) -> Result<Self, ApiError> {
        let request = LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        };
        let resp: LoginResponse = api.clone().with_token(None).post_json(LOGIN_PATH, &request).await?;
        let session = Self::from(resp);

        if !session.save(store) {
            crate::log_warn!("Could not persist session for {}", session.user.username);
        }
        crate::log_info!("Logged in as {}", session.user.username);
        Ok(session)
    }

    /// Load the persisted session, dropping it if it has expired.
    pub fn restore(store: &dyn KeyValueStore) -> Option<Self> {
        let session: Self = storage::load(store, STORAGE_KEY)?;
        if session.is_expired(Utc::now()) {
            crate::log_info!("Stored session for {} has expired", session.user.username);
            store.remove(STORAGE_KEY);
            return None;
        }
        Some(session)
    }

    /// Persist this session. Returns `false` if it could not be written.
    pub fn save(&self, store: &dyn KeyValueStore) -> bool {
        storage::save(store, STORAGE_KEY, self)
    }

    /// Remove the persisted session, if any.
    pub fn forget(store: &dyn KeyValueStore) {
        store.remove(STORAGE_KEY);
    }

    /// Forget the stored session and stop the presence stream, if one is running.
    pub fn logout(store: &dyn KeyValueStore, sync: Option<&OccupancySync>) {
        if let Some(sync) = sync {
            sync.disconnect();
        }
        Self::forget(store);
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    /// An API client that sends this session's token.
    pub fn client(&self, api: &ApiClient) -> ApiClient {
        api.clone().with_token(Some(self.token.clone()))
    }

    /// Re-read the signed-in user from the server.
    pub async fn refresh_user(&mut self, api: &ApiClient, store: &dyn KeyValueStore) -> Result<(), ApiError> {
        let user: UserSummary = forget_if_unauthorized(store, self.client(api).get_json(ME_PATH).await)?;
        if user != self.user {
            self.user = user;
            self.save(store);
        }
        Ok(())
    }
}

/// Pass `result` through, clearing the stored session if the server rejected the token.
pub fn forget_if_unauthorized<T>(store: &dyn KeyValueStore, result: Result<T, ApiError>) -> Result<T, ApiError> {
    if let Err(e) = &result {
        if e.is_unauthorized() {
            crate::log_warn!("Token rejected; clearing stored session");
            AuthSession::forget(store);
        }
    }
    result
}
