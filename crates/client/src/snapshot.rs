//! One-shot fetch of the authoritative occupancy listing.

use async_trait::async_trait;
use labpresence_shared::{ActiveUsersResponse, ApiError, OccupancySnapshot, ACTIVE_USERS_PATH};

use crate::api_client::ApiClient;

/// Returns the full set of present users, or an error if it is unavailable.
#[async_trait]
pub trait SnapshotFetcher: Send + Sync + 'static {
    async fn fetch(&self) -> Result<OccupancySnapshot, ApiError>;
}

/// Fetches `GET /api/v1/attendance/active`.
#[derive(Debug, Clone)]
pub struct HttpSnapshotFetcher {
    api: ApiClient,
}

impl HttpSnapshotFetcher {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl SnapshotFetcher for HttpSnapshotFetcher {
    async fn fetch(&self) -> Result<OccupancySnapshot, ApiError> {
        let resp: ActiveUsersResponse = self.api.get_json(ACTIVE_USERS_PATH).await?;
        Ok(resp.into())
    }
}
