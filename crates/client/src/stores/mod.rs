//! Client-side state stores.

pub mod presence;
pub mod reconcile;

pub use presence::{Occupancy, OccupancyStore};
