//! Async services over the local store and the remote API.

mod places;
mod store;

pub use places::{PlaceService, RefreshReport, StatusReport};
pub use store::{LocalStore, QueueStats};
