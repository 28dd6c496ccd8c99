//! Data models for Wander

mod mutation;
mod photo;
mod place;

pub use mutation::{EntityKind, MutationAction, MutationQueueItem, NewMutation};
pub use photo::{NewPhotoPayload, Photo};
pub use place::{GeoPoint, LocalId, NewPlace, Place, PlacePatch, SyncStatus};
