//! wander-core - Core library for Wander
//!
//! Local storage, the durable mutation queue and the offline-first sync
//! engine shared by every Wander interface.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod state;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use models::{LocalId, Photo, Place};
